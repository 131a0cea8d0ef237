//! In-memory implementation of the database port.
//!
//! Tables are vectors of JSON rows created on first write. Every row carries
//! an integer `id`, assigned from a per-table sequence when the caller does
//! not supply one. Units of work buffer their statements and apply them
//! under a single write lock on commit.

mod database;
mod filter;
mod unit_of_work;

pub use database::MemoryDatabase;
pub use filter::{compare_values, matches_all};
pub use unit_of_work::MemoryUnitOfWork;
