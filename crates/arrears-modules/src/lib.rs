//! # arrears-modules — feature modules
//!
//! Each module publishes a `*Contract` (its procedure definitions and
//! payload/response types) and a [`Module`] implementation that registers
//! the handlers and mounts the routes. Modules only reach each other through
//! contracts and the bus.
//!
//! Declaration order matters: `invoicing` calls `members:listMembers` during
//! its setup, so `members` must come first.

pub mod demo;
pub mod events;
pub mod invoicing;
pub mod members;
mod records;
pub mod search;

use std::sync::Arc;

use arrears_bus::BusResult;
use arrears_kernel::Module;

pub use events::{EventsContract, EventsModule};
pub use invoicing::{InvoicingContract, InvoicingModule};
pub use members::{MembersContract, MembersModule};
pub use search::{SearchContract, SearchModule};

/// The application's modules in declaration order.
pub fn default_modules() -> BusResult<Vec<Arc<dyn Module>>> {
    let modules: [Arc<dyn Module>; 4] = [
        Arc::new(MembersModule::new()?),
        Arc::new(EventsModule::new()?),
        Arc::new(InvoicingModule::new()?),
        Arc::new(SearchModule::new()?),
    ];
    Ok(modules.into())
}
