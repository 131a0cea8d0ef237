//! Authenticated identity carried by an execution context.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Coarse role granted to an identity. Procedures decide individually which
/// roles they accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Staff,
    Member,
    /// Internal caller, used for setup-phase and operator calls.
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Staff => "staff",
            Self::Member => "member",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "staff" => Ok(Self::Staff),
            "member" => Ok(Self::Member),
            "system" => Ok(Self::System),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// The caller on whose behalf a request runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl Identity {
    pub fn new(subject: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            subject: subject.into(),
            roles,
        }
    }

    pub fn system() -> Self {
        Self::new("system", vec![Role::System])
    }

    /// `Admin` and `System` satisfy every role check.
    pub fn has_role(&self, role: Role) -> bool {
        self.roles
            .iter()
            .any(|granted| *granted == role || matches!(granted, Role::Admin | Role::System))
    }
}
