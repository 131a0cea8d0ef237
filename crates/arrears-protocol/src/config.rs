//! Process configuration shared read-only with every execution context.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::identity::{Identity, Role};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        };
        f.write_str(name)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// Limits applied by the bus dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSettings {
    /// Maximum nesting of `exec` calls within one call chain.
    pub max_call_depth: usize,
    /// Calls slower than this are logged as warnings.
    pub slow_call_threshold_ms: u64,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            max_call_depth: 16,
            slow_call_threshold_ms: 250,
        }
    }
}

/// A static bearer token and the identity it authenticates.
///
/// Parses from `token=subject:role1,role2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiToken {
    pub token: String,
    pub identity: Identity,
}

impl FromStr for ApiToken {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (token, rest) = s
            .split_once('=')
            .ok_or_else(|| format!("expected token=subject:roles, got {s:?}"))?;
        let (subject, roles) = rest.split_once(':').unwrap_or((rest, ""));
        if token.is_empty() || subject.is_empty() {
            return Err(format!("token and subject must be non-empty in {s:?}"));
        }
        let roles = roles
            .split(',')
            .filter(|role| !role.trim().is_empty())
            .map(str::parse::<Role>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            token: token.to_owned(),
            identity: Identity::new(subject, roles),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Serve requests without an `Authorization` header as anonymous.
    pub allow_anonymous: bool,
    #[serde(default)]
    pub tokens: Vec<ApiToken>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            allow_anonymous: true,
            tokens: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    #[serde(default)]
    pub bus: BusSettings,
    #[serde(default)]
    pub auth: AuthSettings,
}
