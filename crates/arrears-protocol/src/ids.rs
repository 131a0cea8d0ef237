//! Typed ID wrappers.
//!
//! IDs are opaque String wrappers (serde-transparent). The default
//! generation strategy is UUID v4; callers may supply their own value
//! (for example a request id forwarded by a proxy).

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string value.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Create a new ID using UUID v4 (random).
            pub fn new_uuid() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// View as string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new_uuid()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_id!(
    /// Identifier for one inbound request (HTTP request, CLI invocation, or
    /// the startup phase). Shared by every procedure call the request makes.
    RequestId
);
typed_id!(
    /// Identifier for a single procedure call on the bus.
    CallId
);

impl RequestId {
    /// The request id used for calls made while modules are being set up.
    pub fn startup() -> Self {
        Self("startup".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_new_is_unique() {
        let a = RequestId::new_uuid();
        let b = RequestId::new_uuid();
        assert_ne!(a, b);
    }

    #[test]
    fn request_id_from_forwarded_header_value() {
        let id: RequestId = "req-7f3a".into();
        assert_eq!(id.as_str(), "req-7f3a");
        assert_eq!(id.to_string(), "req-7f3a");
    }

    #[test]
    fn startup_request_id_is_stable() {
        assert_eq!(RequestId::startup(), RequestId::startup());
    }

    #[test]
    fn call_id_serializes_as_plain_string() {
        let id = CallId::from_string("call-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"call-1\"");
    }
}
