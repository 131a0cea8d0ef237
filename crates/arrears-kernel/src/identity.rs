use std::collections::HashMap;

use arrears_protocol::{ApiToken, AuthSettings, Identity, IdentityPort, PortError, PortResult};
use async_trait::async_trait;

/// Identity port backed by a fixed table of API tokens.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentities {
    tokens: HashMap<String, Identity>,
}

impl StaticIdentities {
    pub fn new(tokens: impl IntoIterator<Item = ApiToken>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|token| (token.token, token.identity))
                .collect(),
        }
    }

    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self::new(settings.tokens.iter().cloned())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityPort for StaticIdentities {
    async fn resolve(&self, credential: &str) -> PortResult<Identity> {
        self.tokens
            .get(credential)
            .cloned()
            .ok_or_else(|| PortError::InvalidCredential("unknown api token".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use arrears_protocol::Role;

    use super::*;

    #[tokio::test]
    async fn resolves_configured_tokens_only() {
        let identities = StaticIdentities::new(vec![
            "s3cret=alice:staff,member".parse::<ApiToken>().unwrap(),
        ]);

        let alice = identities.resolve("s3cret").await.unwrap();
        assert_eq!(alice.subject, "alice");
        assert!(alice.has_role(Role::Staff));

        assert!(matches!(
            identities.resolve("guess").await,
            Err(PortError::InvalidCredential(_))
        ));
    }
}
