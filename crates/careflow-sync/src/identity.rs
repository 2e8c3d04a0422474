//! Actor identity resolution.
//!
//! Documents reference the acting user in whatever form the producing
//! client had on hand: a numeric directory ID, that ID as a string, a UUID,
//! or a contact string (username, email, phone). Resolution maps any of
//! those to the canonical local identity. A miss is never an error; sync
//! must not fail because an audit actor could not be determined.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use careflow_core::UserId;
use careflow_store::UserDirectory;

/// A parsed actor reference, before directory lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorRef {
    /// Numeric (or numeric-string) legacy directory identifier.
    LegacyId(i64),
    /// UUID identity.
    Id(UserId),
    /// Anything else: matched against contact fields.
    Contact(String),
}

impl ActorRef {
    /// Parse a raw reference. Empty input parses to `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(legacy) = raw.parse::<i64>() {
            return Some(Self::LegacyId(legacy));
        }
        if let Ok(uuid) = Uuid::parse_str(raw) {
            return Some(Self::Id(UserId::from_uuid(uuid)));
        }
        Some(Self::Contact(raw.to_string()))
    }
}

/// Resolves actor references against the user directory.
#[derive(Clone)]
pub struct IdentityResolver {
    directory: Arc<dyn UserDirectory>,
}

impl IdentityResolver {
    /// Create a resolver over a user directory.
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    /// Resolve a raw actor reference to a local user identity.
    ///
    /// Returns `None` for empty input, unknown references, and directory
    /// lookup failures; lookup failures are logged, never propagated.
    pub async fn resolve(&self, raw: &str) -> Option<UserId> {
        let actor_ref = ActorRef::parse(raw)?;

        let lookup = match &actor_ref {
            ActorRef::LegacyId(legacy) => self.directory.find_user_by_legacy_id(*legacy).await,
            ActorRef::Id(id) => self.directory.find_user_by_id(*id).await,
            ActorRef::Contact(contact) => self.directory.find_user_by_contact(contact).await,
        };

        match lookup {
            Ok(Some(user)) => Some(user.id),
            Ok(None) => {
                debug!(reference = %raw, "Actor reference did not resolve; recording unknown actor");
                None
            }
            Err(error) => {
                warn!(reference = %raw, %error, "User directory lookup failed; recording unknown actor");
                None
            }
        }
    }

    /// Resolve an optional reference, treating `None` as unknown actor.
    pub async fn resolve_opt(&self, raw: Option<&str>) -> Option<UserId> {
        match raw {
            Some(raw) => self.resolve(raw).await,
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use careflow_store::{DirectoryUser, InMemoryStore};

    #[test]
    fn test_actor_ref_parse() {
        assert_eq!(ActorRef::parse("42"), Some(ActorRef::LegacyId(42)));
        assert_eq!(ActorRef::parse("  17 "), Some(ActorRef::LegacyId(17)));
        assert_eq!(ActorRef::parse(""), None);
        assert_eq!(ActorRef::parse("   "), None);

        let uuid = Uuid::new_v4();
        assert_eq!(
            ActorRef::parse(&uuid.to_string()),
            Some(ActorRef::Id(UserId::from_uuid(uuid)))
        );

        assert_eq!(
            ActorRef::parse("amaka@clinic.example"),
            Some(ActorRef::Contact("amaka@clinic.example".into()))
        );
    }

    async fn resolver_with_user() -> (IdentityResolver, UserId) {
        let store = Arc::new(InMemoryStore::new());
        let id = UserId::new();
        store
            .add_user(DirectoryUser {
                id,
                legacy_id: Some(42),
                username: "nurse.amaka".into(),
                email: Some("amaka@clinic.example".into()),
                phone: None,
                active: true,
            })
            .await;
        (IdentityResolver::new(store), id)
    }

    #[tokio::test]
    async fn test_resolves_numeric_string() {
        let (resolver, id) = resolver_with_user().await;
        assert_eq!(resolver.resolve("42").await, Some(id));
    }

    #[tokio::test]
    async fn test_resolves_uuid() {
        let (resolver, id) = resolver_with_user().await;
        assert_eq!(resolver.resolve(&id.to_string()).await, Some(id));
    }

    #[tokio::test]
    async fn test_resolves_contact() {
        let (resolver, id) = resolver_with_user().await;
        assert_eq!(resolver.resolve("Amaka@clinic.example").await, Some(id));
        assert_eq!(resolver.resolve("nurse.amaka").await, Some(id));
    }

    #[tokio::test]
    async fn test_miss_is_not_an_error() {
        let (resolver, _) = resolver_with_user().await;
        assert_eq!(resolver.resolve("9000").await, None);
        assert_eq!(resolver.resolve("who@nowhere.example").await, None);
        assert_eq!(resolver.resolve_opt(None).await, None);
    }
}
