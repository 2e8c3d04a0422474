//! The event marker trait.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A typed domain event payload.
///
/// `EVENT_TYPE` is the fully qualified name carried in the envelope,
/// e.g. `"careflow.session.state_changed"`.
pub trait Event: Serialize + DeserializeOwned + Send + Sync {
    /// Fully qualified event type name.
    const EVENT_TYPE: &'static str;
}
