//! Careflow domain events.
//!
//! Typed event payloads wrapped in a standard envelope, published through a
//! transport-agnostic seam. The core does not care who subscribes; the only
//! publisher shipped here is an in-memory collector, and broker-backed
//! publishers live with the boundary layers.

pub mod envelope;
pub mod error;
pub mod event;
pub mod publisher;
pub mod session;

pub use envelope::{EventEnvelope, RawEnvelope};
pub use error::EventError;
pub use event::Event;
pub use publisher::{EventPublisher, InMemoryPublisher};
pub use session::SessionStateChanged;
