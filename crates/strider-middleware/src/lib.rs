//! `strider-middleware` – event routing between the runtime and front-ends.
//!
//! # Modules
//!
//! - [`bus`] – topic-based publish/subscribe [`EventBus`] built on Tokio
//!   broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
