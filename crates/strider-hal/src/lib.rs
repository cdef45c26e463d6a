//! `strider-hal` – hardware abstraction for the quadruped.
//!
//! # Modules
//!
//! - [`driver`] – the [`LeggedDriver`][driver::LeggedDriver] and
//!   [`DistanceSensor`][driver::DistanceSensor] traits a hardware back-end
//!   implements, plus a fault-tolerant sensor read.
//! - [`registry`] – [`ActionDescriptor`][registry::ActionDescriptor] for every
//!   canned [`ActionKind`][strider_types::ActionKind].
//! - [`gateway`] – [`ActuatorGateway`][gateway::ActuatorGateway]: the only
//!   path to the driver; serialises and time-bounds every call.
//! - [`sim`] – recording [`SimDriver`][sim::SimDriver] and scripted
//!   [`SimSensor`][sim::SimSensor] for tests and headless runs.

pub mod driver;
pub mod gateway;
pub mod registry;
pub mod sim;

pub use driver::{DistanceSensor, LeggedDriver, read_snapshot};
pub use gateway::{ActuatorGateway, IdleProbe};
pub use registry::ActionDescriptor;
pub use sim::{DriverCall, SimDriver, SimSensor};
