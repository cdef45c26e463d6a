//! `strider-runtime` – the running robot.
//!
//! Wires the kernel's pure policies and the HAL's gateway into live tasks.
//!
//! # Modules
//!
//! - [`arbiter`] – [`ArbiterHandle`] and [`ArbiterWorker`]: the bounded
//!   intent queue and the single task that drains it into the
//!   [`ActuatorGateway`][strider_hal::ActuatorGateway].
//! - [`autonomy`] – [`AutonomyScheduler`]: the cancellable
//!   vocalize / patrol / rest / stand routine.
//! - [`service`] – [`RobotService`]: the owned entry point front-ends hold a
//!   handle to.  Start it with [`RobotService::builder`], stop it with
//!   [`RobotService::shutdown`].
//! - [`telemetry`] – [`init_tracing`]: console logging plus optional OTLP
//!   span export.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strider_hal::{SimDriver, SimSensor};
//! use strider_runtime::RobotService;
//! use strider_types::MoveRequest;
//!
//! # async fn demo() -> Result<(), strider_types::StriderError> {
//! let service = RobotService::builder(Arc::new(SimDriver::new()), Arc::new(SimSensor::new(100.0)))
//!     .start();
//! service.submit_move(MoveRequest::vector(0.0, 0.8))?;
//! service.shutdown().await
//! # }
//! ```

pub mod arbiter;
pub mod autonomy;
pub mod service;
pub mod telemetry;

pub use arbiter::{ArbiterHandle, ArbiterWorker};
pub use autonomy::AutonomyScheduler;
pub use service::{RobotService, RobotServiceBuilder};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
