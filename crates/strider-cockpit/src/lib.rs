//! `strider-cockpit` – network front-end for the robot.
//!
//! Boots a lightweight HTTP + WebSocket server (default port `5000`) that:
//!
//! 1. **Answers** plain HTTP requests with the current
//!    [`StatusSnapshot`][strider_types::StatusSnapshot] as JSON.
//! 2. **Accepts** JSON frames over WebSocket and forwards them to the
//!    [`RobotService`][strider_runtime::RobotService] (see [`frame`] for the
//!    protocol), one reply per frame.  Each client is rate limited.
//! 3. **Streams** every event published on the bus to each connected client.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strider_cockpit::CockpitServer;
//! use strider_hal::{SimDriver, SimSensor};
//! use strider_runtime::RobotService;
//!
//! #[tokio::main]
//! async fn main() {
//!     let service =
//!         RobotService::builder(Arc::new(SimDriver::new()), Arc::new(SimSensor::new(100.0)))
//!             .start();
//!     if let Err(err) = CockpitServer::new(service).run().await {
//!         eprintln!("cockpit failed: {err}");
//!     }
//! }
//! ```

pub mod frame;
pub mod server;

pub use frame::{EventFrame, FrameHandler, Reply, ReplyStatus};
pub use server::{CockpitServer, DEFAULT_PORT, DEFAULT_RATE_LIMIT};
