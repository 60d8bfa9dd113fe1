//! Gamepad control for a seven-axis robotic arm (six motors with encoders
//! plus a linear actuator) over a serial link
//!
//! ```text
//! gamepad ─► controller ─► dispatch ─► link (serial, 9600 baud) ─► arm
//!                 │            ▲                  │
//!                 ▼            │                  ▼
//!              state ◄─────── pid          telemetry (encoders)
//! ```
//!
//! Everything a user would see goes out as [`notify::Notification`]s.

pub mod axis;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod dispatch;
pub mod link;
pub mod notify;
pub mod pid;
pub mod presentation;
pub mod session;
pub mod state;

pub use axis::Axis;
pub use config::ArmConfig;
pub use notify::{Notification, Notifier};
pub use session::ArmSession;
