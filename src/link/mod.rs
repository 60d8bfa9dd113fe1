//! Serial link to the arm's motor controller board
//!
//! [`command`] is the outgoing line format, [`telemetry`] the incoming one,
//! [`serial`] owns the port itself.

pub mod command;
pub mod serial;
pub mod telemetry;

pub use command::{Command, Direction};
pub use serial::{open_port, LinkError, OpenedPort, PortReader, PortWriter, SerialLink};
pub use telemetry::{decode_frame, TelemetryError, TelemetryFrame, TelemetryReader};
