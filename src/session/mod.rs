//! Flow orchestration for a connected arm
//!
//! [`session_handle`] owns connect/disconnect, [`control_loop`] is the 50 Hz
//! control flow it runs next to the telemetry reader.

pub mod control_loop;
pub mod session_handle;

pub use control_loop::{ControlError, ControlLoop, ControlStats};
pub use session_handle::{ArmSession, FlowExit, SessionError, SessionReport};
