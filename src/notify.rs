//! One-directional notifications towards the presentation layer
//!
//! The control and telemetry flows only ever produce [`Notification`]s; nothing
//! waits for a reply. Sending never blocks a real-time flow: when the channel
//! is full or closed the message is dropped.

use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tracing::debug;

use crate::controller::{Control, Stick};
use crate::link::telemetry::TelemetryFrame;
use crate::state::Transition;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Clone, Debug)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControllerStatus {
    Connected { name: String },
    NotFound,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    Connected { port: String },
    Disconnected,
}

/// Everything the core reports to the presentation boundary
#[derive(Clone, Debug)]
pub enum Notification {
    /// An axis entered or left hold mode
    StateChanged(Transition),
    Log(LogEntry),
    TelemetryUpdated(TelemetryFrame),
    /// Pressed state of a discrete control, for highlighting only
    ButtonVisual { control: Control, pressed: bool },
    /// Stick deflection, for the position indicator only
    StickVisual { stick: Stick, x: f32, y: f32 },
    ControllerStatus(ControllerStatus),
    LinkStatus(LinkStatus),
    /// Short description of the operator's current action
    ActionHint(String),
}

/// Non-blocking producer handle, cheap to clone into every flow
#[derive(Clone, Debug, Default)]
pub struct Notifier {
    sender: Option<mpsc::Sender<Notification>>,
}

impl Notifier {
    pub fn new(sender: mpsc::Sender<Notification>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// A notifier without consumer; every message is discarded
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn send(&self, notification: Notification) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(e) = sender.try_send(notification) {
            debug!("Dropping notification: {}", e);
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.send(Notification::Log(LogEntry {
            at: Local::now(),
            level,
            message: message.into(),
        }));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }
}
