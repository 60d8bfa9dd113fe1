//! Serial port access and the guarded command writer
//!
//! The port is opened once and split into a writer half (owned by the control
//! flow through [`SerialLink`]) and a reader half (owned by the telemetry
//! flow). A failed write is treated as connection loss: the writer is dropped,
//! the session is cancelled and nothing is retried.

use std::io::{Read, Write};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SerialConfig;
use crate::link::command::Command;
use crate::notify::{LinkStatus, Notification, Notifier};

pub type PortWriter = Box<dyn Write + Send>;
pub type PortReader = Box<dyn Read + Send>;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("No serial port found")]
    NoPort,

    #[error("Failed to list serial ports: {0}")]
    Enumerate(#[source] serialport::Error),

    #[error("Failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Failed to clone port handle: {0}")]
    Clone(#[source] serialport::Error),
}

/// Both halves of an opened serial port
pub struct OpenedPort {
    pub name: String,
    pub writer: PortWriter,
    pub reader: PortReader,
}

/// Picks the configured port, or the first one the OS reports
pub fn resolve_port_name(config: &SerialConfig) -> Result<String, LinkError> {
    if !config.port.is_empty() {
        return Ok(config.port.clone());
    }

    let ports = serialport::available_ports().map_err(LinkError::Enumerate)?;
    for port in &ports {
        debug!("Found serial port: {} ({:?})", port.port_name, port.port_type);
    }
    let first = ports.into_iter().next().ok_or(LinkError::NoPort)?;
    info!("No port configured, using {}", first.port_name);
    Ok(first.port_name)
}

pub fn open_port(config: &SerialConfig) -> Result<OpenedPort, LinkError> {
    let name = resolve_port_name(config)?;
    info!("Opening {} at {} baud", name, config.baud_rate);

    let port = serialport::new(&name, config.baud_rate)
        .timeout(config.read_timeout())
        .open()
        .map_err(|source| LinkError::Open {
            port: name.clone(),
            source,
        })?;
    let reader = port.try_clone().map_err(LinkError::Clone)?;

    Ok(OpenedPort {
        name,
        writer: Box::new(port),
        reader: Box::new(reader),
    })
}

/// Writer half of the link as seen by the control flow
pub struct SerialLink {
    writer: Option<PortWriter>,
    cancel: CancellationToken,
    notifier: Notifier,
    lines_written: u64,
}

impl SerialLink {
    pub fn new(writer: PortWriter, cancel: CancellationToken, notifier: Notifier) -> Self {
        Self {
            writer: Some(writer),
            cancel,
            notifier,
            lines_written: 0,
        }
    }

    /// A link that was never connected; every send is a no-op
    pub fn closed(cancel: CancellationToken, notifier: Notifier) -> Self {
        Self {
            writer: None,
            cancel,
            notifier,
            lines_written: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    /// Writes one command line, returns whether it reached the port
    pub fn send(&mut self, command: &Command) -> bool {
        let Some(writer) = self.writer.as_mut() else {
            debug!("Not connected, dropping {:?}", command);
            return false;
        };

        let line = command.to_string();
        let result = writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.flush());

        match result {
            Ok(()) => {
                self.lines_written += 1;
                debug!("Sent {}", line.trim_end());
                true
            }
            Err(e) => {
                error!("Serial write failed, disconnecting: {}", e);
                self.disconnect(format!("Serial write failed: {}", e));
                false
            }
        }
    }

    fn disconnect(&mut self, reason: String) {
        self.writer = None;
        self.notifier.error(reason);
        self.notifier
            .send(Notification::LinkStatus(LinkStatus::Disconnected));
        if !self.cancel.is_cancelled() {
            warn!("Cancelling session after link loss");
            self.cancel.cancel();
        }
    }
}
