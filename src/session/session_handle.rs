//! Session Handle - lifecycle of one connection to the arm
//!
//! A session owns the two blocking flows that share the open port:
//!
//! ```text
//!            ┌──► control flow   (gamepad ► processor ► dispatcher ► writer)
//! port ──────┤
//!            └──► telemetry flow (reader ► decoder ► SharedAxisState)
//! ```
//!
//! Both flows only share the axis state and one cancellation token. Cancelling
//! the token (operator disconnect or a failed write) ends both within one
//! iteration; `disconnect` then joins each with a bounded wait.

use std::fmt;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ArmConfig;
use crate::controller::{open_gamepad, CollectorError, InputProcessor, InputSource};
use crate::dispatch::CommandDispatcher;
use crate::link::serial::{open_port, LinkError, OpenedPort, PortReader, PortWriter, SerialLink};
use crate::link::telemetry::{TelemetryError, TelemetryReader};
use crate::notify::{LinkStatus, Notification, Notifier};
use crate::session::control_loop::{run_control_flow, ControlError, ControlLoop, ControlStats};
use crate::state::{AxisTable, SharedAxisState};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Serial link error: {0}")]
    Link(#[from] LinkError),
}

/// How a flow ended when the session was torn down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowExit {
    Completed,
    Failed(String),
    Panicked,
    TimedOut,
    NotStarted,
}

impl fmt::Display for FlowExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowExit::Completed => write!(f, "completed"),
            FlowExit::Failed(reason) => write!(f, "failed: {}", reason),
            FlowExit::Panicked => write!(f, "panicked"),
            FlowExit::TimedOut => write!(f, "did not stop in time"),
            FlowExit::NotStarted => write!(f, "not started"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub control: FlowExit,
    pub telemetry: FlowExit,
}

pub struct ArmSession {
    port: String,
    state: Arc<SharedAxisState>,
    cancel: CancellationToken,
    control: Option<JoinHandle<Result<ControlStats, ControlError>>>,
    telemetry: Option<JoinHandle<Result<(), TelemetryError>>>,
    join_timeout: Duration,
    notifier: Notifier,
}

impl ArmSession {
    /// Opens the configured port, waits for the board to settle and starts
    /// both flows with the first connected gamepad
    pub async fn connect(config: &ArmConfig, notifier: Notifier) -> Result<Self, SessionError> {
        let opened = match open_port(&config.serial) {
            Ok(opened) => opened,
            Err(e) => {
                error!("Failed to connect: {}", e);
                notifier.error(format!("Failed to connect: {}", e));
                return Err(e.into());
            }
        };

        info!(
            "Waiting {}ms for the controller board to settle",
            config.serial.settle_ms
        );
        tokio::time::sleep(config.serial.settle_delay()).await;

        Ok(Self::start(opened, config, notifier, open_gamepad))
    }

    /// Starts both flows on an already opened port
    ///
    /// The input source is built inside the control thread, so it does not
    /// need to be `Send`.
    pub fn start<I, F>(port: OpenedPort, config: &ArmConfig, notifier: Notifier, make_input: F) -> Self
    where
        I: InputSource + 'static,
        F: FnOnce() -> Result<I, CollectorError> + Send + 'static,
    {
        let OpenedPort {
            name,
            writer,
            reader,
        } = port;
        let state = Arc::new(SharedAxisState::new());
        let cancel = CancellationToken::new();

        info!("Connected to {}", name);
        notifier.info(format!("Connected to {}", name));
        notifier.send(Notification::LinkStatus(LinkStatus::Connected {
            port: name.clone(),
        }));

        let control = spawn_control(
            writer,
            config.clone(),
            state.clone(),
            cancel.clone(),
            notifier.clone(),
            make_input,
        );
        let telemetry = spawn_telemetry(reader, state.clone(), cancel.clone(), notifier.clone());

        Self {
            port: name,
            state,
            cancel,
            control: Some(control),
            telemetry: Some(telemetry),
            join_timeout: config.control.join_timeout(),
            notifier,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn state(&self) -> &Arc<SharedAxisState> {
        &self.state
    }

    /// Token cancelled on disconnect or link loss
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops both flows, waits for each up to the join timeout and releases
    /// the port
    pub async fn disconnect(mut self) -> SessionReport {
        info!("Disconnecting from {}", self.port);
        self.cancel.cancel();

        let control = join_flow("control", self.control.take(), self.join_timeout).await;
        let telemetry = join_flow("telemetry", self.telemetry.take(), self.join_timeout).await;

        self.notifier.info(format!("Disconnected from {}", self.port));
        self.notifier
            .send(Notification::LinkStatus(LinkStatus::Disconnected));
        info!(
            "Disconnected: control {}, telemetry {}",
            control, telemetry
        );

        SessionReport { control, telemetry }
    }
}

fn spawn_control<I, F>(
    writer: PortWriter,
    config: ArmConfig,
    state: Arc<SharedAxisState>,
    cancel: CancellationToken,
    notifier: Notifier,
    make_input: F,
) -> JoinHandle<Result<ControlStats, ControlError>>
where
    I: InputSource + 'static,
    F: FnOnce() -> Result<I, CollectorError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let build = |input: I| {
            let link = SerialLink::new(writer, cancel.clone(), notifier.clone());
            ControlLoop::new(
                input,
                InputProcessor::new(&config.input, notifier.clone()),
                AxisTable::new(state, &config.pid, notifier.clone()),
                CommandDispatcher::new(link, config.hold.clone()),
                config.control.tick_interval(),
                cancel.clone(),
            )
        };
        run_control_flow(make_input, build, &notifier)
    })
}

fn spawn_telemetry(
    reader: PortReader,
    state: Arc<SharedAxisState>,
    cancel: CancellationToken,
    notifier: Notifier,
) -> JoinHandle<Result<(), TelemetryError>> {
    tokio::task::spawn_blocking(move || {
        TelemetryReader::new(BufReader::new(reader), state, notifier, cancel).run()
    })
}

async fn join_flow<T, E: fmt::Display>(
    name: &str,
    handle: Option<JoinHandle<Result<T, E>>>,
    timeout: Duration,
) -> FlowExit {
    let Some(handle) = handle else {
        return FlowExit::NotStarted;
    };

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(Ok(_))) => FlowExit::Completed,
        Ok(Ok(Err(e))) => {
            info!("{} flow had ended with: {}", name, e);
            FlowExit::Failed(e.to_string())
        }
        Ok(Err(e)) => {
            error!("{} flow panicked: {}", name, e);
            FlowExit::Panicked
        }
        Err(_) => {
            warn!("{} flow did not stop within {:?}", name, timeout);
            FlowExit::TimedOut
        }
    }
}
