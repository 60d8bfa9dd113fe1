//! Headless presentation boundary
//!
//! Drains the notification channel on a fixed cadence, keeps a small view of
//! the arm (positions, holds, link and controller status, recent log) and
//! mirrors everything to tracing.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::axis::Axis;
use crate::link::telemetry::{ENCODER_AXES, ENCODER_COUNT};
use crate::notify::{ControllerStatus, LinkStatus, LogEntry, LogLevel, Notification};

const LOG_CAPACITY: usize = 200;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HoldView {
    pub enabled: bool,
    pub target: i32,
}

#[derive(Debug, Default)]
pub struct ArmView {
    pub positions: [Option<i32>; ENCODER_COUNT],
    pub holds: [HoldView; 7],
    pub controller: Option<ControllerStatus>,
    pub link: Option<LinkStatus>,
    pub hint: Option<String>,
    pub log: VecDeque<LogEntry>,
}

impl ArmView {
    pub fn hold(&self, axis: Axis) -> HoldView {
        self.holds[axis.index()]
    }

    pub fn position(&self, axis: Axis) -> Option<i32> {
        ENCODER_AXES
            .iter()
            .position(|&a| a == axis)
            .and_then(|i| self.positions[i])
    }

    pub fn apply(&mut self, notification: Notification) {
        match notification {
            Notification::StateChanged(t) => {
                self.holds[t.axis.index()] = HoldView {
                    enabled: t.enabled,
                    target: t.target,
                };
                info!(
                    "{} hold {} (target {})",
                    t.axis,
                    if t.enabled { "on" } else { "off" },
                    t.target
                );
            }
            Notification::Log(entry) => {
                let stamp = entry.at.format("%H:%M:%S.%3f");
                match entry.level {
                    LogLevel::Info => info!("[{}] {}", stamp, entry.message),
                    LogLevel::Warn => warn!("[{}] {}", stamp, entry.message),
                    LogLevel::Error => error!("[{}] {}", stamp, entry.message),
                }
                if self.log.len() == LOG_CAPACITY {
                    self.log.pop_front();
                }
                self.log.push_back(entry);
            }
            Notification::TelemetryUpdated(frame) => {
                // Keep the last known value for encoders missing from this frame
                for (slot, value) in self.positions.iter_mut().zip(frame.values()) {
                    if value.is_some() {
                        *slot = value;
                    }
                }
                trace!("Positions: {:?}", self.positions);
            }
            Notification::ButtonVisual { control, pressed } => {
                trace!("{:?} {}", control, if pressed { "down" } else { "up" });
            }
            Notification::StickVisual { stick, x, y } => {
                trace!("{:?} stick at ({:.2}, {:.2})", stick, x, y);
            }
            Notification::ControllerStatus(status) => {
                info!("Controller: {:?}", status);
                self.controller = Some(status);
            }
            Notification::LinkStatus(status) => {
                info!("Link: {:?}", status);
                self.link = Some(status);
            }
            Notification::ActionHint(hint) => {
                debug!("Action: {}", hint);
                self.hint = Some(hint);
            }
        }
    }
}

pub struct Presenter {
    receiver: mpsc::Receiver<Notification>,
    view: ArmView,
}

impl Presenter {
    pub fn new(receiver: mpsc::Receiver<Notification>) -> Self {
        Self {
            receiver,
            view: ArmView::default(),
        }
    }

    pub fn view(&self) -> &ArmView {
        &self.view
    }

    /// Applies everything queued right now, returns how many were applied
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(notification) = self.receiver.try_recv() {
            self.view.apply(notification);
            applied += 1;
        }
        applied
    }

    /// Drains every `cadence` until cancelled, with a final drain on exit
    pub async fn run(mut self, cadence: Duration, cancel: CancellationToken) -> ArmView {
        let mut ticker = interval(cadence);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.drain();
                }
            }
        }
        self.drain();
        self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::telemetry::decode_frame;
    use crate::notify::Notifier;
    use crate::state::Transition;

    #[test]
    fn view_tracks_holds_and_positions() {
        let (tx, rx) = mpsc::channel(16);
        let notifier = Notifier::new(tx);
        let mut presenter = Presenter::new(rx);

        notifier.send(Notification::StateChanged(Transition {
            axis: Axis::M3,
            enabled: true,
            target: 40,
        }));
        notifier.send(Notification::TelemetryUpdated(
            decode_frame("E1:1|E2:2|E3:3|E4:4|E5:5|E6:6").unwrap(),
        ));
        notifier.send(Notification::TelemetryUpdated(
            decode_frame("E1:10|E2:x").unwrap(),
        ));
        notifier.warn("careful");

        assert_eq!(presenter.drain(), 4);
        let view = presenter.view();
        assert_eq!(view.hold(Axis::M3), HoldView { enabled: true, target: 40 });
        assert_eq!(view.position(Axis::M1), Some(10));
        assert_eq!(view.position(Axis::M2), Some(2));
        assert_eq!(view.position(Axis::S3), Some(6));
        assert_eq!(view.position(Axis::S1), None);
        assert_eq!(view.log.len(), 1);
    }

    #[test]
    fn log_is_bounded() {
        let mut view = ArmView::default();
        let (tx, mut rx) = mpsc::channel(LOG_CAPACITY + 10);
        let notifier = Notifier::new(tx);
        for i in 0..LOG_CAPACITY + 10 {
            notifier.info(format!("line {}", i));
        }
        while let Ok(n) = rx.try_recv() {
            view.apply(n);
        }
        assert_eq!(view.log.len(), LOG_CAPACITY);
        assert_eq!(view.log.front().unwrap().message, "line 10");
    }

    #[tokio::test]
    async fn run_drains_until_cancelled() {
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let notifier = Notifier::new(tx);
        let task = tokio::spawn(Presenter::new(rx).run(Duration::from_millis(5), cancel.clone()));

        notifier.send(Notification::LinkStatus(LinkStatus::Disconnected));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let view = task.await.unwrap();
        assert_eq!(view.link, Some(LinkStatus::Disconnected));
    }
}
