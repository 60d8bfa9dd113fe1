//! Axis state shared between the control flow and the telemetry flow
//!
//! [`SharedAxisState`] holds one slot of atomics per axis. The telemetry flow
//! only stores positions, the control flow only stores `enabled`/`target`.
//! Slightly stale reads are fine because the control loop re-evaluates every
//! tick; the atomics rule out torn values.
//!
//! [`AxisTable`] is owned by the control flow. It layers the hold-mode
//! operations on top of the shared slots and keeps one PID per holdable axis.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::axis::Axis;
use crate::config::PidConfig;
use crate::notify::{Notification, Notifier};
use crate::pid::PidController;

#[derive(Debug, Default)]
struct AxisSlot {
    enabled: AtomicBool,
    target: AtomicI32,
    position: AtomicI32,
}

/// Point-in-time copy of one axis slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct AxisSnapshot {
    pub enabled: bool,
    pub target: i32,
    pub position: i32,
}

#[derive(Debug, Default)]
pub struct SharedAxisState {
    slots: [AxisSlot; 7],
}

impl SharedAxisState {
    /// Every axis starts disabled with target and position 0
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, axis: Axis) -> &AxisSlot {
        &self.slots[axis.index()]
    }

    pub fn position(&self, axis: Axis) -> i32 {
        self.slot(axis).position.load(Ordering::Acquire)
    }

    pub fn set_position(&self, axis: Axis, position: i32) {
        self.slot(axis).position.store(position, Ordering::Release);
    }

    pub fn is_enabled(&self, axis: Axis) -> bool {
        self.slot(axis).enabled.load(Ordering::Acquire)
    }

    pub fn target(&self, axis: Axis) -> i32 {
        self.slot(axis).target.load(Ordering::Acquire)
    }

    pub fn snapshot(&self, axis: Axis) -> AxisSnapshot {
        AxisSnapshot {
            enabled: self.is_enabled(axis),
            target: self.target(axis),
            position: self.position(axis),
        }
    }

    fn set_mode(&self, axis: Axis, enabled: bool, target: i32) {
        let slot = self.slot(axis);
        // Target first so a reader that sees `enabled` also sees its target
        slot.target.store(target, Ordering::Release);
        slot.enabled.store(enabled, Ordering::Release);
    }
}

/// Observable result of a mode change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub axis: Axis,
    pub enabled: bool,
    pub target: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HoldPoint {
    StoredTarget,
    Zero,
    CurrentPosition,
}

pub struct AxisTable {
    shared: Arc<SharedAxisState>,
    pids: HashMap<Axis, PidController>,
    zero_mode: bool,
    notifier: Notifier,
}

impl AxisTable {
    pub fn new(shared: Arc<SharedAxisState>, pid_config: &PidConfig, notifier: Notifier) -> Self {
        let pids = Axis::HOLDABLE
            .iter()
            .filter_map(|&axis| {
                pid_config
                    .gains(axis)
                    .map(|gains| (axis, PidController::new(gains, pid_config.limits())))
            })
            .collect();

        Self {
            shared,
            pids,
            zero_mode: false,
            notifier,
        }
    }

    pub fn shared(&self) -> &Arc<SharedAxisState> {
        &self.shared
    }

    pub fn snapshot(&self, axis: Axis) -> AxisSnapshot {
        self.shared.snapshot(axis)
    }

    pub fn zero_mode_active(&self) -> bool {
        self.zero_mode
    }

    /// Flips hold mode, keeping the stored target when enabling
    pub fn toggle_hold(&mut self, axis: Axis) -> Option<Transition> {
        self.toggle(axis, HoldPoint::StoredTarget)
    }

    /// Flips hold mode, forcing the target to 0 when enabling
    pub fn toggle_hold_reset_to_zero(&mut self, axis: Axis) -> Option<Transition> {
        self.toggle(axis, HoldPoint::Zero)
    }

    /// Flips hold mode, capturing the present position as the hold point
    pub fn toggle_hold_at_current_position(&mut self, axis: Axis) -> Option<Transition> {
        self.toggle(axis, HoldPoint::CurrentPosition)
    }

    /// Flips the global zero mode
    ///
    /// Activating enables every holdable axis at target 0, deactivating
    /// disables all of them. Axes already in the requested state are left
    /// alone so their PIDs are not reset.
    pub fn global_zero_toggle(&mut self) -> Vec<Transition> {
        self.zero_mode = !self.zero_mode;
        let enable = self.zero_mode;

        if enable {
            info!("Global reset: driving all holdable axes to zero");
            self.notifier.info("Global reset: driving all axes to zero");
        } else {
            info!("Global reset released: disabling all holds");
            self.notifier.info("Global reset released: all holds disabled");
        }

        let mut transitions = Vec::new();
        for axis in Axis::HOLDABLE {
            let current = self.shared.snapshot(axis);
            if current.enabled == enable {
                continue;
            }
            let transition = Transition {
                axis,
                enabled: enable,
                target: if enable { 0 } else { current.target },
            };
            self.apply(transition);
            transitions.push(transition);
        }
        transitions
    }

    /// Runs the PID of a holdable axis against its latest position
    pub fn hold_output(&mut self, axis: Axis, now: Instant) -> Option<f64> {
        let position = self.shared.position(axis);
        self.pids
            .get_mut(&axis)
            .map(|pid| pid.update_at(f64::from(position), now))
    }

    fn toggle(&mut self, axis: Axis, hold_point: HoldPoint) -> Option<Transition> {
        if !axis.is_holdable() || !self.pids.contains_key(&axis) {
            warn!("Ignoring hold toggle for {}: axis has no hold mode", axis);
            return None;
        }

        let current = self.shared.snapshot(axis);
        let transition = if current.enabled {
            Transition {
                axis,
                enabled: false,
                target: current.target,
            }
        } else {
            let target = match hold_point {
                HoldPoint::StoredTarget => current.target,
                HoldPoint::Zero => 0,
                HoldPoint::CurrentPosition => current.position,
            };
            Transition {
                axis,
                enabled: true,
                target,
            }
        };

        self.apply(transition);

        let message = match (transition.enabled, hold_point) {
            (false, _) => format!("{} hold disabled, back to joystick control", axis),
            (true, HoldPoint::Zero) => format!("{} hold enabled, returning to 0", axis),
            (true, HoldPoint::CurrentPosition) => {
                format!("{} holding position {}", axis, transition.target)
            }
            (true, HoldPoint::StoredTarget) => {
                format!("{} hold enabled at {}", axis, transition.target)
            }
        };
        info!("{}", message);
        self.notifier.info(message);

        Some(transition)
    }

    fn apply(&mut self, transition: Transition) {
        self.shared
            .set_mode(transition.axis, transition.enabled, transition.target);

        if transition.enabled {
            if let Some(pid) = self.pids.get_mut(&transition.axis) {
                pid.set_setpoint(f64::from(transition.target));
                debug!(
                    "PID for {} primed at setpoint {}",
                    transition.axis, transition.target
                );
            }
        }

        self.notifier.send(Notification::StateChanged(transition));
    }
}
