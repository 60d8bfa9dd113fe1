//! Debounce guard for discrete controls
//!
//! Policy data lives in a [`DebounceTable`] keyed by control identity, so the
//! windows can be tested separately from the bindings that consume them.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::DebounceWindows;
use crate::controller::{Control, ControlClass};

/// Minimum interval between accepted presses, per control
#[derive(Clone, Debug, Default)]
pub struct DebounceTable {
    windows: HashMap<Control, Duration>,
}

impl DebounceTable {
    /// Builds the per-control table from the per-class configuration
    pub fn from_windows(windows: &DebounceWindows) -> Self {
        let windows = Control::ALL
            .iter()
            .filter_map(|&control| {
                let ms = match control.class() {
                    ControlClass::FaceButton => windows.face_button_ms,
                    ControlClass::StickClick => windows.stick_click_ms,
                    ControlClass::DPad => windows.dpad_ms,
                    ControlClass::GlobalReset => windows.global_reset_ms,
                    ControlClass::Bumper => return None,
                };
                Some((control, Duration::from_millis(ms)))
            })
            .collect();
        Self { windows }
    }

    pub fn with_window(mut self, control: Control, window: Duration) -> Self {
        self.windows.insert(control, window);
        self
    }

    pub fn window(&self, control: Control) -> Option<Duration> {
        self.windows.get(&control).copied()
    }
}

#[derive(Clone, Debug, Default)]
pub struct DebounceGuard {
    table: DebounceTable,
    last_fired: HashMap<Control, Instant>,
}

impl DebounceGuard {
    pub fn new(table: DebounceTable) -> Self {
        Self {
            table,
            last_fired: HashMap::new(),
        }
    }

    /// Returns true and records `now` iff the control's window has elapsed
    ///
    /// A control that never fired always passes. A refused attempt does not
    /// move the stored timestamp. Controls without a window always pass.
    pub fn try_fire(&mut self, control: Control, now: Instant) -> bool {
        let Some(window) = self.table.window(control) else {
            return true;
        };

        if let Some(last) = self.last_fired.get(&control) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed <= window {
                debug!(
                    "Debounced {:?}: {}ms since last trigger (window {}ms)",
                    control,
                    elapsed.as_millis(),
                    window.as_millis()
                );
                return false;
            }
        }

        self.last_fired.insert(control, now);
        true
    }
}
