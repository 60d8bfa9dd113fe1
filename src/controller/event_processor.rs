//! Turns one tick of gamepad input into hold-mode transitions and manual drives
//!
//! Discrete presses go through the debounce guard and toggle hold modes on the
//! [`AxisTable`]. Continuous inputs become velocity commands for axes that are
//! not holding. Nothing is written to the port here; the dispatcher does that.

use std::time::Instant;

use tracing::debug;

use crate::axis::Axis;
use crate::config::{InputConfig, StickDeadzones};
use crate::controller::event_collector::{
    ButtonState, Control, InputFrame, Stick, StickChannel, StickSnapshot,
};
use crate::debounce::{DebounceGuard, DebounceTable};
use crate::link::command::{Command, Direction};
use crate::notify::{Notification, Notifier};
use crate::state::{AxisTable, Transition};

/// Two axes driven by one stick channel; at most one of them moves
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExclusivePair {
    /// Driven by negative deflection
    pub negative: Axis,
    /// Driven by positive deflection
    pub positive: Axis,
}

impl ExclusivePair {
    /// Left stick X
    pub const END_EFFECTOR: ExclusivePair = ExclusivePair {
        negative: Axis::M4,
        positive: Axis::S2,
    };

    /// Right stick X
    pub const LOWER_LINK: ExclusivePair = ExclusivePair {
        negative: Axis::M3,
        positive: Axis::S3,
    };

    pub fn members(&self) -> [Axis; 2] {
        [self.negative, self.positive]
    }

    pub fn partner(&self, axis: Axis) -> Option<Axis> {
        if axis == self.negative {
            Some(self.positive)
        } else if axis == self.positive {
            Some(self.negative)
        } else {
            None
        }
    }
}

/// Manual intent for one tick, in dispatch order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManualDrive {
    Single(Command),
    /// `active == None` means the stick is neutral and both members stop
    Exclusive {
        pair: ExclusivePair,
        active: Option<Command>,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickIntent {
    pub transitions: Vec<Transition>,
    pub manual: Vec<ManualDrive>,
}

/// What a discrete control does when it fires
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    HoldAtCurrent(Axis),
    HoldResetToZero(Axis),
    GlobalZero,
}

impl Binding {
    pub fn for_control(control: Control) -> Option<Binding> {
        match control {
            Control::A => Some(Binding::HoldAtCurrent(Axis::M1)),
            Control::B => Some(Binding::HoldAtCurrent(Axis::S3)),
            Control::X => Some(Binding::HoldAtCurrent(Axis::M3)),
            Control::Y => Some(Binding::HoldAtCurrent(Axis::M2)),
            Control::LeftStick => Some(Binding::HoldResetToZero(Axis::M1)),
            Control::RightStick => Some(Binding::HoldResetToZero(Axis::M2)),
            Control::DPadRight => Some(Binding::HoldResetToZero(Axis::S2)),
            Control::DPadLeft => Some(Binding::HoldResetToZero(Axis::M4)),
            Control::DPadUp => Some(Binding::HoldResetToZero(Axis::S3)),
            Control::DPadDown => Some(Binding::HoldResetToZero(Axis::M3)),
            Control::Back => Some(Binding::GlobalZero),
            // Bumpers are read continuously from the snapshot
            Control::LeftBumper | Control::RightBumper => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Binding::HoldAtCurrent(axis) => format!("{}: toggle hold here", axis.description()),
            Binding::HoldResetToZero(axis) => {
                format!("{}: toggle return to zero", axis.description())
            }
            Binding::GlobalZero => "Global reset: all axes to zero".to_string(),
        }
    }

    fn apply(&self, table: &mut AxisTable) -> Vec<Transition> {
        match *self {
            Binding::HoldAtCurrent(axis) => table
                .toggle_hold_at_current_position(axis)
                .into_iter()
                .collect(),
            Binding::HoldResetToZero(axis) => {
                table.toggle_hold_reset_to_zero(axis).into_iter().collect()
            }
            Binding::GlobalZero => table.global_zero_toggle(),
        }
    }
}

/// Deflection magnitude to wire speed, `round(|v| * 255)`
pub fn speed_from_deflection(value: f32) -> u8 {
    (value.abs().min(1.0) * 255.0).round() as u8
}

/// Velocity command for a single stick channel
pub fn velocity_command(axis: Axis, value: f32, deadzone: f32) -> Command {
    if value.abs() <= deadzone {
        Command::stop(axis)
    } else if value > 0.0 {
        Command::forward(axis, speed_from_deflection(value))
    } else {
        Command::backward(axis, speed_from_deflection(value))
    }
}

/// Picks the active member of a pair; the active member always drives forward
pub fn exclusive_command(pair: ExclusivePair, value: f32, deadzone: f32) -> Option<Command> {
    if value.abs() <= deadzone {
        return None;
    }
    let axis = if value < 0.0 {
        pair.negative
    } else {
        pair.positive
    };
    Some(Command::forward(axis, speed_from_deflection(value)))
}

/// LB drives the actuator forward, RB backward, LB wins when both are held
pub fn bumper_command(sticks: &StickSnapshot) -> Command {
    if sticks.left_bumper {
        Command::forward(Axis::S1, u8::MAX)
    } else if sticks.right_bumper {
        Command::backward(Axis::S1, u8::MAX)
    } else {
        Command::stop(Axis::S1)
    }
}

pub struct InputProcessor {
    debounce: DebounceGuard,
    deadzones: StickDeadzones,
    notifier: Notifier,
    last_hint: Option<String>,
}

impl InputProcessor {
    pub fn new(config: &InputConfig, notifier: Notifier) -> Self {
        Self::with_guard(
            DebounceGuard::new(DebounceTable::from_windows(&config.debounce)),
            config.deadzones,
            notifier,
        )
    }

    pub fn with_guard(debounce: DebounceGuard, deadzones: StickDeadzones, notifier: Notifier) -> Self {
        Self {
            debounce,
            deadzones,
            notifier,
            last_hint: None,
        }
    }

    pub fn process(&mut self, frame: &InputFrame, now: Instant, table: &mut AxisTable) -> TickIntent {
        let mut intent = TickIntent::default();

        for event in &frame.events {
            let pressed = event.state == ButtonState::Pressed;
            self.notifier.send(Notification::ButtonVisual {
                control: event.control,
                pressed,
            });
            if !pressed {
                continue;
            }

            let Some(binding) = Binding::for_control(event.control) else {
                continue;
            };
            if !self.debounce.try_fire(event.control, now) {
                continue;
            }

            debug!("{:?} fired {:?}", event.control, binding);
            intent.transitions.extend(binding.apply(table));
            self.hint(binding.describe());
        }

        let sticks = &frame.sticks;
        self.notifier.send(Notification::StickVisual {
            stick: Stick::Left,
            x: sticks.left_x,
            y: sticks.left_y,
        });
        self.notifier.send(Notification::StickVisual {
            stick: Stick::Right,
            x: sticks.right_x,
            y: sticks.right_y,
        });

        intent.manual = self.manual_drives(sticks, table);
        intent
    }

    fn manual_drives(&mut self, sticks: &StickSnapshot, table: &AxisTable) -> Vec<ManualDrive> {
        let holding = |axis: Axis| table.snapshot(axis).enabled;
        let mut drives = Vec::with_capacity(5);

        let lanes = [
            (Axis::M1, StickChannel::LeftY, ExclusivePair::END_EFFECTOR, StickChannel::LeftX),
            (Axis::M2, StickChannel::RightY, ExclusivePair::LOWER_LINK, StickChannel::RightX),
        ];

        for (single, single_channel, pair, pair_channel) in lanes {
            if !holding(single) {
                let command = velocity_command(
                    single,
                    sticks.channel(single_channel),
                    self.deadzones.get(single_channel),
                );
                if !command.is_stop() {
                    self.hint(format!("{}: {}", single.description(), motion(&command)));
                }
                drives.push(ManualDrive::Single(command));
            }

            if pair.members().iter().any(|&axis| holding(axis)) {
                // The free member must not keep a stale drive
                for axis in pair.members().into_iter().filter(|&a| !holding(a)) {
                    drives.push(ManualDrive::Single(Command::stop(axis)));
                }
            } else {
                let active = exclusive_command(
                    pair,
                    sticks.channel(pair_channel),
                    self.deadzones.get(pair_channel),
                );
                if let Some(command) = &active {
                    self.hint(format!("{}: moving", command.axis.description()));
                }
                drives.push(ManualDrive::Exclusive { pair, active });
            }
        }

        let bumpers = bumper_command(sticks);
        if !bumpers.is_stop() {
            self.hint(format!("{}: {}", Axis::S1.description(), motion(&bumpers)));
        }
        drives.push(ManualDrive::Single(bumpers));

        drives
    }

    // Only announces changes, the loop runs at 50 Hz
    fn hint(&mut self, text: String) {
        if self.last_hint.as_deref() == Some(text.as_str()) {
            return;
        }
        self.notifier.send(Notification::ActionHint(text.clone()));
        self.last_hint = Some(text);
    }
}

fn motion(command: &Command) -> &'static str {
    match command.direction {
        Direction::Forward => "forward",
        Direction::Backward => "backward",
        Direction::Stop => "stopped",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InputConfig, PidConfig};
    use crate::controller::event_collector::PadEvent;
    use crate::state::SharedAxisState;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn table() -> AxisTable {
        AxisTable::new(
            Arc::new(SharedAxisState::new()),
            &PidConfig::default(),
            Notifier::disabled(),
        )
    }

    fn processor() -> InputProcessor {
        InputProcessor::new(&InputConfig::default(), Notifier::disabled())
    }

    fn sticks(left_x: f32, left_y: f32, right_x: f32, right_y: f32) -> StickSnapshot {
        StickSnapshot {
            left_x,
            left_y,
            right_x,
            right_y,
            ..Default::default()
        }
    }

    fn frame(events: Vec<PadEvent>, sticks: StickSnapshot) -> InputFrame {
        InputFrame { events, sticks }
    }

    #[test]
    fn deadzone_boundary_is_neutral() {
        assert_eq!(velocity_command(Axis::M1, 0.15, 0.15), Command::stop(Axis::M1));
        assert_eq!(velocity_command(Axis::M1, -0.10, 0.15), Command::stop(Axis::M1));
        assert_eq!(
            velocity_command(Axis::M1, 0.5, 0.15),
            Command::forward(Axis::M1, 128)
        );
        assert_eq!(
            velocity_command(Axis::M2, -1.0, 0.15),
            Command::backward(Axis::M2, 255)
        );
    }

    #[test]
    fn exclusive_pair_picks_member_by_sign() {
        let pair = ExclusivePair::END_EFFECTOR;
        assert_eq!(
            exclusive_command(pair, -0.6, 0.15),
            Some(Command::forward(Axis::M4, 153))
        );
        assert_eq!(
            exclusive_command(pair, 0.6, 0.15),
            Some(Command::forward(Axis::S2, 153))
        );
        assert_eq!(exclusive_command(pair, 0.1, 0.15), None);
        assert_eq!(pair.partner(Axis::S2), Some(Axis::M4));
        assert_eq!(pair.partner(Axis::M1), None);
    }

    #[test]
    fn left_bumper_wins() {
        let mut s = StickSnapshot::default();
        assert_eq!(bumper_command(&s), Command::stop(Axis::S1));
        s.right_bumper = true;
        assert_eq!(bumper_command(&s), Command::backward(Axis::S1, 255));
        s.left_bumper = true;
        assert_eq!(bumper_command(&s), Command::forward(Axis::S1, 255));
    }

    #[test]
    fn neutral_tick_drives_every_free_lane() {
        let mut table = table();
        let intent = processor().process(&InputFrame::default(), Instant::now(), &mut table);

        assert!(intent.transitions.is_empty());
        assert_eq!(
            intent.manual,
            vec![
                ManualDrive::Single(Command::stop(Axis::M1)),
                ManualDrive::Exclusive {
                    pair: ExclusivePair::END_EFFECTOR,
                    active: None
                },
                ManualDrive::Single(Command::stop(Axis::M2)),
                ManualDrive::Exclusive {
                    pair: ExclusivePair::LOWER_LINK,
                    active: None
                },
                ManualDrive::Single(Command::stop(Axis::S1)),
            ]
        );
    }

    #[test]
    fn holding_member_disables_its_pair() {
        let mut table = table();
        let mut processor = processor();
        let now = Instant::now();

        // D-pad right: S2 returns to zero
        let intent = processor.process(
            &frame(vec![PadEvent::pressed(Control::DPadRight)], sticks(-0.9, 0.0, 0.0, 0.0)),
            now,
            &mut table,
        );
        assert_eq!(intent.transitions.len(), 1);
        assert!(table.snapshot(Axis::S2).enabled);
        assert!(intent
            .manual
            .contains(&ManualDrive::Single(Command::stop(Axis::M4))));
        assert!(!intent.manual.iter().any(|d| matches!(
            d,
            ManualDrive::Exclusive {
                pair: ExclusivePair::END_EFFECTOR,
                ..
            }
        )));
    }

    #[test]
    fn holding_axis_gets_no_manual_command() {
        let mut table = table();
        let mut processor = processor();

        let intent = processor.process(
            &frame(vec![PadEvent::pressed(Control::A)], sticks(0.0, 0.8, 0.0, 0.0)),
            Instant::now(),
            &mut table,
        );
        assert_eq!(
            intent.transitions,
            vec![Transition {
                axis: Axis::M1,
                enabled: true,
                target: 0
            }]
        );
        assert!(!intent
            .manual
            .iter()
            .any(|d| matches!(d, ManualDrive::Single(c) if c.axis == Axis::M1)));
    }

    #[test]
    fn bounce_inside_window_is_ignored() {
        let mut table = table();
        let mut processor = processor();
        let t = Instant::now();
        let press = || frame(vec![PadEvent::pressed(Control::Y)], StickSnapshot::default());

        assert_eq!(processor.process(&press(), t, &mut table).transitions.len(), 1);
        assert!(processor
            .process(&press(), t + Duration::from_millis(100), &mut table)
            .transitions
            .is_empty());
        assert!(table.snapshot(Axis::M2).enabled);

        let off = processor.process(&press(), t + Duration::from_millis(400), &mut table);
        assert_eq!(off.transitions.len(), 1);
        assert!(!table.snapshot(Axis::M2).enabled);
    }

    #[test]
    fn releases_only_update_visuals() {
        let (tx, mut rx) = mpsc::channel(32);
        let mut processor = InputProcessor::new(&InputConfig::default(), Notifier::new(tx));
        let mut table = table();

        let intent = processor.process(
            &frame(vec![PadEvent::released(Control::B)], StickSnapshot::default()),
            Instant::now(),
            &mut table,
        );
        assert!(intent.transitions.is_empty());

        let mut buttons = 0;
        let mut sticks = 0;
        while let Ok(n) = rx.try_recv() {
            match n {
                Notification::ButtonVisual { control, pressed } => {
                    assert_eq!(control, Control::B);
                    assert!(!pressed);
                    buttons += 1;
                }
                Notification::StickVisual { .. } => sticks += 1,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!((buttons, sticks), (1, 2));
    }

    #[test]
    fn back_toggles_global_zero() {
        let mut table = table();
        let mut processor = processor();

        let intent = processor.process(
            &frame(vec![PadEvent::pressed(Control::Back)], StickSnapshot::default()),
            Instant::now(),
            &mut table,
        );
        assert_eq!(intent.transitions.len(), 6);
        assert!(table.zero_mode_active());
        // Only the actuator is left for manual control
        assert_eq!(
            intent.manual,
            vec![ManualDrive::Single(Command::stop(Axis::S1))]
        );
    }
}
