//! Per-tick command resolution and deduplicated writes
//!
//! Order within one tick:
//!
//! 1. explicit stop for every axis whose hold was just released
//! 2. PID-driven commands for every axis in hold mode
//! 3. manual drives from the sticks and bumpers
//!
//! Every write goes through [`CommandDispatcher::send_if_changed`], so a
//! command identical to the last one written on its channel is skipped.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info};

use crate::axis::Axis;
use crate::config::HoldConfig;
use crate::controller::{ExclusivePair, ManualDrive, TickIntent};
use crate::link::command::Command;
use crate::link::serial::SerialLink;
use crate::state::{AxisSnapshot, AxisTable};

pub struct CommandDispatcher {
    link: SerialLink,
    hold: HoldConfig,
    last_sent: HashMap<Axis, Command>,
}

impl CommandDispatcher {
    pub fn new(link: SerialLink, hold: HoldConfig) -> Self {
        Self {
            link,
            hold,
            last_sent: HashMap::new(),
        }
    }

    pub fn last_sent(&self, axis: Axis) -> Option<Command> {
        self.last_sent.get(&axis).copied()
    }

    /// Writes `command` unless it equals the last one written on its channel
    ///
    /// The command is remembered only once it actually reached the port.
    pub fn send_if_changed(&mut self, command: Command) -> bool {
        if self.last_sent.get(&command.axis) == Some(&command) {
            return false;
        }
        if !self.link.send(&command) {
            return false;
        }
        self.last_sent.insert(command.axis, command);
        true
    }

    /// Resolves a PID output into a motor command
    pub fn hold_command(&self, axis: Axis, output: f64, snapshot: AxisSnapshot) -> Command {
        let error = (i64::from(snapshot.target) - i64::from(snapshot.position)).abs();
        if error <= i64::from(self.hold.deadband) {
            return Command::stop(axis);
        }

        // Truncated, not rounded
        let speed = output.abs().min(f64::from(u8::MAX)) as u8;
        if speed == 0 {
            return Command::stop(axis);
        }

        let forward = (output > 0.0) != self.hold.is_inverted(axis);
        if forward {
            Command::forward(axis, speed)
        } else {
            Command::backward(axis, speed)
        }
    }

    /// Runs one tick, returns the number of lines written
    pub fn dispatch(&mut self, table: &mut AxisTable, intent: &TickIntent, now: Instant) -> usize {
        let mut written = 0;

        for transition in intent.transitions.iter().filter(|t| !t.enabled) {
            written += usize::from(self.send_if_changed(Command::stop(transition.axis)));
        }

        for axis in Axis::HOLDABLE {
            let snapshot = table.snapshot(axis);
            if !snapshot.enabled {
                continue;
            }
            let output = table.hold_output(axis, now).unwrap_or(0.0);
            let command = self.hold_command(axis, output, snapshot);
            debug!(
                "Hold {}: target {} position {} output {:.1} -> {:?}",
                axis, snapshot.target, snapshot.position, output, command
            );
            written += usize::from(self.send_if_changed(command));
        }

        for drive in &intent.manual {
            written += match *drive {
                ManualDrive::Single(command) => usize::from(self.send_if_changed(command)),
                ManualDrive::Exclusive { pair, active } => self.drive_exclusive(pair, active),
            };
        }

        written
    }

    fn drive_exclusive(&mut self, pair: ExclusivePair, active: Option<Command>) -> usize {
        let mut written = 0;
        match active {
            Some(command) => {
                if let Some(partner) = pair.partner(command.axis) {
                    written += usize::from(self.send_if_changed(Command::stop(partner)));
                }
                written += usize::from(self.send_if_changed(command));
            }
            None => {
                for axis in pair.members() {
                    written += usize::from(self.send_if_changed(Command::stop(axis)));
                }
            }
        }
        written
    }

    /// Stops every axis whose last command was not a stop
    pub fn park(&mut self) -> usize {
        let moving: Vec<Axis> = Axis::ALL
            .into_iter()
            .filter(|axis| self.last_sent.get(axis).is_some_and(|c| !c.is_stop()))
            .collect();

        if !moving.is_empty() {
            info!("Stopping {} moving axes", moving.len());
        }
        moving
            .into_iter()
            .map(|axis| usize::from(self.send_if_changed(Command::stop(axis))))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PidConfig;
    use crate::notify::Notifier;
    use crate::state::{SharedAxisState, Transition};
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[derive(Clone, Default)]
    struct Wire(Arc<Mutex<Vec<u8>>>);

    impl Wire {
        fn take_lines(&self) -> Vec<String> {
            let bytes = std::mem::take(&mut *self.0.lock().unwrap());
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl Write for Wire {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn dispatcher() -> (CommandDispatcher, Wire) {
        let wire = Wire::default();
        let link = SerialLink::new(
            Box::new(wire.clone()),
            CancellationToken::new(),
            Notifier::disabled(),
        );
        (CommandDispatcher::new(link, HoldConfig::default()), wire)
    }

    fn table() -> AxisTable {
        AxisTable::new(
            Arc::new(SharedAxisState::new()),
            &PidConfig::default(),
            Notifier::disabled(),
        )
    }

    fn held(target: i32, position: i32) -> AxisSnapshot {
        AxisSnapshot {
            enabled: true,
            target,
            position,
        }
    }

    #[test]
    fn identical_command_is_written_once() {
        let (mut dispatcher, wire) = dispatcher();
        assert!(dispatcher.send_if_changed(Command::forward(Axis::M1, 100)));
        assert!(!dispatcher.send_if_changed(Command::forward(Axis::M1, 100)));
        assert!(dispatcher.send_if_changed(Command::forward(Axis::M1, 101)));
        assert!(dispatcher.send_if_changed(Command::forward(Axis::M2, 100)));
        assert_eq!(wire.take_lines(), vec!["1:f:100", "1:f:101", "2:f:100"]);
    }

    #[test]
    fn failed_write_is_not_remembered() {
        let link = SerialLink::closed(CancellationToken::new(), Notifier::disabled());
        let mut dispatcher = CommandDispatcher::new(link, HoldConfig::default());
        assert!(!dispatcher.send_if_changed(Command::stop(Axis::M3)));
        assert_eq!(dispatcher.last_sent(Axis::M3), None);
    }

    #[test]
    fn hold_inside_deadband_stops() {
        let (dispatcher, _) = dispatcher();
        assert_eq!(
            dispatcher.hold_command(Axis::M1, 40.0, held(100, 95)),
            Command::stop(Axis::M1)
        );
        assert_eq!(
            dispatcher.hold_command(Axis::M1, 40.0, held(100, 106)),
            Command::forward(Axis::M1, 40)
        );
    }

    #[test]
    fn hold_direction_respects_inversion() {
        let (dispatcher, _) = dispatcher();
        assert_eq!(
            dispatcher.hold_command(Axis::M2, 60.15, held(100, 0)),
            Command::forward(Axis::M2, 60)
        );
        assert_eq!(
            dispatcher.hold_command(Axis::M2, -60.15, held(0, 100)),
            Command::backward(Axis::M2, 60)
        );
        assert_eq!(
            dispatcher.hold_command(Axis::S2, 60.15, held(100, 0)),
            Command::backward(Axis::S2, 60)
        );
        assert_eq!(
            dispatcher.hold_command(Axis::S3, -300.0, held(0, 100)),
            Command::forward(Axis::S3, 255)
        );
    }

    #[test]
    fn tiny_output_becomes_stop() {
        let (dispatcher, _) = dispatcher();
        assert_eq!(
            dispatcher.hold_command(Axis::M4, 0.7, held(50, 0)),
            Command::stop(Axis::M4)
        );
    }

    #[test]
    fn released_hold_sends_stop() {
        let (mut dispatcher, wire) = dispatcher();
        let mut table = table();
        dispatcher.send_if_changed(Command::forward(Axis::M3, 90));
        wire.take_lines();

        let intent = TickIntent {
            transitions: vec![Transition {
                axis: Axis::M3,
                enabled: false,
                target: 10,
            }],
            manual: Vec::new(),
        };
        assert_eq!(dispatcher.dispatch(&mut table, &intent, Instant::now()), 1);
        assert_eq!(wire.take_lines(), vec!["3:s:0"]);
    }

    #[test]
    fn exclusive_switch_stops_partner_first() {
        let (mut dispatcher, wire) = dispatcher();
        let mut table = table();
        let pair = ExclusivePair::LOWER_LINK;
        let tick = |active| TickIntent {
            transitions: Vec::new(),
            manual: vec![ManualDrive::Exclusive { pair, active }],
        };
        let now = Instant::now();

        dispatcher.dispatch(&mut table, &tick(Some(Command::forward(Axis::M3, 200))), now);
        assert_eq!(wire.take_lines(), vec!["7:s:0", "3:f:200"]);

        dispatcher.dispatch(&mut table, &tick(Some(Command::forward(Axis::S3, 150))), now);
        assert_eq!(wire.take_lines(), vec!["3:s:0", "7:f:150"]);

        dispatcher.dispatch(&mut table, &tick(None), now);
        assert_eq!(wire.take_lines(), vec!["7:s:0"]);
    }

    #[test]
    fn holding_axis_is_driven_by_its_pid() {
        let (mut dispatcher, wire) = dispatcher();
        let mut table = table();
        let t0 = Instant::now();

        table.shared().set_position(Axis::M2, 100);
        let transition = table.toggle_hold_reset_to_zero(Axis::M2).unwrap();
        let intent = TickIntent {
            transitions: vec![transition],
            manual: Vec::new(),
        };

        // First update only primes the PID
        dispatcher.dispatch(&mut table, &intent, t0);
        assert_eq!(wire.take_lines(), vec!["2:s:0"]);

        dispatcher.dispatch(&mut table, &TickIntent::default(), t0 + Duration::from_millis(20));
        let lines = wire.take_lines();
        assert_eq!(lines.len(), 1);
        let command: Command = lines[0].parse().unwrap();
        assert_eq!(command.axis, Axis::M2);
        assert_eq!(command.direction, crate::link::command::Direction::Backward);
        assert!(command.speed > 0);
    }

    #[test]
    fn park_stops_only_moving_axes() {
        let (mut dispatcher, wire) = dispatcher();
        dispatcher.send_if_changed(Command::forward(Axis::M1, 10));
        dispatcher.send_if_changed(Command::stop(Axis::M2));
        dispatcher.send_if_changed(Command::backward(Axis::S1, 255));
        wire.take_lines();

        assert_eq!(dispatcher.park(), 2);
        assert_eq!(wire.take_lines(), vec!["1:s:0", "5:s:0"]);
        assert_eq!(dispatcher.park(), 0);
    }
}
