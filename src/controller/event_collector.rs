use chrono::{DateTime, Local};
use gilrs::{Axis as PadAxis, Button, Event, EventType, GamepadId, Gilrs};
use serde::{Deserialize, Serialize};
use statum::{machine, state};
use tracing::{debug, info, warn};

// Discrete controls the arm reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Control {
    A,
    B,
    X,
    Y,
    LeftStick,
    RightStick,
    Back,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    LeftBumper,
    RightBumper,
}

// Debounce class of a control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlClass {
    FaceButton,
    StickClick,
    DPad,
    GlobalReset,
    Bumper,
}

impl Control {
    pub const ALL: [Control; 13] = [
        Control::A,
        Control::B,
        Control::X,
        Control::Y,
        Control::LeftStick,
        Control::RightStick,
        Control::Back,
        Control::DPadUp,
        Control::DPadDown,
        Control::DPadLeft,
        Control::DPadRight,
        Control::LeftBumper,
        Control::RightBumper,
    ];

    pub fn class(self) -> ControlClass {
        match self {
            Control::A | Control::B | Control::X | Control::Y => ControlClass::FaceButton,
            Control::LeftStick | Control::RightStick => ControlClass::StickClick,
            Control::DPadUp | Control::DPadDown | Control::DPadLeft | Control::DPadRight => {
                ControlClass::DPad
            }
            Control::Back => ControlClass::GlobalReset,
            Control::LeftBumper | Control::RightBumper => ControlClass::Bumper,
        }
    }
}

// Stick identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stick {
    Left,
    Right,
}

// One scalar channel of a stick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StickChannel {
    LeftX,
    LeftY,
    RightX,
    RightY,
}

// Button state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonState {
    Pressed,
    Released,
}

// Discrete edge with the wall-clock time it was seen
#[derive(Debug, Clone)]
pub struct PadEvent {
    pub control: Control,
    pub state: ButtonState,
    pub timestamp: DateTime<Local>,
}

impl PadEvent {
    pub fn pressed(control: Control) -> Self {
        Self {
            control,
            state: ButtonState::Pressed,
            timestamp: Local::now(),
        }
    }

    pub fn released(control: Control) -> Self {
        Self {
            control,
            state: ButtonState::Released,
            timestamp: Local::now(),
        }
    }
}

// Continuous inputs sampled once per tick; positive Y is up
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StickSnapshot {
    pub left_x: f32,
    pub left_y: f32,
    pub right_x: f32,
    pub right_y: f32,
    pub left_bumper: bool,
    pub right_bumper: bool,
}

impl StickSnapshot {
    pub fn channel(&self, channel: StickChannel) -> f32 {
        match channel {
            StickChannel::LeftX => self.left_x,
            StickChannel::LeftY => self.left_y,
            StickChannel::RightX => self.right_x,
            StickChannel::RightY => self.right_y,
        }
    }
}

// Everything the input device produced since the previous tick
#[derive(Debug, Clone, Default)]
pub struct InputFrame {
    pub events: Vec<PadEvent>,
    pub sticks: StickSnapshot,
}

// Collector errors
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),

    #[error("No gamepad connected: {0}")]
    NoGamepadError(String),

    #[error("Failed to collect events: {0}")]
    EventCollectionError(String),
}

/// Source of per-tick input for the control loop
pub trait InputSource {
    /// Drains pending discrete events and samples the sticks
    fn poll(&mut self) -> Result<InputFrame, CollectorError>;

    /// Human readable device name
    fn name(&self) -> String;
}

// Define collector states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
#[derive(Debug)]
pub struct EventCollector<S: CollectionState> {
    // Gilrs context
    gilrs: Gilrs,

    // Active gamepad
    active_gamepad: Option<GamepadId>,

    // Last d-pad axis values, for pads that report the d-pad as a hat
    last_dpad_x: f32,
    last_dpad_y: f32,
}

// Implementation for Initializing state
impl EventCollector<Initializing> {
    pub fn create() -> Result<Self, CollectorError> {
        info!("Initializing gilrs controller interface");
        let gilrs = Gilrs::new().map_err(|e| {
            warn!("Failed to initialize gilrs: {}", e);
            CollectorError::InitializationError(e.to_string())
        })?;
        info!("Successfully initialized gilrs");

        Ok(Self::new(gilrs, None, 0.0, 0.0))
    }

    // Pick the first connected gamepad and transition to Collecting state
    pub fn initialize(mut self) -> Result<EventCollector<Collecting>, CollectorError> {
        let gamepads: Vec<(GamepadId, String)> = self
            .gilrs
            .gamepads()
            .map(|(id, gamepad)| (id, gamepad.name().to_string()))
            .collect();

        if gamepads.is_empty() {
            warn!("No gamepad connected");
            return Err(CollectorError::NoGamepadError(
                "no controller found".to_string(),
            ));
        }

        info!("Found {} gamepads:", gamepads.len());
        for (idx, (id, name)) in gamepads.iter().enumerate() {
            info!("  [{}] ID: {}, Name: {}", idx, id, name);
        }

        let (id, name) = &gamepads[0];
        self.active_gamepad = Some(*id);
        info!("Selected gamepad: {} ({})", name, id);

        Ok(self.transition())
    }
}

// Implementation for Collecting state
impl EventCollector<Collecting> {
    fn drain_events(&mut self) -> Vec<PadEvent> {
        let mut events = Vec::new();

        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            if self.active_gamepad != Some(id) {
                debug!("Skipping event from non-active gamepad: {:?}", id);
                continue;
            }
            self.convert_gilrs_event(event, &mut events);
        }

        events
    }

    fn convert_gilrs_event(&mut self, event: EventType, out: &mut Vec<PadEvent>) {
        match event {
            EventType::ButtonPressed(button, _) => {
                if let Some(control) = map_button(button) {
                    let pad_event = PadEvent::pressed(control);
                    info!(
                        "Button pressed: {:?} at {}",
                        control,
                        pad_event.timestamp.format("%H:%M:%S.%3f")
                    );
                    out.push(pad_event);
                }
            }
            EventType::ButtonReleased(button, _) => {
                if let Some(control) = map_button(button) {
                    debug!("Button released: {:?}", control);
                    out.push(PadEvent::released(control));
                }
            }
            EventType::AxisChanged(PadAxis::DPadX, value, _) => {
                let previous = std::mem::replace(&mut self.last_dpad_x, value.round());
                hat_edges(
                    previous,
                    self.last_dpad_x,
                    Control::DPadLeft,
                    Control::DPadRight,
                    out,
                );
            }
            EventType::AxisChanged(PadAxis::DPadY, value, _) => {
                let previous = std::mem::replace(&mut self.last_dpad_y, value.round());
                hat_edges(
                    previous,
                    self.last_dpad_y,
                    Control::DPadDown,
                    Control::DPadUp,
                    out,
                );
            }
            EventType::ButtonRepeated(button, _) => {
                debug!("Button repeat ignored: {:?}", button);
            }
            EventType::Connected => {
                info!("Controller connected event detected");
            }
            EventType::Disconnected => {
                warn!("Controller disconnected, sticks read as neutral");
            }
            _ => {}
        }
    }

    fn sample_sticks(&self) -> StickSnapshot {
        let Some(gamepad) = self
            .active_gamepad
            .and_then(|id| self.gilrs.connected_gamepad(id))
        else {
            return StickSnapshot::default();
        };

        StickSnapshot {
            left_x: gamepad.value(PadAxis::LeftStickX),
            left_y: gamepad.value(PadAxis::LeftStickY),
            right_x: gamepad.value(PadAxis::RightStickX),
            right_y: gamepad.value(PadAxis::RightStickY),
            left_bumper: gamepad.is_pressed(Button::LeftTrigger),
            right_bumper: gamepad.is_pressed(Button::RightTrigger),
        }
    }
}

impl InputSource for EventCollector<Collecting> {
    fn poll(&mut self) -> Result<InputFrame, CollectorError> {
        let events = self.drain_events();
        let sticks = self.sample_sticks();
        Ok(InputFrame { events, sticks })
    }

    fn name(&self) -> String {
        self.active_gamepad
            .and_then(|id| self.gilrs.connected_gamepad(id))
            .map(|gamepad| gamepad.name().to_string())
            .unwrap_or_else(|| "disconnected gamepad".to_string())
    }
}

/// Opens the first connected gamepad, ready for polling
pub fn open_gamepad() -> Result<EventCollector<Collecting>, CollectorError> {
    EventCollector::<Initializing>::create()?.initialize()
}

// Helper function to map gilrs Button to our Control
fn map_button(button: Button) -> Option<Control> {
    match button {
        Button::South => Some(Control::A),
        Button::East => Some(Control::B),
        Button::West => Some(Control::X),
        Button::North => Some(Control::Y),
        Button::Select => Some(Control::Back),
        Button::LeftTrigger => Some(Control::LeftBumper),
        Button::RightTrigger => Some(Control::RightBumper),
        Button::LeftThumb => Some(Control::LeftStick),
        Button::RightThumb => Some(Control::RightStick),
        Button::DPadUp => Some(Control::DPadUp),
        Button::DPadDown => Some(Control::DPadDown),
        Button::DPadLeft => Some(Control::DPadLeft),
        Button::DPadRight => Some(Control::DPadRight),
        _ => None,
    }
}

// Turns a hat axis change (-1, 0, 1) into release/press edges
fn hat_edges(previous: f32, current: f32, negative: Control, positive: Control, out: &mut Vec<PadEvent>) {
    let side = |v: f32| {
        if v > 0.0 {
            Some(positive)
        } else if v < 0.0 {
            Some(negative)
        } else {
            None
        }
    };

    let (before, after) = (side(previous), side(current));
    if before == after {
        return;
    }
    if let Some(control) = before {
        out.push(PadEvent::released(control));
    }
    if let Some(control) = after {
        out.push(PadEvent::pressed(control));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_xbox_layout() {
        assert_eq!(map_button(Button::South), Some(Control::A));
        assert_eq!(map_button(Button::North), Some(Control::Y));
        assert_eq!(map_button(Button::Select), Some(Control::Back));
        assert_eq!(map_button(Button::LeftTrigger), Some(Control::LeftBumper));
        assert_eq!(map_button(Button::LeftTrigger2), None);
        assert_eq!(map_button(Button::Mode), None);
    }

    #[test]
    fn hat_movement_produces_edges() {
        let mut out = Vec::new();
        hat_edges(0.0, 1.0, Control::DPadLeft, Control::DPadRight, &mut out);
        hat_edges(1.0, -1.0, Control::DPadLeft, Control::DPadRight, &mut out);
        hat_edges(-1.0, -1.0, Control::DPadLeft, Control::DPadRight, &mut out);
        hat_edges(-1.0, 0.0, Control::DPadLeft, Control::DPadRight, &mut out);

        let edges: Vec<(Control, ButtonState)> =
            out.iter().map(|e| (e.control, e.state)).collect();
        assert_eq!(
            edges,
            vec![
                (Control::DPadRight, ButtonState::Pressed),
                (Control::DPadRight, ButtonState::Released),
                (Control::DPadLeft, ButtonState::Pressed),
                (Control::DPadLeft, ButtonState::Released),
            ]
        );
    }

    #[test]
    fn every_control_has_a_class() {
        assert_eq!(Control::Back.class(), ControlClass::GlobalReset);
        assert_eq!(Control::DPadDown.class(), ControlClass::DPad);
        assert_eq!(Control::RightStick.class(), ControlClass::StickClick);
        assert_eq!(Control::ALL.len(), 13);
    }
}
