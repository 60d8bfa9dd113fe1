//! Gamepad input for the arm
//!
//! Two stages, both driven by the control loop once per tick:
//!
//! 1. [`event_collector`] - gilrs events and stick sampling into an [`InputFrame`]
//! 2. [`event_processor`] - debounce, hold toggles and manual drive intent
//!
//! ```text
//! Gamepad ──► Collector ──► Processor ──► TickIntent ──► Dispatcher
//!             (InputFrame)  (AxisTable)
//! ```

pub mod event_collector;
pub mod event_processor;

pub use event_collector::{
    open_gamepad, ButtonState, CollectorError, Control, ControlClass, EventCollector,
    InputFrame, InputSource, PadEvent, Stick, StickChannel, StickSnapshot,
};
pub use event_processor::{
    Binding, ExclusivePair, InputProcessor, ManualDrive, TickIntent,
};
