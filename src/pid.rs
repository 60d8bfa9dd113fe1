//! Per-axis PID controller used by hold mode
//!
//! The controller is clocked by the caller's monotonic time. After
//! construction or a setpoint change the first sample only primes the
//! derivative baseline and returns `0.0`.
//!
//! There is no anti-windup beyond clamping the output: the integral keeps
//! accumulating while the output is saturated.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Proportional, integral and derivative gains
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub const fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

/// Symmetric motor speed range of the arm controller board
pub const DEFAULT_OUTPUT_LIMITS: (f64, f64) = (-255.0, 255.0);

#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    output_limits: (f64, f64),
    setpoint: f64,
    integral: f64,
    last_error: f64,
    last_timestamp: Option<Instant>,
}

impl PidController {
    pub fn new(gains: PidGains, output_limits: (f64, f64)) -> Self {
        Self {
            gains,
            output_limits,
            setpoint: 0.0,
            integral: 0.0,
            last_error: 0.0,
            last_timestamp: None,
        }
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Stores a new setpoint and clears integral, last error and timestamp
    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
        self.integral = 0.0;
        self.last_error = 0.0;
        self.last_timestamp = None;
    }

    pub fn update(&mut self, current: f64) -> f64 {
        self.update_at(current, Instant::now())
    }

    /// One controller step at time `now`
    pub fn update_at(&mut self, current: f64, now: Instant) -> f64 {
        let last = match self.last_timestamp {
            Some(last) => last,
            None => {
                self.last_timestamp = Some(now);
                return 0.0;
            }
        };

        let dt = now.saturating_duration_since(last).as_secs_f64();
        if dt == 0.0 {
            return 0.0;
        }

        let error = self.setpoint - current;
        self.integral += error * dt;
        let derivative = (error - self.last_error) / dt;

        let raw = self.gains.kp * error + self.gains.ki * self.integral + self.gains.kd * derivative;
        let (min, max) = self.output_limits;

        self.last_error = error;
        self.last_timestamp = Some(now);
        raw.clamp(min, max)
    }
}
