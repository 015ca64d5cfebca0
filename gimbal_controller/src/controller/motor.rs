use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotorIndex {
    First,
    Second,
}

impl MotorIndex {
    pub const ALL: [MotorIndex; 2] = [MotorIndex::First, MotorIndex::Second];

    pub fn index(self) -> usize {
        match self {
            MotorIndex::First => 0,
            MotorIndex::Second => 1,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(MotorIndex::First),
            1 => Some(MotorIndex::Second),
            _ => None,
        }
    }

    pub fn other(self) -> Self {
        match self {
            MotorIndex::First => MotorIndex::Second,
            MotorIndex::Second => MotorIndex::First,
        }
    }
}

impl fmt::Display for MotorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Which actuator drives which axis. The two are always distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorRoles {
    pub azimuth: MotorIndex,
    pub elevation: MotorIndex,
}

impl ActuatorRoles {
    pub fn with_azimuth(azimuth: MotorIndex) -> Self {
        Self {
            azimuth,
            elevation: azimuth.other(),
        }
    }

    /// The actuator needing fewer microseconds per azimuth degree moves azimuth most
    /// directly. Ties go to the first actuator.
    pub fn from_azimuth_scales(first: f32, second: f32) -> Self {
        if first.abs() <= second.abs() {
            Self::with_azimuth(MotorIndex::First)
        } else {
            Self::with_azimuth(MotorIndex::Second)
        }
    }
}

impl Default for ActuatorRoles {
    fn default() -> Self {
        Self::with_azimuth(MotorIndex::First)
    }
}

/// Commanded state of one servo. Pulses are in microseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct MotorState {
    min_pulse: u16,
    max_pulse: u16,
    current_pulse: u16,
    delta_pulse: i32,
    az_scale: f32,
    el_scale: f32,
    at_min: bool,
    at_max: bool,
}

impl MotorState {
    pub fn new(min_pulse: u16, max_pulse: u16) -> Self {
        Self {
            min_pulse,
            max_pulse,
            current_pulse: 0,
            delta_pulse: 0,
            az_scale: 0.0,
            el_scale: 0.0,
            at_min: false,
            at_max: false,
        }
    }

    pub fn min_pulse(&self) -> u16 {
        self.min_pulse
    }

    pub fn max_pulse(&self) -> u16 {
        self.max_pulse
    }

    pub fn current_pulse(&self) -> u16 {
        self.current_pulse
    }

    pub fn delta_pulse(&self) -> i32 {
        self.delta_pulse
    }

    pub fn az_scale(&self) -> f32 {
        self.az_scale
    }

    pub fn el_scale(&self) -> f32 {
        self.el_scale
    }

    pub fn at_min(&self) -> bool {
        self.at_min
    }

    pub fn at_max(&self) -> bool {
        self.at_max
    }

    /// Zero until the first command after startup.
    pub fn is_commanded(&self) -> bool {
        self.current_pulse != 0
    }

    pub fn range(&self) -> u16 {
        self.max_pulse.saturating_sub(self.min_pulse)
    }

    /// Pulse at `fraction` of the way from the lower to the upper limit.
    pub fn pulse_at_fraction(&self, fraction: f32) -> f32 {
        self.min_pulse as f32 + fraction * self.range() as f32
    }

    pub fn set_limits(&mut self, min_pulse: u16, max_pulse: u16) {
        self.min_pulse = min_pulse;
        self.max_pulse = max_pulse;
    }

    pub fn set_az_scale(&mut self, scale: f32) {
        self.az_scale = scale;
    }

    pub fn set_el_scale(&mut self, scale: f32) {
        self.el_scale = scale;
    }

    /// Clamps `requested` into the travel limits, updates the endstop flags and
    /// records the move. Returns the pulse to emit, or `None` for a non-finite request.
    pub fn command(&mut self, requested: f32) -> Option<u16> {
        if !requested.is_finite() {
            return None;
        }

        self.at_min = requested <= self.min_pulse as f32;
        self.at_max = requested >= self.max_pulse as f32;

        let pulse = if self.at_min {
            self.min_pulse
        } else if self.at_max {
            self.max_pulse
        } else {
            requested as u16
        };

        self.delta_pulse = pulse as i32 - self.current_pulse as i32;
        self.current_pulse = pulse;
        Some(pulse)
    }
}
