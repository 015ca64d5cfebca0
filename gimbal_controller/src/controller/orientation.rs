/// Signed shortest rotation from `from` to `to` on the azimuth circle.
///
/// Both inputs are expected in `[0, 360)`; the result lies in `(-180, 180]`.
pub fn circular_distance(from: f32, to: f32) -> f32 {
    let distance = to - from;
    if distance <= -180.0 {
        distance + 360.0
    } else if distance > 180.0 {
        distance - 360.0
    } else {
        distance
    }
}

/// Antenna pointing in degrees. Azimuth is compass bearing, elevation is above the horizon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub azimuth: f32,
    pub elevation: f32,
}

impl Orientation {
    pub fn new(azimuth: f32, elevation: f32) -> Self {
        Self { azimuth, elevation }
    }

    pub fn unavailable() -> Self {
        Self::new(f32::NAN, f32::NAN)
    }

    /// NaN samples fail both range checks.
    pub fn is_valid(&self) -> bool {
        (0.0..360.0).contains(&self.azimuth) && (0.0..=90.0).contains(&self.elevation)
    }

    pub fn settled_since(&self, previous: &Orientation, threshold: f32) -> bool {
        circular_distance(previous.azimuth, self.azimuth).abs() < threshold
            && (self.elevation - previous.elevation).abs() < threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_takes_the_short_way_round() {
        assert_eq!(circular_distance(350.0, 10.0), 20.0);
        assert_eq!(circular_distance(10.0, 350.0), -20.0);
        assert_eq!(circular_distance(90.0, 90.0), 0.0);
        assert_eq!(circular_distance(100.0, 130.0), 30.0);
    }

    #[test]
    fn half_turn_is_positive() {
        assert_eq!(circular_distance(0.0, 180.0), 180.0);
        assert_eq!(circular_distance(180.0, 0.0), 180.0);
        assert_eq!(circular_distance(270.0, 90.0), 180.0);
    }

    #[test]
    fn validity_ranges() {
        assert!(Orientation::new(0.0, 0.0).is_valid());
        assert!(Orientation::new(359.9, 90.0).is_valid());
        assert!(!Orientation::new(360.0, 45.0).is_valid());
        assert!(!Orientation::new(-0.1, 45.0).is_valid());
        assert!(!Orientation::new(10.0, 90.1).is_valid());
        assert!(!Orientation::new(10.0, -1.0).is_valid());
        assert!(!Orientation::unavailable().is_valid());
    }

    #[test]
    fn settling_threshold_is_exclusive() {
        let previous = Orientation::new(100.0, 20.0);
        assert!(!Orientation::new(100.5, 20.0).settled_since(&previous, 0.5));
        assert!(!Orientation::new(100.0, 20.5).settled_since(&previous, 0.5));
        assert!(Orientation::new(100.25, 20.25).settled_since(&previous, 0.5));
    }

    #[test]
    fn settling_across_north() {
        let previous = Orientation::new(359.875, 30.0);
        assert!(Orientation::new(0.125, 30.0).settled_since(&previous, 0.5));
    }
}
