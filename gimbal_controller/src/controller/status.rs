use std::fmt;

use bno055::{CalibrationStatus, Diagnostics, SelfTest};

use crate::controller::{calibration::CalibrationState, motor::MotorIndex, orientation::Orientation};

/// One-line health summary, most severe condition first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GimbalStatus {
    NotFound,
    AtMin(MotorIndex),
    AtMax(MotorIndex),
    Uncalibrated,
    Ok,
}

impl fmt::Display for GimbalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Operators count servos from one.
        match self {
            GimbalStatus::NotFound => write!(f, "Not found!"),
            GimbalStatus::AtMin(motor) => write!(f, "Servo {} at Min!", motor.index() + 1),
            GimbalStatus::AtMax(motor) => write!(f, "Servo {} at Max!", motor.index() + 1),
            GimbalStatus::Uncalibrated => write!(f, "Uncalibrated!"),
            GimbalStatus::Ok => write!(f, "Ok"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorReport {
    pub position: u16,
    pub min: u16,
    pub max: u16,
    pub at_endstop: bool,
    /// Degrees per microsecond; infinite while the scale is still zero.
    pub az_degrees_per_us: f32,
    pub el_degrees_per_us: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub motors: [MotorReport; 2],
    pub calibration: CalibrationState,
    /// A calibration sequence has started and not yet finished.
    pub calibrating: bool,
    pub status: GimbalStatus,
}

impl StatusReport {
    /// `name=value` lines for the operator interface.
    pub fn to_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(11);
        for (index, motor) in self.motors.iter().enumerate() {
            lines.push(format!("motor{index}Pos={}", motor.position));
            lines.push(format!("motor{index}Min={}", motor.min));
            lines.push(format!("motor{index}Max={}", motor.max));
            lines.push(format!("motor{index}AzCal={:.4}", motor.az_degrees_per_us));
            lines.push(format!("motor{index}ElCal={:.4}", motor.el_degrees_per_us));
        }
        lines.push(format!("calibrating={}", self.calibrating));
        lines.push(format!("status={}", self.status));
        lines
    }
}

/// What the orientation sensor says about itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorHealth {
    pub calibration: CalibrationStatus,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReport {
    pub found: bool,
    pub orientation: Orientation,
    pub temperature: Option<f32>,
    pub declination: f32,
    pub health: Option<SensorHealth>,
}

impl SensorReport {
    pub fn summary(&self) -> &'static str {
        match self.health {
            _ if !self.found => "Not found!",
            None => "Not responding!",
            Some(health) if health.calibration.is_usable() => "Ok",
            Some(_) => "Uncalibrated!",
        }
    }

    /// Offsets are only worth keeping once every subsystem is fully calibrated.
    pub fn save_ready(&self) -> bool {
        self.health
            .is_some_and(|health| health.calibration.is_fully_calibrated())
    }

    pub fn to_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("sensorAz={:.1}", self.orientation.azimuth),
            format!("sensorEl={:.1}", self.orientation.elevation),
            match self.temperature {
                Some(celsius) => format!("sensorTemp={:.0}", celsius),
                None => "sensorTemp=-".to_string(),
            },
            format!("declination={:.2}", self.declination),
            format!("sensorStatus={}", self.summary()),
        ];

        if let Some(SensorHealth {
            calibration,
            diagnostics,
        }) = self.health
        {
            lines.push(format!("sensorSysCal={}", calibration.system));
            lines.push(format!("sensorGyroCal={}", calibration.gyroscope));
            lines.push(format!("sensorMagCal={}", calibration.magnetometer));
            lines.push(format!("sensorAccelCal={}", calibration.accelerometer));
            lines.push(format!("sensorSystem={}", diagnostics.status));
            lines.push(format!("sensorError={}", diagnostics.error));

            let self_test = |part: SelfTest| {
                if diagnostics.self_test.contains(part) { "pass" } else { "fail" }
            };
            lines.push(format!("sensorSelfTestMcu={}", self_test(SelfTest::MCU)));
            lines.push(format!("sensorSelfTestGyro={}", self_test(SelfTest::GYROSCOPE)));
            lines.push(format!("sensorSelfTestMag={}", self_test(SelfTest::MAGNETOMETER)));
            lines.push(format!("sensorSelfTestAccel={}", self_test(SelfTest::ACCELEROMETER)));
        }

        lines.push(format!("sensorSaveReady={}", self.save_ready()));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text() {
        assert_eq!(GimbalStatus::NotFound.to_string(), "Not found!");
        assert_eq!(
            GimbalStatus::AtMin(MotorIndex::First).to_string(),
            "Servo 1 at Min!"
        );
        assert_eq!(
            GimbalStatus::AtMax(MotorIndex::Second).to_string(),
            "Servo 2 at Max!"
        );
        assert_eq!(GimbalStatus::Uncalibrated.to_string(), "Uncalibrated!");
        assert_eq!(GimbalStatus::Ok.to_string(), "Ok");
    }

    #[test]
    fn report_lines() {
        let motor = MotorReport {
            position: 1500,
            min: 1000,
            max: 2000,
            at_endstop: false,
            az_degrees_per_us: 0.03,
            el_degrees_per_us: f32::INFINITY,
        };
        let report = StatusReport {
            motors: [motor, motor],
            calibration: CalibrationState::AwaitingStep2,
            calibrating: true,
            status: GimbalStatus::Uncalibrated,
        };

        let lines = report.to_lines();
        assert_eq!(lines.len(), 12);
        assert_eq!(lines[0], "motor0Pos=1500");
        assert_eq!(lines[3], "motor0AzCal=0.0300");
        assert_eq!(lines[4], "motor0ElCal=inf");
        assert_eq!(lines[6], "motor1Min=1000");
        assert_eq!(lines[10], "calibrating=true");
        assert_eq!(lines[11], "status=Uncalibrated!");
    }

    fn sensor_report(calibration: u8, self_test: SelfTest) -> SensorReport {
        SensorReport {
            found: true,
            orientation: Orientation::new(123.44, 12.06),
            temperature: Some(28.0),
            declination: 13.23,
            health: Some(SensorHealth {
                calibration: CalibrationStatus::from(calibration),
                diagnostics: Diagnostics {
                    status: bno055::SystemStatus::FusionRunning,
                    self_test,
                    error: 0,
                },
            }),
        }
    }

    #[test]
    fn sensor_lines() {
        let lines = sensor_report(0b1110_0111, SelfTest::all() - SelfTest::MAGNETOMETER).to_lines();

        assert_eq!(
            lines,
            vec![
                "sensorAz=123.4",
                "sensorEl=12.1",
                "sensorTemp=28",
                "declination=13.23",
                "sensorStatus=Ok",
                "sensorSysCal=3",
                "sensorGyroCal=2",
                "sensorMagCal=3",
                "sensorAccelCal=1",
                "sensorSystem=Fusion running",
                "sensorError=0",
                "sensorSelfTestMcu=pass",
                "sensorSelfTestGyro=pass",
                "sensorSelfTestMag=fail",
                "sensorSelfTestAccel=pass",
                "sensorSaveReady=false",
            ]
        );
    }

    #[test]
    fn sensor_summary() {
        assert_eq!(sensor_report(0b0011_1111, SelfTest::all()).summary(), "Uncalibrated!");
        assert!(sensor_report(0xFF, SelfTest::all()).save_ready());

        let absent = SensorReport {
            found: false,
            orientation: Orientation::unavailable(),
            temperature: None,
            declination: 0.0,
            health: None,
        };
        assert_eq!(absent.summary(), "Not found!");
        assert_eq!(
            absent.to_lines(),
            vec![
                "sensorAz=NaN",
                "sensorEl=NaN",
                "sensorTemp=-",
                "declination=0.00",
                "sensorStatus=Not found!",
                "sensorSaveReady=false",
            ]
        );
    }
}
