//! Line protocol: the Easycomm II subset rotator clients speak, plus operator
//! `name=value` settings.

use crate::controller::{OverrideField, error::OverrideError};

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// `AZ EL`, bare `AZ`, or `SA SE`.
    ReportPosition,
    /// `AZ<az> EL<el>`: one control cycle towards the target, then a position report.
    Move { azimuth: f32, elevation: f32 },
    Park,
    Home,
    Version,
    /// `IP<n>`: read one status item.
    StatusItem(u8),
    /// `GS`
    RotatorStatus,
    /// `GE`
    RotatorError,
    Override { field: OverrideField, value: u16 },
    Calibrate,
    ResetCalibration,
    Status,
    Declination(f32),
    SaveSensorCalibration,
}

impl Request {
    /// Operator settings answer errors in words, rotator commands with `RPRT -1`.
    pub fn is_operator(&self) -> bool {
        matches!(
            self,
            Request::Override { .. }
                | Request::Calibrate
                | Request::ResetCalibration
                | Request::Status
                | Request::Declination(_)
                | Request::SaveSensorCalibration
        )
    }
}

/// Parses one line. `None` means the line is ignored without a reply.
pub fn parse_request(line: &str) -> Option<Result<Request, OverrideError>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some((name, value)) = line.split_once('=') {
        return Some(parse_setting(name.trim(), value.trim()));
    }

    let request = if line.starts_with("AZ EL") || line.starts_with("SA SE") {
        Request::ReportPosition
    } else if line.starts_with("AZ") {
        parse_target(line).unwrap_or(Request::ReportPosition)
    } else if line == "RESET" {
        Request::Home
    } else if line == "PARK" {
        Request::Park
    } else if line == "VE" {
        Request::Version
    } else if let Some(item) = line.strip_prefix("IP") {
        Request::StatusItem(item.trim().parse().ok()?)
    } else if line == "GS" {
        Request::RotatorStatus
    } else if line == "GE" {
        Request::RotatorError
    } else {
        return None;
    };

    Some(Ok(request))
}

/// `AZ<az> EL<el>`, ignoring anything after the elevation.
fn parse_target(line: &str) -> Option<Request> {
    let mut words = line.split_whitespace();
    let azimuth = words.next()?.strip_prefix("AZ")?.parse().ok()?;
    let elevation = words.next()?.strip_prefix("EL")?.parse().ok()?;
    Some(Request::Move { azimuth, elevation })
}

fn parse_setting(name: &str, value: &str) -> Result<Request, OverrideError> {
    match name {
        "calibrate" => Ok(Request::Calibrate),
        "resetCalibration" => Ok(Request::ResetCalibration),
        "status" => Ok(Request::Status),
        "saveSensorCalibration" => Ok(Request::SaveSensorCalibration),
        "declination" => value
            .parse::<f32>()
            .map(Request::Declination)
            .map_err(|_| invalid(name, value)),
        _ => {
            let field = name.parse::<OverrideField>()?;
            let value = value.parse::<u16>().map_err(|_| invalid(name, value))?;
            Ok(Request::Override { field, value })
        }
    }
}

fn invalid(name: &str, value: &str) -> OverrideError {
    OverrideError::InvalidValue {
        field: name.to_string(),
        value: value.to_string(),
    }
}
