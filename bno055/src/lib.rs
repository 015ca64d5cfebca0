//! Driver for the Bosch BNO055 absolute orientation sensor.

use bitflags::bitflags;
use std::{
    fmt,
    io::{self, Read, Write},
    time::Duration,
};

pub const DEFAULT_ADDRESS: u16 = 0x28;
pub const OFFSET_BYTES: usize = 22;

const EXPECTED_CHIP_ID: u8 = 0xA0;
const EULER_LSB_PER_DEGREE: f32 = 16.0;

// Switching into CONFIG takes 19 ms, switching out of it 7 ms.
const MODE_SWITCH_DELAY: Duration = Duration::from_millis(25);

const CHIP_ID_REG: u8 = 0x00;
const PAGE_ID_REG: u8 = 0x07;
const EUL_DATA_X_LSB_REG: u8 = 0x1A;
const TEMP_REG: u8 = 0x34;
const CALIB_STAT_REG: u8 = 0x35;
const ST_RESULT_REG: u8 = 0x36;
const SYS_STATUS_REG: u8 = 0x39;
const SYS_ERR_REG: u8 = 0x3A;
const OPR_MODE_REG: u8 = 0x3D;
const PWR_MODE_REG: u8 = 0x3E;
const SYS_TRIGGER_REG: u8 = 0x3F;
const ACC_OFFSET_X_LSB_REG: u8 = 0x55;

const POWER_MODE_NORMAL: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OperatingMode {
    Config = 0x00,
    Imu = 0x08,
    Compass = 0x09,
    M4g = 0x0A,
    NdofFmcOff = 0x0B,
    Ndof = 0x0C,
}

bitflags!(
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SelfTest: u8 {
        const ACCELEROMETER = 0b0001;
        const MAGNETOMETER = 0b0010;
        const GYROSCOPE = 0b0100;
        const MCU = 0b1000;
    }
);

impl SelfTest {
    pub fn passed(&self) -> bool {
        self.contains(SelfTest::all())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStatus {
    Idle,
    SystemError,
    InitializingPeripherals,
    SystemInitialization,
    ExecutingSelfTest,
    FusionRunning,
    RunningWithoutFusion,
    Unknown(u8),
}

impl From<u8> for SystemStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => SystemStatus::Idle,
            1 => SystemStatus::SystemError,
            2 => SystemStatus::InitializingPeripherals,
            3 => SystemStatus::SystemInitialization,
            4 => SystemStatus::ExecutingSelfTest,
            5 => SystemStatus::FusionRunning,
            6 => SystemStatus::RunningWithoutFusion,
            other => SystemStatus::Unknown(other),
        }
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemStatus::Idle => write!(f, "Idle"),
            SystemStatus::SystemError => write!(f, "System error"),
            SystemStatus::InitializingPeripherals => write!(f, "Initializing peripherals"),
            SystemStatus::SystemInitialization => write!(f, "System initializing"),
            SystemStatus::ExecutingSelfTest => write!(f, "Executing self test"),
            SystemStatus::FusionRunning => write!(f, "Fusion running"),
            SystemStatus::RunningWithoutFusion => write!(f, "Running without fusion"),
            SystemStatus::Unknown(code) => write!(f, "Unknown status {code}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diagnostics {
    pub status: SystemStatus,
    pub self_test: SelfTest,
    pub error: u8,
}

/// Per-subsystem calibration levels, each 0 (uncalibrated) to 3 (fully calibrated).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationStatus {
    pub system: u8,
    pub gyroscope: u8,
    pub accelerometer: u8,
    pub magnetometer: u8,
}

impl From<u8> for CalibrationStatus {
    fn from(value: u8) -> Self {
        Self {
            system: (value >> 6) & 0x03,
            gyroscope: (value >> 4) & 0x03,
            accelerometer: (value >> 2) & 0x03,
            magnetometer: value & 0x03,
        }
    }
}

impl CalibrationStatus {
    pub fn is_fully_calibrated(&self) -> bool {
        self.system == 3 && self.gyroscope == 3 && self.accelerometer == 3 && self.magnetometer == 3
    }

    /// Every subsystem has at least started calibrating, so fused angles can be trusted.
    pub fn is_usable(&self) -> bool {
        self.system >= 1 && self.gyroscope >= 1 && self.accelerometer >= 1 && self.magnetometer >= 1
    }
}

/// Accelerometer, magnetometer and gyroscope offsets followed by the accelerometer and
/// magnetometer radii, as laid out in the register map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorOffsets(pub [u8; OFFSET_BYTES]);

impl SensorOffsets {
    /// A chip that was never calibrated reports all zeros.
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|&byte| byte == 0)
    }
}

/// Fused orientation in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EulerAngles {
    pub heading: f32,
    pub roll: f32,
    pub pitch: f32,
}

impl EulerAngles {
    fn from_registers(raw: [u8; 6]) -> Self {
        let angle = |lsb: u8, msb: u8| i16::from_le_bytes([lsb, msb]) as f32 / EULER_LSB_PER_DEGREE;
        Self {
            heading: angle(raw[0], raw[1]),
            roll: angle(raw[2], raw[3]),
            pitch: angle(raw[4], raw[5]),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Bno055;

impl Bno055 {
    pub fn new() -> Self {
        Self
    }

    pub fn check_chip_id(&self, bus: &mut (impl Write + Read)) -> io::Result<()> {
        let id = read_u8(bus, CHIP_ID_REG)?;
        if id != EXPECTED_CHIP_ID {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unexpected BNO055 chip id {:#04x}", id),
            ));
        }
        Ok(())
    }

    /// Verifies the chip, resets it to normal power on register page 0 and enters `mode`.
    pub fn begin(&self, bus: &mut (impl Write + Read), mode: OperatingMode) -> io::Result<()> {
        self.check_chip_id(bus)?;
        self.set_mode(bus, OperatingMode::Config)?;
        write_u8(bus, PWR_MODE_REG, POWER_MODE_NORMAL)?;
        write_u8(bus, PAGE_ID_REG, 0)?;
        write_u8(bus, SYS_TRIGGER_REG, 0)?;
        self.set_mode(bus, mode)
    }

    pub fn set_mode(&self, bus: &mut (impl Write + Read), mode: OperatingMode) -> io::Result<()> {
        write_u8(bus, OPR_MODE_REG, mode as u8)?;
        std::thread::sleep(MODE_SWITCH_DELAY);
        Ok(())
    }

    pub fn euler(&self, bus: &mut (impl Write + Read)) -> io::Result<EulerAngles> {
        let mut raw = [0u8; 6];
        read_registers(bus, EUL_DATA_X_LSB_REG, &mut raw)?;
        Ok(EulerAngles::from_registers(raw))
    }

    /// Die temperature in degrees Celsius.
    pub fn temperature(&self, bus: &mut (impl Write + Read)) -> io::Result<i8> {
        Ok(read_u8(bus, TEMP_REG)? as i8)
    }

    pub fn calibration_status(&self, bus: &mut (impl Write + Read)) -> io::Result<CalibrationStatus> {
        Ok(CalibrationStatus::from(read_u8(bus, CALIB_STAT_REG)?))
    }

    /// Reads the calibration offsets. They are only readable in CONFIG mode, so the chip
    /// passes through it and ends up in `resume`.
    pub fn read_offsets(
        &self,
        bus: &mut (impl Write + Read),
        resume: OperatingMode,
    ) -> io::Result<SensorOffsets> {
        self.set_mode(bus, OperatingMode::Config)?;
        let mut raw = [0u8; OFFSET_BYTES];
        let read = read_registers(bus, ACC_OFFSET_X_LSB_REG, &mut raw);
        self.set_mode(bus, resume)?;
        read.map(|_| SensorOffsets(raw))
    }

    pub fn write_offsets(
        &self,
        bus: &mut (impl Write + Read),
        offsets: &SensorOffsets,
        resume: OperatingMode,
    ) -> io::Result<()> {
        self.set_mode(bus, OperatingMode::Config)?;
        let mut frame = [0u8; OFFSET_BYTES + 1];
        frame[0] = ACC_OFFSET_X_LSB_REG;
        frame[1..].copy_from_slice(&offsets.0);
        let written = bus.write_all(&frame);
        self.set_mode(bus, resume)?;
        written
    }

    pub fn diagnostics(&self, bus: &mut (impl Write + Read)) -> io::Result<Diagnostics> {
        let self_test = SelfTest::from_bits_truncate(read_u8(bus, ST_RESULT_REG)?);
        let status = SystemStatus::from(read_u8(bus, SYS_STATUS_REG)?);
        let error = read_u8(bus, SYS_ERR_REG)?;
        Ok(Diagnostics {
            status,
            self_test,
            error,
        })
    }
}

fn read_registers(bus: &mut (impl Write + Read), register: u8, buf: &mut [u8]) -> io::Result<()> {
    bus.write_all(&[register])?;
    bus.read_exact(buf)
}

fn read_u8(bus: &mut (impl Write + Read), register: u8) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    read_registers(bus, register, &mut buf)?;
    Ok(buf[0])
}

fn write_u8(bus: &mut (impl Write + Read), register: u8, value: u8) -> io::Result<()> {
    bus.write_all(&[register, value])
}
