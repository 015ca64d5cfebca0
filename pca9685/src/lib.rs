//! Driver for the NXP PCA9685 16-channel, 12-bit PWM controller.
//!
//! The transport is any byte stream already addressed to the chip: every write
//! starts with a register pointer and the chip auto-increments through the
//! following bytes.

use bitflags::bitflags;
use std::{
    io::{self, Read, Write},
    time::Duration,
};

pub const DEFAULT_ADDRESS: u16 = 0x40;
pub const CHANNELS: u8 = 16;

const MODE1_REG: u8 = 0x00;
const LED0_ON_L_REG: u8 = 0x06;
const PRE_SCALE_REG: u8 = 0xFE;

const OSCILLATOR_HZ: f32 = 25_000_000.0;
const STEPS: f32 = 4096.0;
const MAX_TICK: u16 = 4095;
const OSCILLATOR_STARTUP: Duration = Duration::from_micros(500);

bitflags!(
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mode1: u8 {
        const ALLCALL = 0b00000001;
        const SUB3 = 0b00000010;
        const SUB2 = 0b00000100;
        const SUB1 = 0b00001000;
        const SLEEP = 0b00010000;
        const AUTO_INCREMENT = 0b00100000;
        const EXTCLK = 0b01000000;
        const RESTART = 0b10000000;
    }
);

#[derive(Debug, Clone, Copy)]
pub struct Pca9685 {
    frequency_hz: f32,
}

impl Pca9685 {
    pub fn new(frequency_hz: f32) -> Self {
        Self { frequency_hz }
    }

    pub fn frequency_hz(&self) -> f32 {
        self.frequency_hz
    }

    /// Prescaler value for the internal 25 MHz oscillator.
    pub fn prescale_for(frequency_hz: f32) -> u8 {
        let prescale = (OSCILLATOR_HZ / (STEPS * frequency_hz)).round() - 1.0;
        prescale.clamp(3.0, 255.0) as u8
    }

    /// Converts a pulse width to the number of 12-bit ticks at the configured frequency.
    pub fn micros_to_ticks(&self, micros: u16) -> u16 {
        let ticks = micros as f32 * STEPS * self.frequency_hz / 1_000_000.0;
        (ticks as u16).min(MAX_TICK)
    }

    pub fn read_mode1(&self, bus: &mut (impl Write + Read)) -> io::Result<Mode1> {
        let mut buf = [0u8; 1];
        read_register(bus, MODE1_REG, &mut buf)?;
        Ok(Mode1::from_bits_retain(buf[0]))
    }

    /// Programs the PWM frequency and wakes the oscillator with register auto-increment enabled.
    pub fn init(&self, bus: &mut (impl Write + Read)) -> io::Result<()> {
        let old_mode = self.read_mode1(bus)?;

        // The prescaler is only writable while the oscillator sleeps.
        let sleeping = (old_mode - Mode1::RESTART) | Mode1::SLEEP;
        write_register(bus, MODE1_REG, &[sleeping.bits()])?;
        write_register(
            bus,
            PRE_SCALE_REG,
            &[Self::prescale_for(self.frequency_hz)],
        )?;

        let awake = old_mode - Mode1::SLEEP - Mode1::RESTART;
        write_register(bus, MODE1_REG, &[awake.bits()])?;
        std::thread::sleep(OSCILLATOR_STARTUP);

        let running = awake | Mode1::RESTART | Mode1::AUTO_INCREMENT;
        write_register(bus, MODE1_REG, &[running.bits()])
    }

    pub fn set_channel(
        &self,
        bus: &mut (impl Write + Read),
        channel: u8,
        on: u16,
        off: u16,
    ) -> io::Result<()> {
        if channel >= CHANNELS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("PWM channel {} out of range", channel),
            ));
        }

        let [on_l, on_h] = on.to_le_bytes();
        let [off_l, off_h] = off.to_le_bytes();
        write_register(
            bus,
            LED0_ON_L_REG + 4 * channel,
            &[on_l, on_h, off_l, off_h],
        )
    }

    pub fn set_pulse_width_us(
        &self,
        bus: &mut (impl Write + Read),
        channel: u8,
        micros: u16,
    ) -> io::Result<()> {
        self.set_channel(bus, channel, 0, self.micros_to_ticks(micros))
    }
}

fn write_register(bus: &mut (impl Write + Read), register: u8, data: &[u8]) -> io::Result<()> {
    let mut frame = Vec::with_capacity(data.len() + 1);
    frame.push(register);
    frame.extend_from_slice(data);
    bus.write_all(&frame)
}

fn read_register(bus: &mut (impl Write + Read), register: u8, buf: &mut [u8]) -> io::Result<()> {
    bus.write_all(&[register])?;
    bus.read_exact(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Register file that behaves like an auto-incrementing I2C slave.
    struct FakeChip {
        registers: [u8; 256],
        pointer: u8,
        frames: Vec<Vec<u8>>,
    }

    impl FakeChip {
        fn new() -> Self {
            let mut registers = [0u8; 256];
            registers[MODE1_REG as usize] = (Mode1::SLEEP | Mode1::ALLCALL).bits();
            Self {
                registers,
                pointer: 0,
                frames: Vec::new(),
            }
        }
    }

    impl Write for FakeChip {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Some((&register, data)) = buf.split_first() {
                self.pointer = register;
                for byte in data {
                    self.registers[self.pointer as usize] = *byte;
                    self.pointer = self.pointer.wrapping_add(1);
                }
                self.frames.push(buf.to_vec());
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Read for FakeChip {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            for byte in buf.iter_mut() {
                *byte = self.registers[self.pointer as usize];
                self.pointer = self.pointer.wrapping_add(1);
            }
            Ok(buf.len())
        }
    }

    #[test]
    fn prescale_for_servo_frequency() {
        assert_eq!(Pca9685::prescale_for(50.0), 121);
        assert_eq!(Pca9685::prescale_for(1526.0), 3);
        assert_eq!(Pca9685::prescale_for(10.0), 255);
    }

    #[test]
    fn micros_to_ticks_truncates() {
        let driver = Pca9685::new(50.0);
        assert_eq!(driver.micros_to_ticks(1500), 307);
        assert_eq!(driver.micros_to_ticks(1000), 204);
        assert_eq!(driver.micros_to_ticks(30000), MAX_TICK);
    }

    #[test]
    fn init_writes_prescale_while_asleep() {
        let mut chip = FakeChip::new();
        Pca9685::new(50.0).init(&mut chip).unwrap();

        let prescale_frame = chip
            .frames
            .iter()
            .position(|frame| frame[0] == PRE_SCALE_REG)
            .unwrap();
        let before = &chip.frames[prescale_frame - 1];
        assert_eq!(before[0], MODE1_REG);
        assert!(Mode1::from_bits_retain(before[1]).contains(Mode1::SLEEP));
        assert_eq!(chip.registers[PRE_SCALE_REG as usize], 121);

        let mode = Mode1::from_bits_retain(chip.registers[MODE1_REG as usize]);
        assert!(mode.contains(Mode1::AUTO_INCREMENT));
        assert!(!mode.contains(Mode1::SLEEP));
    }

    #[test]
    fn pulse_width_lands_in_channel_registers() {
        let mut chip = FakeChip::new();
        let driver = Pca9685::new(50.0);
        driver.set_pulse_width_us(&mut chip, 1, 1500).unwrap();

        let base = (LED0_ON_L_REG + 4) as usize;
        assert_eq!(&chip.registers[base..base + 4], &[0, 0, 0x33, 0x01]);
    }

    #[test]
    fn rejects_channel_out_of_range() {
        let mut chip = FakeChip::new();
        let err = Pca9685::new(50.0)
            .set_channel(&mut chip, CHANNELS, 0, 100)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(chip.frames.is_empty());
    }
}
