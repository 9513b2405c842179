use serde::Deserialize;
use tracing::debug;

use crate::{
    encoder::{encode, phase_offsets, TICKS_PER_CYCLE},
    error::ServoError,
    ServoPosition, CHANNEL_COUNT,
};

///Internal oscillator of the PCA9685.
pub const CLOCK_FREQ_HZ: f64 = 25_000_000.0;

///Legal PRE_SCALE register range. The chip forces anything below 3 up to 3.
pub const PRESCALE_MIN: u8 = 3;
pub const PRESCALE_MAX: u8 = 255;

pub const DEFAULT_BUS: u8 = 1;
pub const DEFAULT_I2C_ADDRESS: u8 = 0x40;
pub const DEFAULT_SERVO_MIN_US: f64 = 500.0;
pub const DEFAULT_SERVO_MAX_US: f64 = 2500.0;
pub const DEFAULT_CYCLE_TIME_US: f64 = 1_000_000.0 / 50.0;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 40;
///Slowest motion driver cadence accepted.
pub const MAX_TICK_INTERVAL_MS: u64 = 10_000;

///Configuration for one PCA9685 driving servos. Missing fields take the defaults above.
///
///Many cheap servos get very annoyed at being pushed past their travel. Narrow `servo_min_us` and
///`servo_max_us`, or set per channel limits, rather than relying on the defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub bus: u8,
    pub i2c_address: u8,
    pub servo_min_us: f64,
    pub servo_max_us: f64,
    pub cycle_time_us: f64,
    ///Cadence of the motion driver while any channel is moving.
    pub tick_interval_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            bus: DEFAULT_BUS,
            i2c_address: DEFAULT_I2C_ADDRESS,
            servo_min_us: DEFAULT_SERVO_MIN_US,
            servo_max_us: DEFAULT_SERVO_MAX_US,
            cycle_time_us: DEFAULT_CYCLE_TIME_US,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
        }
    }
}

///Validated timing derived from a `DeviceConfig`. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct PwmTiming {
    pub servo_min_us: f64,
    pub servo_max_us: f64,
    ///The cycle time that was asked for.
    pub cycle_time_us: f64,
    ///The cycle time the chip really produces with `prescale`.
    pub actual_cycle_time_us: f64,
    pub prescale: u8,
    pub phase_offsets_us: [f64; CHANNEL_COUNT],
}

impl DeviceConfig {
    ///Checks the configuration and computes the prescaler, the real cycle time and the channel phase offsets.
    pub fn validate(&self) -> Result<PwmTiming, ServoError> {
        let values = [self.servo_min_us, self.servo_max_us, self.cycle_time_us];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ServoError::configuration(
                "servo_min_us, servo_max_us and cycle_time_us must be finite",
            ));
        }
        if self.servo_min_us < 0.0 {
            return Err(ServoError::configuration("servo_min_us must not be negative"));
        }
        if self.servo_min_us >= self.servo_max_us {
            return Err(ServoError::Configuration(format!(
                "servo_min_us ({}) must be less than servo_max_us ({})",
                self.servo_min_us, self.servo_max_us
            )));
        }
        if self.servo_max_us >= self.cycle_time_us {
            return Err(ServoError::Configuration(format!(
                "servo_max_us ({}) does not fit in a cycle of {}us",
                self.servo_max_us, self.cycle_time_us
            )));
        }
        if self.tick_interval_ms == 0 || self.tick_interval_ms > MAX_TICK_INTERVAL_MS {
            return Err(ServoError::Configuration(format!(
                "tick_interval_ms ({}) must be between 1 and {}",
                self.tick_interval_ms, MAX_TICK_INTERVAL_MS
            )));
        }

        let prescale = prescale_for(self.cycle_time_us)?;
        let actual_cycle_time_us = cycle_time_for(prescale);

        let timing = PwmTiming {
            servo_min_us: self.servo_min_us,
            servo_max_us: self.servo_max_us,
            cycle_time_us: self.cycle_time_us,
            actual_cycle_time_us,
            prescale,
            phase_offsets_us: phase_offsets(self.cycle_time_us, self.servo_max_us),
        };

        //every channel needs a real pulse at both ends of its travel, inside the cycle
        for phase_offset_us in &timing.phase_offsets_us {
            encode(ServoPosition::At(0.0), &timing, *phase_offset_us)?;
            encode(ServoPosition::At(1.0), &timing, *phase_offset_us)?;
        }

        let steps = ((timing.servo_max_us - timing.servo_min_us) / actual_cycle_time_us
            * TICKS_PER_CYCLE) as u32;
        debug!(
            "cycle time {}us (prescale {}), servo travel {}us over {} steps",
            actual_cycle_time_us,
            prescale,
            timing.servo_max_us - timing.servo_min_us,
            steps
        );

        Ok(timing)
    }
}

///PRE_SCALE value giving the cycle closest to `cycle_time_us`.
pub fn prescale_for(cycle_time_us: f64) -> Result<u8, ServoError> {
    let freq_hz = 1_000_000.0 / cycle_time_us;
    let prescale = (CLOCK_FREQ_HZ / TICKS_PER_CYCLE / freq_hz).round() - 1.0;
    if prescale < PRESCALE_MIN as f64 || prescale > PRESCALE_MAX as f64 {
        Err(ServoError::Configuration(format!(
            "cycle time {}us needs prescale {} which is outside {}..={}",
            cycle_time_us, prescale, PRESCALE_MIN, PRESCALE_MAX
        )))
    } else {
        Ok(prescale as u8)
    }
}

///Cycle time the chip produces for a given PRE_SCALE value.
pub fn cycle_time_for(prescale: u8) -> f64 {
    1_000_000.0 * (prescale as f64 + 1.0) * TICKS_PER_CYCLE / CLOCK_FREQ_HZ
}
