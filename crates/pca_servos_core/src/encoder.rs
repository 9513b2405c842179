//!Turns normalized servo positions into PCA9685 on/off tick values.
//!
//!Each channel's pulse starts at a fixed phase offset within the PWM cycle. The offsets are staggered so
//!that the 16 outputs don't all switch on at once, which smooths out the current drawn by the servos.
use crate::{clamp_position, config::PwmTiming, error::ServoError, ServoPosition, CHANNEL_COUNT};

///Steps in one PWM cycle (12 bit counter).
pub const TICKS_PER_CYCLE: f64 = 4096.0;
///Largest value a 12 bit tick register can hold.
pub const MAX_TICK: u16 = 4095;

///Where the first channel's pulse starts.
const FIRST_PHASE_OFFSET_US: f64 = 10.0;

///On/off transition points of one channel, as written to its four LEDn registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmTicks {
    pub on: u16,
    pub off: u16,
}

impl PwmTicks {
    ///Both registers zero. The chip disables the output rather than emitting a pulse.
    pub const OFF: PwmTicks = PwmTicks { on: 0, off: 0 };

    ///`[ON_L, ON_H, OFF_L, OFF_H]`
    pub fn to_bytes(&self) -> [u8; 4] {
        let on = self.on.to_le_bytes();
        let off = self.off.to_le_bytes();
        [on[0], on[1], off[0], off[1]]
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        PwmTicks {
            on: u16::from_le_bytes([bytes[0], bytes[1]]),
            off: u16::from_le_bytes([bytes[2], bytes[3]]),
        }
    }

    pub fn is_off(&self) -> bool {
        *self == Self::OFF
    }

    ///Length of the pulse in microseconds for a cycle of `cycle_time_us`. Zero when off.
    pub fn pulse_width_us(&self, cycle_time_us: f64) -> f64 {
        if self.off <= self.on {
            0.0
        } else {
            (self.off - self.on) as f64 * cycle_time_us / TICKS_PER_CYCLE
        }
    }
}

///Spreads the channels' pulse starts across the cycle.
///
///Starting at 10us, each channel starts `cycle_time_us / 16` after the previous one. When a pulse of
///`servo_max_us` starting there would reach the end of the cycle, the start wraps back to a third of a
///step, so the late channels are packed into the early part of the cycle.
pub fn phase_offsets(cycle_time_us: f64, servo_max_us: f64) -> [f64; CHANNEL_COUNT] {
    let us_per_servo = cycle_time_us / CHANNEL_COUNT as f64;
    let mut curr_us = FIRST_PHASE_OFFSET_US;
    let mut offsets = [0.0; CHANNEL_COUNT];
    for offset in offsets.iter_mut() {
        if curr_us + servo_max_us >= cycle_time_us {
            curr_us = us_per_servo / 3.0;
        }
        *offset = curr_us;
        curr_us += us_per_servo;
    }
    offsets
}

fn to_tick(time_us: f64, cycle_time_us: f64) -> u16 {
    //float to int casts truncate toward zero and saturate
    (time_us / cycle_time_us * TICKS_PER_CYCLE) as u16
}

///Computes the register values for `position` on a channel whose pulse starts at `phase_offset_us`.
///
///Positions are clamped to `[0, 1]` here as a last line of defence; per channel limits are the caller's job.
///A pulse that is empty once turned into ticks is a `Configuration` error.
pub fn encode(
    position: ServoPosition,
    timing: &PwmTiming,
    phase_offset_us: f64,
) -> Result<PwmTicks, ServoError> {
    let width = match position {
        ServoPosition::Off => return Ok(PwmTicks::OFF),
        ServoPosition::At(width) => clamp_position(width, 0.0, 1.0),
    };

    let dur_us = timing.servo_min_us + width * (timing.servo_max_us - timing.servo_min_us);
    let on_us = phase_offset_us;
    let off_us = on_us + dur_us;

    let on = to_tick(on_us, timing.actual_cycle_time_us);
    let off = to_tick(off_us, timing.actual_cycle_time_us).min(MAX_TICK);

    if off <= on {
        return Err(ServoError::Configuration(format!(
            "off tick {} is not after on tick {} (pulse {}us starting at {}us in a {}us cycle)",
            off, on, dur_us, on_us, timing.actual_cycle_time_us
        )));
    }

    Ok(PwmTicks { on, off })
}

impl PwmTiming {
    ///`encode` using the phase offset assigned to channel index `idx`.
    pub fn encode_channel(&self, position: ServoPosition, idx: usize) -> Result<PwmTicks, ServoError> {
        match self.phase_offsets_us.get(idx) {
            Some(phase_offset_us) => encode(position, self, *phase_offset_us),
            None => Err(ServoError::InvalidChannel(idx.min(u8::MAX as usize) as u8)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;

    fn default_timing() -> PwmTiming {
        DeviceConfig::default().validate().unwrap()
    }

    #[test]
    fn test_default_phase_offsets() {
        let offsets = phase_offsets(20_000.0, 2500.0);
        assert_eq!(offsets[0], 10.0);
        assert_eq!(offsets[1], 1260.0);
        assert_eq!(offsets[13], 16260.0);
        //17510 + 2500 runs into the end of the cycle, so wrap to a third of a step
        assert!((offsets[14] - 1250.0 / 3.0).abs() < 1e-9);
        assert!((offsets[15] - (1250.0 / 3.0 + 1250.0)).abs() < 1e-9);
    }

    #[test]
    fn test_phase_offsets_are_spread() {
        let offsets = phase_offsets(20_000.0, 2500.0);
        for (i, a) in offsets.iter().enumerate() {
            assert!(*a >= 0.0 && *a < 20_000.0, "offset {} out of cycle: {}", i, a);
            for b in offsets.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_encode_known_values() {
        let timing = default_timing();
        //ticks are floor(us * 25 / 122) for the default prescale
        assert_eq!(
            encode(ServoPosition::At(0.0), &timing, 10.0).unwrap(),
            PwmTicks { on: 2, off: 104 }
        );
        assert_eq!(
            encode(ServoPosition::At(0.5), &timing, 10.0).unwrap(),
            PwmTicks { on: 2, off: 309 }
        );
        assert_eq!(
            encode(ServoPosition::At(1.0), &timing, 10.0).unwrap(),
            PwmTicks { on: 2, off: 514 }
        );
    }

    #[test]
    fn test_encode_off() {
        let timing = default_timing();
        for phase_offset_us in timing.phase_offsets_us {
            assert_eq!(
                encode(ServoPosition::Off, &timing, phase_offset_us).unwrap(),
                PwmTicks::OFF
            );
        }
        //even when the offset itself is nonsense
        assert_eq!(
            encode(ServoPosition::Off, &timing, 1e9).unwrap(),
            PwmTicks::OFF
        );
    }

    #[test]
    fn test_valid_widths_encode_in_range() {
        let timing = default_timing();
        for idx in 0..CHANNEL_COUNT {
            for step in 0..=100 {
                let width = step as f64 / 100.0;
                let ticks = timing.encode_channel(ServoPosition::At(width), idx).unwrap();
                assert!(ticks.on < ticks.off, "channel {} width {}: {:?}", idx, width, ticks);
                assert!(ticks.off <= MAX_TICK);
            }
        }
    }

    #[test]
    fn test_encode_clamps_out_of_range_width() {
        let timing = default_timing();
        assert_eq!(
            encode(ServoPosition::At(-2.0), &timing, 10.0).unwrap(),
            encode(ServoPosition::At(0.0), &timing, 10.0).unwrap()
        );
        assert_eq!(
            encode(ServoPosition::At(7.0), &timing, 10.0).unwrap(),
            encode(ServoPosition::At(1.0), &timing, 10.0).unwrap()
        );
        assert_eq!(
            encode(ServoPosition::At(f64::NAN), &timing, 10.0).unwrap(),
            encode(ServoPosition::At(0.0), &timing, 10.0).unwrap()
        );
    }

    #[test]
    fn test_off_tick_clamped() {
        let timing = default_timing();
        //pulse runs past the end of the cycle
        let ticks = encode(ServoPosition::At(1.0), &timing, 19_000.0).unwrap();
        assert_eq!(ticks.off, MAX_TICK);
        assert!(ticks.on < ticks.off);
    }

    #[test]
    fn test_off_before_on_is_an_error() {
        let timing = default_timing();
        let res = encode(ServoPosition::At(0.5), &timing, 20_500.0);
        assert!(matches!(res, Err(ServoError::Configuration(_))));
    }

    #[test]
    fn test_zero_width_pulse_is_an_error() {
        //a 1us pulse starts and ends inside the same tick
        let timing = PwmTiming {
            servo_min_us: 1.0,
            ..default_timing()
        };
        let res = encode(ServoPosition::At(0.0), &timing, 10.0);
        assert!(matches!(res, Err(ServoError::Configuration(_))));
        assert!(encode(ServoPosition::At(0.5), &timing, 10.0).is_ok());
    }

    #[test]
    fn test_encode_channel_bad_index() {
        let timing = default_timing();
        assert!(matches!(
            timing.encode_channel(ServoPosition::At(0.5), 16),
            Err(ServoError::InvalidChannel(16))
        ));
    }

    #[test]
    fn test_ticks_bytes() {
        let ticks = PwmTicks { on: 2, off: 514 };
        assert_eq!(ticks.to_bytes(), [0x02, 0x00, 0x02, 0x02]);
        assert_eq!(PwmTicks::from_bytes([0x02, 0x00, 0x02, 0x02]), ticks);
        assert_eq!(PwmTicks::OFF.to_bytes(), [0, 0, 0, 0]);
    }

    #[test]
    fn test_pulse_width() {
        let ticks = PwmTicks { on: 0, off: 2048 };
        assert_eq!(ticks.pulse_width_us(20_000.0), 10_000.0);
        assert_eq!(PwmTicks::OFF.pulse_width_us(20_000.0), 0.0);
    }
}
