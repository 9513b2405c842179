//!This is the core library for the pca_servos project. All other pca_servos libraries depend on this one. It holds the data types, the
//!register value computation and the motion interpolation used to drive hobby servos from a PCA9685.
//!
//!Nothing in here touches hardware. Bus access goes through the `transport::RegisterTransport` trait.

use error::ServoError;

pub mod config;
pub mod encoder;
pub mod error;
pub mod limits;
pub mod motion;
pub mod registers;
pub mod transport;

///Number of PWM outputs on a PCA9685.
pub const CHANNEL_COUNT: usize = 16;

///A servo command or reading. `Off` disables the output entirely, which is different from `At(0.0)`,
///a real pulse at the configured minimum width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServoPosition {
    Off,
    At(f64),
}

impl ServoPosition {
    ///The normalized position, or `None` when the output is off.
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Off => None,
            Self::At(posn) => Some(*posn),
        }
    }

    pub fn is_off(&self) -> bool {
        matches!(self, Self::Off)
    }
}

impl From<f64> for ServoPosition {
    fn from(posn: f64) -> Self {
        ServoPosition::At(posn)
    }
}

///Checks a channel number and turns it into an index for per-channel tables.
pub fn channel_index(channel: u8) -> Result<usize, ServoError> {
    let idx = channel as usize;
    if idx < CHANNEL_COUNT {
        Ok(idx)
    } else {
        Err(ServoError::InvalidChannel(channel))
    }
}

///Clamps `value` into `[min, max]`. NaN maps to `min`.
pub fn clamp_position(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.max(min).min(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_index() {
        assert_eq!(channel_index(0).unwrap(), 0);
        assert_eq!(channel_index(15).unwrap(), 15);
        assert!(matches!(channel_index(16), Err(ServoError::InvalidChannel(16))));
        assert!(matches!(channel_index(255), Err(ServoError::InvalidChannel(255))));
    }

    #[test]
    fn test_clamp_position() {
        assert_eq!(clamp_position(0.5, 0.0, 1.0), 0.5);
        assert_eq!(clamp_position(-3.0, 0.2, 0.8), 0.2);
        assert_eq!(clamp_position(f64::INFINITY, 0.2, 0.8), 0.8);
        assert_eq!(clamp_position(f64::NAN, 0.2, 0.8), 0.2);
    }

    #[test]
    fn test_servo_position() {
        assert_eq!(ServoPosition::from(0.25), ServoPosition::At(0.25));
        assert_eq!(ServoPosition::At(0.25).value(), Some(0.25));
        assert_eq!(ServoPosition::Off.value(), None);
        assert!(ServoPosition::Off.is_off());
    }
}
