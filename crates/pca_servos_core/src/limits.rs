use crate::{clamp_position, error::ServoError};

///User set bounds on a servo's travel, as normalized positions. Always `0 <= min <= max <= 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    min: f64,
    max: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

impl Limits {
    ///`min` is raised to 0 and `max` lowered to 1 independently. Inverted bounds are an error, not swapped.
    pub fn new(min: f64, max: f64) -> Result<Self, ServoError> {
        if min.is_nan() || max.is_nan() {
            return Err(ServoError::configuration("servo limits must not be NaN"));
        }
        let min = min.max(0.0);
        let max = max.min(1.0);
        if min > max {
            return Err(ServoError::Configuration(format!(
                "servo limit min {} is greater than max {}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    ///Clamps an absolute normalized position into these limits.
    pub fn clamp(&self, position: f64) -> f64 {
        clamp_position(position, self.min, self.max)
    }

    ///Maps a position relative to these limits (0 = min, 1 = max) to an absolute normalized position.
    pub fn scale(&self, scaled: f64) -> f64 {
        scaled * self.range() + self.min
    }
}
