use std::fmt::{Debug, Display, Formatter};

use pca_servos_core::error::TransportError;

pub struct BusError {
    pub message: String,
}

impl Debug for BusError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_str(&self.message)
    }
}

impl Display for BusError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_str(&self.message)
    }
}

impl std::error::Error for BusError {}

impl From<&str> for BusError {
    fn from(s: &str) -> Self {
        Self {
            message: s.to_string(),
        }
    }
}

impl From<String> for BusError {
    fn from(s: String) -> Self {
        Self { message: s }
    }
}

impl From<rppal::i2c::Error> for BusError {
    fn from(err: rppal::i2c::Error) -> Self {
        Self {
            message: format!("RpiI2cError - Cause: {}", err),
        }
    }
}

impl From<BusError> for TransportError {
    fn from(err: BusError) -> Self {
        TransportError::from_string(err.message)
    }
}
