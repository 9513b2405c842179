//!This library provides access to the Raspberry Pi I2C buses. It is a wrapper around the rppal library.
//!
//! The `get_bus` and `get_default_bus` functions get an I2C bus instance that can be wrapped in a
//! `pca_servos_devices::i2c::I2cTransport` to drive a PCA9685.

//internal error type for rpi buses
pub mod error;

use error::BusError;
use tracing::debug;

pub use rppal;
pub use rppal::i2c::I2c;

//get i2c bus by id
pub fn get_bus(bus: u8) -> Result<I2c, BusError> {
    let i2c = I2c::with_bus(bus)?;
    debug!("opened i2c bus {} at {} Hz", bus, i2c.clock_speed().unwrap_or_default());
    Ok(i2c)
}

//get default i2c bus
pub fn get_default_bus() -> Result<I2c, BusError> {
    Ok(I2c::new()?)
}
