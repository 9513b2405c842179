//!Devices built on `pca_servos_core`. Each device owns a transport obtained from a `TransportProvider`, so it can
//!run against real hardware (see `pca_servos_rpi`) or a simulation (see `pca_servos_sims`).

pub mod devices;

///Adapter from an embedded-hal i2c bus to a `RegisterTransport`.
#[cfg(feature = "i2c")]
pub mod i2c;
