use pca_servos_core::{config::DeviceConfig, error::ServoError, transport::TransportProvider};
use pca_servos_devices::devices::pca9685::Pca9685Servos;
use pca_servos_sims::SimulatedPca9685;
use serde::Deserialize;
use tracing::info;

#[cfg(feature = "rpi")]
use pca_servos_core::error::TransportError;
#[cfg(feature = "rpi")]
use pca_servos_devices::i2c::I2cTransport;
#[cfg(feature = "rpi")]
use pca_servos_rpi::I2c;

pub mod demo;

use demo::DemoOp;

#[cfg(feature = "rpi")]
fn i2c_bus_provider(bus: u8, address: u8) -> Result<I2cTransport<I2c>, TransportError> {
    let i2c = pca_servos_rpi::get_bus(bus)?;
    Ok(I2cTransport::new(i2c, address))
}

///Where the PCA9685 lives.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    //an in-memory chip, for running without hardware
    #[default]
    Sim,

    //the i2c bus of a Raspberry Pi
    #[cfg(feature = "rpi")]
    Rpi,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub demo: DemoOp,
}

impl AppConfig {
    ///Brings up the device, runs the demo until it finishes or ctrl-c, then closes the device.
    pub async fn start(&self) -> Result<(), ServoError> {
        match self.backend {
            Backend::Sim => {
                let sim = SimulatedPca9685::new();
                let servos = Pca9685Servos::init(self.device.clone(), sim.provider()).await?;
                run_until_stopped(&servos, &self.demo).await
            }
            #[cfg(feature = "rpi")]
            Backend::Rpi => {
                let servos = Pca9685Servos::init(self.device.clone(), i2c_bus_provider).await?;
                run_until_stopped(&servos, &self.demo).await
            }
        }
    }
}

async fn run_until_stopped<P: TransportProvider>(
    servos: &Pca9685Servos<P>,
    op: &DemoOp,
) -> Result<(), ServoError> {
    let res = tokio::select! {
        res = op.run(servos) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
            Ok(())
        }
    };
    let closed = servos.close().await;
    res.and(closed)
}
