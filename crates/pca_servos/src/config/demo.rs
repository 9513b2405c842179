use std::time::Duration;

use pca_servos_core::{error::ServoError, transport::TransportProvider};
use pca_servos_devices::devices::pca9685::Pca9685Servos;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::info;

///Swings one servo back and forth between the ends of its limits.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct WiggleConfig {
    pub channel: u8,
    pub min: f64,
    pub max: f64,
    pub cycles: u32,
    pub move_ms: u64,
    pub pause_ms: u64,
}

impl Default for WiggleConfig {
    fn default() -> Self {
        Self {
            channel: 13,
            min: 0.2,
            max: 0.8,
            cycles: 10,
            move_ms: 2000,
            pause_ms: 3000,
        }
    }
}

///Steps every servo together from 0 to 1.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SweepConfig {
    pub steps: u32,
    pub pause_ms: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            steps: 10,
            pause_ms: 500,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DemoOp {
    Wiggle(WiggleConfig),
    Sweep(SweepConfig),
    //switch every output off
    Park,
}

impl Default for DemoOp {
    fn default() -> Self {
        DemoOp::Wiggle(WiggleConfig::default())
    }
}

impl DemoOp {
    ///The op called `name`, with default settings.
    pub fn from_name(name: &str) -> Option<DemoOp> {
        match name {
            "wiggle" => Some(DemoOp::Wiggle(WiggleConfig::default())),
            "sweep" => Some(DemoOp::Sweep(SweepConfig::default())),
            "park" => Some(DemoOp::Park),
            _ => None,
        }
    }

    pub async fn run<P: TransportProvider>(&self, servos: &Pca9685Servos<P>) -> Result<(), ServoError> {
        match self {
            DemoOp::Wiggle(cfg) => wiggle(servos, cfg).await,
            DemoOp::Sweep(cfg) => sweep(servos, cfg).await,
            DemoOp::Park => {
                info!("parking all servos");
                servos.clear_all()
            }
        }
    }
}

async fn wiggle<P: TransportProvider>(servos: &Pca9685Servos<P>, cfg: &WiggleConfig) -> Result<(), ServoError> {
    servos.set_limits(cfg.channel, cfg.min, cfg.max)?;
    info!("wiggling servo {} {} times", cfg.channel, cfg.cycles);
    for i in 0..cfg.cycles {
        let scaled = (i & 1) as f64;
        servos.move_to_scaled(cfg.channel, scaled, Duration::from_millis(cfg.move_ms))?;
        sleep(Duration::from_millis(cfg.pause_ms)).await;
    }
    Ok(())
}

async fn sweep<P: TransportProvider>(servos: &Pca9685Servos<P>, cfg: &SweepConfig) -> Result<(), ServoError> {
    let steps = cfg.steps.max(1);
    info!("sweeping all servos in {} steps", steps);
    for i in 0..=steps {
        servos.set_all(i as f64 / steps as f64)?;
        sleep(Duration::from_millis(cfg.pause_ms)).await;
    }
    Ok(())
}
