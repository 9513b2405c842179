pub mod config;

use config::{demo::DemoOp, AppConfig};
use config_rs::{Config, File};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG_NAME: &str = "pca_servos";

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pca_servos=debug,pca_servos_devices=debug,pca_servos_sims=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 3 {
        warn!("expected at most two parameters, the config file and the demo op (wiggle, sweep or park).");
        warn!("got {}", args.join(","));
        return;
    }

    //without an explicit config file the defaults are fine
    let cfg_name = args.get(1).map(|o| o.as_str()).unwrap_or(DEFAULT_CONFIG_NAME);
    let config_res = Config::builder()
        .add_source(File::with_name(cfg_name).required(args.len() > 1))
        .build()
        .and_then(|config| config.try_deserialize::<AppConfig>());

    let mut config = match config_res {
        Ok(config) => config,
        Err(err) => {
            error!("Error starting pca_servos. Failed to parse config: {:?}", err);
            return;
        }
    };

    if let Some(op_name) = args.get(2) {
        match DemoOp::from_name(op_name) {
            Some(op) => config.demo = op,
            None => {
                error!("unknown demo op {}", op_name);
                return;
            }
        }
    }

    info!("pca_servos starting up! backend {:?}, demo {:?}", config.backend, config.demo);
    match config.start().await {
        Ok(_) => info!("pca_servos shut down!"),
        Err(err) => error!("pca_servos exited with an error: {}", err),
    }
}
