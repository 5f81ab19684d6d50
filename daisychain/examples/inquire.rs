use clap::Parser;
use daisychain::{
    protocol::{op, OperationKind},
    Error, Result, SessionConfig, ViscaController,
};
use std::path::PathBuf;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

/// Addresses a VISCA bus, and runs operations on one camera.
///
/// Operations are named as in `daisychain_protocol::op::lookup`, eg:
///
///   inquire -p /dev/ttyUSB0 zoom_position_inquiry pan_tilt_home
#[derive(Debug, Parser)]
#[clap(verbatim_doc_comment)]
struct CliParser {
    /// Serial port the first camera is attached to.
    #[clap(short, long)]
    pub port: Option<String>,

    /// Session configuration file (TOML).
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Camera address on the bus.
    #[clap(short, long, default_value = "1")]
    pub device: u8,

    /// List all known operation names, and exit.
    #[clap(short, long)]
    pub list: bool,

    /// Operations to run, in order.
    pub ops: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .compact()
        .init();
    let opts = CliParser::parse();

    if opts.list {
        for name in op::names() {
            println!("{name}");
        }
        return Ok(());
    }

    let mut config = match &opts.config {
        Some(path) => SessionConfig::from_file(path)?,
        None => SessionConfig::default(),
    };
    if let Some(port) = opts.port {
        config.serial.path = port;
    }

    let visca = ViscaController::open(&config)?;
    let count = visca.discover().await?;
    info!("Found {count} camera(s)");

    let camera = visca.camera_info(opts.device).await?;
    info!(
        "Camera {}: vendor {:#06x}, model {:#06x}, ROM {:#06x}",
        opts.device, camera.vendor, camera.model, camera.rom_version
    );

    for name in &opts.ops {
        let Some(operation) = op::lookup(name) else {
            error!("Unknown operation: {name}");
            continue;
        };

        let r = match operation.kind {
            OperationKind::Command => visca
                .send_command(opts.device, &operation)
                .await
                .map(|o| format!("{o:?}")),
            OperationKind::Inquiry => visca
                .send_inquiry(opts.device, &operation)
                .await
                .map(|v| format!("{v:?}")),
        };

        match r {
            Ok(r) => info!("{name}: {r}"),
            Err(Error::NotExecutable) => info!("{name}: not executable right now"),
            Err(e) => error!("{name}: {e}"),
        }
    }

    Ok(())
}
