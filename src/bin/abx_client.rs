use std::path::PathBuf;
use std::time::Duration;

use abx_replay::{output, ClientConfig, RecoveryCoordinator, Transport};
use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "abx-client")]
#[command(about = "Replay every packet from an ABX server, recover gaps, write ordered JSON")]
struct Args {
    /// JSON config file (host, port, timeouts in ms)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Connect timeout in milliseconds (overrides config)
    #[arg(long)]
    connect_timeout_ms: Option<u64>,

    /// Read timeout in milliseconds (overrides config)
    #[arg(long)]
    read_timeout_ms: Option<u64>,

    /// Output JSON path
    #[arg(short, long, default_value = "output.json")]
    output: PathBuf,

    /// Exit with an error when any sequence could not be recovered
    #[arg(long)]
    fail_on_gaps: bool,
}

impl Args {
    fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ClientConfig::default(),
        };
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.read_timeout_ms {
            config.read_timeout = Duration::from_millis(ms);
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.client_config()?;

    let transport = Transport::new(config).context("failed to set up transport")?;
    info!("Replaying from {}", transport.addr());
    let mut coordinator = RecoveryCoordinator::new(transport);
    let report = coordinator
        .run()
        .context("replay aborted, no output written")?;
    debug!("recovery finished in {} phase", coordinator.phase());

    output::write_json(&args.output, &report.packets)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!(
        "Wrote {} packets to {}",
        report.packets.len(),
        args.output.display()
    );

    if !report.is_complete() {
        warn!(
            "{} sequences could not be recovered",
            report.unresolved_count()
        );
        for gap in &report.unresolved {
            warn!("  missing {gap}");
        }
        if args.fail_on_gaps {
            anyhow::bail!(
                "output is incomplete: {} unresolved sequences",
                report.unresolved_count()
            );
        }
    }
    Ok(())
}
