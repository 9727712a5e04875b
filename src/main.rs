// ██╗  ██╗ █████╗ ███╗   ██╗██████╗ ██╗     ███████╗
// ██║  ██║██╔══██╗████╗  ██║██╔══██╗██║     ██╔════╝
// ███████║███████║██╔██╗ ██║██║  ██║██║     █████╗
// ██╔══██║██╔══██║██║╚██╗██║██║  ██║██║     ██╔══╝
// ██║  ██║██║  ██║██║ ╚████║██████╔╝███████╗███████╗
// ╚═╝  ╚═╝╚═╝  ╚═╝╚═╝  ╚═══╝╚═════╝ ╚══════╝╚══════╝
//
// H U N T
//
// One username, every service in the catalog, fifteen doors at a time.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use handle_hunt_engine::{
    default_catalog, load_catalog, Config, ReqwestTransport, ScanCoordinator, ScanResult,
};

/// Check which services have an account registered under a username.
#[derive(Debug, Parser)]
#[command(name = "handle-hunt", version, about, long_about = None)]
struct Cli {
    /// Username to look for.
    username: String,

    /// JSON catalog to use instead of the built-in one.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Maximum simultaneous probes.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-probe timeout in milliseconds.
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Route probes through the forwarding proxy.
    #[arg(long, default_value_t = false)]
    proxy: bool,

    /// Print results and the summary as JSON lines.
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.catalog {
            config.catalog_path = Some(path.clone());
        }
        if let Some(n) = self.concurrency {
            config.concurrency_limit = n.max(1);
        }
        if let Some(ms) = self.timeout_ms {
            config.set_probe_timeout_ms(ms);
        }
        if self.proxy {
            config.use_forwarding_proxy = true;
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(true);

    if json {
        builder.json().init();
    } else {
        builder.with_ansi(true).init();
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env();
    cli.apply(&mut config);
    init_tracing(config.log_json);

    let username = cli.username.trim().to_string();
    if username.is_empty() {
        bail!("username must not be empty");
    }

    let catalog = match &config.catalog_path {
        Some(path) => load_catalog(path)
            .with_context(|| format!("loading catalog {}", path.display()))?,
        None => default_catalog(),
    };

    info!(
        username = %username,
        entries = catalog.len(),
        concurrency = config.concurrency_limit,
        timeout_ms = config.probe_timeout.as_millis() as u64,
        proxy = config.use_forwarding_proxy,
        "handle-hunt starting"
    );

    let transport = Arc::new(ReqwestTransport::new().context("building HTTP client")?);
    let coordinator = ScanCoordinator::from_config(&config, transport);

    // Ctrl-C stops dispatch; probes already out finish and still report.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, draining in-flight probes");
            let _ = shutdown_tx.send(true);
        }
    });

    let (result_tx, result_rx) = crossbeam_channel::unbounded::<ScanResult>();
    let json = cli.json;
    let reporter = std::thread::Builder::new()
        .name("reporter".into())
        .spawn(move || {
            for result in result_rx.iter() {
                if json {
                    match serde_json::to_string(&result) {
                        Ok(line) => println!("{line}"),
                        Err(e) => warn!(error = %e, "Failed to serialize result"),
                    }
                } else {
                    println!("{result}");
                }
            }
        })
        .context("spawning reporter thread")?;

    let summary = coordinator
        .scan_to_channel(
            &catalog,
            &username,
            config.use_forwarding_proxy,
            shutdown_rx,
            result_tx,
        )
        .await;

    // The reporter exits once the last sender is dropped with the scan; join
    // it off the runtime so a slow stdout does not stall a worker thread.
    match tokio::task::spawn_blocking(move || reporter.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => warn!("Reporter thread panicked"),
        Err(e) => warn!(error = %e, "Failed to join reporter thread"),
    }

    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!();
        println!("{summary}");
    }

    Ok(())
}
