//! dev-proxy
//!
//! Standalone front end for the proxy plugin: loads `proxy.config.toml` /
//! `proxy.config.json`, generates the routes for the selected environment
//! and serves them.
//!
//! ```text
//!     Browser ──▶ dev-proxy (:5173) ──▶ longest matching route ──▶ backend
//!                      │                                     ╰──▶ backend (ws)
//!                      ╰── 404 when nothing matches
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use dev_proxy::config::loader::load_options;
use dev_proxy::config::{FileConfigSource, NoExternalConfig};
use dev_proxy::observability::init_tracing;
use dev_proxy::plugin::PluginState;
use dev_proxy::{Command, DevServerConfig, HttpServer, ProxyOptions, ProxyPlugin, Shutdown};

#[derive(Parser)]
#[command(name = "dev-proxy")]
#[command(about = "Environment-aware development proxy", long_about = None)]
struct Cli {
    /// Options file; defaults to the first proxy.config.* found in --root
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Project root searched for proxy.config.toml / proxy.config.json
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Environment to proxy to (overrides the config file)
    #[arg(short, long)]
    env: Option<String>,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:5173")]
    listen: String,

    /// Start with proxying disabled
    #[arg(long)]
    disable: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let source = match &cli.config {
        Some(path) => FileConfigSource::file(path),
        None => FileConfigSource::discover(&cli.root),
    };
    let (external, load_error) = match source.resolve() {
        Some(path) => match load_options(&path) {
            Ok(options) => (Some(options), None),
            Err(e) => (None, Some(e)),
        },
        None => (None, None),
    };

    let defaults = ProxyOptions::default();
    init_tracing(&PluginState::from_options(external.as_ref().unwrap_or(&defaults)).logger);
    tracing::info!("dev-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    if let Some(e) = load_error {
        tracing::warn!(error = %e, "Ignoring external proxy config");
    }

    let mut plugin = ProxyPlugin::new(defaults);
    if let Some(external) = external {
        plugin.merge_external_config(external);
    }
    if let Some(env) = cli.env {
        plugin.switch_environment(env);
    }
    if cli.disable {
        plugin.disable();
    }

    let mut host = DevServerConfig::default();
    plugin.configure(Command::Serve, &mut host, &NoExternalConfig).await;
    if host.proxy.is_empty() {
        tracing::warn!(env = %plugin.state().env, "No proxy routes configured");
    }
    for (path, route) in host.proxy.iter() {
        tracing::info!(path = %path, target = %route.route().target, "Proxy route");
    }

    let listener = TcpListener::bind(&cli.listen).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");
    plugin.configure_server();

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();

    HttpServer::new(host.proxy)
        .run(listener, shutdown.subscribe())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
