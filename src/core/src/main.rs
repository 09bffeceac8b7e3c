use clap::Parser;
use dockgate::configuration::config::{CliOverrides, Config};
use dockgate::container_management::{ContainerRuntime, DockerEngine};
use dockgate::session_management::SessionManager;
use dockgate::web_interface::WebServer;
use log::{error, info, LevelFilter};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "dockgate")]
#[command(version)]
#[command(about = "Interactive terminal, log and stats sessions into running containers")]
struct Args {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(env = "DOCKGATE_CONFIG")]
    config_file: Option<PathBuf>,

    #[command(flatten)]
    overrides: CliOverrides,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // RUST_LOG, when set, refines the level chosen here.
    env_logger::Builder::new()
        .filter_level(if args.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .parse_default_env()
        .format_target(false)
        .init();

    info!("Importing configuration");
    let loaded = match &args.config_file {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    };
    let config = match loaded.and_then(|config| config.with_overrides(&args.overrides)) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Configuration imported successfully");

    let runtime: Arc<dyn ContainerRuntime> = match DockerEngine::new(&config.runtime) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!("Unable to create the runtime client: {}, exiting...", e);
            std::process::exit(1);
        }
    };
    let session_manager = Arc::new(SessionManager::new(runtime, config.session.clone()));
    let server = WebServer::new(session_manager);

    // Already validated as an IP address.
    let ip: IpAddr = match config.bind_address.parse() {
        Ok(ip) => ip,
        Err(e) => {
            error!("Invalid bind address {}: {}", config.bind_address, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = server.start(SocketAddr::new(ip, config.port)).await {
        error!("Web server stopped: {}, exiting...", e);
        std::process::exit(1);
    }
}
