//! waylink CLI: runs the Wayland display connection manager.

use std::path::PathBuf;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use waylink_daemon::setup::load_config;
use waylink_daemon::{Config, Environment, Instance, ModuleCommand, PRIMARY_DISPLAY};

#[derive(Parser)]
#[command(
    name = "waylink",
    about = "Keep an input method connected to Wayland displays",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the displays and run until stopped.
    Start {
        /// Path to configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Extra display to connect to. May be repeated.
        #[arg(short, long = "display", value_name = "NAME")]
        displays: Vec<String>,
    },

    /// Print the detected session and the resolved configuration.
    Check {
        /// Path to configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Host side of the module when running on its own.
///
/// There is no input method framework behind it: exit requests stop the
/// loop and keyboard parameters are only logged.
struct StandaloneInstance {
    commands: mpsc::UnboundedSender<ModuleCommand>,
    default_layout: String,
}

impl Instance for StandaloneInstance {
    fn exit(&self) {
        info!("primary display is gone, exiting");
        let _ = self.commands.send(ModuleCommand::Shutdown);
    }

    fn set_xkb_parameters(&self, display: &str, rules: &str, model: &str, options: &str) {
        let display_name = display;
        info!(display = %display_name, %rules, %model, %options, "xkb parameters");
    }

    fn current_group_default_layout(&self) -> String {
        self.default_layout.clone()
    }
}

fn init_tracing(config: &Config) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.daemon.log_level)),
        )
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config, displays } => {
            let mut config = load_config(config.as_deref())?;
            init_tracing(&config);
            config.module.displays.extend(displays);
            start(config).await?;
        }
        Commands::Check { config } => {
            let config = load_config(config.as_deref())?;
            init_tracing(&config);
            check(&config)?;
        }
    }

    Ok(())
}

#[cfg(feature = "wayland")]
async fn start(config: Config) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    use waylink_daemon::WaylandModule;
    use waylink_transport::wayland::WaylandConnector;

    let environment = Environment::detect();
    info!(
        session = environment.session_type().unwrap_or("unknown"),
        desktop = %environment.desktop_type(),
        "starting waylink"
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let instance = Rc::new(StandaloneInstance {
        commands: tx.clone(),
        default_layout: config.input.default_layout.clone(),
    });

    let mut module = WaylandModule::new(&config, environment, instance, WaylandConnector, rx);
    if !module.registry().contains(PRIMARY_DISPLAY) {
        warn!("could not connect to the primary display");
    }

    let shutdown_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c");
            let _ = shutdown_tx.send(ModuleCommand::Shutdown);
        }
    });

    // SIGUSR1 stands in for a group switch of the input method.
    let group_tx = tx.clone();
    tokio::spawn(async move {
        let mut usr1 = match signal(SignalKind::user_defined1()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGUSR1");
                return;
            }
        };
        while usr1.recv().await.is_some() {
            if group_tx.send(ModuleCommand::GroupChanged).is_err() {
                break;
            }
        }
    });

    let _ = tx.send(ModuleCommand::GroupChanged);
    module.run().await?;
    Ok(())
}

#[cfg(not(feature = "wayland"))]
async fn start(_config: Config) -> anyhow::Result<()> {
    anyhow::bail!("waylink was built without the `wayland` feature")
}

fn check(config: &Config) -> anyhow::Result<()> {
    let environment = Environment::detect();
    println!(
        "Session type: {}",
        environment.session_type().unwrap_or("unknown")
    );
    println!("Desktop:      {}", environment.desktop_type());
    println!("Wayland:      {}", environment.is_wayland_session());
    println!(
        "Layout sync:  {}",
        config.layout_sync.enabled && environment.is_plasma_wayland()
    );

    #[cfg(feature = "wayland")]
    {
        use waylink_transport::wayland::WaylandConnector;
        use waylink_transport::Connector;

        let names = std::iter::once(PRIMARY_DISPLAY)
            .chain(config.module.displays.iter().map(String::as_str));
        for name in names {
            let target = if name.is_empty() { None } else { Some(name) };
            let label = target.unwrap_or("<primary>");
            match WaylandConnector.connect(target) {
                Ok(_) => println!("Display {label}: reachable"),
                Err(e) => println!("Display {label}: {e}"),
            }
        }
    }

    println!();
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
