//! tagrpc - Tagged-message RPC over one-shot TCP connections
//!
//! Serves a small upper-casing service and a crafting service, and provides
//! the client commands to talk to them.

mod config;
mod dispatch;
mod network;
mod protocol;
mod service;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use network::{resolve_server, Client, ClientError, ClientResult, Server, ServerEvent};
use protocol::{MaterialRequest, RecipeCreateRequest, Registry, UpperRequest};
use service::ServiceKind;

/// tagrpc - Tagged-message RPC over TCP
#[derive(Parser)]
#[command(name = "tagrpc")]
#[command(version = "0.1.0")]
#[command(about = "Serve and call tagged-message RPC services", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a service
    Serve {
        /// Service to run
        #[arg(value_enum)]
        service: ServiceKind,

        /// Interface to bind to
        #[arg(short, long)]
        bind: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// TOML file of recipes for the atelier service
        #[arg(short, long)]
        recipes: Option<PathBuf>,
    },

    /// Ask the upper service to upper-case some text
    Upper {
        /// Text to convert
        text: String,

        /// Server address (`host` or `host:port`)
        #[arg(short, long)]
        server: Option<String>,
    },

    /// List the materials the atelier knows
    Materials {
        /// Server address (`host` or `host:port`)
        #[arg(short, long)]
        server: Option<String>,
    },

    /// Combine two materials at the atelier
    Craft {
        /// Materials as "first,second"
        materials: String,

        /// Server address (`host` or `host:port`)
        #[arg(short, long)]
        server: Option<String>,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose || config.general.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(config.general.log_filter.as_deref().unwrap_or("info"))
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Serve {
            service,
            bind,
            port,
            recipes,
        } => {
            run_server(config, service, bind, port, recipes).await?;
        }
        Commands::Upper { text, server } => {
            let client = Client::new(config.network_config(), Registry::upper());
            let addr = resolve_server(&server_name(&config, server), config.network.port).await?;
            let reply = client.request(addr, UpperRequest { text }).await;
            let reply = exit_on_exception(reply)?;
            println!("\nResult :\n{}", reply.result);
        }
        Commands::Materials { server } => {
            let client = Client::new(config.network_config(), Registry::atelier());
            let addr = resolve_server(&server_name(&config, server), config.network.port).await?;
            let reply = exit_on_exception(client.request(addr, MaterialRequest {}).await)?;

            println!("First materials:");
            for material in &reply.material1 {
                println!("  {}", material);
            }
            println!("Second materials:");
            for material in &reply.material2 {
                println!("  {}", material);
            }
        }
        Commands::Craft { materials, server } => {
            let client = Client::new(config.network_config(), Registry::atelier());
            let addr = resolve_server(&server_name(&config, server), config.network.port).await?;
            let reply = client.request(addr, RecipeCreateRequest { materials }).await;
            let reply = exit_on_exception(reply)?;
            println!("{}", reply.result);
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

/// Run a service until Ctrl+C
async fn run_server(
    mut config: Config,
    service: ServiceKind,
    bind: Option<String>,
    port: Option<u16>,
    recipes: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        config.network.bind_address = bind;
    }
    if let Some(port) = port {
        config.network.port = port;
    }
    if recipes.is_some() {
        config.recipes.path = recipes;
    }

    let table = match service {
        ServiceKind::Atelier => {
            let table = config.recipe_table()?;
            tracing::info!("Loaded {} recipes", table.len());
            table
        }
        ServiceKind::Upper => Default::default(),
    };
    let dispatcher = service.dispatcher(Arc::new(table))?;
    tracing::debug!("Dispatcher: {:?}", dispatcher);

    let mut server = Server::new(config.network_config(), dispatcher);
    let mut event_rx = server
        .take_event_receiver()
        .ok_or_else(|| anyhow::anyhow!("Server event receiver already taken"))?;

    let addr = server.start().await?;
    tracing::info!("Serving {} on {}", service, addr);
    println!("Press Ctrl+C to stop.");

    // Main event loop
    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                match event {
                    ServerEvent::RequestHandled { addr, reply } => {
                        tracing::debug!("Answered {} with {}", addr, reply);
                    }
                    ServerEvent::ConnectionFailed { addr, reason } => {
                        tracing::debug!("No reply delivered to {}: {}", addr, reason);
                    }
                    ServerEvent::Stopped => break,
                    ServerEvent::Started { .. } => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    if server.is_running().await {
        server.stop().await?;
    }
    tracing::info!("Server stopped");

    Ok(())
}

/// Server from the command line, else from configuration
fn server_name(config: &Config, server: Option<String>) -> String {
    server.unwrap_or_else(|| config.client.server.clone())
}

/// Print a remote exception and exit with status 1, passing everything else through
fn exit_on_exception<T>(reply: ClientResult<T>) -> ClientResult<T> {
    if let Err(ClientError::Remote(message)) = &reply {
        println!("Exception: {}", message);
        std::process::exit(1);
    }
    reply
}
