//! nettune
//!
//! Two frontends over one data model:
//! - `server`: the tuning daemon (HTTP API + apply engine), run as root on
//!   the machine being tuned
//! - `client`: the MCP stdio server an LLM operator connects through

use anyhow::Result;
use clap::Parser;
use nettune_core::{ClientConfig, ServerConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "nettune")]
#[command(about = "Remote Linux network tuning: probes, profiles, apply/rollback")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the tuning server (requires root for sysctl/tc/systemctl)
    Server {
        /// API key clients must present as a bearer token
        #[arg(long)]
        api_key: String,

        /// Bind address (host:port)
        #[arg(long, default_value = "0.0.0.0:9876")]
        listen: String,

        /// Directory for profiles, snapshots and history
        #[arg(long, default_value = "/var/lib/nettune")]
        state_dir: PathBuf,

        /// HTTP read timeout in seconds
        #[arg(long, default_value = "30")]
        read_timeout: u64,

        /// HTTP write timeout in seconds
        #[arg(long, default_value = "60")]
        write_timeout: u64,
    },

    /// Run the MCP stdio client against a nettune server
    Client {
        /// API key for the server
        #[arg(long)]
        api_key: String,

        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:9876")]
        server: String,

        /// Request timeout in seconds (throughput probes need headroom)
        #[arg(long, default_value = "60")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The MCP client speaks JSON-RPC on stdout; logs must go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nettune=info".parse()?)
                .add_directive("nettune_server=info".parse()?)
                .add_directive("nettune_engine=info".parse()?)
                .add_directive("nettune_adapter=info".parse()?)
                .add_directive("nettune_client=info".parse()?),
        )
        .init();

    match args.command {
        Commands::Server {
            api_key,
            listen,
            state_dir,
            read_timeout,
            write_timeout,
        } => {
            let config = ServerConfig {
                listen,
                api_key,
                state_dir,
                read_timeout,
                write_timeout,
                ..ServerConfig::default()
            };

            info!(listen = %config.listen, "starting nettune server");
            let state = nettune_server::AppState::new(config).await?;
            nettune_server::serve(state).await
        }
        Commands::Client {
            api_key,
            server,
            timeout,
        } => {
            let config = ClientConfig {
                server,
                api_key,
                timeout,
            };

            let client = nettune_client::Client::new(&config)?;
            let mcp = nettune_client::McpServer::new(client);
            nettune_client::mcp::stdio::serve(mcp).await
        }
    }
}
