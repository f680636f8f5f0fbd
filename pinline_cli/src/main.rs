use crate::init_config::CmdConfig;
use anyhow::Context;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::InfoLevel;
use directories::ProjectDirs;
use pinline_node::QueueKind;
use std::path::PathBuf;

mod cmd;
mod init_config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// config file to use instead of the one in the user's config directory
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<InfoLevel>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Modify the pipeline config
    Config {
        #[command(subcommand)]
        cmd: CmdConfig,
    },
    /// Consume one queue until Ctrl-C
    Queue {
        /// pin, file, cluster-pin, ipns-entry, key-creation, email-send or pin-removal
        kind: QueueKind,
        /// workers to start, each with its own broker connection
        #[arg(short, long, value_name = "COUNT", env = "WORKER_COUNT")]
        workers: Option<usize>,
    },
    /// Manage users in the pipeline database
    User {
        #[command(subcommand)]
        cmd: UserCmd,
    },
    /// Manage private networks in the pipeline database
    Network {
        #[command(subcommand)]
        cmd: NetworkCmd,
    },
}

#[derive(Subcommand)]
enum UserCmd {
    /// Create a user or change their email address
    Add { username: String, email: String },
    /// List the naming keys registered to a user
    Keys { username: String },
    /// Show a user's refunded credit balance
    Credits { username: String },
}

#[derive(Subcommand)]
enum NetworkCmd {
    /// Register a private network and grant users access to it
    Add {
        name: String,
        /// RPC url of the network's IPFS node
        api_url: String,
        /// user allowed on the network, may be repeated
        #[arg(short, long = "member", value_name = "USERNAME")]
        members: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    // Configs live under ~/.config/pinline/, data under ~/.local/share/pinline/
    let dirs = ProjectDirs::from("", "", "pinline")
        .context("failed to determine config directory path")?;
    let config_file = cli
        .config
        .unwrap_or_else(|| dirs.config_dir().join("pinline.toml"));

    cmd::run_command(config_file, dirs.data_dir(), cli.cmd).await
}
