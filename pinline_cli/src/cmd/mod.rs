use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pinline_backend_redb::RedbStore;
use pinline_node::PipelineConfig;

mod admin;

pub use admin::{run_network, run_user};

pub async fn run_command(
    config_file: PathBuf,
    local_data_dir: &Path,
    cmd: crate::Commands,
) -> Result<()> {
    match cmd {
        crate::Commands::Config { cmd } => cmd.run(config_file, local_data_dir),
        crate::Commands::Queue { kind, workers } => {
            let config = load_config(&config_file)?;
            let workers = workers.unwrap_or(config.pipeline.workers);
            pinline_node::run_queue(config, kind, workers).await
        }
        crate::Commands::User { cmd } => {
            let db = open_database(&load_config(&config_file)?)?;
            run_user(cmd, &db).await
        }
        crate::Commands::Network { cmd } => {
            let db = open_database(&load_config(&config_file)?)?;
            run_network(cmd, &db).await
        }
    }
}

fn load_config(config_file: &Path) -> Result<PipelineConfig> {
    let toml_content = std::fs::read_to_string(config_file).with_context(|| {
        format!("could not read {config_file:?}, run `pinline config init` first")
    })?;
    toml::from_str(&toml_content).with_context(|| format!("invalid config file {config_file:?}"))
}

fn open_database(config: &PipelineConfig) -> Result<RedbStore> {
    RedbStore::open(&config.database.path)
        .with_context(|| format!("opening database in {}", config.database.path))
}
