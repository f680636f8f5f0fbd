use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::Subcommand;
use toml_edit::{DocumentMut, InlineTable, Item, Table, value};
use tracing::info;

#[derive(Subcommand)]
pub enum CmdConfig {
    /// Creates the config file if it doesn't exist and fills in missing defaults
    Init,
}

impl CmdConfig {
    pub fn run(self, config_file: PathBuf, local_data_dir: &Path) -> anyhow::Result<()> {
        let mut doc = if config_file.exists() {
            fs::read_to_string(&config_file)?
        } else {
            if let Some(parent) = config_file.parent() {
                fs::create_dir_all(parent)?;
            }
            "".to_owned()
        }
        .parse::<DocumentMut>()
        .context("could not parse config file")?;

        match self {
            Self::Init => {
                let queue = section(&mut doc, "queue")?;
                queue
                    .entry("url")
                    .or_insert(value("nats://127.0.0.1:4222"));

                let pipeline = section(&mut doc, "pipeline")?;
                pipeline.entry("workers").or_insert(value(2i64));
                let mut drop_policy = InlineTable::new();
                drop_policy.insert("type", "drop".into());
                pipeline
                    .entry("failure_policy")
                    .or_insert(value(drop_policy));

                let database_dir = local_data_dir.join("db");
                let database_dir = database_dir
                    .to_str()
                    .context("data directory is not valid UTF-8")?;
                section(&mut doc, "database")?
                    .entry("path")
                    .or_insert(value(database_dir));

                section(&mut doc, "ipfs")?
                    .entry("api_url")
                    .or_insert(value("http://127.0.0.1:5001"));
            }
        }

        info!("writing to config file {config_file:?}");

        let tmp_path = config_file.with_extension("tmp");
        let mut tmp = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.write_all(doc.to_string().as_bytes())?;
        tmp.sync_all()?;
        std::fs::rename(&tmp_path, config_file)?;
        Ok(())
    }
}

fn section<'a>(doc: &'a mut DocumentMut, name: &str) -> anyhow::Result<&'a mut Table> {
    doc.entry(name)
        .or_insert(Item::Table(Table::new()))
        .as_table_mut()
        .with_context(|| format!("[{name}] in the config file is not a table"))
}
