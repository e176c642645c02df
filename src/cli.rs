use std::path::PathBuf;

use clap::Args;

use crate::config::DEFAULT_CONFIG_PATH;
use crate::store::{DataDir, DEFAULT_DATA_DIR, DEFAULT_SESSIONS_DIR};

/// File locations shared by all three binaries.
#[derive(Debug, Clone, Args)]
pub struct Paths {
    /// JSON configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Directory for scraped members, stats and progress
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Directory holding one session file per account
    #[arg(long, default_value = DEFAULT_SESSIONS_DIR)]
    pub sessions_dir: PathBuf,
}

impl Paths {
    pub fn data(&self) -> DataDir {
        DataDir::new(&self.data_dir)
    }

    /// Creates the data and sessions directories when missing.
    pub fn prepare(&self) -> anyhow::Result<DataDir> {
        std::fs::create_dir_all(&self.sessions_dir)?;
        let data = self.data();
        data.ensure()?;
        Ok(data)
    }
}
