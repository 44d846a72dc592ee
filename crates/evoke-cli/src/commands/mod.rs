pub mod aggregate;
pub mod dispatch;
pub mod run;
pub mod status;

use std::path::PathBuf;

use clap::Args;
use evoke_core::errors::BatchError;
use evoke_core::{load_config, BatchConfig};
use evoke_index::BidsIndex;
use evoke_store::ArtifactStore;

/// Dataset and configuration flags shared by every command.
#[derive(Args, Debug, Clone)]
pub struct DatasetArgs {
    /// YAML configuration; defaults apply when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Root of the BIDS dataset, overriding the configuration.
    #[arg(long)]
    pub bids_root: Option<PathBuf>,
}

impl DatasetArgs {
    /// Resolved configuration with command-line overrides applied.
    pub fn load(&self) -> Result<BatchConfig, BatchError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => BatchConfig::default(),
        };
        if let Some(root) = &self.bids_root {
            config.bids_root = root.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Index and store over the configured dataset.
pub fn open_dataset(config: &BatchConfig) -> (BidsIndex, ArtifactStore) {
    let index = BidsIndex::new(
        &config.bids_root,
        config.derivatives_root(),
        &config.recording_extension,
    );
    let store = ArtifactStore::new(config.derivatives_root());
    (index, store)
}
