//! Command-line interface for the `scalpel` binary
//!
//! Each command receives the resolved [`ScalpelConfig`] and runs its async
//! work on its own current-thread runtime.

pub mod config;
pub mod dedupe;
pub mod diagram;
pub mod error;
pub mod output;
pub mod paths;
pub mod serve;
pub mod status;
pub mod summary;

use scalpel::ScalpelConfig;
use scalpel_db::{ScalpelDb, StatusKind};
use std::future::Future;
use std::path::{Path, PathBuf};

use error::HelpfulError;

/// Run `fut` to completion on a fresh current-thread runtime.
pub fn block_on<F: Future>(fut: F) -> anyhow::Result<F::Output> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(rt.block_on(fut))
}

/// Root from the flag, else from the config. Must be an existing directory.
pub fn resolve_root(
    flag: Option<PathBuf>,
    config: &ScalpelConfig,
    kind: StatusKind,
) -> anyhow::Result<PathBuf> {
    let root = flag
        .map(|p| scalpel::config::expand_tilde(&p))
        .or_else(|| config.root_for(kind).map(Path::to_path_buf))
        .ok_or_else(|| HelpfulError::root_not_configured(kind.extension()))?;
    if !root.is_dir() {
        return Err(HelpfulError::root_not_found(&root).into());
    }
    Ok(root)
}

/// Open the configured database for reading only. It must already exist.
pub async fn open_read_only(config: &ScalpelConfig) -> anyhow::Result<ScalpelDb> {
    if !config.database_path.is_file() {
        return Err(HelpfulError::database_not_found(&config.database_path).into());
    }
    Ok(ScalpelDb::open_read_only(&config.database_path).await?)
}
