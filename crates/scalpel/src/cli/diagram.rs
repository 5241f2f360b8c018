//! `scalpel diagram`: export the schema as dbdiagram.io DSL.

use crate::cli::{block_on, open_read_only};
use chrono::Local;
use scalpel::ScalpelConfig;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, clap::Args)]
pub struct DiagramArgs {
    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: DiagramArgs, config: &ScalpelConfig) -> anyhow::Result<()> {
    let dsl = block_on(async {
        let db = open_read_only(config).await?;
        let dsl = db.export_dbdiagram(Local::now().date_naive()).await;
        db.close().await;
        Ok::<_, anyhow::Error>(dsl?)
    })??;

    match args.output {
        Some(path) => {
            std::fs::write(&path, dsl)?;
            info!(path = %path.display(), "Diagram written");
            println!("Wrote {}", path.display());
        }
        None => print!("{}", dsl),
    }
    Ok(())
}
