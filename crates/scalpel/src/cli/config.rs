//! `scalpel config`: show the resolved configuration.

use scalpel::config::default_config_path;
use scalpel::ScalpelConfig;
use scalpel_logging::{logs_dir, scalpel_home};
use std::path::Path;

#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

fn exists(path: &Path) -> &'static str {
    if path.exists() {
        "exists"
    } else {
        "not found"
    }
}

pub fn run(args: ConfigArgs, config: &ScalpelConfig) -> anyhow::Result<()> {
    let home = scalpel_home();
    let config_file = default_config_path();
    let logs = logs_dir();

    if args.json {
        let out = serde_json::json!({
            "home": home,
            "config_file": {
                "path": config_file,
                "exists": config_file.exists(),
            },
            "logs": logs,
            "resolved": config,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let root = |p: Option<&Path>| {
        p.map(|p| format!("{} ({})", p.display(), exists(p)))
            .unwrap_or_else(|| "(not set)".to_string())
    };

    println!("SCALPEL CONFIGURATION");
    println!("=====================");
    println!();
    println!("Home:        {}", home.display());
    println!("Config file: {} ({})", config_file.display(), exists(&config_file));
    println!("Logs:        {}", logs.display());
    println!();
    println!(
        "Database:    {} ({})",
        config.database_path.display(),
        exists(&config.database_path)
    );
    println!("MP4 root:    {}", root(config.mp4_root.as_deref()));
    println!("SEQ root:    {}", root(config.seq_root.as_deref()));
    println!("MP4 table:   {}", config.mp4_table);
    println!("SEQ table:   {}", config.seq_table);
    println!("Threshold:   {} MB", config.threshold_mb);
    println!("Dashboard:   {}", config.listen_addr);
    Ok(())
}
