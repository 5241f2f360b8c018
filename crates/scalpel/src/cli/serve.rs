//! `scalpel serve`: run the web dashboard.

use scalpel::dashboard::{self, AppState};
use scalpel::ScalpelConfig;
use scalpel_db::ScalpelDb;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Debug, clap::Args)]
pub struct ServeArgs {
    /// Address to listen on (overrides the config)
    #[arg(long)]
    pub listen: Option<String>,
}

pub fn run(args: ServeArgs, config: ScalpelConfig) -> anyhow::Result<()> {
    let listen = args.listen.unwrap_or_else(|| config.listen_addr.clone());

    // The dashboard is long-lived; give it a multi-threaded runtime.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(async move {
        let db = ScalpelDb::open(&config.database_path).await?;
        let listener = TcpListener::bind(listen.as_str()).await?;
        println!("Dashboard on http://{}", listener.local_addr()?);
        dashboard::serve(AppState::new(db, config), listener, shutdown_signal()).await?;
        info!("Dashboard stopped");
        Ok::<(), anyhow::Error>(())
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
