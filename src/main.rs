use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ck_app::{ClipboardAdapter, Coordinator, Daemon, HistoryService};
use ck_core::ports::{SelectionKind, SettingsPort};
use ck_infra::{
    AppPaths, FileHistoryStore, FileSettingsRepository, FsImageStore, MemorySelection,
};

/// Safety net for selection backends whose change notices can be missed.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let paths = AppPaths::resolve()?;
    info!(data = %paths.data_dir().display(), "starting clipkeep");

    let images = Arc::new(FsImageStore::new(paths.images_dir()));
    let store = Arc::new(FileHistoryStore::new(paths.histories_dir(), images.clone()));
    let settings_port = Arc::new(FileSettingsRepository::new(paths.settings_file()));
    let settings = settings_port.load().await?;

    let mut coordinator = Coordinator::new();
    coordinator.add_clipboard(ClipboardAdapter::new(
        Arc::new(MemorySelection::new(SelectionKind::Clipboard)),
        images.clone(),
    ));
    coordinator.add_clipboard(ClipboardAdapter::new(
        Arc::new(MemorySelection::new(SelectionKind::Primary)),
        images,
    ));

    let service = HistoryService::new(settings, coordinator, store, settings_port);
    let (mut daemon, handle) = Daemon::new(service);
    daemon.init().await?;
    let daemon = daemon.with_poll_interval(POLL_INTERVAL);
    let runner = tokio::spawn(daemon.run());

    wait_for_shutdown_signal().await?;
    info!("shutting down");
    handle.shutdown().await?;
    runner.await?;

    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(())
    }
}
