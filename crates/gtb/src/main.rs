use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gtb_core::{config::Config, dispatch::Dispatcher, poller::Poller};
use gtb_storage::SqliteStore;
use gtb_telegram::TelegramApi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gtb_core::logging::init("gtb")?;
    let cfg = Config::load()?;

    let store = Arc::new(SqliteStore::open(&cfg.database_path)?);
    let api = Arc::new(TelegramApi::new(
        &cfg.telegram_api_url,
        &cfg.telegram_bot_token,
        cfg.send_timeout,
    )?);

    // Token sanity check; the loop below would survive without it, but a bad
    // token should be visible at startup, not as an endless fetch-retry.
    match api.get_me().await {
        Ok(me) => info!(
            "bot started as @{}",
            me.username.as_deref().unwrap_or("unknown")
        ),
        Err(err) => warn!("getMe failed, check token and network: {err}"),
    }

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                shutdown.cancel();
            }
        });
    }

    let dispatcher = Dispatcher::new(store);
    let mut poller = Poller::new(api, dispatcher, cfg.poll_timeout, cfg.fetch_retry_delay);
    poller.run(shutdown).await?;

    Ok(())
}
