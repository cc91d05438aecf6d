use std::sync::Arc;

use relay_core::config::Config;

#[tokio::main]
async fn main() -> Result<(), relay_core::Error> {
    relay_core::logging::init("relay")?;

    let cfg = Arc::new(Config::load()?);
    tracing::info!(
        store = %cfg.store.path.display(),
        offset = cfg.poll_offset,
        limit = cfg.window.limit,
        proxy = cfg.proxy.enabled,
        run_once = cfg.run_once,
        "configuration loaded"
    );

    relay_telegram::router::run_polling(cfg)
        .await
        .map_err(|e| relay_core::Error::External(format!("relay failed: {e:#}")))?;

    Ok(())
}
