use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use relay_core::{
    config::Config,
    messaging::{port::ActionEmitter, throttled::ThrottledEmitter},
    pipeline::{DedupPipeline, PipelineConfig},
    store::{DedupStore, SqliteDedupStore},
};

use crate::api::{BotApi, BotApiConfig};
use crate::{Cursor, TelegramMessenger, TelegramSource};

/// Wire store, adapter and pipeline from config.
///
/// Fails before any network call when the store cannot be opened.
pub fn build_pipeline(cfg: &Config) -> anyhow::Result<(DedupPipeline, BotApi)> {
    let store: Arc<dyn DedupStore> = Arc::new(SqliteDedupStore::open(&cfg.store)?);
    tracing::info!(
        path = %cfg.store.path.display(),
        bucket = %cfg.store.bucket,
        "dedup store opened"
    );

    let api = BotApi::new(&BotApiConfig {
        base_url: cfg.telegram_api_url.clone(),
        token: cfg.telegram_bot_token.clone(),
        proxy: cfg.proxy.clone(),
        request_timeout: cfg.request_timeout,
    })?;

    let source = Arc::new(TelegramSource::new(
        api.clone(),
        Cursor::from_offset(cfg.poll_offset),
    ));

    // Outbound calls go through the throttling decorator to stay under Telegram's flood limits.
    let raw: Arc<dyn ActionEmitter> = Arc::new(TelegramMessenger::new(api.clone()));
    let emitter: Arc<dyn ActionEmitter> = Arc::new(ThrottledEmitter::new(raw, cfg.throttle));

    let pipeline = DedupPipeline::new(
        source,
        emitter,
        store,
        PipelineConfig {
            window: cfg.window.clone(),
            reply: cfg.reply.clone(),
            await_emits: cfg.await_emits,
        },
    );
    Ok((pipeline, api))
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                shutdown.cancel();
            }
        });
    }

    let (pipeline, api) = build_pipeline(&cfg)?;

    // Basic startup info.
    match api.get_me().await {
        Ok(me) => {
            let username = me.get("username").and_then(|v| v.as_str()).unwrap_or("?");
            tracing::info!(bot = %username, "relay started");
        }
        Err(e) => tracing::warn!(error = %e, "getMe failed; continuing"),
    }

    run_until(&pipeline, &cfg, shutdown).await?;
    print_markers(&pipeline).await
}

/// Cycle until `shutdown` fires, or once when `cfg.run_once` is set.
pub async fn run_until(
    pipeline: &DedupPipeline,
    cfg: &Config,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut cycles: u64 = 0;
    let mut failed_in_a_row: u32 = 0;

    loop {
        let outcome = tokio::select! {
            _ = shutdown.cancelled() => break,
            res = pipeline.run_cycle() => res,
        };
        cycles += 1;

        match outcome {
            Ok(report) => {
                failed_in_a_row = 0;
                if let Some(e) = report.first_error() {
                    tracing::warn!(cycle = cycles, error = %e, "cycle finished with failures");
                }
            }
            Err(e) => {
                failed_in_a_row = failed_in_a_row.saturating_add(1);
                tracing::error!(cycle = cycles, failed_in_a_row, error = %e, "cycle failed");
                if cfg.run_once {
                    return Err(e.into());
                }
            }
        }

        if cfg.run_once {
            break;
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(idle_delay(cfg.poll_idle, failed_in_a_row)) => {}
        }
    }

    tracing::info!(cycles, "polling stopped");
    Ok(())
}

/// Idle between cycles, doubled per consecutive failure up to 32x.
fn idle_delay(base: Duration, failed_in_a_row: u32) -> Duration {
    base.saturating_mul(1u32 << failed_in_a_row.min(5))
}

async fn print_markers(pipeline: &DedupPipeline) -> anyhow::Result<()> {
    for (key, value) in pipeline.markers().await? {
        println!("key={key}, value={value}");
    }
    Ok(())
}
