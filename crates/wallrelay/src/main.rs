use std::sync::Arc;

use wallrelay_core::{
    config::Config,
    crosspost::{CrossPostSettings, CrossPoster},
    filter::ContentFilter,
    profiles::JsonProfileStore,
    watermark::JsonWatermarkStore,
};
use wallrelay_telegram::router::RelayServices;
use wallrelay_vk::{VkClient, VkPublisher};

#[tokio::main]
async fn main() -> Result<(), wallrelay_core::Error> {
    wallrelay_core::logging::init("wallrelay")?;

    let cfg = Arc::new(Config::load()?);
    tracing::info!(
        groups = cfg.source_groups.len(),
        target_owner_id = cfg.target_group.0,
        interval_secs = cfg.poll_interval.as_secs(),
        state_dir = %cfg.state_dir.display(),
        "configuration loaded"
    );

    let watermarks = Arc::new(JsonWatermarkStore::open(cfg.watermarks_file()).await?);
    let profiles = Arc::new(JsonProfileStore::open(cfg.profiles_file()).await?);

    let vk = Arc::new(VkClient::from_config(&cfg)?);
    let publisher = Arc::new(VkPublisher::new(vk.clone(), cfg.target_group));

    let crossposter = Arc::new(CrossPoster::new(
        vk.clone(),
        publisher.clone(),
        watermarks,
        ContentFilter::new(&cfg.denylist),
        cfg.vk_job_token.clone(),
        CrossPostSettings::from_config(&cfg),
    ));

    let services = RelayServices {
        profiles,
        fetcher: vk,
        publisher,
        crossposter,
    };

    wallrelay_telegram::router::run_polling(cfg, services)
        .await
        .map_err(|e| wallrelay_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
