use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::services::AppServices;
use crate::storage::{SeaOrmStorage, StorageFactory};

pub struct StartupContext {
    pub storage: Arc<SeaOrmStorage>,
    pub services: Arc<AppServices>,
}

/// 准备服务器启动的上下文：存储（含迁移）和业务 service
pub async fn prepare_server_startup() -> Result<StartupContext> {
    let start_time = std::time::Instant::now();
    debug!("Starting pre-startup processing...");

    let storage = StorageFactory::create()
        .await
        .context("Failed to create storage backend")?;
    info!("Using storage backend: {}", storage.backend_name());

    if !storage.is_postgres() {
        warn!(
            "Advisory locks need PostgreSQL; patient registration on {} relies on the in-process lock only",
            storage.backend_name()
        );
    }

    let config = crate::config::get_config();
    if config.api.token.is_empty() {
        warn!("api.token is empty, /api/v1 is open to anyone who can reach the server");
    }

    let services = Arc::new(AppServices::new(storage.clone()));

    info!(
        "Pre-startup processing completed in {:?}",
        start_time.elapsed()
    );
    Ok(StartupContext { storage, services })
}
