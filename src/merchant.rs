use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::engine::{Engine, EngineConfig};
use crate::limits::*;
use crate::model::Ms;
use crate::notify::NotifyHub;
use crate::reaper;

/// Manages per-merchant engines. Each merchant gets its own Engine + WAL +
/// background tasks. Merchant = database name from the wire connection.
pub struct MerchantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    retention_ms: Ms,
    config: EngineConfig,
}

impl MerchantManager {
    pub fn new(
        data_dir: PathBuf,
        compact_threshold: u64,
        retention_ms: Ms,
        config: EngineConfig,
    ) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            retention_ms,
            config,
        }
    }

    /// Get or lazily create an engine for the given merchant.
    pub fn get_or_create(&self, merchant: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(merchant) {
            return Ok(engine.value().clone());
        }
        if merchant.len() > MAX_MERCHANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "merchant name too long",
            ));
        }
        if self.engines.len() >= MAX_MERCHANTS {
            return Err(std::io::Error::other("too many merchants"));
        }

        // Sanitize merchant name to prevent path traversal
        let safe_name: String = merchant
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty merchant name",
            ));
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(wal_path, notify, self.config)?);

        // Spawn reaper + compactor + gc for this merchant
        let reaper_engine = engine.clone();
        tokio::spawn(async move {
            reaper::run_reaper(reaper_engine).await;
        });
        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            reaper::run_compactor(compactor_engine, threshold).await;
        });
        let gc_engine = engine.clone();
        let retention = self.retention_ms;
        tokio::spawn(async move {
            reaper::run_gc(gc_engine, retention).await;
        });

        self.engines.insert(merchant.to_string(), engine.clone());
        metrics::gauge!(crate::observability::MERCHANTS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }
}
