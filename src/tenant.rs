use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::info;

use crate::catalogue::Catalogues;
use crate::compactor;
use crate::engine::Engine;
use crate::limits::*;
use crate::notify::NotifyHub;

/// One engine per venue. The venue is the database name on the pgwire
/// connection; each gets its own WAL file and compactor.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    catalogues: Arc<Catalogues>,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64, catalogues: Arc<Catalogues>) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            catalogues,
        }
    }

    /// Get or lazily open the engine for `tenant`.
    pub fn get_or_create(&self, tenant: &str) -> io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.value().clone());
        }
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "tenant name too long"));
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(io::Error::other("too many tenants"));
        }

        // Path-safe file name.
        let safe_name: String = tenant
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty tenant name"));
        }

        // Two connections may race to open the same venue; only one engine
        // may own the WAL.
        let entry = self.engines.entry(tenant.to_string());
        let engine = match entry {
            Entry::Occupied(e) => return Ok(e.get().clone()),
            Entry::Vacant(v) => {
                let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
                let engine = Arc::new(Engine::new(
                    wal_path,
                    Arc::new(NotifyHub::new()),
                    self.catalogues.clone(),
                )?);
                v.insert(engine.clone());
                engine
            }
        };

        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            compactor::run_compactor(compactor_engine, threshold).await;
        });

        info!(tenant, "opened venue");
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }
}
