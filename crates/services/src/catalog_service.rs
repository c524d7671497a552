use std::collections::BTreeMap;
use std::sync::Arc;

use storage::repository::{ModuleRepository, load_catalog};
use wellness_core::model::{CatalogError, ModuleCatalog, TrainingModule};

use crate::error::CatalogServiceError;

/// Module reference data: import and lookup.
#[derive(Clone)]
pub struct CatalogService {
    modules: Arc<dyn ModuleRepository>,
}

impl CatalogService {
    #[must_use]
    pub fn new(modules: Arc<dyn ModuleRepository>) -> Self {
        Self { modules }
    }

    /// Merge `modules` into the stored catalog, replacing modules with the same id.
    ///
    /// Nothing is written unless the merged catalog is valid.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::Catalog` if the merged catalog is invalid.
    /// Returns `CatalogServiceError::Storage` if repository access fails.
    pub async fn import(
        &self,
        modules: Vec<TrainingModule>,
    ) -> Result<usize, CatalogServiceError> {
        let mut incoming = BTreeMap::new();
        for module in modules {
            let id = module.id.clone();
            if incoming.insert(id.clone(), module).is_some() {
                return Err(CatalogError::DuplicateModule(id).into());
            }
        }

        let mut merged: BTreeMap<_, _> = self
            .modules
            .list_modules()
            .await?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();
        merged.extend(incoming.iter().map(|(id, m)| (id.clone(), m.clone())));
        ModuleCatalog::new(merged.into_values().collect())?;

        for module in incoming.values() {
            self.modules.upsert_module(module).await?;
        }
        tracing::info!(modules = incoming.len(), "catalog imported");
        Ok(incoming.len())
    }

    /// The stored catalog in module order.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::Storage` if repository access fails or the
    /// stored modules do not form a valid catalog.
    pub async fn catalog(&self) -> Result<ModuleCatalog, CatalogServiceError> {
        Ok(load_catalog(self.modules.as_ref()).await?)
    }
}
