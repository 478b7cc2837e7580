//! Value sets (code dictionaries referenced by certificates and rules).

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::clock::DateService;
use crate::engine::SignedCache;
use crate::error::CacheResult;
use crate::snapshot::SignedData;
use crate::types::DatasetEndpoint;

use super::{Dataset, DatasetContext};

/// Payload of the value-set endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSetContainer {
    #[serde(rename = "v", default)]
    pub value_sets: Vec<ValueSet>,
}

impl SignedData for ValueSetContainer {
    fn is_empty(&self) -> bool {
        self.value_sets.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSet {
    pub name: String,

    /// Value set document (JSON).
    pub value: String,
}

/// Value-set service.
#[derive(Debug, Clone)]
pub struct ValueSetsService {
    cache: SignedCache<ValueSetContainer>,
    parsed: Arc<RwLock<Arc<Vec<ValueSet>>>>,
}

impl ValueSetsService {
    pub async fn open(
        context: &DatasetContext,
        endpoint: &DatasetEndpoint,
        clock: Option<Arc<dyn DateService>>,
    ) -> CacheResult<Self> {
        let parsed = Arc::new(RwLock::new(Arc::new(Vec::new())));
        let projection = parsed.clone();
        let cache = context
            .open_cache(
                Dataset::ValueSets,
                endpoint,
                clock,
                move |container: &ValueSetContainer| {
                    *projection.write().unwrap_or_else(|e| e.into_inner()) =
                        Arc::new(container.value_sets.clone());
                },
            )
            .await?;
        Ok(Self { cache, parsed })
    }

    pub fn cache(&self) -> &SignedCache<ValueSetContainer> {
        &self.cache
    }

    /// Current value sets, or [`DataExpired`](crate::CacheError::DataExpired).
    pub async fn value_sets(&self) -> CacheResult<Arc<Vec<ValueSet>>> {
        self.cache.ensure_current().await?;
        Ok(self.parsed.read().unwrap_or_else(|e| e.into_inner()).clone())
    }

    /// The value set called `name`, if present.
    pub async fn value_set(&self, name: &str) -> CacheResult<Option<ValueSet>> {
        Ok(self
            .value_sets()
            .await?
            .iter()
            .find(|set| set.name == name)
            .cloned())
    }

    pub async fn update_data_if_necessary(&self, force: bool) -> CacheResult<()> {
        self.cache.refresh(force).await
    }

    pub fn update_date_service(&self, clock: Arc<dyn DateService>) {
        self.cache.update_date_service(clock);
    }
}
