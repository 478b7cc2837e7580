//! Business rules applied when validating certificates.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::DateService;
use crate::engine::SignedCache;
use crate::error::CacheResult;
use crate::snapshot::SignedData;
use crate::types::DatasetEndpoint;

use super::{Dataset, DatasetContext};

/// Payload of the rules endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessRulesContainer {
    #[serde(rename = "r", default)]
    pub rules: Vec<BusinessRule>,
}

impl SignedData for BusinessRulesContainer {
    fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A single rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessRule {
    pub identifier: String,

    #[serde(rename = "type")]
    pub rule_type: String,

    pub country: String,

    pub version: String,

    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,

    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,

    /// Rule logic (JSON).
    pub logic: String,
}

/// Business-rules service.
#[derive(Debug, Clone)]
pub struct BusinessRulesService {
    cache: SignedCache<BusinessRulesContainer>,
    parsed: Arc<RwLock<Arc<Vec<BusinessRule>>>>,
}

impl BusinessRulesService {
    pub async fn open(
        context: &DatasetContext,
        endpoint: &DatasetEndpoint,
        clock: Option<Arc<dyn DateService>>,
    ) -> CacheResult<Self> {
        let parsed = Arc::new(RwLock::new(Arc::new(Vec::new())));
        let projection = parsed.clone();
        let cache = context
            .open_cache(
                Dataset::BusinessRules,
                endpoint,
                clock,
                move |container: &BusinessRulesContainer| {
                    *projection.write().unwrap_or_else(|e| e.into_inner()) =
                        Arc::new(container.rules.clone());
                },
            )
            .await?;
        Ok(Self { cache, parsed })
    }

    pub fn cache(&self) -> &SignedCache<BusinessRulesContainer> {
        &self.cache
    }

    /// Current rules, or [`DataExpired`](crate::CacheError::DataExpired).
    pub async fn business_rules(&self) -> CacheResult<Arc<Vec<BusinessRule>>> {
        self.cache.ensure_current().await?;
        Ok(self.parsed.read().unwrap_or_else(|e| e.into_inner()).clone())
    }

    pub async fn update_data_if_necessary(&self, force: bool) -> CacheResult<()> {
        self.cache.refresh(force).await
    }

    pub fn update_date_service(&self, clock: Arc<dyn DateService>) {
        self.cache.update_date_service(clock);
    }
}
