//! Entry point bundling the three dataset services.

use std::sync::Arc;

use tracing::info;

use crate::clock::{DateService, SystemDateService};
use crate::datasets::{
    BusinessRulesService, Dataset, DatasetContext, TrustlistService, ValueSetsService,
};
use crate::error::CacheResult;
use crate::types::{DatasetEndpoint, ServiceConfig};

/// Endpoints of all three datasets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoints {
    pub trustlist: DatasetEndpoint,
    pub business_rules: DatasetEndpoint,
    pub value_sets: DatasetEndpoint,
}

impl Endpoints {
    /// Read `DCC_TRUSTLIST_*`, `DCC_BUSINESS_RULES_*` and `DCC_VALUE_SETS_*`.
    pub fn from_env() -> Self {
        Self {
            trustlist: DatasetEndpoint::from_env(Dataset::TrustList.env_prefix()),
            business_rules: DatasetEndpoint::from_env(Dataset::BusinessRules.env_prefix()),
            value_sets: DatasetEndpoint::from_env(Dataset::ValueSets.env_prefix()),
        }
    }

    /// Use one trust anchor for every dataset that has none yet.
    pub fn with_trust_anchor(mut self, anchor: impl Into<String>) -> Self {
        let anchor = anchor.into();
        for endpoint in [
            &mut self.trustlist,
            &mut self.business_rules,
            &mut self.value_sets,
        ] {
            if endpoint.trust_anchor.is_none() {
                endpoint.trust_anchor = Some(anchor.clone());
            }
        }
        self
    }

    pub fn with_trustlist(mut self, endpoint: DatasetEndpoint) -> Self {
        self.trustlist = endpoint;
        self
    }

    pub fn with_business_rules(mut self, endpoint: DatasetEndpoint) -> Self {
        self.business_rules = endpoint;
        self
    }

    pub fn with_value_sets(mut self, endpoint: DatasetEndpoint) -> Self {
        self.value_sets = endpoint;
        self
    }
}

/// Trust list, business rules and value sets behind one handle.
///
/// Each service can be re-initialised on its own; the replacement reads the
/// same persisted snapshot and settings.
#[derive(Debug)]
pub struct DccCachingService {
    context: DatasetContext,
    trustlist: TrustlistService,
    business_rules: BusinessRulesService,
    value_sets: ValueSetsService,
}

impl DccCachingService {
    /// Open all three services. `clock` defaults to the system clock.
    pub async fn new(
        config: ServiceConfig,
        endpoints: &Endpoints,
        clock: Option<Arc<dyn DateService>>,
    ) -> CacheResult<Self> {
        let clock = clock.unwrap_or_else(|| Arc::new(SystemDateService));
        Self::with_context(DatasetContext::new(config, clock), endpoints).await
    }

    /// Open with caller-supplied collaborators.
    pub async fn with_context(context: DatasetContext, endpoints: &Endpoints) -> CacheResult<Self> {
        let trustlist = TrustlistService::open(&context, &endpoints.trustlist, None).await?;
        let business_rules =
            BusinessRulesService::open(&context, &endpoints.business_rules, None).await?;
        let value_sets = ValueSetsService::open(&context, &endpoints.value_sets, None).await?;
        info!(
            storage_dir = %context.service_config().storage_dir.display(),
            "dcc caching service ready"
        );

        Ok(Self {
            context,
            trustlist,
            business_rules,
            value_sets,
        })
    }

    /// Open from `DCC_*` environment variables.
    pub async fn from_env() -> CacheResult<Self> {
        Self::new(ServiceConfig::from_env(), &Endpoints::from_env(), None).await
    }

    pub fn trustlist_service(&self) -> &TrustlistService {
        &self.trustlist
    }

    pub fn business_rules_service(&self) -> &BusinessRulesService {
        &self.business_rules
    }

    pub fn value_sets_service(&self) -> &ValueSetsService {
        &self.value_sets
    }

    /// Replace the trust-list service.
    ///
    /// On error the previous service stays in place.
    pub async fn init_trustlist_service(
        &mut self,
        endpoint: &DatasetEndpoint,
        clock: Option<Arc<dyn DateService>>,
    ) -> CacheResult<()> {
        self.trustlist = TrustlistService::open(&self.context, endpoint, clock).await?;
        Ok(())
    }

    /// Replace the business-rules service.
    pub async fn init_business_rules_service(
        &mut self,
        endpoint: &DatasetEndpoint,
        clock: Option<Arc<dyn DateService>>,
    ) -> CacheResult<()> {
        self.business_rules = BusinessRulesService::open(&self.context, endpoint, clock).await?;
        Ok(())
    }

    /// Replace the value-set service.
    pub async fn init_value_sets_service(
        &mut self,
        endpoint: &DatasetEndpoint,
        clock: Option<Arc<dyn DateService>>,
    ) -> CacheResult<()> {
        self.value_sets = ValueSetsService::open(&self.context, endpoint, clock).await?;
        Ok(())
    }

    /// Swap the clock of all three services and of later re-initialisations.
    pub fn update_date_service(&mut self, clock: Arc<dyn DateService>) {
        self.trustlist.update_date_service(clock.clone());
        self.business_rules.update_date_service(clock.clone());
        self.value_sets.update_date_service(clock.clone());
        self.context.set_date_service(clock);
    }
}
