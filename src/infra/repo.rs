use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::campaign::{Campaign, CampaignDraft, CampaignFilter};
use crate::domain::donation::{Donation, DonationDraft, DonationFilter, PaymentOutcome, Settlement};
use crate::domain::region::Region;
use crate::domain::report::{Report, ReportDraft, ReportFilter};
use crate::domain::user::UserSummary;
use crate::infra::db::Db;
use crate::infra::memory::MemoryStore;
use crate::infra::postgres::PostgresStore;

#[async_trait]
pub trait RegionRepository: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Region>>;
    async fn list(&self) -> Result<Vec<Region>>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<UserSummary>>;
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn insert(&self, draft: ReportDraft) -> Result<Report>;
    async fn get(&self, id: i64) -> Result<Option<Report>>;
    /// Whole-record write. Returns `None` when the row no longer exists.
    async fn save(&self, report: &Report) -> Result<Option<Report>>;
    async fn delete(&self, id: i64) -> Result<bool>;
    /// Newest first (`submitted_at DESC, id DESC`), with the unpaged total.
    async fn list(&self, filter: ReportFilter, offset: i64, limit: i64)
        -> Result<(Vec<Report>, i64)>;
    async fn media_keys(&self) -> Result<Vec<String>>;
}

#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn insert(&self, draft: CampaignDraft) -> Result<Campaign>;
    async fn get(&self, id: i64) -> Result<Option<Campaign>>;
    async fn save(&self, campaign: &Campaign) -> Result<Option<Campaign>>;
    async fn delete(&self, id: i64) -> Result<bool>;
    async fn list(
        &self,
        filter: CampaignFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Campaign>, i64)>;
    async fn media_keys(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct DonationPage {
    pub items: Vec<Donation>,
    pub total: i64,
    /// Sum of `amount` over rows matching the filter whose payment succeeded.
    pub success_total: i64,
}

#[async_trait]
pub trait DonationRepository: Send + Sync {
    async fn insert(&self, draft: DonationDraft) -> Result<Donation>;
    async fn get(&self, id: i64) -> Result<Option<Donation>>;
    async fn list(&self, filter: DonationFilter, offset: i64, limit: i64) -> Result<DonationPage>;
    async fn count_for_region(&self, region_id: i64) -> Result<i64>;
    /// Donations linked to the campaign, whatever their payment status.
    async fn count_for_campaign(&self, campaign_id: i64) -> Result<i64>;
    /// Moves a Pending donation to the outcome's status and, on success,
    /// credits the linked campaign in the same atomic step. Returns `None`
    /// when the donation does not exist.
    async fn settle(&self, id: i64, outcome: PaymentOutcome) -> Result<Option<Settlement>>;
}

/// Storage handles injected into every service.
#[derive(Clone)]
pub struct Repositories {
    pub regions: Arc<dyn RegionRepository>,
    pub users: Arc<dyn UserRepository>,
    pub reports: Arc<dyn ReportRepository>,
    pub campaigns: Arc<dyn CampaignRepository>,
    pub donations: Arc<dyn DonationRepository>,
    db: Option<Db>,
}

impl Repositories {
    pub fn postgres(db: Db) -> Self {
        let store = Arc::new(PostgresStore::new(db.clone()));
        Self {
            regions: store.clone(),
            users: store.clone(),
            reports: store.clone(),
            campaigns: store.clone(),
            donations: store,
            db: Some(db),
        }
    }

    pub fn in_memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            regions: store.clone(),
            users: store.clone(),
            reports: store.clone(),
            campaigns: store.clone(),
            donations: store,
            db: None,
        }
    }

    pub async fn ping(&self) -> Result<()> {
        match &self.db {
            Some(db) => db.ping().await,
            None => Ok(()),
        }
    }
}
