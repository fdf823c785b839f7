use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use time::OffsetDateTime;

use crate::domain::campaign::{Campaign, CampaignDraft, CampaignFilter, CampaignStatus};
use crate::domain::donation::{
    Donation, DonationDraft, DonationFilter, PaymentOutcome, PaymentStatus, Settlement,
};
use crate::domain::region::Region;
use crate::domain::report::{Report, ReportDraft, ReportFilter, ReportStatus};
use crate::domain::user::UserSummary;
use crate::infra::repo::{
    CampaignRepository, DonationPage, DonationRepository, RegionRepository, ReportRepository,
    UserRepository,
};

const SEED_REGIONS: [(&str, &str); 6] = [
    ("Jawa", "Pulau Jawa dan sekitarnya"),
    ("Sumatra", "Pulau Sumatra dan sekitarnya"),
    ("Kalimantan", "Pulau Kalimantan dan sekitarnya"),
    ("Sulawesi", "Pulau Sulawesi dan sekitarnya"),
    ("Papua", "Pulau Papua dan sekitarnya"),
    ("Nusa Tenggara", "Kepulauan Nusa Tenggara"),
];

#[derive(Default)]
struct MemoryState {
    regions: BTreeMap<i64, Region>,
    users: HashMap<i64, UserSummary>,
    reports: BTreeMap<i64, Report>,
    campaigns: BTreeMap<i64, Campaign>,
    donations: BTreeMap<i64, Donation>,
    next_region_id: i64,
    next_report_id: i64,
    next_campaign_id: i64,
    next_donation_id: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

fn page<T: Clone>(items: Vec<&T>, offset: i64, limit: i64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(0);
    let limit = usize::try_from(limit).unwrap_or(0);
    items.into_iter().skip(offset).take(limit).cloned().collect()
}

/// Process-local store used by tests and `STORE_BACKEND=memory`.
///
/// Every operation takes the single state lock, so settlement and the
/// campaign credit it implies happen as one step.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with the six island regions.
    pub fn seeded() -> Result<Self> {
        let store = Self::new();
        for (name, description) in SEED_REGIONS {
            store.add_region(name, Some(description))?;
        }
        Ok(store)
    }

    pub fn add_region(&self, name: &str, description: Option<&str>) -> Result<Region> {
        let mut state = self.lock()?;
        let id = next_id(&mut state.next_region_id);
        let region = Region {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
        };
        state.regions.insert(id, region.clone());
        Ok(region)
    }

    pub fn add_user(&self, id: i64, name: &str) -> Result<()> {
        let user = UserSummary {
            id,
            name: name.to_string(),
        };
        self.lock()?.users.insert(id, user);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

#[async_trait]
impl RegionRepository for MemoryStore {
    async fn get(&self, id: i64) -> Result<Option<Region>> {
        Ok(self.lock()?.regions.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Region>> {
        Ok(self.lock()?.regions.values().cloned().collect())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn get(&self, id: i64) -> Result<Option<UserSummary>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }
}

#[async_trait]
impl ReportRepository for MemoryStore {
    async fn insert(&self, draft: ReportDraft) -> Result<Report> {
        let mut state = self.lock()?;
        let id = next_id(&mut state.next_report_id);
        let report = Report {
            id,
            title: draft.title,
            description: draft.description,
            region_id: draft.region_id,
            submitter_user_id: draft.submitter_user_id,
            display_name: draft.display_name,
            source_identifier: draft.source_identifier,
            status: ReportStatus::Pending,
            media: draft.media.map(|media| media.attached_to(id)),
            submitted_at: draft.submitted_at,
            validated_at: None,
        };
        state.reports.insert(id, report.clone());
        Ok(report)
    }

    async fn get(&self, id: i64) -> Result<Option<Report>> {
        Ok(self.lock()?.reports.get(&id).cloned())
    }

    async fn save(&self, report: &Report) -> Result<Option<Report>> {
        let mut state = self.lock()?;
        match state.reports.get_mut(&report.id) {
            Some(stored) => {
                *stored = report.clone();
                Ok(Some(stored.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        Ok(self.lock()?.reports.remove(&id).is_some())
    }

    async fn list(
        &self,
        filter: ReportFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Report>, i64)> {
        let state = self.lock()?;
        let mut matching: Vec<&Report> = state
            .reports
            .values()
            .filter(|report| filter.status.map_or(true, |status| report.status == status))
            .filter(|report| filter.region_id.map_or(true, |id| report.region_id == id))
            .collect();
        matching.sort_by(|a, b| {
            b.submitted_at
                .cmp(&a.submitted_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = matching.len() as i64;
        Ok((page(matching, offset, limit), total))
    }

    async fn media_keys(&self) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .reports
            .values()
            .filter_map(|report| report.media.as_ref().map(|m| m.storage_key.clone()))
            .collect())
    }
}

#[async_trait]
impl CampaignRepository for MemoryStore {
    async fn insert(&self, draft: CampaignDraft) -> Result<Campaign> {
        let mut state = self.lock()?;
        let id = next_id(&mut state.next_campaign_id);
        let campaign = Campaign {
            id,
            title: draft.title,
            description: draft.description,
            region_id: draft.region_id,
            target_amount: draft.target_amount,
            current_amount: 0,
            deadline: draft.deadline,
            status: CampaignStatus::Active,
            media: draft.media.map(|media| media.attached_to(id)),
            created_at: draft.created_at,
            updated_at: draft.created_at,
        };
        state.campaigns.insert(id, campaign.clone());
        Ok(campaign)
    }

    async fn get(&self, id: i64) -> Result<Option<Campaign>> {
        Ok(self.lock()?.campaigns.get(&id).cloned())
    }

    async fn save(&self, campaign: &Campaign) -> Result<Option<Campaign>> {
        let mut state = self.lock()?;
        match state.campaigns.get_mut(&campaign.id) {
            Some(stored) => {
                // current_amount only moves through settlement.
                let current_amount = stored.current_amount;
                *stored = campaign.clone();
                stored.current_amount = current_amount;
                stored.updated_at = OffsetDateTime::now_utc();
                Ok(Some(stored.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        Ok(self.lock()?.campaigns.remove(&id).is_some())
    }

    async fn list(
        &self,
        filter: CampaignFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Campaign>, i64)> {
        let state = self.lock()?;
        let mut matching: Vec<&Campaign> = state
            .campaigns
            .values()
            .filter(|c| filter.region_id.map_or(true, |id| c.region_id == id))
            .filter(|c| filter.status.map_or(true, |status| c.status == status))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        Ok((page(matching, offset, limit), total))
    }

    async fn media_keys(&self) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .campaigns
            .values()
            .filter_map(|c| c.media.as_ref().map(|m| m.storage_key.clone()))
            .collect())
    }
}

#[async_trait]
impl DonationRepository for MemoryStore {
    async fn insert(&self, draft: DonationDraft) -> Result<Donation> {
        let mut state = self.lock()?;
        let id = next_id(&mut state.next_donation_id);
        let donation = Donation {
            id,
            donor_name: draft.donor_name,
            amount: draft.amount,
            message: draft.message,
            region_id: draft.region_id,
            campaign_id: draft.campaign_id,
            payment_status: PaymentStatus::Pending,
            payment_reference: draft.payment_reference,
            created_at: draft.created_at,
            finalized_at: None,
        };
        state.donations.insert(id, donation.clone());
        Ok(donation)
    }

    async fn get(&self, id: i64) -> Result<Option<Donation>> {
        Ok(self.lock()?.donations.get(&id).cloned())
    }

    async fn list(&self, filter: DonationFilter, offset: i64, limit: i64) -> Result<DonationPage> {
        let state = self.lock()?;
        let mut matching: Vec<&Donation> = state
            .donations
            .values()
            .filter(|d| filter.region_id.map_or(true, |id| d.region_id == id))
            .filter(|d| {
                filter
                    .payment_status
                    .map_or(true, |status| d.payment_status == status)
            })
            .filter(|d| filter.campaign_id.map_or(true, |id| d.campaign_id == Some(id)))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let success_total = matching
            .iter()
            .filter(|d| d.payment_status == PaymentStatus::Success)
            .try_fold(0i64, |sum, d| sum.checked_add(d.amount))
            .ok_or_else(|| anyhow!("donation total overflows"))?;

        Ok(DonationPage {
            items: page(matching, offset, limit),
            total,
            success_total,
        })
    }

    async fn count_for_region(&self, region_id: i64) -> Result<i64> {
        Ok(self
            .lock()?
            .donations
            .values()
            .filter(|d| d.region_id == region_id)
            .count() as i64)
    }

    async fn count_for_campaign(&self, campaign_id: i64) -> Result<i64> {
        Ok(self
            .lock()?
            .donations
            .values()
            .filter(|d| d.campaign_id == Some(campaign_id))
            .count() as i64)
    }

    async fn settle(&self, id: i64, outcome: PaymentOutcome) -> Result<Option<Settlement>> {
        let mut state = self.lock()?;
        let Some(donation) = state.donations.get(&id).cloned() else {
            return Ok(None);
        };
        if donation.payment_status != PaymentStatus::Pending {
            return Ok(Some(Settlement::AlreadyFinal(donation)));
        }

        // Work out the credit before touching anything so an overflow leaves
        // both records as they were.
        let credit = match (outcome.status(), donation.campaign_id) {
            (PaymentStatus::Success, Some(campaign_id)) => state
                .campaigns
                .get(&campaign_id)
                .map(|campaign| {
                    campaign
                        .current_amount
                        .checked_add(donation.amount)
                        .map(|total| (campaign_id, total))
                        .ok_or_else(|| anyhow!("campaign {} total overflows", campaign_id))
                })
                .transpose()?,
            _ => None,
        };

        let now = OffsetDateTime::now_utc();
        let settled = Donation {
            payment_status: outcome.status(),
            finalized_at: Some(now),
            ..donation
        };
        state.donations.insert(id, settled.clone());

        if let Some((campaign_id, total)) = credit {
            if let Some(campaign) = state.campaigns.get_mut(&campaign_id) {
                campaign.current_amount = total;
                campaign.updated_at = now;
            }
        }

        Ok(Some(Settlement::Applied(settled)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn draft(region_id: i64, campaign_id: Option<i64>, amount: i64) -> DonationDraft {
        DonationDraft {
            donor_name: "Sari".into(),
            amount,
            message: None,
            region_id,
            campaign_id,
            payment_reference: Uuid::new_v4(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn settle_credits_campaign_once() {
        let store = MemoryStore::seeded().unwrap();
        let campaign = CampaignRepository::insert(
            &store,
            CampaignDraft {
                title: "Buku".into(),
                description: "Buku untuk sekolah".into(),
                region_id: 1,
                target_amount: 1_000,
                deadline: OffsetDateTime::now_utc(),
                media: None,
                created_at: OffsetDateTime::now_utc(),
            },
        )
        .await
        .unwrap();
        let donation = DonationRepository::insert(&store, draft(1, Some(campaign.id), 250))
            .await
            .unwrap();

        let first = store.settle(donation.id, PaymentOutcome::Success).await.unwrap();
        assert!(matches!(first, Some(Settlement::Applied(_))));
        let second = store.settle(donation.id, PaymentOutcome::Success).await.unwrap();
        assert!(matches!(second, Some(Settlement::AlreadyFinal(_))));

        let campaign = CampaignRepository::get(&store, campaign.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(campaign.current_amount, 250);
    }

    #[tokio::test]
    async fn settle_unknown_donation_is_none() {
        let store = MemoryStore::new();
        let result = store.settle(42, PaymentOutcome::Failed).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn donation_total_overflow_is_an_error() {
        let store = MemoryStore::seeded().unwrap();
        for _ in 0..2 {
            let donation = DonationRepository::insert(&store, draft(1, None, i64::MAX))
                .await
                .unwrap();
            store.settle(donation.id, PaymentOutcome::Success).await.unwrap();
        }

        let result = DonationRepository::list(&store, DonationFilter::default(), 0, 10).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn overflowing_credit_leaves_donation_pending() {
        let store = MemoryStore::seeded().unwrap();
        let campaign = CampaignRepository::insert(
            &store,
            CampaignDraft {
                title: "Meja".into(),
                description: "Meja belajar".into(),
                region_id: 1,
                target_amount: 10,
                deadline: OffsetDateTime::now_utc(),
                media: None,
                created_at: OffsetDateTime::now_utc(),
            },
        )
        .await
        .unwrap();
        let first = DonationRepository::insert(&store, draft(1, Some(campaign.id), i64::MAX))
            .await
            .unwrap();
        store.settle(first.id, PaymentOutcome::Success).await.unwrap();
        let second = DonationRepository::insert(&store, draft(1, Some(campaign.id), 1))
            .await
            .unwrap();

        assert!(store.settle(second.id, PaymentOutcome::Success).await.is_err());
        let second = DonationRepository::get(&store, second.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn campaign_donation_count_ignores_other_campaigns() {
        let store = MemoryStore::seeded().unwrap();
        DonationRepository::insert(&store, draft(1, Some(3), 10)).await.unwrap();
        DonationRepository::insert(&store, draft(1, Some(4), 10)).await.unwrap();
        DonationRepository::insert(&store, draft(1, None, 10)).await.unwrap();

        assert_eq!(store.count_for_campaign(3).await.unwrap(), 1);
        assert_eq!(store.count_for_campaign(5).await.unwrap(), 0);
    }
}
