use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::app::error::{ServiceError, ServiceResult};
use crate::app::regions::RegionDirectory;
use crate::app::reports::non_blank;
use crate::domain::campaign::CampaignStatus;
use crate::domain::donation::{
    Donation, DonationDraft, DonationPledge, PaymentOutcome, Settlement, ANONYMOUS_DONOR,
    MAX_AMOUNT,
};
use crate::infra::repo::Repositories;

/// What the donor's client needs to hand off to the payment gateway.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationReceipt {
    pub donation: Donation,
    pub payment_reference: Uuid,
    pub payment_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub donation: Donation,
    /// False when the call repeated an outcome that was already recorded.
    pub changed: bool,
}

#[derive(Clone)]
pub struct DonationService {
    repos: Repositories,
    payment_base_url: String,
}

impl DonationService {
    pub fn new(repos: Repositories, payment_base_url: impl Into<String>) -> Self {
        Self {
            repos,
            payment_base_url: payment_base_url.into(),
        }
    }

    pub async fn create(&self, pledge: DonationPledge) -> ServiceResult<DonationReceipt> {
        let amount = match pledge.amount {
            Some(amount) if amount > 0 => amount,
            _ => return Err(ServiceError::validation("amount must be greater than 0")),
        };
        if amount > MAX_AMOUNT {
            return Err(ServiceError::validation(format!(
                "amount must not exceed {}",
                MAX_AMOUNT
            )));
        }
        let region_id = pledge
            .region_id
            .ok_or_else(|| ServiceError::validation("regionId is required"))?;

        RegionDirectory::new(self.repos.clone())
            .require(region_id)
            .await?;

        if let Some(campaign_id) = pledge.campaign_id {
            let campaign = self
                .repos
                .campaigns
                .get(campaign_id)
                .await?
                .ok_or_else(|| ServiceError::not_found("campaign not found"))?;
            if campaign.region_id != region_id {
                return Err(ServiceError::validation(
                    "campaign does not belong to the given region",
                ));
            }
            if campaign.status != CampaignStatus::Active {
                return Err(ServiceError::validation("campaign is not accepting donations"));
            }
        }

        let draft = DonationDraft {
            donor_name: non_blank(pledge.donor_name).unwrap_or_else(|| ANONYMOUS_DONOR.to_string()),
            amount,
            message: non_blank(pledge.message),
            region_id,
            campaign_id: pledge.campaign_id,
            payment_reference: Uuid::new_v4(),
            created_at: OffsetDateTime::now_utc(),
        };
        let donation = self.repos.donations.insert(draft).await?;

        info!(
            donation_id = donation.id,
            region_id,
            campaign_id = ?donation.campaign_id,
            amount,
            "donation pledged"
        );

        Ok(DonationReceipt {
            payment_reference: donation.payment_reference,
            payment_url: format!(
                "{}/{}",
                self.payment_base_url.trim_end_matches('/'),
                donation.payment_reference
            ),
            donation,
        })
    }

    pub async fn get(&self, id: i64) -> ServiceResult<Donation> {
        self.repos
            .donations
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("donation not found"))
    }

    /// Applies the gateway's verdict once. Replaying the recorded outcome is a
    /// no-op; contradicting it is a conflict.
    pub async fn confirm_payment(
        &self,
        id: i64,
        outcome: PaymentOutcome,
    ) -> ServiceResult<PaymentConfirmation> {
        let settlement = self
            .repos
            .donations
            .settle(id, outcome)
            .await?
            .ok_or_else(|| ServiceError::not_found("donation not found"))?;

        match settlement {
            Settlement::Applied(donation) => {
                info!(
                    donation_id = id,
                    status = ?donation.payment_status,
                    campaign_id = ?donation.campaign_id,
                    "donation payment finalized"
                );
                Ok(PaymentConfirmation {
                    donation,
                    changed: true,
                })
            }
            Settlement::AlreadyFinal(donation) if donation.payment_status == outcome.status() => {
                Ok(PaymentConfirmation {
                    donation,
                    changed: false,
                })
            }
            Settlement::AlreadyFinal(_) => Err(ServiceError::conflict(
                "donation payment has already been finalized with a different outcome",
            )),
        }
    }
}
