use time::OffsetDateTime;
use tracing::info;

use crate::app::error::{ServiceError, ServiceResult};
use crate::app::media::MediaAssetStore;
use crate::app::regions::RegionDirectory;
use crate::app::reports::non_blank;
use crate::domain::campaign::{
    Campaign, CampaignDraft, CampaignPatch, CampaignSubmission, CampaignView,
};
use crate::domain::donation::MAX_AMOUNT;
use crate::domain::media::OwnerKind;
use crate::infra::repo::Repositories;

#[derive(Clone)]
pub struct CampaignService {
    repos: Repositories,
    media: MediaAssetStore,
}

impl CampaignService {
    pub fn new(repos: Repositories, media: MediaAssetStore) -> Self {
        Self { repos, media }
    }

    pub async fn create(&self, submission: CampaignSubmission) -> ServiceResult<CampaignView> {
        let (Some(title), Some(description), Some(region_id), Some(target_amount), Some(deadline)) = (
            non_blank(submission.title),
            non_blank(submission.description),
            submission.region_id,
            submission.target_amount,
            submission.deadline,
        ) else {
            return Err(ServiceError::validation(
                "title, description, regionId, targetAmount and deadline are required",
            ));
        };

        let now = OffsetDateTime::now_utc();
        validate_target(target_amount)?;
        validate_deadline(deadline, now)?;
        RegionDirectory::new(self.repos.clone())
            .require(region_id)
            .await?;

        let media = match submission.image {
            Some(upload) => Some(self.media.store(upload, OwnerKind::Campaign).await?),
            None => None,
        };

        let draft = CampaignDraft {
            title,
            description,
            region_id,
            target_amount,
            deadline,
            media: media.clone(),
            created_at: now,
        };

        match self.repos.campaigns.insert(draft).await {
            Ok(campaign) => {
                info!(campaign_id = campaign.id, region_id, target_amount, "campaign created");
                Ok(campaign.into())
            }
            Err(err) => {
                if let Some(asset) = &media {
                    self.media.release(asset).await;
                }
                Err(err.into())
            }
        }
    }

    pub async fn get(&self, id: i64) -> ServiceResult<CampaignView> {
        Ok(self.find(id).await?.into())
    }

    pub async fn update(&self, id: i64, patch: CampaignPatch) -> ServiceResult<CampaignView> {
        let mut campaign = self.find(id).await?;

        if let Some(title) = patch.title {
            campaign.title = non_blank(Some(title))
                .ok_or_else(|| ServiceError::validation("title cannot be empty"))?;
        }
        if let Some(description) = patch.description {
            campaign.description = non_blank(Some(description))
                .ok_or_else(|| ServiceError::validation("description cannot be empty"))?;
        }
        if let Some(target_amount) = patch.target_amount {
            validate_target(target_amount)?;
            campaign.target_amount = target_amount;
        }
        if let Some(deadline) = patch.deadline {
            validate_deadline(deadline, OffsetDateTime::now_utc())?;
            campaign.deadline = deadline;
        }
        if let Some(region_id) = patch.region_id {
            RegionDirectory::new(self.repos.clone())
                .require(region_id)
                .await?;
            // Linked donations must stay in the campaign's region.
            if region_id != campaign.region_id
                && self.repos.donations.count_for_campaign(id).await? > 0
            {
                return Err(ServiceError::conflict(
                    "Cannot move campaign with existing donations to another region",
                ));
            }
            campaign.region_id = region_id;
        }
        if let Some(status) = patch.status {
            campaign.status = status;
        }

        let saved = match patch.image {
            Some(upload) => {
                let previous = campaign.media.clone();
                let repos = self.repos.clone();
                self.media
                    .replace(previous.as_ref(), upload, OwnerKind::Campaign, |asset| async move {
                        campaign.media = Some(asset.attached_to(id));
                        Ok::<_, ServiceError>(repos.campaigns.save(&campaign).await?)
                    })
                    .await?
            }
            None => self.repos.campaigns.save(&campaign).await?,
        };

        saved
            .map(CampaignView::from)
            .ok_or_else(|| ServiceError::not_found("campaign not found"))
    }

    /// Refused while any donation exists in the campaign's region or is
    /// linked to the campaign itself.
    pub async fn delete(&self, id: i64) -> ServiceResult<()> {
        let campaign = self.find(id).await?;

        let donations = &self.repos.donations;
        if donations.count_for_region(campaign.region_id).await? > 0
            || donations.count_for_campaign(id).await? > 0
        {
            return Err(ServiceError::conflict(
                "Cannot delete campaign with existing donations. Consider archiving instead.",
            ));
        }

        if !self.repos.campaigns.delete(id).await? {
            return Err(ServiceError::not_found("campaign not found"));
        }
        if let Some(asset) = &campaign.media {
            self.media.release(asset).await;
        }
        info!(campaign_id = id, "campaign deleted");
        Ok(())
    }

    async fn find(&self, id: i64) -> ServiceResult<Campaign> {
        self.repos
            .campaigns
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("campaign not found"))
    }
}

fn validate_target(target_amount: i64) -> ServiceResult<()> {
    if target_amount <= 0 {
        return Err(ServiceError::validation("targetAmount must be greater than 0"));
    }
    if target_amount > MAX_AMOUNT {
        return Err(ServiceError::validation(format!(
            "targetAmount must not exceed {}",
            MAX_AMOUNT
        )));
    }
    Ok(())
}

fn validate_deadline(deadline: OffsetDateTime, now: OffsetDateTime) -> ServiceResult<()> {
    if deadline <= now {
        return Err(ServiceError::validation("deadline must be in the future"));
    }
    Ok(())
}
