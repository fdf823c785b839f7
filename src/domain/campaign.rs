use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::media::{serialize_public_url, ImageUpload, MediaAsset};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum CampaignStatus {
    Active,
    Closed,
    Expired,
}

impl CampaignStatus {
    pub fn from_db(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::Active),
            1 => Some(Self::Closed),
            2 => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn as_db(self) -> i16 {
        match self {
            Self::Active => 0,
            Self::Closed => 1,
            Self::Expired => 2,
        }
    }
}

impl From<CampaignStatus> for i16 {
    fn from(status: CampaignStatus) -> Self {
        status.as_db()
    }
}

impl TryFrom<i16> for CampaignStatus {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Self::from_db(value).ok_or_else(|| format!("unknown campaign status: {}", value))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub region_id: i64,
    pub target_amount: i64,
    pub current_amount: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub deadline: OffsetDateTime,
    pub status: CampaignStatus,
    #[serde(rename = "imgUrl", serialize_with = "serialize_public_url")]
    pub media: Option<MediaAsset>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Funding progress as a whole percentage. Over-funded campaigns exceed 100.
pub fn progress_percentage(current_amount: i64, target_amount: i64) -> i64 {
    if target_amount <= 0 {
        return 0;
    }
    let current = i128::from(current_amount.max(0));
    let target = i128::from(target_amount);
    let rounded = (current * 100 + target / 2) / target;
    i64::try_from(rounded).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignView {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub progress_percentage: i64,
}

impl From<Campaign> for CampaignView {
    fn from(campaign: Campaign) -> Self {
        let progress_percentage =
            progress_percentage(campaign.current_amount, campaign.target_amount);
        Self {
            campaign,
            progress_percentage,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CampaignDraft {
    pub title: String,
    pub description: String,
    pub region_id: i64,
    pub target_amount: i64,
    pub deadline: OffsetDateTime,
    pub media: Option<MediaAsset>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct CampaignSubmission {
    pub title: Option<String>,
    pub description: Option<String>,
    pub region_id: Option<i64>,
    pub target_amount: Option<i64>,
    pub deadline: Option<OffsetDateTime>,
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Clone, Default)]
pub struct CampaignPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub region_id: Option<i64>,
    pub target_amount: Option<i64>,
    pub deadline: Option<OffsetDateTime>,
    pub status: Option<CampaignStatus>,
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CampaignFilter {
    pub region_id: Option<i64>,
    pub status: Option<CampaignStatus>,
}
