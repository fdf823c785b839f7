use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::media::{serialize_public_url, ImageUpload, MediaAsset};
use crate::domain::region::Region;
use crate::domain::user::UserSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum ReportStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReportStatus {
    pub fn from_db(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::Pending),
            1 => Some(Self::Approved),
            2 => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn as_db(self) -> i16 {
        match self {
            Self::Pending => 0,
            Self::Approved => 1,
            Self::Rejected => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl From<ReportStatus> for i16 {
    fn from(status: ReportStatus) -> Self {
        status.as_db()
    }
}

impl TryFrom<i16> for ReportStatus {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Self::from_db(value).ok_or_else(|| format!("unknown report status: {}", value))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub region_id: i64,
    #[serde(rename = "userId")]
    pub submitter_user_id: Option<i64>,
    #[serde(rename = "name")]
    pub display_name: Option<String>,
    #[serde(rename = "sourceIP")]
    pub source_identifier: Option<String>,
    pub status: ReportStatus,
    #[serde(rename = "imgUrl", serialize_with = "serialize_public_url")]
    pub media: Option<MediaAsset>,
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub validated_at: Option<OffsetDateTime>,
}

/// Row to insert; the store assigns the id.
#[derive(Debug, Clone)]
pub struct ReportDraft {
    pub title: String,
    pub description: String,
    pub region_id: i64,
    pub submitter_user_id: Option<i64>,
    pub display_name: Option<String>,
    pub source_identifier: Option<String>,
    pub media: Option<MediaAsset>,
    pub submitted_at: OffsetDateTime,
}

/// Submission as received from a client, not yet validated.
#[derive(Debug, Clone, Default)]
pub struct ReportSubmission {
    pub title: Option<String>,
    pub description: Option<String>,
    pub region_id: Option<i64>,
    pub submitter_user_id: Option<i64>,
    pub display_name: Option<String>,
    pub source_identifier: Option<String>,
    pub image: Option<ImageUpload>,
}

/// Partial update. `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default)]
pub struct ReportPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub region_id: Option<i64>,
    pub submitter_user_id: Option<Option<i64>>,
    pub display_name: Option<Option<String>>,
    pub status: Option<ReportStatus>,
    pub image: Option<ImageUpload>,
}

impl ReportPatch {
    pub fn edits_fields(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.region_id.is_some()
            || self.submitter_user_id.is_some()
            || self.display_name.is_some()
            || self.image.is_some()
    }
}

/// A report with its region and submitter resolved.
#[derive(Debug, Clone, Serialize)]
pub struct ReportDetail {
    #[serde(flatten)]
    pub report: Report,
    pub region: Region,
    pub user: Option<UserSummary>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub region_id: Option<i64>,
}
