use time::OffsetDateTime;
use tracing::info;

use crate::app::error::{ServiceError, ServiceResult};
use crate::app::media::MediaAssetStore;
use crate::app::regions::RegionDirectory;
use crate::domain::media::OwnerKind;
use crate::domain::report::{
    Report, ReportDetail, ReportDraft, ReportPatch, ReportStatus, ReportSubmission,
};
use crate::domain::user::UserSummary;
use crate::infra::repo::Repositories;

/// Report intake and moderation. Pending moves to Approved or Rejected once;
/// both are final.
#[derive(Clone)]
pub struct ReportService {
    repos: Repositories,
    media: MediaAssetStore,
}

impl ReportService {
    pub fn new(repos: Repositories, media: MediaAssetStore) -> Self {
        Self { repos, media }
    }

    pub async fn create(&self, submission: ReportSubmission) -> ServiceResult<Report> {
        let (Some(title), Some(description), Some(region_id)) = (
            non_blank(submission.title),
            non_blank(submission.description),
            submission.region_id,
        ) else {
            return Err(ServiceError::validation(
                "title, description and regionId are required",
            ));
        };

        RegionDirectory::new(self.repos.clone())
            .require(region_id)
            .await?;
        if let Some(user_id) = submission.submitter_user_id {
            self.require_user(user_id).await?;
        }

        let media = match submission.image {
            Some(upload) => Some(self.media.store(upload, OwnerKind::Report).await?),
            None => None,
        };

        let draft = ReportDraft {
            title,
            description,
            region_id,
            submitter_user_id: submission.submitter_user_id,
            display_name: non_blank(submission.display_name),
            source_identifier: non_blank(submission.source_identifier),
            media: media.clone(),
            submitted_at: OffsetDateTime::now_utc(),
        };

        match self.repos.reports.insert(draft).await {
            Ok(report) => {
                info!(report_id = report.id, region_id = report.region_id, "report submitted");
                Ok(report)
            }
            Err(err) => {
                if let Some(asset) = &media {
                    self.media.release(asset).await;
                }
                Err(err.into())
            }
        }
    }

    pub async fn get(&self, id: i64) -> ServiceResult<Report> {
        self.repos
            .reports
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("report not found"))
    }

    /// Single-report read with region and submitter resolved. A submitter
    /// whose account has since gone away reads as `null`.
    pub async fn detail(&self, id: i64) -> ServiceResult<ReportDetail> {
        let report = self.get(id).await?;
        let region = RegionDirectory::new(self.repos.clone())
            .require(report.region_id)
            .await?;
        let user = match report.submitter_user_id {
            Some(user_id) => self.repos.users.get(user_id).await?,
            None => None,
        };

        Ok(ReportDetail {
            report,
            region,
            user,
        })
    }

    pub async fn update(&self, id: i64, patch: ReportPatch) -> ServiceResult<Report> {
        let mut report = self.get(id).await?;

        if report.status.is_terminal() {
            let status_change = patch.status.is_some_and(|status| status != report.status);
            if status_change || patch.edits_fields() {
                return Err(ServiceError::validation("report has already been moderated"));
            }
            return Ok(report);
        }

        if let Some(title) = patch.title {
            report.title = non_blank(Some(title))
                .ok_or_else(|| ServiceError::validation("title cannot be empty"))?;
        }
        if let Some(description) = patch.description {
            report.description = non_blank(Some(description))
                .ok_or_else(|| ServiceError::validation("description cannot be empty"))?;
        }
        if let Some(region_id) = patch.region_id {
            RegionDirectory::new(self.repos.clone())
                .require(region_id)
                .await?;
            report.region_id = region_id;
        }
        if let Some(submitter) = patch.submitter_user_id {
            if let Some(user_id) = submitter {
                self.require_user(user_id).await?;
            }
            report.submitter_user_id = submitter;
        }
        if let Some(display_name) = patch.display_name {
            report.display_name = non_blank(display_name);
        }
        if let Some(status) = patch.status {
            if status != ReportStatus::Pending {
                report.status = status;
                report.validated_at = Some(OffsetDateTime::now_utc());
                info!(report_id = id, status = ?status, "report moderated");
            }
        }

        let saved = match patch.image {
            Some(upload) => {
                let previous = report.media.clone();
                let repos = self.repos.clone();
                self.media
                    .replace(previous.as_ref(), upload, OwnerKind::Report, |asset| async move {
                        report.media = Some(asset.attached_to(id));
                        Ok::<_, ServiceError>(repos.reports.save(&report).await?)
                    })
                    .await?
            }
            None => self.repos.reports.save(&report).await?,
        };

        saved.ok_or_else(|| ServiceError::not_found("report not found"))
    }

    pub async fn delete(&self, id: i64) -> ServiceResult<()> {
        let report = self.get(id).await?;
        if !self.repos.reports.delete(id).await? {
            return Err(ServiceError::not_found("report not found"));
        }
        if let Some(asset) = &report.media {
            self.media.release(asset).await;
        }
        info!(report_id = id, "report deleted");
        Ok(())
    }

    async fn require_user(&self, user_id: i64) -> ServiceResult<UserSummary> {
        self.repos
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("user not found"))
    }
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
