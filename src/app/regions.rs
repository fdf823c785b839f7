use crate::app::error::{ServiceError, ServiceResult};
use crate::domain::region::{Region, RegionSummary};
use crate::domain::report::{ReportFilter, ReportStatus};
use crate::infra::repo::Repositories;

const SUMMARY_REPORT_COUNT: i64 = 5;

#[derive(Clone)]
pub struct RegionDirectory {
    repos: Repositories,
}

impl RegionDirectory {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// Resolves a region id or fails with `NotFound`.
    pub async fn require(&self, region_id: i64) -> ServiceResult<Region> {
        self.repos
            .regions
            .get(region_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("region not found"))
    }

    pub async fn list(&self) -> ServiceResult<Vec<Region>> {
        Ok(self.repos.regions.list().await?)
    }

    /// Region with its most recently submitted approved reports.
    pub async fn summary(&self, region_id: i64) -> ServiceResult<RegionSummary> {
        let region = self.require(region_id).await?;
        let filter = ReportFilter {
            status: Some(ReportStatus::Approved),
            region_id: Some(region.id),
        };
        let (reports, _) = self
            .repos
            .reports
            .list(filter, 0, SUMMARY_REPORT_COUNT)
            .await?;
        Ok(RegionSummary { region, reports })
    }
}
