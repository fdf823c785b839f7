use serde::Serialize;

use crate::app::error::{ServiceError, ServiceResult};
use crate::domain::campaign::{CampaignFilter, CampaignView};
use crate::domain::donation::{Donation, DonationFilter};
use crate::domain::report::{Report, ReportFilter};
use crate::infra::repo::Repositories;

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> ServiceResult<Self> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if page < 1 {
            return Err(ServiceError::validation("page must be at least 1"));
        }
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(ServiceError::validation(format!(
                "limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn paginate(&self, total: i64) -> Pagination {
        Pagination {
            page: self.page,
            limit: self.limit,
            total,
            total_pages: total_pages(total, self.limit),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

fn total_pages(total: i64, limit: i64) -> i64 {
    if total <= 0 || limit <= 0 {
        return 0;
    }
    (total + limit - 1) / limit
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone)]
pub struct DonationListing {
    pub page: Page<Donation>,
    /// Sum of successful donation amounts under the same filter as `page`.
    pub total_amount: i64,
}

/// Read-only list access for every entity kind.
#[derive(Clone)]
pub struct QueryGateway {
    repos: Repositories,
}

impl QueryGateway {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    pub async fn list_reports(
        &self,
        filter: ReportFilter,
        request: PageRequest,
    ) -> ServiceResult<Page<Report>> {
        let (items, total) = self
            .repos
            .reports
            .list(filter, request.offset(), request.limit)
            .await?;
        Ok(Page {
            items,
            pagination: request.paginate(total),
        })
    }

    pub async fn list_campaigns(
        &self,
        filter: CampaignFilter,
        request: PageRequest,
    ) -> ServiceResult<Page<CampaignView>> {
        let (campaigns, total) = self
            .repos
            .campaigns
            .list(filter, request.offset(), request.limit)
            .await?;
        Ok(Page {
            items: campaigns.into_iter().map(CampaignView::from).collect(),
            pagination: request.paginate(total),
        })
    }

    pub async fn list_donations(
        &self,
        filter: DonationFilter,
        request: PageRequest,
    ) -> ServiceResult<DonationListing> {
        let page = self
            .repos
            .donations
            .list(filter, request.offset(), request.limit)
            .await?;
        Ok(DonationListing {
            page: Page {
                items: page.items,
                pagination: request.paginate(page.total),
            },
            total_amount: page.success_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(101, 25), 5);
    }

    #[test]
    fn offset_skips_previous_pages() {
        let request = PageRequest::new(Some(3), Some(20)).unwrap();
        assert_eq!(request.offset(), 40);
        assert_eq!(PageRequest::default().offset(), 0);
    }

    #[test]
    fn out_of_range_paging_is_rejected() {
        assert!(PageRequest::new(Some(0), None).is_err());
        assert!(PageRequest::new(None, Some(0)).is_err());
        assert!(PageRequest::new(None, Some(MAX_LIMIT + 1)).is_err());
        assert_eq!(
            PageRequest::new(None, None).unwrap(),
            PageRequest { page: 1, limit: 10 }
        );
    }
}
