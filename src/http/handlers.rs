use axum::{
    extract::{ConnectInfo, Path, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;
use time::OffsetDateTime;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::app::campaigns::CampaignService;
use crate::app::donations::{DonationReceipt, DonationService, PaymentConfirmation};
use crate::app::query::{PageRequest, Pagination, QueryGateway};
use crate::app::regions::RegionDirectory;
use crate::app::reports::ReportService;
use crate::domain::campaign::{CampaignFilter, CampaignStatus, CampaignView};
use crate::domain::donation::{Donation, DonationFilter, PaymentStatus};
use crate::domain::media::OwnerKind;
use crate::domain::region::{Region, RegionSummary};
use crate::domain::report::{Report, ReportDetail, ReportFilter, ReportStatus};
use crate::http::body::RequestBody;
use crate::http::gateway::PaymentGateway;
use crate::http::AppError;
use crate::AppState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

#[derive(Serialize)]
pub struct DeletedResponse {
    deleted: bool,
}

const DELETED: DeletedResponse = DeletedResponse { deleted: true };

/// Query strings stay stringly typed so malformed values surface as our own
/// 400 body rather than the extractor's plain-text rejection.
fn parse_param<T: FromStr>(value: Option<String>, name: &str) -> Result<Option<T>, AppError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::bad_request(format!("invalid {}", name))),
    }
}

fn parse_status<T>(
    value: Option<String>,
    name: &str,
    from_db: fn(i16) -> Option<T>,
) -> Result<Option<T>, AppError> {
    parse_param::<i16>(value, name)?
        .map(|code| from_db(code).ok_or_else(|| AppError::bad_request(format!("invalid {}", name))))
        .transpose()
}

fn page_request(page: Option<String>, limit: Option<String>) -> Result<PageRequest, AppError> {
    PageRequest::new(parse_param(page, "page")?, parse_param(limit, "limit")?)
        .map_err(|err| AppError::from_service(err, "invalid pagination"))
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match state.repos.ping().await {
        Ok(()) => "ok",
        Err(err) => {
            tracing::warn!(error = ?err, "health check failed");
            "degraded"
        }
    };

    Json(HealthResponse {
        status,
        timestamp: OffsetDateTime::now_utc(),
    })
}

// ---- Regions ----

pub async fn list_regions(State(state): State<AppState>) -> Result<Json<Vec<Region>>, AppError> {
    let regions = RegionDirectory::new(state.repos.clone())
        .list()
        .await
        .map_err(|err| AppError::from_service(err, "failed to list regions"))?;
    Ok(Json(regions))
}

pub async fn get_region(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<RegionSummary>, AppError> {
    let summary = RegionDirectory::new(state.repos.clone())
        .summary(id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to fetch region"))?;
    Ok(Json(summary))
}

// ---- Reports ----

#[derive(Deserialize)]
pub struct ReportListQuery {
    pub status: Option<String>,
    #[serde(rename = "regionId")]
    pub region_id: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Serialize)]
pub struct ReportListResponse {
    items: Vec<Report>,
    pagination: Pagination,
}

pub async fn create_report(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    body: RequestBody,
) -> Result<(StatusCode, Json<Report>), AppError> {
    let mut submission = body.into_report_submission()?;
    if submission.source_identifier.is_none() {
        submission.source_identifier = connect_info.map(|ConnectInfo(addr)| addr.ip().to_string());
    }

    let report = ReportService::new(state.repos.clone(), state.media.clone())
        .create(submission)
        .await
        .map_err(|err| AppError::from_service(err, "failed to create report"))?;

    Ok((StatusCode::CREATED, Json(report)))
}

pub async fn get_report(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<ReportDetail>, AppError> {
    let report = ReportService::new(state.repos.clone(), state.media.clone())
        .detail(id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to fetch report"))?;
    Ok(Json(report))
}

pub async fn update_report(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    body: RequestBody,
) -> Result<Json<Report>, AppError> {
    let patch = body.into_report_patch()?;
    let report = ReportService::new(state.repos.clone(), state.media.clone())
        .update(id, patch)
        .await
        .map_err(|err| AppError::from_service(err, "failed to update report"))?;
    Ok(Json(report))
}

pub async fn delete_report(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<DeletedResponse>, AppError> {
    ReportService::new(state.repos.clone(), state.media.clone())
        .delete(id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to delete report"))?;
    Ok(Json(DELETED))
}

pub async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportListQuery>,
) -> Result<Json<ReportListResponse>, AppError> {
    let filter = ReportFilter {
        status: parse_status(query.status, "status", ReportStatus::from_db)?,
        region_id: parse_param(query.region_id, "regionId")?,
    };
    let request = page_request(query.page, query.limit)?;

    let page = QueryGateway::new(state.repos.clone())
        .list_reports(filter, request)
        .await
        .map_err(|err| AppError::from_service(err, "failed to list reports"))?;

    Ok(Json(ReportListResponse {
        items: page.items,
        pagination: page.pagination,
    }))
}

// ---- Campaigns ----

#[derive(Deserialize)]
pub struct CampaignListQuery {
    #[serde(rename = "regionId")]
    pub region_id: Option<String>,
    pub status: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Serialize)]
pub struct CampaignListResponse {
    campaigns: Vec<CampaignView>,
    pagination: Pagination,
}

pub async fn create_campaign(
    State(state): State<AppState>,
    body: RequestBody,
) -> Result<(StatusCode, Json<CampaignView>), AppError> {
    let submission = body.into_campaign_submission()?;
    let campaign = CampaignService::new(state.repos.clone(), state.media.clone())
        .create(submission)
        .await
        .map_err(|err| AppError::from_service(err, "failed to create campaign"))?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

pub async fn get_campaign(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<CampaignView>, AppError> {
    let campaign = CampaignService::new(state.repos.clone(), state.media.clone())
        .get(id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to fetch campaign"))?;
    Ok(Json(campaign))
}

pub async fn update_campaign(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    body: RequestBody,
) -> Result<Json<CampaignView>, AppError> {
    let patch = body.into_campaign_patch()?;
    let campaign = CampaignService::new(state.repos.clone(), state.media.clone())
        .update(id, patch)
        .await
        .map_err(|err| AppError::from_service(err, "failed to update campaign"))?;
    Ok(Json(campaign))
}

pub async fn delete_campaign(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<DeletedResponse>, AppError> {
    CampaignService::new(state.repos.clone(), state.media.clone())
        .delete(id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to delete campaign"))?;
    Ok(Json(DELETED))
}

pub async fn list_campaigns(
    State(state): State<AppState>,
    Query(query): Query<CampaignListQuery>,
) -> Result<Json<CampaignListResponse>, AppError> {
    let filter = CampaignFilter {
        region_id: parse_param(query.region_id, "regionId")?,
        status: parse_status(query.status, "status", CampaignStatus::from_db)?,
    };
    let request = page_request(query.page, query.limit)?;

    let page = QueryGateway::new(state.repos.clone())
        .list_campaigns(filter, request)
        .await
        .map_err(|err| AppError::from_service(err, "failed to list campaigns"))?;

    Ok(Json(CampaignListResponse {
        campaigns: page.items,
        pagination: page.pagination,
    }))
}

// ---- Donations ----

#[derive(Deserialize)]
pub struct DonationListQuery {
    #[serde(rename = "regionId")]
    pub region_id: Option<String>,
    #[serde(rename = "paymentStatus")]
    pub payment_status: Option<String>,
    #[serde(rename = "campaignId")]
    pub campaign_id: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationListResponse {
    donations: Vec<Donation>,
    total_amount: i64,
    pagination: Pagination,
}

fn donation_service(state: &AppState) -> DonationService {
    DonationService::new(state.repos.clone(), state.payment_base_url.clone())
}

pub async fn create_donation(
    State(state): State<AppState>,
    body: RequestBody,
) -> Result<(StatusCode, Json<DonationReceipt>), AppError> {
    let pledge = body.into_donation_pledge()?;
    let receipt = donation_service(&state)
        .create(pledge)
        .await
        .map_err(|err| AppError::from_service(err, "failed to create donation"))?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn get_donation(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Donation>, AppError> {
    let donation = donation_service(&state)
        .get(id)
        .await
        .map_err(|err| AppError::from_service(err, "failed to fetch donation"))?;
    Ok(Json(donation))
}

pub async fn confirm_donation(
    Path(id): Path<i64>,
    _gateway: PaymentGateway,
    State(state): State<AppState>,
    body: RequestBody,
) -> Result<Json<PaymentConfirmation>, AppError> {
    let outcome = body.into_payment_outcome()?;
    let confirmation = donation_service(&state)
        .confirm_payment(id, outcome)
        .await
        .map_err(|err| AppError::from_service(err, "failed to confirm payment"))?;
    Ok(Json(confirmation))
}

pub async fn list_donations(
    State(state): State<AppState>,
    Query(query): Query<DonationListQuery>,
) -> Result<Json<DonationListResponse>, AppError> {
    let filter = DonationFilter {
        region_id: parse_param(query.region_id, "regionId")?,
        payment_status: parse_status(query.payment_status, "paymentStatus", PaymentStatus::from_db)?,
        campaign_id: parse_param(query.campaign_id, "campaignId")?,
    };
    let request = page_request(query.page, query.limit)?;

    let listing = QueryGateway::new(state.repos.clone())
        .list_donations(filter, request)
        .await
        .map_err(|err| AppError::from_service(err, "failed to list donations"))?;

    Ok(Json(DonationListResponse {
        donations: listing.page.items,
        total_amount: listing.total_amount,
        pagination: listing.page.pagination,
    }))
}

// ---- Uploads ----

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    original_name: Option<String>,
    filename: String,
    url: String,
    size: i64,
    #[serde(rename = "type")]
    content_type: String,
}

#[derive(Serialize)]
pub struct UploadResponse {
    files: Vec<UploadedFile>,
    count: usize,
}

pub async fn upload_images(
    State(state): State<AppState>,
    body: RequestBody,
) -> Result<Json<UploadResponse>, AppError> {
    let uploads = body.into_image_batch()?;
    let original_names: Vec<Option<String>> =
        uploads.iter().map(|upload| upload.file_name.clone()).collect();

    let assets = state
        .media
        .store_batch(uploads, OwnerKind::Standalone)
        .await
        .map_err(|err| AppError::from_service(err, "failed to store uploads"))?;

    let files: Vec<UploadedFile> = assets
        .into_iter()
        .zip(original_names)
        .map(|(asset, original_name)| UploadedFile {
            original_name,
            filename: asset.file_name().to_string(),
            url: asset.public_url.clone(),
            size: asset.size_bytes,
            content_type: asset.content_type,
        })
        .collect();

    Ok(Json(UploadResponse {
        count: files.len(),
        files,
    }))
}

// ---- Media files ----

pub async fn serve_media(
    Path(key): Path<String>,
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, AppError> {
    let path = state
        .media
        .key_to_path(&key)
        .map_err(|_| AppError::not_found("file not found"))?;

    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => Ok(response.into_response()),
        Err(never) => match never {},
    }
}
