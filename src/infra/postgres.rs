use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::domain::campaign::{Campaign, CampaignDraft, CampaignFilter, CampaignStatus};
use crate::domain::donation::{
    Donation, DonationDraft, DonationFilter, PaymentOutcome, PaymentStatus, Settlement,
};
use crate::domain::media::{MediaAsset, MediaOwner, OwnerKind};
use crate::domain::region::Region;
use crate::domain::report::{Report, ReportDraft, ReportFilter, ReportStatus};
use crate::domain::user::UserSummary;
use crate::infra::db::Db;
use crate::infra::repo::{
    CampaignRepository, DonationPage, DonationRepository, RegionRepository, ReportRepository,
    UserRepository,
};

const REPORT_COLUMNS: &str = "id, title, description, region_id, user_id, name, source_ip, status, \
     image_key, image_url, image_content_type, image_bytes, submitted_at, validated_at";

const CAMPAIGN_COLUMNS: &str = "id, title, description, region_id, target_amount, current_amount, \
     deadline, status, image_key, image_url, image_content_type, image_bytes, created_at, updated_at";

const DONATION_COLUMNS: &str = "id, donor_name, amount, message, region_id, campaign_id, \
     payment_status, payment_reference, created_at, finalized_at";

#[derive(Clone)]
pub struct PostgresStore {
    db: Db,
}

impl PostgresStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn media_from_row(row: &PgRow, kind: OwnerKind, owner_id: i64) -> Option<MediaAsset> {
    let storage_key: Option<String> = row.get("image_key");
    let public_url: Option<String> = row.get("image_url");
    match (storage_key, public_url) {
        (Some(storage_key), Some(public_url)) => Some(MediaAsset {
            storage_key,
            public_url,
            content_type: row
                .get::<Option<String>, _>("image_content_type")
                .unwrap_or_default(),
            size_bytes: row.get::<Option<i64>, _>("image_bytes").unwrap_or_default(),
            owner: MediaOwner {
                kind,
                id: Some(owner_id),
            },
        }),
        _ => None,
    }
}

fn row_to_report(row: &PgRow) -> Result<Report> {
    let id: i64 = row.get("id");
    let status: i16 = row.get("status");
    let status = ReportStatus::from_db(status)
        .ok_or_else(|| anyhow!("unknown report status: {}", status))?;

    Ok(Report {
        id,
        title: row.get("title"),
        description: row.get("description"),
        region_id: row.get("region_id"),
        submitter_user_id: row.get("user_id"),
        display_name: row.get("name"),
        source_identifier: row.get("source_ip"),
        status,
        media: media_from_row(row, OwnerKind::Report, id),
        submitted_at: row.get("submitted_at"),
        validated_at: row.get("validated_at"),
    })
}

fn row_to_campaign(row: &PgRow) -> Result<Campaign> {
    let id: i64 = row.get("id");
    let status: i16 = row.get("status");
    let status = CampaignStatus::from_db(status)
        .ok_or_else(|| anyhow!("unknown campaign status: {}", status))?;

    Ok(Campaign {
        id,
        title: row.get("title"),
        description: row.get("description"),
        region_id: row.get("region_id"),
        target_amount: row.get("target_amount"),
        current_amount: row.get("current_amount"),
        deadline: row.get("deadline"),
        status,
        media: media_from_row(row, OwnerKind::Campaign, id),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_donation(row: &PgRow) -> Result<Donation> {
    let status: i16 = row.get("payment_status");
    let payment_status = PaymentStatus::from_db(status)
        .ok_or_else(|| anyhow!("unknown payment status: {}", status))?;

    Ok(Donation {
        id: row.get("id"),
        donor_name: row.get("donor_name"),
        amount: row.get("amount"),
        message: row.get("message"),
        region_id: row.get("region_id"),
        campaign_id: row.get("campaign_id"),
        payment_status,
        payment_reference: row.get("payment_reference"),
        created_at: row.get("created_at"),
        finalized_at: row.get("finalized_at"),
    })
}

#[async_trait]
impl RegionRepository for PostgresStore {
    async fn get(&self, id: i64) -> Result<Option<Region>> {
        let row = sqlx::query("SELECT id, name, description FROM regions WHERE id = $1")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(|row| Region {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
        }))
    }

    async fn list(&self) -> Result<Vec<Region>> {
        let rows = sqlx::query("SELECT id, name, description FROM regions ORDER BY id")
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Region {
                id: row.get("id"),
                name: row.get("name"),
                description: row.get("description"),
            })
            .collect())
    }
}

#[async_trait]
impl UserRepository for PostgresStore {
    async fn get(&self, id: i64) -> Result<Option<UserSummary>> {
        let row = sqlx::query("SELECT id, name FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(|row| UserSummary {
            id: row.get("id"),
            name: row.get("name"),
        }))
    }
}

#[async_trait]
impl ReportRepository for PostgresStore {
    async fn insert(&self, draft: ReportDraft) -> Result<Report> {
        let media = draft.media.as_ref();
        let row = sqlx::query(&format!(
            "INSERT INTO reports (title, description, region_id, user_id, name, source_ip, status, \
                                  image_key, image_url, image_content_type, image_bytes, submitted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $8, $9, $10, $11) \
             RETURNING {}",
            REPORT_COLUMNS
        ))
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(draft.region_id)
        .bind(draft.submitter_user_id)
        .bind(&draft.display_name)
        .bind(&draft.source_identifier)
        .bind(media.map(|m| m.storage_key.clone()))
        .bind(media.map(|m| m.public_url.clone()))
        .bind(media.map(|m| m.content_type.clone()))
        .bind(media.map(|m| m.size_bytes))
        .bind(draft.submitted_at)
        .fetch_one(self.db.pool())
        .await?;

        row_to_report(&row)
    }

    async fn get(&self, id: i64) -> Result<Option<Report>> {
        let row = sqlx::query(&format!("SELECT {} FROM reports WHERE id = $1", REPORT_COLUMNS))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(row_to_report).transpose()
    }

    async fn save(&self, report: &Report) -> Result<Option<Report>> {
        let media = report.media.as_ref();
        let row = sqlx::query(&format!(
            "UPDATE reports \
             SET title = $2, description = $3, region_id = $4, user_id = $5, name = $6, \
                 source_ip = $7, status = $8, image_key = $9, image_url = $10, \
                 image_content_type = $11, image_bytes = $12, validated_at = $13 \
             WHERE id = $1 \
             RETURNING {}",
            REPORT_COLUMNS
        ))
        .bind(report.id)
        .bind(&report.title)
        .bind(&report.description)
        .bind(report.region_id)
        .bind(report.submitter_user_id)
        .bind(&report.display_name)
        .bind(&report.source_identifier)
        .bind(report.status.as_db())
        .bind(media.map(|m| m.storage_key.clone()))
        .bind(media.map(|m| m.public_url.clone()))
        .bind(media.map(|m| m.content_type.clone()))
        .bind(media.map(|m| m.size_bytes))
        .bind(report.validated_at)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(row_to_report).transpose()
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reports WHERE id = $1")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(
        &self,
        filter: ReportFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Report>, i64)> {
        let status = filter.status.map(ReportStatus::as_db);

        let rows = sqlx::query(&format!(
            "SELECT {} FROM reports \
             WHERE ($1::smallint IS NULL OR status = $1) \
               AND ($2::bigint IS NULL OR region_id = $2) \
             ORDER BY submitted_at DESC, id DESC \
             LIMIT $3 OFFSET $4",
            REPORT_COLUMNS
        ))
        .bind(status)
        .bind(filter.region_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.db.pool())
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reports \
             WHERE ($1::smallint IS NULL OR status = $1) \
               AND ($2::bigint IS NULL OR region_id = $2)",
        )
        .bind(status)
        .bind(filter.region_id)
        .fetch_one(self.db.pool())
        .await?;

        let reports = rows.iter().map(row_to_report).collect::<Result<Vec<_>>>()?;
        Ok((reports, total))
    }

    async fn media_keys(&self) -> Result<Vec<String>> {
        let keys = sqlx::query_scalar("SELECT image_key FROM reports WHERE image_key IS NOT NULL")
            .fetch_all(self.db.pool())
            .await?;
        Ok(keys)
    }
}

#[async_trait]
impl CampaignRepository for PostgresStore {
    async fn insert(&self, draft: CampaignDraft) -> Result<Campaign> {
        let media = draft.media.as_ref();
        let row = sqlx::query(&format!(
            "INSERT INTO donation_campaigns (title, description, region_id, target_amount, \
                                             current_amount, deadline, status, image_key, image_url, \
                                             image_content_type, image_bytes, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, 0, $5, 0, $6, $7, $8, $9, $10, $10) \
             RETURNING {}",
            CAMPAIGN_COLUMNS
        ))
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(draft.region_id)
        .bind(draft.target_amount)
        .bind(draft.deadline)
        .bind(media.map(|m| m.storage_key.clone()))
        .bind(media.map(|m| m.public_url.clone()))
        .bind(media.map(|m| m.content_type.clone()))
        .bind(media.map(|m| m.size_bytes))
        .bind(draft.created_at)
        .fetch_one(self.db.pool())
        .await?;

        row_to_campaign(&row)
    }

    async fn get(&self, id: i64) -> Result<Option<Campaign>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM donation_campaigns WHERE id = $1",
            CAMPAIGN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(row_to_campaign).transpose()
    }

    async fn save(&self, campaign: &Campaign) -> Result<Option<Campaign>> {
        // current_amount is owned by payment settlement and never written here.
        let media = campaign.media.as_ref();
        let row = sqlx::query(&format!(
            "UPDATE donation_campaigns \
             SET title = $2, description = $3, region_id = $4, target_amount = $5, deadline = $6, \
                 status = $7, image_key = $8, image_url = $9, image_content_type = $10, \
                 image_bytes = $11, updated_at = now() \
             WHERE id = $1 \
             RETURNING {}",
            CAMPAIGN_COLUMNS
        ))
        .bind(campaign.id)
        .bind(&campaign.title)
        .bind(&campaign.description)
        .bind(campaign.region_id)
        .bind(campaign.target_amount)
        .bind(campaign.deadline)
        .bind(campaign.status.as_db())
        .bind(media.map(|m| m.storage_key.clone()))
        .bind(media.map(|m| m.public_url.clone()))
        .bind(media.map(|m| m.content_type.clone()))
        .bind(media.map(|m| m.size_bytes))
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(row_to_campaign).transpose()
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM donation_campaigns WHERE id = $1")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(
        &self,
        filter: CampaignFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Campaign>, i64)> {
        let status = filter.status.map(CampaignStatus::as_db);

        let rows = sqlx::query(&format!(
            "SELECT {} FROM donation_campaigns \
             WHERE ($1::bigint IS NULL OR region_id = $1) \
               AND ($2::smallint IS NULL OR status = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4",
            CAMPAIGN_COLUMNS
        ))
        .bind(filter.region_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.db.pool())
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM donation_campaigns \
             WHERE ($1::bigint IS NULL OR region_id = $1) \
               AND ($2::smallint IS NULL OR status = $2)",
        )
        .bind(filter.region_id)
        .bind(status)
        .fetch_one(self.db.pool())
        .await?;

        let campaigns = rows.iter().map(row_to_campaign).collect::<Result<Vec<_>>>()?;
        Ok((campaigns, total))
    }

    async fn media_keys(&self) -> Result<Vec<String>> {
        let keys = sqlx::query_scalar(
            "SELECT image_key FROM donation_campaigns WHERE image_key IS NOT NULL",
        )
        .fetch_all(self.db.pool())
        .await?;
        Ok(keys)
    }
}

#[async_trait]
impl DonationRepository for PostgresStore {
    async fn insert(&self, draft: DonationDraft) -> Result<Donation> {
        let row = sqlx::query(&format!(
            "INSERT INTO donations (donor_name, amount, message, region_id, campaign_id, \
                                    payment_status, payment_reference, created_at) \
             VALUES ($1, $2, $3, $4, $5, 0, $6, $7) \
             RETURNING {}",
            DONATION_COLUMNS
        ))
        .bind(&draft.donor_name)
        .bind(draft.amount)
        .bind(&draft.message)
        .bind(draft.region_id)
        .bind(draft.campaign_id)
        .bind(draft.payment_reference)
        .bind(draft.created_at)
        .fetch_one(self.db.pool())
        .await?;

        row_to_donation(&row)
    }

    async fn get(&self, id: i64) -> Result<Option<Donation>> {
        let row = sqlx::query(&format!("SELECT {} FROM donations WHERE id = $1", DONATION_COLUMNS))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(row_to_donation).transpose()
    }

    async fn list(&self, filter: DonationFilter, offset: i64, limit: i64) -> Result<DonationPage> {
        let status = filter.payment_status.map(PaymentStatus::as_db);
        const WHERE: &str = "WHERE ($1::bigint IS NULL OR region_id = $1) \
               AND ($2::smallint IS NULL OR payment_status = $2) \
               AND ($3::bigint IS NULL OR campaign_id = $3)";

        let rows = sqlx::query(&format!(
            "SELECT {} FROM donations {} \
             ORDER BY created_at DESC, id DESC \
             LIMIT $4 OFFSET $5",
            DONATION_COLUMNS, WHERE
        ))
        .bind(filter.region_id)
        .bind(status)
        .bind(filter.campaign_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.db.pool())
        .await?;

        let totals = sqlx::query(&format!(
            "SELECT COUNT(*) AS total, \
                    COALESCE(SUM(amount) FILTER (WHERE payment_status = 1), 0)::BIGINT AS success_total \
             FROM donations {}",
            WHERE
        ))
        .bind(filter.region_id)
        .bind(status)
        .bind(filter.campaign_id)
        .fetch_one(self.db.pool())
        .await?;

        let items = rows.iter().map(row_to_donation).collect::<Result<Vec<_>>>()?;
        Ok(DonationPage {
            items,
            total: totals.get("total"),
            success_total: totals.get("success_total"),
        })
    }

    async fn count_for_region(&self, region_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM donations WHERE region_id = $1")
            .bind(region_id)
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    async fn count_for_campaign(&self, campaign_id: i64) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM donations WHERE campaign_id = $1")
                .bind(campaign_id)
                .fetch_one(self.db.pool())
                .await?;
        Ok(count)
    }

    async fn settle(&self, id: i64, outcome: PaymentOutcome) -> Result<Option<Settlement>> {
        let mut tx = self.db.pool().begin().await?;

        // The status guard makes concurrent confirmations race on the row lock;
        // only the first one sees a Pending row.
        let updated = sqlx::query(&format!(
            "UPDATE donations \
             SET payment_status = $2, finalized_at = now() \
             WHERE id = $1 AND payment_status = 0 \
             RETURNING {}",
            DONATION_COLUMNS
        ))
        .bind(id)
        .bind(outcome.status().as_db())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = updated else {
            tx.rollback().await?;
            return Ok(DonationRepository::get(self, id)
                .await?
                .map(Settlement::AlreadyFinal));
        };
        let donation = row_to_donation(&row)?;

        if donation.payment_status == PaymentStatus::Success {
            if let Some(campaign_id) = donation.campaign_id {
                sqlx::query(
                    "UPDATE donation_campaigns \
                     SET current_amount = current_amount + $2, updated_at = now() \
                     WHERE id = $1",
                )
                .bind(campaign_id)
                .bind(donation.amount)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(Some(Settlement::Applied(donation)))
    }
}
