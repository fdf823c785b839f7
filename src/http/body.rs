use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use serde_json::Value;
use std::collections::HashMap;
use time::{Date, Month, OffsetDateTime};

use crate::domain::campaign::{CampaignPatch, CampaignStatus, CampaignSubmission};
use crate::domain::donation::{DonationPledge, PaymentOutcome};
use crate::domain::media::ImageUpload;
use crate::domain::report::{ReportPatch, ReportStatus, ReportSubmission};
use crate::http::AppError;

const IMAGE_FIELD: &str = "image";
const BATCH_FIELDS: [&str; 2] = ["images", "images[]"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    Text(String),
}

#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub upload: ImageUpload,
}

/// A request body decoded once at the boundary. JSON and multipart bodies
/// both end up as flat named fields, and multipart may also carry files.
#[derive(Debug)]
pub enum RequestBody {
    Json(Fields),
    Multipart(Fields),
}

#[derive(Debug, Default)]
pub struct Fields {
    values: HashMap<String, FieldValue>,
    files: Vec<FilePart>,
}

#[axum::async_trait]
impl<S> FromRequest<S> for RequestBody
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(normalize_mime)
            .unwrap_or_default();

        match content_type.as_str() {
            "multipart/form-data" => {
                let multipart = Multipart::from_request(req, state)
                    .await
                    .map_err(|err| AppError::bad_request(err.body_text()))?;
                Ok(Self::Multipart(read_multipart(multipart).await?))
            }
            "application/json" | "" => {
                let bytes = Bytes::from_request(req, state)
                    .await
                    .map_err(|err| AppError::bad_request(err.body_text()))?;
                Ok(Self::Json(read_json(&bytes)?))
            }
            other => Err(AppError::bad_request(format!(
                "unsupported content type: {}",
                other
            ))),
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<Fields, AppError> {
    let mut fields = Fields::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("failed to read multipart: {}", err)))?
    {
        let name = field.name().map(str::to_string).unwrap_or_default();

        if field.file_name().is_some() {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field
                .content_type()
                .map(normalize_mime)
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let data = field.bytes().await.map_err(|err| {
                AppError::bad_request(format!("failed to read file data: {}", err))
            })?;
            fields.files.push(FilePart {
                field: name,
                upload: ImageUpload {
                    file_name,
                    content_type,
                    data,
                },
            });
        } else {
            let text = field
                .text()
                .await
                .map_err(|err| AppError::bad_request(format!("failed to read field: {}", err)))?;
            fields.values.insert(name, FieldValue::Text(text));
        }
    }

    Ok(fields)
}

fn read_json(bytes: &[u8]) -> Result<Fields, AppError> {
    let mut fields = Fields::default();
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(fields);
    }

    let value: Value =
        serde_json::from_slice(bytes).map_err(|_| AppError::bad_request("invalid JSON body"))?;
    let Value::Object(map) = value else {
        return Err(AppError::bad_request("JSON body must be an object"));
    };

    for (key, value) in map {
        let value = match value {
            Value::Null => FieldValue::Null,
            Value::String(text) => FieldValue::Text(text),
            Value::Number(number) => FieldValue::Text(number.to_string()),
            Value::Bool(flag) => FieldValue::Text(flag.to_string()),
            Value::Array(_) | Value::Object(_) => {
                return Err(AppError::bad_request(format!("{} must be a scalar value", key)))
            }
        };
        fields.values.insert(key, value);
    }

    Ok(fields)
}

/// `image/JPEG; charset=binary` -> `image/jpeg`
fn normalize_mime(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase()
}

impl RequestBody {
    fn into_fields(self) -> Fields {
        match self {
            Self::Json(fields) | Self::Multipart(fields) => fields,
        }
    }

    pub fn into_report_submission(self) -> Result<ReportSubmission, AppError> {
        let mut fields = self.into_fields();
        Ok(ReportSubmission {
            title: fields.text("title"),
            description: fields.text("description"),
            region_id: fields.int("regionId")?,
            submitter_user_id: fields.int("userId")?,
            display_name: fields.text("name"),
            source_identifier: fields.text("sourceIP"),
            image: fields.single_image()?,
        })
    }

    pub fn into_report_patch(self) -> Result<ReportPatch, AppError> {
        let mut fields = self.into_fields();
        let status = fields
            .int("status")?
            .map(|code| {
                i16::try_from(code)
                    .ok()
                    .and_then(ReportStatus::from_db)
                    .ok_or_else(|| AppError::bad_request("status must be 0, 1 or 2"))
            })
            .transpose()?;

        Ok(ReportPatch {
            title: fields.raw_text("title"),
            description: fields.raw_text("description"),
            region_id: fields.int("regionId")?,
            submitter_user_id: fields.nullable_int("userId")?,
            display_name: fields.nullable_text("name"),
            status,
            image: fields.single_image()?,
        })
    }

    pub fn into_campaign_submission(self) -> Result<CampaignSubmission, AppError> {
        let mut fields = self.into_fields();
        Ok(CampaignSubmission {
            title: fields.text("title"),
            description: fields.text("description"),
            region_id: fields.int("regionId")?,
            target_amount: fields.int("targetAmount")?,
            deadline: fields.deadline("deadline")?,
            image: fields.single_image()?,
        })
    }

    pub fn into_campaign_patch(self) -> Result<CampaignPatch, AppError> {
        let mut fields = self.into_fields();
        let status = fields
            .int("status")?
            .map(|code| {
                i16::try_from(code)
                    .ok()
                    .and_then(CampaignStatus::from_db)
                    .ok_or_else(|| AppError::bad_request("status must be 0, 1 or 2"))
            })
            .transpose()?;

        Ok(CampaignPatch {
            title: fields.raw_text("title"),
            description: fields.raw_text("description"),
            region_id: fields.int("regionId")?,
            target_amount: fields.int("targetAmount")?,
            deadline: fields.deadline("deadline")?,
            status,
            image: fields.single_image()?,
        })
    }

    pub fn into_donation_pledge(self) -> Result<DonationPledge, AppError> {
        let mut fields = self.into_fields();
        Ok(DonationPledge {
            donor_name: fields.text("donorName"),
            amount: fields.int("amount")?,
            message: fields.text("message"),
            region_id: fields.int("regionId")?,
            campaign_id: fields.int("campaignId")?,
        })
    }

    pub fn into_payment_outcome(self) -> Result<PaymentOutcome, AppError> {
        let mut fields = self.into_fields();
        let outcome = fields
            .text("outcome")
            .ok_or_else(|| AppError::bad_request("outcome is required"))?;
        PaymentOutcome::parse(&outcome)
            .ok_or_else(|| AppError::bad_request("outcome must be \"success\" or \"failed\""))
    }

    /// Files sent under `images` / `images[]`, in arrival order.
    pub fn into_image_batch(self) -> Result<Vec<ImageUpload>, AppError> {
        match self {
            Self::Json(_) => Err(AppError::bad_request("expected a multipart upload")),
            Self::Multipart(fields) => Ok(fields
                .files
                .into_iter()
                .filter(|part| BATCH_FIELDS.contains(&part.field.as_str()))
                .map(|part| part.upload)
                .collect()),
        }
    }
}

impl Fields {
    /// Present, non-null value as sent, including blank strings.
    fn raw_text(&mut self, key: &str) -> Option<String> {
        match self.values.remove(key) {
            Some(FieldValue::Text(text)) => Some(text),
            Some(FieldValue::Null) | None => None,
        }
    }

    fn text(&mut self, key: &str) -> Option<String> {
        self.raw_text(key).filter(|text| !text.trim().is_empty())
    }

    /// `None` when absent, `Some(None)` when explicitly null or blank.
    fn nullable_text(&mut self, key: &str) -> Option<Option<String>> {
        match self.values.remove(key) {
            Some(FieldValue::Text(text)) if !text.trim().is_empty() => Some(Some(text)),
            Some(_) => Some(None),
            None => None,
        }
    }

    fn int(&mut self, key: &str) -> Result<Option<i64>, AppError> {
        self.text(key)
            .map(|text| parse_int(key, &text))
            .transpose()
    }

    fn nullable_int(&mut self, key: &str) -> Result<Option<Option<i64>>, AppError> {
        match self.nullable_text(key) {
            Some(Some(text)) => Ok(Some(Some(parse_int(key, &text)?))),
            Some(None) => Ok(Some(None)),
            None => Ok(None),
        }
    }

    fn deadline(&mut self, key: &str) -> Result<Option<OffsetDateTime>, AppError> {
        self.text(key)
            .map(|text| {
                parse_deadline(&text).ok_or_else(|| {
                    AppError::bad_request(format!(
                        "{} must be an RFC 3339 timestamp or a YYYY-MM-DD date",
                        key
                    ))
                })
            })
            .transpose()
    }

    fn single_image(&mut self) -> Result<Option<ImageUpload>, AppError> {
        let mut images = Vec::new();
        self.files.retain(|part| {
            if part.field == IMAGE_FIELD {
                images.push(part.upload.clone());
                false
            } else {
                true
            }
        });
        if images.len() > 1 {
            return Err(AppError::bad_request("only one image may be attached"));
        }
        Ok(images.pop())
    }
}

fn parse_int(key: &str, text: &str) -> Result<i64, AppError> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| AppError::bad_request(format!("{} must be an integer", key)))
}

pub(crate) fn parse_deadline(text: &str) -> Option<OffsetDateTime> {
    let text = text.trim();
    if let Ok(timestamp) = OffsetDateTime::parse(text, &time::format_description::well_known::Rfc3339)
    {
        return Some(timestamp);
    }

    let mut parts = text.splitn(3, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u8 = parts.next()?.parse().ok()?;
    let day: u8 = parts.next()?.parse().ok()?;
    let date = Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()?;
    Some(date.midnight().assume_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_accepts_dates_and_timestamps() {
        let date = parse_deadline("2031-02-03").unwrap();
        assert_eq!(date.date(), Date::from_calendar_date(2031, Month::February, 3).unwrap());
        assert_eq!(date.hour(), 0);

        let stamp = parse_deadline("2031-02-03T10:15:00+07:00").unwrap();
        assert_eq!(stamp.hour(), 10);

        assert!(parse_deadline("2031-13-01").is_none());
        assert!(parse_deadline("next week").is_none());
    }

    #[test]
    fn json_numbers_and_nulls_become_fields() {
        let mut fields = read_json(br#"{"amount": 5000, "userId": null, "name": "  "}"#).unwrap();
        assert_eq!(fields.int("amount").unwrap(), Some(5000));
        assert_eq!(fields.nullable_int("userId").unwrap(), Some(None));
        assert_eq!(fields.nullable_text("name"), Some(None));
        assert_eq!(fields.nullable_text("missing"), None);
    }

    #[test]
    fn nested_json_values_are_rejected() {
        assert!(read_json(br#"{"amount": [1, 2]}"#).is_err());
        assert!(read_json(br#"[1, 2]"#).is_err());
    }

    #[test]
    fn mime_parameters_are_stripped() {
        assert_eq!(normalize_mime("Image/PNG; charset=binary"), "image/png");
        assert_eq!(normalize_mime("multipart/form-data; boundary=x"), "multipart/form-data");
    }
}
