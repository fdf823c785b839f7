use bytes::Bytes;
use serde::Serializer;

/// Entity kind that owns a stored file. Each kind gets its own bucket on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerKind {
    Report,
    Campaign,
    Standalone,
}

impl OwnerKind {
    pub fn bucket(self) -> &'static str {
        match self {
            Self::Report => "reports",
            Self::Campaign => "campaigns",
            Self::Standalone => "misc",
        }
    }

    pub fn file_prefix(self) -> &'static str {
        match self {
            Self::Report => "report",
            Self::Campaign => "campaign",
            Self::Standalone => "upload",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaOwner {
    pub kind: OwnerKind,
    pub id: Option<i64>,
}

/// A file on disk attached (or about to be attached) to an owner.
///
/// `storage_key` is relative to the upload root (`reports/report-...jpg`);
/// `public_url` is what rows expose to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub storage_key: String,
    pub public_url: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub owner: MediaOwner,
}

impl MediaAsset {
    pub fn file_name(&self) -> &str {
        self.storage_key
            .rsplit('/')
            .next()
            .unwrap_or(self.storage_key.as_str())
    }

    pub fn attached_to(mut self, owner_id: i64) -> Self {
        self.owner.id = Some(owner_id);
        self
    }
}

/// Raw file received at the HTTP boundary, before validation.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub content_type: String,
    pub data: Bytes,
}

impl ImageUpload {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

pub(crate) fn serialize_public_url<S>(
    media: &Option<MediaAsset>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match media {
        Some(asset) => serializer.serialize_some(&asset.public_url),
        None => serializer.serialize_none(),
    }
}
