use anyhow::Result;
use std::collections::HashSet;
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

use crate::app::media::MediaAssetStore;
use crate::domain::media::OwnerKind;
use crate::infra::repo::Repositories;

const SWEPT_BUCKETS: [OwnerKind; 2] = [OwnerKind::Report, OwnerKind::Campaign];

/// Periodically removes report and campaign images that no row references.
/// Files younger than `grace` are left alone so in-flight writes survive.
pub async fn run(
    repos: Repositories,
    media: MediaAssetStore,
    interval: Duration,
    grace: Duration,
) -> Result<()> {
    info!(
        interval_seconds = interval.as_secs(),
        grace_seconds = grace.as_secs(),
        "orphan sweeper started"
    );
    loop {
        match sweep_once(&repos, &media, grace).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "orphaned media files removed"),
            Err(err) => warn!(error = ?err, "orphan sweep failed, retrying next interval"),
        }
        tokio::time::sleep(interval).await;
    }
}

pub async fn sweep_once(
    repos: &Repositories,
    media: &MediaAssetStore,
    grace: Duration,
) -> Result<usize> {
    let mut referenced: HashSet<String> = repos.reports.media_keys().await?.into_iter().collect();
    referenced.extend(repos.campaigns.media_keys().await?);

    let cutoff = SystemTime::now()
        .checked_sub(grace)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    for kind in SWEPT_BUCKETS {
        for file in media.list_bucket(kind).await? {
            if referenced.contains(&file.storage_key) || file.modified > cutoff {
                continue;
            }
            match media.delete_key(&file.storage_key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => warn!(error = ?err, key = %file.storage_key, "failed to remove orphan"),
            }
        }
    }
    Ok(removed)
}
