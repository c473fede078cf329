//! Delta resolution: which remote items need a download.
//!
//! An item is downloaded when its locator is absent from the cached listing,
//! or when the listing mentions it but the blob itself is missing from the
//! store. The second check is what lets a partially failed sync heal on the
//! next cycle instead of leaving phantom entries behind forever.

use std::collections::HashSet;

use crate::Error;
use crate::model::AssetRef;
use crate::store::ContentStore;

/// Items to download, in remote listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub downloads: Vec<AssetRef>,
    /// Remote entries skipped because an earlier entry had the same locator.
    pub duplicates: usize,
}

/// Compute the downloads required to bring `store` in line with `remote`.
///
/// Store errors from the blob probe propagate; nothing else can fail.
pub async fn resolve<S>(remote: &[AssetRef], cached: &[AssetRef], store: &S) -> Result<Delta, Error>
where
    S: ContentStore + ?Sized,
{
    let cached_locators: HashSet<&str> = cached.iter().map(|item| item.source_locator.as_str()).collect();
    let mut seen = HashSet::new();
    let mut delta = Delta::default();

    for item in remote {
        let key = item.key();
        if !seen.insert(key.clone()) {
            delta.duplicates += 1;
            continue;
        }

        if !cached_locators.contains(item.source_locator.as_str()) || !store.exists(&key).await? {
            delta.downloads.push(item.clone());
        }
    }

    tracing::debug!(
        remote = remote.len(),
        cached = cached.len(),
        downloads = delta.downloads.len(),
        duplicates = delta.duplicates,
        "resolved delta"
    );

    Ok(delta)
}
