//! Collection service response types and normalization.

use chrono::{DateTime, Utc};
use glimmer_core::{AssetRef, CollectionMeta, RemoteListing};
use serde::Deserialize;

/// Raw listing returned by `GET {base}/collections/{key}`.
#[derive(Debug, Deserialize)]
pub struct ListingResponse {
    #[serde(default)]
    pub collection: CollectionInfo,
    #[serde(default)]
    pub photos: Vec<WirePhoto>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CollectionInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "ownerName")]
    pub owner: Option<String>,
}

/// One photo as the service describes it.
#[derive(Debug, Deserialize)]
pub struct WirePhoto {
    #[serde(alias = "photoGuid")]
    pub id: String,
    /// Full-resolution URL; becomes the asset's source locator.
    #[serde(alias = "src")]
    pub url: String,
    #[serde(default, alias = "derivatives")]
    pub variants: Vec<WireVariant>,
    #[serde(default, alias = "createdAt", alias = "dateCreated")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireVariant {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
}

impl From<ListingResponse> for RemoteListing {
    /// Convert the raw listing to the core model. Variants are ordered by width.
    fn from(raw: ListingResponse) -> Self {
        let items = raw
            .photos
            .into_iter()
            .map(|photo| {
                let mut variants = photo.variants;
                variants.sort_by_key(|v| v.width.unwrap_or(u32::MAX));
                AssetRef {
                    id: photo.id,
                    source_locator: photo.url,
                    derived_variants: variants.into_iter().map(|v| v.url).collect(),
                    created_at: photo.created_at,
                    caption: photo.caption.filter(|c| !c.trim().is_empty()),
                }
            })
            .collect();

        RemoteListing { meta: CollectionMeta { title: raw.collection.title, owner: raw.collection.owner }, items }
    }
}
