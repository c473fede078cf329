//! Deterministic pagination over a snapshot's items.
//!
//! Pages are cut from the items sorted by creation time, newest first.
//! Items without a creation time sort last, and ties fall back to the item
//! id, so the same snapshot always pages the same way.

use serde::Serialize;
use std::cmp::Ordering;

use crate::Error;
use crate::model::AssetRef;

/// One page of a collection listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub items: Vec<AssetRef>,
    pub page_index: usize,
    pub page_size: usize,
    pub total: usize,
    pub has_more: bool,
}

fn newest_first(a: &AssetRef, b: &AssetRef) -> Ordering {
    match (a.created_at, b.created_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
}

/// Slice page `page_index` (0-based) of `page_size` items.
///
/// # Errors
///
/// Returns `Error::InvalidInput` if `page_size` is 0.
pub fn paginate(items: &[AssetRef], page_index: usize, page_size: usize) -> Result<Page, Error> {
    if page_size == 0 {
        return Err(Error::InvalidInput("page_size must be at least 1".into()));
    }

    let mut sorted: Vec<&AssetRef> = items.iter().collect();
    sorted.sort_by(|a, b| newest_first(a, b));

    let total = sorted.len();
    let start = page_index.saturating_mul(page_size).min(total);
    let end = start.saturating_add(page_size).min(total);

    Ok(Page {
        items: sorted[start..end].iter().map(|item| (*item).clone()).collect(),
        page_index,
        page_size,
        total,
        has_more: end < total,
    })
}
