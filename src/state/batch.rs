//! Bulk actions over a selection
//!
//! Items are processed one at a time, in selection order. A failing item
//! is logged and recorded in the report; it never stops the rest.

use log::{info, warn};

use super::data::{ContactRecord, StorageLocation};
use super::gallery::GalleryStore;
use crate::error::StorageError;
use crate::remote::PhotoFetcher;

/// Outcome of saving the photos of selected contacts
#[derive(Debug, Clone, Default)]
pub struct SaveReport {
    /// (contact id, where its photo went)
    pub saved: Vec<(i64, StorageLocation)>,
    /// (contact id, reason)
    pub failed: Vec<(i64, String)>,
}

impl SaveReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of deleting selected album entries
#[derive(Debug, Clone, Default)]
pub struct DeleteReport {
    pub deleted: Vec<StorageLocation>,
    pub failed: Vec<(StorageLocation, String)>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Download each contact's photo and save it to the album under the
/// contact's id
pub async fn save_selected(
    fetcher: &dyn PhotoFetcher,
    store: &GalleryStore,
    contacts: &[ContactRecord],
) -> SaveReport {
    let mut report = SaveReport::default();

    for contact in contacts {
        let bitmap = match fetcher.fetch(&contact.picture_url).await {
            Ok(bitmap) => bitmap,
            Err(err) => {
                warn!("⚠️  Skipping contact {}: {}", contact.id, err);
                report.failed.push((contact.id, err.to_string()));
                continue;
            }
        };

        match store.save(bitmap, &contact.file_stem()).await {
            Ok(location) => report.saved.push((contact.id, location)),
            Err(err) => {
                warn!("⚠️  Failed to save photo of contact {}: {}", contact.id, err);
                report.failed.push((contact.id, err.to_string()));
            }
        }
    }

    info!(
        "✅ Saved {} photos, {} failed",
        report.saved.len(),
        report.failed.len()
    );
    report
}

/// Delete each album entry; missing entries are reported, not fatal
pub async fn delete_selected(store: &GalleryStore, locations: &[StorageLocation]) -> DeleteReport {
    let mut report = DeleteReport::default();

    for location in locations {
        match store.delete(location).await {
            Ok(()) => report.deleted.push(*location),
            Err(StorageError::NotFound(_)) => {
                warn!("{} is already gone", location);
                report.failed.push((*location, "already deleted".to_string()));
            }
            Err(err) => {
                warn!("⚠️  Failed to delete {}: {}", location, err);
                report.failed.push((*location, err.to_string()));
            }
        }
    }

    info!(
        "🗑️  Deleted {} images, {} failed",
        report.deleted.len(),
        report.failed.len()
    );
    report
}
