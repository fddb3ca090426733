//! Album storage for saved photos
//!
//! Files live in `<media root>/Pictures/<album>/`, and every file has a
//! row in the media index. A save goes through two phases: the row is
//! inserted as pending, the JPEG is written to a hidden temp file and
//! renamed into place, then the row is published. Listings only ever
//! see published rows, so a half-written file is never exposed.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageError};
use log::{info, warn};
use tokio::task;

use super::data::{SavedImage, StorageLocation};
use super::media_index::MediaIndex;
use crate::config::Settings;
use crate::error::StorageError;

/// Album folder used when settings don't name one
pub const DEFAULT_ALBUM: &str = "MyAppImages";

/// Top-level folder albums are created under
const PICTURES_DIR: &str = "Pictures";

/// JPEG quality for saved photos (maximum)
const JPEG_QUALITY: u8 = 100;

/// Encode a bitmap as a maximum-quality JPEG.
///
/// JPEG has no alpha channel, so the image is flattened to RGB first.
pub fn encode_jpeg(bitmap: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let rgb = DynamicImage::ImageRgb8(bitmap.to_rgb8());
    let mut bytes = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY))?;
    Ok(bytes)
}

/// Blocking half of the store: one album folder plus its index
struct Album {
    index: MediaIndex,
    dir: PathBuf,
    relative_path: String,
}

impl Album {
    fn open(media_root: &Path, index_path: &Path, album: &str) -> Result<Self, StorageError> {
        let dir = media_root.join(PICTURES_DIR).join(album);
        fs::create_dir_all(&dir)?;

        let album = Album {
            index: MediaIndex::open(index_path)?,
            dir,
            relative_path: format!("{}/{}/", PICTURES_DIR, album),
        };
        album.recover()?;

        info!("📁 Album ready at {}", album.dir.display());
        Ok(album)
    }

    /// Drop rows left pending by an interrupted save, and rows whose
    /// file was removed behind our back
    fn recover(&self) -> Result<(), StorageError> {
        let mut discarded = 0;
        for entry in self.index.list_pending(&self.relative_path)? {
            remove_if_exists(&self.temp_path(entry.id))?;
            self.index.remove(entry.id)?;
            discarded += 1;
        }

        let mut pruned = 0;
        for entry in self.index.list_published(&self.relative_path)? {
            if !self.dir.join(&entry.display_name).exists() {
                self.index.remove(entry.id)?;
                pruned += 1;
            }
        }

        if discarded > 0 {
            info!("🔄 Discarded {} interrupted saves", discarded);
        }
        if pruned > 0 {
            warn!("⚠️  Removed {} album entries whose files are missing", pruned);
        }

        Ok(())
    }

    fn temp_path(&self, id: i64) -> PathBuf {
        self.dir.join(format!(".pending-{}.jpg", id))
    }

    /// First of "<name>.jpg", "<name> (1).jpg", "<name> (2).jpg", ... not yet in use
    fn free_display_name(&self, name: &str) -> Result<String, StorageError> {
        let mut candidate = format!("{}.jpg", name);
        let mut n = 1;
        while self.index.name_taken(&self.relative_path, &candidate)?
            || self.dir.join(&candidate).exists()
        {
            candidate = format!("{} ({}).jpg", name, n);
            n += 1;
        }
        Ok(candidate)
    }

    /// Current time in ms, but always after every existing entry so a
    /// clock stepping back can't push a new save behind older ones
    fn next_date_added(&self) -> Result<i64, StorageError> {
        let now = Utc::now().timestamp_millis();
        Ok(match self.index.latest_date_added(&self.relative_path)? {
            Some(latest) if latest >= now => latest + 1,
            _ => now,
        })
    }

    fn save(&self, jpeg: &[u8], name: &str) -> Result<StorageLocation, StorageError> {
        let display_name = self.free_display_name(name)?;
        let id = self
            .index
            .insert_pending(&display_name, &self.relative_path, self.next_date_added()?)?;

        match self.write_and_publish(id, &display_name, jpeg) {
            Ok(()) => {
                info!("💾 Saved {} to {}", display_name, self.relative_path);
                Ok(StorageLocation::from_row_id(id))
            }
            Err(err) => {
                // Roll back both phases; the name was free before we started
                for path in [self.temp_path(id), self.dir.join(&display_name)] {
                    if let Err(cleanup) = remove_if_exists(&path) {
                        warn!("failed to remove {}: {}", path.display(), cleanup);
                    }
                }
                if let Err(cleanup) = self.index.remove(id) {
                    warn!("failed to drop pending row {}: {}", id, cleanup);
                }
                Err(err)
            }
        }
    }

    fn write_and_publish(&self, id: i64, display_name: &str, jpeg: &[u8]) -> Result<(), StorageError> {
        let temp_path = self.temp_path(id);

        let mut file = File::create(&temp_path)?;
        file.write_all(jpeg)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.dir.join(display_name))?;
        self.index.publish(id)?;
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<SavedImage>, StorageError> {
        let images = self
            .index
            .list_published(&self.relative_path)?
            .into_iter()
            .map(|entry| SavedImage {
                location: StorageLocation::from_row_id(entry.id),
                path: self.dir.join(&entry.display_name),
                display_name: entry.display_name,
                date_added: entry.date_added,
            })
            .collect();
        Ok(images)
    }

    fn delete(&self, location: &StorageLocation) -> Result<(), StorageError> {
        let entry = self
            .index
            .find(location.row_id(), &self.relative_path)?
            .filter(|entry| !entry.is_pending)
            .ok_or(StorageError::NotFound(*location))?;

        let path = self.dir.join(&entry.display_name);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!("file for {} was already gone: {}", location, path.display());
            }
            Err(err) => return Err(err.into()),
        }

        self.index.remove(entry.id)?;
        info!("🗑️  Deleted {} ({})", entry.display_name, location);
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// Keep file names inside the album folder
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    if cleaned.is_empty() || cleaned.starts_with('.') {
        format!("image{}", cleaned)
    } else {
        cleaned
    }
}

/// Saves, lists and deletes photos of one album.
///
/// Cheap to clone; clones share the same index connection. Every
/// operation runs on the blocking pool so async callers never stall.
#[derive(Clone)]
pub struct GalleryStore {
    album: Arc<Mutex<Album>>,
    dir: PathBuf,
}

impl GalleryStore {
    /// Open the album described by `settings`
    pub async fn open(settings: &Settings) -> Result<Self, StorageError> {
        Self::open_at(settings.media_root(), settings.index_path(), settings.album.clone()).await
    }

    /// Open `<media_root>/Pictures/<album>/` indexed by the database at `index_path`
    pub async fn open_at(
        media_root: PathBuf,
        index_path: PathBuf,
        album: String,
    ) -> Result<Self, StorageError> {
        let album = task::spawn_blocking(move || Album::open(&media_root, &index_path, &album)).await??;
        let dir = album.dir.clone();
        Ok(Self {
            album: Arc::new(Mutex::new(album)),
            dir,
        })
    }

    /// Folder the album's files live in
    pub fn album_dir(&self) -> &Path {
        &self.dir
    }

    /// Encode `bitmap` as JPEG and store it as `<name>.jpg`.
    ///
    /// Saving the same name twice keeps both images; the second one gets
    /// the next free "<name> (n).jpg" file name.
    pub async fn save(&self, bitmap: DynamicImage, name: &str) -> Result<StorageLocation, StorageError> {
        let album = Arc::clone(&self.album);
        let name = sanitize_name(name);
        task::spawn_blocking(move || -> Result<StorageLocation, StorageError> {
            let jpeg = encode_jpeg(&bitmap)?;
            let guard = album.lock().map_err(|_| StorageError::Poisoned)?;
            guard.save(&jpeg, &name)
        })
        .await?
    }

    /// Every saved image of the album, newest first
    pub async fn list_all(&self) -> Result<Vec<SavedImage>, StorageError> {
        let album = Arc::clone(&self.album);
        task::spawn_blocking(move || {
            let guard = album.lock().map_err(|_| StorageError::Poisoned)?;
            guard.list_all()
        })
        .await?
    }

    /// Remove a saved image.
    ///
    /// Fails with `StorageError::NotFound` when the handle is unknown or
    /// was already deleted; callers treat that as a non-fatal no-op.
    pub async fn delete(&self, location: &StorageLocation) -> Result<(), StorageError> {
        let album = Arc::clone(&self.album);
        let location = *location;
        task::spawn_blocking(move || {
            let guard = album.lock().map_err(|_| StorageError::Poisoned)?;
            guard.delete(&location)
        })
        .await?
    }
}

impl std::fmt::Debug for GalleryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GalleryStore").field("dir", &self.dir).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};

    struct Fixture {
        _root: tempfile::TempDir,
        media_root: PathBuf,
        index_path: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let media_root = root.path().join("home");
            let index_path = root.path().join("data").join("media_index.db");
            Self {
                _root: root,
                media_root,
                index_path,
            }
        }

        async fn open(&self, album: &str) -> GalleryStore {
            GalleryStore::open_at(self.media_root.clone(), self.index_path.clone(), album.to_string())
                .await
                .unwrap()
        }
    }

    fn sample_bitmap() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, Rgba([200, 30, 30, 128])))
    }

    #[tokio::test]
    async fn test_save_then_list_is_newest_first() {
        let fixture = Fixture::new();
        let store = fixture.open(DEFAULT_ALBUM).await;

        let first = store.save(sample_bitmap(), "1").await.unwrap();
        let second = store.save(sample_bitmap(), "2").await.unwrap();

        let listed = store.list_all().await.unwrap();
        let locations: Vec<StorageLocation> = listed.iter().map(|i| i.location).collect();
        assert_eq!(locations, vec![second, first]);
        assert_eq!(listed[0].display_name, "2.jpg");
        assert_eq!(listed[1].display_name, "1.jpg");
        assert!(listed[0].added_at().is_some());
    }

    #[tokio::test]
    async fn test_saved_file_is_a_jpeg_in_the_album_folder() {
        let fixture = Fixture::new();
        let store = fixture.open(DEFAULT_ALBUM).await;

        store.save(sample_bitmap(), "42").await.unwrap();

        let listed = store.list_all().await.unwrap();
        let expected = fixture.media_root.join("Pictures").join("MyAppImages").join("42.jpg");
        assert_eq!(listed[0].path, expected);
        assert_eq!(store.album_dir(), expected.parent().unwrap());

        let bytes = std::fs::read(&expected).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));

        // No temp files left behind
        let leftovers: Vec<_> = std::fs::read_dir(store.album_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".pending"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_same_name_twice_keeps_both() {
        let fixture = Fixture::new();
        let store = fixture.open(DEFAULT_ALBUM).await;

        let first = store.save(sample_bitmap(), "7").await.unwrap();
        let second = store.save(sample_bitmap(), "7").await.unwrap();
        assert_ne!(first, second);

        let mut names: Vec<String> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.display_name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["7 (1).jpg".to_string(), "7.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_removes_entry_and_second_delete_is_not_found() {
        let fixture = Fixture::new();
        let store = fixture.open(DEFAULT_ALBUM).await;

        let kept = store.save(sample_bitmap(), "1").await.unwrap();
        let doomed = store.save(sample_bitmap(), "2").await.unwrap();
        let doomed_path = store.album_dir().join("2.jpg");

        store.delete(&doomed).await.unwrap();

        let listed = store.list_all().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].location, kept);
        assert!(!doomed_path.exists());

        match store.delete(&doomed).await {
            Err(StorageError::NotFound(location)) => assert_eq!(location, doomed),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_file() {
        let fixture = Fixture::new();
        let store = fixture.open(DEFAULT_ALBUM).await;

        let location = store.save(sample_bitmap(), "3").await.unwrap();
        std::fs::remove_file(store.album_dir().join("3.jpg")).unwrap();

        store.delete(&location).await.unwrap();
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_albums_are_invisible() {
        let fixture = Fixture::new();
        let mine = fixture.open(DEFAULT_ALBUM).await;
        let other = fixture.open("Elsewhere").await;

        let theirs = other.save(sample_bitmap(), "9").await.unwrap();
        mine.save(sample_bitmap(), "1").await.unwrap();

        let listed = mine.list_all().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].display_name, "1.jpg");

        assert!(matches!(mine.delete(&theirs).await, Err(StorageError::NotFound(_))));
        assert_eq!(other.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_discards_interrupted_saves_and_missing_files() {
        let fixture = Fixture::new();
        let album_dir = fixture.media_root.join("Pictures").join(DEFAULT_ALBUM);

        {
            let store = fixture.open(DEFAULT_ALBUM).await;
            store.save(sample_bitmap(), "1").await.unwrap();
            store.save(sample_bitmap(), "2").await.unwrap();
        }

        // Simulate a crash mid-save and a file removed by hand
        let index = MediaIndex::open(&fixture.index_path).unwrap();
        let pending = index
            .insert_pending("3.jpg", "Pictures/MyAppImages/", Utc::now().timestamp_millis())
            .unwrap();
        std::fs::write(album_dir.join(format!(".pending-{}.jpg", pending)), b"partial").unwrap();
        std::fs::remove_file(album_dir.join("1.jpg")).unwrap();
        drop(index);

        let store = fixture.open(DEFAULT_ALBUM).await;
        let names: Vec<String> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.display_name)
            .collect();
        assert_eq!(names, vec!["2.jpg".to_string()]);
        assert!(!album_dir.join(format!(".pending-{}.jpg", pending)).exists());
    }

    #[tokio::test]
    async fn test_save_after_clock_step_back_still_lists_first() {
        let fixture = Fixture::new();
        let store = fixture.open(DEFAULT_ALBUM).await;

        // An entry stamped a day ahead, as left by a clock that was later corrected
        let ahead = Utc::now().timestamp_millis() + 86_400_000;
        let index = MediaIndex::open(&fixture.index_path).unwrap();
        let older = index.insert_pending("old.jpg", "Pictures/MyAppImages/", ahead).unwrap();
        index.publish(older).unwrap();
        drop(index);

        let newer = store.save(sample_bitmap(), "new").await.unwrap();

        let listed = store.list_all().await.unwrap();
        assert_eq!(listed[0].location, newer);
        assert_eq!(listed[0].display_name, "new.jpg");
        assert!(listed[0].date_added > listed[1].date_added);
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back_the_pending_entry() {
        let fixture = Fixture::new();
        let store = fixture.open(DEFAULT_ALBUM).await;

        // First row id of a fresh index is 1; a directory in the way of
        // its temp file makes the write fail
        let blocker = store.album_dir().join(".pending-1.jpg");
        std::fs::create_dir(&blocker).unwrap();

        assert!(matches!(
            store.save(sample_bitmap(), "5").await,
            Err(StorageError::Io(_))
        ));
        assert!(store.list_all().await.unwrap().is_empty());
        assert!(!store.album_dir().join("5.jpg").exists());
        let index = MediaIndex::open(&fixture.index_path).unwrap();
        assert!(index.list_pending("Pictures/MyAppImages/").unwrap().is_empty());
        assert!(!index.name_taken("Pictures/MyAppImages/", "5.jpg").unwrap());
        drop(index);

        // The name is free again
        store.save(sample_bitmap(), "5").await.unwrap();
        let listed = store.list_all().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].display_name, "5.jpg");
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("12"), "12");
        assert_eq!(sanitize_name("../etc/passwd"), "image.._etc_passwd");
        assert_eq!(sanitize_name("  "), "image");
    }

    #[test]
    fn test_encode_jpeg_drops_alpha() {
        let bytes = encode_jpeg(&sample_bitmap()).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    }
}
