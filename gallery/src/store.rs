use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CAPTURE_PREFIX: &str = "pimage_";
const EDGES_PREFIX: &str = "pimage_edges_";

/// One listed gallery image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GalleryEntry {
    pub filename: String,
    /// Capture time, `%Y-%m-%d %H:%M:%S` in UTC.
    pub timestamp: String,
    #[serde(skip)]
    pub unix_secs: i64,
    /// A raw `.dng` sibling exists for this capture.
    pub has_dng: bool,
    pub dng_file: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GalleryPage {
    pub image_files: Vec<GalleryEntry>,
    pub page: usize,
    pub total_pages: usize,
    pub total_images: usize,
    /// First page number of the pager window.
    pub start_page: usize,
    /// Last page number of the pager window.
    pub end_page: usize,
}

/// Flat directory of captures, named by their Unix capture timestamp.
pub struct GalleryStore {
    dir: PathBuf,
    page_size: usize,
}

impl GalleryStore {
    /// Open the gallery, creating the directory if needed.
    pub fn open(dir: &Path, page_size: usize) -> Result<Self, GalleryError> {
        std::fs::create_dir_all(dir).map_err(|e| GalleryError::io(dir, e))?;
        info!(dir = %dir.display(), "gallery ready");
        Ok(Self {
            dir: dir.to_path_buf(),
            page_size: page_size.max(1),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `pimage_<unix_secs>.<ext>`
    pub fn capture_name(at: DateTime<Utc>, extension: &str) -> String {
        format!("{CAPTURE_PREFIX}{}.{extension}", at.timestamp())
    }

    /// `pimage_edges_<unix_secs>.jpg`
    pub fn edges_name(at: DateTime<Utc>) -> String {
        format!("{EDGES_PREFIX}{}.jpg", at.timestamp())
    }

    /// Write a file into the gallery. An existing file with the same name is
    /// replaced.
    pub fn save(&self, name: &str, data: &[u8]) -> Result<PathBuf, GalleryError> {
        let path = self.path_of(name)?;
        std::fs::write(&path, data).map_err(|e| GalleryError::io(&path, e))?;
        debug!(file = name, size = data.len(), "saved to gallery");
        Ok(path)
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>, GalleryError> {
        let path = self.path_of(name)?;
        std::fs::read(&path).map_err(|e| GalleryError::from_io(name, &path, e))
    }

    pub fn delete(&self, name: &str) -> Result<(), GalleryError> {
        let path = self.path_of(name)?;
        std::fs::remove_file(&path).map_err(|e| GalleryError::from_io(name, &path, e))?;
        info!(file = name, "deleted from gallery");
        Ok(())
    }

    /// Resolve a client-supplied file name inside the gallery directory.
    /// Anything that could escape the directory is rejected.
    pub fn path_of(&self, name: &str) -> Result<PathBuf, GalleryError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0'])
            && !name.starts_with('.');
        if !valid {
            return Err(GalleryError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(name))
    }

    /// All JPEG captures, newest first.
    pub fn list(&self) -> Result<Vec<GalleryEntry>, GalleryError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| GalleryError::io(&self.dir, e))?;

        let mut images = Vec::new();
        for entry in entries.flatten() {
            let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !filename.ends_with(".jpg") {
                continue;
            }
            let Some(unix_secs) = parse_capture_secs(&filename) else {
                debug!(file = filename, "skipping gallery file without a timestamp");
                continue;
            };
            let Some(timestamp) = DateTime::<Utc>::from_timestamp(unix_secs, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            else {
                warn!(file = filename, unix_secs, "timestamp out of range");
                continue;
            };

            let stem = filename.trim_end_matches(".jpg");
            let dng_file = format!("{stem}.dng");
            let has_dng = self.dir.join(&dng_file).exists();

            images.push(GalleryEntry {
                filename,
                timestamp,
                unix_secs,
                has_dng,
                dng_file,
            });
        }

        images.sort_by(|a, b| {
            b.unix_secs
                .cmp(&a.unix_secs)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(images)
    }

    /// One page of [`list`](Self::list). Pages are 1-based; page 0 is
    /// treated as page 1 and pages past the end are empty.
    pub fn page(&self, page: usize) -> Result<GalleryPage, GalleryError> {
        let all = self.list()?;
        Ok(paginate(all, page.max(1), self.page_size))
    }
}

fn paginate(all: Vec<GalleryEntry>, page: usize, page_size: usize) -> GalleryPage {
    let total_images = all.len();
    let total_pages = total_images.div_ceil(page_size);
    let start = (page - 1).saturating_mul(page_size);
    let image_files: Vec<GalleryEntry> = all.into_iter().skip(start).take(page_size).collect();

    GalleryPage {
        image_files,
        page,
        total_pages,
        total_images,
        start_page: page.saturating_sub(1).max(1),
        // Past the last page the window is empty (start > end).
        end_page: page.saturating_add(3).min(total_pages),
    }
}

/// `pimage_1700000000.jpg` and `pimage_edges_1700000000.jpg` -> 1700000000
fn parse_capture_secs(filename: &str) -> Option<i64> {
    let stem = filename.rsplit_once('.').map_or(filename, |(stem, _)| stem);
    stem.rsplit('_').next()?.parse().ok()
}

#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    #[error("invalid gallery file name {0:?}")]
    InvalidName(String),
    #[error("gallery file {0} not found")]
    NotFound(String),
    #[error("gallery I/O error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

impl GalleryError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        GalleryError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    fn from_io(name: &str, path: &Path, source: std::io::Error) -> Self {
        if source.kind() == ErrorKind::NotFound {
            GalleryError::NotFound(name.to_string())
        } else {
            Self::io(path, source)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, GalleryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = GalleryStore::open(&dir.path().join("gallery"), 15).unwrap();
        (dir, store)
    }

    #[test]
    fn names_follow_capture_timestamp() {
        let at = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(GalleryStore::capture_name(at, "png"), "pimage_1700000000.png");
        assert_eq!(GalleryStore::edges_name(at), "pimage_edges_1700000000.jpg");
    }

    #[test]
    fn list_is_newest_first_and_jpeg_only() {
        let (_dir, store) = store();
        store.save("pimage_100.jpg", b"a").unwrap();
        store.save("pimage_300.jpg", b"b").unwrap();
        store.save("pimage_200.jpg", b"c").unwrap();
        store.save("pimage_200.dng", b"raw").unwrap();
        store.save("pimage_400.png", b"png").unwrap();
        store.save("notes.jpg", b"?").unwrap();

        let list = store.list().unwrap();
        let names: Vec<_> = list.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, ["pimage_300.jpg", "pimage_200.jpg", "pimage_100.jpg"]);
        assert!(list[1].has_dng);
        assert_eq!(list[1].dng_file, "pimage_200.dng");
        assert!(!list[0].has_dng);
        assert_eq!(list[2].timestamp, "1970-01-01 00:01:40");
    }

    #[test]
    fn pagination_window() {
        let entries: Vec<GalleryEntry> = (0..40)
            .map(|i| GalleryEntry {
                filename: format!("pimage_{i}.jpg"),
                timestamp: String::new(),
                unix_secs: i,
                has_dng: false,
                dng_file: String::new(),
            })
            .collect();

        let first = paginate(entries.clone(), 1, 15);
        assert_eq!(first.image_files.len(), 15);
        assert_eq!(first.total_pages, 3);
        assert_eq!((first.start_page, first.end_page), (1, 3));

        let last = paginate(entries.clone(), 3, 15);
        assert_eq!(last.image_files.len(), 10);
        assert_eq!((last.start_page, last.end_page), (2, 3));

        let beyond = paginate(entries.clone(), 9, 15);
        assert!(beyond.image_files.is_empty());

        let huge = paginate(entries, usize::MAX, 15);
        assert!(huge.image_files.is_empty());
        assert_eq!(huge.page, usize::MAX);
        assert_eq!(huge.total_images, 40);
        assert_eq!(huge.end_page, 3);
        assert!(huge.start_page > huge.end_page);
    }

    #[test]
    fn empty_gallery_has_no_pages() {
        let (_dir, store) = store();
        let page = store.page(0).unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 0);
        assert!(page.image_files.is_empty());
    }

    #[test]
    fn rejects_escaping_names() {
        let (_dir, store) = store();
        for name in ["../etc/passwd", "a/b.jpg", "..", "", ".hidden", "a\\b.jpg"] {
            assert!(
                matches!(store.path_of(name), Err(GalleryError::InvalidName(_))),
                "{name:?} accepted"
            );
        }
    }

    #[test]
    fn delete_and_read_missing() {
        let (_dir, store) = store();
        store.save("pimage_1.jpg", b"x").unwrap();
        assert_eq!(store.read("pimage_1.jpg").unwrap(), b"x");
        store.delete("pimage_1.jpg").unwrap();
        assert!(matches!(store.delete("pimage_1.jpg"), Err(GalleryError::NotFound(_))));
        assert!(matches!(store.read("pimage_1.jpg"), Err(GalleryError::NotFound(_))));
    }

    #[test]
    fn timestamp_parsing() {
        assert_eq!(parse_capture_secs("pimage_edges_42.jpg"), Some(42));
        assert_eq!(parse_capture_secs("pimage_7.jpg"), Some(7));
        assert_eq!(parse_capture_secs("holiday.jpg"), None);
    }
}
