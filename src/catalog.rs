// src/catalog.rs
//
// Book-list catalog (`bookshelf.json`) and per-book `book_info.json`. The
// catalog is a versioned envelope; an older layout is surfaced as an explicit
// error instead of being silently migrated. Reading progress is opaque to the
// sync core and preserved across resyncs.

use crate::constants;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Current bookshelf envelope version.
pub const BOOKSHELF_VERSION: u32 = 3;

/// Reading position for one book. Only stored and passed through here; the
/// reader UI owns its meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingProgress {
    #[serde(rename = "chapterIndex")]
    pub chapter_index: Option<u32>,
    #[serde(rename = "offsetInChapter")]
    pub offset_in_chapter: u64,
    #[serde(rename = "scrollOffset")]
    pub scroll_offset: u64,
    #[serde(default)]
    pub bookmarks: Vec<serde_json::Value>,
}

impl Default for ReadingProgress {
    fn default() -> Self {
        Self {
            chapter_index: None,
            offset_in_chapter: 0,
            scroll_offset: 0,
            bookmarks: Vec::new(),
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookEntry {
    pub name: String,
    #[serde(rename = "dirName")]
    pub dir_name: String,
    #[serde(rename = "chapterCount")]
    pub chapter_count: u32,
    #[serde(rename = "wordCount")]
    pub word_count: u64,
    #[serde(rename = "hasCover")]
    pub has_cover: bool,
    #[serde(rename = "coverFileName")]
    pub cover_file_name: Option<String>,
    #[serde(default)]
    pub progress: ReadingProgress,
    #[serde(default, rename = "localCategory")]
    pub local_category: Option<String>,
    /// RFC3339 timestamp of the last completed sync start.
    #[serde(default, rename = "syncedAt")]
    pub synced_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Bookshelf {
    version: u32,
    books: Vec<BookEntry>,
}

impl Default for Bookshelf {
    fn default() -> Self {
        Self {
            version: BOOKSHELF_VERSION,
            books: Vec::new(),
        }
    }
}

/// The book-list store the session updates on transfer start/finish. The
/// session only depends on this interface; hosts may substitute their own.
pub trait BookCatalog: Send + Sync {
    fn get_books(&self) -> Result<Vec<BookEntry>>;
    fn update_books(&self, books: Vec<BookEntry>) -> Result<()>;
}

/// File-backed catalog over `bookshelf.json` with an in-memory copy to spare
/// repeated parses. A missing or unparseable file starts an empty shelf; a
/// parseable file with a pre-3 version is rejected outright.
pub struct FileCatalog {
    path: PathBuf,
    cached: Mutex<Option<Bookshelf>>,
}

impl FileCatalog {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            path: base_dir.as_ref().join(constants::BOOKSHELF_FILE),
            cached: Mutex::new(None),
        }
    }

    fn load(&self) -> Result<Bookshelf> {
        let mut cached = self.cached.lock().unwrap();
        if let Some(shelf) = cached.as_ref() {
            return Ok(shelf.clone());
        }

        let shelf = match fs::read_to_string(&self.path) {
            Ok(text) => {
                let value: serde_json::Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(_) => serde_json::Value::Null,
                };
                if value.is_array() {
                    bail!("bookshelf uses the pre-versioned array layout; re-sync required");
                }
                match serde_json::from_value::<Bookshelf>(value) {
                    Ok(shelf) if shelf.version >= BOOKSHELF_VERSION => shelf,
                    Ok(shelf) => bail!(
                        "bookshelf version {} is older than supported version {}",
                        shelf.version,
                        BOOKSHELF_VERSION
                    ),
                    Err(_) => Bookshelf::default(),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Bookshelf::default(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read {}", self.path.display()))
            }
        };

        *cached = Some(shelf.clone());
        Ok(shelf)
    }

    fn save(&self, shelf: Bookshelf) -> Result<()> {
        let json = serde_json::to_string(&shelf).context("failed to serialize bookshelf")?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        *self.cached.lock().unwrap() = Some(shelf);
        Ok(())
    }
}

impl BookCatalog for FileCatalog {
    fn get_books(&self) -> Result<Vec<BookEntry>> {
        Ok(self.load()?.books)
    }

    fn update_books(&self, books: Vec<BookEntry>) -> Result<()> {
        let mut shelf = self.load()?;
        shelf.books = books;
        self.save(shelf)
    }
}

/// Replace or insert the entry for `entry.dir_name`, preserving any prior
/// reading progress unless the new entry already carries one.
pub fn upsert_entry(catalog: &dyn BookCatalog, mut entry: BookEntry) -> Result<()> {
    let mut books = catalog.get_books()?;
    if let Some(existing) = books.iter().position(|b| b.dir_name == entry.dir_name) {
        if entry.progress == ReadingProgress::default() {
            entry.progress = books[existing].progress.clone();
        }
        books[existing] = entry;
    } else {
        books.push(entry);
    }
    catalog.update_books(books)
}

/// Drop the entry for `dir_name`, if present. Returns whether anything was
/// removed. Content files are the caller's problem.
pub fn remove_entry(catalog: &dyn BookCatalog, dir_name: &str) -> Result<bool> {
    let mut books = catalog.get_books()?;
    let before = books.len();
    books.retain(|b| b.dir_name != dir_name);
    let removed = books.len() != before;
    if removed {
        catalog.update_books(books)?;
    }
    Ok(removed)
}

// ============================================================================
// book_info.json
// ============================================================================

/// Per-book metadata document, rewritten whole on transfer start and merged
/// field-by-field by `update_book_info`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "chapterCount")]
    pub chapter_count: Option<u32>,
    #[serde(default, rename = "wordCount")]
    pub word_count: Option<u64>,
    #[serde(default, rename = "hasCover")]
    pub has_cover: bool,
    #[serde(default, rename = "coverFileName")]
    pub cover_file_name: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, rename = "bookStatus")]
    pub book_status: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, rename = "localCategory")]
    pub local_category: Option<String>,
}

/// Read a book's info document; missing or unparseable reads as empty.
pub fn read_book_info(base: &Path, book_id: &str) -> BookInfo {
    let path = constants::book_dir(base, book_id).join(constants::BOOK_INFO_FILE);
    match fs::read_to_string(&path) {
        Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
        Err(_) => BookInfo::default(),
    }
}

pub fn write_book_info(base: &Path, book_id: &str, info: &BookInfo) -> Result<()> {
    let path = constants::book_dir(base, book_id).join(constants::BOOK_INFO_FILE);
    let json = serde_json::to_string(info).context("failed to serialize book info")?;
    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(dir_name: &str) -> BookEntry {
        BookEntry {
            name: dir_name.to_uppercase(),
            dir_name: dir_name.to_string(),
            chapter_count: 10,
            word_count: 1000,
            has_cover: false,
            cover_file_name: None,
            progress: ReadingProgress::default(),
            local_category: None,
            synced_at: None,
        }
    }

    #[test]
    fn missing_file_reads_as_empty_shelf() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let catalog = FileCatalog::new(dir.path());
        assert!(catalog.get_books()?.is_empty());
        Ok(())
    }

    #[test]
    fn update_then_get_round_trips() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let catalog = FileCatalog::new(dir.path());
        catalog.update_books(vec![entry("aa"), entry("bb")])?;

        // Fresh instance re-reads from disk.
        let reloaded = FileCatalog::new(dir.path());
        let books = reloaded.get_books()?;
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].dir_name, "aa");
        Ok(())
    }

    #[test]
    fn upsert_preserves_existing_progress() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let catalog = FileCatalog::new(dir.path());

        let mut first = entry("aa");
        first.progress.chapter_index = Some(7);
        first.progress.offset_in_chapter = 42;
        catalog.update_books(vec![first])?;

        upsert_entry(&catalog, entry("aa"))?;
        let books = catalog.get_books()?;
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].progress.chapter_index, Some(7));
        assert_eq!(books[0].progress.offset_in_chapter, 42);
        Ok(())
    }

    #[test]
    fn remove_entry_reports_whether_it_removed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let catalog = FileCatalog::new(dir.path());
        catalog.update_books(vec![entry("aa"), entry("bb")])?;

        assert!(remove_entry(&catalog, "aa")?);
        assert!(!remove_entry(&catalog, "aa")?);
        assert_eq!(catalog.get_books()?.len(), 1);
        Ok(())
    }

    #[test]
    fn legacy_array_layout_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join(constants::BOOKSHELF_FILE), "[]")?;
        let catalog = FileCatalog::new(dir.path());
        assert!(catalog.get_books().is_err());
        Ok(())
    }

    #[test]
    fn old_version_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join(constants::BOOKSHELF_FILE),
            r#"{"version":2,"books":[]}"#,
        )?;
        let catalog = FileCatalog::new(dir.path());
        assert!(catalog.get_books().is_err());
        Ok(())
    }

    #[test]
    fn book_info_merge_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(constants::book_dir(dir.path(), "aa"))?;

        let mut info = read_book_info(dir.path(), "aa");
        assert_eq!(info, BookInfo::default());

        info.name = Some("AA".into());
        info.author = Some("someone".into());
        write_book_info(dir.path(), "aa", &info)?;

        let back = read_book_info(dir.path(), "aa");
        assert_eq!(back.author.as_deref(), Some("someone"));
        Ok(())
    }
}
