// src/index_store.rs
//
// On-disk sharded chapter index. Each book directory holds a small header
// (`lindex.txt`) plus `indexes/<shardId>.txt` files covering 100 chapter
// indices apiece, one tab-separated meta line per chapter. The write path
// merges batches of metas shard by shard and rewrites the header last; the
// read path paginates through shards without ever loading the whole index.

use crate::cache::TtlCache;
use crate::constants::{self, CHAPTERS_PER_SHARD, INDEX_CACHE_TTL};
use anyhow::{bail, Context, Result};
use log::{debug, warn};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Data Model
// ============================================================================

/// One chapter's index entry. Unique per `index` within a book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterMeta {
    pub index: u32,
    pub name: String,
    pub word_count: u64,
}

/// Parsed `lindex.txt`. The synced count is advisory only; resume decisions
/// go through [`IndexShardStore::rebuild_received`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookIndexHeader {
    pub total_chapters: u32,
    pub synced_chapters: u32,
    /// Inclusive `(start, end)` chapter ranges, one per shard.
    pub shard_ranges: Vec<(u32, u32)>,
}

impl BookIndexHeader {
    /// Builds a header with the precomputed shard ranges for `total` chapters.
    pub fn with_ranges(total: u32, synced: u32) -> Self {
        let shard_count = total.div_ceil(CHAPTERS_PER_SHARD);
        let shard_ranges = (0..shard_count)
            .map(|i| {
                let start = i * CHAPTERS_PER_SHARD;
                let end = (start + CHAPTERS_PER_SHARD - 1).min(total - 1);
                (start, end)
            })
            .collect();
        Self {
            total_chapters: total,
            synced_chapters: synced,
            shard_ranges,
        }
    }

    fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        let total_chapters = lines
            .next()
            .and_then(|l| l.trim().parse::<u32>().ok())
            .context("header is missing a valid total-chapters line")?;
        let synced_chapters = lines
            .next()
            .and_then(|l| l.trim().parse::<u32>().ok())
            .unwrap_or(0);

        let mut shard_ranges = Vec::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((start, end)) = line.split_once(',') else {
                continue;
            };
            match (start.trim().parse::<u32>(), end.trim().parse::<u32>()) {
                (Ok(s), Ok(e)) => shard_ranges.push((s, e)),
                _ => continue,
            }
        }

        Ok(Self {
            total_chapters,
            synced_chapters,
            shard_ranges,
        })
    }

    fn serialize(&self) -> String {
        let mut out = format!("{}\n{}\n", self.total_chapters, self.synced_chapters);
        for (start, end) in &self.shard_ranges {
            out.push_str(&format!("{},{}\n", start, end));
        }
        out
    }
}

/// What layout a book directory is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutVersion {
    /// Sharded layout with `lindex.txt`.
    New,
    /// Pre-shard monolithic `list.txt`. Incompatible; surfaced, not migrated.
    Legacy,
    /// No recognizable index present.
    None,
}

/// One page of the chapter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterPage {
    pub chapters: Vec<ChapterMeta>,
    pub total_pages: u32,
    pub current_page: u32,
    pub total_chapters: u32,
}

// ============================================================================
// Shard Parsing
// ============================================================================

/// Parse shard text: one `index\tname\twordCount` line per chapter.
/// Malformed lines are skipped; duplicate indices keep the last occurrence;
/// the result is sorted ascending by index.
fn parse_shard(text: &str) -> Vec<ChapterMeta> {
    let mut by_index: BTreeMap<u32, ChapterMeta> = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(3, '\t');
        let (Some(index_str), Some(name)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(index) = index_str.trim().parse::<u32>() else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        let word_count = parts
            .next()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(0);
        by_index.insert(
            index,
            ChapterMeta {
                index,
                name: name.to_string(),
                word_count,
            },
        );
    }
    by_index.into_values().collect()
}

fn serialize_shard(metas: &[ChapterMeta]) -> String {
    let mut out = String::new();
    for meta in metas {
        out.push_str(&format!("{}\t{}\t{}\n", meta.index, meta.name, meta.word_count));
    }
    out
}

/// Write `contents` to `path` via a temp file and atomic rename.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("txt.tmp");
    fs::write(&tmp, contents)
        .with_context(|| format!("failed to write temp file {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to rename into place: {}", path.display()))?;
    Ok(())
}

// ============================================================================
// IndexShardStore
// ============================================================================

/// Read and write path over the sharded chapter index of every book under a
/// base directory. Reads go through TTL caches, so UI pagination can run
/// concurrently with an in-progress sync (observing mid-flush contents is an
/// accepted relaxation until `transfer_complete`).
pub struct IndexShardStore {
    base_dir: PathBuf,
    header_cache: TtlCache<String, BookIndexHeader>,
    shard_cache: TtlCache<(String, u32), Vec<ChapterMeta>>,
}

impl IndexShardStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self::with_cache_ttl(base_dir, INDEX_CACHE_TTL)
    }

    /// A zero TTL disables caching entirely (every access reloads from disk).
    pub fn with_cache_ttl(base_dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            base_dir: base_dir.into(),
            header_cache: TtlCache::new(ttl),
            shard_cache: TtlCache::new(ttl),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    // === Layout ===

    /// Detect which index layout a book directory carries. Never guesses:
    /// a legacy monolithic list is reported as such, not partially parsed.
    pub fn probe_version(&self, book_id: &str) -> LayoutVersion {
        let dir = constants::book_dir(&self.base_dir, book_id);
        if dir.join(constants::HEADER_FILE).is_file() {
            LayoutVersion::New
        } else if dir.join(constants::LEGACY_LIST_FILE).is_file() {
            LayoutVersion::Legacy
        } else {
            LayoutVersion::None
        }
    }

    /// Create the book directory skeleton (book/, indexes/, content/),
    /// leaving existing files alone.
    pub fn ensure_book_dirs(&self, book_id: &str) -> Result<()> {
        let dir = constants::book_dir(&self.base_dir, book_id);
        fs::create_dir_all(dir.join(constants::INDEXES_DIR))?;
        fs::create_dir_all(dir.join(constants::CONTENT_DIR))?;
        Ok(())
    }

    /// Wipe a book's chapter data (content/, indexes/, header, any legacy
    /// list) and recreate the skeleton. The book root itself survives, so a
    /// cover image and info document already on the device stay put. Used by
    /// full resync.
    pub fn reset_book_dirs(&self, book_id: &str) -> Result<()> {
        let dir = constants::book_dir(&self.base_dir, book_id);
        for sub in [constants::INDEXES_DIR, constants::CONTENT_DIR] {
            let path = dir.join(sub);
            if path.exists() {
                fs::remove_dir_all(&path)
                    .with_context(|| format!("failed to clear {}", path.display()))?;
            }
        }
        for file in [constants::HEADER_FILE, constants::LEGACY_LIST_FILE] {
            match fs::remove_file(dir.join(file)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to remove {}", dir.join(file).display()))
                }
            }
        }
        self.invalidate(Some(book_id));
        self.ensure_book_dirs(book_id)
    }

    // === Header ===

    pub fn load_header(&self, book_id: &str) -> Result<BookIndexHeader> {
        self.header_cache
            .get_or_load(book_id.to_string(), || self.read_header(book_id))
    }

    fn read_header(&self, book_id: &str) -> Result<BookIndexHeader> {
        let path = constants::header_path(&self.base_dir, book_id);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read header {}", path.display()))?;
        BookIndexHeader::parse(&text)
            .with_context(|| format!("malformed header {}", path.display()))
    }

    pub fn write_header(&self, book_id: &str, header: &BookIndexHeader) -> Result<()> {
        let path = constants::header_path(&self.base_dir, book_id);
        write_atomic(&path, &header.serialize())?;
        self.header_cache.insert(book_id.to_string(), header.clone());
        Ok(())
    }

    // === Shards ===

    /// Load one shard, cached. A missing shard file reads as empty.
    pub fn load_shard(&self, book_id: &str, shard_id: u32) -> Result<Vec<ChapterMeta>> {
        self.shard_cache
            .get_or_load((book_id.to_string(), shard_id), || {
                self.read_shard(book_id, shard_id)
            })
    }

    fn read_shard(&self, book_id: &str, shard_id: u32) -> Result<Vec<ChapterMeta>> {
        let path = constants::shard_path(&self.base_dir, book_id, shard_id);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(parse_shard(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => {
                Err(e).with_context(|| format!("failed to read shard {}", path.display()))
            }
        }
    }

    // === Read Path ===

    /// One page of chapter metadata. The page is clamped into range, mapped
    /// to the shards spanning its chapter indices, and only those shards are
    /// loaded (in parallel when the page straddles a shard boundary).
    pub fn get_page(&self, book_id: &str, page: u32, page_size: u32) -> Result<ChapterPage> {
        let header = self.load_header(book_id)?;
        let total = header.total_chapters;
        let page_size = page_size.max(1);

        let total_pages = total.div_ceil(page_size).max(1);
        let current_page = page.min(total_pages - 1);

        if total == 0 {
            return Ok(ChapterPage {
                chapters: Vec::new(),
                total_pages,
                current_page,
                total_chapters: 0,
            });
        }

        let start = current_page * page_size;
        let end = (start + page_size).min(total); // exclusive

        let first_shard = constants::shard_id_for(start);
        let last_shard = constants::shard_id_for(end - 1);
        let shard_ids: Vec<u32> = (first_shard..=last_shard).collect();

        let shards: Vec<Vec<ChapterMeta>> = if shard_ids.len() > 1 {
            shard_ids
                .par_iter()
                .map(|&id| self.load_shard(book_id, id))
                .collect::<Result<_>>()?
        } else {
            shard_ids
                .iter()
                .map(|&id| self.load_shard(book_id, id))
                .collect::<Result<_>>()?
        };

        // Shards are individually sorted and visited in order, so the
        // filtered concatenation is already ascending.
        let chapters = shards
            .into_iter()
            .flatten()
            .filter(|m| m.index >= start && m.index < end)
            .collect();

        Ok(ChapterPage {
            chapters,
            total_pages,
            current_page,
            total_chapters: total,
        })
    }

    /// Point lookup within the owning shard (bounded linear scan).
    pub fn get_chapter_by_index(&self, book_id: &str, index: u32) -> Result<Option<ChapterMeta>> {
        let shard = self.load_shard(book_id, constants::shard_id_for(index))?;
        Ok(shard.into_iter().find(|m| m.index == index))
    }

    /// Reconciliation scan: rebuild the set of synced chapter indices from
    /// actual shard contents, ignoring the header's advisory counter.
    /// Unreadable shard files are skipped rather than failing the scan.
    pub fn rebuild_received(&self, book_id: &str) -> Result<HashSet<u32>> {
        let indexes_dir = constants::book_dir(&self.base_dir, book_id).join(constants::INDEXES_DIR);
        let mut received = HashSet::new();

        let entries = match fs::read_dir(&indexes_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(received),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to list {}", indexes_dir.display()))
            }
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            match fs::read_to_string(&path) {
                Ok(text) => {
                    for meta in parse_shard(&text) {
                        received.insert(meta.index);
                    }
                }
                Err(e) => {
                    warn!("skipping unreadable shard {}: {}", path.display(), e);
                }
            }
        }

        debug!("reconciled {} chapters for book {}", received.len(), book_id);
        Ok(received)
    }

    // === Write Path ===

    /// Durably merge a batch of chapter metas into their shards, then update
    /// the header's synced count. Shard files are rewritten whole via temp +
    /// rename; the header write happens only after every shard write in the
    /// batch succeeded, so a crash mid-flush can never leave the header
    /// claiming more than the shards hold.
    pub fn append_metas(
        &self,
        book_id: &str,
        metas: &[ChapterMeta],
        synced_chapters: u32,
    ) -> Result<()> {
        if metas.is_empty() {
            return Ok(());
        }

        let mut by_shard: BTreeMap<u32, Vec<&ChapterMeta>> = BTreeMap::new();
        for meta in metas {
            by_shard
                .entry(constants::shard_id_for(meta.index))
                .or_default()
                .push(meta);
        }

        for (shard_id, batch) in &by_shard {
            let mut merged: BTreeMap<u32, ChapterMeta> = self
                .read_shard(book_id, *shard_id)?
                .into_iter()
                .map(|m| (m.index, m))
                .collect();
            for meta in batch {
                merged.insert(meta.index, (*meta).clone());
            }
            let merged: Vec<ChapterMeta> = merged.into_values().collect();

            let path = constants::shard_path(&self.base_dir, book_id, *shard_id);
            write_atomic(&path, &serialize_shard(&merged))
                .with_context(|| format!("failed to flush shard {}", shard_id))?;
            self.shard_cache
                .invalidate(&(book_id.to_string(), *shard_id));
        }

        let mut header = self.load_header(book_id)?;
        header.synced_chapters = synced_chapters;
        self.write_header(book_id, &header)?;

        debug!(
            "flushed {} metas across {} shard(s) for book {}",
            metas.len(),
            by_shard.len(),
            book_id
        );
        Ok(())
    }

    /// Remove one chapter's content file and its index line. The shard file
    /// is deleted outright when the removal empties it.
    pub fn delete_chapter(&self, book_id: &str, index: u32) -> Result<()> {
        let content = constants::chapter_path(&self.base_dir, book_id, index);
        match fs::remove_file(&content) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to delete {}", content.display()))
            }
        }

        let shard_id = constants::shard_id_for(index);
        let remaining: Vec<ChapterMeta> = self
            .read_shard(book_id, shard_id)?
            .into_iter()
            .filter(|m| m.index != index)
            .collect();

        let path = constants::shard_path(&self.base_dir, book_id, shard_id);
        if remaining.is_empty() {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to delete shard {}", path.display()))
                }
            }
        } else {
            write_atomic(&path, &serialize_shard(&remaining))?;
        }

        self.invalidate(Some(book_id));
        Ok(())
    }

    // === Cache Control ===

    /// Drop cached headers and shards for one book, or everything.
    pub fn invalidate(&self, book_id: Option<&str>) {
        match book_id {
            Some(id) => {
                self.header_cache.invalidate(&id.to_string());
                self.shard_cache.invalidate_if(|(book, _)| book == id);
            }
            None => {
                self.header_cache.clear();
                self.shard_cache.clear();
            }
        }
    }

    // === Usage ===

    /// Total bytes used under the base directory. Best effort; unreadable
    /// entries count as zero.
    pub fn storage_usage(&self) -> u64 {
        dir_size(&self.base_dir)
    }

    /// Bytes used by one book's directory.
    pub fn book_usage(&self, book_id: &str) -> u64 {
        dir_size(&constants::book_dir(&self.base_dir, book_id))
    }
}

fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                dir_size(&path)
            } else {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            }
        })
        .sum()
}

/// Guard against ever treating a legacy layout as readable.
pub fn require_new_layout(store: &IndexShardStore, book_id: &str) -> Result<()> {
    match store.probe_version(book_id) {
        LayoutVersion::New => Ok(()),
        LayoutVersion::Legacy => bail!(
            "book {} uses the legacy monolithic index layout; it must be deleted and re-synced",
            book_id
        ),
        LayoutVersion::None => bail!("book {} has no chapter index", book_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let header = BookIndexHeader::with_ranges(250, 30);
        assert_eq!(
            header.shard_ranges,
            vec![(0, 99), (100, 199), (200, 249)]
        );
        let parsed = BookIndexHeader::parse(&header.serialize()).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn header_parse_tolerates_bad_range_lines() {
        let parsed = BookIndexHeader::parse("20\n5\n0,19\ngarbage\n,\n").unwrap();
        assert_eq!(parsed.total_chapters, 20);
        assert_eq!(parsed.synced_chapters, 5);
        assert_eq!(parsed.shard_ranges, vec![(0, 19)]);
    }

    #[test]
    fn header_parse_rejects_missing_total() {
        assert!(BookIndexHeader::parse("").is_err());
        assert!(BookIndexHeader::parse("not-a-number\n0\n").is_err());
    }

    #[test]
    fn shard_parse_skips_malformed_and_dedupes() {
        let text = "5\tFive\t100\nbroken line\n7\tSeven\t70\n5\tFive v2\t110\n\n9\n";
        let metas = parse_shard(text);
        assert_eq!(metas.len(), 2);
        assert_eq!(metas[0].index, 5);
        assert_eq!(metas[0].name, "Five v2");
        assert_eq!(metas[0].word_count, 110);
        assert_eq!(metas[1].index, 7);
    }

    #[test]
    fn shard_parse_defaults_missing_word_count() {
        let metas = parse_shard("3\tThree\n");
        assert_eq!(metas[0].word_count, 0);
    }
}
