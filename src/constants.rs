//! Global constants and helpers for filenames/paths, index layout, and book id derivation.
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Binary name used in log prefixes and metadata
pub const BINARY_NAME: &str = "booksync";

/// Package version from Cargo.toml (set at compile time)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Index Layout Constants
// ============================================================================

/// Number of chapter metadata entries per shard file
pub const CHAPTERS_PER_SHARD: u32 = 100;

/// Pending chapter metas buffered before a durable index flush
pub const META_BATCH_SIZE: usize = 10;

/// Default chapter-list page size for the read path
pub const DEFAULT_PAGE_SIZE: u32 = 8;

/// TTL for cached headers and shards (expiry is lazy, checked on access)
pub const INDEX_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

// ============================================================================
// File and Directory Constants
// ============================================================================

/// Per-book header file: line 0 total, line 1 synced, lines 2+ "start,end" shard ranges
pub const HEADER_FILE: &str = "lindex.txt";

/// Pre-shard monolithic chapter list (legacy layout, not readable by this version)
pub const LEGACY_LIST_FILE: &str = "list.txt";

/// Per-book metadata document
pub const BOOK_INFO_FILE: &str = "book_info.json";

/// Catalog document at the base directory root
pub const BOOKSHELF_FILE: &str = "bookshelf.json";

/// Subdirectory holding shard files (`<shardId>.txt`)
pub const INDEXES_DIR: &str = "indexes";

/// Subdirectory holding chapter bodies (`<index>.txt`)
pub const CONTENT_DIR: &str = "content";

// ============================================================================
// Path Helpers
// ============================================================================

/// Resolves the directory for a book id under the base directory
pub fn book_dir(base: impl AsRef<Path>, book_id: &str) -> PathBuf {
    base.as_ref().join(book_id)
}

/// Resolves the header path for a book
pub fn header_path(base: impl AsRef<Path>, book_id: &str) -> PathBuf {
    book_dir(base, book_id).join(HEADER_FILE)
}

/// Returns the canonical shard filename for a shard id
pub fn shard_filename(shard_id: u32) -> String {
    format!("{}.txt", shard_id)
}

/// Resolves an on-disk shard path for a book
pub fn shard_path(base: impl AsRef<Path>, book_id: &str, shard_id: u32) -> PathBuf {
    book_dir(base, book_id)
        .join(INDEXES_DIR)
        .join(shard_filename(shard_id))
}

/// Resolves a chapter content path for a book
pub fn chapter_path(base: impl AsRef<Path>, book_id: &str, index: u32) -> PathBuf {
    book_dir(base, book_id)
        .join(CONTENT_DIR)
        .join(format!("{}.txt", index))
}

/// Shard id owning a chapter index. Shard ids are 1-based on disk.
pub fn shard_id_for(index: u32) -> u32 {
    index / CHAPTERS_PER_SHARD + 1
}

// ============================================================================
// Book Id Derivation
// ============================================================================

/// Derives the on-disk directory id for a book display name.
///
/// 32-bit `(h << 5) - h + c` hash over the UTF-16 code units of the name,
/// rendered as 8 lowercase hex digits; the empty name maps to "00000000".
/// Companion apps compute the same id, so the scheme is part of the wire
/// contract. Two titles can collide; there is no collision check.
pub fn book_dir_name(display_name: &str) -> String {
    if display_name.is_empty() {
        return "00000000".to_string();
    }
    let mut hash: i32 = 0;
    for unit in display_name.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(unit as i32);
    }
    format!("{:08x}", hash as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_is_all_zero() {
        assert_eq!(book_dir_name(""), "00000000");
    }

    #[test]
    fn dir_name_is_stable_and_hex() {
        let id = book_dir_name("三体");
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, book_dir_name("三体"));
        assert_ne!(id, book_dir_name("三体 2"));
    }

    #[test]
    fn ascii_matches_reference_hash() {
        // "a" -> 97 -> 0x61
        assert_eq!(book_dir_name("a"), "00000061");
        // "ab" -> 97*31 + 98 = 3105 = 0xc21
        assert_eq!(book_dir_name("ab"), "00000c21");
    }

    #[test]
    fn shard_ids_are_one_based() {
        assert_eq!(shard_id_for(0), 1);
        assert_eq!(shard_id_for(99), 1);
        assert_eq!(shard_id_for(100), 2);
        assert_eq!(shard_id_for(250), 3);
    }
}
