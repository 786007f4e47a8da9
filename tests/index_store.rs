use anyhow::Result;
use booksync::{constants, BookIndexHeader, ChapterMeta, IndexShardStore, LayoutVersion};
use std::time::Duration;

fn meta(index: u32, name: &str, word_count: u64) -> ChapterMeta {
    ChapterMeta {
        index,
        name: name.to_string(),
        word_count,
    }
}

/// Store with caching disabled so every assertion reads the disk.
fn setup_store() -> Result<(tempfile::TempDir, IndexShardStore)> {
    let dir = tempfile::tempdir()?;
    let store = IndexShardStore::with_cache_ttl(dir.path(), Duration::ZERO);
    Ok((dir, store))
}

fn seed_book(store: &IndexShardStore, book_id: &str, total: u32) -> Result<()> {
    store.ensure_book_dirs(book_id)?;
    store.write_header(book_id, &BookIndexHeader::with_ranges(total, 0))?;
    let metas: Vec<ChapterMeta> = (0..total)
        .map(|i| meta(i, &format!("Chapter {}", i), 100 + i as u64))
        .collect();
    store.append_metas(book_id, &metas, total)?;
    Ok(())
}

#[test]
fn flush_round_trips_metadata() -> Result<()> {
    let (_dir, store) = setup_store()?;
    store.ensure_book_dirs("bk")?;
    store.write_header("bk", &BookIndexHeader::with_ranges(120, 0))?;

    store.append_metas("bk", &[meta(42, "The Answer", 100)], 1)?;

    let shard = store.load_shard("bk", 1)?;
    assert_eq!(shard, vec![meta(42, "The Answer", 100)]);
    assert_eq!(store.load_header("bk")?.synced_chapters, 1);
    assert_eq!(
        store.get_chapter_by_index("bk", 42)?,
        Some(meta(42, "The Answer", 100))
    );
    assert_eq!(store.get_chapter_by_index("bk", 43)?, None);
    Ok(())
}

#[test]
fn shard_merge_keeps_existing_entries_sorted() -> Result<()> {
    let (_dir, store) = setup_store()?;
    store.ensure_book_dirs("bk")?;
    store.write_header("bk", &BookIndexHeader::with_ranges(10, 0))?;

    store.append_metas("bk", &[meta(5, "Five", 50), meta(7, "Seven", 70)], 2)?;
    store.append_metas("bk", &[meta(6, "Six", 60)], 3)?;

    let indices: Vec<u32> = store.load_shard("bk", 1)?.iter().map(|m| m.index).collect();
    assert_eq!(indices, vec![5, 6, 7]);
    Ok(())
}

#[test]
fn flush_overwrites_duplicate_index_with_latest() -> Result<()> {
    let (_dir, store) = setup_store()?;
    store.ensure_book_dirs("bk")?;
    store.write_header("bk", &BookIndexHeader::with_ranges(10, 0))?;

    store.append_metas("bk", &[meta(5, "Old Name", 50)], 1)?;
    store.append_metas("bk", &[meta(5, "New Name", 55)], 1)?;

    let shard = store.load_shard("bk", 1)?;
    assert_eq!(shard, vec![meta(5, "New Name", 55)]);
    Ok(())
}

#[test]
fn flush_spanning_shards_writes_both_files() -> Result<()> {
    let (dir, store) = setup_store()?;
    store.ensure_book_dirs("bk")?;
    store.write_header("bk", &BookIndexHeader::with_ranges(250, 0))?;

    store.append_metas("bk", &[meta(99, "End of 1", 1), meta(100, "Start of 2", 1)], 2)?;

    assert!(constants::shard_path(dir.path(), "bk", 1).is_file());
    assert!(constants::shard_path(dir.path(), "bk", 2).is_file());
    assert_eq!(store.load_shard("bk", 1)?.len(), 1);
    assert_eq!(store.load_shard("bk", 2)?.len(), 1);
    Ok(())
}

#[test]
fn pagination_slices_and_counts_pages() -> Result<()> {
    let (_dir, store) = setup_store()?;
    seed_book(&store, "bk", 20)?;

    let page = store.get_page("bk", 0, 8)?;
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.current_page, 0);
    assert_eq!(page.total_chapters, 20);
    let indices: Vec<u32> = page.chapters.iter().map(|m| m.index).collect();
    assert_eq!(indices, (0..8).collect::<Vec<_>>());

    // Last page is short.
    let page = store.get_page("bk", 2, 8)?;
    let indices: Vec<u32> = page.chapters.iter().map(|m| m.index).collect();
    assert_eq!(indices, vec![16, 17, 18, 19]);
    Ok(())
}

#[test]
fn out_of_range_page_clamps_to_last() -> Result<()> {
    let (_dir, store) = setup_store()?;
    seed_book(&store, "bk", 20)?;

    let page = store.get_page("bk", 5, 8)?;
    assert_eq!(page.current_page, 2);
    let indices: Vec<u32> = page.chapters.iter().map(|m| m.index).collect();
    assert_eq!(indices, vec![16, 17, 18, 19]);
    Ok(())
}

#[test]
fn page_straddling_a_shard_boundary_merges_in_order() -> Result<()> {
    let (_dir, store) = setup_store()?;
    seed_book(&store, "bk", 250)?;

    // Page 12 of size 8 covers indices 96..=103, spanning shards 1 and 2.
    let page = store.get_page("bk", 12, 8)?;
    let indices: Vec<u32> = page.chapters.iter().map(|m| m.index).collect();
    assert_eq!(indices, (96..104).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn empty_book_yields_one_empty_page() -> Result<()> {
    let (_dir, store) = setup_store()?;
    store.ensure_book_dirs("bk")?;
    store.write_header("bk", &BookIndexHeader::with_ranges(0, 0))?;

    let page = store.get_page("bk", 0, 8)?;
    assert!(page.chapters.is_empty());
    assert_eq!(page.total_pages, 1);
    assert_eq!(page.total_chapters, 0);
    Ok(())
}

#[test]
fn rebuild_received_trusts_shards_over_header() -> Result<()> {
    let (dir, store) = setup_store()?;
    store.ensure_book_dirs("bk")?;
    store.write_header("bk", &BookIndexHeader::with_ranges(10, 0))?;
    store.append_metas("bk", &[meta(0, "A", 1), meta(3, "B", 1), meta(9, "C", 1)], 3)?;

    // Header claims nothing is synced; the scan should disagree.
    std::fs::write(constants::header_path(dir.path(), "bk"), "10\n0\n0,9\n")?;

    let received = store.rebuild_received("bk")?;
    let mut indices: Vec<u32> = received.into_iter().collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 3, 9]);
    Ok(())
}

#[test]
fn delete_chapter_rewrites_shard_and_drops_empty_file() -> Result<()> {
    let (dir, store) = setup_store()?;
    store.ensure_book_dirs("bk")?;
    store.write_header("bk", &BookIndexHeader::with_ranges(10, 0))?;
    store.append_metas("bk", &[meta(1, "One", 1), meta(2, "Two", 2)], 2)?;
    std::fs::write(constants::chapter_path(dir.path(), "bk", 1), "body")?;

    store.delete_chapter("bk", 1)?;
    assert!(!constants::chapter_path(dir.path(), "bk", 1).exists());
    assert_eq!(store.load_shard("bk", 1)?.len(), 1);

    store.delete_chapter("bk", 2)?;
    assert!(!constants::shard_path(dir.path(), "bk", 1).exists());
    // Deleting a chapter that is already gone is not an error.
    store.delete_chapter("bk", 2)?;
    Ok(())
}

#[test]
fn reset_wipes_chapter_data_but_keeps_book_root_files() -> Result<()> {
    let (dir, store) = setup_store()?;
    seed_book(&store, "bk", 3)?;
    std::fs::write(constants::chapter_path(dir.path(), "bk", 0), "body")?;
    let book_dir = constants::book_dir(dir.path(), "bk");
    std::fs::write(book_dir.join("cover_abc12345.jpg"), b"image")?;
    std::fs::write(book_dir.join(constants::BOOK_INFO_FILE), "{}")?;

    store.reset_book_dirs("bk")?;

    assert!(!constants::chapter_path(dir.path(), "bk", 0).exists());
    assert!(!constants::shard_path(dir.path(), "bk", 1).exists());
    assert_eq!(store.probe_version("bk"), LayoutVersion::None);
    // Skeleton is back; files at the book root were untouched.
    assert!(book_dir.join(constants::INDEXES_DIR).is_dir());
    assert!(book_dir.join(constants::CONTENT_DIR).is_dir());
    assert_eq!(std::fs::read(book_dir.join("cover_abc12345.jpg"))?, b"image");
    assert!(book_dir.join(constants::BOOK_INFO_FILE).is_file());
    Ok(())
}

#[test]
fn book_usage_counts_a_single_book() -> Result<()> {
    let (dir, store) = setup_store()?;
    seed_book(&store, "aa", 2)?;
    store.ensure_book_dirs("bb")?;
    std::fs::write(constants::chapter_path(dir.path(), "aa", 0), "0123456789")?;
    std::fs::write(constants::chapter_path(dir.path(), "bb", 0), "other book")?;

    let usage = store.book_usage("aa");
    assert!(usage >= 10);
    assert!(usage < store.storage_usage());
    assert_eq!(store.book_usage("missing"), 0);
    Ok(())
}

#[test]
fn probe_detects_layouts() -> Result<()> {
    let (dir, store) = setup_store()?;
    assert_eq!(store.probe_version("bk"), LayoutVersion::None);

    store.ensure_book_dirs("bk")?;
    assert_eq!(store.probe_version("bk"), LayoutVersion::None);

    std::fs::write(
        constants::book_dir(dir.path(), "bk").join(constants::LEGACY_LIST_FILE),
        "{}\n",
    )?;
    assert_eq!(store.probe_version("bk"), LayoutVersion::Legacy);

    store.write_header("bk", &BookIndexHeader::with_ranges(10, 0))?;
    assert_eq!(store.probe_version("bk"), LayoutVersion::New);
    Ok(())
}

#[test]
fn cached_reads_survive_until_invalidated() -> Result<()> {
    let dir = tempfile::tempdir()?;
    // Long TTL: reads come from cache once loaded.
    let store = IndexShardStore::with_cache_ttl(dir.path(), Duration::from_secs(300));
    store.ensure_book_dirs("bk")?;
    store.write_header("bk", &BookIndexHeader::with_ranges(10, 0))?;
    store.append_metas("bk", &[meta(1, "One", 1)], 1)?;

    assert_eq!(store.load_shard("bk", 1)?.len(), 1);

    // Mutate the file behind the cache's back.
    std::fs::write(constants::shard_path(dir.path(), "bk", 1), "")?;
    assert_eq!(store.load_shard("bk", 1)?.len(), 1, "stale read expected");

    store.invalidate(Some("bk"));
    assert_eq!(store.load_shard("bk", 1)?.len(), 0);
    Ok(())
}
