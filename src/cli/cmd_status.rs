use anyhow::Result;
use booksync::format::{format_bytes, format_number};
use booksync::{catalog, IndexShardStore, LayoutVersion};
use clap::Parser;
use std::path::PathBuf;

use super::utils;

#[derive(Parser)]
#[command(
    about = "Show one book's sync status",
    long_about = "Display the on-disk state of one book: index layout version, header\n\
totals, the reconciled count of chapters actually present in the shards,\n\
and the metadata document. The reconciled count is rebuilt by scanning the\n\
shard files, so it reflects what a resumed transfer would see rather than\n\
the header's advisory counter.",
    help_template = crate::clap_help!(
        examples: "  # By title (hashed to a directory id)\n  \
                   {bin} status \"Dune\"\n\n  \
                   # By directory id\n  \
                   {bin} status 0f3a99c1\n\n  \
                   # JSON output for scripting\n  \
                   {bin} status \"Dune\" --json"
    )
)]
pub struct StatusCommand {
    /// Book title or directory id
    pub book: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(cmd: StatusCommand, dir: PathBuf) -> Result<()> {
    let (book_id, title) = utils::resolve_book(&dir, &cmd.book)?;
    let store = IndexShardStore::new(&dir);

    let layout = store.probe_version(&book_id);
    let info = catalog::read_book_info(&dir, &book_id);

    let (header, reconciled) = match layout {
        LayoutVersion::New => {
            let header = store.load_header(&book_id)?;
            let reconciled = store.rebuild_received(&book_id)?.len() as u32;
            (Some(header), reconciled)
        }
        _ => (None, 0),
    };

    if cmd.json {
        let value = serde_json::json!({
            "book": title,
            "dirName": book_id,
            "layout": layout_str(layout),
            "totalChapters": header.as_ref().map(|h| h.total_chapters),
            "syncedChapters": header.as_ref().map(|h| h.synced_chapters),
            "reconciledChapters": reconciled,
            "shardRanges": header.as_ref().map(|h| &h.shard_ranges),
            "hasCover": info.has_cover,
            "coverFileName": info.cover_file_name,
            "author": info.author,
            "category": info.category,
            "localCategory": info.local_category,
            "storageUsage": store.storage_usage(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Book:        {}", title);
    println!("Directory:   {}", book_id);
    println!("Layout:      {}", layout_str(layout));
    match &header {
        Some(h) => {
            println!("Chapters:    {} total", format_number(h.total_chapters));
            println!(
                "Synced:      {} (header) / {} (reconciled)",
                format_number(h.synced_chapters),
                format_number(reconciled)
            );
            println!("Shards:      {}", h.shard_ranges.len());
        }
        None => println!("Chapters:    (no readable index)"),
    }
    if let Some(author) = &info.author {
        println!("Author:      {}", author);
    }
    if let Some(cover) = &info.cover_file_name {
        println!("Cover:       {}", cover);
    }
    if let Some(category) = info.local_category.as_ref().or(info.category.as_ref()) {
        println!("Category:    {}", category);
    }
    println!("Disk usage:  {} (all books)", format_bytes(store.storage_usage()));

    if layout == LayoutVersion::Legacy {
        println!();
        println!("This book uses the legacy monolithic index; delete and re-sync it.");
    }
    Ok(())
}

fn layout_str(layout: LayoutVersion) -> &'static str {
    match layout {
        LayoutVersion::New => "sharded",
        LayoutVersion::Legacy => "legacy",
        LayoutVersion::None => "none",
    }
}
