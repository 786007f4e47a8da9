use anyhow::{bail, Context, Result};
use booksync::format::format_bytes;
use booksync::{catalog, constants, FileCatalog, IndexShardStore};
use clap::Parser;
use std::path::PathBuf;

use super::utils;

#[derive(Parser)]
#[command(
    about = "Remove a synced book from disk and the catalog",
    help_template = crate::clap_help!(
        examples: "  # Remove by title\n  \
                   {bin} rm \"Dune\"\n\n  \
                   # Drop a stale catalog entry, keep the files\n  \
                   {bin} rm 0f3a99c1 --keep-files"
    )
)]
pub struct RmCommand {
    /// Book title or directory id
    pub book: String,

    /// Remove only the catalog entry, leave files on disk
    #[arg(long)]
    pub keep_files: bool,
}

pub fn run(cmd: RmCommand, dir: PathBuf) -> Result<()> {
    let (book_id, title) = utils::resolve_book(&dir, &cmd.book)?;

    let shelf = FileCatalog::new(&dir);
    let removed_entry = catalog::remove_entry(&shelf, &book_id)?;

    let book_dir = constants::book_dir(&dir, &book_id);
    let mut freed = 0u64;
    if !cmd.keep_files && book_dir.is_dir() {
        freed = IndexShardStore::new(&dir).book_usage(&book_id);
        std::fs::remove_dir_all(&book_dir)
            .with_context(|| format!("failed to remove {}", book_dir.display()))?;
    }

    if !removed_entry && freed == 0 {
        bail!("no book matching '{}'", title);
    }

    if freed > 0 {
        println!("removed {} ({} freed)", title, format_bytes(freed));
    } else {
        println!("removed catalog entry for {}", title);
    }
    Ok(())
}
