use anyhow::Result;
use booksync::constants::DEFAULT_PAGE_SIZE;
use booksync::index_store::require_new_layout;
use booksync::IndexShardStore;
use clap::Parser;
use std::path::PathBuf;

use super::utils;

#[derive(Parser)]
#[command(
    about = "List a book's chapters page by page",
    help_template = crate::clap_help!(
        examples: "  # First page (8 chapters)\n  \
                   {bin} chapters \"Dune\"\n\n  \
                   # A later page with a bigger page size\n  \
                   {bin} chapters \"Dune\" --page 3 --page-size 20\n\n  \
                   # Everything, tab-separated\n  \
                   {bin} chapters \"Dune\" --all --no-header"
    )
)]
pub struct ChaptersCommand {
    /// Book title or directory id
    pub book: String,

    /// Page to show (0-based; out-of-range pages clamp to the last page)
    #[arg(short, long, default_value = "0")]
    pub page: u32,

    /// Chapters per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,

    /// Show all chapters, ignoring --page
    #[arg(long)]
    pub all: bool,

    /// Omit header row
    #[arg(long)]
    pub no_header: bool,

    /// Field separator (default: tab)
    #[arg(long, default_value = "\t")]
    pub separator: String,
}

pub fn run(cmd: ChaptersCommand, dir: PathBuf) -> Result<()> {
    let (book_id, _title) = utils::resolve_book(&dir, &cmd.book)?;
    let store = IndexShardStore::new(&dir);
    require_new_layout(&store, &book_id)?;

    if !cmd.no_header {
        println!("index{}name{}words", cmd.separator, cmd.separator);
    }

    let mut page = if cmd.all { 0 } else { cmd.page };
    loop {
        let result = store.get_page(&book_id, page, cmd.page_size)?;
        for meta in &result.chapters {
            println!(
                "{}{}{}{}{}",
                meta.index, cmd.separator, meta.name, cmd.separator, meta.word_count
            );
        }
        if !cmd.all || result.current_page + 1 >= result.total_pages {
            break;
        }
        page = result.current_page + 1;
    }
    Ok(())
}
