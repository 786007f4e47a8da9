use anyhow::Result;
use booksync::format::{format_bytes_compact, format_number};
use booksync::{BookCatalog, BookEntry, FileCatalog, IndexShardStore};
use std::path::PathBuf;

#[derive(clap::Args)]
#[command(
    about = "List books (machine-readable)",
    after_help = "Examples:\n  \
            # List all books\n  \
            booksync ls\n\n  \
            # Custom format\n  \
            booksync ls --format \"name,dir,chapters\"\n\n  \
            # CSV format\n  \
            booksync ls --separator \",\"\n\n  \
            # Scripting examples\n  \
            booksync ls | cut -f2              # Just directory ids\n  \
            booksync ls --separator \",\" > books.csv # Export to CSV"
)]
pub struct LsCommand {
    /// Output format: name,dir,chapters,words,size,cover,category,synced
    #[arg(long, default_value = "name,dir,chapters,words,size,cover,synced")]
    pub format: String,

    /// Omit header row
    #[arg(long)]
    pub no_header: bool,

    /// Field separator (default: tab)
    #[arg(long, default_value = "\t")]
    pub separator: String,

    /// Print word counts with thousands separators and sizes in compact units
    #[arg(short = 'h', long = "human-readable")]
    pub human_readable: bool,
}

pub fn run(cmd: LsCommand, dir: PathBuf) -> Result<()> {
    let catalog = FileCatalog::new(&dir);
    let store = IndexShardStore::new(&dir);
    let books = catalog.get_books()?;
    if books.is_empty() {
        return Ok(());
    }

    let fields: Vec<&str> = cmd
        .format
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect();

    if !cmd.no_header {
        println!("{}", fields.join(&cmd.separator));
    }
    for book in &books {
        let row: Vec<String> = fields
            .iter()
            .map(|f| field_value(book, f, cmd.human_readable, &store))
            .collect();
        println!("{}", row.join(&cmd.separator));
    }
    Ok(())
}

fn field_value(book: &BookEntry, field: &str, human: bool, store: &IndexShardStore) -> String {
    match field {
        "name" => book.name.clone(),
        "dir" => book.dir_name.clone(),
        "chapters" => book.chapter_count.to_string(),
        "words" => {
            if human {
                format_number(book.word_count)
            } else {
                book.word_count.to_string()
            }
        }
        "size" => {
            let bytes = store.book_usage(&book.dir_name);
            if human {
                format_bytes_compact(bytes)
            } else {
                bytes.to_string()
            }
        }
        "cover" => book
            .cover_file_name
            .clone()
            .unwrap_or_else(|| "-".to_string()),
        "category" => book
            .local_category
            .clone()
            .unwrap_or_else(|| "-".to_string()),
        "synced" => book.synced_at.clone().unwrap_or_else(|| "-".to_string()),
        unknown => format!("?{}", unknown),
    }
}
