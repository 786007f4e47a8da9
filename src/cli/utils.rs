use anyhow::Result;
use booksync::{constants, BookCatalog, FileCatalog};
use std::path::Path;

/// Resolve a book argument (title or directory id) to `(dir_name, title)`.
///
/// Catalog entries win; an existing directory named like the argument is
/// taken as-is; otherwise the argument is treated as a title and hashed the
/// same way the sync does.
pub fn resolve_book(dir: &Path, book: &str) -> Result<(String, String)> {
    let catalog = FileCatalog::new(dir);
    if let Ok(books) = catalog.get_books() {
        if let Some(entry) = books.iter().find(|b| b.name == book || b.dir_name == book) {
            return Ok((entry.dir_name.clone(), entry.name.clone()));
        }
    }
    if dir.join(book).is_dir() {
        return Ok((book.to_string(), book.to_string()));
    }
    Ok((constants::book_dir_name(book), book.to_string()))
}
