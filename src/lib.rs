// src/lib.rs
//
// booksync - chaptered book transfer and sharded index storage.
//
// A companion device streams books (chaptered text plus an optional cover
// image) over a message transport; this crate persists them under a base
// directory with per-chapter content files and a sharded chapter index that
// supports resumable transfers and paginated reads on storage-constrained
// targets.

pub mod cache;
pub mod catalog;
pub mod codec;
pub mod constants;
pub mod content;
pub mod error;
pub mod format;
pub mod index_store;
pub mod messages;
pub mod session;

pub use catalog::{BookCatalog, BookEntry, BookInfo, FileCatalog, ReadingProgress};
pub use error::TransferError;
pub use index_store::{
    BookIndexHeader, ChapterMeta, ChapterPage, IndexShardStore, LayoutVersion,
};
pub use messages::{
    ChapterChunk, InboundMessage, NullObserver, OutboundMessage, SessionObserver, Transport,
};
pub use session::TransferSession;
