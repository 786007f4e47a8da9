//! Wire messages between the session and the companion device, plus the
//! transport and observer seams the host injects.
//!
//! Payloads are small JSON objects. Inbound messages are tagged with `stat`,
//! outbound with `type`; field names follow the established wire contract
//! (camelCase where the companion app uses camelCase).

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Messages delivered by the transport, dispatched by the session.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "stat")]
pub enum InboundMessage {
    /// Begin a full or resumed book sync.
    #[serde(rename = "startTransfer")]
    StartTransfer {
        filename: String,
        total: u32,
        #[serde(default, rename = "wordCount")]
        word_count: u64,
        #[serde(default, rename = "startFrom")]
        start_from: u32,
        #[serde(default, rename = "hasCover")]
        has_cover: bool,
        #[serde(default)]
        author: Option<String>,
        #[serde(default)]
        summary: Option<String>,
        #[serde(default, rename = "bookStatus")]
        book_status: Option<String>,
        #[serde(default)]
        category: Option<String>,
        #[serde(default, rename = "localCategory")]
        local_category: Option<String>,
    },
    /// Begin a cover-only sync for an existing book.
    #[serde(rename = "start_cover_transfer")]
    StartCoverTransfer { filename: String },
    /// One chapter chunk. `count` is the transfer sequence number; `data` is
    /// a nested JSON document (see [`ChapterChunk`]).
    #[serde(rename = "d")]
    ChapterData { count: u32, data: String },
    /// The remote confirmed the chapter whose chunks were just written.
    #[serde(rename = "chapter_complete")]
    ChapterComplete { count: u32 },
    #[serde(rename = "transfer_complete")]
    TransferComplete,
    #[serde(rename = "cancel")]
    Cancel,
    #[serde(rename = "get_book_status")]
    GetBookStatus { filename: String },
    #[serde(rename = "cover_chunk")]
    CoverChunk {
        #[serde(rename = "chunkIndex")]
        chunk_index: u32,
        #[serde(rename = "totalChunks")]
        total_chunks: u32,
        data: String,
    },
    #[serde(rename = "cover_transfer_complete")]
    CoverTransferComplete,
    #[serde(rename = "update_book_info")]
    UpdateBookInfo {
        filename: String,
        #[serde(default)]
        author: Option<String>,
        #[serde(default)]
        summary: Option<String>,
        #[serde(default, rename = "bookStatus")]
        book_status: Option<String>,
        #[serde(default)]
        category: Option<String>,
        #[serde(default, rename = "localCategory")]
        local_category: Option<String>,
    },
    #[serde(rename = "delete_chapters")]
    DeleteChapters {
        filename: String,
        #[serde(rename = "chapterIndices")]
        chapter_indices: Vec<u32>,
    },
}

/// The nested payload carried by [`InboundMessage::ChapterData`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterChunk {
    pub index: u32,
    #[serde(rename = "chunkNum")]
    pub chunk_num: u32,
    #[serde(rename = "totalChunks")]
    pub total_chunks: u32,
    pub content: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "wordCount")]
    pub word_count: u64,
}

/// Acks and events sent back to the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "ready")]
    Ready { count: u32, usage: u64 },
    #[serde(rename = "error")]
    Error { message: String, count: u32 },
    #[serde(rename = "next_chunk")]
    NextChunk,
    #[serde(rename = "chapter_chunk_complete")]
    ChapterChunkComplete,
    /// `durable` is true when this completion triggered a successful index
    /// flush; false means the meta is staged in memory until the next batch.
    #[serde(rename = "chapter_saved")]
    ChapterSaved {
        count: u32,
        #[serde(rename = "syncedCount")]
        synced_count: u32,
        #[serde(rename = "totalCount")]
        total_count: u32,
        progress: f64,
        durable: bool,
    },
    #[serde(rename = "cover_ready")]
    CoverReady,
    #[serde(rename = "cover_chunk_received")]
    CoverChunkReceived,
    #[serde(rename = "cover_saved")]
    CoverSaved,
    #[serde(rename = "transfer_finished")]
    TransferFinished,
    #[serde(rename = "book_status")]
    BookStatus {
        #[serde(rename = "syncedChapters")]
        synced_chapters: Vec<u32>,
        #[serde(rename = "hasCover")]
        has_cover: bool,
    },
    #[serde(rename = "book_info_updated")]
    BookInfoUpdated,
    #[serde(rename = "cancel")]
    Cancel,
    #[serde(rename = "progress")]
    Progress { message: String, count: u32 },
    #[serde(rename = "success")]
    Success { message: String, count: u32 },
}

/// Outbound half of the connection, injected into the session. The transport
/// guarantees ordered delivery; the session never sees framing or handshake.
pub trait Transport: Send {
    fn send(&self, msg: &OutboundMessage) -> Result<()>;
}

/// UI-facing progress callbacks. All methods default to no-ops so hosts only
/// implement what they surface.
pub trait SessionObserver: Send {
    fn on_start(&self, _total: u32, _filename: &str) {}
    /// Fractional progress in `[0, 1]` across the whole transfer.
    fn on_progress(&self, _fraction: f64, _filename: &str) {}
    fn on_error(&self, _message: &str) {}
    fn on_success(&self) {}
    fn on_cancel(&self) {}
    fn on_book_info_updated(&self, _filename: &str) {}
}

/// Observer that ignores every event.
pub struct NullObserver;

impl SessionObserver for NullObserver {}
