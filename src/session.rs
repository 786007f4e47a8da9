// src/session.rs
//
// Per-connection transfer session. The host wires one of these to the
// transport and feeds it inbound messages in arrival order; handlers run
// strictly sequentially (`&mut self`), so there is no concurrent mutation of
// session state. The read path (pagination) runs independently against the
// shared IndexShardStore.

use crate::catalog::{
    self, BookCatalog, BookEntry, BookInfo, ReadingProgress,
};
use crate::constants::{self, META_BATCH_SIZE};
use crate::content::{generate_cover_filename, ChapterWriter, CoverWriter};
use crate::error::{is_disk_full, TransferError};
use crate::index_store::{ChapterMeta, BookIndexHeader, IndexShardStore, LayoutVersion};
use crate::messages::{
    ChapterChunk, InboundMessage, NullObserver, OutboundMessage, SessionObserver, Transport,
};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;

/// Chapter-track state for one in-flight book sync.
struct ActiveTransfer {
    book_name: String,
    book_id: String,
    total_chapters: u32,
    /// Chapter indices durably represented in shards plus those completed
    /// this session. Rebuilt from disk on resume, never trusted from the
    /// header counter alone.
    received: HashSet<u32>,
    /// Metas staged but not yet flushed to shards.
    pending_metas: Vec<ChapterMeta>,
    /// Writer for the chapter currently being reassembled.
    writer: Option<ChapterWriter>,
    /// Meta finalized on the last chunk, awaiting `chapter_complete`.
    staged_meta: Option<ChapterMeta>,
}

/// Cover-track state. Coexists with a chapter transfer during a full sync;
/// stands alone when `is_cover_only`.
struct CoverTransfer {
    writer: CoverWriter,
}

/// Orchestrates a single book sync over an injected transport.
pub struct TransferSession {
    store: Arc<IndexShardStore>,
    catalog: Arc<dyn BookCatalog>,
    transport: Box<dyn Transport>,
    observer: Box<dyn SessionObserver>,
    active: Option<ActiveTransfer>,
    cover: Option<CoverTransfer>,
    /// Cover filename settled during `start_transfer`, consumed when the
    /// book info document is written.
    pending_cover_name: Option<String>,
    is_cover_only: bool,
}

impl TransferSession {
    pub fn new(
        store: Arc<IndexShardStore>,
        catalog: Arc<dyn BookCatalog>,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            store,
            catalog,
            transport,
            observer: Box::new(NullObserver),
            active: None,
            cover: None,
            pending_cover_name: None,
            is_cover_only: false,
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// True when no transfer is in flight.
    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.cover.is_none()
    }

    /// Chapters received so far in the current session (0 when idle).
    pub fn received_chapters(&self) -> u32 {
        self.active.as_ref().map_or(0, |a| a.received.len() as u32)
    }

    /// Metas staged but not yet durably flushed.
    pub fn pending_metas(&self) -> usize {
        self.active.as_ref().map_or(0, |a| a.pending_metas.len())
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Entry point for the transport listener. Handler failures are reported
    /// to the remote and the observer; they never poison the session beyond
    /// what the individual handler rolled back.
    pub fn handle_message(&mut self, msg: InboundMessage) {
        let result = match msg {
            InboundMessage::StartTransfer {
                filename,
                total,
                word_count,
                start_from,
                has_cover,
                author,
                summary,
                book_status,
                category,
                local_category,
            } => {
                self.is_cover_only = false;
                self.start_transfer(StartParams {
                    filename,
                    total,
                    word_count,
                    start_from,
                    has_cover,
                    author,
                    summary,
                    book_status,
                    category,
                    local_category,
                })
            }
            InboundMessage::StartCoverTransfer { filename } => {
                self.is_cover_only = true;
                self.start_cover_transfer(&filename)
            }
            InboundMessage::ChapterData { count, data } => self.save_chapter_chunk(count, &data),
            InboundMessage::ChapterComplete { count } => self.complete_chapter(count),
            InboundMessage::TransferComplete => self.complete_transfer(),
            InboundMessage::Cancel => self.cancel(),
            InboundMessage::GetBookStatus { filename } => self.send_book_status(&filename),
            InboundMessage::CoverChunk {
                chunk_index, data, ..
            } => self.save_cover_chunk(chunk_index, &data),
            InboundMessage::CoverTransferComplete => self.complete_cover_transfer(),
            InboundMessage::UpdateBookInfo {
                filename,
                author,
                summary,
                book_status,
                category,
                local_category,
            } => self.update_book_info(
                &filename,
                author,
                summary,
                book_status,
                category,
                local_category,
            ),
            InboundMessage::DeleteChapters {
                filename,
                chapter_indices,
            } => self.delete_chapters(&filename, &chapter_indices),
        };

        if let Err(err) = result {
            self.report_error(err);
        }
    }

    /// Transport-level connection teardown. Pending metadata is flushed best
    /// effort before state is cleared.
    pub fn handle_disconnect(&mut self, reason: &str) {
        warn!("connection closed ({}); tearing down session", reason);
        self.flush_pending_best_effort();
        self.reset();
        self.observer.on_error(reason);
    }

    fn report_error(&mut self, err: anyhow::Error) {
        let message = match err.downcast_ref::<TransferError>() {
            Some(te) => te.user_message(),
            None => {
                let disk_full = err
                    .chain()
                    .filter_map(|c| c.downcast_ref::<std::io::Error>())
                    .any(is_disk_full);
                if disk_full {
                    "insufficient storage space".to_string()
                } else {
                    format!("{:#}", err)
                }
            }
        };
        warn!("session error: {}", message);
        let count = self.received_chapters();
        let _ = self.transport.send(&OutboundMessage::Error {
            message: message.clone(),
            count,
        });
        self.observer.on_error(&message);
    }

    fn reset(&mut self) {
        self.active = None;
        self.cover = None;
        self.pending_cover_name = None;
        self.is_cover_only = false;
    }

    // ========================================================================
    // Start / Resume
    // ========================================================================

    fn start_transfer(&mut self, mut params: StartParams) -> Result<()> {
        if params.filename.trim().is_empty() {
            return Err(TransferError::Validation("filename is empty or invalid".into()).into());
        }

        // UI feedback precedes any I/O.
        self.observer.on_start(params.total, &params.filename);

        let book_id = constants::book_dir_name(&params.filename);
        std::fs::create_dir_all(self.store.base_dir())
            .context("failed to create books directory")?;

        loop {
            if params.start_from == 0 {
                self.start_full_resync(&book_id, &params)?;
                break;
            }
            match self.start_resume(&book_id, &params) {
                Ok(()) => break,
                Err(e) => {
                    // Missing or corrupt header/shards: fall back to a full
                    // resync rather than resuming against unknown state.
                    info!(
                        "resume reconciliation failed for {} ({:#}); restarting from zero",
                        book_id, e
                    );
                    params.start_from = 0;
                }
            }
        }

        let received = self.received_chapters();
        self.finish_start(&book_id, &params)?;
        self.transport.send(&OutboundMessage::Ready {
            count: received,
            usage: self.store.storage_usage(),
        })?;
        Ok(())
    }

    /// `startFrom == 0`: wipe the book's chapter data, fresh header, catalog
    /// upsert preserving any prior reading progress. A cover already on disk
    /// is carried forward when the remote is not sending a replacement.
    fn start_full_resync(&mut self, book_id: &str, params: &StartParams) -> Result<()> {
        let book_dir = constants::book_dir(self.store.base_dir(), book_id);
        let prior_cover = catalog::read_book_info(self.store.base_dir(), book_id)
            .cover_file_name
            .filter(|name| book_dir.join(name).is_file());

        self.store.reset_book_dirs(book_id)?;

        let header = BookIndexHeader::with_ranges(params.total, 0);
        self.store.write_header(book_id, &header)?;

        let cover_file_name = if params.has_cover {
            // A replacement is coming; drop the old image now so a failed
            // transfer cannot leave two covers behind.
            if let Some(old) = prior_cover {
                let _ = std::fs::remove_file(book_dir.join(old));
            }
            Some(generate_cover_filename())
        } else {
            prior_cover
        };
        catalog::upsert_entry(
            self.catalog.as_ref(),
            BookEntry {
                name: params.filename.clone(),
                dir_name: book_id.to_string(),
                chapter_count: params.total,
                word_count: params.word_count,
                has_cover: cover_file_name.is_some(),
                cover_file_name: cover_file_name.clone(),
                progress: ReadingProgress::default(),
                local_category: params.local_category.clone(),
                synced_at: Some(chrono::Utc::now().to_rfc3339()),
            },
        )?;

        self.install_transfer(book_id, params, HashSet::new(), cover_file_name);
        Ok(())
    }

    /// `startFrom > 0`: reconcile against what the shards actually hold.
    fn start_resume(&mut self, book_id: &str, params: &StartParams) -> Result<()> {
        if self.store.probe_version(book_id) != LayoutVersion::New {
            anyhow::bail!("no sharded index to resume from");
        }

        let received = self.store.rebuild_received(book_id)?;
        let mut header = self.store.load_header(book_id)?;
        header.total_chapters = params.total;
        header.synced_chapters = received.len() as u32;
        self.store.write_header(book_id, &header)?;
        self.store.ensure_book_dirs(book_id)?;

        // Carry forward a cover the remote does not know about.
        let info = catalog::read_book_info(self.store.base_dir(), book_id);
        let cover_file_name = if params.has_cover {
            info.cover_file_name
                .clone()
                .or_else(|| Some(generate_cover_filename()))
        } else {
            info.cover_file_name.clone()
        };

        debug!(
            "resuming {}: {} of {} chapters already on disk",
            book_id,
            received.len(),
            params.total
        );
        self.install_transfer(book_id, params, received, cover_file_name);
        Ok(())
    }

    fn install_transfer(
        &mut self,
        book_id: &str,
        params: &StartParams,
        received: HashSet<u32>,
        cover_file_name: Option<String>,
    ) {
        self.active = Some(ActiveTransfer {
            book_name: params.filename.clone(),
            book_id: book_id.to_string(),
            total_chapters: params.total,
            received,
            pending_metas: Vec::new(),
            writer: None,
            staged_meta: None,
        });
        // The writer is armed only when cover chunks are actually expected;
        // a carried-forward cover must not be opened for writing.
        self.cover = if params.has_cover {
            cover_file_name.as_ref().map(|name| CoverTransfer {
                writer: CoverWriter::new(
                    constants::book_dir(self.store.base_dir(), book_id).join(name),
                ),
            })
        } else {
            None
        };
        self.pending_cover_name = cover_file_name;
    }

    /// Writes `book_info.json` once the directory layout is settled.
    fn finish_start(&mut self, book_id: &str, params: &StartParams) -> Result<()> {
        let has_cover = self.pending_cover_name.is_some();
        let info = BookInfo {
            name: Some(params.filename.clone()),
            chapter_count: Some(params.total),
            word_count: Some(params.word_count),
            has_cover,
            cover_file_name: self.pending_cover_name.clone(),
            author: params.author.clone(),
            summary: params.summary.clone(),
            book_status: params.book_status.clone(),
            category: params.category.clone(),
            local_category: params.local_category.clone(),
        };
        catalog::write_book_info(self.store.base_dir(), book_id, &info)
    }

    // ========================================================================
    // Chapter Track
    // ========================================================================

    fn save_chapter_chunk(&mut self, count: u32, data: &str) -> Result<()> {
        let chunk: ChapterChunk = serde_json::from_str(data)
            .map_err(|e| TransferError::Format(format!("malformed chapter chunk payload: {}", e)))?;

        let base_dir = self.store.base_dir().to_path_buf();
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| TransferError::Validation("no transfer in progress".into()))?;

        if chunk.chunk_num == 0 {
            active.writer = Some(
                ChapterWriter::begin(&base_dir, &active.book_id, chunk.index, &chunk.content)
                    .map_err(TransferError::Storage)?,
            );
        } else {
            match active.writer.as_mut() {
                Some(writer) if writer.index() == chunk.index => {
                    writer.append(&chunk.content).map_err(TransferError::Storage)?;
                }
                other => {
                    let expected = other.as_ref().map(|w| w.index());
                    // Abort this chapter only; the session stays live and
                    // recovers on the next chunkNum == 0.
                    active.writer = None;
                    return Err(TransferError::Sequencing {
                        expected,
                        got: chunk.index,
                    }
                    .into());
                }
            }
        }

        let chunk_progress = (chunk.chunk_num + 1) as f64 / chunk.total_chunks.max(1) as f64;
        let fraction = (count as f64 + chunk_progress) / active.total_chapters.max(1) as f64;
        let book_name = active.book_name.clone();
        let is_last = chunk.chunk_num + 1 == chunk.total_chunks;

        if is_last {
            if let Some(writer) = active.writer.take() {
                writer.finalize().map_err(TransferError::Storage)?;
            }
            active.staged_meta = Some(ChapterMeta {
                index: chunk.index,
                name: chunk.name,
                word_count: chunk.word_count,
            });
            self.transport.send(&OutboundMessage::ChapterChunkComplete)?;
        } else {
            self.transport.send(&OutboundMessage::NextChunk)?;
        }

        self.observer.on_progress(fraction, &book_name);
        Ok(())
    }

    fn complete_chapter(&mut self, count: u32) -> Result<()> {
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| TransferError::Validation("no transfer in progress".into()))?;
        let staged = active
            .staged_meta
            .take()
            .ok_or_else(|| TransferError::Validation("no chapter data to complete".into()))?;

        active.pending_metas.push(staged);
        active.writer = None;
        // Idempotent: a retried sequence number does not grow the set.
        active.received.insert(count);

        let received = active.received.len() as u32;
        let total = active.total_chapters;
        let should_flush =
            active.pending_metas.len() >= META_BATCH_SIZE || received >= total;

        let durable = if should_flush {
            let book_id = active.book_id.clone();
            let metas = active.pending_metas.clone();
            self.store.append_metas(&book_id, &metas, received)?;
            // Cleared only after the store reported success; on failure the
            // queue stays intact for the next flush attempt.
            if let Some(active) = self.active.as_mut() {
                active.pending_metas.clear();
            }
            true
        } else {
            false
        };

        let progress = if total > 0 {
            received as f64 / total as f64 * 100.0
        } else {
            100.0
        };
        self.transport.send(&OutboundMessage::ChapterSaved {
            count: received,
            synced_count: received,
            total_count: total,
            progress,
            durable,
        })?;
        Ok(())
    }

    fn flush_pending_best_effort(&mut self) {
        if let Some(active) = self.active.as_mut() {
            if active.pending_metas.is_empty() {
                return;
            }
            let received = active.received.len() as u32;
            let book_id = active.book_id.clone();
            let metas = active.pending_metas.clone();
            match self.store.append_metas(&book_id, &metas, received) {
                Ok(()) => {
                    if let Some(active) = self.active.as_mut() {
                        active.pending_metas.clear();
                    }
                }
                Err(e) => warn!("best-effort meta flush failed for {}: {:#}", book_id, e),
            }
        }
    }

    fn complete_transfer(&mut self) -> Result<()> {
        if let Some(active) = self.active.as_ref() {
            let book_id = active.book_id.clone();
            if !active.pending_metas.is_empty() {
                let received = active.received.len() as u32;
                let metas = active.pending_metas.clone();
                self.store.append_metas(&book_id, &metas, received)?;
                if let Some(active) = self.active.as_mut() {
                    active.pending_metas.clear();
                }
            }
            // Readers should see the final index, not a mid-sync cache.
            self.store.invalidate(Some(&book_id));
        }

        self.reset();
        self.transport.send(&OutboundMessage::TransferFinished)?;
        self.observer.on_success();
        Ok(())
    }

    fn cancel(&mut self) -> Result<()> {
        self.flush_pending_best_effort();
        self.transport.send(&OutboundMessage::Cancel)?;
        self.reset();
        self.observer.on_cancel();
        Ok(())
    }

    // ========================================================================
    // Cover Track
    // ========================================================================

    fn start_cover_transfer(&mut self, filename: &str) -> Result<()> {
        if filename.trim().is_empty() {
            return Err(TransferError::Validation("filename is empty or invalid".into()).into());
        }

        let book_id = constants::book_dir_name(filename);
        std::fs::create_dir_all(constants::book_dir(self.store.base_dir(), &book_id))
            .context("failed to create book directory")?;

        // Drop the previous cover before allocating a new name, so a failed
        // transfer can never leave two covers behind.
        let mut info = catalog::read_book_info(self.store.base_dir(), &book_id);
        if let Some(old) = info.cover_file_name.take() {
            let old_path = constants::book_dir(self.store.base_dir(), &book_id).join(old);
            if let Err(e) = std::fs::remove_file(&old_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!("could not remove old cover {}: {}", old_path.display(), e);
                }
            }
        }

        let new_name = generate_cover_filename();
        info.cover_file_name = Some(new_name.clone());
        info.has_cover = true;
        catalog::write_book_info(self.store.base_dir(), &book_id, &info)?;

        let mut books = self.catalog.get_books()?;
        if let Some(entry) = books.iter_mut().find(|b| b.dir_name == book_id) {
            entry.cover_file_name = Some(new_name.clone());
            entry.has_cover = true;
            self.catalog.update_books(books)?;
        }

        self.cover = Some(CoverTransfer {
            writer: CoverWriter::new(
                constants::book_dir(self.store.base_dir(), &book_id).join(&new_name),
            ),
        });
        self.transport.send(&OutboundMessage::CoverReady)?;
        Ok(())
    }

    fn save_cover_chunk(&mut self, chunk_index: u32, data: &str) -> Result<()> {
        let cover = self
            .cover
            .as_mut()
            .ok_or_else(|| TransferError::Validation("cover transfer not initialized".into()))?;
        cover
            .writer
            .write_chunk(chunk_index, data)
            .map_err(TransferError::Storage)?;
        self.transport.send(&OutboundMessage::CoverChunkReceived)?;
        Ok(())
    }

    fn complete_cover_transfer(&mut self) -> Result<()> {
        let cover = self
            .cover
            .take()
            .ok_or_else(|| TransferError::Validation("no cover data to save".into()))?;
        let path = cover.writer.finish().map_err(TransferError::Storage)?;
        debug!("cover stored at {}", path.display());

        self.transport.send(&OutboundMessage::CoverSaved)?;
        if self.is_cover_only {
            self.reset();
            self.observer.on_success();
        }
        Ok(())
    }

    // ========================================================================
    // Queries and Maintenance
    // ========================================================================

    /// Replies with the reconciled synced-chapter list so the remote can
    /// choose between a fresh transfer and a resume. Never errors outward:
    /// an unreadable book reads as "nothing synced".
    fn send_book_status(&mut self, filename: &str) -> Result<()> {
        let book_id = constants::book_dir_name(filename);

        let mut synced: Vec<u32> = match self.store.probe_version(&book_id) {
            LayoutVersion::New => self
                .store
                .rebuild_received(&book_id)
                .unwrap_or_default()
                .into_iter()
                .collect(),
            LayoutVersion::Legacy | LayoutVersion::None => Vec::new(),
        };
        synced.sort_unstable();

        let info = catalog::read_book_info(self.store.base_dir(), &book_id);
        let has_cover = info
            .cover_file_name
            .map(|name| {
                constants::book_dir(self.store.base_dir(), &book_id)
                    .join(name)
                    .is_file()
            })
            .unwrap_or(false);

        self.transport.send(&OutboundMessage::BookStatus {
            synced_chapters: synced,
            has_cover,
        })?;
        Ok(())
    }

    fn update_book_info(
        &mut self,
        filename: &str,
        author: Option<String>,
        summary: Option<String>,
        book_status: Option<String>,
        category: Option<String>,
        local_category: Option<String>,
    ) -> Result<()> {
        if filename.trim().is_empty() {
            return Err(TransferError::Validation("filename is empty or invalid".into()).into());
        }
        let book_id = constants::book_dir_name(filename);
        if !constants::book_dir(self.store.base_dir(), &book_id).is_dir() {
            return Err(TransferError::Validation("book does not exist".into()).into());
        }

        let mut info = catalog::read_book_info(self.store.base_dir(), &book_id);
        if author.is_some() {
            info.author = author;
        }
        if summary.is_some() {
            info.summary = summary;
        }
        if book_status.is_some() {
            info.book_status = book_status;
        }
        if category.is_some() {
            info.category = category;
        }
        if local_category.is_some() {
            info.local_category = local_category;
        }
        if info.local_category.as_deref().unwrap_or("").is_empty() {
            info.local_category = info.category.clone();
        }
        catalog::write_book_info(self.store.base_dir(), &book_id, &info)?;

        let mut books = self.catalog.get_books()?;
        if let Some(entry) = books.iter_mut().find(|b| b.dir_name == book_id) {
            entry.local_category = info.local_category.clone();
            self.catalog.update_books(books)?;
        }

        self.transport.send(&OutboundMessage::BookInfoUpdated)?;
        self.observer.on_book_info_updated(filename);
        Ok(())
    }

    fn delete_chapters(&mut self, filename: &str, chapter_indices: &[u32]) -> Result<()> {
        if chapter_indices.is_empty() {
            return Err(TransferError::Validation("invalid chapter index list".into()).into());
        }
        let book_id = constants::book_dir_name(filename);
        let total = chapter_indices.len();
        let mut deleted = 0usize;
        let mut failed = 0usize;

        for (i, &index) in chapter_indices.iter().enumerate() {
            match self.store.delete_chapter(&book_id, index) {
                Ok(()) => deleted += 1,
                Err(e) => {
                    failed += 1;
                    warn!("failed to delete chapter {} of {}: {:#}", index, book_id, e);
                }
            }
            let percent = ((i + 1) * 100 / total) as u32;
            self.transport.send(&OutboundMessage::Progress {
                message: format!("deleting chapter {}/{}", i + 1, total),
                count: percent,
            })?;
        }

        if failed == 0 {
            self.transport.send(&OutboundMessage::Success {
                message: format!("deleted {} chapters", deleted),
                count: deleted as u32,
            })?;
        } else {
            self.transport.send(&OutboundMessage::Error {
                message: format!("deleted {} chapters, {} failed", deleted, failed),
                count: deleted as u32,
            })?;
        }
        Ok(())
    }
}

/// Parameters of a `startTransfer` request.
struct StartParams {
    filename: String,
    total: u32,
    word_count: u64,
    start_from: u32,
    has_cover: bool,
    author: Option<String>,
    summary: Option<String>,
    book_status: Option<String>,
    category: Option<String>,
    local_category: Option<String>,
}
