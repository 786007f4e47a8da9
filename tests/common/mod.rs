use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use booksync::{
    ChapterChunk, FileCatalog, InboundMessage, IndexShardStore, OutboundMessage, Transport,
    TransferSession,
};

/// Transport double that records every outbound message.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl RecordingTransport {
    /// Drain and return everything sent so far.
    pub fn take(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut self.sent.lock().unwrap())
    }

    pub fn last(&self) -> Option<OutboundMessage> {
        self.sent.lock().unwrap().last().cloned()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, msg: &OutboundMessage) -> Result<()> {
        self.sent.lock().unwrap().push(msg.clone());
        Ok(())
    }
}

/// A session wired to a temp books directory and a recording transport.
/// The store runs with a zero cache TTL so assertions always see the disk.
pub struct TestHost {
    pub dir: TempDir,
    pub store: Arc<IndexShardStore>,
    pub transport: RecordingTransport,
    pub session: TransferSession,
}

pub fn setup_session() -> Result<TestHost> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(IndexShardStore::with_cache_ttl(dir.path(), Duration::ZERO));
    let catalog = Arc::new(FileCatalog::new(dir.path()));
    let transport = RecordingTransport::default();
    let session = TransferSession::new(
        store.clone(),
        catalog,
        Box::new(transport.clone()),
    );
    Ok(TestHost {
        dir,
        store,
        transport,
        session,
    })
}

#[allow(dead_code)]
pub fn start_transfer_msg(filename: &str, total: u32, start_from: u32) -> InboundMessage {
    InboundMessage::StartTransfer {
        filename: filename.to_string(),
        total,
        word_count: 1000,
        start_from,
        has_cover: false,
        author: None,
        summary: None,
        book_status: None,
        category: None,
        local_category: None,
    }
}

#[allow(dead_code)]
pub fn chapter_chunk_msg(
    count: u32,
    index: u32,
    chunk_num: u32,
    total_chunks: u32,
    content: &str,
    name: &str,
) -> InboundMessage {
    let chunk = ChapterChunk {
        index,
        chunk_num,
        total_chunks,
        content: content.to_string(),
        name: name.to_string(),
        word_count: 100,
    };
    InboundMessage::ChapterData {
        count,
        data: serde_json::to_string(&chunk).unwrap(),
    }
}

/// Drive one single-chunk chapter through the session, including the
/// completion handshake.
#[allow(dead_code)]
pub fn send_whole_chapter(
    session: &mut TransferSession,
    count: u32,
    index: u32,
    name: &str,
    content: &str,
) {
    session.handle_message(chapter_chunk_msg(count, index, 0, 1, content, name));
    session.handle_message(InboundMessage::ChapterComplete { count });
}
