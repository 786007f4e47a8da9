// src/content.rs
//
// Streamed writers for chapter bodies and cover images. Chunks go to disk as
// they arrive; nothing accumulates an entire chapter or cover in memory, so
// peak usage stays flat no matter how large the payload is.

use crate::codec::decode_base64;
use crate::constants;
use log::debug;
use rand::Rng;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Incremental writer for one chapter's content file.
///
/// Created on the first chunk (which truncates any stale file from an
/// interrupted transfer), appended to for the rest, and consumed by
/// [`ChapterWriter::finalize`] on the last chunk.
pub struct ChapterWriter {
    index: u32,
    file: File,
    bytes_written: u64,
}

impl ChapterWriter {
    /// Open (truncating) the content file for `index` and write the first
    /// chunk. Raw `io::Result` so callers can classify the failure.
    pub fn begin(base: &Path, book_id: &str, index: u32, content: &str) -> io::Result<Self> {
        let path = constants::chapter_path(base, book_id, index);
        let mut file = File::create(&path)?;
        file.write_all(content.as_bytes())?;
        Ok(Self {
            index,
            file,
            bytes_written: content.len() as u64,
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Append a follow-up chunk.
    pub fn append(&mut self, content: &str) -> io::Result<()> {
        self.file.write_all(content.as_bytes())?;
        self.bytes_written += content.len() as u64;
        Ok(())
    }

    /// Flush and close the content file after the last chunk.
    pub fn finalize(mut self) -> io::Result<u64> {
        self.file.flush()?;
        debug!(
            "chapter {} finalized ({} bytes)",
            self.index, self.bytes_written
        );
        Ok(self.bytes_written)
    }
}

/// Incremental writer for a cover image arriving as base64 chunks.
pub struct CoverWriter {
    path: PathBuf,
    file: Option<File>,
}

impl CoverWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path, file: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode and write one chunk. Chunk 0 truncates the target; later
    /// chunks append. Returns the number of decoded bytes written.
    pub fn write_chunk(&mut self, chunk_index: u32, data: &str) -> io::Result<usize> {
        let bytes = decode_base64(data);

        if chunk_index == 0 {
            self.file = Some(File::create(&self.path)?);
        } else if self.file.is_none() {
            // Session resumed mid-cover (e.g. writer recreated after an
            // error ack); pick up in append mode.
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            self.file = Some(file);
        }

        if let Some(file) = self.file.as_mut() {
            if !bytes.is_empty() {
                file.write_all(&bytes)?;
            }
        }
        Ok(bytes.len())
    }

    /// Close the file, returning the final path.
    pub fn finish(mut self) -> io::Result<PathBuf> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(self.path)
    }
}

/// Fresh random cover filename (`cover_XXXXXXXX.jpg`, lowercase alphanumeric).
/// Randomized so a replaced cover never aliases a cached older image.
pub fn generate_cover_filename() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("cover_{}.jpg", suffix)
}
