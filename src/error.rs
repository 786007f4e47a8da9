// src/error.rs
use std::io;
use thiserror::Error;

/// Session-level error classes the protocol distinguishes.
///
/// Everything else flows through `anyhow` at the orchestration seams; these
/// four are the ones that change what gets sent back to the remote and how
/// much session state survives.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Bad input; rejected before any state change.
    #[error("{0}")]
    Validation(String),

    /// A chunk arrived for the wrong chapter index. Aborts the current
    /// chapter only; the session keeps waiting for the next first chunk.
    #[error("chapter chunk index mismatch: expected {expected:?}, got {got}")]
    Sequencing { expected: Option<u32>, got: u32 },

    /// I/O failure. Session state remains whatever was last durably flushed;
    /// the remote can resume via reconciliation.
    #[error("storage error: {0}")]
    Storage(#[from] io::Error),

    /// Unrecognized or legacy on-disk layout. Surfaced, never guessed around.
    #[error("{0}")]
    Format(String),
}

impl TransferError {
    /// Short text suitable for forwarding to the remote UI.
    pub fn user_message(&self) -> String {
        match self {
            TransferError::Storage(e) if is_disk_full(e) => {
                "insufficient storage space".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Whether an I/O error means the device ran out of space.
pub fn is_disk_full(e: &io::Error) -> bool {
    // ENOSPC; the embedded targets this syncs to report 28 as well.
    matches!(e.raw_os_error(), Some(28)) || e.kind() == io::ErrorKind::StorageFull
}
