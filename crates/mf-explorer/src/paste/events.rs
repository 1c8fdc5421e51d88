//! Progress reporting for a running paste.

use serde::Serialize;

use crate::remote::RemoteError;

/// Progress event payload, sent before each operation starts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasteProgressEvent {
    pub operation_id: String,
    /// Task title, like "Copying 3 file(s)"
    pub title: String,
    /// "<source> to <destination>"
    pub current_file: String,
    pub files_done: usize,
    pub files_total: usize,
}

/// Completion event payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasteCompleteEvent {
    pub operation_id: String,
    pub files_processed: usize,
    pub files_failed: usize,
    pub files_skipped: usize,
}

/// Error event payload, one per failed operation or for a failed task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasteErrorEvent {
    pub operation_id: String,
    /// Path of the source whose operation failed, `None` when the whole task failed
    pub source: Option<String>,
    pub message: String,
    pub error: Option<RemoteError>,
}

/// Receives paste events, typically to forward them to the UI.
pub trait PasteNotifier: Send + Sync {
    fn on_progress(&self, event: &PasteProgressEvent);

    fn on_complete(&self, event: &PasteCompleteEvent);

    fn on_error(&self, event: &PasteErrorEvent);
}

/// Notifier that only logs.
pub struct LogNotifier;

impl PasteNotifier for LogNotifier {
    fn on_progress(&self, event: &PasteProgressEvent) {
        log::debug!(
            "{} [{}/{}] {}",
            event.title,
            event.files_done,
            event.files_total,
            event.current_file
        );
    }

    fn on_complete(&self, event: &PasteCompleteEvent) {
        log::info!(
            "Paste {} done: {} processed, {} failed, {} skipped",
            event.operation_id,
            event.files_processed,
            event.files_failed,
            event.files_skipped
        );
    }

    fn on_error(&self, event: &PasteErrorEvent) {
        log::warn!("Paste {} error: {}", event.operation_id, event.message);
    }
}
