//! Structured progress reporting for batch runs.
//!
//! The orchestrator never configures process-wide logging. Instead it
//! publishes [`ProgressEvent`]s to a caller-supplied [`EventSink`]; the
//! default [`LogSink`] forwards them to the `log` facade.

use std::path::PathBuf;
use std::time::Duration;

/// One observable step of a batch run.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    RunStarted {
        total: usize,
        provider: String,
        operation: String,
    },
    /// Emitted at each progress-bucket boundary. `batch_size` buckets items
    /// for reporting only; it has no effect on run semantics.
    BatchStarted {
        index: usize,
        size: usize,
    },
    ItemSkippedBlank {
        text_id: String,
    },
    DuplicateSkipped {
        text_id: String,
        audio_path: PathBuf,
    },
    ItemCompleted {
        text_id: String,
        duration: f64,
    },
    ItemFailed {
        text_id: String,
        error: String,
    },
    RunInterrupted,
    RunFinished {
        successful: usize,
        failed: usize,
        elapsed: Duration,
    },
}

/// Receiver for [`ProgressEvent`]s.
///
/// Implementations must be cheap and non-blocking; the orchestrator calls
/// `publish` synchronously from its single-threaded loop.
pub trait EventSink {
    fn publish(&self, event: &ProgressEvent);
}

/// Default sink: maps events onto `log` levels.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::RunStarted {
                total,
                provider,
                operation,
            } => log::info!("Starting {operation} run: {total} items via provider '{provider}'"),
            ProgressEvent::BatchStarted { index, size } => {
                log::debug!("Batch {index} ({size} items)")
            }
            ProgressEvent::ItemSkippedBlank { text_id } => {
                log::debug!("Skipping blank text (ID: {text_id})")
            }
            ProgressEvent::DuplicateSkipped { text_id, audio_path } => log::info!(
                "Audio already exists for ID {text_id}, skipping: {}",
                audio_path.display()
            ),
            ProgressEvent::ItemCompleted { text_id, duration } => {
                log::info!("Generated ID {text_id} ({duration:.2}s)")
            }
            ProgressEvent::ItemFailed { text_id, error } => {
                log::warn!("Generation failed for ID {text_id}: {error}")
            }
            ProgressEvent::RunInterrupted => log::info!("Run interrupted, stopping early"),
            ProgressEvent::RunFinished {
                successful,
                failed,
                elapsed,
            } => log::info!(
                "Run finished: {successful} successful, {failed} failed in {:.2}s",
                elapsed.as_secs_f64()
            ),
        }
    }
}

/// Sink that drops everything. Useful in tests.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: &ProgressEvent) {}
}
