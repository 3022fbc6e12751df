//! Batch generation orchestrator.
//!
//! Drives an ordered list of [`TextItem`]s through one backend
//! configuration, enforcing idempotency against prior runs, aggregating
//! partial failures, and maintaining the ledger via [`LedgerManager`].
//!
//! Execution is single-threaded and strictly sequential: outcomes and
//! ledger rows appear in input order, and the only suspension points are
//! the fixed inter-request delay and the (untimed, potentially
//! long-blocking) provider call itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use derive_builder::Builder;

use crate::events::{EventSink, LogSink, ProgressEvent};
use crate::ledger::{LedgerManager, LedgerRecord};
use crate::provider::{AttemptReport, ProviderConfig, ProviderFactory, SpeechProvider};
use crate::{BackendConfig, CancelToken, OperationType, TextItem};

/// Sanitized text fragments longer than this are cut down to
/// `MAX_FRAGMENT_LEN - 3` characters plus an ellipsis marker.
const MAX_FRAGMENT_LEN: usize = 50;

#[derive(thiserror::Error, Debug)]
pub enum GenerateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Empty text item list")]
    EmptyInput,
    #[error("Reference audio is required for clone operations")]
    MissingReferenceAudio,
    #[error("Reference audio file not found: {0}")]
    ReferenceAudioNotFound(PathBuf),
}

/// Result of one (item, backend) attempt.
///
/// Exactly one outcome exists per non-blank item processed; blank items
/// produce none.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub success: bool,
    pub text_id: String,
    pub text: String,
    /// Empty when the attempt failed before a location was resolved.
    pub audio_path: PathBuf,
    pub ledger_path: PathBuf,
    pub duration: f64,
    pub file_size: u64,
    pub error: Option<String>,
    /// True when an existing output file was reused instead of calling the
    /// provider.
    pub skipped_duplicate: bool,
}

impl GenerationOutcome {
    fn failure(item: &TextItem, error: String) -> Self {
        Self {
            success: false,
            text_id: item.id.clone(),
            text: item.text.clone(),
            audio_path: PathBuf::new(),
            ledger_path: PathBuf::new(),
            duration: 0.0,
            file_size: 0,
            error: Some(error),
            skipped_duplicate: false,
        }
    }
}

/// Aggregate of one batch run.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    /// Count of input items, blanks included.
    pub total_texts: usize,
    pub successful: usize,
    pub failed: usize,
    /// Wall-clock seconds across the whole run.
    pub total_duration: f64,
    pub errors: Vec<String>,
    pub outcomes: Vec<GenerationOutcome>,
}

/// Tuning knobs for one batch run.
///
/// `batch_size` only buckets progress events; it never parallelizes or
/// reorders work.
#[derive(Debug, Clone, Builder)]
pub struct BatchOptions {
    #[builder(default = "10")]
    pub batch_size: usize,
    /// Fixed post-attempt sleep, a rate-limit backpressure mechanism.
    /// Applied after real provider attempts only, not after skips.
    #[builder(default = "Duration::from_secs(2)")]
    pub delay_between_requests: Duration,
    #[builder(default = "true")]
    pub continue_on_error: bool,
    /// Required for [`OperationType::Clone`] runs; must exist on disk.
    #[builder(default)]
    pub reference_audio: Option<PathBuf>,
    #[builder(default)]
    pub cancel: CancelToken,
}

/// Batch generation orchestrator with pluggable providers.
///
/// Assumes it is the only process writing its output tree; see the
/// `ledger` module docs for the single-writer constraint.
pub struct DatasetGenerator {
    ledger: LedgerManager,
    providers: HashMap<String, Box<dyn SpeechProvider>>,
    sink: Box<dyn EventSink>,
}

impl DatasetGenerator {
    /// Create a generator rooted at `output_dir`, creating the directory
    /// if needed. Progress goes to a [`LogSink`] until replaced via
    /// [`DatasetGenerator::with_sink`].
    pub fn new(output_dir: &Path) -> Result<Self, GenerateError> {
        std::fs::create_dir_all(output_dir)?;
        Ok(Self {
            ledger: LedgerManager::new(output_dir),
            providers: HashMap::new(),
            sink: Box::new(LogSink),
        })
    }

    /// Replace the progress event sink.
    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Register a provider under `name`. Later registrations replace
    /// earlier ones.
    pub fn register_provider(&mut self, name: &str, provider: Box<dyn SpeechProvider>) {
        self.providers.insert(name.to_string(), provider);
    }

    /// Build and register providers from a name → config map.
    ///
    /// Constructors that fail are logged and skipped; the remaining
    /// providers stay usable.
    pub fn register_from_config(
        &mut self,
        factory: &ProviderFactory,
        configs: HashMap<String, ProviderConfig>,
    ) {
        for (name, config) in configs {
            match factory.create(&name, config) {
                Ok(provider) => {
                    self.providers.insert(name, provider);
                }
                Err(e) => log::error!("Error creating provider {name}: {e}"),
            }
        }
        if self.providers.is_empty() {
            log::warn!("No providers were initialized");
        }
    }

    /// Names of registered providers.
    pub fn registered_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// The ledger manager owning this generator's output tree. Useful for
    /// post-run audits.
    pub fn ledger(&self) -> &LedgerManager {
        &self.ledger
    }

    /// Run one batch of `items` against `backend`.
    ///
    /// Precondition failures (empty input, missing reference audio for
    /// clone runs) return `Err` before any item is attempted. Once the
    /// loop starts, the run always terminates with a [`BatchSummary`],
    /// even when interrupted or stopped early by
    /// [`BatchOptions::continue_on_error`].
    pub fn generate(
        &mut self,
        items: &[TextItem],
        backend: &BackendConfig,
        operation: OperationType,
        options: &BatchOptions,
    ) -> Result<BatchSummary, GenerateError> {
        if items.is_empty() {
            return Err(GenerateError::EmptyInput);
        }
        let reference_audio = match operation {
            OperationType::Clone => {
                let reference = options
                    .reference_audio
                    .as_deref()
                    .ok_or(GenerateError::MissingReferenceAudio)?;
                if !reference.exists() {
                    return Err(GenerateError::ReferenceAudioNotFound(reference.to_path_buf()));
                }
                Some(reference)
            }
            OperationType::Synthesize => None,
        };

        self.sink.publish(&ProgressEvent::RunStarted {
            total: items.len(),
            provider: backend.provider.clone(),
            operation: operation.to_string(),
        });

        let start = Instant::now();
        let mut outcomes: Vec<GenerationOutcome> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        let mut interrupted = false;

        for (index, item) in items.iter().enumerate() {
            if options.cancel.is_cancelled() {
                interrupted = true;
                break;
            }
            if options.batch_size > 0 && index % options.batch_size == 0 {
                self.sink.publish(&ProgressEvent::BatchStarted {
                    index: index / options.batch_size,
                    size: options.batch_size,
                });
            }

            if item.text.trim().is_empty() {
                self.sink.publish(&ProgressEvent::ItemSkippedBlank {
                    text_id: item.id.clone(),
                });
                continue;
            }

            let outcome = self.run_item(item, backend, operation, reference_audio);

            if outcome.skipped_duplicate {
                self.sink.publish(&ProgressEvent::DuplicateSkipped {
                    text_id: item.id.clone(),
                    audio_path: outcome.audio_path.clone(),
                });
            } else if outcome.success {
                self.sink.publish(&ProgressEvent::ItemCompleted {
                    text_id: item.id.clone(),
                    duration: outcome.duration,
                });
            } else {
                let error = outcome.error.clone().unwrap_or_else(|| "unknown error".into());
                self.sink.publish(&ProgressEvent::ItemFailed {
                    text_id: item.id.clone(),
                    error: error.clone(),
                });
                errors.push(format!(
                    "Text '{}...' (ID: {}): {error}",
                    text_preview(&item.text),
                    item.id
                ));
            }

            let attempted = !outcome.skipped_duplicate;
            let failed = !outcome.success;
            outcomes.push(outcome);

            if failed && !options.continue_on_error {
                break;
            }
            if attempted && !options.delay_between_requests.is_zero() {
                std::thread::sleep(options.delay_between_requests);
            }
        }

        if interrupted {
            self.sink.publish(&ProgressEvent::RunInterrupted);
        }

        let elapsed = start.elapsed();
        let successful = outcomes.iter().filter(|o| o.success).count();
        let summary = BatchSummary {
            total_texts: items.len(),
            successful,
            failed: errors.len(),
            total_duration: elapsed.as_secs_f64(),
            errors,
            outcomes,
        };
        self.sink.publish(&ProgressEvent::RunFinished {
            successful: summary.successful,
            failed: summary.failed,
            elapsed,
        });

        Ok(summary)
    }

    /// Process a single non-blank item. Every internal failure is folded
    /// into the returned outcome; nothing escapes as `Err`.
    fn run_item(
        &mut self,
        item: &TextItem,
        backend: &BackendConfig,
        operation: OperationType,
        reference_audio: Option<&Path>,
    ) -> GenerationOutcome {
        if !self.providers.contains_key(&backend.provider) {
            return GenerationOutcome::failure(
                item,
                format!("Provider '{}' is not available", backend.provider),
            );
        }

        let fragment = sanitize_filename(&text_preview(&item.text));
        let filename = format!("{}_{}.wav", item.id, fragment);

        let location = match self.ledger.ensure_location(
            &backend.provider,
            &backend.model_or_reference,
            &backend.voice,
            operation,
        ) {
            Ok(location) => location,
            Err(e) => return GenerationOutcome::failure(item, e.to_string()),
        };
        let audio_path = location.wav_dir.join(&filename);

        // Idempotent skip: the deterministic path already exists, so the
        // provider is not invoked and no ledger row is appended.
        if self.ledger.exists_for(&audio_path) {
            let file_size = std::fs::metadata(&audio_path).map(|m| m.len()).unwrap_or(0);
            return GenerationOutcome {
                success: true,
                text_id: item.id.clone(),
                text: item.text.clone(),
                duration: wav_duration(&audio_path).unwrap_or(0.0),
                file_size,
                audio_path,
                ledger_path: location.ledger_path,
                error: None,
                skipped_duplicate: true,
            };
        }

        let provider = match self.providers.get_mut(&backend.provider) {
            Some(provider) => provider,
            // Checked above; kept total rather than unwrapping.
            None => {
                return GenerationOutcome::failure(
                    item,
                    format!("Provider '{}' is not available", backend.provider),
                )
            }
        };

        let report = match (operation, reference_audio) {
            (OperationType::Synthesize, _) => {
                provider.synthesize_with_metadata(&item.text, &backend.voice, &audio_path)
            }
            (OperationType::Clone, Some(reference)) => {
                provider.clone_with_metadata(&item.text, reference, &audio_path)
            }
            // Validated before the loop; unreachable in practice.
            (OperationType::Clone, None) => {
                return GenerationOutcome::failure(
                    item,
                    GenerateError::MissingReferenceAudio.to_string(),
                )
            }
        };

        if !report.success {
            let error = report
                .error
                .unwrap_or_else(|| "Unknown error during generation".to_string());
            return GenerationOutcome {
                success: false,
                text_id: item.id.clone(),
                text: item.text.clone(),
                audio_path,
                ledger_path: location.ledger_path,
                duration: 0.0,
                file_size: 0,
                error: Some(error),
                skipped_duplicate: false,
            };
        }

        let sample_rate = provider.sample_rate();
        let lang = provider.language().to_string();
        let relative = audio_path
            .strip_prefix(self.ledger.base_dir())
            .unwrap_or(&audio_path)
            .to_path_buf();

        let record = match (operation, reference_audio) {
            (OperationType::Clone, Some(reference)) => LedgerRecord::Clone {
                text_id: item.id.clone(),
                text: item.text.clone(),
                audio_path: relative,
                provider: backend.provider.clone(),
                reference_audio: reference
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| backend.model_or_reference.clone()),
                sample_rate,
                lang,
                duration: Some(report.estimated_duration),
                audio_url: artifact_url(&report),
                clone_id: artifact_id(&report),
            },
            _ => LedgerRecord::Synthesis {
                text_id: item.id.clone(),
                text: item.text.clone(),
                audio_path: relative,
                provider: backend.provider.clone(),
                model: backend.model_or_reference.clone(),
                voice: backend.voice.clone(),
                sample_rate,
                lang,
                duration: Some(report.estimated_duration),
            },
        };
        // Best-effort: a failed append leaves the audio on disk without a
        // ledger row and never fails the item.
        self.ledger.append_record(&location.ledger_path, &record);

        GenerationOutcome {
            success: true,
            text_id: item.id.clone(),
            text: item.text.clone(),
            duration: report.estimated_duration,
            file_size: report.file_info.as_ref().map(|f| f.file_size).unwrap_or(0),
            audio_path,
            ledger_path: location.ledger_path,
            error: None,
            skipped_duplicate: false,
        }
    }
}

fn artifact_url(report: &AttemptReport) -> Option<String> {
    report.artifacts.as_ref().and_then(|a| a.audio_url.clone())
}

fn artifact_id(report: &AttemptReport) -> Option<String> {
    report.artifacts.as_ref().and_then(|a| a.clone_id.clone())
}

/// First `MAX_FRAGMENT_LEN` characters of `text`, char-boundary safe.
fn text_preview(text: &str) -> String {
    text.chars().take(MAX_FRAGMENT_LEN).collect()
}

/// Turn free text into a filename-safe fragment.
///
/// Filesystem-hostile characters are stripped first, then whitespace runs
/// collapse to `_`, then the result is truncated with an ellipsis marker.
pub fn sanitize_filename(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .collect();

    let mut sanitized = String::with_capacity(stripped.len());
    let mut in_whitespace = false;
    for c in stripped.trim().chars() {
        if c.is_whitespace() {
            in_whitespace = true;
            continue;
        }
        if in_whitespace && !sanitized.is_empty() {
            sanitized.push('_');
        }
        in_whitespace = false;
        sanitized.push(c);
    }

    if sanitized.chars().count() > MAX_FRAGMENT_LEN {
        let truncated: String = sanitized.chars().take(MAX_FRAGMENT_LEN - 3).collect();
        format!("{truncated}...")
    } else {
        sanitized
    }
}

/// Duration of a WAV file from its header, `None` if unreadable.
fn wav_duration(path: &Path) -> Option<f64> {
    let reader = hound::WavReader::open(path).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    Some(reader.duration() as f64 / spec.sample_rate as f64)
}
