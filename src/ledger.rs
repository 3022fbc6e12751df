//! Output directory layout and the append-only metadata ledger.
//!
//! Every (provider, model-or-reference, voice) triple owns one subtree:
//!
//! ```text
//! base_dir/<provider>/<model-or-reference>/<voice>/wav/*.wav
//! base_dir/<provider>/<model-or-reference>/<voice>/metadata.tsv
//! ```
//!
//! The ledger is UTF-8, tab-separated, one header row, and only ever
//! appended to. `utt_id` is derived from the current row count, which is
//! only safe with a single writer per triple; concurrent orchestrators
//! writing the same ledger can assign duplicate IDs.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::OperationType;

/// Characters per second used by the duration heuristic.
const CHARS_PER_SECOND: f64 = 12.0;
/// Lower clamp for estimated durations, seconds.
const MIN_DURATION: f64 = 0.5;
/// Upper clamp for estimated durations, seconds.
const MAX_DURATION: f64 = 10.0;

const LEDGER_FILE_NAME: &str = "metadata.tsv";

const SYNTHESIS_HEADER: &[&str] = &[
    "utt_id",
    "text_id",
    "text",
    "audio_path",
    "provider",
    "model",
    "voice",
    "tts_type",
    "sample_rate",
    "lang",
    "duration",
    "gen_date",
];

const CLONE_HEADER: &[&str] = &[
    "utt_id",
    "text_id",
    "text",
    "audio_path",
    "provider",
    "reference_audio",
    "tts_type",
    "sample_rate",
    "lang",
    "duration",
    "gen_date",
    "audio_url",
    "clone_id",
];

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolved output location for one backend triple.
#[derive(Debug, Clone)]
pub struct LedgerLocation {
    pub wav_dir: PathBuf,
    pub ledger_path: PathBuf,
}

/// One row to be appended to a ledger file.
///
/// `duration: None` asks the manager to fall back to the text-length
/// heuristic. `utt_id` is assigned at append time.
#[derive(Debug, Clone)]
pub enum LedgerRecord {
    Synthesis {
        text_id: String,
        text: String,
        /// Relative to the manager's base directory.
        audio_path: PathBuf,
        provider: String,
        model: String,
        voice: String,
        sample_rate: u32,
        lang: String,
        duration: Option<f64>,
    },
    Clone {
        text_id: String,
        text: String,
        audio_path: PathBuf,
        provider: String,
        reference_audio: String,
        sample_rate: u32,
        lang: String,
        duration: Option<f64>,
        audio_url: Option<String>,
        clone_id: Option<String>,
    },
}

/// Read-only diagnostic produced by [`LedgerManager::audit`].
#[derive(Debug, Clone, Default)]
pub struct LedgerAudit {
    pub missing_dirs: Vec<PathBuf>,
    pub missing_ledger: bool,
    /// Audio files on disk whose names appear in no ledger `audio_path`.
    pub orphaned_audio_files: Vec<String>,
    pub total_entries: usize,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        self.missing_dirs.is_empty() && !self.missing_ledger && self.orphaned_audio_files.is_empty()
    }
}

/// Estimate audio duration from text length, clamped to a sane range.
pub fn estimate_duration(text: &str) -> f64 {
    let estimated = text.chars().count() as f64 / CHARS_PER_SECOND;
    estimated.clamp(MIN_DURATION, MAX_DURATION)
}

/// Owns the on-disk layout and the serialization contract for ledger rows.
///
/// Single writer per (provider, model-or-reference, voice) triple assumed;
/// see the module docs.
pub struct LedgerManager {
    base_dir: PathBuf,
}

impl LedgerManager {
    /// Create a manager rooted at `base_dir`. Touches nothing on disk.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn voice_dir(&self, provider: &str, model_or_reference: &str, voice: &str) -> PathBuf {
        self.base_dir.join(provider).join(model_or_reference).join(voice)
    }

    /// Create the directory tree and initialize the ledger header for one
    /// backend triple. Idempotent; a repeated call is a no-op.
    ///
    /// Filesystem errors (e.g. permission denied) propagate to the caller.
    pub fn ensure_location(
        &self,
        provider: &str,
        model_or_reference: &str,
        voice: &str,
        operation: OperationType,
    ) -> Result<LedgerLocation, LedgerError> {
        let voice_dir = self.voice_dir(provider, model_or_reference, voice);
        let wav_dir = voice_dir.join("wav");
        std::fs::create_dir_all(&wav_dir)?;

        let ledger_path = voice_dir.join(LEDGER_FILE_NAME);
        if !ledger_path.exists() {
            let header = match operation {
                OperationType::Synthesize => SYNTHESIS_HEADER,
                OperationType::Clone => CLONE_HEADER,
            };
            let mut file = std::fs::File::create(&ledger_path)?;
            writeln!(file, "{}", header.join("\t"))?;
            log::info!("Created ledger: {}", ledger_path.display());
        }

        Ok(LedgerLocation { wav_dir, ledger_path })
    }

    /// Append one row, assigning the next `utt_id` from the current row
    /// count. Returns `false` (after logging) on any I/O failure.
    ///
    /// A failed append is tolerated inconsistency: the audio file already
    /// exists on disk without a ledger row.
    pub fn append_record(&self, ledger_path: &Path, record: &LedgerRecord) -> bool {
        match self.try_append(ledger_path, record) {
            Ok(()) => true,
            Err(e) => {
                log::error!(
                    "Failed to append ledger row to {}: {e}",
                    ledger_path.display()
                );
                false
            }
        }
    }

    fn try_append(&self, ledger_path: &Path, record: &LedgerRecord) -> Result<(), LedgerError> {
        let utt_id = self.next_utt_id(ledger_path);
        let gen_date = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        let row: Vec<String> = match record {
            LedgerRecord::Synthesis {
                text_id,
                text,
                audio_path,
                provider,
                model,
                voice,
                sample_rate,
                lang,
                duration,
            } => vec![
                utt_id,
                text_id.clone(),
                flatten_field(text),
                audio_path.display().to_string(),
                provider.clone(),
                model.clone(),
                voice.clone(),
                OperationType::Synthesize.as_str().to_string(),
                sample_rate.to_string(),
                lang.clone(),
                format!("{:.2}", duration.unwrap_or_else(|| estimate_duration(text))),
                gen_date,
            ],
            LedgerRecord::Clone {
                text_id,
                text,
                audio_path,
                provider,
                reference_audio,
                sample_rate,
                lang,
                duration,
                audio_url,
                clone_id,
            } => vec![
                utt_id,
                text_id.clone(),
                flatten_field(text),
                audio_path.display().to_string(),
                provider.clone(),
                reference_audio.clone(),
                OperationType::Clone.as_str().to_string(),
                sample_rate.to_string(),
                lang.clone(),
                format!("{:.2}", duration.unwrap_or_else(|| estimate_duration(text))),
                gen_date,
                audio_url.clone().unwrap_or_default(),
                clone_id.clone().unwrap_or_default(),
            ],
        };

        let mut file = OpenOptions::new().append(true).open(ledger_path)?;
        writeln!(file, "{}", row.join("\t"))?;
        log::debug!("Appended ledger row for {}", ledger_path.display());
        Ok(())
    }

    /// The `utt_id` the next appended row will receive: non-header line
    /// count + 1, zero-padded to three digits. `"001"` for a missing or
    /// unreadable ledger.
    pub fn next_utt_id(&self, ledger_path: &Path) -> String {
        format!("{:03}", self.count_entries(ledger_path) + 1)
    }

    fn count_entries(&self, ledger_path: &Path) -> usize {
        match std::fs::File::open(ledger_path) {
            Ok(file) => BufReader::new(file).lines().count().saturating_sub(1),
            Err(_) => 0,
        }
    }

    /// Pure filesystem existence check used for idempotency.
    pub fn exists_for(&self, audio_path: &Path) -> bool {
        audio_path.exists()
    }

    /// Read-only integrity check of one backend triple's subtree.
    pub fn audit(
        &self,
        provider: &str,
        model_or_reference: &str,
        voice: &str,
        _operation: OperationType,
    ) -> LedgerAudit {
        let voice_dir = self.voice_dir(provider, model_or_reference, voice);
        let wav_dir = voice_dir.join("wav");
        let ledger_path = voice_dir.join(LEDGER_FILE_NAME);

        let mut audit = LedgerAudit::default();
        for dir in [
            self.base_dir.join(provider),
            self.base_dir.join(provider).join(model_or_reference),
            voice_dir,
            wav_dir.clone(),
        ] {
            if !dir.is_dir() {
                audit.missing_dirs.push(dir);
            }
        }

        if !ledger_path.is_file() {
            audit.missing_ledger = true;
            return audit;
        }

        audit.total_entries = self.count_entries(&ledger_path);

        // Names recorded in the ledger's audio_path column.
        let mut recorded = std::collections::HashSet::new();
        if let Ok(file) = std::fs::File::open(&ledger_path) {
            for line in BufReader::new(file).lines().skip(1).map_while(Result::ok) {
                if let Some(path_field) = line.split('\t').nth(3) {
                    if let Some(name) = Path::new(path_field).file_name() {
                        recorded.insert(name.to_string_lossy().into_owned());
                    }
                }
            }
        }

        if let Ok(entries) = std::fs::read_dir(&wav_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                let is_wav = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
                if !is_wav {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if !recorded.contains(&name) {
                    audit.orphaned_audio_files.push(name);
                }
            }
        }
        audit.orphaned_audio_files.sort();

        audit
    }
}

/// Keep a ledger row on one physical line: tabs and newlines inside the
/// text field become single spaces.
fn flatten_field(text: &str) -> String {
    text.replace(['\t', '\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, LedgerManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = LedgerManager::new(dir.path());
        (dir, manager)
    }

    fn synthesis_record(text_id: &str, text: &str) -> LedgerRecord {
        LedgerRecord::Synthesis {
            text_id: text_id.to_string(),
            text: text.to_string(),
            audio_path: PathBuf::from(format!("tone/default/mid/wav/{text_id}_x.wav")),
            provider: "tone".to_string(),
            model: "default".to_string(),
            voice: "mid".to_string(),
            sample_rate: 22050,
            lang: "vi".to_string(),
            duration: Some(1.5),
        }
    }

    #[test]
    fn ensure_location_creates_tree_and_header() {
        let (_dir, manager) = manager();
        let loc = manager
            .ensure_location("tone", "default", "mid", OperationType::Synthesize)
            .unwrap();

        assert!(loc.wav_dir.is_dir());
        let header = std::fs::read_to_string(&loc.ledger_path).unwrap();
        assert!(header.starts_with("utt_id\ttext_id\ttext\taudio_path\tprovider\tmodel\tvoice"));
        assert_eq!(header.lines().count(), 1);
    }

    #[test]
    fn ensure_location_is_idempotent() {
        let (_dir, manager) = manager();
        let loc = manager
            .ensure_location("tone", "default", "mid", OperationType::Synthesize)
            .unwrap();
        manager.append_record(&loc.ledger_path, &synthesis_record("1", "hello"));

        // Second call must not rewrite the ledger.
        let loc2 = manager
            .ensure_location("tone", "default", "mid", OperationType::Synthesize)
            .unwrap();
        assert_eq!(loc.ledger_path, loc2.ledger_path);
        let content = std::fs::read_to_string(&loc2.ledger_path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn clone_ledger_uses_clone_header() {
        let (_dir, manager) = manager();
        let loc = manager
            .ensure_location("minimax", "ref.wav", "cloned", OperationType::Clone)
            .unwrap();
        let header = std::fs::read_to_string(&loc.ledger_path).unwrap();
        assert!(header.contains("reference_audio"));
        assert!(header.trim_end().ends_with("audio_url\tclone_id"));
    }

    #[test]
    fn utt_ids_are_monotonic_and_zero_padded() {
        let (_dir, manager) = manager();
        let loc = manager
            .ensure_location("tone", "default", "mid", OperationType::Synthesize)
            .unwrap();

        assert_eq!(manager.next_utt_id(&loc.ledger_path), "001");
        for i in 0..3 {
            assert!(manager
                .append_record(&loc.ledger_path, &synthesis_record(&i.to_string(), "hi")));
        }
        assert_eq!(manager.next_utt_id(&loc.ledger_path), "004");

        let content = std::fs::read_to_string(&loc.ledger_path).unwrap();
        let ids: Vec<&str> = content
            .lines()
            .skip(1)
            .map(|l| l.split('\t').next().unwrap())
            .collect();
        assert_eq!(ids, vec!["001", "002", "003"]);
    }

    #[test]
    fn append_estimates_duration_when_missing() {
        let (_dir, manager) = manager();
        let loc = manager
            .ensure_location("tone", "default", "mid", OperationType::Synthesize)
            .unwrap();

        let text = "a somewhat longer utterance";
        let mut record = synthesis_record("1", text);
        if let LedgerRecord::Synthesis { duration, .. } = &mut record {
            *duration = None;
        }
        assert!(manager.append_record(&loc.ledger_path, &record));

        let content = std::fs::read_to_string(&loc.ledger_path).unwrap();
        let row = content.lines().nth(1).unwrap();
        let duration: f64 = row.split('\t').nth(10).unwrap().parse().unwrap();
        let expected = text.chars().count() as f64 / 12.0;
        assert!((duration - expected).abs() < 0.01);
    }

    #[test]
    fn append_flattens_embedded_tabs_and_newlines() {
        let (_dir, manager) = manager();
        let loc = manager
            .ensure_location("tone", "default", "mid", OperationType::Synthesize)
            .unwrap();

        let mut record = synthesis_record("1", "x");
        if let LedgerRecord::Synthesis { text, .. } = &mut record {
            *text = "line one\nline\ttwo".to_string();
        }
        assert!(manager.append_record(&loc.ledger_path, &record));

        let content = std::fs::read_to_string(&loc.ledger_path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.lines().nth(1).unwrap().contains("line one line two"));
    }

    #[test]
    fn append_to_missing_ledger_returns_false() {
        let (dir, manager) = manager();
        let bogus = dir.path().join("nowhere").join("metadata.tsv");
        assert!(!manager.append_record(&bogus, &synthesis_record("1", "hi")));
    }

    #[test]
    fn estimate_duration_clamps_both_ends() {
        assert_eq!(estimate_duration("hi"), MIN_DURATION);
        assert_eq!(estimate_duration(&"x".repeat(500)), MAX_DURATION);
        let mid = estimate_duration(&"x".repeat(60));
        assert!((mid - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn audit_reports_missing_tree() {
        let (_dir, manager) = manager();
        let audit = manager.audit("tone", "default", "mid", OperationType::Synthesize);
        assert!(!audit.missing_dirs.is_empty());
        assert!(audit.missing_ledger);
        assert!(!audit.is_consistent());
    }

    #[test]
    fn audit_detects_orphaned_audio() {
        let (_dir, manager) = manager();
        let loc = manager
            .ensure_location("tone", "default", "mid", OperationType::Synthesize)
            .unwrap();

        let mut record = synthesis_record("1", "hello");
        if let LedgerRecord::Synthesis { audio_path, .. } = &mut record {
            *audio_path = PathBuf::from("tone/default/mid/wav/1_hello.wav");
        }
        manager.append_record(&loc.ledger_path, &record);
        std::fs::write(loc.wav_dir.join("1_hello.wav"), b"wav").unwrap();
        std::fs::write(loc.wav_dir.join("stray.wav"), b"wav").unwrap();

        let audit = manager.audit("tone", "default", "mid", OperationType::Synthesize);
        assert_eq!(audit.total_entries, 1);
        assert_eq!(audit.orphaned_audio_files, vec!["stray.wav".to_string()]);
        assert!(!audit.is_consistent());
    }
}
