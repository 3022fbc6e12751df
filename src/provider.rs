//! The synthesis-capability contract consumed by the batch orchestrator.
//!
//! A [`SpeechProvider`] performs text-to-speech or voice cloning for one
//! text item. The orchestrator only ever talks to providers through the
//! `*_with_metadata` wrappers, which validate input and normalize every
//! outcome into an [`AttemptReport`]. Providers are resolved by string key
//! from a [`ProviderFactory`].

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::ledger;

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Provider '{0}' is not supported. Available providers: {1:?}")]
    UnknownProvider(String, Vec<String>),
    #[error("Clone operation is not supported by provider '{0}'")]
    CloneUnsupported(String),
    #[error("Voice '{voice}' is not supported. Available voices: {available:?}")]
    UnsupportedVoice { voice: String, available: Vec<String> },
    #[error("Invalid text input")]
    InvalidText,
    #[error("Audio encoding error: {0}")]
    Encoding(#[from] hound::Error),
    #[error("Synthesis failed: {0}")]
    Synthesis(String),
}

/// Opaque provider configuration, passed through unvalidated.
///
/// Backend-specific settings (credentials, endpoints, model names) live in
/// `extra`; the orchestrator never inspects them.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_sample_rate() -> u32 {
    22050
}

fn default_language() -> String {
    "vi".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            language: default_language(),
            extra: HashMap::new(),
        }
    }
}

/// Size and path details of a written audio file.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: std::path::PathBuf,
    pub file_size: u64,
}

impl FileInfo {
    /// Stat `path`, returning `None` if the file is missing or unreadable.
    pub fn probe(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        Some(Self {
            path: path.to_path_buf(),
            file_size: meta.len(),
        })
    }
}

/// Backend-issued identifiers produced by a clone call.
///
/// Remote cloning services typically hand back a download URL and a session
/// identifier; both land in the clone ledger schema.
#[derive(Debug, Clone, Default)]
pub struct CloneArtifacts {
    pub audio_url: Option<String>,
    pub clone_id: Option<String>,
}

/// Normalized outcome of one provider attempt.
///
/// Produced by [`SpeechProvider::synthesize_with_metadata`] and
/// [`SpeechProvider::clone_with_metadata`]; never carries a panic or an
/// unhandled error out of the provider.
#[derive(Debug, Clone)]
pub struct AttemptReport {
    pub success: bool,
    pub error: Option<String>,
    pub estimated_duration: f64,
    pub file_info: Option<FileInfo>,
    pub artifacts: Option<CloneArtifacts>,
}

impl AttemptReport {
    fn failure(estimated_duration: f64, error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            estimated_duration,
            file_info: None,
            artifacts: None,
        }
    }
}

/// Common interface for speech-synthesis backends.
///
/// Implementations may block for a long time (network calls, remote browser
/// sessions) and may keep persistent state across calls; the orchestrator
/// enforces no timeout and makes exactly one attempt per item.
pub trait SpeechProvider: std::fmt::Debug {
    /// Registry key and ledger `provider` column value.
    fn name(&self) -> &str;

    fn sample_rate(&self) -> u32;

    /// Language tag written to ledger rows (e.g. `"vi"`, `"en"`).
    fn language(&self) -> &str;

    fn supported_voices(&self) -> Vec<String>;

    /// Synthesize `text` with `voice` into a WAV file at `output`.
    fn synthesize(&mut self, text: &str, voice: &str, output: &Path)
        -> Result<(), ProviderError>;

    /// Clone the voice of `reference_audio` speaking `text` into `output`.
    ///
    /// Providers without cloning support keep the default implementation.
    fn clone_voice(
        &mut self,
        _text: &str,
        _reference_audio: &Path,
        _output: &Path,
    ) -> Result<CloneArtifacts, ProviderError> {
        Err(ProviderError::CloneUnsupported(self.name().to_string()))
    }

    /// Heuristic audio duration for `text`, in seconds.
    fn estimate_duration(&self, text: &str) -> f64 {
        ledger::estimate_duration(text)
    }

    /// Validate, synthesize, and normalize the result.
    ///
    /// Rejects empty text and unsupported voices before invoking
    /// [`SpeechProvider::synthesize`]; never returns `Err`.
    fn synthesize_with_metadata(
        &mut self,
        text: &str,
        voice: &str,
        output: &Path,
    ) -> AttemptReport {
        let estimated = self.estimate_duration(text);

        if text.trim().is_empty() {
            return AttemptReport::failure(estimated, ProviderError::InvalidText.to_string());
        }
        let available = self.supported_voices();
        if !available.iter().any(|v| v == voice) {
            return AttemptReport::failure(
                estimated,
                ProviderError::UnsupportedVoice {
                    voice: voice.to_string(),
                    available,
                }
                .to_string(),
            );
        }

        match self.synthesize(text, voice, output) {
            Ok(()) => AttemptReport {
                success: true,
                error: None,
                estimated_duration: estimated,
                file_info: FileInfo::probe(output),
                artifacts: None,
            },
            Err(e) => AttemptReport::failure(estimated, e.to_string()),
        }
    }

    /// Validate, clone, and normalize the result. Never returns `Err`.
    fn clone_with_metadata(
        &mut self,
        text: &str,
        reference_audio: &Path,
        output: &Path,
    ) -> AttemptReport {
        let estimated = self.estimate_duration(text);

        if text.trim().is_empty() {
            return AttemptReport::failure(estimated, ProviderError::InvalidText.to_string());
        }

        match self.clone_voice(text, reference_audio, output) {
            Ok(artifacts) => AttemptReport {
                success: true,
                error: None,
                estimated_duration: estimated,
                file_info: FileInfo::probe(output),
                artifacts: Some(artifacts),
            },
            Err(e) => AttemptReport::failure(estimated, e.to_string()),
        }
    }
}

/// Constructor signature stored in the factory registry.
pub type ProviderCtor =
    fn(name: &str, config: ProviderConfig) -> Result<Box<dyn SpeechProvider>, ProviderError>;

/// Name-keyed registry of provider constructors.
///
/// Built-ins are registered at construction; external backends add
/// themselves via [`ProviderFactory::register`] before first use.
pub struct ProviderFactory {
    ctors: HashMap<String, ProviderCtor>,
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderFactory {
    pub fn new() -> Self {
        let mut factory = Self {
            ctors: HashMap::new(),
        };
        factory.register_builtin();
        factory
    }

    fn register_builtin(&mut self) {
        self.register("tone", |name, config| {
            Ok(Box::new(crate::providers::tone::ToneProvider::new(
                name, config,
            )))
        });
        log::debug!("Registered {} built-in providers", self.ctors.len());
    }

    /// Register a provider constructor under `name` (lowercased).
    pub fn register(&mut self, name: &str, ctor: ProviderCtor) {
        self.ctors.insert(name.to_lowercase(), ctor);
    }

    /// Instantiate the provider registered under `name`.
    pub fn create(
        &self,
        name: &str,
        config: ProviderConfig,
    ) -> Result<Box<dyn SpeechProvider>, ProviderError> {
        let ctor = self.ctors.get(&name.to_lowercase()).ok_or_else(|| {
            ProviderError::UnknownProvider(name.to_string(), self.available())
        })?;
        let provider = ctor(name, config)?;
        log::info!("Created provider: {name}");
        Ok(provider)
    }

    /// Names of all registered constructors.
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ctors.keys().cloned().collect();
        names.sort();
        names
    }
}
