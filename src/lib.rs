//! # speechgen-rs
//!
//! A Rust library for batch speech-dataset generation with pluggable
//! text-to-speech providers.
//!
//! ## Features
//!
//! - **Batch orchestration**: drive an ordered list of texts through a
//!   synthesis or voice-cloning provider, with idempotent skipping of
//!   already-generated audio
//! - **Append-only ledger**: one `metadata.tsv` per (provider, model, voice)
//!   triple recording every generated artifact
//! - **Pluggable providers**: implement [`SpeechProvider`] and register it by
//!   name in a [`ProviderFactory`]
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! speechgen-rs = "0.3"
//! ```
//!
//! ```no_run
//! use std::path::PathBuf;
//! use speechgen_rs::{
//!     generator::{BatchOptionsBuilder, DatasetGenerator},
//!     providers::tone::ToneProvider,
//!     BackendConfig, OperationType, TextItem,
//! };
//!
//! let mut generator = DatasetGenerator::new(&PathBuf::from("out"))?;
//! generator.register_provider("tone", Box::new(ToneProvider::default()));
//!
//! let items = vec![
//!     TextItem::new("1", "Hello, world!"),
//!     TextItem::new("2", "A second utterance."),
//! ];
//! let backend = BackendConfig::new("tone", "default", "mid");
//! let options = BatchOptionsBuilder::default().build()?;
//!
//! let summary = generator.generate(&items, &backend, OperationType::Synthesize, &options)?;
//! println!("{} ok, {} failed", summary.successful, summary.failed);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod events;
pub mod generator;
pub mod ledger;
pub mod loaders;
pub mod provider;
pub mod providers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use provider::{ProviderFactory, SpeechProvider};

/// One text to be synthesized, paired with the identifier used for
/// filename derivation.
///
/// The text is kept raw and untrimmed; blank detection happens in the
/// orchestrator, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextItem {
    /// Unique identifier, becomes the filename prefix.
    pub id: String,
    /// Raw text content.
    pub text: String,
}

impl TextItem {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Selects a synthesis backend instance and its parameters.
///
/// `model_or_reference` is a model name for [`OperationType::Synthesize`]
/// and a reference-audio identifier for [`OperationType::Clone`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub provider: String,
    pub model_or_reference: String,
    pub voice: String,
}

impl BackendConfig {
    pub fn new(
        provider: impl Into<String>,
        model_or_reference: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model_or_reference: model_or_reference.into(),
            voice: voice.into(),
        }
    }
}

/// Whether a run performs plain synthesis or reference-audio cloning.
///
/// Clone runs additionally require a reference-audio path resolvable on
/// disk before any item is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Synthesize,
    Clone,
}

impl OperationType {
    /// The `tts_type` value written to ledger rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Synthesize => "synthesize",
            OperationType::Clone => "clone",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cooperative cancellation flag checked between items.
///
/// Cancelling never interrupts an in-flight provider call; the run stops
/// before the next item and still produces a partial summary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a graceful stop. Safe to call from another thread.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
