//! Deterministic local provider that renders sine-tone WAV files.
//!
//! Stands in for network backends in tests and demos: it produces a real,
//! decodable WAV whose length follows the same duration heuristic the
//! ledger uses, without any external service.

use std::f32::consts::TAU;
use std::path::Path;

use crate::provider::{ProviderConfig, ProviderError, SpeechProvider};

/// Voice name → tone frequency in Hz.
const VOICES: &[(&str, f32)] = &[("low", 220.0), ("mid", 440.0), ("high", 880.0)];

/// Local sine-tone synthesis provider.
#[derive(Debug)]
pub struct ToneProvider {
    name: String,
    sample_rate: u32,
    language: String,
}

impl Default for ToneProvider {
    fn default() -> Self {
        Self::new("tone", ProviderConfig::default())
    }
}

impl ToneProvider {
    pub fn new(name: &str, config: ProviderConfig) -> Self {
        Self {
            name: name.to_string(),
            sample_rate: config.sample_rate,
            language: config.language,
        }
    }

    fn frequency_for(&self, voice: &str) -> Option<f32> {
        VOICES
            .iter()
            .find(|(name, _)| *name == voice)
            .map(|(_, freq)| *freq)
    }
}

impl SpeechProvider for ToneProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn language(&self) -> &str {
        &self.language
    }

    fn supported_voices(&self) -> Vec<String> {
        VOICES.iter().map(|(name, _)| name.to_string()).collect()
    }

    fn synthesize(
        &mut self,
        text: &str,
        voice: &str,
        output: &Path,
    ) -> Result<(), ProviderError> {
        let freq = self.frequency_for(voice).ok_or_else(|| {
            ProviderError::UnsupportedVoice {
                voice: voice.to_string(),
                available: self.supported_voices(),
            }
        })?;

        let duration = self.estimate_duration(text);
        let total_samples = (duration * self.sample_rate as f64) as usize;

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(output, spec)?;
        for n in 0..total_samples {
            let t = n as f32 / self.sample_rate as f32;
            writer.write_sample(0.3 * (TAU * freq * t).sin())?;
        }
        writer.finalize()?;

        log::debug!(
            "Tone synthesis: {:.2}s at {freq}Hz -> {}",
            duration,
            output.display()
        );
        Ok(())
    }
}
