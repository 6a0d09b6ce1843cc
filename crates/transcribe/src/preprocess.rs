// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optional audio preprocessing ahead of the provider call: resample to
//! 16 kHz mono, band-pass 300-3000 Hz, normalize. The concrete DSP chain is
//! an external concern (pulled in by whichever binary composes this crate);
//! [`IdentityPreprocessor`] is the built-in pass-through used when none is
//! configured.

#[derive(Debug, Clone, thiserror::Error)]
#[error("audio preprocessing failed: {0}")]
pub struct PreprocessError(pub String);

/// Transforms raw call audio before it is handed to a [`crate::Provider`].
/// A failure here is non-fatal: the worker pool falls back to the raw
/// bytes rather than dropping the job.
pub trait Preprocessor: Send + Sync {
    fn process(&self, audio: Vec<u8>) -> Result<Vec<u8>, PreprocessError>;
}

/// Pass the audio through unchanged.
pub struct IdentityPreprocessor;

impl Preprocessor for IdentityPreprocessor {
    fn process(&self, audio: Vec<u8>) -> Result<Vec<u8>, PreprocessError> {
        Ok(audio)
    }
}

/// Preprocess `audio`, falling back to the original bytes on failure.
pub fn preprocess_or_fallback(preprocessor: &dyn Preprocessor, audio: Vec<u8>) -> Vec<u8> {
    let original = audio.clone();
    match preprocessor.process(audio) {
        Ok(processed) => processed,
        Err(err) => {
            tracing::warn!(error = %err, "audio preprocessing failed, using raw audio");
            original
        }
    }
}
