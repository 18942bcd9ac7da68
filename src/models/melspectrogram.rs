//! Mel Spectrogram Processor using TensorFlow Lite
//!
//! This module provides mel spectrogram feature extraction from raw audio samples
//! using the melspectrogram.tflite model with proper OpenWakeWord-compatible usage.
//!
//! Based on research, OpenWakeWord:
//! 1. Uses resize_tensor_input(0, [1, 1280], strict=True) for the melspectrogram model
//! 2. Expects input shape [1, 1280] (batch_size=1, sequence_length=1280)
//! 3. The model processes 1.28 seconds of audio at 16kHz sample rate
//! 4. Input is raw audio samples, not mel spectrograms

use crate::error::EdgeError;

type Result<T> = std::result::Result<T, EdgeError>;
use std::sync::Mutex;

use tflitec::interpreter::{Interpreter, Options};
use tflitec::model::Model;
use tflitec::tensor;

/// Configuration for mel spectrogram processing
#[derive(Debug, Clone)]
pub struct MelSpectrogramConfig {
    /// Path to the melspectrogram model
    pub model_path: String,
    /// Audio chunk size in samples (1280 = 80ms at 16kHz)
    pub chunk_size: usize,
    /// Sample rate (default: 16000 Hz)
    pub sample_rate: u32,
}

impl Default for MelSpectrogramConfig {
    fn default() -> Self {
        Self {
            model_path: "models/melspectrogram.tflite".to_string(),
            chunk_size: 1280, // 80ms at 16kHz
            sample_rate: 16000,
        }
    }
}

/// Simple wrapper for mel spectrogram model used by the detection pipeline.
///
/// Leaks the loaded model for a `'static` lifetime and builds its interpreter
/// once at construction, the same technique `EmbeddingModel` uses, so this
/// type carries no lifetime parameter of its own.
pub struct MelSpectrogramModel {
    interpreter: Mutex<Interpreter<'static>>,
    chunk_size: usize,
}

impl MelSpectrogramModel {
    pub fn new(model_path: &str) -> Result<Self> {
        let model = Box::leak(Box::new(Model::new(model_path).map_err(|e| {
            EdgeError::ModelLoadError(format!("Failed to load melspectrogram model: {}", e))
        })?));

        let mut options = Options::default();
        options.thread_count = 1;

        let chunk_size = MelSpectrogramConfig::default().chunk_size;

        let interpreter = Interpreter::new(model, Some(options)).map_err(|e| {
            EdgeError::ModelLoadError(format!("Failed to create melspectrogram interpreter: {}", e))
        })?;

        let input_shape = tensor::Shape::new(vec![1, chunk_size]);
        interpreter.resize_input(0, input_shape).map_err(|e| {
            EdgeError::ModelLoadError(format!("Failed to resize melspectrogram input: {}", e))
        })?;

        interpreter.allocate_tensors().map_err(|e| {
            EdgeError::ModelLoadError(format!("Failed to allocate melspectrogram tensors: {}", e))
        })?;

        Ok(Self {
            interpreter: Mutex::new(interpreter),
            chunk_size,
        })
    }

    pub fn compute(&self, audio: &[i16]) -> Result<Vec<f32>> {
        let audio_f32: Vec<f32> = audio.iter().map(|&x| x as f32).collect();
        self.predict(&audio_f32)
    }

    pub fn predict(&self, audio: &[f32]) -> Result<Vec<f32>> {
        if audio.len() != self.chunk_size {
            return Err(EdgeError::InvalidInput(format!(
                "Expected {} audio samples, got {}",
                self.chunk_size,
                audio.len()
            )));
        }

        let interpreter = self.interpreter.lock().map_err(|e| {
            EdgeError::ProcessingError(format!("Failed to lock interpreter: {}", e))
        })?;

        interpreter.copy(audio, 0).map_err(|e| {
            EdgeError::ProcessingError(format!("Failed to set melspectrogram input: {}", e))
        })?;

        interpreter.invoke().map_err(|e| {
            EdgeError::ProcessingError(format!("Melspectrogram inference failed: {}", e))
        })?;

        let output_tensor = interpreter.output(0).map_err(|e| {
            EdgeError::ProcessingError(format!("Failed to get melspectrogram output: {}", e))
        })?;

        let output_data = output_tensor.data::<f32>().to_vec();

        // OpenWakeWord's melspectrogram transform.
        Ok(output_data.iter().map(|&x| x / 10.0 + 2.0).collect())
    }

    pub fn get_expected_input_size(&self) -> usize {
        self.chunk_size
    }

    pub fn get_expected_output_size(&self) -> usize {
        // melspectrogram produces [1, 1, 5, 32] = 160 features per chunk
        160
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_melspec_config_default() {
        let config = MelSpectrogramConfig::default();
        assert_eq!(config.chunk_size, 1280);
        assert_eq!(config.sample_rate, 16000);
        assert!(config.model_path.contains("melspectrogram.tflite"));
    }

    #[test]
    fn test_melspec_model_creation_fails_without_model_file() {
        let err = MelSpectrogramModel::new("non_existent_melspec.tflite").unwrap_err();
        assert!(matches!(err, EdgeError::ModelLoadError(_)));
    }

    #[test]
    fn test_audio_sample_generation() {
        let chunk_size = 1280;
        let sample_rate = 16000;

        // Generate test sine wave
        let frequency = 440.0; // A4 note
        let audio_samples: Vec<f32> = (0..chunk_size)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.5
            })
            .collect();

        assert_eq!(audio_samples.len(), chunk_size);

        // Verify amplitude range
        let max_val = audio_samples
            .iter()
            .fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let min_val = audio_samples.iter().fold(f32::INFINITY, |a, &b| a.min(b));

        assert!(max_val <= 1.0);
        assert!(min_val >= -1.0);

        println!(
            "Generated {} audio samples with range [{:.3}, {:.3}]",
            audio_samples.len(),
            min_val,
            max_val
        );
    }
}
