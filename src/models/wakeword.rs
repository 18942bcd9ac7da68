//! Wakeword Detection using TensorFlow Lite
//!
//! This module provides wakeword detection capabilities using the hey_mycroft model
//! with mel spectrogram feature preprocessing.

use crate::error::EdgeError;

type Result<T> = std::result::Result<T, EdgeError>;

use std::sync::Mutex;
use tflitec::interpreter::{Interpreter, Options};
use tflitec::model::Model;
use tflitec::tensor;

/// Wakeword detection result
#[derive(Debug, Clone)]
pub struct WakewordDetection {
    /// Whether a wakeword was detected
    pub detected: bool,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
    /// Timestamp when detection occurred
    pub timestamp: std::time::Instant,
}

/// Simple wrapper for wakeword model used by the detection pipeline.
///
/// Leaks the loaded model for a `'static` lifetime and builds its interpreter
/// once at construction, the same technique `EmbeddingModel` uses, so this
/// type carries no lifetime parameter of its own.
pub struct WakewordModel {
    interpreter: Mutex<Interpreter<'static>>,
    expected_input_size: usize,
    pub confidence_threshold: f32,
    pub sample_rate: u32,
}

impl WakewordModel {
    pub fn new(model_path: &str) -> Result<Self> {
        let model = Box::leak(Box::new(Model::new(model_path).map_err(|e| {
            EdgeError::ModelLoadError(format!("Failed to load wakeword model: {}", e))
        })?));

        // Model expects [1, 16, 96] = 1536 features (16 embedding frames × 96 features each)
        let expected_input_size = 1536;

        let mut options = Options::default();
        options.thread_count = 1;

        let interpreter = Interpreter::new(model, Some(options)).map_err(|e| {
            EdgeError::ModelLoadError(format!("Failed to create wakeword interpreter: {}", e))
        })?;

        let input_shape = tensor::Shape::new(vec![1, expected_input_size]);
        interpreter.resize_input(0, input_shape).map_err(|e| {
            EdgeError::ModelLoadError(format!("Failed to resize wakeword input: {}", e))
        })?;

        interpreter.allocate_tensors().map_err(|e| {
            EdgeError::ModelLoadError(format!("Failed to allocate wakeword tensors: {}", e))
        })?;

        Ok(Self {
            interpreter: Mutex::new(interpreter),
            expected_input_size,
            confidence_threshold: 0.5,
            sample_rate: 16000,
        })
    }

    pub fn predict(&self, features: &[f32]) -> Result<f32> {
        if features.len() != self.expected_input_size {
            return Err(EdgeError::InvalidInput(format!(
                "Expected {} features, got {}",
                self.expected_input_size,
                features.len()
            )));
        }

        let interpreter = self.interpreter.lock().map_err(|e| {
            EdgeError::ProcessingError(format!("Failed to lock interpreter: {}", e))
        })?;

        // Set input tensor data (use original features without normalization)
        interpreter.copy(features, 0).map_err(|e| {
            EdgeError::ProcessingError(format!("Failed to set wakeword input: {}", e))
        })?;

        interpreter
            .invoke()
            .map_err(|e| EdgeError::ProcessingError(format!("Wakeword inference failed: {}", e)))?;

        // Real OpenWakeWord model outputs a single confidence score: shape [1, 1]
        let output_tensor = interpreter.output(0).map_err(|e| {
            EdgeError::ProcessingError(format!("Failed to get wakeword output: {}", e))
        })?;

        let output_data = output_tensor.data::<f32>();
        if output_data.len() != 1 {
            log::warn!("Expected 1 output value, got {}", output_data.len());
            return Ok(0.0);
        }

        Ok(output_data[0].clamp(0.0, 1.0))
    }

    pub fn get_expected_input_size(&self) -> usize {
        self.expected_input_size
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wakeword_detection_carries_confidence_and_timestamp() {
        let detection = WakewordDetection {
            detected: true,
            confidence: 0.87,
            timestamp: std::time::Instant::now(),
        };
        assert!(detection.detected);
        assert!(detection.confidence > 0.5);
    }
}
