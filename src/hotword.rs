//! The hotword detector seam. The concrete neural classifier is out of scope for
//! this engine (it is "treated as a black-box classifier" — the interesting
//! behavior this crate owns is the debounced control loop around it, not the
//! model's internal correctness). `HotwordDetector` is the trait that loop is
//! written against; `PipelineHotwordDetector` adapts the teacher's existing
//! three-stage melspectrogram/embedding/wakeword pipeline
//! (`detection::pipeline::DetectionPipeline`) to it unchanged, since that's the
//! same kind of openWakeWord-style pipeline the original Python implementation
//! used (`hotword_detector.py`).

use crate::detection::pipeline::DetectionPipeline;
use crate::error::DetectorError;
use std::collections::HashMap;

/// Stateful wake-word classifier. Implementations must be called on *every*
/// frame the caller wants counted toward recognition context — skipping frames
/// degrades detection, per the crucial invariant in the design.
pub trait HotwordDetector: Send {
    /// Advance internal state by exactly one frame and return per-word scores.
    fn get_scores(&mut self, frame: &[i16]) -> Result<HashMap<String, f32>, DetectorError>;
    fn reset(&mut self);
}

/// Adapts the three-stage ML pipeline to the single-word case: one
/// `DetectionPipeline` instance is one loaded wakeword model, reported under
/// `word_name` in the returned score map.
pub struct PipelineHotwordDetector {
    pipeline: DetectionPipeline,
    word_name: String,
}

impl PipelineHotwordDetector {
    pub fn new(pipeline: DetectionPipeline, word_name: impl Into<String>) -> Self {
        Self {
            pipeline,
            word_name: word_name.into(),
        }
    }
}

impl HotwordDetector for PipelineHotwordDetector {
    fn get_scores(&mut self, frame: &[i16]) -> Result<HashMap<String, f32>, DetectorError> {
        let samples_f32: Vec<f32> = frame.iter().map(|&s| s as f32 / 32768.0).collect();
        let detection = self
            .pipeline
            .process_audio_chunk(&samples_f32)
            .map_err(|e| DetectorError::InvalidInput(e.to_string()))?;
        let mut scores = HashMap::with_capacity(1);
        scores.insert(self.word_name.clone(), detection.confidence);
        Ok(scores)
    }

    fn reset(&mut self) {
        self.pipeline.reset();
    }
}

/// Deterministic test double that replays a fixed sequence of score maps, one
/// per `get_scores` call, repeating the last entry once exhausted. Lets the
/// `DetectionLoop` and `SessionManager` scenario tests (S1-S6 in the design)
/// run without loading real model files.
#[cfg(test)]
pub struct ScriptedDetector {
    script: Vec<HashMap<String, f32>>,
    cursor: usize,
    reset_count: usize,
}

#[cfg(test)]
impl ScriptedDetector {
    pub fn new(script: Vec<HashMap<String, f32>>) -> Self {
        Self {
            script,
            cursor: 0,
            reset_count: 0,
        }
    }

    pub fn reset_count(&self) -> usize {
        self.reset_count
    }
}

#[cfg(test)]
impl HotwordDetector for ScriptedDetector {
    fn get_scores(&mut self, _frame: &[i16]) -> Result<HashMap<String, f32>, DetectorError> {
        let scores = self
            .script
            .get(self.cursor.min(self.script.len().saturating_sub(1)))
            .cloned()
            .unwrap_or_default();
        if self.cursor < self.script.len() {
            self.cursor += 1;
        }
        Ok(scores)
    }

    fn reset(&mut self) {
        self.reset_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_detector_replays_then_holds_last() {
        let mut scores_a = HashMap::new();
        scores_a.insert("alexa".to_string(), 0.1);
        let mut scores_b = HashMap::new();
        scores_b.insert("alexa".to_string(), 0.9);
        let mut detector = ScriptedDetector::new(vec![scores_a.clone(), scores_b.clone()]);

        assert_eq!(detector.get_scores(&[]).unwrap(), scores_a);
        assert_eq!(detector.get_scores(&[]).unwrap(), scores_b);
        // exhausted: holds the last entry
        assert_eq!(detector.get_scores(&[]).unwrap(), scores_b);
    }

    #[test]
    fn reset_increments_counter() {
        let mut detector = ScriptedDetector::new(vec![]);
        detector.reset();
        detector.reset();
        assert_eq!(detector.reset_count(), 2);
    }
}
