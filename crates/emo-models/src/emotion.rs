//! Emotion classification results.
//!
//! These mirror the JSON returned by the classification service's
//! `/analyze` endpoint.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Facial expression classes, in model output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Anger,
    Contempt,
    Disgust,
    Fear,
    Happy,
    Neutral,
    Sad,
    Surprise,
}

impl EmotionLabel {
    /// All labels, indexed like the classifier's logits.
    pub const ALL: [EmotionLabel; 8] = [
        EmotionLabel::Anger,
        EmotionLabel::Contempt,
        EmotionLabel::Disgust,
        EmotionLabel::Fear,
        EmotionLabel::Happy,
        EmotionLabel::Neutral,
        EmotionLabel::Sad,
        EmotionLabel::Surprise,
    ];

    /// Label for a logit index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Anger => "anger",
            EmotionLabel::Contempt => "contempt",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Happy => "happy",
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Surprise => "surprise",
        }
    }
}

impl std::fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown emotion label: {0}")]
pub struct UnknownLabel(pub String);

impl FromStr for EmotionLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .find(|label| label.as_str() == lower)
            .copied()
            .ok_or(UnknownLabel(s.to_string()))
    }
}

/// A label with its probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionScore {
    pub label: EmotionLabel,
    pub confidence: f32,
}

/// Ranked labels for one uploaded face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResult {
    /// Position of the face in the uploaded batch
    pub index: usize,
    pub top3: Vec<EmotionScore>,
}

/// Response of the classification service for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub images: Vec<ImageResult>,
    /// Top labels of the batch-mean probabilities
    pub top3_aggregate: Vec<EmotionScore>,
    /// Free-text coaching feedback generated from the aggregate
    pub gemini_feedback: String,
    /// Server-side timing breakdown in milliseconds
    #[serde(default)]
    pub timings: HashMap<String, f64>,
}

impl AnalysisResponse {
    /// Highest-ranked aggregate label, if any.
    pub fn dominant(&self) -> Option<&EmotionScore> {
        self.top3_aggregate.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parsing() {
        assert_eq!("Happy".parse::<EmotionLabel>().unwrap(), EmotionLabel::Happy);
        assert!("bored".parse::<EmotionLabel>().is_err());
    }

    #[test]
    fn test_response_deserializes_service_payload() {
        let json = r#"{
            "images": [{"index": 0, "top3": [{"label": "happy", "confidence": 0.7}]}],
            "top3_aggregate": [{"label": "happy", "confidence": 0.7}],
            "gemini_feedback": "Keep going",
            "timings": {"grpc_ms": 12.5}
        }"#;
        let resp: AnalysisResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.images.len(), 1);
        assert_eq!(resp.dominant().unwrap().label, EmotionLabel::Happy);
        assert_eq!(resp.timings["grpc_ms"], 12.5);
    }
}
