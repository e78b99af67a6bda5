//! OCR Types
//!
//! Request options and the normalized recognition result.

use serde::{Deserialize, Serialize};

/// Options sent with every recognition request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrOptions {
    /// Language hint, empty for the service default
    pub lang: String,
    /// Angle classification
    pub cls: bool,
    /// Text detection
    pub det: bool,
    /// Text recognition
    pub rec: bool,
    /// Binarize before recognition
    pub bin: bool,
    /// Invert colors before recognition
    pub inv: bool,
    /// Background color used to flatten transparency
    pub alpha_color: String,
    /// Slicing parameters for large images
    pub slice: serde_json::Value,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            lang: String::new(),
            cls: true,
            det: true,
            rec: true,
            bin: false,
            inv: false,
            alpha_color: "(255, 255, 255)".to_string(),
            slice: serde_json::json!({}),
        }
    }
}

/// Response body as returned by the service: co-indexed parallel arrays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecognition {
    pub text: RawText,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawText {
    pub boxes: Vec<Vec<Vec<f64>>>,
    pub scores: Vec<f64>,
    pub texts: Vec<String>,
}

/// One detected text region
#[derive(Debug, Clone, Serialize)]
pub struct TextBox {
    /// Polygon corners in image pixels
    pub coordinates: Vec<Vec<f64>>,
    pub score: f64,
    pub text: String,
}

/// Recognition result with aligned boxes
#[derive(Debug, Clone, Serialize)]
pub struct Recognition {
    pub boxes: Vec<TextBox>,
    pub raw: RawRecognition,
}

impl Recognition {
    /// Zip the parallel arrays into aligned boxes
    pub fn from_raw(raw: RawRecognition) -> Result<Self, RecognitionError> {
        let RawText { boxes, scores, texts } = &raw.text;
        if boxes.len() != scores.len() || boxes.len() != texts.len() {
            return Err(RecognitionError::Malformed(format!(
                "misaligned arrays: {} boxes, {} scores, {} texts",
                boxes.len(),
                scores.len(),
                texts.len()
            )));
        }

        let aligned = boxes
            .iter()
            .zip(scores)
            .zip(texts)
            .map(|((coordinates, score), text)| TextBox {
                coordinates: coordinates.clone(),
                score: *score,
                text: text.clone(),
            })
            .collect();

        Ok(Self { boxes: aligned, raw })
    }

    /// All recognized text, space-joined in detection order
    pub fn text(&self) -> String {
        self.boxes
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// OCR error types
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("OCR request failed: {0}")]
    Http(String),

    #[error("OCR service returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed OCR response: {0}")]
    Malformed(String),
}
