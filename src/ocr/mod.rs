//! OCR Module
//!
//! Text recognition through a remote OCR HTTP service.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gridscan::ocr::{Recognizer, RemoteOcrClient};
//!
//! let client = RemoteOcrClient::new(&config.ocr)?;
//! let recognition = client.recognize(&encoded.base64).await?;
//! println!("{}", recognition.text());
//! ```

mod provider;
mod types;

pub use provider::{Recognizer, RemoteOcrClient};
pub use types::{OcrOptions, RawRecognition, RawText, Recognition, RecognitionError, TextBox};

#[cfg(test)]
pub(crate) use provider::MockRecognizer;
