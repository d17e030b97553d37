//! Pixguard Processing Library
//!
//! Turns a downloaded byte buffer into a pixel matrix and classifies it.
//!
//! - [`decoder`]: integrity verification and decoding
//! - [`detector`]: the `Detector` capability every classifier implements
//! - [`blank`]: background-ratio blank detection
//! - [`engine`]: runs the configured detectors in order and merges their output

pub mod blank;
pub mod decoder;
pub mod detector;
pub mod engine;
pub mod matrix;

pub use blank::BlankDetector;
pub use decoder::{DecodeError, DecodedImage, ImageDecoder};
pub use detector::Detector;
pub use engine::{EngineError, ValidationEngine};
pub use matrix::PixelMatrix;
