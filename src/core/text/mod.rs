pub mod normalize;
pub mod recognizer;

pub use normalize::normalize;
pub use recognizer::{MockTextRecognizer, RecognitionError, TesseractRecognizer, TextRecognizer};
