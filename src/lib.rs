pub mod config;
pub mod pipeline;
pub mod review; // Correction store for human OCR review
