//! Extraction, quality estimation and validation of single PDF files

pub mod extractor;
pub mod icc;
pub mod jpeg_markers;
pub mod properties;
pub mod quant_tables;
pub mod schematron;
pub mod svrl;
pub mod tools;
pub mod validator;
