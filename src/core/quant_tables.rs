//! JPEG quality estimation from quantization tables
//!
//! The luminance quantization table stored in a JPEG stream is compared with
//! the tables libjpeg derives from the standard (ITU-T T.81 Annex K) base table
//! for every quality level from 1 to 100. The level with the smallest sum of
//! squared differences is reported, together with two goodness-of-fit values.
//!
//! This is a heuristic. Encoders that use their own tables (or the standard
//! tables with a different scaling rule) still get the nearest libjpeg
//! quality, and only the error values reveal how poor that fit is.

use lazy_static::lazy_static;

use super::jpeg_markers::scan_markers;
use crate::error::QualityError;

/// Standard luminance table in natural (row-major) order.
pub const STD_LUMINANCE_TABLE: [u16; 64] = [
    16, 11, 10, 16, 24, 40, 51, 61, //
    12, 12, 14, 19, 26, 58, 60, 55, //
    14, 13, 16, 24, 40, 57, 69, 56, //
    14, 17, 22, 29, 51, 87, 80, 62, //
    18, 22, 37, 56, 68, 109, 103, 77, //
    24, 35, 55, 64, 81, 104, 113, 92, //
    49, 64, 78, 87, 103, 121, 120, 101, //
    72, 92, 95, 98, 112, 100, 103, 99,
];

lazy_static! {
    /// Candidate tables, index 0 holds quality 1.
    static ref CANDIDATE_TABLES: Vec<[u16; 64]> = (1..=100u32).map(scaled_table).collect();
}

/// Result of matching an observed table against the candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityEstimate {
    /// Best matching libjpeg quality, 1..=100
    pub quality: u8,
    /// Root mean square difference per coefficient
    pub rms_error: f64,
    /// Sum of squared differences divided by the squared norm of the observed table
    pub normalized_squared_error: f64,
}

/// Table libjpeg produces for `quality` with baseline clamping.
pub fn scaled_table(quality: u32) -> [u16; 64] {
    let quality = quality.clamp(1, 100);
    let scale = if quality < 50 {
        5000 / quality
    } else {
        200 - quality * 2
    };

    let mut table = [0u16; 64];
    for (out, base) in table.iter_mut().zip(STD_LUMINANCE_TABLE.iter()) {
        let value = (u32::from(*base) * scale + 50) / 100;
        *out = value.clamp(1, 255) as u16;
    }
    table
}

/// Estimate the quality level for a luminance table in natural order.
pub fn estimate_quality(observed: &[u16; 64]) -> QualityEstimate {
    let mut best_quality = 1usize;
    let mut best_sse = f64::MAX;

    for (idx, candidate) in CANDIDATE_TABLES.iter().enumerate() {
        let sse = squared_error(observed, candidate);
        // Strict comparison keeps the lowest quality on ties
        if sse < best_sse {
            best_sse = sse;
            best_quality = idx + 1;
        }
    }

    let norm: f64 = observed.iter().map(|v| f64::from(*v).powi(2)).sum();
    let normalized_squared_error = if norm > 0.0 { best_sse / norm } else { 0.0 };

    QualityEstimate {
        quality: best_quality as u8,
        rms_error: (best_sse / 64.0).sqrt(),
        normalized_squared_error,
    }
}

/// Estimate the quality of a JPEG byte stream.
///
/// Fails when the stream is not a JPEG or carries no luminance table.
pub fn estimate_jpeg_quality(data: &[u8]) -> Result<QualityEstimate, QualityError> {
    let markers = scan_markers(data)?;
    let table = markers
        .luminance_table()
        .ok_or(QualityError::NoLuminanceTable)?;
    Ok(estimate_quality(table))
}

fn squared_error(a: &[u16; 64], b: &[u16; 64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum()
}
