//! JPEG marker segment scanner
//!
//! Walks the marker segments in front of the first scan and keeps what the
//! property document needs: quantization tables, frame header, JFIF density,
//! Adobe transform, EXIF presence and the (possibly chunked) ICC profile.

use crate::error::QualityError;

/// Zigzag position -> natural (row-major) position.
pub const ZIGZAG_TO_NATURAL: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, //
    12, 19, 26, 33, 40, 48, 41, 34, 27, 20, 13, 6, 7, 14, 21, 28, //
    35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, //
    58, 59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// Start-of-frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub marker: u8,
    pub precision: u8,
    pub width: u16,
    pub height: u16,
    pub components: u8,
}

impl FrameHeader {
    pub fn is_progressive(&self) -> bool {
        matches!(self.marker, 0xC2 | 0xC6 | 0xCA | 0xCE)
    }
}

/// JFIF APP0 contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JfifHeader {
    pub version_major: u8,
    pub version_minor: u8,
    pub unit: u8,
    pub density_x: u16,
    pub density_y: u16,
}

/// Everything collected from the marker segments of one stream.
#[derive(Debug, Default, Clone)]
pub struct JpegMarkers {
    /// Quantization tables by id (0..=3), natural order
    pub quant_tables: [Option<[u16; 64]>; 4],
    pub frame: Option<FrameHeader>,
    pub jfif: Option<JfifHeader>,
    pub adobe_transform: Option<u8>,
    pub exif: Option<Vec<u8>>,
    icc_chunks: Vec<(u8, Vec<u8>)>,
}

impl JpegMarkers {
    /// Table 0, which baseline encoders use for the luminance component.
    pub fn luminance_table(&self) -> Option<&[u16; 64]> {
        self.quant_tables[0].as_ref()
    }

    /// ICC profile reassembled from its APP2 chunks in sequence order.
    pub fn icc_profile(&self) -> Option<Vec<u8>> {
        if self.icc_chunks.is_empty() {
            return None;
        }
        let mut chunks: Vec<&(u8, Vec<u8>)> = self.icc_chunks.iter().collect();
        chunks.sort_by_key(|(seq, _)| *seq);
        Some(chunks.iter().flat_map(|(_, data)| data.iter().copied()).collect())
    }

    /// Resolution in pixels per inch derived from the JFIF density.
    pub fn dpi(&self) -> Option<(f64, f64)> {
        let jfif = self.jfif?;
        let x = f64::from(jfif.density_x);
        let y = f64::from(jfif.density_y);
        match jfif.unit {
            1 => Some((x, y)),
            2 => Some((x * 2.54, y * 2.54)),
            _ => None,
        }
    }
}

/// Scan the segments of a JPEG stream up to the first SOS marker.
pub fn scan_markers(data: &[u8]) -> Result<JpegMarkers, QualityError> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return Err(QualityError::NotJpeg);
    }

    let mut markers = JpegMarkers::default();
    let mut pos = 2;

    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            return Err(QualityError::Truncated);
        }
        let marker = data[pos + 1];
        pos += 2;

        match marker {
            // Fill bytes
            0xFF => {
                pos -= 1;
                continue;
            }
            0x01 | 0xD0..=0xD7 => continue,
            0xD9 | 0xDA => break,
            _ => {}
        }

        if pos + 2 > data.len() {
            return Err(QualityError::Truncated);
        }
        let length = usize::from(u16::from_be_bytes([data[pos], data[pos + 1]]));
        if length < 2 || pos + length > data.len() {
            return Err(QualityError::Truncated);
        }
        let segment = &data[pos + 2..pos + length];
        pos += length;

        match marker {
            0xDB => read_dqt(segment, &mut markers)?,
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                markers.frame = Some(read_frame(marker, segment)?);
            }
            0xE0 => {
                if segment.len() >= 12 && segment.starts_with(b"JFIF\0") {
                    markers.jfif = Some(JfifHeader {
                        version_major: segment[5],
                        version_minor: segment[6],
                        unit: segment[7],
                        density_x: u16::from_be_bytes([segment[8], segment[9]]),
                        density_y: u16::from_be_bytes([segment[10], segment[11]]),
                    });
                }
            }
            0xE1 => {
                if segment.starts_with(b"Exif\0\0") {
                    markers.exif = Some(segment[6..].to_vec());
                }
            }
            0xE2 => {
                if segment.len() > 14 && segment.starts_with(b"ICC_PROFILE\0") {
                    markers.icc_chunks.push((segment[12], segment[14..].to_vec()));
                }
            }
            0xEE => {
                if segment.len() >= 12 && segment.starts_with(b"Adobe") {
                    markers.adobe_transform = Some(segment[11]);
                }
            }
            _ => {}
        }
    }

    Ok(markers)
}

fn read_dqt(mut segment: &[u8], markers: &mut JpegMarkers) -> Result<(), QualityError> {
    while !segment.is_empty() {
        let precision = segment[0] >> 4;
        let id = usize::from(segment[0] & 0x0F);
        let entry_size = if precision == 0 { 1 } else { 2 };
        let needed = 1 + 64 * entry_size;
        if segment.len() < needed || id > 3 {
            return Err(QualityError::Truncated);
        }

        let mut table = [0u16; 64];
        for (zz, natural) in ZIGZAG_TO_NATURAL.iter().enumerate() {
            let offset = 1 + zz * entry_size;
            table[*natural] = if entry_size == 1 {
                u16::from(segment[offset])
            } else {
                u16::from_be_bytes([segment[offset], segment[offset + 1]])
            };
        }
        markers.quant_tables[id] = Some(table);
        segment = &segment[needed..];
    }
    Ok(())
}

fn read_frame(marker: u8, segment: &[u8]) -> Result<FrameHeader, QualityError> {
    if segment.len() < 6 {
        return Err(QualityError::Truncated);
    }
    Ok(FrameHeader {
        marker,
        precision: segment[0],
        height: u16::from_be_bytes([segment[1], segment[2]]),
        width: u16::from_be_bytes([segment[3], segment[4]]),
        components: segment[5],
    })
}
