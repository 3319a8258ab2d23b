//! Property document: the schema-checkable description of one PDF

use anyhow::Result;
use quick_xml::Writer;
use std::collections::BTreeMap;
use std::io::Write;

use crate::core::quant_tables::QualityEstimate;
use crate::reporting::xml::{self, format_number, text_element};

/// Value of the bits-per-component field when it cannot be computed.
pub const BPC_UNKNOWN: i32 = -9999;

/// Value of the compression ratio when the stream is empty.
pub const RATIO_UNKNOWN: f64 = -9999.0;

/// Placeholder written instead of opaque codec metadata.
pub const BYTES_PLACEHOLDER: &str = "bytes";

/// Bits per pixel for each decoded mode.
const MODE_BITS_PER_PIXEL: &[(&str, i32)] = &[
    ("1", 1),
    ("L", 8),
    ("P", 8),
    ("RGB", 24),
    ("RGBA", 32),
    ("CMYK", 32),
    ("YCbCr", 24),
    ("LAB", 24),
    ("HSV", 24),
    ("I", 32),
    ("F", 32),
];

/// Bits per component for a decoded mode and component count.
///
/// Returns [`BPC_UNKNOWN`] for zero components or a mode outside the table.
pub fn bits_per_component(mode: &str, components: u32) -> i32 {
    let bits_per_pixel = MODE_BITS_PER_PIXEL
        .iter()
        .find(|(m, _)| *m == mode)
        .map(|(_, bits)| *bits);

    match bits_per_pixel {
        Some(bits) if components != 0 => bits / components as i32,
        _ => BPC_UNKNOWN,
    }
}

/// Ratio between the uncompressed size and the stored stream size.
pub fn compression_ratio(stream_bytes: usize, bpc: i32, components: u32, width: u32, height: u32) -> f64 {
    if stream_bytes == 0 {
        return RATIO_UNKNOWN;
    }
    let bytes_per_pixel = f64::from(bpc) * f64::from(components) / 8.0;
    let uncompressed = bytes_per_pixel * f64::from(width) * f64::from(height);
    let ratio = uncompressed / stream_bytes as f64;
    (ratio * 100.0).round() / 100.0
}

/// `/PageMode` entry of the document catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageMode {
    Explicit(String),
    Undefined,
}

impl PageMode {
    pub fn as_str(&self) -> &str {
        match self {
            PageMode::Explicit(mode) => mode,
            PageMode::Undefined => "undefined",
        }
    }
}

/// Attributes declared by the PDF image dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfImageAttributes {
    pub xref: u32,
    pub width: i64,
    pub height: i64,
    pub bpc: i64,
    pub colorspace: String,
    pub altcolorspace: String,
    pub filter: String,
}

/// One item of raw codec metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Pair(f64, f64),
}

/// Codec metadata after filtering.
///
/// Opaque values become [`BYTES_PLACEHOLDER`]; the `dpi` and `jfif_density`
/// pairs are split into typed fields; any other pair is dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodecMetadata {
    pub ppi: Option<(f64, f64)>,
    pub jfif_density: Option<(f64, f64)>,
    pub extra: Vec<(String, String)>,
}

impl CodecMetadata {
    pub fn from_raw(items: Vec<(String, MetaValue)>) -> Self {
        let mut filtered = CodecMetadata::default();
        for (key, value) in items {
            match value {
                MetaValue::Bytes(_) => filtered.extra.push((key, BYTES_PLACEHOLDER.to_string())),
                MetaValue::Pair(x, y) if key == "dpi" => filtered.ppi = Some((x, y)),
                MetaValue::Pair(x, y) if key == "jfif_density" => filtered.jfif_density = Some((x, y)),
                MetaValue::Pair(..) => {}
                MetaValue::Int(v) => filtered.extra.push((key, v.to_string())),
                MetaValue::Float(v) => filtered.extra.push((key, format_number(v))),
                MetaValue::Text(v) => filtered.extra.push((key, v)),
            }
        }
        filtered
    }
}

/// Attributes obtained by decoding the image stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamAttributes {
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub mode: String,
    pub components: u32,
    pub bpc: i32,
    pub compression_ratio: f64,
    pub metadata: CodecMetadata,
    pub icc_profile_name: Option<String>,
    pub icc_profile_description: Option<String>,
    pub jpeg_quality: Option<QualityEstimate>,
}

/// One embedded raster image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub pdf: PdfImageAttributes,
    pub stream: Option<StreamAttributes>,
    pub decode_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRecord {
    pub images: Vec<ImageRecord>,
}

/// Normalized description of one PDF file.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDocument {
    pub file_path: String,
    pub file_size: u64,
    pub metadata: BTreeMap<String, String>,
    pub page_mode: PageMode,
    pub signature_flags: Option<i64>,
    pub page_count: usize,
    pub pages: Vec<PageRecord>,
    pub pdfinfo: Option<Vec<(String, String)>>,
    pub pdfimages: Option<Vec<Vec<(String, String)>>>,
}

impl PropertyDocument {
    /// All images of the document in page order.
    pub fn images(&self) -> impl Iterator<Item = &ImageRecord> {
        self.pages.iter().flat_map(|page| page.images.iter())
    }

    /// Serialize as a standalone `<properties>` document for the schema engine.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        self.write_xml(&mut writer)?;
        Ok(String::from_utf8(writer.into_inner())?)
    }

    /// Write the `<properties>` element.
    pub fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        xml::start(writer, "properties")?;
        text_element(writer, "filePath", &self.file_path)?;
        text_element(writer, "fileSize", &self.file_size.to_string())?;

        xml::start(writer, "meta")?;
        for (key, value) in &self.metadata {
            text_element(writer, key, value)?;
        }
        xml::end(writer, "meta")?;

        text_element(writer, "PageMode", self.page_mode.as_str())?;
        if let Some(flags) = self.signature_flags {
            text_element(writer, "signatureFlags", &flags.to_string())?;
        }
        text_element(writer, "noPages", &self.page_count.to_string())?;

        xml::start(writer, "pages")?;
        for page in &self.pages {
            xml::start(writer, "page")?;
            for image in &page.images {
                write_image(writer, image)?;
            }
            xml::end(writer, "page")?;
        }
        xml::end(writer, "pages")?;

        if let Some(info) = &self.pdfinfo {
            xml::start(writer, "pdfinfo")?;
            for (key, value) in info {
                text_element(writer, &xml::element_name(key), value)?;
            }
            xml::end(writer, "pdfinfo")?;
        }

        if let Some(rows) = &self.pdfimages {
            xml::start(writer, "pdfimages")?;
            for row in rows {
                xml::start(writer, "image")?;
                for (key, value) in row {
                    text_element(writer, &xml::element_name(key), value)?;
                }
                xml::end(writer, "image")?;
            }
            xml::end(writer, "pdfimages")?;
        }

        xml::end(writer, "properties")?;
        Ok(())
    }
}

fn write_image<W: Write>(writer: &mut Writer<W>, image: &ImageRecord) -> Result<()> {
    xml::start(writer, "image")?;

    let pdf = &image.pdf;
    xml::start(writer, "pdf")?;
    text_element(writer, "xref", &pdf.xref.to_string())?;
    text_element(writer, "width", &pdf.width.to_string())?;
    text_element(writer, "height", &pdf.height.to_string())?;
    text_element(writer, "bpc", &pdf.bpc.to_string())?;
    text_element(writer, "colorspace", &pdf.colorspace)?;
    text_element(writer, "altcolorspace", &pdf.altcolorspace)?;
    text_element(writer, "filter", &pdf.filter)?;
    xml::end(writer, "pdf")?;

    if let Some(stream) = &image.stream {
        xml::start(writer, "stream")?;
        text_element(writer, "format", &stream.format)?;
        text_element(writer, "width", &stream.width.to_string())?;
        text_element(writer, "height", &stream.height.to_string())?;
        text_element(writer, "mode", &stream.mode)?;
        text_element(writer, "components", &stream.components.to_string())?;
        text_element(writer, "bpc", &stream.bpc.to_string())?;
        text_element(writer, "compressionRatio", &format_number(stream.compression_ratio))?;

        if let Some((x, y)) = stream.metadata.ppi {
            text_element(writer, "ppi_x", &format_number(x))?;
            text_element(writer, "ppi_y", &format_number(y))?;
        }
        if let Some((x, y)) = stream.metadata.jfif_density {
            text_element(writer, "jfif_density_x", &format_number(x))?;
            text_element(writer, "jfif_density_y", &format_number(y))?;
        }
        for (key, value) in &stream.metadata.extra {
            text_element(writer, &xml::element_name(key), value)?;
        }
        if let Some(name) = &stream.icc_profile_name {
            text_element(writer, "icc_profile_name", name)?;
        }
        if let Some(description) = &stream.icc_profile_description {
            text_element(writer, "icc_profile_description", description)?;
        }
        if let Some(estimate) = &stream.jpeg_quality {
            text_element(writer, "JPEGQuality", &estimate.quality.to_string())?;
            text_element(writer, "NSE_JPEGQuality", &format!("{:.6}", estimate.normalized_squared_error))?;
        }
        xml::end(writer, "stream")?;
    }

    if let Some(error) = &image.decode_error {
        text_element(writer, "streamError", error)?;
    }

    xml::end(writer, "image")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_per_component_table() {
        assert_eq!(bits_per_component("1", 1), 1);
        assert_eq!(bits_per_component("L", 1), 8);
        assert_eq!(bits_per_component("P", 1), 8);
        assert_eq!(bits_per_component("RGB", 3), 8);
        assert_eq!(bits_per_component("YCbCr", 3), 8);
        assert_eq!(bits_per_component("RGBA", 4), 8);
        assert_eq!(bits_per_component("CMYK", 4), 8);
        assert_eq!(bits_per_component("I", 1), 32);
        assert_eq!(bits_per_component("F", 1), 32);
    }

    #[test]
    fn test_bits_per_component_truncates() {
        assert_eq!(bits_per_component("RGB", 5), 4);
    }

    #[test]
    fn test_bits_per_component_sentinel() {
        assert_eq!(bits_per_component("CMYK-ext", 4), BPC_UNKNOWN);
        assert_eq!(bits_per_component("RGB", 0), BPC_UNKNOWN);
        assert_eq!(bits_per_component("LA", 2), BPC_UNKNOWN);
    }

    #[test]
    fn test_compression_ratio() {
        assert_eq!(compression_ratio(3000, 8, 3, 100, 100), 10.0);
        assert_eq!(compression_ratio(7, 8, 1, 10, 1), 1.43);
        assert_eq!(compression_ratio(0, 8, 3, 100, 100), RATIO_UNKNOWN);
    }

    #[test]
    fn test_codec_metadata_filter() {
        let filtered = CodecMetadata::from_raw(vec![
            ("jfif".to_string(), MetaValue::Int(258)),
            ("jfif_version".to_string(), MetaValue::Pair(1.0, 2.0)),
            ("dpi".to_string(), MetaValue::Pair(300.0, 300.0)),
            ("jfif_density".to_string(), MetaValue::Pair(300.0, 300.0)),
            ("icc_profile".to_string(), MetaValue::Bytes(vec![0, 1, 2])),
            ("comment".to_string(), MetaValue::Text("scan".to_string())),
            ("gamma".to_string(), MetaValue::Float(0.45)),
        ]);

        assert_eq!(filtered.ppi, Some((300.0, 300.0)));
        assert_eq!(filtered.jfif_density, Some((300.0, 300.0)));
        assert_eq!(
            filtered.extra,
            vec![
                ("jfif".to_string(), "258".to_string()),
                ("icc_profile".to_string(), "bytes".to_string()),
                ("comment".to_string(), "scan".to_string()),
                ("gamma".to_string(), "0.45".to_string()),
            ]
        );
    }

    fn sample_document() -> PropertyDocument {
        let mut metadata = BTreeMap::new();
        metadata.insert("title".to_string(), "Kaart & legenda".to_string());
        PropertyDocument {
            file_path: "/batch/300ppi-50/a.pdf".to_string(),
            file_size: 1234,
            metadata,
            page_mode: PageMode::Undefined,
            signature_flags: Some(0),
            page_count: 1,
            pages: vec![PageRecord {
                images: vec![ImageRecord {
                    pdf: PdfImageAttributes {
                        xref: 5,
                        width: 10,
                        height: 20,
                        bpc: 8,
                        colorspace: "DeviceRGB".to_string(),
                        altcolorspace: String::new(),
                        filter: "DCTDecode".to_string(),
                    },
                    stream: None,
                    decode_error: Some("unsupported".to_string()),
                }],
            }],
            pdfinfo: None,
            pdfimages: None,
        }
    }

    #[test]
    fn test_xml_layout() {
        let xml = sample_document().to_xml().unwrap();
        assert!(xml.starts_with("<properties><filePath>/batch/300ppi-50/a.pdf</filePath>"));
        assert!(xml.contains("<meta><title>Kaart &amp; legenda</title></meta>"));
        assert!(xml.contains("<PageMode>undefined</PageMode>"));
        assert!(xml.contains("<noPages>1</noPages>"));
        assert!(xml.contains("<pdf><xref>5</xref><width>10</width>"));
        assert!(xml.contains("<streamError>unsupported</streamError>"));
        assert!(!xml.contains("<stream>"));
        assert!(xml.ends_with("</properties>"));
    }
}
