//! Property extraction: one PDF in, one [`PropertyDocument`] out
//!
//! The PDF structure comes from lopdf, image streams are decoded with the
//! `image` crate and JPEG internals are read by the marker scanner. A failure
//! to decode one image only affects that image record.

use image::{ColorType, DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use tracing::{debug, warn};

use super::icc;
use super::jpeg_markers::{scan_markers, JpegMarkers};
use super::properties::{
    bits_per_component, compression_ratio, CodecMetadata, ImageRecord, MetaValue, PageMode,
    PageRecord, PdfImageAttributes, PropertyDocument, StreamAttributes,
};
use super::quant_tables::estimate_jpeg_quality;
use super::tools::{self, ExternalTools};
use crate::error::ExtractionError;

/// Document information keys and the names they get in the property document.
const INFO_KEYS: &[(&[u8], &str)] = &[
    (b"Title", "title"),
    (b"Author", "author"),
    (b"Subject", "subject"),
    (b"Keywords", "keywords"),
    (b"Creator", "creator"),
    (b"Producer", "producer"),
    (b"CreationDate", "creationDate"),
    (b"ModDate", "modDate"),
    (b"Trapped", "trapped"),
];

/// Options for [`extract`]
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub tools: ExternalTools,
}

/// Build the property document for one PDF file.
///
/// # Arguments
/// * `path` - PDF file to read
/// * `options` - Optional external tools to run on the file
///
/// # Returns
/// The property document, or an error when the file cannot be read or parsed.
/// Images that fail to decode are recorded in the document instead.
pub fn extract(path: &Path, options: &ExtractOptions) -> Result<PropertyDocument, ExtractionError> {
    let file_size = fs::metadata(path)?.len();

    // lopdf can panic on badly damaged files
    let path_clone = path.to_path_buf();
    let loaded = panic::catch_unwind(AssertUnwindSafe(|| Document::load(&path_clone)))
        .map_err(|_| ExtractionError::Panic)?;
    let doc = loaded?;

    let mut properties = panic::catch_unwind(AssertUnwindSafe(|| describe_document(&doc, path, file_size)))
        .map_err(|_| ExtractionError::Panic)??;

    if let Some(tool) = &options.tools.pdfinfo {
        match tools::pdfinfo(tool, path) {
            Ok(info) => properties.pdfinfo = Some(info),
            Err(e) => warn!(file = %path.display(), "pdfinfo failed: {}", e),
        }
    }
    if let Some(tool) = &options.tools.pdfimages {
        match tools::pdfimages_list(tool, path) {
            Ok(rows) => properties.pdfimages = Some(rows),
            Err(e) => warn!(file = %path.display(), "pdfimages failed: {}", e),
        }
    }

    Ok(properties)
}

fn describe_document(doc: &Document, path: &Path, file_size: u64) -> Result<PropertyDocument, ExtractionError> {
    let catalog = doc.catalog().map_err(|_| ExtractionError::MissingCatalog)?;

    let page_mode = match catalog.get(b"PageMode").map(|obj| resolve(doc, obj)) {
        Ok(Object::Name(name)) => PageMode::Explicit(String::from_utf8_lossy(name).into_owned()),
        _ => PageMode::Undefined,
    };

    let pages: Vec<PageRecord> = doc
        .get_pages()
        .values()
        .map(|page_id| PageRecord {
            images: page_images(doc, *page_id)
                .into_iter()
                .map(|(image_id, stream)| describe_image(doc, image_id, stream))
                .collect(),
        })
        .collect();

    debug!(file = %path.display(), pages = pages.len(), "extracted page tree");

    Ok(PropertyDocument {
        file_path: path.display().to_string(),
        file_size,
        metadata: document_metadata(doc),
        page_mode,
        signature_flags: Some(signature_flags(doc, catalog)),
        page_count: pages.len(),
        pages,
        pdfinfo: None,
        pdfimages: None,
    })
}

static NULL_OBJECT: Object = Object::Null;

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(&NULL_OBJECT),
        other => other,
    }
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, object) {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

fn name_of(doc: &Document, object: &Object) -> Option<String> {
    match resolve(doc, object) {
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

/// Decode a PDF text string: UTF-16BE with BOM, UTF-8 with BOM, else Latin-1.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        String::from_utf8_lossy(rest).into_owned()
    } else {
        bytes.iter().map(|b| char::from(*b)).collect()
    }
}

fn document_metadata(doc: &Document) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert("format".to_string(), format!("PDF {}", doc.version));

    let info = doc.trailer.get(b"Info").ok().and_then(|obj| resolve_dict(doc, obj));
    for (key, name) in INFO_KEYS {
        let value = info
            .and_then(|dict| dict.get(key).ok())
            .map(|obj| match resolve(doc, obj) {
                Object::String(bytes, _) => decode_text(bytes),
                Object::Name(name) => String::from_utf8_lossy(name).into_owned(),
                Object::Boolean(b) => b.to_string(),
                _ => String::new(),
            })
            .unwrap_or_default();
        metadata.insert(name.to_string(), value);
    }

    let encryption = doc
        .trailer
        .get(b"Encrypt")
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
        .and_then(|dict| dict.get(b"Filter").ok())
        .and_then(|obj| name_of(doc, obj))
        .unwrap_or_else(|| "None".to_string());
    metadata.insert("encryption".to_string(), encryption);

    metadata
}

fn signature_flags(doc: &Document, catalog: &Dictionary) -> i64 {
    catalog
        .get(b"AcroForm")
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
        .and_then(|form| form.get(b"SigFlags").ok())
        .and_then(|obj| resolve(doc, obj).as_i64().ok())
        .unwrap_or(0)
}

/// Page resources, inherited from ancestors in the page tree when absent.
fn page_resources<'a>(doc: &'a Document, page_id: ObjectId) -> Option<&'a Dictionary> {
    let mut current = Some(page_id);
    let mut visited = HashSet::new();
    while let Some(id) = current {
        if !visited.insert(id) {
            break;
        }
        let dict = match doc.get_object(id) {
            Ok(Object::Dictionary(dict)) => dict,
            _ => break,
        };
        if let Some(resources) = dict.get(b"Resources").ok().and_then(|obj| resolve_dict(doc, obj)) {
            return Some(resources);
        }
        current = match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => Some(*parent),
            _ => None,
        };
    }
    None
}

/// Image XObjects reachable from a page, in resource dictionary order.
fn page_images(doc: &Document, page_id: ObjectId) -> Vec<(ObjectId, &Stream)> {
    let mut images = Vec::new();
    let mut seen = HashSet::new();
    if let Some(resources) = page_resources(doc, page_id) {
        collect_images(doc, resources, &mut images, &mut seen);
    }
    images
}

fn collect_images<'a>(
    doc: &'a Document,
    resources: &'a Dictionary,
    images: &mut Vec<(ObjectId, &'a Stream)>,
    seen: &mut HashSet<ObjectId>,
) {
    let xobjects = match resources.get(b"XObject").ok().and_then(|obj| resolve_dict(doc, obj)) {
        Some(dict) => dict,
        None => return,
    };

    for (_, value) in xobjects.iter() {
        let id = match value {
            Object::Reference(id) => *id,
            _ => continue,
        };
        if !seen.insert(id) {
            continue;
        }
        let stream = match doc.get_object(id) {
            Ok(Object::Stream(stream)) => stream,
            _ => continue,
        };
        match stream.dict.get(b"Subtype").ok().and_then(|obj| name_of(doc, obj)).as_deref() {
            Some("Image") => images.push((id, stream)),
            Some("Form") => {
                if let Some(form_resources) = stream.dict.get(b"Resources").ok().and_then(|obj| resolve_dict(doc, obj)) {
                    collect_images(doc, form_resources, images, seen);
                }
            }
            _ => {}
        }
    }
}

fn integer_entry(doc: &Document, dict: &Dictionary, key: &[u8]) -> i64 {
    dict.get(key)
        .ok()
        .and_then(|obj| resolve(doc, obj).as_i64().ok())
        .unwrap_or(0)
}

/// Colour space family and alternate colour space of an image dictionary.
fn color_spaces(doc: &Document, dict: &Dictionary) -> (String, String) {
    let object = match dict.get(b"ColorSpace") {
        Ok(obj) => resolve(doc, obj),
        Err(_) => return (String::new(), String::new()),
    };

    match object {
        Object::Name(name) => (String::from_utf8_lossy(name).into_owned(), String::new()),
        Object::Array(items) => {
            let family = items.first().and_then(|obj| name_of(doc, obj)).unwrap_or_default();
            let alternate = match family.as_str() {
                "ICCBased" => items
                    .get(1)
                    .and_then(|obj| resolve_dict(doc, obj))
                    .map(|icc| {
                        icc.get(b"Alternate")
                            .ok()
                            .and_then(|obj| name_of(doc, obj))
                            .unwrap_or_else(|| match integer_entry(doc, icc, b"N") {
                                1 => "DeviceGray".to_string(),
                                4 => "DeviceCMYK".to_string(),
                                _ => "DeviceRGB".to_string(),
                            })
                    })
                    .unwrap_or_default(),
                "Indexed" => items.get(1).map(|obj| base_name(doc, obj)).unwrap_or_default(),
                "Separation" | "DeviceN" => items.get(2).map(|obj| base_name(doc, obj)).unwrap_or_default(),
                _ => String::new(),
            };
            (family, alternate)
        }
        _ => (String::new(), String::new()),
    }
}

fn base_name(doc: &Document, object: &Object) -> String {
    match resolve(doc, object) {
        Object::Name(name) => String::from_utf8_lossy(name).into_owned(),
        Object::Array(items) => items.first().and_then(|obj| name_of(doc, obj)).unwrap_or_default(),
        _ => String::new(),
    }
}

fn filter_chain(doc: &Document, dict: &Dictionary) -> String {
    match dict.get(b"Filter").map(|obj| resolve(doc, obj)) {
        Ok(Object::Name(name)) => String::from_utf8_lossy(name).into_owned(),
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|obj| name_of(doc, obj))
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

fn describe_image(doc: &Document, image_id: ObjectId, stream: &Stream) -> ImageRecord {
    let dict = &stream.dict;
    let (colorspace, altcolorspace) = color_spaces(doc, dict);

    let pdf = PdfImageAttributes {
        xref: image_id.0,
        width: integer_entry(doc, dict, b"Width"),
        height: integer_entry(doc, dict, b"Height"),
        bpc: integer_entry(doc, dict, b"BitsPerComponent"),
        colorspace,
        altcolorspace,
        filter: filter_chain(doc, dict),
    };

    let decoded = panic::catch_unwind(AssertUnwindSafe(|| match pdf.filter.as_str() {
        "" | "FlateDecode" => decode_raster(doc, stream, &pdf),
        _ => decode_stream(&stream.content),
    }))
    .unwrap_or_else(|_| Err("image decoder panicked".to_string()));

    match decoded {
        Ok(attributes) => ImageRecord {
            pdf,
            stream: Some(attributes),
            decode_error: None,
        },
        Err(error) => {
            debug!(xref = image_id.0, "image stream not decoded: {}", error);
            ImageRecord {
                pdf,
                stream: None,
                decode_error: Some(error),
            }
        }
    }
}

fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "JPEG".to_string(),
        ImageFormat::Png => "PNG".to_string(),
        ImageFormat::Tiff => "TIFF".to_string(),
        ImageFormat::Gif => "GIF".to_string(),
        ImageFormat::Bmp => "BMP".to_string(),
        other => format!("{:?}", other).to_uppercase(),
    }
}

/// Mode name for a decoder colour type.
pub fn mode_for_color_type(color_type: ColorType) -> &'static str {
    match color_type {
        ColorType::L8 => "L",
        ColorType::La8 => "LA",
        ColorType::Rgb8 => "RGB",
        ColorType::Rgba8 => "RGBA",
        ColorType::L16 => "I;16",
        ColorType::La16 => "LA;16",
        ColorType::Rgb16 => "RGB;16",
        ColorType::Rgba16 => "RGBA;16",
        ColorType::Rgb32F => "RGB;F",
        ColorType::Rgba32F => "RGBA;F",
        _ => "unknown",
    }
}

/// Mode name for a JPEG frame with the given number of components.
pub fn mode_for_jpeg_components(components: u8) -> &'static str {
    match components {
        1 => "L",
        3 => "RGB",
        4 => "CMYK",
        _ => "unknown",
    }
}

fn jpeg_metadata(markers: &JpegMarkers) -> Vec<(String, MetaValue)> {
    let mut items = Vec::new();
    if let Some(jfif) = markers.jfif {
        let version = (i64::from(jfif.version_major) << 8) | i64::from(jfif.version_minor);
        items.push(("jfif".to_string(), MetaValue::Int(version)));
        items.push((
            "jfif_version".to_string(),
            MetaValue::Pair(f64::from(jfif.version_major), f64::from(jfif.version_minor)),
        ));
        items.push(("jfif_unit".to_string(), MetaValue::Int(i64::from(jfif.unit))));
        items.push((
            "jfif_density".to_string(),
            MetaValue::Pair(f64::from(jfif.density_x), f64::from(jfif.density_y)),
        ));
    }
    if let Some((x, y)) = markers.dpi() {
        items.push(("dpi".to_string(), MetaValue::Pair(x, y)));
    }
    if let Some(transform) = markers.adobe_transform {
        items.push(("adobe_transform".to_string(), MetaValue::Int(i64::from(transform))));
    }
    if markers.frame.map(|f| f.is_progressive()).unwrap_or(false) {
        items.push(("progressive".to_string(), MetaValue::Int(1)));
        items.push(("progression".to_string(), MetaValue::Int(1)));
    }
    if let Some(exif) = &markers.exif {
        items.push(("exif".to_string(), MetaValue::Bytes(exif.clone())));
    }
    if let Some(icc) = markers.icc_profile() {
        items.push(("icc_profile".to_string(), MetaValue::Bytes(icc)));
    }
    items
}

/// Component count of a PDF colour space family.
fn colorspace_components(family: &str, alternate: &str) -> Option<u32> {
    match family {
        "DeviceGray" | "CalGray" | "Indexed" | "Separation" => Some(1),
        "DeviceRGB" | "CalRGB" | "Lab" => Some(3),
        "DeviceCMYK" => Some(4),
        "ICCBased" => colorspace_components(alternate, ""),
        _ => None,
    }
}

/// Describe an unfiltered or Flate-compressed pixel stream.
///
/// Such streams carry no container, so they are reported as the lossless
/// raster a PDF image export produces.
fn decode_raster(doc: &Document, stream: &Stream, pdf: &PdfImageAttributes) -> Result<StreamAttributes, String> {
    let components = colorspace_components(&pdf.colorspace, &pdf.altcolorspace)
        .ok_or_else(|| format!("unsupported colour space '{}'", pdf.colorspace))?;
    let width = u32::try_from(pdf.width).map_err(|_| "invalid image width".to_string())?;
    let height = u32::try_from(pdf.height).map_err(|_| "invalid image height".to_string())?;
    let bits = u32::try_from(pdf.bpc).unwrap_or(0);
    if width == 0 || height == 0 || !matches!(bits, 1 | 2 | 4 | 8 | 16) {
        return Err(format!("invalid raster {}x{} at {} bits", width, height, pdf.bpc));
    }

    let pixels = if pdf.filter.is_empty() {
        stream.content.clone()
    } else {
        stream.decompressed_content().map_err(|e| e.to_string())?
    };
    let row_bytes = (u64::from(width) * u64::from(components) * u64::from(bits)).div_ceil(8);
    if (pixels.len() as u64) < row_bytes * u64::from(height) {
        return Err("pixel data is shorter than the declared raster".to_string());
    }

    let mode = match (pdf.colorspace.as_str(), components, bits) {
        ("Indexed", _, _) => "P",
        (_, 1, 1) => "1",
        (_, 1, 16) => "I;16",
        (_, 1, _) => "L",
        (_, 3, 16) => "RGB;16",
        (_, 3, _) => "RGB",
        (_, _, 16) => "CMYK;16",
        _ => "CMYK",
    };
    let bpc = bits_per_component(mode, components);

    let identity = match stream.dict.get(b"ColorSpace").map(|obj| resolve(doc, obj)) {
        Ok(Object::Array(items)) if pdf.colorspace == "ICCBased" => items
            .get(1)
            .map(|obj| resolve(doc, obj))
            .and_then(|obj| match obj {
                Object::Stream(icc_stream) if icc_stream.dict.has(b"Filter") => {
                    icc_stream.decompressed_content().ok()
                }
                Object::Stream(icc_stream) => Some(icc_stream.content.clone()),
                _ => None,
            })
            .and_then(|bytes| icc::identify(&bytes)),
        _ => None,
    };

    Ok(StreamAttributes {
        format: "PNG".to_string(),
        width,
        height,
        mode: mode.to_string(),
        components,
        bpc,
        compression_ratio: compression_ratio(stream.content.len(), bpc, components, width, height),
        metadata: CodecMetadata::default(),
        icc_profile_name: identity.as_ref().map(|id| id.name.clone()),
        icc_profile_description: identity.map(|id| id.description),
        jpeg_quality: None,
    })
}

/// Decode an encoded image stream and describe it.
fn decode_stream(data: &[u8]) -> Result<StreamAttributes, String> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| e.to_string())?;
    let format = reader.format().ok_or_else(|| "unrecognised image format".to_string())?;

    let mut decoder = reader.into_decoder().map_err(|e| e.to_string())?;
    let (width, height) = decoder.dimensions();
    let color_type = decoder.color_type();
    let decoder_icc = decoder.icc_profile().ok().flatten();
    DynamicImage::from_decoder(decoder).map_err(|e| e.to_string())?;

    let markers = if format == ImageFormat::Jpeg {
        scan_markers(data).ok()
    } else {
        None
    };

    let (mode, components) = match markers.as_ref().and_then(|m| m.frame) {
        Some(frame) => (mode_for_jpeg_components(frame.components), u32::from(frame.components)),
        None => (mode_for_color_type(color_type), u32::from(color_type.channel_count())),
    };
    let bpc = bits_per_component(mode, components);

    let mut raw_metadata = markers.as_ref().map(jpeg_metadata).unwrap_or_default();
    if markers.is_none() {
        if let Some(icc) = &decoder_icc {
            raw_metadata.push(("icc_profile".to_string(), MetaValue::Bytes(icc.clone())));
        }
    }

    let icc_bytes = decoder_icc.or_else(|| markers.as_ref().and_then(|m| m.icc_profile()));
    let identity = icc_bytes.as_deref().and_then(icc::identify);

    let jpeg_quality = if format == ImageFormat::Jpeg {
        estimate_jpeg_quality(data).ok()
    } else {
        None
    };

    Ok(StreamAttributes {
        format: format_name(format),
        width,
        height,
        mode: mode.to_string(),
        components,
        bpc,
        compression_ratio: compression_ratio(data.len(), bpc, components, width, height),
        metadata: CodecMetadata::from_raw(raw_metadata),
        icc_profile_name: identity.as_ref().map(|id| id.name.clone()),
        icc_profile_description: identity.map(|id| id.description),
        jpeg_quality,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_utf16() {
        let bytes = [0xFE, 0xFF, 0x00, 0x4B, 0x00, 0xE9];
        assert_eq!(decode_text(&bytes), "Ké");
    }

    #[test]
    fn test_decode_text_latin1() {
        assert_eq!(decode_text(b"Caf\xe9"), "Café");
    }

    #[test]
    fn test_mode_mapping() {
        assert_eq!(mode_for_color_type(ColorType::Rgb8), "RGB");
        assert_eq!(mode_for_color_type(ColorType::L8), "L");
        assert_eq!(mode_for_jpeg_components(4), "CMYK");
        assert_eq!(mode_for_jpeg_components(2), "unknown");
    }

    #[test]
    fn test_garbage_stream_is_a_decode_error() {
        assert!(decode_stream(b"definitely not an image").is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = extract(Path::new("/nonexistent/file.pdf"), &ExtractOptions::default());
        assert!(matches!(result, Err(ExtractionError::Io(_))));
    }
}
