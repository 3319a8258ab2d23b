//! Fixture builders shared by the integration tests

#![allow(dead_code)]

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};
use std::fs;
use std::path::Path;

pub const SCHEMA_85: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron" queryBinding="xslt">
  <sch:pattern id="document">
    <sch:rule context="/properties">
      <sch:assert test="noPages &gt; 0">document has no pages</sch:assert>
      <sch:assert test="PageMode != ''">page mode missing</sch:assert>
    </sch:rule>
  </sch:pattern>
  <sch:pattern id="images">
    <sch:rule context="//image/stream">
      <sch:assert test="format = 'JPEG'">image is not a JPEG</sch:assert>
      <sch:assert test="JPEGQuality = 85">expected JPEG quality 85, found <sch:value-of select="JPEGQuality"/></sch:assert>
    </sch:rule>
  </sch:pattern>
</sch:schema>
"#;

pub const PROFILE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<profile>
  <schema type="parentDirName" match="is" pattern="300ppi-85">pdf-85.sch</schema>
</profile>
"#;

/// Encode a gradient test image as JPEG.
pub fn jpeg_bytes(width: u32, height: u32, quality: u8) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 4 % 256) as u8, (y * 4 % 256) as u8, ((x + y) * 2 % 256) as u8])
    });
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&image)
        .unwrap();
    out
}

/// Write a one-page PDF showing `jpeg` as a DCTDecode image.
pub fn write_pdf_with_jpeg(path: &Path, jpeg: &[u8], width: u32, height: u32) {
    write_pdf_with_image(path, jpeg, width, height, "DeviceRGB", 8, Some("DCTDecode"));
}

/// Write a one-page PDF showing `data` as an image stream.
pub fn write_pdf_with_image(
    path: &Path,
    data: &[u8],
    width: u32,
    height: u32,
    colorspace: &str,
    bits_per_component: i64,
    filter: Option<&str>,
) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut image_dict = Dictionary::new();
    image_dict.set("Type", Object::Name(b"XObject".to_vec()));
    image_dict.set("Subtype", Object::Name(b"Image".to_vec()));
    image_dict.set("Width", Object::Integer(i64::from(width)));
    image_dict.set("Height", Object::Integer(i64::from(height)));
    image_dict.set("ColorSpace", Object::Name(colorspace.as_bytes().to_vec()));
    image_dict.set("BitsPerComponent", Object::Integer(bits_per_component));
    if let Some(filter) = filter {
        image_dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));
    }
    let image_id = doc.add_object(Stream::new(image_dict, data.to_vec()).with_compression(false));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Integer(i64::from(width)),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(i64::from(height)),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im1".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));

    let mut xobjects = Dictionary::new();
    xobjects.set("Im1", Object::Reference(image_id));
    let mut resources = Dictionary::new();
    resources.set("XObject", Object::Dictionary(xobjects));

    let mut page = Dictionary::new();
    page.set("Type", Object::Name(b"Page".to_vec()));
    page.set("Parent", Object::Reference(pages_id));
    page.set("Contents", Object::Reference(content_id));
    page.set("Resources", Object::Dictionary(resources));
    page.set(
        "MediaBox",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(i64::from(width)),
            Object::Integer(i64::from(height)),
        ]),
    );
    let page_id = doc.add_object(page);

    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
    pages.set("Count", Object::Integer(1));
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    catalog.set("PageMode", Object::Name(b"UseThumbs".to_vec()));
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut info = Dictionary::new();
    info.set("Title", Object::string_literal("Scan 0001"));
    info.set("Producer", Object::string_literal("fixture builder"));
    let info_id = doc.add_object(info);
    doc.trailer.set("Info", Object::Reference(info_id));

    doc.save(path).unwrap();
}

/// Profile and schema directories for the `300ppi-85` rule.
pub fn write_profile(root: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let profiles_dir = root.join("profiles");
    let schemas_dir = root.join("schemas");
    fs::create_dir_all(&profiles_dir).unwrap();
    fs::create_dir_all(&schemas_dir).unwrap();
    fs::write(profiles_dir.join("kb.xml"), PROFILE).unwrap();
    fs::write(schemas_dir.join("pdf-85.sch"), SCHEMA_85).unwrap();
    (profiles_dir, schemas_dir)
}
