//! Turns an issue's stored pages into a single PDF.
//!
//! JPEG pages in 8-bit gray or RGB are embedded as-is (`DCTDecode`), anything else is
//! decoded and re-encoded as an RGB JPEG first. Output page order is always the
//! page number order.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use chrono::Local;
use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, DynamicImage, ImageDecoder, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tokio::fs;
use tokio::task::spawn_blocking;
use tracing::warn;

use crate::issue::IssueId;
use crate::storage::PageStore;
use crate::{info_time, Result, START_PAGE};

const POINTS_PER_INCH: f32 = 72.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Assembly {
    Written { path: PathBuf, pages: usize },
    NoPages,
}

/// Builds `{out_dir}/{issue}.pdf` from the stored pages `1..=page_count` of `issue`.
///
/// Returns [`Assembly::NoPages`] without creating a file when `page_count` is 0. A page
/// missing from storage fails the assembly; pages past `page_count` are ignored.
pub async fn assemble(
    store: &PageStore,
    issue: &IssueId,
    page_count: usize,
    out_dir: &Path,
    resolution_dpi: f32,
) -> Result<Assembly> {
    let start_time = Local::now();
    if page_count == 0 {
        warn!("No images DL'd for issue {issue} - check issue number!");
        return Ok(Assembly::NoPages);
    }

    let mut pages = Vec::with_capacity(page_count);
    for page_num in START_PAGE..START_PAGE + page_count {
        pages.push(fs::read(store.page_path(issue, page_num)).await?);
    }

    fs::create_dir_all(out_dir).await?;
    let pdf_path = out_dir.join(format!("{issue}.pdf"));

    // Decoding and PDF serialisation are CPU-bound.
    spawn_blocking({
        let pdf_path = pdf_path.clone();
        move || -> Result<()> {
            let mut doc = build_document(&pages, resolution_dpi)?;
            doc.save(&pdf_path)?;
            Ok(())
        }
    })
    .await??;

    info_time!(
        start_time,
        "saved {} pages for issue {} to {}",
        page_count,
        issue,
        pdf_path.display()
    );
    Ok(Assembly::Written {
        path: pdf_path,
        pages: page_count,
    })
}

/// One PDF page per image, in the given order.
pub fn build_document(pages: &[Vec<u8>], resolution_dpi: f32) -> Result<Document> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for bytes in pages {
        let page_id = add_image_page(&mut doc, pages_id, bytes, resolution_dpi)?;
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    Ok(doc)
}

fn add_image_page(
    doc: &mut Document,
    pages_id: ObjectId,
    bytes: &[u8],
    resolution_dpi: f32,
) -> Result<ObjectId> {
    let page_image = PageImage::from_bytes(bytes)?;

    let width = page_image.width as f32 * POINTS_PER_INCH / resolution_dpi;
    let height = page_image.height as f32 * POINTS_PER_INCH / resolution_dpi;

    let image_id = doc.add_object(
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => page_image.width as i64,
                "Height" => page_image.height as i64,
                "ColorSpace" => page_image.color_space,
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            page_image.jpeg,
        )
        .with_compression(false),
    );

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0.into(),
                    0.into(),
                    height.into(),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec!["Im0".into()]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im0" => image_id,
            },
        },
    });
    Ok(page_id)
}

/// A JPEG ready to be embedded, with the properties the PDF image dictionary needs.
struct PageImage {
    width: u32,
    height: u32,
    color_space: &'static str,
    jpeg: Vec<u8>,
}

impl PageImage {
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if image::guess_format(bytes)? == ImageFormat::Jpeg {
            let decoder = JpegDecoder::new(Cursor::new(bytes))?;
            let (width, height) = decoder.dimensions();
            // The decoder reports CMYK/YCCK input as RGB, so the frame header decides.
            let color_space = match (jpeg_components(bytes), decoder.color_type()) {
                (Some(1), ColorType::L8) => Some("DeviceGray"),
                (Some(3), ColorType::Rgb8) => Some("DeviceRGB"),
                _ => None,
            };
            if let Some(color_space) = color_space {
                return Ok(Self {
                    width,
                    height,
                    color_space,
                    jpeg: bytes.to_vec(),
                });
            }
        }
        Self::reencode(bytes)
    }

    fn reencode(bytes: &[u8]) -> Result<Self> {
        let rgb = image::load_from_memory(bytes)?.to_rgb8();
        let (width, height) = rgb.dimensions();
        let mut jpeg = Vec::new();
        DynamicImage::ImageRgb8(rgb).write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)?;
        Ok(Self {
            width,
            height,
            color_space: "DeviceRGB",
            jpeg,
        })
    }
}

/// Number of colour components declared in the JPEG's frame (SOFn) header.
fn jpeg_components(bytes: &[u8]) -> Option<u8> {
    const SOI: [u8; 2] = [0xFF, 0xD8];
    if !bytes.starts_with(&SOI) {
        return None;
    }

    let mut pos = SOI.len();
    loop {
        // Markers may be padded with any number of 0xFF fill bytes.
        if *bytes.get(pos)? != 0xFF {
            return None;
        }
        while *bytes.get(pos)? == 0xFF {
            pos += 1;
        }
        let marker = *bytes.get(pos)?;
        pos += 1;

        match marker {
            // Standalone markers carry no length.
            0x01 | 0xD0..=0xD7 => continue,
            // End of image or start of scan before any frame header.
            0xD9 | 0xDA => return None,
            _ => {}
        }

        let len = u16::from_be_bytes([*bytes.get(pos)?, *bytes.get(pos + 1)?]) as usize;
        // SOF0..SOF15 except DHT (C4), JPG (C8) and DAC (CC):
        // length(2) precision(1) height(2) width(2) components(1)
        if matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            return bytes.get(pos + 7).copied();
        }
        if len < 2 {
            return None;
        }
        pos += len;
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{image_widths, jpeg};
    use super::*;
    use crate::Error;

    #[test]
    fn document_keeps_input_order() {
        let pages = vec![jpeg(30, 10), jpeg(10, 10), jpeg(20, 10)];
        let doc = build_document(&pages, 100.0).unwrap();
        assert_eq!(image_widths(&doc), vec![30, 10, 20]);
    }

    #[test]
    fn page_size_follows_resolution() {
        let doc = build_document(&[jpeg(200, 100)], 100.0).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let media_box = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"MediaBox")
            .and_then(Object::as_array)
            .unwrap();
        let width = media_box[2].as_float().unwrap();
        let height = media_box[3].as_float().unwrap();
        assert!((width - 144.0).abs() < 0.01);
        assert!((height - 72.0).abs() < 0.01);
    }

    /// Smallest header that carries a baseline frame with `components` channels.
    fn frame_header(components: u8) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8];
        // APP14 "Adobe" segment, as written in front of CMYK/YCCK frames
        bytes.extend_from_slice(&[0xFF, 0xEE, 0x00, 0x0E]);
        bytes.extend_from_slice(b"Adobe");
        bytes.extend_from_slice(&[0x00, 0x64, 0x00, 0x00, 0x00, 0x00, 0x02]);
        // padded SOF0: precision 8, 16x8 px
        bytes.extend_from_slice(&[0xFF, 0xFF, 0xC0]);
        let len = 8 + 3 * components as u16;
        bytes.extend_from_slice(&len.to_be_bytes());
        bytes.extend_from_slice(&[0x08, 0x00, 0x08, 0x00, 0x10, components]);
        for id in 1..=components {
            bytes.extend_from_slice(&[id, 0x11, 0x00]);
        }
        bytes.extend_from_slice(&[0xFF, 0xD9]);
        bytes
    }

    #[test]
    fn frame_header_reports_component_count() {
        assert_eq!(jpeg_components(&jpeg(8, 8)), Some(3));
        assert_eq!(jpeg_components(&frame_header(4)), Some(4));
        assert_eq!(jpeg_components(&frame_header(1)), Some(1));
        assert_eq!(jpeg_components(b"not a jpeg"), None);
        assert_eq!(jpeg_components(&[0xFF, 0xD8, 0xFF, 0xD9]), None);
        // truncated inside the frame header
        assert_eq!(jpeg_components(&frame_header(4)[..22]), None);
    }

    #[test]
    fn gray_and_rgb_jpegs_are_embedded_unchanged() {
        let rgb = jpeg(8, 8);
        let page = PageImage::from_bytes(&rgb).unwrap();
        assert_eq!(page.color_space, "DeviceRGB");
        assert_eq!(page.jpeg, rgb);

        let mut gray = Vec::new();
        image::GrayImage::new(8, 8)
            .write_to(&mut Cursor::new(&mut gray), ImageFormat::Jpeg)
            .unwrap();
        let page = PageImage::from_bytes(&gray).unwrap();
        assert_eq!(page.color_space, "DeviceGray");
        assert_eq!(page.jpeg, gray);
    }

    #[test]
    fn cmyk_jpeg_is_never_passed_through() {
        let cmyk = frame_header(4);
        assert_eq!(jpeg_components(&cmyk), Some(4));
        // Header only, so decoding may fail; it must just never be embedded verbatim.
        if let Ok(page) = PageImage::from_bytes(&cmyk) {
            assert_ne!(page.jpeg, cmyk);
        }
    }

    #[test]
    fn non_jpeg_pages_are_reencoded() {
        let img = image::GrayAlphaImage::new(8, 4);
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let page = PageImage::from_bytes(&png).unwrap();
        assert_eq!((page.width, page.height), (8, 4));
        assert_eq!(page.color_space, "DeviceRGB");
        assert_eq!(image::guess_format(&page.jpeg).unwrap(), ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn assembles_stored_pages_in_page_order() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PageStore::new(tmp.path().join("tmp"));
        store.ensure_dir().await.unwrap();
        let out_dir = tmp.path().join("out");
        let issue = IssueId::new(4000, "l").unwrap();

        // Written out of order on purpose; widths mark the page number.
        for page_num in [3, 1, 2] {
            store
                .write_page(&issue, page_num, &jpeg(page_num as u32 * 10, 8))
                .await
                .unwrap();
        }

        let assembly = assemble(&store, &issue, 3, &out_dir, 100.0).await.unwrap();
        let path = out_dir.join("4000l.pdf");
        assert_eq!(
            assembly,
            Assembly::Written {
                path: path.clone(),
                pages: 3
            }
        );

        let doc = Document::load(&path).unwrap();
        assert_eq!(image_widths(&doc), vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn pages_past_the_count_are_left_out() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PageStore::new(tmp.path().join("tmp"));
        store.ensure_dir().await.unwrap();
        let out_dir = tmp.path().join("out");
        let issue = IssueId::new(4003, "l").unwrap();

        for page_num in [1, 2, 5] {
            store
                .write_page(&issue, page_num, &jpeg(page_num as u32 * 10, 8))
                .await
                .unwrap();
        }

        let assembly = assemble(&store, &issue, 2, &out_dir, 100.0).await.unwrap();

        assert!(matches!(assembly, Assembly::Written { pages: 2, .. }));
        let doc = Document::load(out_dir.join("4003l.pdf")).unwrap();
        assert_eq!(image_widths(&doc), vec![10, 20]);
    }

    #[tokio::test]
    async fn missing_page_within_the_count_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PageStore::new(tmp.path());
        let issue = IssueId::new(4004, "l").unwrap();
        store.write_page(&issue, 1, &jpeg(10, 8)).await.unwrap();
        store.write_page(&issue, 3, &jpeg(30, 8)).await.unwrap();

        let result = assemble(&store, &issue, 3, &tmp.path().join("out"), 100.0).await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert!(!tmp.path().join("out").join("4004l.pdf").exists());
    }

    #[tokio::test]
    async fn no_pages_creates_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PageStore::new(tmp.path().join("tmp"));
        let out_dir = tmp.path().join("out");
        let issue = IssueId::new(4001, "l").unwrap();

        let assembly = assemble(&store, &issue, 0, &out_dir, 100.0).await.unwrap();

        assert_eq!(assembly, Assembly::NoPages);
        assert!(!out_dir.join("4001l.pdf").exists());
    }

    #[tokio::test]
    async fn undecodable_page_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PageStore::new(tmp.path());
        let issue = IssueId::new(4002, "l").unwrap();
        store
            .write_page(&issue, 1, b"<html>not an image</html>")
            .await
            .unwrap();

        let result = assemble(&store, &issue, 1, &tmp.path().join("out"), 100.0).await;
        assert!(matches!(result, Err(Error::Image(_))));
    }
}
