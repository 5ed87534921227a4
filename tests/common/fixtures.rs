#![allow(dead_code)]

use std::io::Cursor;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use tiff::encoder::{colortype, TiffEncoder};
use pillcount::core::db::{NewPatient, NewSupplement, PatientRepository, PillDb};
use pillcount::{BoundingBox, Detection};

use super::{PatientRef, SupplementRef};

/// Encodes an image in the given format, the way an upload would arrive.
pub fn encode_bytes(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, format)
        .expect("Failed to encode test image");
    buf.into_inner()
}

pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    encode_bytes(image, ImageFormat::Png)
}

/// Four-channel ink-separated TIFF; `image` decodes it by converting to RGB
pub fn cmyk_tiff(width: u32, height: u32) -> Vec<u8> {
    let data = [0u8, 160, 255, 20].repeat((width * height) as usize);
    let mut buf = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buf).expect("Failed to create TIFF encoder");
        encoder
            .write_image::<colortype::CMYK8>(width, height, &data)
            .expect("Failed to encode CMYK TIFF");
    }
    buf.into_inner()
}

/// Baseline JPEG with four components (Adobe transform 0), 112x112
pub const CMYK_JPEG: &[u8] = include_bytes!("../fixtures/cmyk_112.jpg");

/// Solid light-gray photo of the given size
pub fn blank_photo(width: u32, height: u32) -> Vec<u8> {
    let img: RgbImage = ImageBuffer::from_pixel(width, height, Rgb([230u8, 230u8, 230u8]));
    png_bytes(&DynamicImage::ImageRgb8(img))
}

/// White 800x800 tray with dark pills of radius 40 drawn at the given centers.
pub fn pill_photo(centers: &[(i32, i32)]) -> Vec<u8> {
    let mut img: RgbImage = ImageBuffer::from_pixel(800, 800, Rgb([250u8, 250u8, 250u8]));
    for &center in centers {
        draw_filled_circle_mut(&mut img, center, 40, Rgb([40u8, 30u8, 120u8]));
    }
    png_bytes(&DynamicImage::ImageRgb8(img))
}

/// Five well separated pills, none near the frame edge
pub const FIVE_PILLS: [(i32, i32); 5] = [(150, 150), (400, 150), (650, 150), (150, 450), (400, 450)];

pub fn det(confidence: f64) -> Detection {
    Detection::new(
        BoundingBox {
            x1: 10.0,
            y1: 10.0,
            x2: 40.0,
            y2: 40.0,
        },
        confidence,
        0,
    )
}

pub fn dets(confidences: &[f64]) -> Vec<Detection> {
    confidences.iter().copied().map(det).collect()
}

/// Creates a PillDb in a temporary directory.
/// Returns both the database and the temp directory (which must be kept alive).
pub async fn create_test_db() -> (PillDb, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let db = PillDb::open(dir.path().join("test.db"))
        .await
        .expect("Failed to open test database");
    (db, dir)
}

/// Registers one patient with one supplement bottle
pub async fn seed_patient(
    db: &PillDb,
    name: &str,
    barcode: &str,
) -> anyhow::Result<(PatientRef, SupplementRef)> {
    let patient = db
        .add_patient(&NewPatient {
            name: name.to_string(),
            metadata: None,
        })
        .await?;
    let supplement = db
        .add_supplement(&NewSupplement {
            barcode: barcode.to_string(),
            patient: patient.id,
            kind: "iron-folate".to_string(),
        })
        .await?;
    Ok((patient.id, supplement.id))
}
