use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detection::preprocessing::NormalizedImage;
use crate::models::Detection;

const BOX_COLOR: Rgb<u8> = Rgb([0, 220, 0]);
const BOX_THICKNESS: i32 = 2;

/// Draw detection boxes over a copy of the normalized image
pub fn annotate(image: &NormalizedImage, detections: &[Detection]) -> RgbImage {
    let mut canvas = image.as_rgb().clone();
    let (width, height) = canvas.dimensions();

    for detection in detections {
        let bbox = detection.bbox;
        let x1 = bbox.x1.floor().max(0.0) as i32;
        let y1 = bbox.y1.floor().max(0.0) as i32;
        let x2 = (bbox.x2.ceil() as i32).min(width as i32);
        let y2 = (bbox.y2.ceil() as i32).min(height as i32);

        for inset in 0..BOX_THICKNESS {
            let w = x2 - x1 - 2 * inset;
            let h = y2 - y1 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
        }
    }

    canvas
}
