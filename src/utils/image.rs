use std::io::Cursor;
use image::{imageops, GrayImage, ImageError, ImageFormat, RgbImage};
use ndarray::Array2;
use crate::utils::coordinate::BoundingBox;

/// decode_image decodes an encoded image (PNG, JPEG, ...) into canonical RGB order.
///
/// Grayscale and alpha sources are converted, so every stage downstream can
/// rely on three RGB channels.
///
/// # Arguments
/// * `im_bytes` - encoded image bytes
///
/// # Returns
/// * `Result<RgbImage, ImageError>`
pub fn decode_image(im_bytes: &[u8]) -> Result<RgbImage, ImageError> {
    let img = image::load_from_memory(im_bytes)?;
    Ok(img.to_rgb8())
}

pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, ImageError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

pub fn decode_png(im_bytes: &[u8]) -> Result<RgbImage, ImageError> {
    let img = image::load_from_memory_with_format(im_bytes, ImageFormat::Png)?;
    Ok(img.to_rgb8())
}

/// gray_to_array copies a grayscale image into a `(rows, cols)` matrix.
pub fn gray_to_array(gray: &GrayImage) -> Array2<f64> {
    let (width, height) = gray.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        gray.get_pixel(x as u32, y as u32).0[0] as f64
    })
}

pub fn to_gray_array(img: &RgbImage) -> Array2<f64> {
    gray_to_array(&imageops::grayscale(img))
}

/// crop_region copies the pixels inside `bbox`, whose corners are expected to
/// be integral and inside the image.
pub fn crop_region(img: &RgbImage, bbox: &BoundingBox) -> RgbImage {
    let x = bbox.x1.max(0.0) as u32;
    let y = bbox.y1.max(0.0) as u32;
    let w = bbox.width().max(0.0) as u32;
    let h = bbox.height().max(0.0) as u32;
    imageops::crop_imm(img, x, y, w, h).to_image()
}
