//! Image re-encoding for the model request and for scan thumbnails.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage, load_from_memory};

use crate::error::ScanResult;

/// Re-encodes an uploaded image as a JPEG `data:` URL.
pub fn jpeg_data_url(bytes: &[u8], quality: u8) -> ScanResult<String> {
    let img = load_from_memory(bytes)?;
    encode_jpeg(&flatten(&img), quality)
}

/// Thumbnail fitting a `size`×`size` box, aspect ratio kept, as a JPEG
/// `data:` URL.
pub fn thumbnail_data_url(bytes: &[u8], size: u32, quality: u8) -> ScanResult<String> {
    let img = load_from_memory(bytes)?.thumbnail(size, size);
    encode_jpeg(&flatten(&img), quality)
}

/// Drops the alpha channel by compositing over white.
fn flatten(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let mut background =
        image::RgbaImage::from_pixel(rgba.width(), rgba.height(), image::Rgba([255, 255, 255, 255]));
    image::imageops::overlay(&mut background, &rgba, 0, 0);
    DynamicImage::ImageRgba8(background).to_rgb8()
}

fn encode_jpeg(rgb: &RgbImage, quality: u8) -> ScanResult<String> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(rgb)?;
    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(buf)))
}
