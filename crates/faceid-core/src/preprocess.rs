//! Glue between raw request bytes and the capabilities: payload decoding,
//! face selection, crop and normalization.

use std::borrow::Cow;

use base64::{engine::general_purpose, Engine as _};
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::capability::InputSpec;
use crate::error::EngineError;
use crate::types::BoundingBox;

/// Resized face crop in planar CHW RGB order, already scaled per [`InputSpec`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCrop {
    pub size: u32,
    /// `3 * size * size` values: all R, then all G, then all B.
    pub data: Vec<f32>,
}

impl NormalizedCrop {
    pub fn value(&self, channel: usize, y: usize, x: usize) -> f32 {
        let s = self.size as usize;
        self.data[channel * s * s + y * s + x]
    }
}

/// Accept raw encoded image bytes, a `data:` URL or bare base64 text.
pub fn decode_payload(payload: &[u8]) -> Result<Cow<'_, [u8]>, EngineError> {
    if image::guess_format(payload).is_ok() {
        return Ok(Cow::Borrowed(payload));
    }

    let text = std::str::from_utf8(payload)
        .map_err(|_| EngineError::InvalidImage("unrecognized binary image format".into()))?
        .trim();

    // "data:image/jpeg;base64,<payload>" → "<payload>"
    let encoded = match text.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| EngineError::InvalidImage("data URL has no payload".into()))?,
        None => text,
    };

    general_purpose::STANDARD
        .decode(encoded.trim())
        .map(Cow::Owned)
        .map_err(|e| EngineError::InvalidImage(format!("invalid base64 payload: {e}")))
}

/// Decode a request payload into an RGB image.
pub fn decode_image(payload: &[u8]) -> Result<RgbImage, EngineError> {
    let bytes = decode_payload(payload)?;
    let image = image::load_from_memory(&bytes)
        .map_err(|e| EngineError::InvalidImage(e.to_string()))?;
    Ok(image.to_rgb8())
}

/// Largest box by area; exact ties keep the earliest.
pub fn select_largest(faces: &[BoundingBox]) -> Option<&BoundingBox> {
    let mut best: Option<&BoundingBox> = None;
    for face in faces {
        match best {
            Some(current) if face.area() <= current.area() => {}
            _ => best = Some(face),
        }
    }
    best
}

/// Crop `face` out of `image`, resize to the extractor's square input and
/// scale pixel values.
///
/// The box is clamped to the image first; a box with no pixels left is
/// rejected.
pub fn crop_and_normalize(
    image: &RgbImage,
    face: &BoundingBox,
    spec: InputSpec,
) -> Result<NormalizedCrop, EngineError> {
    let (img_w, img_h) = image.dimensions();

    let coords = [face.x, face.y, face.width, face.height];
    if coords.iter().any(|c| !c.is_finite()) || spec.size == 0 || spec.std == 0.0 {
        return Err(EngineError::InvalidFaceRegion(*face));
    }

    let x0 = face.x.max(0.0).floor();
    let y0 = face.y.max(0.0).floor();
    let x1 = (face.x + face.width).min(img_w as f32).ceil();
    let y1 = (face.y + face.height).min(img_h as f32).ceil();
    if x1 <= x0 || y1 <= y0 {
        return Err(EngineError::InvalidFaceRegion(*face));
    }

    let (x, y) = (x0 as u32, y0 as u32);
    let (w, h) = ((x1 - x0) as u32, (y1 - y0) as u32);
    if w == 0 || h == 0 {
        return Err(EngineError::InvalidFaceRegion(*face));
    }

    let cropped = imageops::crop_imm(image, x, y, w, h).to_image();
    let resized = imageops::resize(&cropped, spec.size, spec.size, FilterType::Triangle);

    let size = spec.size as usize;
    let plane = size * size;
    let mut data = vec![0.0f32; 3 * plane];
    for (px, py, pixel) in resized.enumerate_pixels() {
        let offset = py as usize * size + px as usize;
        for c in 0..3 {
            data[c * plane + offset] = (pixel[c] as f32 - spec.mean) / spec.std;
        }
    }

    Ok(NormalizedCrop {
        size: spec.size,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_bytes(image: RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn select_largest_prefers_area_then_scan_order() {
        let faces = vec![
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            BoundingBox::new(50.0, 50.0, 20.0, 5.0),
            BoundingBox::new(90.0, 90.0, 5.0, 20.0),
            BoundingBox::new(5.0, 5.0, 2.0, 2.0),
        ];
        // 100 vs 100 vs 100: first wins.
        let best = select_largest(&faces).unwrap();
        assert_eq!(best.x, 0.0);

        let faces = vec![
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            BoundingBox::new(50.0, 50.0, 30.0, 30.0),
        ];
        assert_eq!(select_largest(&faces).unwrap().x, 50.0);
        assert!(select_largest(&[]).is_none());
    }

    #[test]
    fn crop_output_shape_matches_input_size() {
        let image = RgbImage::from_pixel(200, 100, Rgb([10, 20, 30]));
        let face = BoundingBox::new(20.0, 10.0, 60.0, 60.0);
        let crop = crop_and_normalize(&image, &face, InputSpec::ARCFACE).unwrap();
        assert_eq!(crop.size, 112);
        assert_eq!(crop.data.len(), 3 * 112 * 112);
    }

    #[test]
    fn crop_scales_channels_independently() {
        let image = RgbImage::from_pixel(64, 64, Rgb([255, 0, 51]));
        let face = BoundingBox::new(0.0, 0.0, 64.0, 64.0);
        let crop = crop_and_normalize(&image, &face, InputSpec::UNIT_64).unwrap();
        assert!((crop.value(0, 10, 10) - 1.0).abs() < 1e-6);
        assert!(crop.value(1, 10, 10).abs() < 1e-6);
        assert!((crop.value(2, 10, 10) - 0.2).abs() < 1e-6);

        let crop = crop_and_normalize(&image, &face, InputSpec::ARCFACE).unwrap();
        assert!((crop.value(0, 0, 0) - 1.0).abs() < 1e-6);
        assert!((crop.value(1, 0, 0) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn crop_clamps_partially_outside_box() {
        let image = RgbImage::from_pixel(50, 50, Rgb([128, 128, 128]));
        let face = BoundingBox::new(-10.0, 30.0, 40.0, 40.0);
        assert!(crop_and_normalize(&image, &face, InputSpec::UNIT_64).is_ok());
    }

    #[test]
    fn crop_rejects_box_outside_image() {
        let image = RgbImage::from_pixel(50, 50, Rgb([128, 128, 128]));
        let face = BoundingBox::new(60.0, 60.0, 10.0, 10.0);
        let err = crop_and_normalize(&image, &face, InputSpec::UNIT_64).unwrap_err();
        assert!(matches!(err, EngineError::InvalidFaceRegion(_)));

        let face = BoundingBox::new(f32::NAN, 0.0, 10.0, 10.0);
        assert!(crop_and_normalize(&image, &face, InputSpec::UNIT_64).is_err());
    }

    #[test]
    fn decode_accepts_raw_png() {
        let bytes = png_bytes(RgbImage::from_pixel(8, 4, Rgb([1, 2, 3])));
        let image = decode_image(&bytes).unwrap();
        assert_eq!(image.dimensions(), (8, 4));
    }

    #[test]
    fn decode_accepts_data_url_and_bare_base64() {
        let bytes = png_bytes(RgbImage::from_pixel(8, 4, Rgb([1, 2, 3])));
        let encoded = general_purpose::STANDARD.encode(&bytes);

        let url = format!("data:image/png;base64,{encoded}");
        assert_eq!(decode_image(url.as_bytes()).unwrap().dimensions(), (8, 4));
        assert_eq!(decode_image(encoded.as_bytes()).unwrap().dimensions(), (8, 4));
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_image(b"definitely not an image!").unwrap_err();
        assert!(matches!(err, EngineError::InvalidImage(_)));

        let err = decode_image(&[0xff, 0x00, 0x13, 0x37]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidImage(_)));
    }
}
