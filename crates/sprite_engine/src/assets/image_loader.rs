//! Decoded image pixels
//!
//! Everything handed to the atlas is tightly packed 8-bit RGBA, whatever the
//! source format was.

use std::path::Path;

use image::RgbaImage;

use crate::assets::{AssetError, AssetResult};

/// Decoded RGBA8 pixels ready to be blitted into an atlas page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Row-major RGBA pixels, four bytes each
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl ImageData {
    /// Wrap raw RGBA pixels, checking the buffer length
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> AssetResult<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(AssetError::InvalidData(format!(
                "{}x{} image needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self { data, width, height })
    }

    /// Decode an image file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AssetResult<Self> {
        let path = path.as_ref();
        log::debug!("Decoding image {:?}", path);

        let decoded = image::open(path)
            .map_err(|e| AssetError::LoadFailed(format!("{}: {}", path.display(), e)))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();

        log::info!("Loaded image {}x{} from {:?}", width, height, path);
        Ok(Self {
            data: decoded.into_raw(),
            width,
            height,
        })
    }

    /// Decode an encoded image held in memory
    pub fn from_bytes(bytes: &[u8]) -> AssetResult<Self> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| AssetError::LoadFailed(format!("in-memory image: {e}")))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        Ok(Self {
            data: decoded.into_raw(),
            width,
            height,
        })
    }

    /// Single-color image
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let data = color
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self { data, width, height }
    }

    /// Pixel data size in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Whether either dimension is zero
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Borrow the pixels as an `image` buffer
    pub fn to_rgba_image(&self) -> AssetResult<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            AssetError::InvalidData(format!(
                "{}x{} image has {} bytes",
                self.width,
                self.height,
                self.data.len()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_color_image() {
        let img = ImageData::solid_color(4, 3, [255, 0, 0, 255]);
        assert_eq!(img.size_bytes(), 4 * 3 * 4);
        assert_eq!(&img.data[0..4], &[255, 0, 0, 255]);
        assert_eq!(&img.data[44..48], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_from_rgba_checks_length() {
        assert!(ImageData::from_rgba(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            ImageData::from_rgba(2, 2, vec![0; 15]),
            Err(AssetError::InvalidData(_))
        ));
    }

    #[test]
    fn test_png_round_trip_through_memory() {
        let source = RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let mut encoded = std::io::Cursor::new(Vec::new());
        source.write_to(&mut encoded, image::ImageFormat::Png).unwrap();

        let decoded = ImageData::from_bytes(encoded.get_ref()).unwrap();
        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(&decoded.data[0..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_missing_file_fails_to_load() {
        let result = ImageData::from_file("does/not/exist.png");
        assert!(matches!(result, Err(AssetError::LoadFailed(_))));
    }
}
