//! Texture atlas packing
//!
//! Images are packed into fixed-size square pages. Each page is scanned on a
//! coarse grid: for every candidate origin, column by column, the first spot
//! whose rectangle does not overlap an existing placement wins. A page that has
//! no room sends the search on to the next page, and a new page is opened when
//! all existing ones are full.
//!
//! Pages are created lazily and their bitmaps allocated on first use. Each page
//! needs its own sampler in the compositing shader, so the page count is capped
//! by the texture units the device offers.

use image::RgbaImage;
use thiserror::Error;

use crate::assets::ImageData;
use crate::core::AtlasConfig;
use crate::foundation::math::PixelRect;
use crate::render::device::{DeviceResult, GraphicsDevice, TextureHandle};

/// Result type for atlas operations
pub type AtlasResult<T> = Result<T, AtlasError>;

/// Packing failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AtlasError {
    /// Image is larger than a whole page
    #[error("Image {width}x{height} does not fit an atlas page of {page_size}x{page_size}")]
    AtlasExhausted {
        /// Image width
        width: u32,
        /// Image height
        height: u32,
        /// Page edge length
        page_size: u32,
    },

    /// Every allowed page is full
    #[error("Atlas page limit of {limit} reached")]
    TextureUnitLimitReached {
        /// Maximum number of pages
        limit: u32,
    },

    /// Image has no pixels
    #[error("Cannot place an empty image")]
    EmptyImage,

    /// Pixel buffer did not match its declared size
    #[error("Invalid pixel data: {0}")]
    InvalidPixels(String),
}

/// Where an image lives in the atlas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtlasRegion {
    /// Page index
    pub page: u32,
    /// Pixel rectangle within the page
    pub rect: PixelRect,
}

/// Result of a successful placement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Where the image went
    pub region: AtlasRegion,
    /// Whether a page had to be opened for it
    pub new_page: bool,
}

/// One atlas page
#[derive(Debug)]
pub struct AtlasPage {
    bitmap: Option<RgbaImage>,
    placements: Vec<PixelRect>,
    texture: Option<TextureHandle>,
    dirty: bool,
}

impl AtlasPage {
    const fn new() -> Self {
        Self {
            bitmap: None,
            placements: Vec::new(),
            texture: None,
            dirty: false,
        }
    }

    /// Rectangles packed into this page
    pub fn placements(&self) -> &[PixelRect] {
        &self.placements
    }

    /// Page pixels, if anything was ever blitted
    pub const fn bitmap(&self) -> Option<&RgbaImage> {
        self.bitmap.as_ref()
    }

    /// Device texture backing this page
    pub const fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    /// Whether the bitmap changed since the last upload
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn free_origin(&self, width: u32, height: u32, page_size: u32, step: u32) -> Option<(u32, u32)> {
        let mut x = 0;
        while x + width <= page_size {
            let mut y = 0;
            while y + height <= page_size {
                let candidate = PixelRect::new(x, y, width, height);
                if !self.placements.iter().any(|p| p.overlaps(&candidate)) {
                    return Some((x, y));
                }
                y += step;
            }
            x += step;
        }
        None
    }
}

/// Multi-page grid packer
#[derive(Debug)]
pub struct AtlasPacker {
    page_size: u32,
    step: u32,
    max_pages: u32,
    pages: Vec<AtlasPage>,
}

impl AtlasPacker {
    /// Create a packer with one empty page
    pub fn new(config: &AtlasConfig, max_pages: u32) -> Self {
        log::debug!(
            "Atlas: {}px pages, {}px grid, up to {} pages",
            config.page_size,
            config.step,
            max_pages
        );
        Self {
            page_size: config.page_size.max(1),
            step: config.step.max(1),
            max_pages: max_pages.max(1),
            pages: vec![AtlasPage::new()],
        }
    }

    /// Find a free rectangle for a `width` x `height` image
    pub fn place(&mut self, width: u32, height: u32) -> AtlasResult<Placement> {
        if width == 0 || height == 0 {
            return Err(AtlasError::EmptyImage);
        }
        if width > self.page_size || height > self.page_size {
            return Err(AtlasError::AtlasExhausted {
                width,
                height,
                page_size: self.page_size,
            });
        }

        let mut new_page = false;
        let mut index = 0;
        loop {
            if index == self.pages.len() {
                if self.pages.len() as u32 >= self.max_pages {
                    log::warn!("Atlas full: {} pages in use", self.pages.len());
                    return Err(AtlasError::TextureUnitLimitReached { limit: self.max_pages });
                }
                self.pages.push(AtlasPage::new());
                new_page = true;
                log::info!("Opened atlas page {}", index);
            }

            let page = &mut self.pages[index];
            if let Some((x, y)) = page.free_origin(width, height, self.page_size, self.step) {
                let rect = PixelRect::new(x, y, width, height);
                page.placements.push(rect);
                return Ok(Placement {
                    region: AtlasRegion {
                        page: index as u32,
                        rect,
                    },
                    new_page,
                });
            }
            index += 1;
        }
    }

    /// Place an image and copy its pixels into the page
    pub fn insert(&mut self, image: &ImageData) -> AtlasResult<Placement> {
        let source = image
            .to_rgba_image()
            .map_err(|e| AtlasError::InvalidPixels(e.to_string()))?;
        let placement = self.place(image.width, image.height)?;

        let size = self.page_size;
        let page = &mut self.pages[placement.region.page as usize];
        let bitmap = page.bitmap.get_or_insert_with(|| RgbaImage::new(size, size));
        image::imageops::replace(
            bitmap,
            &source,
            i64::from(placement.region.rect.x),
            i64::from(placement.region.rect.y),
        );
        page.dirty = true;
        Ok(placement)
    }

    /// Push every changed page bitmap to the device
    ///
    /// Returns how many pages were uploaded.
    pub fn upload<D: GraphicsDevice>(&mut self, device: &mut D) -> DeviceResult<usize> {
        let mut uploaded = 0;
        for (index, page) in self.pages.iter_mut().enumerate() {
            if !page.dirty {
                continue;
            }
            let Some(bitmap) = page.bitmap.as_ref() else {
                page.dirty = false;
                continue;
            };
            let texture = match page.texture {
                Some(texture) => texture,
                None => {
                    let texture = device.create_texture(self.page_size, self.page_size)?;
                    page.texture = Some(texture);
                    texture
                }
            };
            device.update_texture(texture, self.page_size, self.page_size, bitmap.as_raw())?;
            page.dirty = false;
            uploaded += 1;
            log::debug!("Uploaded atlas page {}", index);
        }
        Ok(uploaded)
    }

    /// Pages opened so far
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Borrow a page
    pub fn page(&self, index: usize) -> Option<&AtlasPage> {
        self.pages.get(index)
    }

    /// Page edge length in pixels
    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Maximum number of pages
    pub const fn max_pages(&self) -> u32 {
        self.max_pages
    }
}
