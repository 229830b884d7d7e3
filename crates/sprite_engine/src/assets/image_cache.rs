//! Image cache
//!
//! Deduplicates image requests by resolved path and tracks each image through
//! `Unrequested -> Loading -> Loaded -> Placed`. Images that fail to decode are
//! `Rejected`; images too large for an atlas page are `Stalled` and keep
//! counting towards the asset queue. Sprites that reference an image which is not placed yet
//! register as dependents and get resynchronized once it lands in the atlas.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use slotmap::{new_key_type, SlotMap};

use crate::assets::{AssetError, ImageData};
use crate::render::atlas::AtlasRegion;
use crate::scene::ObjectId;

new_key_type! {
    /// Stable handle to a cached image
    pub struct ImageId;
}

/// Lifecycle of one cached image
#[derive(Debug, Clone, PartialEq)]
pub enum ImageState {
    /// Known but not yet handed to a loader
    Unrequested,
    /// Loader is working on it
    Loading,
    /// Pixels available, waiting for an atlas slot
    Loaded(ImageData),
    /// Packed into the atlas
    Placed(AtlasRegion),
    /// Loaded but larger than an atlas page; never retried
    Stalled(String),
    /// Failed to load or decoded to nothing
    Rejected(String),
}

impl ImageState {
    /// Whether the image still counts towards the asset queue
    ///
    /// Stalled images stay pending, so their sprites keep waiting.
    pub const fn is_pending(&self) -> bool {
        !matches!(self, Self::Placed(_) | Self::Rejected(_))
    }
}

/// One cached image
#[derive(Debug, Clone)]
pub struct ImageAsset {
    key: String,
    path: PathBuf,
    state: ImageState,
    size: Option<(u32, u32)>,
    dependents: Vec<ObjectId>,
}

impl ImageAsset {
    /// Canonical cache key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Resolved load path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state
    pub const fn state(&self) -> &ImageState {
        &self.state
    }

    /// Pixel size, once known
    pub const fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    /// Atlas region, once placed
    pub const fn region(&self) -> Option<AtlasRegion> {
        match self.state {
            ImageState::Placed(region) => Some(region),
            _ => None,
        }
    }
}

/// Registry of every image the engine has been asked for
#[derive(Debug, Default)]
pub struct ImageCache {
    assets: SlotMap<ImageId, ImageAsset>,
    by_key: HashMap<String, ImageId>,
    /// Bare source keys; `None` once two bases requested the same name
    aliases: HashMap<String, Option<ImageId>>,
    order: Vec<ImageId>,
}

impl ImageCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the entry for `source` resolved against `base`
    ///
    /// Entries are deduplicated on the resolved path only. The bare source
    /// also finds the entry as long as no other base requested the same name.
    pub fn request(&mut self, source: &str, base: &str) -> ImageId {
        let resolved = resolve_path(base, source);
        let canonical = resolved.to_string_lossy().into_owned();

        if let Some(&id) = self.by_key.get(&canonical) {
            self.register_alias(source, &canonical, id);
            return id;
        }

        let id = self.assets.insert(ImageAsset {
            key: canonical.clone(),
            path: resolved,
            state: ImageState::Unrequested,
            size: None,
            dependents: Vec::new(),
        });
        self.register_alias(source, &canonical, id);
        self.by_key.insert(canonical, id);
        self.order.push(id);
        log::debug!("Image '{}' registered", source);
        id
    }

    fn register_alias(&mut self, source: &str, canonical: &str, id: ImageId) {
        if source == canonical {
            return;
        }
        let alias = self.aliases.entry(source.to_owned()).or_insert(Some(id));
        if *alias != Some(id) {
            if alias.is_some() {
                log::debug!("Image name '{}' is ambiguous; use the resolved path", source);
            }
            *alias = None;
        }
    }

    /// Find an entry by resolved path, or by an unambiguous source key
    pub fn lookup(&self, key: &str) -> Option<ImageId> {
        self.by_key
            .get(key)
            .copied()
            .or_else(|| self.aliases.get(key).copied().flatten())
    }

    /// Borrow an entry
    pub fn get(&self, id: ImageId) -> Option<&ImageAsset> {
        self.assets.get(id)
    }

    /// Number of distinct images
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether nothing was ever requested
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Entries still waiting for a loader, in request order; marks them loading
    pub fn start_unrequested(&mut self) -> Vec<(String, PathBuf)> {
        let mut started = Vec::new();
        for &id in &self.order {
            if let Some(asset) = self.assets.get_mut(id) {
                if asset.state == ImageState::Unrequested {
                    asset.state = ImageState::Loading;
                    started.push((asset.key.clone(), asset.path.clone()));
                }
            }
        }
        started
    }

    /// Record a finished load
    ///
    /// Pixels for an image that is already placed are ignored.
    pub fn complete(&mut self, key: &str, result: Result<ImageData, AssetError>) -> Option<ImageId> {
        let id = self.lookup(key)?;
        self.complete_id(id, result)
    }

    /// Record a finished load for a known entry
    pub fn complete_id(&mut self, id: ImageId, result: Result<ImageData, AssetError>) -> Option<ImageId> {
        let asset = self.assets.get_mut(id)?;
        let key = asset.key.as_str();
        if matches!(asset.state, ImageState::Placed(_)) {
            log::debug!("Ignoring pixels for already placed image '{}'", key);
            return Some(id);
        }

        asset.state = match result {
            Ok(data) if data.is_empty() => {
                log::warn!("Image '{}' has no pixels", key);
                ImageState::Rejected("image has zero size".to_owned())
            }
            Ok(data) => {
                asset.size = Some((data.width, data.height));
                ImageState::Loaded(data)
            }
            Err(e) => {
                log::error!("Image '{}' failed to load: {}", key, e);
                ImageState::Rejected(e.to_string())
            }
        };
        Some(id)
    }

    /// Loaded images awaiting placement, oldest request first
    pub fn loaded(&self) -> Vec<ImageId> {
        self.order
            .iter()
            .copied()
            .filter(|id| matches!(self.assets.get(*id).map(ImageAsset::state), Some(ImageState::Loaded(_))))
            .collect()
    }

    /// Borrow the pixels of a loaded image
    pub fn pixels(&self, id: ImageId) -> Option<&ImageData> {
        match self.assets.get(id).map(ImageAsset::state) {
            Some(ImageState::Loaded(data)) => Some(data),
            _ => None,
        }
    }

    /// Mark an image placed; returns the sprites waiting on it
    pub fn place(&mut self, id: ImageId, region: AtlasRegion) -> Vec<ObjectId> {
        self.assets.get_mut(id).map_or_else(Vec::new, |asset| {
            asset.state = ImageState::Placed(region);
            std::mem::take(&mut asset.dependents)
        })
    }

    /// Park an image that no atlas page can hold
    ///
    /// Its dependents stay registered and it keeps counting as pending.
    pub fn stall(&mut self, id: ImageId, reason: impl Into<String>) {
        if let Some(asset) = self.assets.get_mut(id) {
            asset.state = ImageState::Stalled(reason.into());
        }
    }

    /// Give up on an image; returns the sprites that referenced it
    pub fn reject(&mut self, id: ImageId, reason: impl Into<String>) -> Vec<ObjectId> {
        self.assets.get_mut(id).map_or_else(Vec::new, |asset| {
            asset.state = ImageState::Rejected(reason.into());
            std::mem::take(&mut asset.dependents)
        })
    }

    /// Remember that `object` is waiting on `id`
    pub fn add_dependent(&mut self, id: ImageId, object: ObjectId) {
        if let Some(asset) = self.assets.get_mut(id) {
            if !asset.dependents.contains(&object) {
                asset.dependents.push(object);
            }
        }
    }

    /// Drop `object` from every dependent list
    pub fn forget_dependent(&mut self, object: ObjectId) {
        for asset in self.assets.values_mut() {
            asset.dependents.retain(|o| *o != object);
        }
    }

    /// Images not yet placed or rejected, recounted from every entry
    pub fn pending_count(&self) -> usize {
        self.assets.values().filter(|a| a.state.is_pending()).count()
    }
}

/// Join a base path and a source key
fn resolve_path(base: &str, source: &str) -> PathBuf {
    if base.is_empty() {
        PathBuf::from(source)
    } else {
        Path::new(base).join(source)
    }
}
