//! Sprite-to-vertex synchronization
//!
//! Brings one sprite's slot in line with its live description, touching only
//! the attribute groups whose values changed since the last write:
//!
//! | group     | attributes                 | compared against       |
//! |-----------|----------------------------|------------------------|
//! | geometry  | `a_position`, `a_property` | x, y, width, height    |
//! | motion    | `a_property2`              | rotation, opacity, page|
//! | texture   | `a_texCoord`               | resolved atlas region  |
//! | color     | `a_color`                  | packed color           |
//!
//! Sprites outside the viewport are culled by zeroing `a_property2` once; when
//! they come back every group is rewritten.

use crate::assets::{ImageCache, ImageState};
use crate::foundation::math::Rect;
use crate::render::layer::{LayerFlags, LayerId, LayerStack};
use crate::render::vertex_store::{quad_positions, uniform_block, Attribute, VertexResult, FLOATS_PER_SLOT};
use crate::scene::{ObjectId, SceneEntry, SourceRect, TextureTarget};

/// What one synchronization did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Attribute blocks written
    pub writes: u32,
    /// Sprite is outside the viewport
    pub culled: bool,
    /// Sprite changed layers
    pub moved: bool,
    /// Sprite waits on an image that is not placed yet
    pub awaiting_image: bool,
}

/// Diffing writer from sprites to layer vertex stores
#[derive(Debug, Default)]
pub struct Synchronizer {
    base_path: String,
    synchronized: u64,
    writes: u64,
}

impl Synchronizer {
    /// Create a synchronizer with zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve images that sprites reference before anyone requested them
    /// against `base_path`
    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Sprites synchronized since creation
    pub const fn synchronized(&self) -> u64 {
        self.synchronized
    }

    /// Attribute blocks written since creation
    pub const fn writes(&self) -> u64 {
        self.writes
    }

    /// Synchronize one sprite
    pub fn synchronize(
        &mut self,
        id: ObjectId,
        entry: &mut SceneEntry,
        layers: &mut LayerStack,
        images: &mut ImageCache,
        viewport: Rect,
    ) -> VertexResult<SyncOutcome> {
        let mut outcome = SyncOutcome::default();
        self.synchronized += 1;

        let (texture, page) = resolve_texture(id, entry, images, &self.base_path);
        outcome.awaiting_image = texture.is_none();

        let target = LayerId::new(entry.sprite.layer);
        if target != entry.shadow.layer {
            if let Some(old) = layers.get_mut(entry.shadow.layer) {
                old.detach(id, entry.shadow.slot)?;
            }
            let slot = layers.get_or_create(target).attach(id);
            log::debug!("Sprite moved from layer {} to {}", entry.shadow.layer, target);
            entry.shadow.reattach(target, slot);
            outcome.moved = true;
        }

        let layer = layers.get_or_create(target);
        let sprite = &entry.sprite;
        let shadow = &mut entry.shadow;
        let slot = shadow.slot;
        let bounds = sprite.bounds();

        if !bounds.touches(&viewport) {
            if !shadow.culled {
                layer.store_mut().write(slot, Attribute::Property2, &[0.0; FLOATS_PER_SLOT])?;
                layer.mark(LayerFlags::NEEDS_REDRAW);
                shadow.culled = true;
                outcome.writes += 1;
            }
            shadow.force = true;
            outcome.culled = true;
            self.writes += u64::from(outcome.writes);
            return Ok(outcome);
        }
        shadow.culled = false;
        layer.grow_bounds(bounds);

        let force = shadow.force;
        let store = layer.store_mut();

        let geometry = [sprite.x, sprite.y, sprite.width, sprite.height];
        if force || geometry != shadow.geometry {
            store.write(slot, Attribute::Position, &quad_positions(sprite.x, sprite.y, sprite.width, sprite.height))?;
            store.write(slot, Attribute::Property, &uniform_block(geometry))?;
            shadow.geometry = geometry;
            outcome.writes += 2;
        }

        let motion = [sprite.rotation, sprite.opacity, page];
        if force || motion != shadow.motion {
            store.write(slot, Attribute::Property2, &uniform_block([motion[0], motion[1], motion[2], 0.0]))?;
            shadow.motion = motion;
            outcome.writes += 1;
        }

        if let Some(texture) = texture {
            if force || texture != shadow.texture {
                store.write(slot, Attribute::TexCoord, &uniform_block(texture.vertex_value()))?;
                shadow.texture = texture;
                outcome.writes += 1;
            }
        }

        if force || sprite.color != shadow.color {
            store.write(slot, Attribute::Color, &uniform_block(sprite.rgba()))?;
            shadow.color = sprite.color;
            outcome.writes += 1;
        }

        shadow.force = false;
        if outcome.writes > 0 {
            layer.mark(LayerFlags::NEEDS_REDRAW);
        }
        self.writes += u64::from(outcome.writes);
        Ok(outcome)
    }
}

/// Texture target for a sprite and its atlas page
///
/// `None` means the image is known but not placed yet; the sprite is registered
/// as a dependent and its texture coordinate is left alone.
fn resolve_texture(
    id: ObjectId,
    entry: &SceneEntry,
    images: &mut ImageCache,
    base_path: &str,
) -> (Option<TextureTarget>, f32) {
    let Some(key) = entry.sprite.image.as_deref() else {
        return (Some(TextureTarget::Fill), 0.0);
    };
    let image = images.lookup(key).unwrap_or_else(|| images.request(key, base_path));
    match images.get(image).and_then(|asset| asset.region()) {
        Some(region) => {
            let rect = region.rect;
            let source = entry.sprite.source.unwrap_or_default();
            let SourceRect { sx, sy, sw, sh } = source;
            let width = if sw > 0.0 { sw } else { rect.width as f32 };
            let height = if sh > 0.0 { sh } else { rect.height as f32 };
            let target = TextureTarget::Region([rect.x as f32 + sx, rect.y as f32 + sy, width, height]);
            (Some(target), region.page as f32)
        }
        None if matches!(images.get(image).map(|a| a.state()), Some(ImageState::Rejected(_))) => {
            (Some(TextureTarget::Fill), 0.0)
        }
        None => {
            images.add_dependent(image, id);
            (None, 0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::ImageData;
    use crate::foundation::math::PixelRect;
    use crate::render::atlas::AtlasRegion;
    use crate::scene::{ShadowRecord, Sprite};
    use slotmap::SlotMap;

    struct Fixture {
        objects: SlotMap<ObjectId, SceneEntry>,
        layers: LayerStack,
        images: ImageCache,
        sync: Synchronizer,
        viewport: Rect,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                objects: SlotMap::with_key(),
                layers: LayerStack::new(4),
                images: ImageCache::new(),
                sync: Synchronizer::new(),
                viewport: Rect::new(0.0, 0.0, 800.0, 600.0),
            }
        }

        fn add(&mut self, sprite: Sprite) -> ObjectId {
            let layer_id = LayerId::new(sprite.layer);
            let layers = &mut self.layers;
            self.objects.insert_with_key(|id| {
                let slot = layers.get_or_create(layer_id).attach(id);
                SceneEntry {
                    sprite,
                    shadow: ShadowRecord::new(layer_id, slot),
                }
            })
        }

        fn sync(&mut self, id: ObjectId) -> SyncOutcome {
            let entry = self.objects.get_mut(id).unwrap();
            self.sync
                .synchronize(id, entry, &mut self.layers, &mut self.images, self.viewport)
                .unwrap()
        }

        fn block(&self, id: ObjectId, attribute: Attribute) -> Vec<f32> {
            let shadow = &self.objects[id].shadow;
            self.layers.get(shadow.layer).unwrap().store().block(shadow.slot, attribute).unwrap().to_vec()
        }
    }

    #[test]
    fn test_first_sync_writes_every_group() {
        let mut fx = Fixture::new();
        let id = fx.add(Sprite::new().with_color(0xFF0000));
        let outcome = fx.sync(id);
        assert_eq!(outcome.writes, 5);
        assert_eq!(fx.block(id, Attribute::Color)[..4], [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(fx.block(id, Attribute::TexCoord), vec![-1.0; FLOATS_PER_SLOT]);
        assert_eq!(fx.block(id, Attribute::Property)[..4], [0.0, 0.0, 32.0, 32.0]);
    }

    #[test]
    fn test_unchanged_sprite_writes_nothing() {
        let mut fx = Fixture::new();
        let id = fx.add(Sprite::new());
        fx.sync(id);
        assert_eq!(fx.sync(id).writes, 0);
    }

    #[test]
    fn test_only_changed_group_is_written() {
        let mut fx = Fixture::new();
        let id = fx.add(Sprite::new());
        fx.sync(id);
        fx.objects[id].sprite.rotation = 45.0;
        assert_eq!(fx.sync(id).writes, 1);
        assert_eq!(fx.block(id, Attribute::Property2)[..4], [45.0, 1.0, 0.0, 0.0]);

        fx.objects[id].sprite.x = 10.0;
        assert_eq!(fx.sync(id).writes, 2);
    }

    #[test]
    fn test_culling_and_restore() {
        let mut fx = Fixture::new();
        let id = fx.add(Sprite::new().with_color(0x00FF00));
        fx.sync(id);
        let visible: Vec<_> = Attribute::ALL.iter().map(|a| fx.block(id, *a)).collect();

        fx.objects[id].sprite.x = 5000.0;
        let outcome = fx.sync(id);
        assert!(outcome.culled);
        assert_eq!(outcome.writes, 1);
        assert_eq!(fx.block(id, Attribute::Property2), vec![0.0; FLOATS_PER_SLOT]);
        assert_eq!(fx.sync(id).writes, 0);

        fx.objects[id].sprite.x = 0.0;
        assert_eq!(fx.sync(id).writes, 5);
        let restored: Vec<_> = Attribute::ALL.iter().map(|a| fx.block(id, *a)).collect();
        assert_eq!(restored, visible);
    }

    #[test]
    fn test_touching_viewport_edge_is_visible() {
        let mut fx = Fixture::new();
        let id = fx.add(Sprite::new().at(-32.0, 600.0));
        assert!(!fx.sync(id).culled);
    }

    #[test]
    fn test_layer_change_moves_slot() {
        let mut fx = Fixture::new();
        let id = fx.add(Sprite::new());
        fx.sync(id);
        fx.objects[id].sprite.layer = 3.0;
        let outcome = fx.sync(id);
        assert!(outcome.moved);
        assert_eq!(outcome.writes, 5);
        assert!(fx.layers.get(LayerId::new(0.0)).unwrap().is_empty());
        assert_eq!(fx.layers.get(LayerId::new(3.0)).unwrap().object_count(), 1);
        assert_eq!(fx.objects[id].shadow.layer, LayerId::new(3.0));
    }

    #[test]
    fn test_pending_image_waits_then_resolves() {
        let mut fx = Fixture::new();
        let id = fx.add(Sprite::new().with_image("ship.png").with_source(SourceRect::new(2.0, 3.0, 0.0, 0.0)));
        let outcome = fx.sync(id);
        assert!(outcome.awaiting_image);
        assert_eq!(fx.block(id, Attribute::TexCoord), vec![-1.0; FLOATS_PER_SLOT]);

        let image = fx.images.lookup("ship.png").unwrap();
        fx.images.complete("ship.png", Ok(ImageData::solid_color(16, 8, [0; 4])));
        let region = AtlasRegion { page: 1, rect: PixelRect::new(256, 0, 16, 8) };
        assert_eq!(fx.images.place(image, region), vec![id]);

        let outcome = fx.sync(id);
        assert!(!outcome.awaiting_image);
        assert_eq!(fx.block(id, Attribute::TexCoord)[..4], [258.0, 3.0, 16.0, 8.0]);
        assert_eq!(fx.block(id, Attribute::Property2)[..4], [0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_unrequested_image_resolves_against_base_path() {
        let mut fx = Fixture::new();
        fx.sync = Synchronizer::new().with_base_path("assets");
        let id = fx.add(Sprite::new().with_image("ship.png"));
        assert!(fx.sync(id).awaiting_image);

        let image = fx.images.lookup("ship.png").unwrap();
        assert_eq!(fx.images.get(image).unwrap().path(), std::path::Path::new("assets").join("ship.png"));
    }
}
