//! End-to-end tests driving the engine against the recording device

use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::AtlasConfig;
use crate::prelude::*;
use crate::render::atlas::{AtlasError, AtlasPacker};
use crate::render::headless::DrawRecord;
use crate::render::shaders::{NO_PASS, U_KERNELS, U_RENDER_PASS};
use crate::render::vertex_store::{Attribute, FLOATS_PER_SLOT};
use crate::render::RenderTarget;

fn small_config() -> EngineConfig {
    EngineConfig::default()
        .with_size(320, 240)
        .with_chunk_slots(4)
        .with_atlas(AtlasConfig {
            page_size: 64,
            step: 16,
            max_pages: None,
        })
}

fn engine() -> SpriteEngine<RecordingDevice> {
    SpriteEngine::new(small_config(), RecordingDevice::default())
        .unwrap()
        .with_deferred_images()
}

fn sprite_draws(engine: &SpriteEngine<RecordingDevice>) -> Vec<&DrawRecord> {
    engine
        .device()
        .draws()
        .iter()
        .filter(|draw| draw.uniform_f32(U_KERNELS) == Some(0.0))
        .collect()
}

#[test]
fn test_slots_bounded_by_live_objects_and_reused() {
    let mut engine = engine();
    let mut rng = StdRng::seed_from_u64(0x9E37_79B9_7F4A_7C15);
    let mut live = Vec::new();
    let mut peak = 0;

    for _ in 0..200 {
        if !live.is_empty() && rng.gen_ratio(1, 3) {
            let index = rng.gen_range(0..live.len());
            engine.remove_object(live.swap_remove(index)).unwrap();
        } else {
            live.push(engine.add_object(Sprite::new()));
        }
        peak = peak.max(live.len());
        let capacity = engine.layer(0).map_or(0, |spec| spec.capacity);
        assert!(capacity <= peak.div_ceil(4) * 4, "capacity {capacity} for peak {peak}");
    }

    // A freed slot is handed out again before the arrays grow
    let victim = live[0];
    let (_, freed) = engine.object_slot(victim).unwrap();
    engine.remove_object(victim).unwrap();
    let capacity = engine.layer(0).unwrap().capacity;
    let replacement = engine.add_object(Sprite::new());
    assert_eq!(engine.object_slot(replacement).unwrap().1, freed);
    assert_eq!(engine.layer(0).unwrap().capacity, capacity);
}

#[test]
fn test_atlas_placements_never_overlap() {
    for seed in 1..=8u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut atlas = AtlasPacker::new(
            &AtlasConfig {
                page_size: 256,
                step: 8,
                max_pages: None,
            },
            16,
        );
        let mut placed = Vec::new();
        for _ in 0..120 {
            let (width, height) = (rng.gen_range(1..=96), rng.gen_range(1..=96));
            match atlas.place(width, height) {
                Ok(placement) => {
                    let rect = placement.region.rect;
                    assert!(rect.x + rect.width <= 256 && rect.y + rect.height <= 256);
                    placed.push(placement.region);
                }
                Err(AtlasError::TextureUnitLimitReached { .. }) => break,
                Err(e) => panic!("unexpected atlas error: {e}"),
            }
        }
        for (i, a) in placed.iter().enumerate() {
            for b in &placed[i + 1..] {
                assert!(
                    a.page != b.page || !a.rect.overlaps(&b.rect),
                    "seed {seed}: {a:?} overlaps {b:?}"
                );
            }
        }
    }
}

#[test]
fn test_second_tick_on_unchanged_scene_writes_nothing() {
    let mut engine = engine();
    engine.add_object(Sprite::new().with_color(0x00FF00));
    let start = Instant::now();

    let first = engine.tick_at(start).unwrap();
    assert_eq!(first.vertex_writes, 5);

    let second = engine.tick_at(start + Duration::from_millis(20)).unwrap();
    assert!(second.synchronized > 0);
    assert_eq!(second.vertex_writes, 0);
}

#[test]
fn test_culled_object_restores_to_fresh_state() {
    let mut engine = engine();
    let id = engine.add_object(Sprite::new().at(40.0, 40.0).with_color(0x123456).with_rotation(30.0));
    let start = Instant::now();
    engine.tick_at(start).unwrap();

    engine.object_mut(id).unwrap().x = 10_000.0;
    engine.update_object(id).unwrap();
    engine.tick_at(start + Duration::from_millis(20)).unwrap();
    let (layer, slot) = engine.object_slot(id).unwrap();
    let store = engine.vertex_store(layer).unwrap();
    assert_eq!(store.block(slot, Attribute::Property2).unwrap(), &[0.0; FLOATS_PER_SLOT][..]);

    engine.object_mut(id).unwrap().x = 40.0;
    engine.update_object(id).unwrap();
    engine.tick_at(start + Duration::from_millis(40)).unwrap();

    let mut fresh = self::engine();
    let twin = fresh.add_object(Sprite::new().at(40.0, 40.0).with_color(0x123456).with_rotation(30.0));
    fresh.tick_at(start).unwrap();
    let (twin_layer, twin_slot) = fresh.object_slot(twin).unwrap();

    let store = engine.vertex_store(layer).unwrap();
    let twin_store = fresh.vertex_store(twin_layer).unwrap();
    for attribute in Attribute::ALL {
        assert_eq!(
            store.block(slot, attribute),
            twin_store.block(twin_slot, attribute),
            "{} differs after restore",
            attribute.name()
        );
    }
}

#[test]
fn test_render_all_rewrites_everything() {
    let mut engine = engine();
    engine.add_layer(3, LayerOptions::static_layer());
    engine.add_object(Sprite::new().on_layer(3.0));
    engine.add_object(Sprite::new().at(50.0, 50.0));
    let start = Instant::now();
    engine.tick_at(start).unwrap();
    assert_eq!(engine.tick_at(start + Duration::from_millis(40)).unwrap().vertex_writes, 0);

    engine.render_all();
    let report = engine.tick_at(start + Duration::from_millis(80)).unwrap();
    assert_eq!(report.vertex_writes, 10);
    assert_eq!(report.draw.unwrap().layers_redrawn, 2);
}

#[test]
fn test_add_layer_twice_yields_one_static_layer() {
    let mut engine = engine();
    engine.add_layer(5, LayerOptions::default());
    let spec = engine.add_layer(5, LayerOptions::static_layer());
    assert!(spec.is_static);
    assert_eq!(engine.layers().len(), 1);

    // Unspecified static option leaves the flag alone
    engine.add_layer(5, LayerOptions::default());
    assert!(engine.layer(5).unwrap().is_static);
}

#[test]
fn test_red_square_at_origin() {
    let mut engine = engine();
    engine.add_object(Sprite::new().with_color(0xFF0000));
    let report = engine.tick().unwrap();
    assert!(report.presented());

    let draws = sprite_draws(&engine);
    assert_eq!(draws.len(), 1);
    let draw = draws[0];
    assert!(matches!(draw.target, RenderTarget::Framebuffer(_)));

    let position = draw.attribute("a_position");
    let corners: Vec<[f32; 2]> = position[..FLOATS_PER_SLOT]
        .chunks_exact(4)
        .map(|v| [v[0], v[1]])
        .collect();
    assert_eq!(
        corners,
        vec![[0.0, 0.0], [32.0, 0.0], [0.0, 32.0], [0.0, 32.0], [32.0, 0.0], [32.0, 32.0]]
    );
    for vertex in draw.attribute("a_color")[..FLOATS_PER_SLOT].chunks_exact(4) {
        assert_relative_eq!(vertex[0], 1.0);
        assert_relative_eq!(vertex[1], 0.0);
        assert_relative_eq!(vertex[2], 0.0);
        assert_relative_eq!(vertex[3], 1.0);
    }
    assert!(draw.attribute("a_texCoord")[..FLOATS_PER_SLOT].iter().all(|v| *v == -1.0));
    assert_eq!(draw.attribute("a_property2")[..4], [0.0, 1.0, 0.0, 0.0]);

    let present = engine.device().draws().last().unwrap();
    assert_eq!(present.target, RenderTarget::Presentation);
}

#[test]
fn test_same_image_requested_twice_is_placed_once() {
    let mut engine = engine();
    let a = engine.request_image("ship.png", "");
    let b = engine.request_image("ship.png", "");
    assert_eq!(a, b);
    engine.add_object(Sprite::new().with_image("ship.png"));
    engine.add_object(Sprite::new().with_image("ship.png").at(100.0, 0.0));

    let start = Instant::now();
    engine.tick_at(start).unwrap();
    assert_eq!(engine.pending_images(), 1);

    engine.provide_image("ship.png", ImageData::solid_color(16, 16, [255, 255, 0, 255])).unwrap();
    let report = engine.tick_at(start + Duration::from_millis(200)).unwrap();
    assert_eq!(report.images_placed, 1);
    assert_eq!(engine.atlas().page(0).unwrap().placements().len(), 1);
    assert!(matches!(engine.image(a).unwrap().state(), ImageState::Placed(_)));

    let later = engine.tick_at(start + Duration::from_millis(400)).unwrap();
    assert_eq!(later.images_placed, 0);
    assert_eq!(engine.atlas().page(0).unwrap().placements().len(), 1);
}

#[test]
fn test_waits_on_assets_then_runs() {
    let mut engine = engine();
    assert!(engine.controls().pause_on_queue);
    engine.request_image("tiles.png", "assets");
    engine.add_object(Sprite::new().with_image("tiles.png"));

    let start = Instant::now();
    assert_eq!(engine.tick_at(start).unwrap().state, SchedulerState::WaitingOnAssets);
    assert_eq!(
        engine.tick_at(start + Duration::from_millis(50)).unwrap().state,
        SchedulerState::WaitingOnAssets
    );

    engine.provide_image("tiles.png", ImageData::solid_color(8, 8, [0, 0, 255, 255])).unwrap();
    let report = engine.tick_at(start + Duration::from_millis(300)).unwrap();
    assert_eq!(report.state, SchedulerState::Running);
    assert_eq!(report.pending_images, 0);
    assert_eq!(engine.scheduler_state(), SchedulerState::Running);

    // The sprite picked up its atlas region
    let draws = sprite_draws(&engine);
    let texcoord = draws.last().unwrap().attribute("a_texCoord");
    assert_eq!(texcoord[..4], [0.0, 0.0, 8.0, 8.0]);
}

#[test]
fn test_oversized_image_keeps_its_sprites_waiting() {
    let mut engine = engine();
    let id = engine.add_object(Sprite::new().with_image("huge.png"));
    let start = Instant::now();
    engine.tick_at(start).unwrap();

    engine.provide_image("huge.png", ImageData::solid_color(128, 128, [1, 2, 3, 255])).unwrap();
    for step in 1..=3 {
        let report = engine.tick_at(start + Duration::from_millis(200 * step)).unwrap();
        assert_eq!(report.images_placed, 0);
        assert_eq!(report.state, SchedulerState::WaitingOnAssets);
        assert_eq!(report.pending_images, 1);
    }
    let image = engine.find_image("huge.png").unwrap();
    assert!(matches!(engine.image(image).unwrap().state(), ImageState::Stalled(_)));
    assert_eq!(engine.atlas().page_count(), 1);
    assert!(engine.find_object(id).is_ok());
}

#[test]
fn test_full_atlas_keeps_image_loaded_for_retry() {
    let config = small_config().with_atlas(AtlasConfig {
        page_size: 64,
        step: 16,
        max_pages: Some(1),
    });
    let mut engine = SpriteEngine::new(config, RecordingDevice::default())
        .unwrap()
        .with_deferred_images();
    for key in ["first.png", "second.png"] {
        engine.add_object(Sprite::new().with_image(key));
        engine.provide_image(key, ImageData::solid_color(64, 64, [7, 7, 7, 255])).unwrap();
    }

    let start = Instant::now();
    let mut placed = 0;
    for step in 0..4 {
        let report = engine.tick_at(start + Duration::from_millis(200 * step)).unwrap();
        placed += report.images_placed;
        assert_eq!(report.state, SchedulerState::WaitingOnAssets);
    }

    assert_eq!(placed, 1);
    assert_eq!(engine.pending_images(), 1);
    let first = engine.find_image("first.png").unwrap();
    let second = engine.find_image("second.png").unwrap();
    assert!(matches!(engine.image(first).unwrap().state(), ImageState::Placed(_)));
    assert!(matches!(engine.image(second).unwrap().state(), ImageState::Loaded(_)));
}

#[test]
fn test_corrupt_image_stops_blocking() {
    let mut engine = engine();
    let id = engine.add_object(Sprite::new().with_image("empty.png"));
    let start = Instant::now();
    engine.tick_at(start).unwrap();

    engine.provide_image("empty.png", ImageData::solid_color(0, 0, [0; 4])).unwrap();
    let report = engine.tick_at(start + Duration::from_millis(200)).unwrap();
    assert_eq!(report.state, SchedulerState::Running);
    assert_eq!(report.pending_images, 0);
    let image = engine.find_image("empty.png").unwrap();
    assert!(matches!(engine.image(image).unwrap().state(), ImageState::Rejected(_)));
    assert!(engine.find_object(id).is_ok());
}

#[test]
fn test_images_resolve_against_configured_base_path() {
    let mut config = small_config();
    config.assets.base_path = "assets".to_owned();
    let mut engine = SpriteEngine::new(config, RecordingDevice::default())
        .unwrap()
        .with_deferred_images();
    let expected = |name: &str| std::path::Path::new("assets").join(name);

    let provided = engine.provide_image("ship.png", ImageData::solid_color(4, 4, [0; 4])).unwrap();
    assert_eq!(engine.image(provided).unwrap().path(), expected("ship.png"));

    engine.add_object(Sprite::new().with_image("hud.png"));
    engine.tick().unwrap();
    let hud = engine.find_image("hud.png").unwrap();
    assert_eq!(engine.image(hud).unwrap().path(), expected("hud.png"));

    // An explicit base still wins
    let explicit = engine.request_image("hud.png", "ui");
    assert_ne!(explicit, hud);
    assert_eq!(engine.image(explicit).unwrap().path(), std::path::Path::new("ui").join("hud.png"));
}

#[test]
fn test_paused_engine_only_applies_queued_updates() {
    let mut engine = engine();
    let id = engine.add_object(Sprite::new());
    let start = Instant::now();
    engine.tick_at(start).unwrap();

    engine.controls_mut().playing = false;
    engine.object_mut(id).unwrap().x = 50.0;
    let report = engine.tick_at(start + Duration::from_millis(20)).unwrap();
    assert_eq!(report.state, SchedulerState::Paused);
    assert_eq!(report.vertex_writes, 0);

    engine.update_object(id).unwrap();
    let report = engine.tick_at(start + Duration::from_millis(40)).unwrap();
    assert_eq!(report.synchronized, 1);
    assert_eq!(report.vertex_writes, 2);
    assert_eq!(report.next_tick, crate::foundation::time::period_from_hz(engine.controls().fps_cap));
}

#[test]
fn test_static_layer_ignores_changes_until_flagged() {
    let mut engine = engine();
    engine.add_layer(1, LayerOptions::static_layer());
    let id = engine.add_object(Sprite::new().on_layer(1.0));
    let start = Instant::now();
    engine.tick_at(start).unwrap();

    engine.object_mut(id).unwrap().y = 20.0;
    assert_eq!(engine.tick_at(start + Duration::from_millis(20)).unwrap().vertex_writes, 0);

    engine.add_layer(1, LayerOptions::default());
    assert_eq!(engine.tick_at(start + Duration::from_millis(40)).unwrap().vertex_writes, 2);
}

#[test]
fn test_draws_are_throttled_to_fps_cap() {
    let mut engine = engine();
    engine.add_object(Sprite::new());
    let start = Instant::now();
    assert!(engine.tick_at(start).unwrap().presented());
    assert!(!engine.tick_at(start + Duration::from_millis(5)).unwrap().presented());
    assert!(engine.tick_at(start + Duration::from_millis(40)).unwrap().presented());
}

#[test]
fn test_fps_counts_presented_frames_and_reads_zero_while_paused() {
    let mut engine = engine();
    engine.add_object(Sprite::new());
    let start = Instant::now() + Duration::from_millis(10);
    for step in 0..=30u64 {
        engine.tick_at(start + Duration::from_millis(step * 40)).unwrap();
    }
    assert!(engine.fps() > 0);

    engine.controls_mut().playing = false;
    engine.tick_at(start + Duration::from_millis(1300)).unwrap();
    assert_eq!(engine.fps(), 0);
}

#[test]
fn test_unchanged_layer_is_not_redrawn() {
    let mut engine = engine();
    engine.add_object(Sprite::new().with_color(0xFFFFFF));
    let start = Instant::now();
    let first = engine.tick_at(start).unwrap().draw.unwrap();
    assert_eq!(first.layers_redrawn, 1);

    let second = engine.tick_at(start + Duration::from_millis(40)).unwrap().draw.unwrap();
    assert_eq!(second.layers_redrawn, 0);
    assert_eq!(second.layers_composited, 1);
    assert_eq!(second.bytes_uploaded, 0);
}

#[test]
fn test_empty_scene_issues_no_device_work() {
    let mut engine = engine();
    engine.device_mut().clear_log();
    let report = engine.tick().unwrap();
    assert!(!report.presented());
    assert!(engine.device().draws().is_empty());
}

#[test]
fn test_render_pass_is_compiled_on_next_tick() {
    let mut engine = engine();
    let pass = engine
        .add_render_pass(
            2,
            RenderPassOptions::new(PassTarget::Layer, "void main() { pixel.rgb *= tint.rgb; }")
                .with_uniform("tint", [1.0, 0.5, 0.5, 1.0]),
        )
        .unwrap();
    assert_eq!(pass.selection_value(), 102.0);
    assert!(engine.layer(2).is_ok());

    engine.add_object(Sprite::new().on_layer(2.0).with_color(0xFFFFFF));
    engine.tick().unwrap();

    let program = engine.device().current_program().unwrap();
    let source = engine.device().program_source(program).unwrap();
    assert!(source.fragment.contains("void fn_2()"));

    let draw = sprite_draws(&engine)[0];
    assert_eq!(draw.uniform_f32("u_renderPass"), Some(102.0));
    assert_eq!(
        draw.uniforms.get("tint"),
        Some(&crate::render::UniformValue::Vec4([1.0, 0.5, 0.5, 1.0]))
    );

    engine.remove_render_pass(2).unwrap();
    assert!(matches!(engine.remove_render_pass(2), Err(EngineError::RenderPassNotFound(_))));
}

#[test]
fn test_layers_draw_before_composite_in_ascending_id_order() {
    let mut engine = engine();
    for (layer, color) in [(2.0, 0x0000FF), (-1.0, 0xFF0000), (0.5, 0x00FF00)] {
        engine.add_object(Sprite::new().on_layer(layer).with_color(color));
        engine
            .add_render_pass(layer, RenderPassOptions::new(PassTarget::Composite, "void main() { pixel.rgb *= 0.5; }"))
            .unwrap();
    }
    engine.tick().unwrap();

    let draws = engine.device().draws();
    let kernels: Vec<f32> = draws.iter().filter_map(|draw| draw.uniform_f32(U_KERNELS)).collect();
    assert_eq!(kernels, [0.0, 0.5, 0.0, 0.5, 0.0, 0.5, 1.0, 1.0, 1.0, 2.0]);

    // Kernel 0 walks the layers from -1 up to 2
    let colors: Vec<Vec<f32>> = sprite_draws(&engine)
        .iter()
        .map(|draw| draw.attribute("a_color")[..4].to_vec())
        .collect();
    assert_eq!(
        colors,
        vec![vec![1.0, 0.0, 0.0, 1.0], vec![0.0, 1.0, 0.0, 1.0], vec![0.0, 0.0, 1.0, 1.0]]
    );

    // Kernel 1 follows the same order, each layer routed to its composite pass
    let composite: Vec<f32> = draws
        .iter()
        .filter(|draw| draw.uniform_f32(U_KERNELS) == Some(1.0))
        .filter_map(|draw| draw.uniform_f32(U_RENDER_PASS))
        .collect();
    assert_eq!(composite, [99.0, 100.5, 102.0]);
}

#[test]
fn test_composite_pass_is_selected_only_for_its_layer() {
    let mut engine = engine();
    engine.add_object(Sprite::new().with_color(0xFFFFFF));
    engine.add_object(Sprite::new().on_layer(3.0).with_color(0xFFFFFF));
    engine
        .add_render_pass(
            3,
            RenderPassOptions::new(PassTarget::Composite, "void main() { pixel *= fade; }")
                .with_uniform("fade", [0.5, 0.5, 0.5, 0.5]),
        )
        .unwrap();
    engine.tick().unwrap();

    let program = engine.device().current_program().unwrap();
    assert!(engine.device().program_source(program).unwrap().fragment.contains("void fn_3()"));

    let draws = engine.device().draws();
    let passes: Vec<Option<f32>> = draws
        .iter()
        .filter(|draw| draw.uniform_f32(U_KERNELS) == Some(1.0))
        .map(|draw| draw.uniform_f32(U_RENDER_PASS))
        .collect();
    assert_eq!(passes, [Some(NO_PASS), Some(103.0)]);

    // Layer kernels never pick up a composite pass
    assert!(sprite_draws(&engine)
        .iter()
        .all(|draw| draw.uniform_f32(U_RENDER_PASS) == Some(NO_PASS)));
}

#[test]
fn test_invalid_render_pass_is_rejected() {
    let mut engine = engine();
    let result = engine.add_render_pass(1, RenderPassOptions::new(PassTarget::Composite, "void shade() {}"));
    assert!(matches!(result, Err(EngineError::InvalidRenderPass(_))));
    assert!(engine.render_pass(1).is_none());
}

#[test]
fn test_failed_recompile_keeps_drawing() {
    let mut engine = engine();
    engine.add_object(Sprite::new());
    let start = Instant::now();
    engine.tick_at(start).unwrap();
    let before = engine.device().current_program();
    assert!(before.is_some());

    engine.device_mut().set_reject_programs(true);
    assert!(matches!(engine.recompile(), Err(EngineError::RecompileFailure(_))));

    engine.controls_mut().recompile_requested = true;
    let report = engine.tick_at(start + Duration::from_millis(40)).unwrap();
    assert!(report.presented());
    assert!(!engine.controls().recompile_requested);
    assert_eq!(engine.device().current_program(), before);
}

#[test]
fn test_new_atlas_page_triggers_recompile() {
    let mut engine = engine();
    for index in 0..5 {
        let key = format!("tile{index}.png");
        engine.add_object(Sprite::new().with_image(key.as_str()));
        engine.provide_image(&key, ImageData::solid_color(32, 32, [9, 9, 9, 255])).unwrap();
    }

    let start = Instant::now();
    let mut now = start;
    while engine.pending_images() > 0 {
        engine.tick_at(now).unwrap();
        now += Duration::from_millis(200);
        assert!(now < start + Duration::from_secs(10), "images never placed");
    }
    engine.tick_at(now).unwrap();

    assert_eq!(engine.atlas().page_count(), 2);
    let program = engine.device().current_program().unwrap();
    assert!(engine.device().program_source(program).unwrap().fragment.contains("u_atlas1"));
}

#[test]
fn test_layer_change_moves_object() {
    let mut engine = engine();
    let id = engine.add_object(Sprite::new());
    engine.tick().unwrap();

    engine.object_mut(id).unwrap().layer = -1.0;
    engine.update_object(id).unwrap();
    engine.tick().unwrap();

    assert_eq!(engine.object_slot(id).unwrap().0, LayerId::new(-1.0));
    assert_eq!(engine.layer(0).unwrap().object_count, 0);
    assert_eq!(engine.layers()[0].id, LayerId::new(-1.0));
}

#[test]
fn test_resize_updates_resolution_and_viewport() {
    let mut engine = engine();
    let id = engine.add_object(Sprite::new().at(500.0, 10.0));
    let start = Instant::now();
    engine.tick_at(start).unwrap();
    let (layer, slot) = engine.object_slot(id).unwrap();
    assert_eq!(engine.vertex_store(layer).unwrap().block(slot, Attribute::Property2).unwrap()[1], 0.0);

    engine.resize(Some(640), None).unwrap();
    assert_eq!(engine.resolution(), (640, 240));
    engine.tick_at(start + Duration::from_millis(40)).unwrap();
    assert_eq!(engine.vertex_store(layer).unwrap().block(slot, Attribute::Property2).unwrap()[1], 1.0);
    assert_eq!(engine.device().viewport(), (640, 240));

    assert!(matches!(engine.resize(Some(0), None), Err(EngineError::Config(_))));
}

#[test]
fn test_missing_objects_report_not_found() {
    let mut engine = engine();
    let id = engine.add_object(Sprite::new());
    engine.remove_object(id).unwrap();
    assert!(matches!(engine.find_object(id), Err(EngineError::ObjectNotFound(_))));
    assert!(matches!(engine.update_object(id), Err(EngineError::ObjectNotFound(_))));
    assert!(matches!(engine.remove_object(id), Err(EngineError::ObjectNotFound(_))));
}

#[test]
fn test_pointer_is_flipped_for_shaders() {
    let mut engine = engine();
    engine.add_object(Sprite::new());
    engine.set_pointer(10.0, 40.0);
    engine.tick().unwrap();
    let draw = engine.device().draws().last().unwrap();
    assert_eq!(
        draw.uniforms.get("u_mouse"),
        Some(&crate::render::UniformValue::Vec2([10.0, 200.0]))
    );
}

struct CountingApp {
    updates: u32,
}

impl Application<RecordingDevice> for CountingApp {
    fn initialize(&mut self, engine: &mut SpriteEngine<RecordingDevice>) -> Result<(), AppError> {
        engine.add_object(Sprite::new().with_color(0x808080));
        Ok(())
    }

    fn update(&mut self, _engine: &mut SpriteEngine<RecordingDevice>, _report: &TickReport) -> Result<ControlFlow<()>, AppError> {
        self.updates += 1;
        Ok(if self.updates == 3 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        })
    }
}

#[test]
fn test_runner_stops_when_app_breaks() {
    let mut engine = engine();
    let mut app = CountingApp { updates: 0 };
    let ticks = Runner::new().without_sleep().run(&mut engine, &mut app).unwrap();
    assert_eq!(ticks, 3);
    assert_eq!(engine.object_count(), 1);

    let ticks = Runner::new().without_sleep().with_max_ticks(2).run(&mut engine, &mut CountingApp { updates: 10 }).unwrap();
    assert_eq!(ticks, 2);
}
