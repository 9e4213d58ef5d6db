//! Imagery layer coordination: skeleton creation on live tiles, block
//! ordering under add/remove/move, placeholder swap, and parent fallback.

mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use globe3d::{
    ImageryLayer, ImageryLayerCollection, ImageryState, Surface, SurfaceOptions, TileId,
};
use support::*;

/// Adding a second layer after the roots loaded reloads them in place and
/// the command batches grow to two textures.
#[test]
fn test_adding_layer_reloads_and_batches_two_textures() {
    let (mut surface, keys) = surface_with_layers(1);
    let mut context = MockContext::new();
    run_frames(
        &mut surface,
        &mut context,
        camera_above_origin(20_000_000.0),
        0..10,
    );
    assert_eq!(surface.render_lists()[1].len(), 2);

    let provider = MockImageryProvider::new(two_tile_mercator_scheme()).with_tile_size(512);
    let second = surface
        .imagery_layers_mut()
        .add(ImageryLayer::new(Box::new(provider)));

    // One frame in: skeletons are appended after the existing block and the
    // tiles are loading again.
    run_frames(
        &mut surface,
        &mut context,
        camera_above_origin(20_000_000.0),
        10..11,
    );
    let roots: Vec<_> = surface.roots().to_vec();
    for &root in &roots {
        let tile = surface.tile(root).unwrap();
        assert_eq!(tile.imagery.len(), 2);
        assert_eq!(tile.imagery[0].layer, keys[0]);
        assert_eq!(tile.imagery[1].layer, second);
        assert!(!tile.done_loading);
        // Still renderable with the textures it already has.
        assert!(tile.renderable);
    }

    run_frames(
        &mut surface,
        &mut context,
        camera_above_origin(20_000_000.0),
        11..20,
    );
    for &root in &roots {
        assert!(surface.tile(root).unwrap().done_loading);
        assert_eq!(ready_texture_count(&surface, root), 2);
        assert_eq!(
            stack_layer_sequence(&surface, root),
            vec![keys[0], second]
        );
    }
    assert_eq!(surface.render_lists()[2].len(), 2);

    let commands = run_frames(
        &mut surface,
        &mut context,
        camera_above_origin(20_000_000.0),
        20..21,
    );
    assert_eq!(commands.len(), 2);
    for command in &commands {
        assert_eq!(command.uniforms.day_textures.len(), 2);
        assert_eq!(command.shader_program.num_day_textures, 2);
    }
}

/// Removing the bottom layer splices its block out; removing the last
/// layer leaves the tiles unrenderable.
#[test]
fn test_removing_layers_splices_blocks_and_clears_renderable() {
    let (mut surface, keys) = surface_with_layers(2);
    let mut context = MockContext::new();
    run_frames(
        &mut surface,
        &mut context,
        camera_above_origin(20_000_000.0),
        0..15,
    );
    assert_eq!(surface.render_lists()[2].len(), 2);

    surface.imagery_layers_mut().remove(keys[0]);
    run_frames(
        &mut surface,
        &mut context,
        camera_above_origin(20_000_000.0),
        15..17,
    );
    let roots: Vec<_> = surface.roots().to_vec();
    for &root in &roots {
        let tile = surface.tile(root).unwrap();
        assert_eq!(tile.imagery.len(), 1);
        assert_eq!(tile.imagery[0].layer, keys[1]);
        assert!(tile.renderable);
    }
    assert_eq!(surface.render_lists()[1].len(), 2);

    let commands = {
        surface.imagery_layers_mut().remove(keys[1]);
        run_frames(
            &mut surface,
            &mut context,
            camera_above_origin(20_000_000.0),
            17..18,
        )
    };
    for &root in &roots {
        let tile = surface.tile(root).unwrap();
        assert!(tile.imagery.is_empty());
        assert!(!tile.renderable);
    }
    assert_eq!(surface.debug().tiles_rendered, 0);
    assert!(commands.is_empty());
}

#[test]
fn test_layer_move_reorders_blocks() {
    let (mut surface, keys) = surface_with_layers(2);
    let mut context = MockContext::new();
    run_frames(
        &mut surface,
        &mut context,
        camera_above_origin(20_000_000.0),
        0..15,
    );
    let roots: Vec<_> = surface.roots().to_vec();

    // Moving a layer to its current index leaves every stack untouched.
    let before: Vec<_> = surface.tile(roots[0]).unwrap().imagery
        .iter()
        .map(|entry| (entry.layer, entry.imagery))
        .collect();
    surface.imagery_layers_mut().move_layer(keys[0], 0);
    run_frames(
        &mut surface,
        &mut context,
        camera_above_origin(20_000_000.0),
        15..16,
    );
    let after: Vec<_> = surface.tile(roots[0]).unwrap().imagery
        .iter()
        .map(|entry| (entry.layer, entry.imagery))
        .collect();
    assert_eq!(before, after);

    // Moving the bottom layer to the top reorders the blocks in place.
    surface.imagery_layers_mut().move_layer(keys[0], 1);
    run_frames(
        &mut surface,
        &mut context,
        camera_above_origin(20_000_000.0),
        16..17,
    );
    assert_eq!(
        surface.imagery_layers().order(),
        &[keys[1], keys[0]]
    );
    for &root in &roots {
        assert_eq!(
            stack_layer_sequence(&surface, root),
            vec![keys[1], keys[0]]
        );
        // No reload was triggered by the move.
        assert!(surface.tile(root).unwrap().done_loading);
    }
}

/// While a layer's provider is not ready, tiles carry a placeholder entry;
/// once it becomes ready the placeholder is swapped for real skeletons at
/// the same stack position.
#[test]
fn test_placeholder_replaced_when_provider_becomes_ready() {
    let flag = Arc::new(AtomicBool::new(false));
    let provider = MockImageryProvider::new(two_tile_mercator_scheme())
        .with_tile_size(512)
        .with_ready_flag(flag.clone());
    let mut layers = ImageryLayerCollection::new();
    let layer_key = layers.add(ImageryLayer::new(Box::new(provider)));
    let mut surface = Surface::new(
        SurfaceOptions::new()
            .terrain_provider(Box::new(MockTerrainProvider::new(two_tile_mercator_scheme())))
            .imagery_layers(layers),
    )
    .unwrap();
    let mut context = MockContext::new();

    run_frames(
        &mut surface,
        &mut context,
        camera_above_origin(20_000_000.0),
        0..5,
    );
    let roots: Vec<_> = surface.roots().to_vec();
    for &root in &roots {
        let tile = surface.tile(root).unwrap();
        assert_eq!(tile.imagery.len(), 1);
        let layer = surface.imagery_layers().get(layer_key).unwrap();
        assert_eq!(
            layer.imagery_state(tile.imagery[0].imagery),
            ImageryState::Placeholder
        );
        assert!(!tile.done_loading);
    }

    flag.store(true, Ordering::Relaxed);
    run_frames(
        &mut surface,
        &mut context,
        camera_above_origin(20_000_000.0),
        5..15,
    );
    for &root in &roots {
        let tile = surface.tile(root).unwrap();
        assert!(tile.done_loading);
        assert_eq!(ready_texture_count(&surface, root), 1);
    }
    assert_eq!(surface.render_lists()[1].len(), 2);
}

/// Failed imagery substitutes the nearest live ancestor: the original stays
/// referenced, and the texture mapping is computed against the ancestor's
/// extent.
#[test]
fn test_failed_imagery_falls_back_to_parent() {
    // Terrain error tuned so level-zero terrain asks for level-1 imagery.
    let terrain = MockTerrainProvider::new(two_tile_mercator_scheme())
        .with_level_zero_error(19567.5);
    let provider = MockImageryProvider::new(two_tile_mercator_scheme())
        .with_tile_size(512)
        .with_fail_level(1);
    let mut layers = ImageryLayerCollection::new();
    let layer_key = layers.add(ImageryLayer::new(Box::new(provider)));
    let mut surface = Surface::new(
        SurfaceOptions::new()
            .terrain_provider(Box::new(terrain))
            .imagery_layers(layers),
    )
    .unwrap();
    let mut context = MockContext::new();

    run_frames(
        &mut surface,
        &mut context,
        camera_above_origin(20_000_000.0),
        0..15,
    );

    let west_root = surface.roots()[0];
    let tile = surface.tile(west_root).unwrap();
    // Level-1 imagery splits the root into four skeletons.
    assert_eq!(tile.imagery.len(), 4);
    let layer = surface.imagery_layers().get(layer_key).unwrap();
    for entry in &tile.imagery {
        // The bound imagery is now the level-zero ancestor, ready.
        assert_eq!(layer.imagery_state(entry.imagery), ImageryState::Ready);
        assert_eq!(layer.imagery_id(entry.imagery).unwrap(), TileId::new(0, 0, 0));
        // The failed original is kept alive by the entry.
        let original = entry.original_imagery.expect("original imagery retained");
        assert_eq!(layer.imagery_state(original), ImageryState::Failed);
        assert!(layer.imagery_reference_count(original) >= 1);
        // Tile extent equals the ancestor extent here, so the mapping is
        // the identity.
        let ts = entry.texture_translation_and_scale.unwrap();
        assert!(ts.x.abs() < 1e-12 && ts.y.abs() < 1e-12);
        assert!((ts.z - 1.0).abs() < 1e-12 && (ts.w - 1.0).abs() < 1e-12);
    }
    assert!(tile.done_loading);
    // All four entries count as ready textures.
    assert_eq!(surface.render_lists()[4].len(), 2);
}
