//! Intrusive LRU queue bounding tile residency

use slotmap::SlotMap;

use super::layer::ImageryLayerCollection;
use super::load_queue::TileLoadQueue;
use super::tile::{Tile, TileKey};
use crate::render::Context;

/// LRU list of resident tiles, most recently touched at the head, threaded
/// through the tiles' own link fields. A tile enters when it first consumes
/// resources and leaves when trimmed; trimming never evicts tiles touched
/// in the current frame, and never evicts level-zero roots.
pub(crate) struct TileReplacementQueue {
    head: Option<TileKey>,
    tail: Option<TileKey>,
    count: usize,
    current_frame: u64,
}

impl TileReplacementQueue {
    pub fn new() -> Self {
        Self {
            head: None,
            tail: None,
            count: 0,
            current_frame: 0,
        }
    }

    pub fn head(&self) -> Option<TileKey> {
        self.head
    }

    pub fn len(&self) -> usize {
        self.count
    }

    /// Begin a frame: tiles promoted from here on are stamped with
    /// `frame_number` and protected from trimming until the next frame.
    pub fn mark_start_of_render_frame(&mut self, frame_number: u64) {
        self.current_frame = frame_number;
    }

    /// Promote a tile to the head and stamp it with the current frame.
    pub fn mark_tile_rendered<C: Context>(
        &mut self,
        tiles: &mut SlotMap<TileKey, Tile<C>>,
        key: TileKey,
    ) {
        tiles[key].last_selection_frame = self.current_frame;
        if self.head == Some(key) {
            return;
        }
        if tiles[key].in_replacement_queue {
            self.unlink(tiles, key);
        } else {
            tiles[key].in_replacement_queue = true;
            self.count += 1;
        }
        tiles[key].replacement_previous = None;
        tiles[key].replacement_next = self.head;
        if let Some(old_head) = self.head {
            tiles[old_head].replacement_previous = Some(key);
        }
        self.head = Some(key);
        if self.tail.is_none() {
            self.tail = Some(key);
        }
    }

    pub fn remove<C: Context>(&mut self, tiles: &mut SlotMap<TileKey, Tile<C>>, key: TileKey) {
        if !tiles[key].in_replacement_queue {
            return;
        }
        self.unlink(tiles, key);
        let tile = &mut tiles[key];
        tile.replacement_previous = None;
        tile.replacement_next = None;
        tile.in_replacement_queue = false;
        self.count -= 1;
    }

    fn unlink<C: Context>(&mut self, tiles: &mut SlotMap<TileKey, Tile<C>>, key: TileKey) {
        let previous = tiles[key].replacement_previous;
        let next = tiles[key].replacement_next;
        match previous {
            Some(p) => tiles[p].replacement_next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => tiles[n].replacement_previous = previous,
            None => self.tail = previous,
        }
    }

    /// Evict least-recently-used tiles until at most `keep_count` remain,
    /// skipping tiles touched this frame and level-zero roots.
    pub fn trim_tiles<C: Context>(
        &mut self,
        tiles: &mut SlotMap<TileKey, Tile<C>>,
        layers: &mut ImageryLayerCollection<C>,
        load_queue: &mut TileLoadQueue,
        keep_count: usize,
    ) {
        let mut candidate = self.tail;
        while self.count > keep_count {
            let Some(key) = candidate else {
                break;
            };
            let previous = tiles[key].replacement_previous;
            let trimmable = tiles[key].last_selection_frame != self.current_frame
                && tiles[key].id.level != 0;
            if trimmable {
                self.evict(tiles, layers, load_queue, key);
                // Eviction can take the captured neighbor with it (a
                // descendant linked elsewhere in the list); restart from the
                // tail when that happens.
                candidate = match previous {
                    Some(p) if tiles.contains_key(p) && tiles[p].in_replacement_queue => Some(p),
                    Some(_) => self.tail,
                    None => None,
                };
            } else {
                candidate = previous;
            }
        }
    }

    /// Free a tile's resources in place: the subtree below it is destroyed
    /// and removed from the arena, its own state machine resets to
    /// `Unloaded`, and both queue memberships end. The tile itself stays in
    /// the arena so its parent's child pointers remain valid.
    pub fn evict<C: Context>(
        &mut self,
        tiles: &mut SlotMap<TileKey, Tile<C>>,
        layers: &mut ImageryLayerCollection<C>,
        load_queue: &mut TileLoadQueue,
        key: TileKey,
    ) {
        log::trace!("evicting tile {:?}", tiles[key].id);
        if let Some(children) = tiles[key].children.take() {
            for child in children {
                self.destroy_subtree(tiles, layers, load_queue, child);
            }
        }
        self.release_imagery(tiles, layers, key);
        tiles[key].reset_to_unloaded();
        load_queue.remove(tiles, key);
        self.remove(tiles, key);
    }

    fn destroy_subtree<C: Context>(
        &mut self,
        tiles: &mut SlotMap<TileKey, Tile<C>>,
        layers: &mut ImageryLayerCollection<C>,
        load_queue: &mut TileLoadQueue,
        key: TileKey,
    ) {
        if !tiles.contains_key(key) {
            return;
        }
        if let Some(children) = tiles[key].children.take() {
            for child in children {
                self.destroy_subtree(tiles, layers, load_queue, child);
            }
        }
        self.release_imagery(tiles, layers, key);
        load_queue.remove(tiles, key);
        self.remove(tiles, key);
        tiles.remove(key);
    }

    fn release_imagery<C: Context>(
        &mut self,
        tiles: &mut SlotMap<TileKey, Tile<C>>,
        layers: &mut ImageryLayerCollection<C>,
        key: TileKey,
    ) {
        for entry in std::mem::take(&mut tiles[key].imagery) {
            if let Some(layer) = layers.get_mut(entry.layer) {
                layer.release_tile_imagery(&entry);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{Ellipsoid, Rectangle, TileId, TilingScheme};
    use crate::provider::{ImageryPixels, TileMesh};
    use crate::surface::tile::TerrainState;

    struct NullContext;

    impl Context for NullContext {
        type Texture = ();
        type VertexArray = ();
        type ShaderProgram = ();
        type RenderState = ();
        type GlobeUniforms = ();

        fn maximum_texture_image_units(&self) -> usize {
            8
        }
        fn create_texture_2d(&mut self, _pixels: &ImageryPixels) -> Self::Texture {}
        fn create_vertex_array_from_mesh(&mut self, _mesh: &TileMesh) -> Self::VertexArray {}
        fn reproject_texture(
            &mut self,
            _texture: &Self::Texture,
            _extent: &Rectangle,
        ) -> Self::Texture {
        }
    }

    fn make_tile(
        tiles: &mut SlotMap<TileKey, Tile<NullContext>>,
        level: u32,
        x: u32,
    ) -> TileKey {
        let scheme = TilingScheme::geographic(Ellipsoid::WGS84);
        let key = tiles.insert(Tile::new(TileId::new(level, x, 0), &scheme, None));
        tiles[key].state = TerrainState::Ready;
        key
    }

    #[test]
    fn test_mark_tile_rendered_promotes_to_head() {
        let mut tiles = SlotMap::with_key();
        let a = make_tile(&mut tiles, 1, 0);
        let b = make_tile(&mut tiles, 1, 1);
        let mut queue = TileReplacementQueue::new();
        queue.mark_start_of_render_frame(1);
        queue.mark_tile_rendered(&mut tiles, a);
        queue.mark_tile_rendered(&mut tiles, b);
        assert_eq!(queue.head(), Some(b));
        assert_eq!(queue.len(), 2);
        // Re-touching does not duplicate.
        queue.mark_tile_rendered(&mut tiles, a);
        assert_eq!(queue.head(), Some(a));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_trim_keeps_tiles_touched_this_frame() {
        let mut tiles = SlotMap::with_key();
        let mut queue = TileReplacementQueue::new();
        let mut load_queue = TileLoadQueue::new();
        let mut layers = ImageryLayerCollection::new();

        queue.mark_start_of_render_frame(1);
        let old: Vec<_> = (0..5).map(|i| make_tile(&mut tiles, 1, i)).collect();
        for &k in &old {
            queue.mark_tile_rendered(&mut tiles, k);
        }
        queue.mark_start_of_render_frame(2);
        let fresh = make_tile(&mut tiles, 1, 10);
        queue.mark_tile_rendered(&mut tiles, fresh);

        queue.trim_tiles(&mut tiles, &mut layers, &mut load_queue, 3);
        assert_eq!(queue.len(), 3);
        // The fresh tile survives; the two oldest are gone.
        assert!(tiles[fresh].in_replacement_queue);
        assert!(!tiles[old[0]].in_replacement_queue);
        assert!(!tiles[old[1]].in_replacement_queue);
        assert_eq!(tiles[old[0]].state, TerrainState::Unloaded);
    }

    #[test]
    fn test_trim_never_evicts_level_zero() {
        let mut tiles = SlotMap::with_key();
        let mut queue = TileReplacementQueue::new();
        let mut load_queue = TileLoadQueue::new();
        let mut layers = ImageryLayerCollection::new();

        queue.mark_start_of_render_frame(1);
        let roots: Vec<_> = (0..4).map(|i| make_tile(&mut tiles, 0, i)).collect();
        for &k in &roots {
            queue.mark_tile_rendered(&mut tiles, k);
        }
        queue.mark_start_of_render_frame(2);
        queue.trim_tiles(&mut tiles, &mut layers, &mut load_queue, 0);
        // All pinned despite keep_count of zero.
        assert_eq!(queue.len(), 4);
        for &k in &roots {
            assert!(tiles[k].in_replacement_queue);
        }
    }

    #[test]
    fn test_evict_destroys_subtree() {
        let scheme = TilingScheme::geographic(Ellipsoid::WGS84);
        let mut tiles: SlotMap<TileKey, Tile<NullContext>> = SlotMap::with_key();
        let mut queue = TileReplacementQueue::new();
        let mut load_queue = TileLoadQueue::new();
        let mut layers = ImageryLayerCollection::new();

        let parent = tiles.insert(Tile::new(TileId::new(1, 0, 0), &scheme, None));
        tiles[parent].state = TerrainState::Ready;
        let children = Tile::ensure_children(&mut tiles, parent, &scheme);
        queue.mark_start_of_render_frame(1);
        queue.mark_tile_rendered(&mut tiles, parent);
        for child in children {
            tiles[child].state = TerrainState::Ready;
            queue.mark_tile_rendered(&mut tiles, child);
        }
        assert_eq!(tiles.len(), 5);

        queue.evict(&mut tiles, &mut layers, &mut load_queue, parent);
        // Children removed from the arena, parent reset but still present.
        assert_eq!(tiles.len(), 1);
        assert_eq!(queue.len(), 0);
        assert!(tiles[parent].children().is_none());
        assert_eq!(tiles[parent].state, TerrainState::Unloaded);
    }
}
