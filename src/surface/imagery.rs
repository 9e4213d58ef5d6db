//! Reference-counted imagery pyramid storage

use std::collections::HashMap;

use slotmap::{new_key_type, SlotMap};

use crate::geo::{Rectangle, TileId, TilingScheme};
use crate::provider::ImageryPixels;
use crate::render::Context;

new_key_type! {
    /// Stable handle of an imagery tile within one layer's pyramid.
    pub struct ImageryKey;
}

/// Loading state of one imagery tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageryState {
    /// Stand-in created while the layer's provider was not yet ready; the
    /// pump replaces it with real skeletons once it is.
    Placeholder,
    Unloaded,
    Transitioning,
    Received,
    TextureLoaded,
    Ready,
    Failed,
    /// The provider stated the tile does not exist.
    Invalid,
}

/// One texture tile of a layer's pyramid, shared by every terrain tile it
/// drapes and by descendants using it as a fallback.
pub struct Imagery<C: Context> {
    pub id: TileId,
    pub state: ImageryState,
    pub(crate) parent: Option<ImageryKey>,
    pub extent: Rectangle,
    pub(crate) pixels: Option<ImageryPixels>,
    pub texture: Option<C::Texture>,
    pub(crate) reference_count: u32,
}

/// Per-layer imagery arena with lookup by tile id. Imagery is recycled when
/// its reference count drops to zero; parents hold no reference to children,
/// children hold one to their parent.
pub(crate) struct ImageryCache<C: Context> {
    imagery: SlotMap<ImageryKey, Imagery<C>>,
    by_id: HashMap<TileId, ImageryKey>,
    placeholder: Option<ImageryKey>,
}

impl<C: Context> ImageryCache<C> {
    pub fn new() -> Self {
        Self {
            imagery: SlotMap::with_key(),
            by_id: HashMap::new(),
            placeholder: None,
        }
    }

    pub fn get(&self, key: ImageryKey) -> Option<&Imagery<C>> {
        self.imagery.get(key)
    }

    pub fn get_mut(&mut self, key: ImageryKey) -> Option<&mut Imagery<C>> {
        self.imagery.get_mut(key)
    }

    pub fn state(&self, key: ImageryKey) -> ImageryState {
        self.imagery
            .get(key)
            .map(|imagery| imagery.state)
            .unwrap_or(ImageryState::Invalid)
    }

    pub fn parent_of(&self, key: ImageryKey) -> Option<ImageryKey> {
        self.imagery.get(key).and_then(|imagery| imagery.parent)
    }

    pub fn len(&self) -> usize {
        self.imagery.len()
    }

    pub fn reference_count(&self, key: ImageryKey) -> u32 {
        self.imagery
            .get(key)
            .map(|imagery| imagery.reference_count)
            .unwrap_or(0)
    }

    /// Get-or-create the imagery for `id` with one reference added. The
    /// ancestor chain down to `minimum_level` is created alongside so
    /// fallback always has somewhere to go.
    pub fn acquire(
        &mut self,
        id: TileId,
        scheme: &TilingScheme,
        minimum_level: u32,
    ) -> ImageryKey {
        if let Some(&key) = self.by_id.get(&id) {
            self.imagery[key].reference_count += 1;
            return key;
        }
        let parent = if id.level > minimum_level {
            id.parent().map(|pid| self.acquire(pid, scheme, minimum_level))
        } else {
            None
        };
        let key = self.imagery.insert(Imagery {
            id,
            state: ImageryState::Unloaded,
            parent,
            extent: scheme.tile_extent(id),
            pixels: None,
            texture: None,
            reference_count: 1,
        });
        self.by_id.insert(id, key);
        key
    }

    /// The layer's placeholder imagery, created on first use, with one
    /// reference added. Not registered in the id index.
    pub fn acquire_placeholder(&mut self) -> ImageryKey {
        if let Some(key) = self.placeholder {
            self.imagery[key].reference_count += 1;
            return key;
        }
        let key = self.imagery.insert(Imagery {
            id: TileId::new(0, 0, 0),
            state: ImageryState::Placeholder,
            parent: None,
            extent: Rectangle::MAX_VALUE,
            pixels: None,
            texture: None,
            reference_count: 1,
        });
        self.placeholder = Some(key);
        key
    }

    pub fn add_reference(&mut self, key: ImageryKey) {
        if let Some(imagery) = self.imagery.get_mut(key) {
            imagery.reference_count += 1;
        }
    }

    /// Drop one reference; at zero the imagery (and its texture) is removed
    /// and the reference it held on its parent is released.
    pub fn release(&mut self, key: ImageryKey) {
        let parent = {
            let Some(imagery) = self.imagery.get_mut(key) else {
                return;
            };
            debug_assert!(imagery.reference_count > 0);
            imagery.reference_count = imagery.reference_count.saturating_sub(1);
            if imagery.reference_count > 0 {
                return;
            }
            imagery.parent
        };
        if let Some(imagery) = self.imagery.remove(key) {
            self.by_id.remove(&imagery.id);
        }
        if self.placeholder == Some(key) {
            self.placeholder = None;
        }
        if let Some(parent) = parent {
            self.release(parent);
        }
    }
}
