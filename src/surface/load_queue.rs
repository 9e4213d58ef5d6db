//! Intrusive tile load queue with per-frame insertion-point marking

use slotmap::SlotMap;

use super::tile::{Tile, TileKey};
use crate::render::Context;

/// Doubly-linked list of tiles needing load work, threaded through the
/// tiles' own link fields. Each frame marks the current head as the
/// insertion boundary; tiles requested during the frame are placed before
/// it, so fresh requests precede carryover from earlier frames while
/// keeping their within-frame order. Owns no tiles; all operations O(1).
pub(crate) struct TileLoadQueue {
    head: Option<TileKey>,
    tail: Option<TileKey>,
    insertion_point: Option<TileKey>,
    count: usize,
}

impl TileLoadQueue {
    pub fn new() -> Self {
        Self {
            head: None,
            tail: None,
            insertion_point: None,
            count: 0,
        }
    }

    pub fn head(&self) -> Option<TileKey> {
        self.head
    }

    pub fn len(&self) -> usize {
        self.count
    }

    /// Record the current head as this frame's insertion boundary.
    pub fn mark_insertion_point(&mut self) {
        self.insertion_point = self.head;
    }

    pub fn remove<C: Context>(&mut self, tiles: &mut SlotMap<TileKey, Tile<C>>, key: TileKey) {
        if !tiles[key].in_load_queue {
            return;
        }
        if self.insertion_point == Some(key) {
            self.insertion_point = tiles[key].load_next;
        }
        let previous = tiles[key].load_previous;
        let next = tiles[key].load_next;
        match previous {
            Some(p) => tiles[p].load_next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => tiles[n].load_previous = previous,
            None => self.tail = previous,
        }
        let tile = &mut tiles[key];
        tile.load_previous = None;
        tile.load_next = None;
        tile.in_load_queue = false;
        self.count -= 1;
    }

    /// Move-or-insert a tile immediately before the insertion boundary.
    pub fn insert_before_insertion_point<C: Context>(
        &mut self,
        tiles: &mut SlotMap<TileKey, Tile<C>>,
        key: TileKey,
    ) {
        if self.insertion_point == Some(key) {
            return;
        }
        if tiles[key].in_load_queue {
            self.remove(tiles, key);
        }
        match self.insertion_point {
            None => {
                // Append at the tail.
                match self.tail {
                    Some(t) => {
                        tiles[t].load_next = Some(key);
                        tiles[key].load_previous = Some(t);
                    }
                    None => self.head = Some(key),
                }
                tiles[key].load_next = None;
                self.tail = Some(key);
            }
            Some(boundary) => {
                let previous = tiles[boundary].load_previous;
                tiles[key].load_previous = previous;
                tiles[key].load_next = Some(boundary);
                tiles[boundary].load_previous = Some(key);
                match previous {
                    Some(p) => tiles[p].load_next = Some(key),
                    None => self.head = Some(key),
                }
            }
        }
        tiles[key].in_load_queue = true;
        self.count += 1;
    }
}
