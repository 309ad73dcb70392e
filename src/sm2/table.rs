use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use log::debug;

use crate::sm2::core::Elliptic;
use crate::sm2::point::AffinePoint;

/// The 2^w small multiples {0P, 1P, ..., (2^w - 1)P} of one base point.
#[derive(Debug)]
pub struct PrecomputedTable {
    width: u32,
    points: Vec<AffinePoint>,
}

impl PrecomputedTable {
    pub fn build(curve: &Elliptic, base: &AffinePoint, width: u32) -> Self {
        let size = 1usize << width;
        let mut points = Vec::with_capacity(size);
        points.push(AffinePoint::Infinity);
        for i in 1..size {
            let next = curve.add(&points[i - 1], base);
            points.push(next);
        }
        PrecomputedTable { width, points }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// index * P. On entry: index < 2^width.
    pub fn get(&self, index: usize) -> &AffinePoint {
        &self.points[index]
    }
}

type Slot = Arc<OnceLock<Arc<PrecomputedTable>>>;
type Key = (AffinePoint, u32);

/// Tables kept for base points other than the generator.
pub const TABLE_CAPACITY: usize = 32;

#[derive(Debug, Default)]
struct Slots {
    map: HashMap<Key, Slot>,
    // non-generator keys, oldest first
    order: VecDeque<Key>,
}

/// Tables keyed by (base point, window width), each built once while resident.
///
/// A slot is reserved under the map lock, then filled through its `OnceLock`
/// outside of it: concurrent first users of the same key block on the one
/// construction and all observe the finished table, while lookups for other
/// keys proceed.
///
/// Generator tables stay for the life of the cache. Any other base point
/// (ephemeral C1 points, peer public keys) shares a fixed number of slots and
/// the oldest is dropped first.
#[derive(Debug)]
pub struct TableCache {
    capacity: usize,
    slots: RwLock<Slots>,
}

impl Default for TableCache {
    fn default() -> Self {
        TableCache::with_capacity(TABLE_CAPACITY)
    }
}

impl TableCache {
    pub fn with_capacity(capacity: usize) -> Self {
        TableCache { capacity, slots: RwLock::new(Slots::default()) }
    }

    pub fn get_or_build(
        &self,
        curve: &Elliptic,
        base: &AffinePoint,
        width: u32,
    ) -> Arc<PrecomputedTable> {
        let key = (base.clone(), width);
        let existing = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .map
            .get(&key)
            .cloned();
        let slot = match existing {
            Some(slot) => slot,
            None => self.reserve(key, base == curve.generator()),
        };
        slot.get_or_init(|| {
            debug!("building {}-bit window table for {:?}", width, base);
            Arc::new(PrecomputedTable::build(curve, base, width))
        })
        .clone()
    }

    fn reserve(&self, key: Key, pinned: bool) -> Slot {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.map.get(&key) {
            return slot.clone();
        }
        if !pinned {
            while slots.order.len() >= self.capacity {
                match slots.order.pop_front() {
                    Some(oldest) => {
                        slots.map.remove(&oldest);
                    }
                    None => break,
                }
            }
            if self.capacity == 0 {
                return Slot::default();
            }
            slots.order.push_back(key.clone());
        }
        slots.map.entry(key).or_default().clone()
    }

    /// Number of published or reserved tables.
    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every table; tables already handed out stay valid.
    pub fn clear(&self) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.map.clear();
        slots.order.clear();
    }
}
