//! Capacity-bound instance chunks.
#![forbid(unsafe_code)]

use hashbrown::HashMap;
use tessel_geom::RegionId;
use tessel_tiles::{GeometryType, TileKey, TileRecord};

/// One occupied instance slot.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ChunkInstance {
    pub key: TileKey,
    pub record: TileRecord,
}

/// Returned by [`InstanceChunk::try_insert`] when every slot is taken.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChunkFull;

/// A slot that changed index because the last instance was swapped into a
/// freed slot. The owner must re-point its own index at `to`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SlotMove {
    pub key: TileKey,
    pub from: u32,
    pub to: u32,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SlotRemoval {
    pub slot: u32,
    pub removed: ChunkInstance,
    pub moved: Option<SlotMove>,
}

/// Result of a self-audit; all zero on a healthy chunk.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkAudit {
    /// key_to_slot entries pointing at a slot >= occupied_count.
    pub dangling: usize,
    /// key_to_slot entries whose slot holds a different key.
    pub mismatched: usize,
    /// Occupied slots with no key_to_slot entry.
    pub unindexed: usize,
    pub over_capacity: bool,
}

impl ChunkAudit {
    #[inline]
    pub fn orphaned(&self) -> usize {
        self.dangling + self.mismatched
    }

    #[inline]
    pub fn is_clean(&self) -> bool {
        self.orphaned() == 0 && self.unindexed == 0 && !self.over_capacity
    }
}

/// Dense instance table for one geometry type inside one region.
///
/// Slots `0..occupied` are always live. Removal moves the last instance into
/// the freed slot, so freed slots are reused immediately and the table never
/// fragments.
#[derive(Clone, Debug)]
pub struct InstanceChunk {
    geometry: GeometryType,
    region: RegionId,
    capacity: usize,
    slots: Vec<ChunkInstance>,
    key_to_slot: HashMap<TileKey, u32>,
}

impl InstanceChunk {
    pub fn new(geometry: GeometryType, region: RegionId, capacity: usize) -> Self {
        Self {
            geometry,
            region,
            capacity,
            slots: Vec::with_capacity(capacity.min(1024)),
            key_to_slot: HashMap::new(),
        }
    }

    #[inline]
    pub fn geometry(&self) -> GeometryType {
        self.geometry
    }

    #[inline]
    pub fn region(&self) -> RegionId {
        self.region
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn occupied(&self) -> usize {
        self.slots.len()
    }

    /// Instances a renderer would draw; always derived from occupancy.
    #[inline]
    pub fn visible_instances(&self) -> usize {
        self.occupied()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn occupancy(&self) -> f32 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.slots.len() as f32 / self.capacity as f32
    }

    #[inline]
    pub fn contains(&self, key: TileKey) -> bool {
        self.key_to_slot.contains_key(&key)
    }

    #[inline]
    pub fn slot_of(&self, key: TileKey) -> Option<u32> {
        self.key_to_slot.get(&key).copied()
    }

    #[inline]
    pub fn instance(&self, slot: u32) -> Option<&ChunkInstance> {
        self.slots.get(slot as usize)
    }

    pub fn instances(&self) -> impl Iterator<Item = &ChunkInstance> {
        self.slots.iter()
    }

    /// Places `key` into the next free slot. A key already held by this chunk
    /// is overwritten in place and keeps its slot.
    pub fn try_insert(&mut self, key: TileKey, record: TileRecord) -> Result<u32, ChunkFull> {
        debug_assert_eq!(record.geometry(), self.geometry);
        if let Some(&slot) = self.key_to_slot.get(&key) {
            self.slots[slot as usize].record = record;
            return Ok(slot);
        }
        if self.is_full() {
            return Err(ChunkFull);
        }
        let slot = self.slots.len() as u32;
        self.slots.push(ChunkInstance { key, record });
        self.key_to_slot.insert(key, slot);
        Ok(slot)
    }

    /// Replaces the record held for `key` without moving it.
    pub fn update_record(&mut self, key: TileKey, record: TileRecord) -> Option<u32> {
        let slot = *self.key_to_slot.get(&key)?;
        self.slots[slot as usize].record = record;
        Some(slot)
    }

    /// Frees the slot held by `key`, compacting by swapping the last instance in.
    pub fn remove(&mut self, key: TileKey) -> Option<SlotRemoval> {
        let slot = self.key_to_slot.remove(&key)?;
        let idx = slot as usize;
        if idx >= self.slots.len() {
            // Index pointed past the table; nothing to free.
            return None;
        }
        let last = self.slots.len() - 1;
        let removed = self.slots.swap_remove(idx);
        let moved = if idx != last {
            let moved_key = self.slots[idx].key;
            self.key_to_slot.insert(moved_key, slot);
            Some(SlotMove {
                key: moved_key,
                from: last as u32,
                to: slot,
            })
        } else {
            None
        };
        Some(SlotRemoval {
            slot,
            removed,
            moved,
        })
    }

    /// Cross-checks `key_to_slot` against the slot table.
    pub fn audit(&self) -> ChunkAudit {
        let mut out = ChunkAudit {
            over_capacity: self.slots.len() > self.capacity,
            ..ChunkAudit::default()
        };
        for (key, &slot) in self.key_to_slot.iter() {
            match self.slots.get(slot as usize) {
                None => out.dangling += 1,
                Some(inst) if inst.key != *key => out.mismatched += 1,
                Some(_) => {}
            }
        }
        for inst in &self.slots {
            if !self.key_to_slot.contains_key(&inst.key) {
                out.unindexed += 1;
            }
        }
        out
    }

    #[inline]
    pub fn indexed_keys(&self) -> usize {
        self.key_to_slot.len()
    }

    /// Points `key` at an arbitrary slot without touching the table.
    #[cfg(any(test, feature = "fault-injection"))]
    pub fn debug_point_key_at(&mut self, key: TileKey, slot: u32) {
        self.key_to_slot.insert(key, slot);
    }

    /// Drops the last instance without updating `key_to_slot`.
    #[cfg(any(test, feature = "fault-injection"))]
    pub fn debug_truncate_slots(&mut self) -> Option<ChunkInstance> {
        self.slots.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_geom::QuantizedPos;
    use tessel_tiles::{MeshMode, Orientation, TileFlags};

    fn rec(x: i64) -> (TileKey, TileRecord) {
        let record = TileRecord {
            position: QuantizedPos::new(x, 0, 0),
            mesh_mode: MeshMode::Square,
            orientation: Orientation::Floor,
            transform: None,
            flags: TileFlags::NONE,
        };
        (TileKey(x as u128 + 1), record)
    }

    fn chunk(capacity: usize) -> InstanceChunk {
        InstanceChunk::new(GeometryType::Square, RegionId::new(0, 0, 0), capacity)
    }

    #[test]
    fn full_chunk_rejects_new_keys_but_accepts_overwrite() {
        let mut c = chunk(2);
        let (k0, r0) = rec(0);
        let (k1, r1) = rec(1);
        let (k2, r2) = rec(2);
        assert_eq!(c.try_insert(k0, r0), Ok(0));
        assert_eq!(c.try_insert(k1, r1), Ok(1));
        assert_eq!(c.try_insert(k2, r2), Err(ChunkFull));
        let mut r1b = r1;
        r1b.flags = TileFlags::HIDDEN;
        assert_eq!(c.try_insert(k1, r1b), Ok(1));
        assert_eq!(c.occupied(), 2);
        assert_eq!(c.instance(1).unwrap().record.flags, TileFlags::HIDDEN);
    }

    #[test]
    fn removing_middle_slot_swaps_last_in() {
        let mut c = chunk(4);
        let keys: Vec<TileKey> = (0..4)
            .map(|i| {
                let (k, r) = rec(i);
                c.try_insert(k, r).unwrap();
                k
            })
            .collect();
        let removal = c.remove(keys[1]).unwrap();
        assert_eq!(removal.slot, 1);
        assert_eq!(
            removal.moved,
            Some(SlotMove {
                key: keys[3],
                from: 3,
                to: 1
            })
        );
        assert_eq!(c.occupied(), 3);
        assert_eq!(c.slot_of(keys[3]), Some(1));
        assert_eq!(c.instance(1).unwrap().key, keys[3]);
        assert!(c.audit().is_clean());
    }

    #[test]
    fn removing_last_slot_moves_nothing() {
        let mut c = chunk(4);
        let (k0, r0) = rec(0);
        let (k1, r1) = rec(1);
        c.try_insert(k0, r0).unwrap();
        c.try_insert(k1, r1).unwrap();
        let removal = c.remove(k1).unwrap();
        assert_eq!(removal.moved, None);
        assert!(c.remove(k1).is_none());
        assert_eq!(c.occupied(), 1);
    }

    #[test]
    fn audit_reports_injected_faults() {
        let mut c = chunk(4);
        let (k0, r0) = rec(0);
        let (k1, r1) = rec(1);
        c.try_insert(k0, r0).unwrap();
        c.try_insert(k1, r1).unwrap();
        c.debug_point_key_at(k0, 1);
        let a = c.audit();
        assert_eq!(a.mismatched, 1);
        c.debug_truncate_slots();
        let a = c.audit();
        assert_eq!(a.dangling, 2);
        assert_eq!(a.orphaned(), 2);
    }
}
