use tessel_chunk::InstanceChunk;
use tessel_geom::RegionId;
use tessel_tiles::GeometryType;

/// Generational index into a [`ChunkArena`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId {
    pub index: u32,
    pub generation: u32,
}

/// Stable reference to a chunk: which registry, which region list, which arena slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChunkHandle {
    pub geometry: GeometryType,
    pub region: RegionId,
    pub id: ChunkId,
}

#[derive(Debug, Clone)]
struct ArenaSlot {
    generation: u32,
    chunk: Option<InstanceChunk>,
}

/// Slot arena of chunks. Freed slots are recycled with a bumped generation so
/// stale ids never resolve to a newer chunk.
#[derive(Debug, Clone, Default)]
pub struct ChunkArena {
    slots: Vec<ArenaSlot>,
    free: Vec<u32>,
    live: usize,
}

impl ChunkArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chunk: InstanceChunk) -> ChunkId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.chunk = Some(chunk);
            return ChunkId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(ArenaSlot {
            generation: 0,
            chunk: Some(chunk),
        });
        ChunkId {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, id: ChunkId) -> Option<&InstanceChunk> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.chunk.as_ref())
    }

    pub fn get_mut(&mut self, id: ChunkId) -> Option<&mut InstanceChunk> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.chunk.as_mut())
    }

    pub fn remove(&mut self, id: ChunkId) -> Option<InstanceChunk> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let chunk = slot.chunk.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(chunk)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChunkId, &InstanceChunk)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.chunk.as_ref().map(|c| {
                (
                    ChunkId {
                        index: i as u32,
                        generation: s.generation,
                    },
                    c,
                )
            })
        })
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.live = 0;
    }
}
