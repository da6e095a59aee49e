use tessel_geom::{QuantizedPos, RegionId};

/// Maps quantized positions to region buckets. Total and pure.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegionIndexer {
    extent: i64,
}

impl RegionIndexer {
    /// `extent` is the region edge length in quantized units.
    pub fn new(extent: i64) -> Self {
        Self {
            extent: extent.max(1),
        }
    }

    #[inline]
    pub fn extent(&self) -> i64 {
        self.extent
    }

    #[inline]
    pub fn region_of(&self, pos: QuantizedPos) -> RegionId {
        RegionId::containing(pos, self.extent)
    }
}
