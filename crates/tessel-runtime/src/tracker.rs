use std::fmt;

use tessel_tiles::{TileKey, TileRecord};
use thiserror::Error;

/// What kind of edit an operation groups.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Paint,
    AreaFill,
    AreaErase,
    Edit,
    Import,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Paint => "paint",
            OperationKind::AreaFill => "area-fill",
            OperationKind::AreaErase => "area-erase",
            OperationKind::Edit => "edit",
            OperationKind::Import => "import",
        };
        f.write_str(s)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub u64);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("operation {0} is still in progress")]
    InProgress(u64),
    #[error("no operation in progress")]
    Idle,
}

/// A single reversible change recorded during an operation.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackedChange {
    Placed {
        key: TileKey,
        prior: Option<TileRecord>,
    },
    Erased {
        key: TileKey,
        prior: TileRecord,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OperationSummary {
    pub id: OperationId,
    pub kind: OperationKind,
    /// Tiles touched (placed, replaced, or erased).
    pub touched: usize,
    /// Net change in tracked tile count.
    pub net: isize,
}

#[derive(Debug, Clone)]
struct PendingOperation {
    id: OperationId,
    kind: OperationKind,
    changes: Vec<TrackedChange>,
    net: isize,
}

/// Running tally of placed tiles, plus the change log of the operation in flight.
///
/// Once no operation is pending the tally must equal the store count.
#[derive(Debug, Clone, Default)]
pub struct PlacementTracker {
    tracked: usize,
    pending: Option<PendingOperation>,
    next_id: u64,
    committed: u64,
    aborted: u64,
}

impl PlacementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, kind: OperationKind) -> Result<OperationId, TrackerError> {
        if let Some(p) = &self.pending {
            return Err(TrackerError::InProgress(p.id.0));
        }
        let id = OperationId(self.next_id);
        self.next_id += 1;
        self.pending = Some(PendingOperation {
            id,
            kind,
            changes: Vec::new(),
            net: 0,
        });
        Ok(id)
    }

    pub fn commit(&mut self) -> Result<OperationSummary, TrackerError> {
        let p = self.pending.take().ok_or(TrackerError::Idle)?;
        self.committed += 1;
        Ok(Self::summarize(&p))
    }

    /// Ends the pending operation and hands back its changes, oldest first,
    /// for the caller to revert.
    pub fn take_for_abort(&mut self) -> Result<(OperationSummary, Vec<TrackedChange>), TrackerError> {
        let p = self.pending.take().ok_or(TrackerError::Idle)?;
        self.aborted += 1;
        let summary = Self::summarize(&p);
        Ok((summary, p.changes))
    }

    fn summarize(p: &PendingOperation) -> OperationSummary {
        OperationSummary {
            id: p.id,
            kind: p.kind,
            touched: p.changes.len(),
            net: p.net,
        }
    }

    pub fn record_place(&mut self, key: TileKey, prior: Option<TileRecord>) {
        let added = prior.is_none();
        if added {
            self.tracked += 1;
        }
        if let Some(p) = &mut self.pending {
            if added {
                p.net += 1;
            }
            p.changes.push(TrackedChange::Placed { key, prior });
        }
    }

    pub fn record_erase(&mut self, key: TileKey, prior: TileRecord) {
        self.tracked = self.tracked.saturating_sub(1);
        if let Some(p) = &mut self.pending {
            p.net -= 1;
            p.changes.push(TrackedChange::Erased { key, prior });
        }
    }

    #[inline]
    pub fn tracked_count(&self) -> usize {
        self.tracked
    }

    /// Tiles touched by the operation in flight, zero when idle.
    pub fn pending_count(&self) -> usize {
        self.pending.as_ref().map_or(0, |p| p.changes.len())
    }

    pub fn active(&self) -> Option<(OperationId, OperationKind)> {
        self.pending.as_ref().map(|p| (p.id, p.kind))
    }

    #[inline]
    pub fn is_settled(&self) -> bool {
        self.pending.is_none()
    }

    pub fn committed_operations(&self) -> u64 {
        self.committed
    }

    pub fn aborted_operations(&self) -> u64 {
        self.aborted
    }

    /// Resets the tally to a known count, dropping any pending log.
    pub(crate) fn reset(&mut self, tracked: usize) {
        self.tracked = tracked;
        self.pending = None;
    }

    #[cfg(any(test, feature = "fault-injection"))]
    pub(crate) fn debug_skew(&mut self, delta: isize) {
        self.tracked = self.tracked.saturating_add_signed(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_geom::QuantizedPos;
    use tessel_tiles::{MeshMode, Orientation, TileFlags};

    fn rec() -> TileRecord {
        TileRecord {
            position: QuantizedPos::new(0, 0, 0),
            mesh_mode: MeshMode::Square,
            orientation: Orientation::Floor,
            transform: None,
            flags: TileFlags::NONE,
        }
    }

    #[test]
    fn begin_twice_is_rejected() {
        let mut t = PlacementTracker::new();
        let id = t.begin(OperationKind::AreaFill).unwrap();
        assert_eq!(t.begin(OperationKind::Paint), Err(TrackerError::InProgress(id.0)));
        assert!(t.commit().is_ok());
        assert_eq!(t.commit(), Err(TrackerError::Idle));
        assert_eq!(t.committed_operations(), 1);
    }

    #[test]
    fn replacement_does_not_change_tally() {
        let mut t = PlacementTracker::new();
        t.begin(OperationKind::Paint).unwrap();
        t.record_place(TileKey(1), None);
        t.record_place(TileKey(1), Some(rec()));
        assert_eq!(t.tracked_count(), 1);
        assert_eq!(t.pending_count(), 2);
        let s = t.commit().unwrap();
        assert_eq!(s.net, 1);
        assert_eq!(s.touched, 2);
        assert_eq!(t.pending_count(), 0);
    }

    #[test]
    fn abort_hands_back_changes_in_order() {
        let mut t = PlacementTracker::new();
        t.record_place(TileKey(9), None);
        t.begin(OperationKind::AreaErase).unwrap();
        t.record_erase(TileKey(9), rec());
        let (summary, changes) = t.take_for_abort().unwrap();
        assert_eq!(summary.net, -1);
        assert_eq!(changes, vec![TrackedChange::Erased { key: TileKey(9), prior: rec() }]);
        assert_eq!(t.aborted_operations(), 1);
        assert!(t.is_settled());
    }
}
