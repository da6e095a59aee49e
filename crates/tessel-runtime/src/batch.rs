//! Batched and incremental area operations.

use std::time::{Duration, Instant};

use tessel_geom::{TileBounds, Vec3};
use tessel_tiles::{PlaceRequest, TileError, TileKey, TileRecord};

use crate::world::TileWorld;

/// Regular lattice `min + step * (i, j, k)` covering a bounds box, walked x
/// fastest, then z, then y.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GridCells {
    origin: Vec3,
    step: f32,
    dims: [u64; 3],
    total: u64,
    next: u64,
}

impl GridCells {
    pub fn new(bounds: TileBounds, step: f32) -> Result<Self, TileError> {
        if !step.is_finite() || step <= 0.0 {
            return Err(TileError::InvalidStep(step));
        }
        if !bounds.min.is_finite() || !bounds.max.is_finite() {
            return Err(TileError::PositionOutOfRange {
                x: bounds.min.x,
                y: bounds.min.y,
                z: bounds.min.z,
            });
        }
        let size = bounds.size();
        // Small slack so an extent that is an exact multiple of `step` keeps its far edge.
        let axis = |extent: f32| (f64::from(extent) / f64::from(step) + 1e-6).floor() as u64 + 1;
        let dims = [axis(size.x), axis(size.z), axis(size.y)];
        let total = dims[0].saturating_mul(dims[1]).saturating_mul(dims[2]);
        Ok(Self {
            origin: bounds.min,
            step,
            dims,
            total,
            next: 0,
        })
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[inline]
    pub fn remaining(&self) -> u64 {
        self.total - self.next
    }

    fn at(&self, i: u64) -> Vec3 {
        let ix = i % self.dims[0];
        let iz = (i / self.dims[0]) % self.dims[1];
        let iy = i / (self.dims[0] * self.dims[1]);
        let s = f64::from(self.step);
        Vec3::new(
            (f64::from(self.origin.x) + ix as f64 * s) as f32,
            (f64::from(self.origin.y) + iy as f64 * s) as f32,
            (f64::from(self.origin.z) + iz as f64 * s) as f32,
        )
    }

    /// Far corner of the lattice.
    pub fn far_corner(&self) -> Vec3 {
        self.at(self.total.saturating_sub(1))
    }
}

impl Iterator for GridCells {
    type Item = Vec3;

    fn next(&mut self) -> Option<Vec3> {
        if self.next >= self.total {
            return None;
        }
        let p = self.at(self.next);
        self.next += 1;
        Some(p)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.remaining()).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Tiles added at previously empty keys.
    pub placed: usize,
    /// Tiles that overwrote an existing one.
    pub replaced: usize,
}

impl BatchOutcome {
    fn record(&mut self, prior: Option<TileRecord>) {
        match prior {
            Some(_) => self.replaced += 1,
            None => self.placed += 1,
        }
    }

    pub fn touched(&self) -> usize {
        self.placed + self.replaced
    }
}

impl TileWorld {
    fn check_batch(&self, requested: u64) -> Result<(), TileError> {
        let limit = self.config().max_batch_tiles;
        if requested > limit as u64 {
            return Err(TileError::BatchTooLarge {
                requested: usize::try_from(requested).unwrap_or(usize::MAX),
                limit,
            });
        }
        Ok(())
    }

    /// Places every request or none: all keys are derived before any
    /// mutation, so invalid input leaves the world untouched.
    pub fn place_batch(&mut self, requests: &[PlaceRequest]) -> Result<BatchOutcome, TileError> {
        self.check_batch(requests.len() as u64)?;
        let prepared = requests
            .iter()
            .map(|r| self.prepare(r))
            .collect::<Result<Vec<_>, _>>()?;
        let mut outcome = BatchOutcome::default();
        for (key, record) in prepared {
            outcome.record(self.place_keyed(key, record));
        }
        log::debug!(target: "tiles", "batch placed {} replaced {}", outcome.placed, outcome.replaced);
        Ok(outcome)
    }

    /// Stamps `template` on every lattice cell of `bounds`.
    pub fn fill_area(
        &mut self,
        bounds: TileBounds,
        step: f32,
        template: PlaceRequest,
    ) -> Result<BatchOutcome, TileError> {
        let cells = self.plan_fill(bounds, step, template)?;
        let requests: Vec<PlaceRequest> = cells.map(|p| template.at(p)).collect();
        let outcome = self.place_batch(&requests)?;
        log::info!(
            target: "tiles",
            "filled {} cells ({} new, {} replaced)",
            outcome.touched(),
            outcome.placed,
            outcome.replaced
        );
        Ok(outcome)
    }

    /// Removes every tile whose position lies inside `bounds`, any orientation.
    pub fn erase_area(&mut self, bounds: TileBounds) -> Result<usize, TileError> {
        let lo = self.codec().quantize(bounds.min)?;
        let hi = self.codec().quantize(bounds.max)?;
        let keys: Vec<TileKey> = self
            .store()
            .iter()
            .filter(|(_, r)| {
                let p = r.position;
                (lo.x..=hi.x).contains(&p.x)
                    && (lo.y..=hi.y).contains(&p.y)
                    && (lo.z..=hi.z).contains(&p.z)
            })
            .map(|(k, _)| k)
            .collect();
        self.check_batch(keys.len() as u64)?;
        let removed = keys.iter().filter(|&&k| self.remove(k).is_some()).count();
        log::info!(target: "tiles", "erased {} tiles", removed);
        Ok(removed)
    }

    /// Starts an incremental fill; drive it with [`FillJob::step`].
    pub fn start_fill(
        &self,
        bounds: TileBounds,
        step: f32,
        template: PlaceRequest,
    ) -> Result<FillJob, TileError> {
        let cells = self.plan_fill(bounds, step, template)?;
        let config = self.config();
        Ok(FillJob {
            cells,
            template,
            outcome: BatchOutcome::default(),
            interval: Duration::from_millis(config.fill_step_interval_ms),
            budget: config.fill_step_budget,
            last_step: None,
        })
    }

    fn plan_fill(
        &self,
        bounds: TileBounds,
        step: f32,
        template: PlaceRequest,
    ) -> Result<GridCells, TileError> {
        let cells = GridCells::new(bounds, step)?;
        self.check_batch(cells.total())?;
        // Both lattice corners must quantize; every interior cell then does too.
        self.prepare(&template.at(bounds.min))?;
        self.prepare(&template.at(cells.far_corner()))?;
        Ok(cells)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillProgress {
    /// Called again before the step interval elapsed; nothing placed.
    Throttled,
    Stepped { placed: usize, remaining: u64 },
    Done(BatchOutcome),
}

/// An area fill split into budgeted steps with a minimum interval between them.
#[derive(Debug, Clone)]
pub struct FillJob {
    cells: GridCells,
    template: PlaceRequest,
    outcome: BatchOutcome,
    interval: Duration,
    budget: usize,
    last_step: Option<Instant>,
}

impl FillJob {
    pub fn step(&mut self, world: &mut TileWorld, now: Instant) -> Result<FillProgress, TileError> {
        if self.cells.remaining() == 0 {
            return Ok(FillProgress::Done(self.outcome));
        }
        if let Some(last) = self.last_step {
            if now.saturating_duration_since(last) < self.interval {
                return Ok(FillProgress::Throttled);
            }
        }
        self.last_step = Some(now);
        let mut placed = 0;
        while placed < self.budget {
            let Some(position) = self.cells.next() else {
                break;
            };
            let (key, record) = world.prepare(&self.template.at(position))?;
            self.outcome.record(world.place_keyed(key, record));
            placed += 1;
        }
        log::trace!(target: "tiles", "fill step placed {}, {} left", placed, self.cells.remaining());
        if self.cells.remaining() == 0 {
            Ok(FillProgress::Done(self.outcome))
        } else {
            Ok(FillProgress::Stepped {
                placed,
                remaining: self.cells.remaining(),
            })
        }
    }

    pub fn total(&self) -> u64 {
        self.cells.total()
    }

    pub fn remaining(&self) -> u64 {
        self.cells.remaining()
    }

    pub fn is_done(&self) -> bool {
        self.cells.remaining() == 0
    }

    pub fn outcome(&self) -> BatchOutcome {
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_tiles::{MeshMode, Orientation, StoreConfig};

    fn template() -> PlaceRequest {
        PlaceRequest::new(Vec3::ZERO, MeshMode::Square, Orientation::Floor)
    }

    fn bounds(max: f32) -> TileBounds {
        TileBounds::new(Vec3::ZERO, Vec3::new(max, 0.0, max))
    }

    #[test]
    fn grid_includes_far_edge() {
        let cells = GridCells::new(bounds(2.0), 1.0).unwrap();
        assert_eq!(cells.total(), 9);
        let pts: Vec<Vec3> = cells.collect();
        assert_eq!(pts.first(), Some(&Vec3::ZERO));
        assert_eq!(pts.last(), Some(&Vec3::new(2.0, 0.0, 2.0)));
    }

    #[test]
    fn far_corner_matches_final_cell() {
        let cells = GridCells::new(bounds(3.0), 1.0).unwrap();
        assert_eq!(cells.far_corner(), Vec3::new(3.0, 0.0, 3.0));
        assert_eq!(cells.last(), Some(Vec3::new(3.0, 0.0, 3.0)));
    }

    #[test]
    fn bad_step_is_rejected() {
        assert_eq!(
            GridCells::new(bounds(1.0), 0.0).unwrap_err(),
            TileError::InvalidStep(0.0)
        );
    }

    #[test]
    fn oversized_fill_fails_without_mutation() {
        let config = StoreConfig {
            max_batch_tiles: 10,
            ..StoreConfig::default()
        };
        let mut w = TileWorld::new(config).unwrap();
        let err = w.fill_area(bounds(4.0), 1.0, template()).unwrap_err();
        assert_eq!(
            err,
            TileError::BatchTooLarge {
                requested: 25,
                limit: 10
            }
        );
        assert_eq!(w.count(), 0);
    }

    #[test]
    fn fill_then_erase_area() {
        let mut w = TileWorld::new(StoreConfig::default()).unwrap();
        let out = w.fill_area(bounds(3.0), 1.0, template()).unwrap();
        assert_eq!(out.placed, 16);
        let again = w.fill_area(bounds(1.0), 1.0, template()).unwrap();
        assert_eq!(again.replaced, 4);
        assert_eq!(w.count(), 16);
        let erased = w.erase_area(bounds(1.0)).unwrap();
        assert_eq!(erased, 4);
        assert_eq!(w.count(), 12);
    }

    #[test]
    fn batch_with_bad_position_places_nothing() {
        let mut w = TileWorld::new(StoreConfig::default()).unwrap();
        let reqs = [template(), template().at(Vec3::new(f32::NAN, 0.0, 0.0))];
        assert!(w.place_batch(&reqs).is_err());
        assert_eq!(w.count(), 0);
    }

    #[test]
    fn fill_job_is_throttled_and_budgeted() {
        let config = StoreConfig {
            fill_step_budget: 10,
            fill_step_interval_ms: 16,
            ..StoreConfig::default()
        };
        let mut w = TileWorld::new(config).unwrap();
        let mut job = w.start_fill(bounds(4.0), 1.0, template()).unwrap();
        assert_eq!(job.total(), 25);
        let t0 = Instant::now();
        assert_eq!(
            job.step(&mut w, t0).unwrap(),
            FillProgress::Stepped {
                placed: 10,
                remaining: 15
            }
        );
        assert_eq!(job.step(&mut w, t0).unwrap(), FillProgress::Throttled);
        let t1 = t0 + Duration::from_millis(16);
        job.step(&mut w, t1).unwrap();
        let t2 = t1 + Duration::from_millis(16);
        let done = job.step(&mut w, t2).unwrap();
        assert_eq!(
            done,
            FillProgress::Done(BatchOutcome {
                placed: 25,
                replaced: 0
            })
        );
        assert!(job.is_done());
        assert_eq!(w.count(), 25);
    }
}
