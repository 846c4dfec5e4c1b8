//! # Spatial Index: A Chunked Uniform Grid
//!
//! Gameplay asks "what is near this point?" every frame. Scanning every
//! object is O(n); the [`SpatialIndex`] answers in time proportional to the
//! objects in the cells the query overlaps.
//!
//! ## Two Levels
//!
//! ```text
//! cell_size = 10, chunk_size_in_cells = 4  →  chunk_size = 40
//!
//!   world (45, 45)
//!     cell  = floor(45 / 10)          = (4, 4)
//!     chunk = floor(cell / 4)         = (1, 1)
//!     local = cell - chunk * 4        = (0, 0)   ← bucket within the chunk
//! ```
//!
//! Chunks are allocated lazily when the first object lands in them and freed
//! when their live counter drops back to zero, so empty space costs nothing.
//! Bucket ids are always *local* cell coordinates relative to the chunk
//! origin, computed with Euclidean division, which keeps negative positions
//! in range: world `(-1, -1)` is cell `(-1, -1)`, chunk `(-1, -1)`, local
//! `(3, 3)`.
//!
//! ## Queries
//!
//! Buckets admit false positives near their edges, so every query is two
//! phase: a broad scan over the overlapped buckets, then an exact distance
//! or overlap test before the visitor sees an object.
//!
//! Objects are inserted either by point (exactly one bucket, placement
//! remembered) or by region (every overlapped bucket; the caller removes
//! with the same region).

use std::collections::{HashMap, HashSet};

use crate::config::SpatialConfig;
use crate::ecs::entity::ObjectHandle;
use crate::error::{EcsError, EcsResult};
use crate::math::{IVec2, Rect, Vec2};

/// Where a point entry lives: chunk coordinate plus local bucket id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placement {
    pub chunk: IVec2,
    /// `local.y * chunk_size_in_cells + local.x`.
    pub cell: u32,
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    Point(Vec2),
    Region(Rect),
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    object: ObjectHandle,
    shape: Shape,
}

impl Entry {
    fn is_point(&self) -> bool {
        matches!(self.shape, Shape::Point(_))
    }
}

#[derive(Debug)]
struct Chunk {
    buckets: Vec<Vec<Entry>>,
    live: usize,
}

impl Chunk {
    fn new(cells: usize) -> Self {
        Self {
            buckets: vec![Vec::new(); cells],
            live: 0,
        }
    }
}

/// Chunked grid hash from world position to buckets of object handles.
#[derive(Debug)]
pub struct SpatialIndex {
    config: SpatialConfig,
    chunk_cells: i32,
    /// Buckets per chunk, `chunk_cells` squared.
    buckets_per_chunk: usize,
    chunks: HashMap<IVec2, Chunk>,
    points: HashMap<ObjectHandle, Placement>,
    entries: usize,
}

impl SpatialIndex {
    pub fn new(config: SpatialConfig) -> EcsResult<Self> {
        config.validate()?;
        let edge = config.chunk_size_in_cells as usize;
        let buckets_per_chunk = edge.checked_mul(edge).ok_or_else(|| {
            EcsError::InvalidConfig(format!("spatial chunk of {edge} x {edge} cells is too large"))
        })?;
        Ok(Self {
            config,
            chunk_cells: config.chunk_size_in_cells as i32,
            buckets_per_chunk,
            chunks: HashMap::new(),
            points: HashMap::new(),
            entries: 0,
        })
    }

    pub fn config(&self) -> &SpatialConfig {
        &self.config
    }

    /// Drop every chunk and adopt a new configuration.
    pub fn reset(&mut self, config: SpatialConfig) -> EcsResult<()> {
        *self = Self::new(config)?;
        Ok(())
    }

    /// Drop every chunk, keeping the configuration.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.points.clear();
        self.entries = 0;
    }

    // ── Grid math ────────────────────────────────────────────────────

    pub fn cell_of(&self, position: Vec2) -> IVec2 {
        (position / self.config.cell_size).floor().as_ivec2()
    }

    pub fn chunk_of(&self, position: Vec2) -> IVec2 {
        self.chunk_of_cell(self.cell_of(position))
    }

    fn chunk_of_cell(&self, cell: IVec2) -> IVec2 {
        IVec2::new(
            cell.x.div_euclid(self.chunk_cells),
            cell.y.div_euclid(self.chunk_cells),
        )
    }

    fn bucket_of_cell(&self, cell: IVec2) -> u32 {
        let local_x = cell.x.rem_euclid(self.chunk_cells) as usize;
        let local_y = cell.y.rem_euclid(self.chunk_cells) as usize;
        (local_y * self.chunk_cells as usize + local_x) as u32
    }

    fn placement_of_cell(&self, cell: IVec2) -> Placement {
        Placement {
            chunk: self.chunk_of_cell(cell),
            cell: self.bucket_of_cell(cell),
        }
    }

    /// Chunk and local bucket a point maps to.
    pub fn placement_of(&self, position: Vec2) -> Placement {
        self.placement_of_cell(self.cell_of(position))
    }

    fn cells_in(&self, rect: &Rect) -> impl Iterator<Item = IVec2> + use<> {
        let min = self.cell_of(rect.min);
        let max = self.cell_of(rect.max);
        (min.y..=max.y).flat_map(move |y| (min.x..=max.x).map(move |x| IVec2::new(x, y)))
    }

    // ── Insertion and removal ────────────────────────────────────────

    fn push(&mut self, placement: Placement, entry: Entry) {
        let cells = self.buckets_per_chunk;
        let chunk = self.chunks.entry(placement.chunk).or_insert_with(|| {
            log::trace!("allocating spatial chunk {}", placement.chunk);
            Chunk::new(cells)
        });
        chunk.buckets[placement.cell as usize].push(entry);
        chunk.live += 1;
        self.entries += 1;
    }

    fn pull(&mut self, placement: Placement, object: ObjectHandle, point: bool) -> bool {
        let Some(chunk) = self.chunks.get_mut(&placement.chunk) else {
            return false;
        };
        let bucket = &mut chunk.buckets[placement.cell as usize];
        let Some(pos) = bucket
            .iter()
            .position(|e| e.object == object && e.is_point() == point)
        else {
            return false;
        };
        bucket.swap_remove(pos);
        chunk.live -= 1;
        self.entries -= 1;
        if chunk.live == 0 {
            log::trace!("freeing empty spatial chunk {}", placement.chunk);
            self.chunks.remove(&placement.chunk);
        }
        true
    }

    /// Insert `object` at a point. An object already inserted by point is
    /// moved instead, so it never occupies two buckets.
    pub fn insert(&mut self, object: ObjectHandle, position: Vec2) -> Placement {
        if self.points.contains_key(&object) {
            self.relocate(object, position);
            return self.points[&object];
        }
        let placement = self.placement_of(position);
        self.push(
            placement,
            Entry {
                object,
                shape: Shape::Point(position),
            },
        );
        self.points.insert(object, placement);
        placement
    }

    /// Insert `object` into every cell overlapped by `region`. Remove it
    /// later with [`remove_region`](Self::remove_region) and the same region.
    pub fn insert_region(&mut self, object: ObjectHandle, region: Rect) {
        let cells: Vec<IVec2> = self.cells_in(&region).collect();
        for cell in cells {
            let placement = self.placement_of_cell(cell);
            self.push(
                placement,
                Entry {
                    object,
                    shape: Shape::Region(region),
                },
            );
        }
    }

    /// Remove a point entry using the placement recorded at insertion.
    pub fn remove(&mut self, object: ObjectHandle) -> bool {
        match self.points.remove(&object) {
            Some(placement) => self.pull(placement, object, true),
            None => false,
        }
    }

    /// Remove a point entry from the bucket `position` maps to.
    pub fn remove_at(&mut self, object: ObjectHandle, position: Vec2) -> bool {
        let placement = self.placement_of(position);
        let removed = self.pull(placement, object, true);
        if removed {
            self.points.remove(&object);
        }
        removed
    }

    /// Remove a region entry from every cell `region` overlaps. Returns the
    /// number of buckets it was removed from.
    pub fn remove_region(&mut self, object: ObjectHandle, region: Rect) -> usize {
        let cells: Vec<IVec2> = self.cells_in(&region).collect();
        cells
            .into_iter()
            .filter(|&cell| {
                let placement = self.placement_of_cell(cell);
                self.pull(placement, object, false)
            })
            .count()
    }

    /// Move a point entry. Re-buckets only when the cell or chunk changes;
    /// otherwise the stored position is updated in place. Returns `true` if
    /// the entry changed bucket (or was newly inserted).
    pub fn relocate(&mut self, object: ObjectHandle, position: Vec2) -> bool {
        let Some(&old) = self.points.get(&object) else {
            self.insert(object, position);
            return true;
        };
        let new = self.placement_of(position);
        if old == new {
            if let Some(entry) = self
                .chunks
                .get_mut(&old.chunk)
                .and_then(|c| {
                    c.buckets[old.cell as usize]
                        .iter_mut()
                        .find(|e| e.object == object && e.is_point())
                })
            {
                entry.shape = Shape::Point(position);
            }
            return false;
        }
        self.pull(old, object, true);
        self.push(
            new,
            Entry {
                object,
                shape: Shape::Point(position),
            },
        );
        self.points.insert(object, new);
        true
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Visit every object within `radius` of `center` (inclusive).
    pub fn query_radius(&self, center: Vec2, radius: f32, mut visitor: impl FnMut(ObjectHandle)) {
        if radius.is_nan() || radius < 0.0 {
            return;
        }
        let bounds = Rect::from_center_size(center, Vec2::splat(radius * 2.0));
        let r2 = radius * radius;
        self.scan(&bounds, |entry| match entry.shape {
            Shape::Point(p) => p.distance_squared(center) <= r2,
            Shape::Region(rect) => rect.intersects_circle(center, radius),
        }, &mut visitor);
    }

    /// Visit every object whose point lies in, or whose region overlaps,
    /// `region` (inclusive).
    pub fn query_region(&self, region: Rect, mut visitor: impl FnMut(ObjectHandle)) {
        self.scan(&region, |entry| match entry.shape {
            Shape::Point(p) => region.contains(p),
            Shape::Region(rect) => rect.intersects(&region),
        }, &mut visitor);
    }

    /// Collect the objects within `radius` of `center`.
    pub fn nearby(&self, center: Vec2, radius: f32) -> Vec<ObjectHandle> {
        let mut found = Vec::new();
        self.query_radius(center, radius, |object| found.push(object));
        found
    }

    fn scan(
        &self,
        bounds: &Rect,
        exact: impl Fn(&Entry) -> bool,
        visitor: &mut impl FnMut(ObjectHandle),
    ) {
        // Region entries sit in several buckets; report each object once.
        let mut seen_regions: HashSet<ObjectHandle> = HashSet::new();
        let mut visit = |entry: &Entry| {
            if !exact(entry) {
                return;
            }
            if entry.is_point() || seen_regions.insert(entry.object) {
                visitor(entry.object);
            }
        };

        let min = self.cell_of(bounds.min);
        let max = self.cell_of(bounds.max);
        let span = (i64::from(max.x) - i64::from(min.x) + 1)
            * (i64::from(max.y) - i64::from(min.y) + 1);
        let allocated: i64 = self
            .chunks
            .len()
            .saturating_mul(self.buckets_per_chunk)
            .try_into()
            .unwrap_or(i64::MAX);

        if span > allocated {
            // Query covers more cells than exist: walk live chunks instead.
            for chunk in self.chunks.values() {
                for entry in chunk.buckets.iter().flatten() {
                    visit(entry);
                }
            }
            return;
        }

        for cell in self.cells_in(bounds) {
            let placement = self.placement_of_cell(cell);
            if let Some(chunk) = self.chunks.get(&placement.chunk) {
                for entry in &chunk.buckets[placement.cell as usize] {
                    visit(entry);
                }
            }
        }
    }

    // ── Introspection ────────────────────────────────────────────────

    /// Placement recorded for a point entry.
    pub fn placement(&self, object: ObjectHandle) -> Option<Placement> {
        self.points.get(&object).copied()
    }

    pub fn contains(&self, object: ObjectHandle) -> bool {
        self.points.contains_key(&object)
    }

    /// Number of live chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of bucket entries (a region entry counts once per cell).
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}
