//! The shared color/velocity bus that decouples controller I/O from the
//! realtime audio thread, plus the grid-id allocator that keys it.
//!
//! Per the design notes, this is modeled as explicit process-wide state
//! constructed once at engine startup and torn down on shutdown — no
//! `static`/`lazy_static` singleton. Callers hold a [`GridHandle`] for the
//! lifetime of their grid; the id is returned to the pool when it drops.

use crate::color::Color;
use crate::coord::{all_coords, Coord, GRID_ID_POOL_SIZE, X_MAX, X_MIN, Y_MAX, Y_MIN};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

const WIDTH: usize = (X_MAX - X_MIN + 1) as usize;
const HEIGHT: usize = (Y_MAX - Y_MIN + 1) as usize;
const CELL_COUNT: usize = WIDTH * HEIGHT;

/// Sentinel returned by [`GridIdPool::allocate`] when the pool is exhausted
/// (§7 "resource exhaustion"): callers skip bus I/O for this grid.
pub const SENTINEL_GRID_ID: u8 = 255;

fn flat_index(coord: Coord) -> Option<usize> {
    if !coord.in_bounds() {
        return None;
    }
    let col = (coord.x - X_MIN) as usize;
    let row = (coord.y - Y_MIN) as usize;
    Some(row * WIDTH + col)
}

/// A bank of 128 grid ids, CAS-allocated and freed on drop.
struct GridIdPool {
    allocated: Vec<AtomicBool>,
}

impl GridIdPool {
    fn new() -> Self {
        GridIdPool {
            allocated: (0..GRID_ID_POOL_SIZE).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    fn allocate(&self) -> u8 {
        for (i, slot) in self.allocated.iter().enumerate() {
            if slot
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return i as u8;
            }
        }
        SENTINEL_GRID_ID
    }

    fn free(&self, id: u8) {
        if (id as usize) < self.allocated.len() {
            self.allocated[id as usize].store(false, Ordering::Release);
        }
    }
}

/// Per-grid-id atomic color/velocity state. One cell per virtual coordinate.
pub struct Bus {
    colors: Vec<AtomicU32>,
    velocities: Vec<AtomicU8>,
    on_color: AtomicU32,
    off_color: AtomicU32,
    epoch: AtomicU64,
}

impl Bus {
    fn new() -> Self {
        Bus {
            colors: (0..CELL_COUNT).map(|_| AtomicU32::new(0)).collect(),
            velocities: (0..CELL_COUNT).map(|_| AtomicU8::new(0)).collect(),
            on_color: AtomicU32::new(Color::new(0, 255, 0).to_packed()),
            off_color: AtomicU32::new(Color::BLACK.to_packed()),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn on_color(&self) -> Color {
        Color::from_packed(self.on_color.load(Ordering::Acquire))
    }

    pub fn set_on_color(&self, color: Color) {
        self.on_color.store(color.to_packed(), Ordering::Release);
    }

    pub fn off_color(&self) -> Color {
        Color::from_packed(self.off_color.load(Ordering::Acquire))
    }

    pub fn set_off_color(&self, color: Color) {
        self.off_color.store(color.to_packed(), Ordering::Release);
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn get_color(&self, coord: Coord) -> Color {
        match flat_index(coord) {
            Some(i) => Color::from_packed(self.colors[i].load(Ordering::Acquire)),
            None => Color::BLACK,
        }
    }

    /// Atomically exchange the stored color, returning whether it changed.
    /// Callers accumulate the per-pass `changed` flag and call
    /// [`Bus::bump_epoch`] once at the end of a write pass.
    pub fn put_color(&self, coord: Coord, color: Color) -> bool {
        match flat_index(coord) {
            Some(i) => {
                let prev = self.colors[i].swap(color.to_packed(), Ordering::AcqRel);
                prev != color.to_packed()
            }
            None => false,
        }
    }

    pub fn get_velocity(&self, coord: Coord) -> u8 {
        match flat_index(coord) {
            Some(i) => self.velocities[i].load(Ordering::Acquire),
            None => 0,
        }
    }

    pub fn put_velocity(&self, coord: Coord, velocity: u8) -> bool {
        match flat_index(coord) {
            Some(i) => {
                let prev = self.velocities[i].swap(velocity, Ordering::AcqRel);
                prev != velocity
            }
            None => false,
        }
    }

    /// Zero every velocity cell. Used when a switcher grid moves off this
    /// grid id, so a held note doesn't stay latched once it's unreachable.
    pub fn clear_velocities(&self) {
        for v in &self.velocities {
            v.store(0, Ordering::Release);
        }
    }

    /// Bump the epoch iff `changed` is true; call once per write pass.
    pub fn bump_epoch(&self, changed: bool) {
        if changed {
            self.epoch.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Return the set of (coord, color) pairs if the epoch has advanced
    /// since `last_epoch`, updating it; otherwise return nothing without
    /// touching any cell. This is what keeps an idle reader cheap.
    pub fn poll_changed(&self, last_epoch: &mut u64) -> Vec<(Coord, Color)> {
        let current = self.epoch();
        if current == *last_epoch {
            return Vec::new();
        }
        *last_epoch = current;
        all_coords().map(|c| (c, self.get_color(c))).collect()
    }
}

/// Process-wide table of buses keyed by grid id, with an explicit lifecycle:
/// construct once at engine startup, [`BusTable::allocate`] a handle per
/// logical grid, drop the handle to free the id.
pub struct BusTable {
    pool: GridIdPool,
    buses: Vec<Bus>,
}

impl BusTable {
    pub fn new() -> Self {
        BusTable {
            pool: GridIdPool::new(),
            buses: (0..GRID_ID_POOL_SIZE).map(|_| Bus::new()).collect(),
        }
    }

    /// Allocate a grid id and return a handle borrowing this table. Returns
    /// `None` on pool exhaustion; callers should skip bus I/O in that case.
    pub fn allocate(&self) -> Option<GridHandle<'_>> {
        let id = self.pool.allocate();
        if id == SENTINEL_GRID_ID {
            None
        } else {
            Some(GridHandle { table: self, id })
        }
    }

    /// Look up an already-allocated bus by id without taking ownership of
    /// its lifecycle (used by switcher grids reading another grid's bus).
    pub fn get(&self, id: u8) -> Option<&Bus> {
        self.buses.get(id as usize)
    }
}

impl Default for BusTable {
    fn default() -> Self {
        Self::new()
    }
}

/// An owned grid id borrowed from a [`BusTable`]; frees the id on drop.
pub struct GridHandle<'a> {
    table: &'a BusTable,
    id: u8,
}

impl GridHandle<'_> {
    pub fn id(&self) -> u8 {
        self.id
    }
}

impl Deref for GridHandle<'_> {
    type Target = Bus;
    fn deref(&self) -> &Bus {
        &self.table.buses[self.id as usize]
    }
}

impl Drop for GridHandle<'_> {
    fn drop(&mut self) {
        self.table.pool.free(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_skips_scan_until_a_cell_changes() {
        let table = BusTable::new();
        let handle = table.allocate().unwrap();
        let mut last_epoch = handle.epoch();

        assert!(handle.poll_changed(&mut last_epoch).is_empty());

        let changed = handle.put_color(Coord::new(0, 0), Color::new(1, 2, 3));
        handle.bump_epoch(changed);

        let touched = handle.poll_changed(&mut last_epoch);
        assert!(touched.iter().any(|(c, col)| *c == Coord::new(0, 0) && *col == Color::new(1, 2, 3)));
    }

    #[test]
    fn grid_id_pool_exhaustion_returns_sentinel() {
        let table = BusTable::new();
        let mut handles = Vec::new();
        for _ in 0..GRID_ID_POOL_SIZE {
            handles.push(table.allocate().expect("pool should have capacity"));
        }
        assert!(table.allocate().is_none());

        // Freeing one handle returns its id to the pool.
        handles.pop();
        assert!(table.allocate().is_some());
    }

    #[test]
    fn unchanged_put_does_not_register_as_changed() {
        let table = BusTable::new();
        let handle = table.allocate().unwrap();
        let coord = Coord::new(2, 2);

        assert!(handle.put_color(coord, Color::new(5, 5, 5)));
        assert!(!handle.put_color(coord, Color::new(5, 5, 5)));
    }
}
