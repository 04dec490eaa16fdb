//! `Grid` composition: plain coordinate-addressed grids, a composite that
//! flattens several child grids at an offset, a menu border that selects
//! among them, and a switcher that forwards to whichever grid id is
//! currently selected by a menu.

use crate::bus::BusTable;
use crate::cell::Cell;
use crate::color::Color;
use crate::coord::{all_coords, Coord};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A touch event in virtual coordinates, zero velocity meaning release.
#[derive(Debug, Clone, Copy)]
pub struct Message {
    pub x: i32,
    pub y: i32,
    pub velocity: u8,
}

/// Anything addressable by virtual coordinate. Dynamic dispatch lives here,
/// at the grid edge; a grid's own cells are concrete types underneath.
pub trait Grid: Send + Sync {
    fn get(&self, coord: Coord) -> Option<Arc<dyn Cell>>;

    fn get_color(&self, coord: Coord) -> Color {
        self.get(coord).map(|c| c.color()).unwrap_or(Color::BLACK)
    }

    /// Dispatch a touch message to whichever cell occupies its coordinate.
    fn apply(&self, msg: Message) {
        if let Some(cell) = self.get(Coord::new(msg.x, msg.y)) {
            cell.apply(msg.velocity);
        }
    }
}

/// A plain flat grid: every cell is inserted directly by coordinate.
#[derive(Default)]
pub struct PlainGrid {
    cells: Mutex<HashMap<Coord, Arc<dyn Cell>>>,
}

impl PlainGrid {
    pub fn new() -> Self {
        PlainGrid { cells: Mutex::new(HashMap::new()) }
    }

    pub fn put(&self, coord: Coord, cell: Arc<dyn Cell>) {
        self.cells.lock().insert(coord, cell);
    }
}

impl Grid for PlainGrid {
    fn get(&self, coord: Coord) -> Option<Arc<dyn Cell>> {
        self.cells.lock().get(&coord).cloned()
    }
}

/// Flattens several child grids' non-empty cells into one coordinate space
/// at insertion time. A later [`CompositeGrid::add_grid`] call overwrites
/// any cell the new child also occupies.
#[derive(Default)]
pub struct CompositeGrid {
    cells: Mutex<HashMap<Coord, Arc<dyn Cell>>>,
}

impl CompositeGrid {
    pub fn new() -> Self {
        CompositeGrid { cells: Mutex::new(HashMap::new()) }
    }

    pub fn add_grid(&self, x_off: i32, y_off: i32, grid: &dyn Grid) {
        let mut cells = self.cells.lock();
        for coord in all_coords() {
            if let Some(cell) = grid.get(coord) {
                cells.insert(coord.offset(x_off, y_off), cell);
            }
        }
    }
}

impl Grid for CompositeGrid {
    fn get(&self, coord: Coord) -> Option<Arc<dyn Cell>> {
        self.cells.lock().get(&coord).cloned()
    }
}

/// The five border rows a menu grid organizes its buttons into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuRow {
    Top,
    Right,
    Left,
    Bottom,
    SubBottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuButtonMode {
    /// Selects an interior grid by id; at most one such button is selected.
    Grid,
    /// Gate is high only while held.
    Momentary,
    /// Gate flips on each press.
    Toggle,
}

struct MenuButtonData {
    mode: MenuButtonMode,
    grid_id: Option<u8>,
    gate_out: bool,
    color: Color,
}

struct MenuGridState {
    selected: Option<usize>,
    buttons: Vec<MenuButtonData>,
}

impl MenuGridState {
    fn select(&mut self, abs_pos: usize) {
        if let Some(prev) = self.selected {
            if prev != abs_pos {
                self.buttons[prev].gate_out = false;
            }
        }
        self.selected = Some(abs_pos);
    }

    fn deselect(&mut self) {
        if let Some(prev) = self.selected {
            self.buttons[prev].gate_out = false;
        }
        self.selected = None;
    }
}

/// A fixed border of menu buttons organized into [`MenuRow`]s. Pressing a
/// `Grid`-mode button selects its grid id (deselecting any other); `Toggle`
/// and `Momentary` buttons drive a plain gate.
pub struct MenuGrid {
    bus: Arc<BusTable>,
    state: Arc<Mutex<MenuGridState>>,
    by_coord: HashMap<Coord, usize>,
}

impl MenuGrid {
    pub fn new(bus: Arc<BusTable>) -> Self {
        MenuGrid {
            bus,
            state: Arc::new(Mutex::new(MenuGridState { selected: None, buttons: Vec::new() })),
            by_coord: HashMap::new(),
        }
    }

    /// Register a button at `coord` in `row`. Returns its absolute position,
    /// used later with [`MenuGrid::set_grid_id`].
    pub fn add_button(&mut self, coord: Coord, _row: MenuRow, mode: MenuButtonMode) -> usize {
        let mut state = self.state.lock();
        let abs_pos = state.buttons.len();
        state.buttons.push(MenuButtonData { mode, grid_id: None, gate_out: false, color: Color::BLACK });
        drop(state);
        self.by_coord.insert(coord, abs_pos);
        abs_pos
    }

    /// Wire a `Grid`-mode button to a grid id (or clear it with `None`,
    /// deselecting the button if it was the active one).
    pub fn set_grid_id(&self, abs_pos: usize, grid_id: Option<u8>) {
        let mut state = self.state.lock();
        state.buttons[abs_pos].grid_id = grid_id;
        if grid_id.is_none() && state.selected == Some(abs_pos) {
            state.deselect();
        }
    }

    pub fn selected_grid_id(&self) -> Option<u8> {
        let state = self.state.lock();
        state.selected.and_then(|i| state.buttons[i].grid_id)
    }

    fn button_color(&self, abs_pos: usize) -> Color {
        button_color(&self.bus, &self.state, abs_pos)
    }

    fn button_press(&self, abs_pos: usize) {
        button_press(&self.state, abs_pos)
    }

    fn button_release(&self, abs_pos: usize) {
        button_release(&self.state, abs_pos)
    }
}

/// Shared by [`MenuGrid`] and [`MenuButtonCell`], both of which hold the
/// same `bus`/`state` pair but not the coordinate index `by_coord` builds
/// on top of it.
fn button_color(bus: &BusTable, state: &Mutex<MenuGridState>, abs_pos: usize) -> Color {
    let state = state.lock();
    let button = &state.buttons[abs_pos];
    match button.mode {
        MenuButtonMode::Grid => match button.grid_id {
            Some(gid) => {
                let owner_bus = bus.get(gid);
                if state.selected == Some(abs_pos) {
                    owner_bus.map(|b| b.on_color()).unwrap_or(Color::BLACK)
                } else {
                    owner_bus.map(|b| b.off_color()).unwrap_or(Color::BLACK)
                }
            }
            None => Color::BLACK,
        },
        MenuButtonMode::Momentary | MenuButtonMode::Toggle => {
            if button.gate_out {
                button.color
            } else {
                button.color.dim()
            }
        }
    }
}

fn button_press(state: &Mutex<MenuGridState>, abs_pos: usize) {
    let mut state = state.lock();
    let mode = state.buttons[abs_pos].mode;
    match mode {
        MenuButtonMode::Grid => {
            if state.buttons[abs_pos].grid_id.is_some() {
                state.select(abs_pos);
                state.buttons[abs_pos].gate_out = true;
            }
        }
        MenuButtonMode::Momentary => {
            state.buttons[abs_pos].gate_out = true;
        }
        MenuButtonMode::Toggle => {
            let gate = state.buttons[abs_pos].gate_out;
            state.buttons[abs_pos].gate_out = !gate;
        }
    }
}

fn button_release(state: &Mutex<MenuGridState>, abs_pos: usize) {
    let mut state = state.lock();
    if state.buttons[abs_pos].mode == MenuButtonMode::Momentary {
        state.buttons[abs_pos].gate_out = false;
    }
}

impl Grid for MenuGrid {
    fn get(&self, coord: Coord) -> Option<Arc<dyn Cell>> {
        self.by_coord.get(&coord).map(|&abs_pos| {
            Arc::new(MenuButtonCell { state: self.state.clone(), abs_pos, owner_bus: self.bus.clone() }) as Arc<dyn Cell>
        })
    }
}

struct MenuButtonCell {
    state: Arc<Mutex<MenuGridState>>,
    owner_bus: Arc<BusTable>,
    abs_pos: usize,
}

impl Cell for MenuButtonCell {
    fn color(&self) -> Color {
        button_color(&self.owner_bus, &self.state, self.abs_pos)
    }

    fn set_color(&self, color: Color) {
        self.state.lock().buttons[self.abs_pos].color = color;
    }

    fn is_pressed(&self) -> bool {
        self.state.lock().buttons[self.abs_pos].gate_out
    }

    fn velocity(&self) -> Option<u8> {
        self.is_pressed().then_some(127)
    }

    fn on_press(&self, _velocity: u8) {
        button_press(&self.state, self.abs_pos);
    }

    fn on_release(&self) {
        button_release(&self.state, self.abs_pos);
    }
}

/// Forwards incoming messages to whichever grid id is currently selected on
/// a menu; the color query overlays the menu's own chrome on top of that
/// grid id's bus colors.
pub struct SwitcherGrid {
    menu: MenuGrid,
    bus: Arc<BusTable>,
    last_grid_id: Mutex<Option<u8>>,
}

impl SwitcherGrid {
    pub fn new(menu: MenuGrid, bus: Arc<BusTable>) -> Self {
        SwitcherGrid { menu, bus, last_grid_id: Mutex::new(None) }
    }

    pub fn menu(&self) -> &MenuGrid {
        &self.menu
    }

    /// Clear the previous grid id's velocities if the selection just
    /// changed, preventing a stuck note on a grid that's no longer reachable.
    pub fn tick(&self) {
        let current = self.menu.selected_grid_id();
        let mut last = self.last_grid_id.lock();
        if *last != current {
            if let Some(old) = *last {
                if let Some(bus) = self.bus.get(old) {
                    bus.clear_velocities();
                }
            }
            *last = current;
        }
    }
}

impl Grid for SwitcherGrid {
    fn get(&self, coord: Coord) -> Option<Arc<dyn Cell>> {
        self.menu.get(coord)
    }

    fn get_color(&self, coord: Coord) -> Color {
        let menu_color = self.menu.get_color(coord);
        if menu_color != Color::BLACK {
            return menu_color;
        }
        match self.menu.selected_grid_id().and_then(|gid| self.bus.get(gid)) {
            Some(bus) => bus.get_color(coord),
            None => Color::BLACK,
        }
    }

    fn apply(&self, msg: Message) {
        self.menu.apply(msg);
        if let Some(gid) = self.menu.selected_grid_id() {
            if let Some(bus) = self.bus.get(gid) {
                bus.put_velocity(Coord::new(msg.x, msg.y), msg.velocity);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_grid_delegates_to_whichever_child_owns_the_coordinate() {
        let child = PlainGrid::new();
        let cell = Arc::new(crate::cell::ButtonCell::new());
        child.put(Coord::new(0, 0), cell.clone());

        let composite = CompositeGrid::new();
        composite.add_grid(2, 0, &child);

        assert!(composite.get(Coord::new(2, 0)).is_some());
        assert!(composite.get(Coord::new(0, 0)).is_none());
    }

    #[test]
    fn selecting_a_menu_button_deselects_the_previous_one() {
        let bus = Arc::new(BusTable::new());
        let mut menu = MenuGrid::new(bus.clone());
        let a = menu.add_button(Coord::new(0, 0), MenuRow::Top, MenuButtonMode::Grid);
        let b = menu.add_button(Coord::new(1, 0), MenuRow::Top, MenuButtonMode::Grid);
        menu.set_grid_id(a, Some(1));
        menu.set_grid_id(b, Some(2));

        menu.button_press(a);
        assert_eq!(menu.selected_grid_id(), Some(1));

        menu.button_press(b);
        assert_eq!(menu.selected_grid_id(), Some(2));
    }

    #[test]
    fn switcher_forwards_touches_to_the_selected_grid_id() {
        let bus = Arc::new(BusTable::new());
        let mut menu = MenuGrid::new(bus.clone());
        let a = menu.add_button(Coord::new(0, 0), MenuRow::Top, MenuButtonMode::Grid);
        menu.set_grid_id(a, Some(3));
        menu.button_press(a);

        let switcher = SwitcherGrid::new(menu, bus.clone());
        switcher.apply(Message { x: 5, y: 5, velocity: 100 });

        assert_eq!(bus.get(3).unwrap().get_velocity(Coord::new(5, 5)), 100);
    }
}
