//! The per-frame control engine: drains the input bus, advances the pitch
//! matrix and arps, selects pitches per voice channel, recomputes the
//! encoder modulation tree, and writes color state to the shared bus.
//!
//! Grounded on `TheNonagonSquiggleBoy.hpp`'s `Apply`/`ProcessFrame` pair
//! (dispatch-then-compute-then-populate-UI-state ordering) and
//! `MessageInBus.hpp`'s `ProcessMessages`, generalized away from that
//! file's instrument-specific voice/LFO wiring to the six ordered steps
//! this engine is responsible for.

use std::sync::Arc;

use grid_core::bus::BusTable;
use grid_core::cell::Cell;
use grid_core::coord::Coord;
use grid_core::grid::{Grid, Message};
use grid_core::voice::{Voice, VoiceAllocator};
use grid_midi::{MessageIn, Mode};
use grid_modulation::{EncoderBank, ModulatorValues};
use grid_pitch::{InputVector, LameJuis, NonagonIndexArp, Output, MAX_POLY, NUM_CLOCKS, NUM_INPUTS, NUM_TRIOS};
use std::sync::atomic::AtomicBool;

use crate::error::EngineResult;
use crate::message_bus::InputBus;

pub const MAX_ROUTES: usize = 16;

/// Which surface a route's decoded messages are dispatched to.
#[derive(Clone, Copy)]
pub enum RouteTarget {
    Grid(usize),
    EncoderBank,
}

/// Everything advanced once per control frame: the input bus, the logic
/// matrix and its arps, the pitch-selecting outputs feeding the voice
/// allocator, the encoder modulation tree, and the shared color bus every
/// visible grid writes into.
pub struct ControlEngine {
    input_bus: InputBus,
    targets: [Option<RouteTarget>; MAX_ROUTES],
    grids: Vec<Arc<dyn Grid>>,
    grid_bus_ids: Vec<u8>,
    bus_table: Arc<BusTable>,
    encoder_bank: EncoderBank,
    matrix: LameJuis,
    arps: NonagonIndexArp,
    output: Output,
    voices: VoiceAllocator,
    voice_pitches: [f32; MAX_POLY],
}

impl ControlEngine {
    pub fn new(bus_table: Arc<BusTable>, num_tracks: usize, num_voices: usize, polyphony: usize) -> Self {
        ControlEngine {
            input_bus: InputBus::new(),
            targets: [None; MAX_ROUTES],
            grids: Vec::new(),
            grid_bus_ids: Vec::new(),
            bus_table,
            encoder_bank: EncoderBank::new(num_tracks, num_voices),
            matrix: LameJuis::new(),
            arps: NonagonIndexArp::new(),
            output: Output::new(),
            voices: VoiceAllocator::new(polyphony),
            voice_pitches: [0.0; MAX_POLY],
        }
    }

    pub fn input_bus(&self) -> &InputBus {
        &self.input_bus
    }

    pub fn matrix_mut(&mut self) -> &mut LameJuis {
        &mut self.matrix
    }

    pub fn arps_mut(&mut self) -> &mut NonagonIndexArp {
        &mut self.arps
    }

    pub fn output_mut(&mut self) -> &mut Output {
        &mut self.output
    }

    pub fn encoder_bank_mut(&mut self) -> &mut EncoderBank {
        &mut self.encoder_bank
    }

    pub fn voices(&self) -> &VoiceAllocator {
        &self.voices
    }

    pub fn voice_pitches(&self) -> &[f32] {
        &self.voice_pitches[..self.output.poly_chans()]
    }

    /// Register a grid under `route`, used by inbound `PadPress`/
    /// `PadPressure`/`PadRelease` dispatch and outbound color writes.
    /// `bus_id` is the shared-bus grid id its colors get written to.
    pub fn register_grid(&mut self, route: usize, grid: Arc<dyn Grid>, bus_id: u8) -> EngineResult<()> {
        if route >= MAX_ROUTES {
            return Err(crate::error::EngineError::RouteOutOfRange(route));
        }
        let index = self.grids.len();
        self.grids.push(grid);
        self.grid_bus_ids.push(bus_id);
        self.targets[route] = Some(RouteTarget::Grid(index));
        Ok(())
    }

    pub fn route_to_encoder_bank(&mut self, route: usize) -> EngineResult<()> {
        if route >= MAX_ROUTES {
            return Err(crate::error::EngineError::RouteOutOfRange(route));
        }
        self.targets[route] = Some(RouteTarget::EncoderBank);
        Ok(())
    }

    fn dispatch(&mut self, msg: MessageIn) {
        if msg.route_id < 0 || msg.route_id as usize >= MAX_ROUTES {
            return;
        }

        match self.targets[msg.route_id as usize] {
            Some(RouteTarget::Grid(index)) => self.dispatch_to_grid(index, msg),
            Some(RouteTarget::EncoderBank) => self.dispatch_to_encoder_bank(msg),
            None => {}
        }
    }

    fn dispatch_to_grid(&mut self, index: usize, msg: MessageIn) {
        let velocity = match msg.mode {
            Mode::PadPress | Mode::PadPressure => msg.amount.clamp(0, 127) as u8,
            Mode::PadRelease => 0,
            _ => return,
        };
        self.grids[index].apply(Message { x: msg.x, y: msg.y, velocity });
    }

    fn dispatch_to_encoder_bank(&mut self, msg: MessageIn) {
        let x = msg.x as usize;
        let y = msg.y as usize;
        if x >= grid_modulation::BANK_WIDTH || y >= grid_modulation::BANK_HEIGHT {
            return;
        }

        match msg.mode {
            Mode::EncoderIncDec => {
                let scene_manager = self.encoder_bank.scene_manager().clone();
                self.encoder_bank.cell_mut(x, y).increment(&scene_manager, msg.amount as f32 / 127.0);
            }
            Mode::EncoderPush => self.encoder_bank.select_gesture(Some(y * grid_modulation::BANK_WIDTH + x)),
            Mode::EncoderRelease => self.encoder_bank.select_gesture(None),
            _ => {}
        }
    }

    /// Run the six ordered steps of one control frame.
    #[allow(clippy::too_many_arguments)]
    pub fn process_frame(
        &mut self,
        now: u64,
        input_bits: [Option<bool>; NUM_INPUTS],
        matrix_reset: bool,
        clocks: [bool; NUM_CLOCKS],
        trio_reset: [bool; NUM_TRIOS],
        read_arps: bool,
        modulator_values: &ModulatorValues,
        default_vector: InputVector,
    ) -> EngineResult<()> {
        // 1. Drain the input bus up to `now`, dispatching to the selected
        // grid or encoder bank.
        let mut pending = Vec::new();
        self.input_bus.process(now, |msg| pending.push(msg));
        for msg in pending {
            self.dispatch(msg);
        }

        // 2. Advance the matrix and accumulators from the live 6-bit input.
        self.matrix.process_inputs(input_bits, matrix_reset);

        // 3. Advance the IndexArp trios whose selected clock fired.
        self.arps.process(clocks, trio_reset, read_arps);

        // 4. Select a pitch per voice channel and feed the voice allocator.
        for chan in 0..self.output.poly_chans() {
            let pitch = self.output.compute_pitch(&mut self.matrix, default_vector, chan, &self.arps)?;
            self.voice_pitches[chan] = pitch;
        }

        // 5. Recompute the encoder modulation tree.
        self.encoder_bank.compute(modulator_values);

        // 6. Write color state for each visible grid into the shared bus.
        for (grid, &bus_id) in self.grids.iter().zip(self.grid_bus_ids.iter()) {
            if let Some(bus) = self.bus_table.get(bus_id) {
                let mut changed = false;
                for coord in grid_core::coord::all_coords() {
                    if let Some(cell) = grid.get(coord) {
                        changed |= bus.put_color(coord, cell.color());
                    }
                }
                bus.bump_epoch(changed);
            }
        }

        Ok(())
    }

    /// Allocate a voice at `(x, y)` backed by a freshly created gate.
    /// Returns the gate so a caller can drive downstream DSP from it.
    pub fn trigger_voice(&mut self, x: i32, y: i32) -> Arc<AtomicBool> {
        let gate = Arc::new(AtomicBool::new(false));
        self.voices.allocate(Voice::new(gate.clone(), x, y));
        gate
    }

    pub fn release_voice(&mut self, x: i32, y: i32) {
        self.voices.deallocate(x, y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_core::cell::Cell;
    use grid_core::grid::PlainGrid;
    use grid_midi::Mode as MidiMode;

    fn engine() -> ControlEngine {
        let bus_table = Arc::new(BusTable::new());
        ControlEngine::new(bus_table, 1, 1, 4)
    }

    #[test]
    fn dispatch_routes_pad_press_into_the_registered_grid() {
        let mut engine = engine();
        let bus_table = engine.bus_table.clone();
        let handle = bus_table.allocate().unwrap();
        let grid = Arc::new(PlainGrid::new());
        let cell = Arc::new(grid_core::cell::ButtonCell::new());
        grid.put(Coord::new(0, 0), cell.clone());
        engine.register_grid(0, grid, handle.id()).unwrap();

        engine.input_bus().push(MessageIn::new(0, 0, MidiMode::PadPress, 0, 0, 100));
        engine
            .process_frame(
                0,
                [None; NUM_INPUTS],
                false,
                [false; NUM_CLOCKS],
                [false; NUM_TRIOS],
                false,
                &ModulatorValues::new(),
                InputVector::default(),
            )
            .unwrap();

        assert!(cell.is_pressed());
    }

    #[test]
    fn dispatch_routes_encoder_inc_dec_into_the_bank() {
        let mut engine = engine();
        engine.route_to_encoder_bank(1).unwrap();

        engine.input_bus().push(MessageIn::new(0, 1, MidiMode::EncoderIncDec, 0, 0, 64));
        engine
            .process_frame(
                0,
                [None; NUM_INPUTS],
                false,
                [false; NUM_CLOCKS],
                [false; NUM_TRIOS],
                false,
                &ModulatorValues::new(),
                InputVector::default(),
            )
            .unwrap();

        let scene_manager = engine.encoder_bank.scene_manager().clone();
        let expected = 64.0 / 127.0;
        assert!((engine.encoder_bank.cell(0, 0).normalized_value(&scene_manager, 0) - expected).abs() < 1e-4);
    }

    #[test]
    fn process_frame_writes_grid_colors_into_the_shared_bus() {
        let mut engine = engine();
        let bus_table = engine.bus_table.clone();
        let handle = bus_table.allocate().unwrap();
        let grid = Arc::new(PlainGrid::new());
        let cell = Arc::new(grid_core::cell::ButtonCell::new());
        cell.set_color(grid_core::color::Color::new(10, 20, 30));
        grid.put(Coord::new(1, 1), cell);
        engine.register_grid(0, grid, handle.id()).unwrap();

        engine
            .process_frame(
                0,
                [None; NUM_INPUTS],
                false,
                [false; NUM_CLOCKS],
                [false; NUM_TRIOS],
                false,
                &ModulatorValues::new(),
                InputVector::default(),
            )
            .unwrap();

        assert_eq!(handle.get_color(Coord::new(1, 1)), grid_core::color::Color::new(10, 20, 30));
    }
}
