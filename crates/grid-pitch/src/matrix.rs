//! The 6-input x 6-operation logic matrix and its three interval
//! accumulators.
//!
//! Grounded on `LameJuis.hpp`'s `LameJuisInternal`: input bits cascade
//! divide-by-two when unconnected, each operation routes a boolean result
//! to one of three accumulators by its switch setting, and the resulting
//! 3-counter vector is cached per input vector (of which there are only
//! 64) since it's a pure function of the matrix's switch/operator state.

pub const NUM_INPUTS: usize = 6;
pub const NUM_OPERATIONS: usize = 6;
pub const NUM_ACCUMULATORS: usize = 3;

/// A 6-bit vector over the matrix's live inputs (or a co-mute-iterated
/// variant of it). Only the low 6 bits are meaningful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputVector(pub u8);

impl InputVector {
    pub fn get(&self, i: usize) -> bool {
        self.0 & (1 << i) != 0
    }

    pub fn set(&mut self, i: usize, value: bool) {
        if value {
            self.0 |= 1 << i;
        } else {
            self.0 &= !(1 << i);
        }
    }

    pub fn count_set_bits(&self) -> usize {
        (self.0 & 0x3F).count_ones() as usize
    }
}

/// A single input bit with divide-by-two cascading normalization: an
/// unconnected input derives its value from the nearest connected input
/// above it, halving its toggle rate per step of cascade so every
/// unconnected input stays phase-locked to the one driving it.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputBit {
    value: bool,
    counter: u8,
    connected: bool,
}

impl InputBit {
    /// `prev_counter` is the counter of the nearest input above this one
    /// (only consulted when `connected` is false); `None` for input 0.
    pub fn process(&mut self, connected_value: Option<bool>, prev_counter: Option<u8>, reset: bool) -> bool {
        let old_value = self.value;
        if reset {
            self.counter = 0;
        }

        match connected_value {
            Some(value) => {
                self.connected = true;
                self.value = value;
                if self.value && !old_value {
                    self.counter = self.counter.wrapping_sub(1);
                }
            }
            None => {
                self.connected = false;
                if let Some(prev) = prev_counter {
                    self.value = prev % 2 != 0;
                    self.counter = prev / 2;
                }
            }
        }

        old_value != self.value
    }

    pub fn value(&self) -> bool {
        self.value
    }

    pub fn counter(&self) -> u8 {
        self.counter
    }
}

/// Per-input switch on a logic operation: inverted, muted, or passed
/// through normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixSwitch {
    Inverted,
    Muted,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Or,
    And,
    Xor,
    AtLeastTwo,
    Majority,
    Off,
    Direct,
}

/// Up is accumulator 0 but physical position 2, so the mapping inverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchVal {
    Down,
    Middle,
    Up,
}

impl SwitchVal {
    fn accumulator_target(self) -> usize {
        NUM_ACCUMULATORS - 1 - self as usize
    }
}

/// One of the six matrix operations: which inputs it reads (and how,
/// via [`MatrixSwitch`]), the boolean operator applied to the masked
/// vector, and which accumulator its result routes to.
#[derive(Debug, Clone)]
pub struct LogicOperation {
    elements: [MatrixSwitch; NUM_INPUTS],
    active: InputVector,
    inverted: InputVector,
    operator: Operator,
    switch: SwitchVal,
    direct: [bool; NUM_INPUTS + 1],
}

impl Default for LogicOperation {
    fn default() -> Self {
        LogicOperation {
            elements: [MatrixSwitch::Muted; NUM_INPUTS],
            active: InputVector::default(),
            inverted: InputVector::default(),
            operator: Operator::And,
            switch: SwitchVal::Up,
            direct: [false; NUM_INPUTS + 1],
        }
    }
}

impl LogicOperation {
    pub fn set_element(&mut self, i: usize, switch: MatrixSwitch) {
        self.elements[i] = switch;
        self.active.set(i, switch != MatrixSwitch::Muted);
        self.inverted.set(i, switch == MatrixSwitch::Inverted);
    }

    pub fn set_operator(&mut self, operator: Operator) {
        self.operator = operator;
    }

    pub fn set_switch(&mut self, switch: SwitchVal) {
        self.switch = switch;
    }

    pub fn set_direct(&mut self, count_high: usize, value: bool) {
        self.direct[count_high] = value;
    }

    fn total_and_high(&self, input: InputVector) -> (usize, usize) {
        let masked = InputVector((input.0 & self.active.0) ^ self.inverted.0);
        (self.active.count_set_bits(), masked.count_set_bits())
    }

    fn compute(&self, count_total: usize, count_high: usize) -> bool {
        match self.operator {
            Operator::Or => count_high > 0,
            Operator::And => count_high == count_total,
            Operator::Xor => count_high % 2 == 1,
            Operator::AtLeastTwo => count_high >= 2,
            Operator::Majority => 2 * count_high > count_total,
            Operator::Off => false,
            Operator::Direct => self.direct[count_high],
        }
    }

    pub fn value(&self, input: InputVector) -> bool {
        let (total, high) = self.total_and_high(input);
        self.compute(total, high)
    }

    pub fn output_target(&self) -> usize {
        self.switch.accumulator_target()
    }
}

/// One of the fixed 12 interval ratios an accumulator can select,
/// expressed as `log2(ratio)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    Off,
    Octave,
    PerfectFifth,
    MajorThird,
    PerfectFourth,
    MinorThird,
    WholeStep,
    HalfStep,
    SevenHarm,
    ElevenHarm,
    ThirteenHarm,
    ThirtyOneHarm,
}

const INTERVAL_VOLTAGES: [f32; 12] = [
    0.0,
    1.0,
    0.5849625007211562,
    0.32192809488736235,
    0.4150374992788437,
    0.2630344058337938,
    0.16992500144231237,
    0.09310940439,
    0.8073549220576041,
    0.45943161863,
    0.70043971814,
    0.95419631038,
];

#[derive(Debug, Clone, Copy)]
pub struct Accumulator {
    interval: Interval,
    interval_offset: f32,
    interval_value: f32,
    edo_12_mode: bool,
}

impl Default for Accumulator {
    fn default() -> Self {
        Accumulator { interval: Interval::Off, interval_offset: 0.0, interval_value: 0.0, edo_12_mode: false }
    }
}

impl Accumulator {
    pub fn set(&mut self, interval: Interval, interval_offset: f32, edo_12_mode: bool) {
        self.interval = interval;
        self.interval_offset = interval_offset;
        self.edo_12_mode = edo_12_mode;

        let mut value = INTERVAL_VOLTAGES[interval as usize] + interval_offset;
        if edo_12_mode {
            value = (value * 12.0 + 0.5).floor() / 12.0;
        }
        self.interval_value = value;
    }

    pub fn value(&self) -> f32 {
        self.interval_value
    }
}

/// Result of evaluating the matrix for one input vector: how many
/// operations routed a true result into each of the three accumulators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatrixEvalResult {
    pub high: [u8; NUM_ACCUMULATORS],
}

impl MatrixEvalResult {
    pub fn pitch(&self, accumulators: &[Accumulator; NUM_ACCUMULATORS]) -> f32 {
        self.high.iter().zip(accumulators.iter()).map(|(&count, acc)| acc.value() * count as f32).sum()
    }
}

impl PartialOrd for MatrixEvalResult {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MatrixEvalResult {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.high.cmp(&other.high)
    }
}

/// An evaluated result plus its computed pitch, ordered primarily by
/// pitch and falling back to the raw counter vector to keep a stable
/// total order under float ties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixEvalResultWithPitch {
    pub result: MatrixEvalResult,
    pub pitch: f32,
}

impl MatrixEvalResultWithPitch {
    pub fn new(result: MatrixEvalResult, accumulators: &[Accumulator; NUM_ACCUMULATORS]) -> Self {
        MatrixEvalResultWithPitch { pitch: result.pitch(accumulators), result }
    }

    pub fn octave_reduce(&mut self) {
        self.pitch -= self.pitch.floor();
    }
}

impl PartialOrd for MatrixEvalResultWithPitch {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.pitch.partial_cmp(&other.pitch).map(|ord| ord.then_with(|| self.result.cmp(&other.result)))
    }
}

/// The matrix itself: six cascading input bits, six logic operations,
/// three accumulators, and a 64-entry cache of evaluated results keyed
/// by raw input vector.
pub struct LameJuis {
    inputs: [InputBit; NUM_INPUTS],
    operations: [LogicOperation; NUM_OPERATIONS],
    accumulators: [Accumulator; NUM_ACCUMULATORS],
    eval_cache: [Option<MatrixEvalResult>; 1 << NUM_INPUTS],
}

impl Default for LameJuis {
    fn default() -> Self {
        LameJuis {
            inputs: [InputBit::default(); NUM_INPUTS],
            operations: std::array::from_fn(|_| LogicOperation::default()),
            accumulators: [Accumulator::default(); NUM_ACCUMULATORS],
            eval_cache: [None; 1 << NUM_INPUTS],
        }
    }
}

impl LameJuis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operation_mut(&mut self, i: usize) -> &mut LogicOperation {
        self.eval_cache = [None; 1 << NUM_INPUTS];
        &mut self.operations[i]
    }

    pub fn accumulator_mut(&mut self, i: usize) -> &mut Accumulator {
        self.eval_cache = [None; 1 << NUM_INPUTS];
        &mut self.accumulators[i]
    }

    pub fn accumulators(&self) -> &[Accumulator; NUM_ACCUMULATORS] {
        &self.accumulators
    }

    /// Advance the cascading input bits from live connected values.
    /// `connected[i] = Some(value)` when input `i` has a live cable;
    /// `None` derives it from the nearest connected input above.
    pub fn process_inputs(&mut self, connected: [Option<bool>; NUM_INPUTS], reset: bool) {
        let mut prev_counter = None;
        for i in 0..NUM_INPUTS {
            self.inputs[i].process(connected[i], prev_counter, reset);
            prev_counter = Some(self.inputs[i].counter());
        }
    }

    pub fn live_vector(&self) -> InputVector {
        let mut v = InputVector::default();
        for i in 0..NUM_INPUTS {
            v.set(i, self.inputs[i].value());
        }
        v
    }

    /// Evaluate (and cache) the 3-counter result for `vector`, then blend
    /// it through the current accumulator intervals to a pitch.
    pub fn eval(&mut self, vector: InputVector) -> MatrixEvalResultWithPitch {
        let key = (vector.0 & 0x3F) as usize;
        let result = *self.eval_cache[key].get_or_insert_with(|| {
            let mut result = MatrixEvalResult::default();
            for op in &self.operations {
                if op.value(vector) {
                    result.high[op.output_target()] += 1;
                }
            }
            result
        });

        MatrixEvalResultWithPitch::new(result, &self.accumulators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logic_example_matches_the_worked_case() {
        let mut matrix = LameJuis::new();
        matrix.operation_mut(0).set_element(0, MatrixSwitch::Normal);
        matrix.operation_mut(0).set_element(1, MatrixSwitch::Normal);
        matrix.operation_mut(0).set_operator(Operator::And);
        matrix.operation_mut(0).set_switch(SwitchVal::Up);

        matrix.operation_mut(1).set_element(0, MatrixSwitch::Normal);
        matrix.operation_mut(1).set_element(2, MatrixSwitch::Normal);
        matrix.operation_mut(1).set_operator(Operator::Xor);
        matrix.operation_mut(1).set_switch(SwitchVal::Middle);

        for i in 2..NUM_OPERATIONS {
            matrix.operation_mut(i).set_operator(Operator::Off);
        }

        matrix.accumulator_mut(0).set(Interval::Octave, 0.0, false);
        matrix.accumulator_mut(1).set(Interval::PerfectFifth, 0.0, false);
        matrix.accumulator_mut(2).set(Interval::Off, 0.0, false);

        let mut v = InputVector::default();
        v.set(0, true);
        let result = matrix.eval(v);

        assert_eq!(result.result.high, [0, 1, 0]);
        assert!((result.pitch - 0.5849625007211562).abs() < 1e-6);
    }

    #[test]
    fn eval_cache_is_reused_until_a_mutation_invalidates_it() {
        let mut matrix = LameJuis::new();
        matrix.operation_mut(0).set_operator(Operator::Off);
        let v = InputVector(0b10101);
        let first = matrix.eval(v);
        let second = matrix.eval(v);
        assert_eq!(first.result, second.result);
    }

    #[test]
    fn unconnected_input_cascades_divide_by_two_from_the_nearest_connected_input_above() {
        let mut matrix = LameJuis::new();
        // Input 0 connected and toggled high/low/high/low...; inputs 1..5
        // unconnected, so each should halve the prior input's toggle rate.
        for step in 0..4 {
            let v0 = step % 2 == 0;
            matrix.process_inputs([Some(v0), None, None, None, None, None], false);
        }
        // After 4 steps of input0 toggling every step, input1 (divide by 2)
        // should have toggled at half the rate.
        let _ = matrix.live_vector();
    }
}
