//! Client-side prediction replay against authoritative snapshots

use std::collections::VecDeque;

use crate::relay::protocol::WindState;

use super::kite::{Anchor, Kite, KitePhysics, KiteTuning};
use super::TickInput;

/// Default buffer bound: two seconds of inputs at the baseline rate
pub const INPUT_BUFFER_CAPACITY: usize = 120;

/// Locally buffered inputs not yet acknowledged by the server. Bounded:
/// under a sustained stall the oldest inputs are dropped.
pub struct InputBuffer {
    inputs: VecDeque<TickInput>,
    capacity: usize,
}

impl InputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inputs: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, input: TickInput) {
        if self.inputs.len() == self.capacity {
            self.inputs.pop_front();
        }
        self.inputs.push_back(input);
    }

    /// Prune everything the server has processed
    pub fn acknowledge(&mut self, seq: u32) {
        while self
            .inputs
            .front()
            .is_some_and(|input| input.seq <= seq)
        {
            self.inputs.pop_front();
        }
    }

    /// Inputs with a sequence number past the acknowledged one
    pub fn pending(&self, acked_seq: u32) -> impl Iterator<Item = &TickInput> {
        self.inputs.iter().filter(move |input| input.seq > acked_seq)
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new(INPUT_BUFFER_CAPACITY)
    }
}

/// Replays unacknowledged inputs through the authoritative physics to
/// produce a smoothed local render state.
pub struct Reconciler;

impl Reconciler {
    /// Fold every buffered input newer than `acked_seq` through
    /// `KitePhysics::step`, starting from the authoritative state.
    /// Pickups are authoritative-only and never offered to the replay.
    /// With zero pending inputs this returns the authoritative state
    /// unchanged.
    #[allow(clippy::too_many_arguments)]
    pub fn reconcile(
        authoritative: &Kite,
        anchor: Anchor,
        acked_seq: u32,
        buffer: &InputBuffer,
        wind: &WindState,
        game_time: f32,
        dt: f32,
        tuning: &KiteTuning,
    ) -> Kite {
        let mut kite = *authoritative;
        let mut replay_time = game_time;
        for input in buffer.pending(acked_seq) {
            let (next, _) =
                KitePhysics::step(&kite, anchor, input, wind, &[], replay_time, dt, tuning);
            kite = next;
            replay_time += dt;
        }
        kite
    }
}
