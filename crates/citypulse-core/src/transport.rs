//! Double-buffered snapshot handoff.
//!
//! Two slots alternate strictly. Emitting takes the buffer out of the next
//! slot (the slot is `InFlight` while the copy happens), moves it into the
//! outgoing [`SnapshotFrame`], and refills the slot with a freshly allocated
//! buffer before returning. A handed-off buffer is never seen again.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{AgentStatus, Population, StatusCounts, StatusTagError};

/// Identity of one transfer buffer allocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BufferId {
    /// Slot (0 or 1) the buffer was allocated for.
    pub slot: u8,
    /// Allocation sequence number, unique across both slots.
    pub generation: u64,
}

/// Point-in-time copy of all agent positions and statuses.
///
/// `positions` holds `2 * n` floats laid out `[x0, y0, x1, y1, ...]`;
/// `statuses` holds `n` wire tags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotFrame {
    pub positions: Vec<f32>,
    pub statuses: Vec<u8>,
    pub n: usize,
    pub buffer: BufferId,
}

impl SnapshotFrame {
    #[must_use]
    pub fn position(&self, index: usize) -> Option<(f32, f32)> {
        let x = *self.positions.get(index * 2)?;
        let y = *self.positions.get(index * 2 + 1)?;
        Some((x, y))
    }

    /// Decode the status tag at `index`.
    pub fn status(&self, index: usize) -> Option<Result<AgentStatus, StatusTagError>> {
        self.statuses.get(index).map(|&tag| AgentStatus::try_from(tag))
    }

    pub fn status_counts(&self) -> Result<StatusCounts, StatusTagError> {
        StatusCounts::from_tags(&self.statuses)
    }
}

#[derive(Debug)]
struct TransferBuffer {
    id: BufferId,
    positions: Vec<f32>,
    statuses: Vec<u8>,
}

impl TransferBuffer {
    fn allocate(id: BufferId, count: usize) -> Self {
        Self {
            id,
            positions: vec![0.0; count * 2],
            statuses: vec![AgentStatus::Normal.tag(); count],
        }
    }

    fn fill(&mut self, population: &Population) {
        for (dst, position) in self
            .positions
            .chunks_exact_mut(2)
            .zip(population.positions())
        {
            dst[0] = position.x;
            dst[1] = position.y;
        }
        for (dst, status) in self.statuses.iter_mut().zip(population.statuses()) {
            *dst = status.tag();
        }
    }

    fn into_frame(self) -> SnapshotFrame {
        SnapshotFrame {
            n: self.statuses.len(),
            positions: self.positions,
            statuses: self.statuses,
            buffer: self.id,
        }
    }
}

#[derive(Debug)]
enum SlotState {
    Available(TransferBuffer),
    InFlight,
}

/// Two-slot arena of transfer buffers sized for a fixed population.
#[derive(Debug)]
pub struct SnapshotTransport {
    count: usize,
    slots: [SlotState; 2],
    next_slot: usize,
    next_generation: u64,
    emitted: u64,
}

impl SnapshotTransport {
    /// Pre-allocate both slots for `count` agents.
    #[must_use]
    pub fn new(count: usize) -> Self {
        let mut transport = Self {
            count,
            slots: [SlotState::InFlight, SlotState::InFlight],
            next_slot: 0,
            next_generation: 0,
            emitted: 0,
        };
        for slot in 0..2 {
            transport.slots[slot] = SlotState::Available(transport.allocate(slot));
        }
        transport
    }

    /// Agents per buffer.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Snapshots handed off so far.
    #[must_use]
    pub const fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Slot the next emission will write into.
    #[must_use]
    pub const fn next_slot(&self) -> u8 {
        self.next_slot as u8
    }

    /// Buffer currently waiting in `slot`, if the slot is available.
    #[must_use]
    pub fn available(&self, slot: usize) -> Option<BufferId> {
        match self.slots.get(slot)? {
            SlotState::Available(buffer) => Some(buffer.id),
            SlotState::InFlight => None,
        }
    }

    /// Copy the population into the next buffer and hand the buffer off.
    ///
    /// The vacated slot is reallocated before this returns.
    pub fn emit(&mut self, population: &Population) -> SnapshotFrame {
        debug_assert_eq!(
            population.count(),
            self.count,
            "population size changed after transport allocation"
        );
        let slot = self.next_slot;
        let mut buffer = self.hand_off(slot);
        buffer.fill(population);
        self.next_slot = 1 - slot;
        self.slots[slot] = SlotState::Available(self.allocate(slot));
        self.emitted += 1;
        buffer.into_frame()
    }

    fn hand_off(&mut self, slot: usize) -> TransferBuffer {
        match std::mem::replace(&mut self.slots[slot], SlotState::InFlight) {
            SlotState::Available(buffer) => buffer,
            SlotState::InFlight => {
                warn!(slot, "transfer slot was not reallocated; allocating now");
                self.allocate(slot)
            }
        }
    }

    fn allocate(&mut self, slot: usize) -> TransferBuffer {
        let id = BufferId {
            slot: slot as u8,
            generation: self.next_generation,
        };
        self.next_generation += 1;
        TransferBuffer::allocate(id, self.count)
    }
}
