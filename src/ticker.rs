//! Cancellable spawn-tick handles.
//!
//! A host timer fires spawn ticks carrying the [`TickToken`] it was created with. Replacing the
//! ticker bumps the generation, so a tick from the old timer that is already in flight is
//! recognised as stale and dropped instead of spawning after the reset.

/// Identifies the spawn ticker that produced a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TickToken {
    pub generation: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SpawnTicker {
    generation: u64,
}

impl SpawnTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for the live ticker.
    pub fn current(&self) -> TickToken {
        TickToken {
            generation: self.generation,
        }
    }

    /// Invalidate every outstanding token and return the replacement's token.
    pub fn replace(&mut self) -> TickToken {
        self.generation = self.generation.wrapping_add(1);
        self.current()
    }

    pub fn is_current(&self, token: TickToken) -> bool {
        token.generation == self.generation
    }
}
