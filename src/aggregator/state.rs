use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of an aggregator. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AggregatorState {
    /// Built but not started; items can already be enqueued up to capacity.
    Created,
    Running,
    /// Shutdown has been signalled and workers are flushing.
    Stopping,
    Stopped,
}

impl AggregatorState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Running => 1,
            Self::Stopping => 2,
            Self::Stopped => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(AggregatorState::Created.as_u8()))
    }

    pub(crate) fn get(&self) -> AggregatorState {
        AggregatorState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Moves to `next` if it is ahead of the current state. Returns whether the
    /// transition happened.
    pub(crate) fn advance(&self, next: AggregatorState) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (next.as_u8() > current).then_some(next.as_u8())
            })
            .is_ok()
    }
}
