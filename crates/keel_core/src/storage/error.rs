use crate::storage::SlotId;
use thiserror::Error;

/// Failures reported by [`HandleTable`](crate::storage::HandleTable).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    #[error("handle {0} is stale or out of range")]
    InvalidHandle(SlotId),

    #[error("handle table is full ({limit} slots)")]
    CapacityExceeded { limit: u32 },

    #[error("slot {0} is already occupied")]
    SlotOccupied(SlotId),
}
