//! Slot allocation and dense storage shared by objects and components.

mod block;
mod error;
mod handle_table;

pub use block::BlockStorage;
pub use error::HandleError;
pub use handle_table::{HandleTable, SlotId};
