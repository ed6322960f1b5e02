pub mod chunk_planner;
pub mod scheduler;
pub mod status_poller;

pub use chunk_planner::ChunkPlanner;
pub use scheduler::TaskSlot;
pub use status_poller::{ErrorCallback, PollerState, StatusCallback, StatusPoller};
