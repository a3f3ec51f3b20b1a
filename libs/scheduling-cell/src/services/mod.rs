pub mod admission;
pub mod availability;
pub mod directory;
pub mod queue;
pub mod reaper;
pub mod slots;
