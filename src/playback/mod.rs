pub mod control;
pub mod event_bus;
pub mod history;
pub mod scheduler;
pub mod state;

pub use control::StopSignal;
pub use scheduler::Player;
pub use state::{PlaybackReport, PlaybackState};
