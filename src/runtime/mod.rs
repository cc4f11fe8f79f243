//! Host implementations of the clock and scheduler.

mod clock;
mod scheduler;

pub use clock::BootClock;
pub use scheduler::TokioScheduler;
