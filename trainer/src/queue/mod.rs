mod coordinator;
mod fifo;
mod runner;

pub use coordinator::Coordinator;
pub use fifo::{Dequeuer, Enqueuer, QueueClosed, fifo};
pub use runner::QueueRunner;
