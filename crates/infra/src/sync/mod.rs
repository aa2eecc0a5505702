//! Background submission of the deferred-call queue.

pub mod drain_worker;

pub use drain_worker::{DrainWorker, DrainWorkerConfig};
