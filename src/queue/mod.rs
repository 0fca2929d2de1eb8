pub mod processor;

pub use processor::{ProcessorHealth, ProcessorHealthSnapshot, QueueProcessor};
