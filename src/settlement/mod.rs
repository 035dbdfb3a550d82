// Periodic settlement: the scheduler drives the pipeline's jobs
pub mod pipeline;
pub mod scheduler;

pub use pipeline::{EventSink, SettlementPipeline};
pub use scheduler::{ScheduleConfig, Scheduler};
