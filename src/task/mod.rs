//! Task graph: tasks, results, lifecycle events, the registry and the work queue.
//!
//! Tasks are created by submission or by a pipeline stage and are never
//! deleted. Every field mutation goes through [`TaskRegistry::update`].

pub mod task;
mod event;
mod queue;
mod registry;
mod result;

pub use event::{EventBus, EventSink, TaskEvent, TaskEventKind, TracingSink};
pub use queue::TaskQueue;
pub use registry::{ProgressCounts, TaskRegistry};
pub use result::{clamp_confidence, dedupe_sources, TaskResult};
pub use task::{
    ComplexityAnalysis, QualityAssessment, Task, TaskError, TaskId, TaskMetadata, TaskStatus,
};
