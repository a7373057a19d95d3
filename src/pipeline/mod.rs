// src/pipeline/mod.rs

pub mod batch;
pub mod live;
pub mod metrics;
pub mod progress;
pub mod session;
pub mod tick_queue;

pub use batch::{BatchOptions, BatchOutcome, BatchPipeline};
pub use live::{LiveSessionController, RepCounters, TickHandle, TickUpdate};
pub use metrics::{MetricsSummary, PipelineMetrics};
pub use progress::{progress_channel, BatchProgress};
pub use session::{AnalysisSession, FeedbackCount, PerformanceRating, SessionSummary, TickResult};
pub use tick_queue::TickQueue;
