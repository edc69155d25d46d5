//! # taskweave
//!
//! Recursive task decomposition over an unreliable reasoning oracle.
//!
//! A submitted task is judged, split into independent subtasks down to a
//! depth limit, executed by the oracle, and recombined into one answer.
//!
//! ## Architecture
//!
//! ```text
//!   submit ──► TaskQueue ──► worker pool (N workers)
//!                               │
//!                               ▼
//!              Analyze ─► Merge ─► Execute ─► Assess
//!                 │                   │
//!            children ◄───────────────┘ follow-ups
//!                 │
//!                 ▼  all children Completed
//!             Aggregate ──► parent Completed
//! ```
//!
//! Every stage reaches the oracle through the structured layer, which
//! enforces a JSON schema, extracts and repairs payloads, and retries.
//!
//! ## Modules
//! - `llm`: oracle boundary and the OpenRouter client
//! - `structured`: schema-guided calls with extraction, repair and retry
//! - `task`: tasks, results, events, registry and queue
//! - `agents`: the five pipeline stages and decomposition heuristics
//! - `orchestrator`: worker pool and per-task state machine

pub mod agents;
pub mod config;
pub mod llm;
pub mod orchestrator;
pub mod structured;
pub mod task;

pub use config::Config;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
