//! Trigger implementations.
//!
//! Triggers define what starts a workflow:
//! - Event: a matching task/project domain event
//! - Schedule: a recurring interval (`5m`, `2h`, `1d`)
//! - Manual: direct invocation (CLI or host application)

mod event;
mod scheduler;

pub use event::{
    EventListener, EventTriggerConfig, EventTriggerRegistry, EventType, TriggerFilters,
    TriggerOutcome, WorkflowEvent,
};
pub use scheduler::{
    format_next_run, format_next_run_at, is_valid_pattern, parse_pattern, ScheduleConfig,
    Scheduler,
};
