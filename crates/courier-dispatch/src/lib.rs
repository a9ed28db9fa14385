//! Bulk message dispatch: per-item validation and rendering, then a small
//! worker pool fanning sends across a shared cursor with per-tenant rate
//! controls.

mod dispatcher;
pub mod template;

pub use dispatcher::{
    dispatch, dispatch_with, BulkItem, BulkResult, DispatchErrorKind, DispatchOptions,
    DispatchOutcome, WORKER_HARD_CAP,
};
