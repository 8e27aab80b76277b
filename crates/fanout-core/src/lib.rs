//! Batch coordination engine for fanout.
//!
//! A batch is an ordered list of sub-requests whose paths and payloads may
//! embed `$$<index>.<property-path>` references to the results of earlier
//! sub-requests. The engine parses those references, builds a dependency graph
//! once per batch, dispatches sub-requests through an [`Invoker`] either in
//! order or as soon as their dependencies resolve, and aggregates the results
//! back into submission order.
//!
//! ```no_run
//! use fanout_core::{BatchConfig, BatchExecutor, BatchSpec};
//! use fanout_abstraction::{FnInvoker, InvokeError, SubRequest, SubResult};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn demo() -> fanout_core::Result<()> {
//! let invoker = FnInvoker::new(|request: SubRequest| async move {
//!     Ok::<_, InvokeError>(SubResult::ok(json!({"path": request.path})))
//! });
//! let executor = BatchExecutor::new(Arc::new(invoker), BatchConfig::default());
//! let spec = BatchSpec::new(vec![
//!     SubRequest::new("/users/0"),
//!     SubRequest::new("/users/$$0.path"),
//! ]);
//! let result = executor.run(&spec).await?;
//! assert_eq!(result.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod batch;
pub mod config;
pub mod dependency;
pub mod error;
pub mod path;
pub mod progress;
pub mod reference;
pub mod resolver;
pub mod scheduler;

pub use aggregator::{Aggregator, BatchResult};
pub use batch::BatchSpec;
pub use config::BatchConfig;
pub use dependency::{DependencyGraph, analyze};
pub use error::{BatchError, ReferenceError, Result, ValidationError};
pub use path::{PathError, PathSegment, PropertyPath};
pub use progress::{BatchState, ProgressEvent, ProgressReporter, SubRequestState};
pub use reference::{ParsedToken, ReferenceToken};
pub use resolver::{resolve_reference, substitute_request};
pub use scheduler::{BatchExecutor, BatchOutcome};

// Re-export the invoker seam so most callers need a single dependency.
pub use fanout_abstraction::{InvokeError, Invoker, SubRequest, SubResult};
