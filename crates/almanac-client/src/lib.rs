//! Occurrence materialization for remote calendar stores.
//!
//! A store answers a query with two kinds of component: masters that
//! define recurrence rules, and detached instances that override single
//! occurrences. This crate produces the reconciled, time-ordered
//! sequence of concrete occurrences inside a bounded window.
//!
//! Layering, leaves first:
//! - [`store`]: the component-store collaborator contracts (blocking and
//!   async), including the transient-`Busy` condition and capabilities.
//! - [`evaluator`]: the rule-evaluator contract plus an `rrule`-backed
//!   default that expands one master into raw start/end pairs.
//! - [`reconcile`]: the pure reconciliation engine, merging detached
//!   overrides into generated occurrences and sorting the result.
//! - [`client`]: the fetch orchestrator driving both calling
//!   conventions around the engine, with bounded `Busy` retry and
//!   cooperative cancellation.

pub mod client;
pub mod error;
pub mod evaluator;
pub mod reconcile;
pub mod store;

pub use client::{AsyncCalClient, CalClient, RetryPolicy};
pub use error::{ClientError, ClientResult};
pub use evaluator::{EvaluatorError, RruleEvaluator, RuleEvaluator};
pub use reconcile::reconcile;
pub use store::{AsyncComponentStore, ComponentStore, StoreCapabilities, StoreError};
