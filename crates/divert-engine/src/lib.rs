//! Divert: rule resolution and action engine for outgoing calls.
//!
//! One rule snapshot drives two enforcement paths. Rules the declarative
//! filtering backend can express are compiled to directives
//! ([`native`]); rules that need a delay or full request/response
//! interception run in the in-process [`shim`]. [`actions`] defines what each
//! action means so both paths agree wherever both can express a behavior.

// ===== Shared rule semantics =====
pub mod actions;
pub mod classify;
pub mod config;
pub mod error;
pub mod gate;
pub mod matcher;

// ===== Enforcement paths =====
pub mod native;
pub mod request;
pub mod response;
pub mod shim;

// ===== Coordination and supporting services =====
pub mod audit;
pub mod engine;
pub mod metrics;
pub mod store;
pub mod tester;

pub use classify::{classify, partition, Enforcement, Partition};
pub use config::{EngineConfig, Rule, RuleSnapshot};
pub use engine::{Engine, SyncReport};
pub use error::{EngineError, ShimError};
pub use matcher::matches;
