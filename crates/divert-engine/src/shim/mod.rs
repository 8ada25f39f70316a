//! Runtime interceptor.
//!
//! Each [`ExecutionContext`] carries its own install marker and working rule
//! list. The two call surfaces ([`FetchShim`] and [`XhrCall`]) are thin
//! adapters over the same [`Interceptor`] and [`dispatch`], so a rule gives
//! the same status, headers and body whichever surface the call used.

mod context;
mod fetch;
mod interceptor;
mod transport;
mod xhr;

pub use context::{ExecutionContext, InstallOutcome};
pub use fetch::FetchShim;
pub use interceptor::{
    build_rule_set, dispatch, Decision, Interceptor, ShimRule, ShimRuleSet, Surface,
};
pub use transport::Transport;
pub use xhr::{OpenArgs, ReadyState, XhrCall, XhrEvent};
