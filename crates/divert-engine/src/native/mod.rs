//! Native enforcement: rules compiled to declarative backend directives.

mod backend;
mod compiler;
mod directive;

pub use backend::{FilterBackend, MemoryBackend, NativeEffect, NativeMatch};
pub use compiler::{
    apply_substitution, build_update, compile, compile_rule, replace_regex, to_non_capturing,
    CompiledSet, SkippedRule,
};
pub use directive::{Condition, Directive, DirectiveAction, DirectiveUpdate, RedirectSpec};
