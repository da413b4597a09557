#![warn(missing_docs)]

//! middleman-protocol: packet schemas, rules, and the rule evaluator.
//!
//! A schema document is compiled into one flat [`PacketLayout`] per packet kind;
//! a rule document is compiled against those layouts into a [`RuleSet`]; the
//! evaluator applies the rule set to live datagrams through a bounds-checked
//! [`PacketView`]. [`RuleBasedMutator`] ties the three together behind the
//! `PacketMutator` capability the proxy consumes.

/// Recoverable compile problems.
pub mod diagnostic;
/// Condition/mutation evaluation.
pub mod evaluator;
/// Rule-driven datagram mutation.
pub mod mutator;
/// Primitive field types.
pub mod primitive;
/// Compiled rule types.
pub mod rule;
/// Rule document compilation.
pub mod rule_compiler;
/// Packet schema compilation.
pub mod schema;
/// Bounds-checked typed access to a datagram.
pub mod view;

pub use diagnostic::{CompileError, Diagnostic};
pub use evaluator::apply_rules;
pub use mutator::RuleBasedMutator;
pub use primitive::PrimitiveType;
pub use rule::{Condition, Literal, Mutation, Operator, Rule, RuleSet};
pub use rule_compiler::{compile_rules, compile_rules_str};
pub use schema::{compile_schema, compile_schema_str, Field, PacketLayout, Schema};
pub use view::{PacketView, Scalar, ViewError, WireOrder};
