//! Robots policy engine
//!
//! This module parses robots.txt documents into per-agent path-rule trees and
//! answers two questions for every outgoing request: is this path allowed for
//! our agent, and how long must we wait between requests to this host.
//!
//! The rule-tree semantics intentionally reproduce the behavior of the
//! long-running production bot this engine replaces: rules form an implicit
//! trie ordered by insertion, and a path is resolved by descending into the
//! *first* child whose prefix matches. This is *not* longest-prefix-wins; see
//! [`rules::RuleNode`] for details.

mod policy;
mod rules;

pub use policy::{AgentPolicy, RobotsPolicy};
pub use rules::RuleNode;
