//! repodigest - turn a repository into a token-budgeted, structured digest
//!
//! The crate is split into three engines plus the glue around them:
//! - `filter`: layered include/exclude/gitignore/depth/symlink decisions
//! - `tokens`: pluggable token estimation with caching and budget math
//! - `digest`: the orchestrator coordinating both engines and the
//!   filesystem collaborators
//!
//! `flows` and `cli` wire everything into the command-line surface.

pub mod cli;
pub mod core;
pub mod digest;
pub mod filter;
pub mod flows;
pub mod tokens;
