//! Git plumbing: the narrow set of primitives arbor needs.
//!
//! [`Repository`] is the only place git command lines are constructed, and
//! [`parse`] is the only place porcelain output is interpreted. Everything
//! above this module works with typed records.

pub mod parse;
mod repository;

pub use parse::WorktreeEntry;
pub use repository::Repository;
