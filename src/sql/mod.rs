//! SQL module
//!
//! The typed statement tree the engine executes, and the seam through
//! which an external SQL text parser plugs in.

pub mod ast;

pub use ast::*;

/// A parser turning SQL text into statements.
///
/// The engine has no SQL grammar of its own. Hosts supply an
/// implementation; its failures surface unchanged as
/// [`crate::Error::ParseDelegation`].
pub trait SqlParser {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Parse one or more `;`-separated statements
    fn parse(&self, sql: &str) -> std::result::Result<Vec<Statement>, Self::Error>;
}
