//! SQL backend for the Quill IR
//!
//! Renders select, insert, update and delete expressions as MySQL-flavoured
//! SQL text. Literal escaping is delegated to a [`LiteralEscaper`]; function
//! operators are looked up in a [`quill_registry::FunctionRegistry`].

mod escape;
mod formatter;

pub use escape::{LiteralEscaper, MySqlEscaper};
pub use formatter::{FieldFormat, FormatError, FormatResult, SqlFormatter};

use quill_ir::QueryExpression;

/// Format with the default MySQL escaper and built-in functions
pub fn format(query: &QueryExpression) -> FormatResult<String> {
    SqlFormatter::default().format(query)
}
