//! Subcommand implementations; each returns the text printed on stdout

use anyhow::{bail, Context, Result};
use quill_closure::{ClosureParser, ClosureResolver, IdentityResolver, StandardMethods};
use quill_ir::{query, QueryExpression};
use quill_registry::FunctionRegistry;
use quill_sql::SqlFormatter;
use tracing::info;

use crate::config::{Methods, OutputConfig};

fn render(query: &QueryExpression, output: &OutputConfig) -> Result<String> {
    let sql = SqlFormatter::default().format(query)?;
    let mut lines = Vec::new();
    if output.json {
        lines.push(serde_json::to_string_pretty(query)?);
    }
    lines.push(sql);
    if output.fingerprint {
        lines.push(format!("-- fingerprint: {}", query.fingerprint()));
    }
    Ok(lines.join("\n"))
}

/// Render a JSON-encoded query
pub fn format_query(text: &str, output: &OutputConfig) -> Result<String> {
    let query: QueryExpression =
        serde_json::from_str(text).context("input is not a valid JSON query")?;
    info!(statement = ?query.statement.as_ref().map(|s| s.kind()), "formatting query");
    render(&query, output)
}

/// Lower a closure; with `from`, render a full select around the filter
pub fn lower_closure(
    source: &str,
    from: Option<&str>,
    select: &[String],
    output: &OutputConfig,
) -> Result<String> {
    let resolver: &dyn ClosureResolver = match output.methods {
        Methods::Standard => &StandardMethods,
        Methods::None => &IdentityResolver,
    };
    let filter = ClosureParser::new(resolver)
        .parse(source)
        .with_context(|| format!("cannot lower closure `{}`", source))?;

    match from {
        Some(entity) => {
            if select.is_empty() {
                bail!("--select is required together with --from");
            }
            let mut q = query(entity);
            q.select(select.iter().map(String::as_str));
            q.filter = Some(filter);
            render(&q, output)
        }
        None => {
            let mut lines = Vec::new();
            if output.json {
                lines.push(serde_json::to_string_pretty(&filter)?);
            }
            lines.push(SqlFormatter::default().format_where(&filter)?);
            Ok(lines.join("\n"))
        }
    }
}

pub fn list_functions(registry: &FunctionRegistry, json: bool) -> Result<String> {
    let signatures = registry.signatures();
    if json {
        return Ok(serde_json::to_string_pretty(&signatures)?);
    }
    let mut lines = vec![format!("# functions (registry {})", registry.version())];
    for sig in signatures {
        lines.push(format!(
            "{:<12} {:<10} {}",
            sig.name,
            format!("{:?}", sig.kind).to_lowercase(),
            sig.sql
        ));
    }
    Ok(lines.join("\n"))
}
