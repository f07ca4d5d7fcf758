//! Schema-partitioned SQL layer.
//!
//! Every statement template carries `{schema}` markers that are filled in
//! once per request with the schema name the host's resolver produced. User
//! input never reaches statement text: values go through bound parameters
//! only, and schema names must pass [`is_safe_identifier`] before binding.

pub mod history;
pub mod links;
pub mod migrations;
pub mod tickets;

use crate::error::{Result, TicketError};

/// Substitutes the `{schema}` markers in a statement template.
pub(crate) fn render(template: &str, schema: &str) -> String {
    template.replace("{schema}", schema)
}

/// Accepts only plain Postgres identifiers: leading letter or underscore,
/// then letters, digits and underscores, at most 63 bytes.
pub(crate) fn is_safe_identifier(name: &str) -> bool {
    if name.is_empty() || name.len() > 63 {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validates a host-resolved schema name before it is bound into templates.
pub(crate) fn checked_schema(schema: &str) -> Result<String> {
    if is_safe_identifier(schema) {
        Ok(schema.to_string())
    } else {
        Err(TicketError::Validation(format!(
            "'{}' is not a valid schema name",
            schema
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_rules() {
        assert!(is_safe_identifier("project_alpha"));
        assert!(is_safe_identifier("_private"));
        assert!(is_safe_identifier("p1"));

        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier("1project"));
        assert!(!is_safe_identifier("bad-name"));
        assert!(!is_safe_identifier("bad.name"));
        assert!(!is_safe_identifier("drop table; --"));
        assert!(!is_safe_identifier(&"x".repeat(64)));
    }

    #[test]
    fn render_substitutes_every_marker() {
        let sql = render("SELECT 1 FROM {schema}.a JOIN {schema}.b", "p");
        assert_eq!(sql, "SELECT 1 FROM p.a JOIN p.b");
    }
}
