//! Schema-templated DDL, exposed two ways: as migration records the host
//! replays through its own migration runner, and as a single script for
//! schemas created after boot.
//!
//! Record ids form a contiguous block starting at a host-supplied offset so
//! the host can interleave them with its own migration history.

use serde::Serialize;

use super::render;

/// Offset the host's migration ids start from unless it supplies its own.
pub const DEFAULT_MIGRATION_OFFSET: i64 = 26;

#[derive(Debug, Clone, Serialize)]
pub struct MigrationRecord {
    pub id: i64,
    pub description: String,
    #[serde(rename = "type")]
    pub migration_type: &'static str,
    pub table: &'static str,
    pub schema: &'static str,
    pub spec: MigrationSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationSpec {
    pub create_if_not_exists: bool,
    pub sql: &'static str,
}

const CREATE_TICKET: &str = r#"
CREATE TABLE IF NOT EXISTS {schema}.ticket (
    id BIGSERIAL PRIMARY KEY,
    ticket_type TEXT NOT NULL CHECK (ticket_type IN ('task', 'bug', 'feature', 'decision')),
    title TEXT NOT NULL CHECK (title <> ''),
    description TEXT,
    status TEXT NOT NULL,
    priority TEXT NOT NULL DEFAULT 'medium' CHECK (priority IN ('low', 'medium', 'high', 'urgent')),
    assignee TEXT,
    reporter TEXT,
    tags JSONB NOT NULL DEFAULT '[]'::jsonb,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at BIGINT NOT NULL DEFAULT (EXTRACT(EPOCH FROM now())::BIGINT),
    updated_at BIGINT NOT NULL DEFAULT (EXTRACT(EPOCH FROM now())::BIGINT)
);
"#;

const CREATE_TICKET_HISTORY: &str = r#"
CREATE TABLE IF NOT EXISTS {schema}.ticket_history (
    id BIGSERIAL PRIMARY KEY,
    ticket_id BIGINT NOT NULL REFERENCES {schema}.ticket (id) ON DELETE CASCADE,
    field TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    changed_by TEXT,
    changed_at BIGINT NOT NULL DEFAULT (EXTRACT(EPOCH FROM now())::BIGINT)
);
CREATE INDEX IF NOT EXISTS ticket_history_ticket_idx
    ON {schema}.ticket_history (ticket_id, changed_at);
"#;

const CREATE_TICKET_LINK: &str = r#"
CREATE TABLE IF NOT EXISTS {schema}.ticket_link (
    id BIGSERIAL PRIMARY KEY,
    source_id BIGINT NOT NULL REFERENCES {schema}.ticket (id) ON DELETE CASCADE,
    target_id BIGINT NOT NULL REFERENCES {schema}.ticket (id) ON DELETE CASCADE,
    link_type TEXT NOT NULL CHECK (link_type IN ('blocks', 'parent', 'related', 'duplicate')),
    created_at BIGINT NOT NULL DEFAULT (EXTRACT(EPOCH FROM now())::BIGINT),
    CHECK (source_id <> target_id),
    UNIQUE (source_id, target_id, link_type)
);
"#;

// The tsv column is kept in sync by a trigger rather than a generated
// expression so the migration can backfill existing rows in the same step.
const ADD_TICKET_TSV: &str = r#"
ALTER TABLE {schema}.ticket ADD COLUMN IF NOT EXISTS tsv tsvector;

CREATE OR REPLACE FUNCTION {schema}.ticket_tsv_refresh() RETURNS trigger AS $fn$
BEGIN
    NEW.tsv := to_tsvector('english', NEW.title || ' ' || coalesce(NEW.description, ''));
    RETURN NEW;
END
$fn$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS ticket_tsv_refresh ON {schema}.ticket;
CREATE TRIGGER ticket_tsv_refresh
    BEFORE INSERT OR UPDATE OF title, description ON {schema}.ticket
    FOR EACH ROW EXECUTE FUNCTION {schema}.ticket_tsv_refresh();

UPDATE {schema}.ticket
    SET tsv = to_tsvector('english', title || ' ' || coalesce(description, ''));
"#;

const ADD_TICKET_TSV_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS ticket_tsv_idx ON {schema}.ticket USING GIN (tsv);
"#;

const ALL_DDL: [(&str, &str, &str); 5] = [
    ("create ticket table", "ticket", CREATE_TICKET),
    (
        "create ticket_history table",
        "ticket_history",
        CREATE_TICKET_HISTORY,
    ),
    ("create ticket_link table", "ticket_link", CREATE_TICKET_LINK),
    (
        "add ticket search column and trigger",
        "ticket",
        ADD_TICKET_TSV,
    ),
    ("add ticket search index", "ticket", ADD_TICKET_TSV_INDEX),
];

/// The five migration records, ids contiguous from `offset`.
pub fn migrations(offset: i64) -> Vec<MigrationRecord> {
    ALL_DDL
        .iter()
        .enumerate()
        .map(|(i, &(description, table, sql))| MigrationRecord {
            id: offset + i as i64,
            description: description.to_string(),
            migration_type: "custom",
            table,
            schema: "project",
            spec: MigrationSpec {
                create_if_not_exists: true,
                sql,
            },
        })
        .collect()
}

/// The full DDL as one script with `{schema}` resolved, for schemas created
/// after the host has already run its migrations.
pub fn schema_sql(schema: &str) -> String {
    let script: String = ALL_DDL.iter().map(|&(_, _, sql)| sql).collect();
    render(&script, schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_contiguous_from_offset() {
        let records = migrations(DEFAULT_MIGRATION_OFFSET);
        assert_eq!(records.len(), 5);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.id, DEFAULT_MIGRATION_OFFSET + i as i64);
        }

        let shifted = migrations(100);
        assert_eq!(shifted[0].id, 100);
        assert_eq!(shifted[4].id, 104);
    }

    #[test]
    fn records_serialize_with_wire_field_names() {
        let record = &migrations(26)[0];
        let value = serde_json::to_value(record).unwrap();
        assert_eq!(value["type"], "custom");
        assert_eq!(value["schema"], "project");
        assert_eq!(value["spec"]["create_if_not_exists"], true);
        assert!(value["spec"]["sql"]
            .as_str()
            .unwrap()
            .contains("{schema}.ticket"));
    }

    #[test]
    fn schema_sql_resolves_every_marker() {
        let script = schema_sql("proj_a");
        assert!(!script.contains("{schema}"));
        assert!(script.contains("proj_a.ticket"));
        assert!(script.contains("proj_a.ticket_history"));
        assert!(script.contains("proj_a.ticket_link"));
        assert!(script.contains("USING GIN (tsv)"));
    }

    #[test]
    fn cascade_and_uniqueness_clauses_present() {
        let script = schema_sql("p");
        assert_eq!(script.matches("ON DELETE CASCADE").count(), 3);
        assert!(script.contains("UNIQUE (source_id, target_id, link_type)"));
        assert!(script.contains("CHECK (source_id <> target_id)"));
    }
}
