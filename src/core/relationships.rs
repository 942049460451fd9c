//! Relationship extraction from foreign-key column metadata
//!
//! Relationships are never authored directly: they are re-derived from the
//! tables on every change. Extraction is lenient. A foreign-key column whose
//! `references` is missing or not of the form `Table.Column` simply yields no
//! relationship, and references to tables that do not exist are passed through
//! for the router to handle. [`diagnose_references`] reports both cases for
//! callers that want to surface them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::schema::{Column, Relationship, Table};

/// Split a `Table.Column` reference into its trimmed, non-empty parts
pub fn parse_reference(reference: &str) -> Option<(&str, &str)> {
    let mut parts = reference.split('.');
    let table = parts.next()?.trim();
    let column = parts.next()?.trim();
    if parts.next().is_some() || table.is_empty() || column.is_empty() {
        return None;
    }
    Some((table, column))
}

fn relationship_for(table: &Table, column: &Column) -> Option<Relationship> {
    if !column.is_foreign_key {
        return None;
    }
    let reference = column.references.as_deref()?;
    let Some((to_table, to_column)) = parse_reference(reference) else {
        tracing::debug!(
            "Skipping malformed reference '{}' on {}.{}",
            reference,
            table.name,
            column.name
        );
        return None;
    };

    Some(Relationship {
        from_table: table.name.clone(),
        from_column: column.name.clone(),
        to_table: to_table.to_string(),
        to_column: to_column.to_string(),
        relation_type: column.relation_type.clone().unwrap_or_default(),
        label: column.relation_label.clone(),
    })
}

/// Derive relationships in discovery order: tables in order, then columns in order
pub fn extract_relationships<'a, I>(tables: I) -> Vec<Relationship>
where
    I: IntoIterator<Item = &'a Table>,
{
    tables
        .into_iter()
        .flat_map(|table| {
            table
                .columns
                .iter()
                .filter_map(move |column| relationship_for(table, column))
        })
        .collect()
}

/// Problem found on a foreign-key column
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReferenceIssue {
    /// Foreign key without a usable `Table.Column` reference; no relationship is produced
    #[serde(rename_all = "camelCase")]
    Malformed {
        table: String,
        column: String,
        reference: Option<String>,
    },
    /// Well-formed reference to a table that does not exist
    #[serde(rename_all = "camelCase")]
    MissingTable {
        table: String,
        column: String,
        target_table: String,
    },
    /// Well-formed reference to a missing column of an existing table
    #[serde(rename_all = "camelCase")]
    MissingColumn {
        table: String,
        column: String,
        target_table: String,
        target_column: String,
    },
}

impl std::fmt::Display for ReferenceIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceIssue::Malformed {
                table,
                column,
                reference: Some(reference),
            } => write!(
                f,
                "{table}.{column}: reference '{reference}' is not in Table.Column form"
            ),
            ReferenceIssue::Malformed {
                table,
                column,
                reference: None,
            } => write!(f, "{table}.{column}: foreign key without a reference"),
            ReferenceIssue::MissingTable {
                table,
                column,
                target_table,
            } => write!(f, "{table}.{column}: table '{target_table}' does not exist"),
            ReferenceIssue::MissingColumn {
                table,
                column,
                target_table,
                target_column,
            } => write!(
                f,
                "{table}.{column}: column '{target_table}.{target_column}' does not exist"
            ),
        }
    }
}

/// Report malformed and dangling foreign-key references.
///
/// Does not change what [`extract_relationships`] produces; it only explains
/// it. Issues are returned in table/column order and logged at `warn`.
pub fn diagnose_references(tables: &[impl AsRef<Table>]) -> Vec<ReferenceIssue> {
    let by_name: HashMap<&str, &Table> = tables
        .iter()
        .map(|t| (t.as_ref().name.as_str(), t.as_ref()))
        .collect();

    let mut issues = Vec::new();
    for table in tables {
        let table: &Table = table.as_ref();
        for column in table.columns.iter().filter(|c| c.is_foreign_key) {
            let reference = column.references.as_deref();
            let Some((target_table, target_column)) = reference.and_then(parse_reference) else {
                issues.push(ReferenceIssue::Malformed {
                    table: table.name.clone(),
                    column: column.name.clone(),
                    reference: reference.map(str::to_string),
                });
                continue;
            };

            match by_name.get(target_table) {
                None => issues.push(ReferenceIssue::MissingTable {
                    table: table.name.clone(),
                    column: column.name.clone(),
                    target_table: target_table.to_string(),
                }),
                Some(target) if !target.columns.iter().any(|c| c.name == target_column) => {
                    issues.push(ReferenceIssue::MissingColumn {
                        table: table.name.clone(),
                        column: column.name.clone(),
                        target_table: target_table.to_string(),
                        target_column: target_column.to_string(),
                    })
                }
                Some(_) => {}
            }
        }
    }

    for issue in &issues {
        tracing::warn!("Reference issue: {}", issue);
    }
    issues
}
