//! Diagram identifiers derived from table and column names
//!
//! Node ids, handle ids and edge ids are all built from sanitized names so the
//! rendering side can match them without any lookup tables.

use std::collections::BTreeMap;

use crate::core::schema::Table;

/// Replace every character outside `[A-Za-z0-9_-]` with `_`
pub fn sanitize_id(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Which end of a relationship a handle belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleRole {
    Source,
    Target,
}

impl HandleRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleRole::Source => "source",
            HandleRole::Target => "target",
        }
    }
}

/// Side of a table node a handle sits on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleSide {
    Left,
    Right,
}

impl HandleSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleSide::Left => "left",
            HandleSide::Right => "right",
        }
    }
}

impl std::fmt::Display for HandleSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle id for a column row, e.g. `source-right-user_id`
pub fn handle_id(role: HandleRole, side: HandleSide, column: &str) -> String {
    format!("{}-{}-{}", role.as_str(), side.as_str(), sanitize_id(column))
}

/// All four handle ids a table node has to expose for one column
pub fn column_handle_ids(column: &str) -> [String; 4] {
    [
        handle_id(HandleRole::Source, HandleSide::Left, column),
        handle_id(HandleRole::Target, HandleSide::Left, column),
        handle_id(HandleRole::Source, HandleSide::Right, column),
        handle_id(HandleRole::Target, HandleSide::Right, column),
    ]
}

/// Positional edge id: `e-{from}-{to}-{index}`
pub fn edge_id(from_table: &str, to_table: &str, index: usize) -> String {
    format!(
        "e-{}-{}-{}",
        sanitize_id(from_table),
        sanitize_id(to_table),
        index
    )
}

/// Groups of distinct table names that sanitize to the same node id.
///
/// Each group is sorted and only groups with more than one name are returned.
pub fn find_id_collisions<'a, I>(tables: I) -> Vec<(String, Vec<String>)>
where
    I: IntoIterator<Item = &'a Table>,
{
    let mut by_id: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for table in tables {
        let names = by_id.entry(sanitize_id(&table.name)).or_default();
        if !names.contains(&table.name) {
            names.push(table.name.clone());
        }
    }

    by_id
        .into_iter()
        .filter(|(_, names)| names.len() > 1)
        .map(|(id, mut names)| {
            names.sort();
            (id, names)
        })
        .collect()
}
