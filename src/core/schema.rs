use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::error::SchemaError;
use crate::core::relationships::extract_relationships;

/// Default sticky-note color
pub const DEFAULT_NOTE_COLOR: &str = "#fef3c7";

/// Cardinality of a foreign-key relationship
///
/// Serialized as the short notation used by the editor (`1:1`, `1:N`, `N:M`).
/// Unknown notations are kept verbatim so they can fall back to the default
/// edge color instead of being rejected.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RelationType {
    /// Один к одному
    OneToOne,
    /// Один ко многим
    #[default]
    OneToMany,
    /// Многие ко многим
    ManyToMany,
    Other(String),
}

impl RelationType {
    pub fn as_str(&self) -> &str {
        match self {
            RelationType::OneToOne => "1:1",
            RelationType::OneToMany => "1:N",
            RelationType::ManyToMany => "N:M",
            RelationType::Other(s) => s,
        }
    }
}

impl From<String> for RelationType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "1:1" => RelationType::OneToOne,
            "1:N" => RelationType::OneToMany,
            "N:M" => RelationType::ManyToMany,
            _ => RelationType::Other(value),
        }
    }
}

impl From<&str> for RelationType {
    fn from(value: &str) -> Self {
        RelationType::from(value.to_string())
    }
}

impl From<RelationType> for String {
    fn from(value: RelationType) -> Self {
        match value {
            RelationType::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_nullable() -> bool {
    true
}

/// Table column
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_foreign_key: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Target of a foreign key in `Table.Column` form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_type: Option<RelationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_constraint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_primary_key: false,
            is_foreign_key: false,
            is_unique: false,
            nullable: true,
            references: None,
            relation_type: None,
            relation_label: None,
            check_constraint: None,
            comment: None,
            on_delete: None,
            on_update: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    /// Mark the column as a foreign key pointing at `Table.Column`
    pub fn foreign_key(mut self, references: impl Into<String>) -> Self {
        self.is_foreign_key = true;
        self.references = Some(references.into());
        self
    }

    pub fn relation(mut self, relation_type: impl Into<RelationType>) -> Self {
        self.relation_type = Some(relation_type.into());
        self
    }

    pub fn relation_label(mut self, label: impl Into<String>) -> Self {
        self.relation_label = Some(label.into());
        self
    }

    pub fn check(mut self, constraint: impl Into<String>) -> Self {
        self.check_constraint = Some(constraint.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn on_delete(mut self, action: impl Into<String>) -> Self {
        self.on_delete = Some(action.into());
        self
    }

    pub fn on_update(mut self, action: impl Into<String>) -> Self {
        self.on_update = Some(action.into());
        self
    }
}

/// Database table
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            columns: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn add_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }
}

impl AsRef<Table> for Table {
    fn as_ref(&self) -> &Table {
        self
    }
}

/// Column-level editing on a table
pub trait TableOps {
    fn create_column(&mut self, column: Column);
    fn get_column(&self, index: usize) -> Option<&Column>;
    fn find_column(&self, name: &str) -> Option<(usize, &Column)>;
    fn update_column(&mut self, index: usize, column: Column) -> Result<(), SchemaError>;
    fn delete_column(&mut self, index: usize) -> Result<Column, SchemaError>;
    fn move_column(&mut self, from: usize, to: usize) -> Result<(), SchemaError>;
}

impl TableOps for Table {
    fn create_column(&mut self, column: Column) {
        self.columns.push(column);
    }

    fn get_column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    fn find_column(&self, name: &str) -> Option<(usize, &Column)> {
        self.columns.iter().enumerate().find(|(_, c)| c.name == name)
    }

    fn update_column(&mut self, index: usize, column: Column) -> Result<(), SchemaError> {
        let len = self.columns.len();
        let slot = self
            .columns
            .get_mut(index)
            .ok_or(SchemaError::ColumnIndexOutOfRange { index, len })?;
        *slot = column;
        Ok(())
    }

    fn delete_column(&mut self, index: usize) -> Result<Column, SchemaError> {
        let len = self.columns.len();
        if index >= len {
            return Err(SchemaError::ColumnIndexOutOfRange { index, len });
        }
        Ok(self.columns.remove(index))
    }

    fn move_column(&mut self, from: usize, to: usize) -> Result<(), SchemaError> {
        let len = self.columns.len();
        for index in [from, to] {
            if index >= len {
                return Err(SchemaError::ColumnIndexOutOfRange { index, len });
            }
        }
        let column = self.columns.remove(from);
        self.columns.insert(to, column);
        Ok(())
    }
}

/// Foreign-key link between two tables, always derived from column metadata
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Free-floating sticky note on the canvas
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    #[serde(default)]
    pub content: String,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Note {
    /// Create a note with a fresh `note-{uuid}` id
    pub fn new(content: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: format!("note-{}", uuid::Uuid::new_v4()),
            content: content.into(),
            x,
            y,
            color: Some(DEFAULT_NOTE_COLOR.to_string()),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Partial update applied to a note
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NoteUpdate {
    pub content: Option<String>,
    pub position: Option<(f64, f64)>,
    pub color: Option<String>,
}

/// Wire form of a schema. A `relationships` field in the input is ignored.
#[derive(Deserialize)]
struct RawSchema {
    #[serde(default)]
    tables: Vec<Table>,
    #[serde(default)]
    notes: Vec<Note>,
}

impl From<RawSchema> for DatabaseSchema {
    fn from(raw: RawSchema) -> Self {
        DatabaseSchema::new(raw.tables).with_notes(raw.notes)
    }
}

/// Immutable schema snapshot
///
/// Tables and notes are shared through `Arc`, so an edit only allocates the
/// parts it touches and the history can keep many snapshots cheaply.
/// `relationships` is always the extraction of `tables`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(from = "RawSchema")]
pub struct DatabaseSchema {
    tables: Vec<Arc<Table>>,
    relationships: Arc<[Relationship]>,
    notes: Vec<Arc<Note>>,
}

impl DatabaseSchema {
    pub fn new(tables: Vec<Table>) -> Self {
        Self::from_shared(tables.into_iter().map(Arc::new).collect(), Vec::new())
    }

    fn from_shared(tables: Vec<Arc<Table>>, notes: Vec<Arc<Note>>) -> Self {
        let relationships = extract_relationships(tables.iter().map(|t| t.as_ref())).into();
        Self {
            tables,
            relationships,
            notes,
        }
    }

    /// Parse schema JSON; any `relationships` in the input are recomputed
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn tables(&self) -> &[Arc<Table>] {
        &self.tables
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn notes(&self) -> &[Arc<Note>] {
        &self.notes
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.as_ref())
    }

    pub fn note(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id).map(|n| n.as_ref())
    }

    fn table_index(&self, name: &str) -> Result<usize, SchemaError> {
        self.tables
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| SchemaError::TableNotFound(name.to_string()))
    }

    fn note_index(&self, id: &str) -> Result<usize, SchemaError> {
        self.notes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| SchemaError::NoteNotFound(id.to_string()))
    }

    /// Table edits go through here so relationships are re-derived
    fn rebuild_tables(&self, tables: Vec<Arc<Table>>) -> Self {
        Self::from_shared(tables, self.notes.clone())
    }

    /// Note edits leave tables and relationships shared with `self`
    fn rebuild_notes(&self, notes: Vec<Arc<Note>>) -> Self {
        Self {
            tables: self.tables.clone(),
            relationships: Arc::clone(&self.relationships),
            notes,
        }
    }

    pub fn with_notes(&self, notes: Vec<Note>) -> Self {
        self.rebuild_notes(notes.into_iter().map(Arc::new).collect())
    }

    /// Replace the whole table list, keeping notes
    pub fn with_tables(&self, tables: Vec<Table>) -> Self {
        self.rebuild_tables(tables.into_iter().map(Arc::new).collect())
    }

    pub fn with_table_added(&self, table: Table) -> Result<Self, SchemaError> {
        if table.name.trim().is_empty() {
            return Err(SchemaError::EmptyTableName);
        }
        if self.table(&table.name).is_some() {
            return Err(SchemaError::DuplicateTable(table.name));
        }
        let mut tables = self.tables.clone();
        tables.push(Arc::new(table));
        Ok(self.rebuild_tables(tables))
    }

    /// Replace the table called `name`; the replacement may carry a new name
    pub fn with_table_replaced(&self, name: &str, table: Table) -> Result<Self, SchemaError> {
        let index = self.table_index(name)?;
        if table.name.trim().is_empty() {
            return Err(SchemaError::EmptyTableName);
        }
        if table.name != name && self.table(&table.name).is_some() {
            return Err(SchemaError::DuplicateTable(table.name));
        }
        let mut tables = self.tables.clone();
        tables[index] = Arc::new(table);
        Ok(self.rebuild_tables(tables))
    }

    /// Apply `edit` to a copy of one table
    pub fn with_table_edited<F>(&self, name: &str, edit: F) -> Result<Self, SchemaError>
    where
        F: FnOnce(&mut Table) -> Result<(), SchemaError>,
    {
        let index = self.table_index(name)?;
        let mut table = Table::clone(&self.tables[index]);
        edit(&mut table)?;
        self.with_table_replaced(name, table)
    }

    /// Rename a table and repoint every `references` that targeted it
    pub fn with_table_renamed(&self, old: &str, new: &str) -> Result<Self, SchemaError> {
        let index = self.table_index(old)?;
        if new.trim().is_empty() {
            return Err(SchemaError::EmptyTableName);
        }
        if old != new && self.table(new).is_some() {
            return Err(SchemaError::DuplicateTable(new.to_string()));
        }

        let prefix = format!("{old}.");
        let tables = self
            .tables
            .iter()
            .enumerate()
            .map(|(i, table)| {
                let points_here = table.columns.iter().any(|c| {
                    c.references
                        .as_deref()
                        .is_some_and(|r| r.trim_start().starts_with(&prefix))
                });
                if i != index && !points_here {
                    return Arc::clone(table);
                }

                let mut table = Table::clone(table);
                if i == index {
                    table.name = new.to_string();
                }
                for column in &mut table.columns {
                    if let Some(target) = column
                        .references
                        .as_deref()
                        .and_then(|r| r.trim_start().strip_prefix(&prefix))
                    {
                        column.references = Some(format!("{new}.{target}"));
                    }
                }
                Arc::new(table)
            })
            .collect();

        Ok(self.rebuild_tables(tables))
    }

    pub fn with_table_removed(&self, name: &str) -> Result<Self, SchemaError> {
        let index = self.table_index(name)?;
        let mut tables = self.tables.clone();
        tables.remove(index);
        Ok(self.rebuild_tables(tables))
    }

    pub fn with_all_tables_cleared(&self) -> Self {
        self.rebuild_tables(Vec::new())
    }

    pub fn with_note_added(&self, note: Note) -> Self {
        let mut notes = self.notes.clone();
        notes.push(Arc::new(note));
        self.rebuild_notes(notes)
    }

    pub fn with_note_updated(&self, id: &str, update: NoteUpdate) -> Result<Self, SchemaError> {
        let index = self.note_index(id)?;
        let mut note = Note::clone(&self.notes[index]);
        if let Some(content) = update.content {
            note.content = content;
        }
        if let Some((x, y)) = update.position {
            note.x = x;
            note.y = y;
        }
        if let Some(color) = update.color {
            note.color = Some(color);
        }
        let mut notes = self.notes.clone();
        notes[index] = Arc::new(note);
        Ok(self.rebuild_notes(notes))
    }

    pub fn with_note_moved(&self, id: &str, x: f64, y: f64) -> Result<Self, SchemaError> {
        self.with_note_updated(
            id,
            NoteUpdate {
                position: Some((x, y)),
                ..NoteUpdate::default()
            },
        )
    }

    pub fn with_note_removed(&self, id: &str) -> Result<Self, SchemaError> {
        let index = self.note_index(id)?;
        let mut notes = self.notes.clone();
        notes.remove(index);
        Ok(self.rebuild_notes(notes))
    }
}

/// Starter schema shown in a fresh editor
pub fn create_demo_schema() -> DatabaseSchema {
    DatabaseSchema::new(vec![
        Table::new("Users")
            .add_column(Column::new("id", "UUID").primary_key())
            .add_column(Column::new("username", "VARCHAR(50)").not_null().unique())
            .add_column(Column::new("email", "VARCHAR(255)").not_null().unique())
            .add_column(
                Column::new("role", "VARCHAR(20)")
                    .not_null()
                    .check("role IN ('admin', 'user')"),
            )
            .add_column(
                Column::new("created_at", "TIMESTAMP")
                    .not_null()
                    .comment("Record creation time"),
            ),
        Table::new("Posts")
            .add_column(Column::new("id", "SERIAL").primary_key())
            .add_column(
                Column::new("user_id", "UUID")
                    .foreign_key("Users.id")
                    .relation(RelationType::OneToMany)
                    .relation_label("author"),
            )
            .add_column(Column::new("title", "VARCHAR(255)").not_null())
            .add_column(Column::new("content", "TEXT")),
    ])
}
