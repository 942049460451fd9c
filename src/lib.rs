//! Schemaflow - Database Schema Diagram Pipeline
//!
//! Turns a relational schema into a diagram: foreign-key relationships are
//! extracted from column metadata, tables are laid out in dependency levels,
//! edges are routed between column handles and refreshed with a debounce
//! while nodes are dragged. Schema edits are kept in an undo/redo history.

pub mod core;
