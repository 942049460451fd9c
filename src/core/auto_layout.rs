//! Auto-layout module for automatic table arrangement
//!
//! Tables are arranged in layers by foreign-key depth: a table that references
//! another one is placed in a row below it. Each row is centered on `x = 0` and
//! rows are stacked top to bottom, separated by the tallest table of the row
//! above.
//!
//! Levels are found by bounded relaxation over the dependency graph rather than
//! a topological sort, so cyclic references still terminate. Tables inside a
//! cycle end up on some level below their non-cyclic parents; the order within
//! the cycle is not meaningful.
//!
//! The result depends only on the order of tables and their columns, so running
//! the layout twice on the same schema gives identical coordinates.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::core::ids::{find_id_collisions, sanitize_id};
use crate::core::schema::{DatabaseSchema, Note, Table};

/// Layout configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConfig {
    /// Assumed table width used for row spacing
    pub node_width: f64,
    /// Horizontal gap between tables in a row
    pub horizontal_spacing: f64,
    /// Vertical gap between rows
    pub vertical_spacing: f64,
    /// Y coordinate of the first row
    pub start_y: f64,
    /// Height of the table header
    pub header_height: f64,
    /// Height of a single column row
    pub row_height: f64,
    /// Extra padding below the last column
    pub padding: f64,
    /// Height reported for note nodes
    pub note_height: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: 320.0,
            horizontal_spacing: 250.0,
            vertical_spacing: 150.0,
            start_y: 50.0,
            header_height: 50.0,
            row_height: 40.0,
            padding: 20.0,
            note_height: 150.0,
        }
    }
}

impl LayoutConfig {
    /// Estimated rendered height of a table
    pub fn estimate_height(&self, table: &Table) -> f64 {
        self.header_height + table.columns.len() as f64 * self.row_height + self.padding
    }
}

/// Canvas coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// What a diagram node shows
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum NodePayload {
    Table(Arc<Table>),
    Note(Arc<Note>),
}

/// Positioned node handed to the renderer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutNode {
    /// Sanitized table name, or the note id
    pub id: String,
    pub position: Position,
    /// Width measured by the renderer, if it has reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Estimated height
    pub height: f64,
    #[serde(flatten)]
    pub payload: NodePayload,
}

impl LayoutNode {
    pub fn is_table(&self) -> bool {
        matches!(self.payload, NodePayload::Table(_))
    }

    pub fn is_note(&self) -> bool {
        matches!(self.payload, NodePayload::Note(_))
    }

    pub fn table(&self) -> Option<&Table> {
        match &self.payload {
            NodePayload::Table(table) => Some(table),
            NodePayload::Note(_) => None,
        }
    }
}

/// Result of auto-layout calculation
#[derive(Clone, Debug)]
pub struct LayoutResult {
    /// Table nodes, row by row, in schema order within each row
    pub nodes: Vec<LayoutNode>,
    /// Level of each table, indexed like `schema.tables()`
    pub levels: Vec<usize>,
    /// Relaxation passes that were run
    pub iterations: usize,
    /// False when the iteration cap was hit, which only happens with cycles
    pub converged: bool,
}

/// Dependency graph: node weight is the table index, edge `a -> b` means `a`
/// references `b`. Duplicate names resolve to their first table.
fn build_dependency_graph(schema: &DatabaseSchema) -> (DiGraph<usize, ()>, Vec<usize>) {
    let tables = schema.tables();
    let mut graph = DiGraph::with_capacity(tables.len(), schema.relationships().len());

    let mut first_index: HashMap<&str, usize> = HashMap::new();
    let owner: Vec<usize> = tables
        .iter()
        .enumerate()
        .map(|(i, table)| *first_index.entry(table.name.as_str()).or_insert(i))
        .collect();

    let nodes: Vec<NodeIndex> = (0..tables.len()).map(|i| graph.add_node(i)).collect();

    for rel in schema.relationships() {
        if rel.from_table == rel.to_table {
            continue;
        }
        let (Some(&from), Some(&to)) = (
            first_index.get(rel.from_table.as_str()),
            first_index.get(rel.to_table.as_str()),
        ) else {
            continue;
        };
        graph.update_edge(nodes[from], nodes[to], ());
    }

    (graph, owner)
}

/// Assign each table its level (row index).
///
/// Returns `(levels, iterations, converged)`.
pub fn compute_levels(schema: &DatabaseSchema) -> (Vec<usize>, usize, bool) {
    let (graph, owner) = build_dependency_graph(schema);
    let table_count = graph.node_count();
    let mut levels = vec![0usize; table_count];

    let max_iterations = table_count + 1;
    let mut iterations = 0;
    let mut converged = false;

    for _ in 0..max_iterations {
        iterations += 1;
        let mut changed = false;

        for node in graph.node_indices() {
            let max_parent = graph
                .neighbors_directed(node, Direction::Outgoing)
                .map(|parent| levels[graph[parent]])
                .max();

            if let Some(max_parent) = max_parent {
                let level = &mut levels[graph[node]];
                if *level <= max_parent {
                    *level = max_parent + 1;
                    changed = true;
                }
            }
        }

        if !changed {
            converged = true;
            break;
        }
    }

    if !converged {
        tracing::debug!(
            "Level relaxation stopped after {} iterations; schema has cyclic references",
            iterations
        );
    }

    // Duplicate names share the level of their first table
    let levels = owner.iter().map(|&first| levels[first]).collect();
    (levels, iterations, converged)
}

/// Performs the layered layout of all tables
pub fn calculate_layered_layout(schema: &DatabaseSchema, config: &LayoutConfig) -> LayoutResult {
    let tables = schema.tables();

    for (id, names) in find_id_collisions(tables.iter().map(|t| t.as_ref())) {
        tracing::warn!("Tables {:?} share the node id '{}'", names, id);
    }

    let (levels, iterations, converged) = compute_levels(schema);

    let mut rows: BTreeMap<usize, Vec<&Arc<Table>>> = BTreeMap::new();
    for (table, &level) in tables.iter().zip(&levels) {
        rows.entry(level).or_default().push(table);
    }

    let mut nodes = Vec::with_capacity(tables.len());
    let mut current_y = config.start_y;

    for row in rows.values() {
        let count = row.len() as f64;
        let row_width = count * config.node_width + (count - 1.0) * config.horizontal_spacing;
        let start_x = -(row_width / 2.0);

        let mut row_height: f64 = 0.0;
        for (col, table) in row.iter().enumerate() {
            let height = config.estimate_height(table);
            row_height = row_height.max(height);

            nodes.push(LayoutNode {
                id: sanitize_id(&table.name),
                position: Position::new(
                    start_x + col as f64 * (config.node_width + config.horizontal_spacing),
                    current_y,
                ),
                width: None,
                height,
                payload: NodePayload::Table(Arc::clone(table)),
            });
        }

        current_y += row_height + config.vertical_spacing;
    }

    tracing::debug!(
        "Layered layout: {} tables in {} rows",
        nodes.len(),
        rows.len()
    );

    LayoutResult {
        nodes,
        levels,
        iterations,
        converged,
    }
}

/// Note nodes at their stored positions
pub fn note_nodes(schema: &DatabaseSchema, config: &LayoutConfig) -> Vec<LayoutNode> {
    schema
        .notes()
        .iter()
        .map(|note| LayoutNode {
            id: note.id.clone(),
            position: Position::new(note.x, note.y),
            width: None,
            height: config.note_height,
            payload: NodePayload::Note(Arc::clone(note)),
        })
        .collect()
}

/// Convenience function: laid-out tables followed by notes
pub fn layout_diagram(schema: &DatabaseSchema, config: &LayoutConfig) -> Vec<LayoutNode> {
    let mut nodes = calculate_layered_layout(schema, config).nodes;
    nodes.extend(note_nodes(schema, config));
    nodes
}
