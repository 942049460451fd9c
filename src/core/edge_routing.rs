//! Edge routing: picks which side of each table a connector attaches to
//!
//! Routing runs after layout and only looks at finished node positions. The
//! rule is deliberately simple:
//! - tables in visibly different columns connect facing sides
//!   (`right -> left` when the target is to the right, `left -> right` otherwise)
//! - tables stacked in the same column connect `right -> right`, a bracket
//!   that leaves the left side free
//! - if either table has no node (dangling reference, nodes not computed yet)
//!   the edge falls back to `right -> left` without looking at geometry
//!
//! Every call rebuilds all edges; nothing is patched in place.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::auto_layout::LayoutNode;
use crate::core::config::VisualConfig;
use crate::core::ids::{HandleRole, HandleSide, edge_id, handle_id, sanitize_id};
use crate::core::schema::Relationship;

/// Routing configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoutingConfig {
    /// Width assumed for nodes the renderer has not measured yet
    pub fallback_node_width: f64,
    /// Extra horizontal distance beyond one node width before two tables
    /// count as being in different columns
    pub column_gap: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            fallback_node_width: 320.0,
            column_gap: 100.0,
        }
    }
}

/// Handle sides chosen for one edge
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandleSides {
    pub source: HandleSide,
    pub target: HandleSide,
}

impl HandleSides {
    /// Left-to-right reading flow
    pub const DEFAULT: HandleSides = HandleSides {
        source: HandleSide::Right,
        target: HandleSide::Left,
    };
}

/// Pick handle sides from node geometry
pub fn choose_sides(
    source: Option<&LayoutNode>,
    target: Option<&LayoutNode>,
    config: &RoutingConfig,
) -> HandleSides {
    let (Some(source), Some(target)) = (source, target) else {
        return HandleSides::DEFAULT;
    };

    let dx = target.position.x - source.position.x;
    let width = source.width.unwrap_or(config.fallback_node_width);

    if dx.abs() > width + config.column_gap {
        if dx > 0.0 {
            HandleSides::DEFAULT
        } else {
            HandleSides {
                source: HandleSide::Left,
                target: HandleSide::Right,
            }
        }
    } else {
        HandleSides {
            source: HandleSide::Right,
            target: HandleSide::Right,
        }
    }
}

/// Stroke of an edge
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeStyle {
    pub stroke: String,
    pub stroke_width: f64,
}

/// Path shape options for the renderer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathOptions {
    pub border_radius: f64,
    /// Distance the path keeps from the table before turning
    pub offset: f64,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            border_radius: 40.0,
            offset: 80.0,
        }
    }
}

/// Arrow at the target end
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeMarker {
    #[serde(rename = "type")]
    pub kind: String,
    pub color: String,
    pub width: f64,
    pub height: f64,
}

impl EdgeMarker {
    pub fn arrow_closed(color: impl Into<String>) -> Self {
        Self {
            kind: "arrowclosed".to_string(),
            color: color.into(),
            width: 24.0,
            height: 24.0,
        }
    }
}

/// Connector handed to the renderer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDescriptor {
    /// Positional id `e-{from}-{to}-{index}`
    pub id: String,
    pub source: String,
    pub target: String,
    pub source_handle: String,
    pub target_handle: String,
    pub label: String,
    pub color: String,
    pub style: EdgeStyle,
    pub animated: bool,
    #[serde(rename = "type")]
    pub path_type: String,
    pub path_options: PathOptions,
    pub marker_end: EdgeMarker,
    pub z_index: i32,
    /// Relationship this edge was built from
    pub data: Relationship,
}

#[cfg(test)]
impl EdgeDescriptor {
    /// Sides read back from the handle ids
    pub(crate) fn sides(&self) -> Option<HandleSides> {
        let side = |handle: &str, role: &str| -> Option<HandleSide> {
            match handle.strip_prefix(role)?.split('-').nth(1)? {
                "left" => Some(HandleSide::Left),
                "right" => Some(HandleSide::Right),
                _ => None,
            }
        };
        Some(HandleSides {
            source: side(&self.source_handle, HandleRole::Source.as_str())?,
            target: side(&self.target_handle, HandleRole::Target.as_str())?,
        })
    }
}

/// `"{label} ({type})"`, or just the type when there is no label
pub fn edge_label(relationship: &Relationship) -> String {
    match relationship.label.as_deref() {
        Some(label) if !label.is_empty() => {
            format!("{} ({})", label, relationship.relation_type)
        }
        _ => relationship.relation_type.to_string(),
    }
}

fn build_edge(
    index: usize,
    relationship: &Relationship,
    sides: HandleSides,
    visual: &VisualConfig,
) -> EdgeDescriptor {
    let color = visual.color_for(&relationship.relation_type).to_string();

    EdgeDescriptor {
        id: edge_id(&relationship.from_table, &relationship.to_table, index),
        source: sanitize_id(&relationship.from_table),
        target: sanitize_id(&relationship.to_table),
        source_handle: handle_id(HandleRole::Source, sides.source, &relationship.from_column),
        target_handle: handle_id(HandleRole::Target, sides.target, &relationship.to_column),
        label: edge_label(relationship),
        style: EdgeStyle {
            stroke: color.clone(),
            stroke_width: 2.0,
        },
        animated: true,
        path_type: "smoothstep".to_string(),
        path_options: PathOptions::default(),
        marker_end: EdgeMarker::arrow_closed(color.clone()),
        z_index: 1,
        color,
        data: relationship.clone(),
    }
}

/// Build one edge per relationship, in relationship order.
///
/// Only table nodes take part in the lookup; notes never anchor edges.
pub fn route_edges(
    relationships: &[Relationship],
    visual: &VisualConfig,
    nodes: &[LayoutNode],
    config: &RoutingConfig,
) -> Vec<EdgeDescriptor> {
    let node_map: HashMap<&str, &LayoutNode> = nodes
        .iter()
        .filter(|n| n.is_table())
        .map(|n| (n.id.as_str(), n))
        .collect();

    let edges: Vec<EdgeDescriptor> = relationships
        .iter()
        .enumerate()
        .map(|(index, rel)| {
            let source = node_map.get(sanitize_id(&rel.from_table).as_str()).copied();
            let target = node_map.get(sanitize_id(&rel.to_table).as_str()).copied();
            let sides = choose_sides(source, target, config);
            build_edge(index, rel, sides, visual)
        })
        .collect();

    tracing::debug!(
        "Routed {} edges over {} table nodes",
        edges.len(),
        node_map.len()
    );
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auto_layout::{NodePayload, Position};
    use crate::core::schema::{RelationType, Table};
    use std::sync::Arc;

    fn table_node(name: &str, x: f64, y: f64) -> LayoutNode {
        LayoutNode {
            id: sanitize_id(name),
            position: Position::new(x, y),
            width: None,
            height: 110.0,
            payload: NodePayload::Table(Arc::new(Table::new(name))),
        }
    }

    fn rel(from: &str, from_col: &str, to: &str, to_col: &str) -> Relationship {
        Relationship {
            from_table: from.into(),
            from_column: from_col.into(),
            to_table: to.into(),
            to_column: to_col.into(),
            relation_type: RelationType::OneToMany,
            label: None,
        }
    }

    fn sides_for(dx: f64, width: Option<f64>) -> HandleSides {
        let mut source = table_node("a", 0.0, 0.0);
        source.width = width;
        let target = table_node("b", dx, 300.0);
        choose_sides(Some(&source), Some(&target), &RoutingConfig::default())
    }

    #[test]
    fn test_target_far_right_uses_right_to_left() {
        assert_eq!(sides_for(421.0, None), HandleSides::DEFAULT);
        assert_eq!(sides_for(570.0, None), HandleSides::DEFAULT);
    }

    #[test]
    fn test_target_far_left_uses_left_to_right() {
        let sides = sides_for(-421.0, None);
        assert_eq!(sides.source, HandleSide::Left);
        assert_eq!(sides.target, HandleSide::Right);
    }

    #[test]
    fn test_same_column_uses_bracket() {
        for dx in [0.0, 420.0, -420.0, 100.0] {
            let sides = sides_for(dx, None);
            assert_eq!(sides.source, HandleSide::Right, "dx = {dx}");
            assert_eq!(sides.target, HandleSide::Right, "dx = {dx}");
        }
    }

    #[test]
    fn test_measured_width_changes_threshold() {
        // 421 is past the fallback threshold but inside 400 + 100
        assert_eq!(sides_for(421.0, Some(400.0)).target, HandleSide::Right);
        assert_eq!(sides_for(250.0, Some(100.0)), HandleSides::DEFAULT);
    }

    #[test]
    fn test_missing_node_uses_default_sides() {
        let node = table_node("a", 0.0, 0.0);
        let config = RoutingConfig::default();
        assert_eq!(choose_sides(Some(&node), None, &config), HandleSides::DEFAULT);
        assert_eq!(choose_sides(None, Some(&node), &config), HandleSides::DEFAULT);
    }

    #[test]
    fn test_route_builds_one_edge_per_relationship() {
        let nodes = vec![
            table_node("Users", -285.0, 50.0),
            table_node("Posts", 285.0, 50.0),
            table_node("Comments", -160.0, 400.0),
        ];
        let rels = vec![
            rel("Posts", "user_id", "Users", "id"),
            rel("Comments", "post_id", "Posts", "id"),
            rel("Comments", "author id", "Users", "id"),
        ];
        let edges = route_edges(&rels, &VisualConfig::default(), &nodes, &RoutingConfig::default());

        assert_eq!(edges.len(), rels.len());
        assert_eq!(edges[0].id, "e-Posts-Users-0");
        assert_eq!(edges[0].source, "Posts");
        assert_eq!(edges[0].target, "Users");
        // Users is 570 to the left of Posts
        assert_eq!(edges[0].source_handle, "source-left-user_id");
        assert_eq!(edges[0].target_handle, "target-right-id");
        // Posts is 445 to the right of Comments
        assert_eq!(edges[1].source_handle, "source-right-post_id");
        assert_eq!(edges[1].target_handle, "target-left-id");
        // Users is 125 to the left of Comments: same column
        assert_eq!(edges[2].source_handle, "source-right-author_id");
        assert_eq!(edges[2].target_handle, "target-right-id");
        assert_eq!(edges[2].id, "e-Comments-Users-2");
    }

    #[test]
    fn test_route_without_nodes_keeps_all_edges() {
        let rels = vec![rel("Posts", "user_id", "Users", "id")];
        let edges = route_edges(&rels, &VisualConfig::default(), &[], &RoutingConfig::default());

        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source_handle, "source-right-user_id");
        assert_eq!(edges[0].target_handle, "target-left-id");
    }

    #[test]
    fn test_route_uses_sanitized_node_ids() {
        let nodes = vec![
            table_node("Orders", 0.0, 50.0),
            table_node("Order Items", 600.0, 50.0),
        ];
        let rels = vec![rel("Order Items", "order id", "Orders", "id")];
        let edges = route_edges(&rels, &VisualConfig::default(), &nodes, &RoutingConfig::default());

        assert_eq!(nodes[1].id, "Order_Items");
        assert_eq!(edges[0].id, "e-Order_Items-Orders-0");
        assert_eq!(edges[0].source, "Order_Items");
        assert_eq!(edges[0].target, "Orders");
        // Found by sanitized id, so geometry decides: Orders is 600 to the left
        assert_eq!(edges[0].source_handle, "source-left-order_id");
        assert_eq!(edges[0].target_handle, "target-right-id");
        // Relationship data keeps the raw names
        assert_eq!(edges[0].data.from_table, "Order Items");
    }

    #[test]
    fn test_dangling_reference_routes_with_default_sides() {
        let nodes = vec![table_node("Posts", 1000.0, 0.0)];
        let rels = vec![rel("Posts", "team_id", "Teams", "id")];
        let edges = route_edges(&rels, &VisualConfig::default(), &nodes, &RoutingConfig::default());
        assert_eq!(edges[0].sides(), Some(HandleSides::DEFAULT));
        assert_eq!(edges[0].target, "Teams");
    }

    #[test]
    fn test_edge_color_and_label() {
        let visual = VisualConfig::default();
        let mut labelled = rel("Posts", "user_id", "Users", "id");
        labelled.label = Some("author".into());
        let mut unknown = rel("Tags", "post_id", "Posts", "id");
        unknown.relation_type = RelationType::Other("0..1".into());
        let mut one_to_one = rel("Profiles", "user_id", "Users", "id");
        one_to_one.relation_type = RelationType::OneToOne;

        let edges = route_edges(
            &[labelled, unknown, one_to_one],
            &visual,
            &[],
            &RoutingConfig::default(),
        );

        assert_eq!(edges[0].label, "author (1:N)");
        assert_eq!(edges[0].color, visual.relationship_colors.one_to_many);
        assert_eq!(edges[0].style.stroke, edges[0].color);
        assert_eq!(edges[0].marker_end.color, edges[0].color);
        assert_eq!(edges[1].label, "0..1");
        assert_eq!(edges[1].color, visual.relationship_colors.default);
        assert_eq!(edges[2].color, visual.relationship_colors.one_to_one);
    }

    #[test]
    fn test_notes_are_not_edge_anchors() {
        use crate::core::schema::Note;
        let note = LayoutNode {
            id: "Users".into(),
            position: Position::new(5000.0, 0.0),
            width: None,
            height: 150.0,
            payload: NodePayload::Note(Arc::new(Note::new("", 5000.0, 0.0).with_id("Users"))),
        };
        let nodes = vec![table_node("Posts", 0.0, 0.0), note];
        let rels = vec![rel("Posts", "user_id", "Users", "id")];
        let edges = route_edges(&rels, &VisualConfig::default(), &nodes, &RoutingConfig::default());
        assert_eq!(edges[0].sides(), Some(HandleSides::DEFAULT));
    }

    #[test]
    fn test_edge_serialization_shape() {
        let rels = vec![rel("Posts", "user_id", "Users", "id")];
        let edges = route_edges(&rels, &VisualConfig::default(), &[], &RoutingConfig::default());
        let json = serde_json::to_value(&edges[0]).unwrap();
        assert_eq!(json["sourceHandle"], "source-right-user_id");
        assert_eq!(json["type"], "smoothstep");
        assert_eq!(json["data"]["fromTable"], "Posts");
        assert_eq!(json["markerEnd"]["type"], "arrowclosed");
    }
}
