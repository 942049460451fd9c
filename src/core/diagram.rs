//! Diagram session: the host-facing entry points of the pipeline
//!
//! A session owns the schema history, the current nodes and edges, the
//! visual configuration and a [`RefreshScheduler`]. The host calls:
//!
//! - [`on_schema_committed`](DiagramSession::on_schema_committed) (and
//!   [`undo`](DiagramSession::undo) / [`redo`](DiagramSession::redo)) after a
//!   durable edit: full relayout, edges rebuilt immediately
//! - [`on_nodes_dragged`](DiagramSession::on_nodes_dragged) /
//!   [`on_node_drag_stop`](DiagramSession::on_node_drag_stop) while the user
//!   moves things: debounced edge refresh only
//! - [`on_visual_config_changed`](DiagramSession::on_visual_config_changed)
//!   when colors change
//!
//! Table positions set by dragging are transient. Any committed change
//! relays the tables out from scratch. Notes keep their position because it
//! is part of the schema.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::auto_layout::{LayoutNode, Position, layout_diagram};
use crate::core::config::{DiagramConfig, VisualConfig};
use crate::core::edge_routing::{EdgeDescriptor, route_edges};
use crate::core::error::{DiagramError, SchemaError};
use crate::core::history::History;
use crate::core::refresh::{EdgeBatch, RefreshScheduler, SchedulerStats};
use crate::core::relationships::{ReferenceIssue, diagnose_references};
use crate::core::schema::DatabaseSchema;

/// One editable diagram
#[derive(Debug)]
pub struct DiagramSession {
    config: DiagramConfig,
    history: History<DatabaseSchema>,
    nodes: Vec<LayoutNode>,
    edges: Vec<EdgeDescriptor>,
    /// Widths reported by the renderer, keyed by node id
    measured_widths: HashMap<String, f64>,
    scheduler: RefreshScheduler,
    published: mpsc::UnboundedReceiver<EdgeBatch>,
}

impl DiagramSession {
    /// Start a session on `schema`. Must be called inside a Tokio runtime.
    pub fn new(schema: DatabaseSchema, config: DiagramConfig) -> Result<Self, DiagramError> {
        let (scheduler, published) = RefreshScheduler::new(config.refresh_delay())?;

        let mut session = Self {
            config,
            history: History::new(schema),
            nodes: Vec::new(),
            edges: Vec::new(),
            measured_widths: HashMap::new(),
            scheduler,
            published,
        };
        session.relayout();
        Ok(session)
    }

    pub fn schema(&self) -> &Arc<DatabaseSchema> {
        self.history.state()
    }

    pub fn nodes(&self) -> &[LayoutNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[EdgeDescriptor] {
        &self.edges
    }

    pub fn config(&self) -> &DiagramConfig {
        &self.config
    }

    pub fn visual_config(&self) -> &VisualConfig {
        &self.config.visual
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// Malformed and dangling references in the current schema
    pub fn diagnostics(&self) -> Vec<ReferenceIssue> {
        diagnose_references(self.schema().tables())
    }

    /// Lay out the current schema from scratch and rebuild all edges
    fn relayout(&mut self) {
        let schema = Arc::clone(self.history.state());

        let mut nodes = layout_diagram(&schema, &self.config.layout);
        for node in &mut nodes {
            if let Some(&width) = self.measured_widths.get(&node.id) {
                node.width = Some(width);
            }
        }

        self.edges = route_edges(
            schema.relationships(),
            &self.config.visual,
            &nodes,
            &self.config.routing,
        );
        self.nodes = nodes;
        self.scheduler.set_inputs(
            schema.relationships(),
            &self.config.visual,
            &self.config.routing,
        );

        // Refreshes armed or published against the previous layout are stale
        self.scheduler.reset(&self.nodes, &self.edges);
        let mut stale = 0;
        while self.published.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            tracing::debug!("Dropped {} stale edge sets after relayout", stale);
        }
    }

    /// Record a durable edit and relayout
    pub fn on_schema_committed(&mut self, schema: DatabaseSchema) {
        self.history.set(schema);
        self.relayout();
    }

    /// Derive the next snapshot from the current one and commit it
    pub fn commit_with<F>(&mut self, edit: F) -> Result<(), SchemaError>
    where
        F: FnOnce(&DatabaseSchema) -> Result<DatabaseSchema, SchemaError>,
    {
        let next = edit(self.schema())?;
        self.on_schema_committed(next);
        Ok(())
    }

    /// Step back in history; false when there is nothing to undo
    pub fn undo(&mut self) -> bool {
        if self.history.undo().is_none() {
            return false;
        }
        self.relayout();
        true
    }

    /// Step forward in history; false when there is nothing to redo
    pub fn redo(&mut self) -> bool {
        if self.history.redo().is_none() {
            return false;
        }
        self.relayout();
        true
    }

    /// Relayout without touching history, dropping dragged table positions
    pub fn force_layout(&mut self) {
        self.relayout();
    }

    /// Positions reported mid-drag. Only the view changes; edges follow
    /// after the refresh delay.
    pub fn on_nodes_dragged<I>(&mut self, moves: I) -> Result<(), DiagramError>
    where
        I: IntoIterator<Item = (String, Position)>,
    {
        for (id, position) in moves {
            match self.nodes.iter_mut().find(|n| n.id == id) {
                Some(node) => node.position = position,
                None => tracing::debug!("Ignoring drag of unknown node '{}'", id),
            }
        }
        self.scheduler.trigger(self.nodes.clone())?;
        Ok(())
    }

    /// End of a drag. A note's new position is committed to history; a
    /// table's stays transient.
    pub fn on_node_drag_stop(&mut self, id: &str, position: Position) -> Result<(), DiagramError> {
        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| DiagramError::NodeNotFound(id.to_string()))?;
        node.position = position;

        if node.is_note() {
            let next = self.schema().with_note_moved(id, position.x, position.y)?;
            self.on_schema_committed(next);
        }

        self.scheduler.trigger(self.nodes.clone())?;
        Ok(())
    }

    /// New colors: restyle current edges now and schedule a refresh
    pub fn on_visual_config_changed(&mut self, visual: VisualConfig) -> Result<(), DiagramError> {
        for edge in &mut self.edges {
            let color = visual.color_for(&edge.data.relation_type).to_string();
            edge.style.stroke = color.clone();
            edge.marker_end.color = color.clone();
            edge.color = color;
        }
        self.scheduler.set_visual_config(&visual);
        self.config.visual = visual;

        self.scheduler.trigger(self.nodes.clone())?;
        Ok(())
    }

    /// Width measured by the renderer; kept across relayouts
    pub fn report_node_width(&mut self, id: &str, width: f64) {
        self.measured_widths.insert(id.to_string(), width);
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) {
            node.width = Some(width);
        }
    }

    /// Apply every edge set published so far; returns how many were applied
    pub fn poll_published(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(batch) = self.published.try_recv() {
            self.edges = batch.edges;
            applied += 1;
        }
        applied
    }

    /// Wait for the next published edge set and apply it
    pub async fn next_published(&mut self) -> Option<&[EdgeDescriptor]> {
        let batch = self.published.recv().await?;
        self.edges = batch.edges;
        Some(self.edges.as_slice())
    }

    /// Cancel pending refreshes; later drags and config changes will fail
    pub fn dispose(&mut self) {
        self.scheduler.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::HandleSide;
    use crate::core::schema::{Column, Note, Table, create_demo_schema};
    use std::time::Duration;
    use tokio::time::sleep;

    fn session() -> DiagramSession {
        DiagramSession::new(create_demo_schema(), DiagramConfig::default()).unwrap()
    }

    fn position_of(session: &DiagramSession, id: &str) -> Position {
        session.nodes().iter().find(|n| n.id == id).unwrap().position
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_layout_and_edges() {
        let session = session();
        assert_eq!(session.nodes().len(), 2);
        assert_eq!(session.edges().len(), 1);
        assert_eq!(session.edges()[0].label, "author (1:N)");
        assert!(!session.can_undo());
    }

    #[tokio::test(start_paused = true)]
    async fn test_table_drag_is_transient() {
        let mut session = session();
        let computed = position_of(&session, "Posts");

        session
            .on_node_drag_stop("Posts", Position::new(900.0, 0.0))
            .unwrap();
        assert_eq!(position_of(&session, "Posts"), Position::new(900.0, 0.0));
        assert!(!session.can_undo());

        sleep(Duration::from_millis(200)).await;
        assert_eq!(session.poll_published(), 1);
        let sides = session.edges()[0].sides().unwrap();
        assert_eq!(sides.source, HandleSide::Left);
        assert_eq!(sides.target, HandleSide::Right);

        // Any committed change restores the computed layout
        session.commit_with(|s| Ok(s.with_note_added(Note::new("x", 0.0, 0.0)))).unwrap();
        assert_eq!(position_of(&session, "Posts"), computed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_note_drag_is_committed() {
        let mut session = session();
        let note = Note::new("todo", 0.0, 0.0).with_id("note-1");
        session.commit_with(|s| Ok(s.with_note_added(note))).unwrap();

        session
            .on_node_drag_stop("note-1", Position::new(40.0, 60.0))
            .unwrap();
        assert_eq!(session.schema().note("note-1").unwrap().x, 40.0);
        assert_eq!(position_of(&session, "note-1"), Position::new(40.0, 60.0));

        assert!(session.undo());
        assert_eq!(session.schema().note("note-1").unwrap().x, 0.0);
        assert_eq!(position_of(&session, "note-1"), Position::new(0.0, 0.0));
        assert!(session.redo());
        assert_eq!(position_of(&session, "note-1"), Position::new(40.0, 60.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drag_burst_publishes_once() {
        let mut session = session();
        for step in 0..10 {
            let x = 300.0 + step as f64 * 50.0;
            session
                .on_nodes_dragged([("Posts".to_string(), Position::new(x, 0.0))])
                .unwrap();
            sleep(Duration::from_millis(16)).await;
        }
        sleep(Duration::from_millis(200)).await;

        let stats = session.scheduler_stats();
        assert_eq!(stats.triggers, 10);
        assert_eq!(stats.recomputes, 1);
        assert_eq!(session.poll_published(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_during_drag_discards_pending_refresh() {
        let mut session = session();
        session
            .on_nodes_dragged([("Posts".to_string(), Position::new(900.0, 0.0))])
            .unwrap();

        let comments = Table::new("Comments")
            .add_column(Column::new("post_id", "INT").foreign_key("Posts.id"));
        session.commit_with(|s| s.with_table_added(comments)).unwrap();
        assert_eq!(session.edges().len(), 2);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(session.poll_published(), 0);
        assert_eq!(session.edges().len(), session.schema().relationships().len());
        assert_eq!(session.scheduler_stats().recomputes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpolled_batch_dropped_by_undo() {
        let mut session = session();
        let comments = Table::new("Comments")
            .add_column(Column::new("post_id", "INT").foreign_key("Posts.id"));
        session.commit_with(|s| s.with_table_added(comments)).unwrap();

        session
            .on_nodes_dragged([("Posts".to_string(), Position::new(900.0, 0.0))])
            .unwrap();
        sleep(Duration::from_millis(200)).await;
        assert!(session.undo());

        assert_eq!(session.poll_published(), 0);
        assert_eq!(session.edges().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drag_back_after_relayout_republishes() {
        let mut session = session();
        let drag = || [("Posts".to_string(), Position::new(900.0, 0.0))];

        session.on_nodes_dragged(drag()).unwrap();
        sleep(Duration::from_millis(200)).await;
        assert_eq!(session.poll_published(), 1);
        assert_eq!(session.edges()[0].source_handle, "source-left-user_id");

        session.force_layout();
        assert_eq!(session.edges()[0].source_handle, "source-right-user_id");

        session.on_nodes_dragged(drag()).unwrap();
        sleep(Duration::from_millis(200)).await;
        assert_eq!(session.poll_published(), 1);
        assert_eq!(session.edges()[0].source_handle, "source-left-user_id");
    }

    #[tokio::test(start_paused = true)]
    async fn test_structural_edit_undo_redo() {
        let mut session = session();
        let comments = Table::new("Comments")
            .add_column(Column::new("id", "INT").primary_key())
            .add_column(Column::new("post_id", "INT").foreign_key("Posts.id"));
        session
            .commit_with(|s| s.with_table_added(comments))
            .unwrap();

        assert_eq!(session.edges().len(), 2);
        assert_eq!(session.nodes().len(), 3);
        // Comments sits one row below Posts
        assert!(position_of(&session, "Comments").y > position_of(&session, "Posts").y);

        assert!(session.undo());
        assert_eq!(session.edges().len(), 1);
        assert!(!session.undo());
        assert!(session.redo());
        assert_eq!(session.edges().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_edit_is_not_committed() {
        let mut session = session();
        let result = session.commit_with(|s| s.with_table_removed("Ghosts"));
        assert_eq!(result, Err(SchemaError::TableNotFound("Ghosts".into())));
        assert!(!session.can_undo());
    }

    #[tokio::test(start_paused = true)]
    async fn test_visual_config_change_recolors_immediately() {
        let mut session = session();
        let mut visual = VisualConfig::default();
        visual.relationship_colors.one_to_many = "#000000".into();

        session.on_visual_config_changed(visual).unwrap();
        assert_eq!(session.edges()[0].color, "#000000");
        assert_eq!(session.edges()[0].style.stroke, "#000000");
        assert_eq!(session.visual_config().relationship_colors.one_to_many, "#000000");
    }

    #[tokio::test(start_paused = true)]
    async fn test_measured_width_survives_relayout() {
        let mut session = session();
        session.report_node_width("Posts", 410.0);
        session.force_layout();
        let posts = session.nodes().iter().find(|n| n.id == "Posts").unwrap();
        assert_eq!(posts.width, Some(410.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_node_drag_stop() {
        let mut session = session();
        assert_eq!(
            session.on_node_drag_stop("nope", Position::default()),
            Err(DiagramError::NodeNotFound("nope".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_stops_refresh() {
        let mut session = session();
        session
            .on_nodes_dragged([("Posts".to_string(), Position::new(900.0, 0.0))])
            .unwrap();
        session.dispose();
        sleep(Duration::from_millis(500)).await;
        assert_eq!(session.poll_published(), 0);
        assert!(session.on_nodes_dragged(Vec::new()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_diagnostics() {
        let mut session = session();
        let broken = Table::new("Likes").add_column(Column::new("post_id", "INT").foreign_key("Post.id"));
        session.commit_with(|s| s.with_table_added(broken)).unwrap();
        let issues = session.diagnostics();
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], ReferenceIssue::MissingTable { .. }));
    }
}
