use crate::flow::flow_synthesis::{
    synthesize_flows, BranchInfo, ExecOption, FlatFlowNode, FlowDescription, FlowSynthesisError,
    InterNodeType,
};
use crate::flow::layout::{
    resolve_horizontal_overlaps, NodeRect, ACTIVITY_CONNECTOR_HEIGHT, ACTIVITY_CONNECTOR_WIDTH,
    EVENT_NODE_SIZE, GATEWAY_NODE_SIZE, LANE_Y_OFFSET, LANE_Y_SPACING, BRANCH_Y_SPACING,
    NODE_X_SPACING, X_START,
};
use crate::process_tree::process_tree_struct::{ObjectType, OCPT};
use crate::replay::token_replay::Token;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

///
/// A 2D position of a rendered node
///
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
}

///
/// Type of a node in the materialized flow graph
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowNodeType {
    /// Event, gateway, or loop marker node
    Inter(InterNodeType),
    /// Entry connector of an activity's shared connector pair
    ActivityEntry,
    /// Exit connector of an activity's shared connector pair
    ActivityExit,
}

impl FlowNodeType {
    ///
    /// Returns the render-facing type name of the node
    ///
    pub fn type_name(&self) -> &'static str {
        match self {
            FlowNodeType::Inter(inter) => inter.id_prefix(),
            FlowNodeType::ActivityEntry => "activityEntry",
            FlowNodeType::ActivityExit => "activityExit",
        }
    }
}

///
/// A node of the materialized flow graph
///
#[derive(Debug, Clone, PartialEq)]
pub struct FlowNode {
    /// Unique node id
    pub id: String,
    /// Node type
    pub node_type: FlowNodeType,
    /// Activity name for connector nodes
    pub activity: Option<String>,
    /// Lane object type for intermediate nodes (connector pairs are shared)
    pub ot: Option<ObjectType>,
    /// Branch count for splits and joins
    pub branches: Option<usize>,
    /// Branch the node lies on, if any
    pub branch_info: Option<BranchInfo>,
    /// Assigned layout position
    pub position: Position,
    /// Node width
    pub width: f64,
    /// Node height
    pub height: f64,
}

///
/// An edge of the materialized flow graph
///
/// Edges are read-only during replay; token lists and replay working state
/// live in the replay engine, keyed by edge id.
///
#[derive(Debug, Clone, PartialEq)]
pub struct FlowEdge {
    /// Unique edge id
    pub id: String,
    /// Object type whose lane the edge belongs to
    pub ot: ObjectType,
    /// Execution option for connector-pair edges
    pub exec_option: Option<ExecOption>,
    /// Activity name, set on execute edges
    pub activity: Option<String>,
    /// Render handle on the source node
    pub source_handle: Option<String>,
    /// Render handle on the target node
    pub target_handle: Option<String>,
}

impl FlowEdge {
    ///
    /// Returns `true` if this is an activity execute edge
    ///
    pub fn is_execute(&self) -> bool {
        self.exec_option.as_ref().is_some_and(ExecOption::is_execute)
    }
}

///
/// The materialized, per-object-type-lane flow graph of one synthesis run
///
/// Backed by a stable directed graph; node and edge indices stay valid for
/// the graph's lifetime and serve as handles during replay.
///
#[derive(Debug, Default)]
pub struct FlowGraph {
    graph: StableDiGraph<FlowNode, FlowEdge>,
    node_by_id: HashMap<String, NodeIndex>,
    edge_by_id: HashMap<String, EdgeIndex>,
    start_events: HashMap<ObjectType, NodeIndex>,
    end_events: HashMap<ObjectType, NodeIndex>,
    object_types: Vec<ObjectType>,
}

impl FlowGraph {
    ///
    /// Creates an empty flow graph
    ///
    pub fn new() -> Self {
        Self::default()
    }

    ///
    /// Materializes a flat flow description into a graph
    ///
    /// Activity nodes become one shared entry/exit connector pair per
    /// distinct activity name; every lane contributes its own execution
    /// option edges between the pair and its own link edges along the lane.
    ///
    pub fn from_description(description: &FlowDescription) -> Self {
        let mut result = Self::new();

        for lane in &description.lanes {
            if !result.object_types.contains(&lane.ot) {
                result.object_types.push(lane.ot.clone());
            }
            for node in &lane.nodes {
                match node {
                    FlatFlowNode::Inter(inter) => {
                        let idx = result.add_node(FlowNode {
                            id: inter.id.clone(),
                            node_type: FlowNodeType::Inter(inter.node_type),
                            activity: None,
                            ot: Some(lane.ot.clone()),
                            branches: inter.branches,
                            branch_info: inter.branch_info.clone(),
                            position: Position::default(),
                            width: 0.0,
                            height: 0.0,
                        });
                        match inter.node_type {
                            InterNodeType::StartEvent => {
                                result.start_events.insert(lane.ot.clone(), idx);
                            }
                            InterNodeType::EndEvent => {
                                result.end_events.insert(lane.ot.clone(), idx);
                            }
                            _ => {}
                        }
                    }
                    FlatFlowNode::Activity(activity) => {
                        result.ensure_activity_pair(&activity.id, &activity.activity);
                    }
                }
            }
        }

        for lane in &description.lanes {
            for node in &lane.nodes {
                match node {
                    FlatFlowNode::Activity(activity) => {
                        for option in &activity.exec_options {
                            result.add_exec_option_edge(&lane.ot, &activity.id, &activity.activity, *option);
                        }
                        result.add_link_edge(
                            &lane.ot,
                            &activity.id,
                            &activity.next,
                            None,
                            activity.branch_info.as_ref(),
                        );
                    }
                    FlatFlowNode::Inter(inter) => {
                        let branched = inter.next.len() > 1;
                        for (branch_idx, target) in inter.next.iter().enumerate() {
                            result.add_link_edge(
                                &lane.ot,
                                &inter.id,
                                target,
                                branched.then_some(branch_idx),
                                inter.branch_info.as_ref(),
                            );
                        }
                    }
                }
            }
        }

        result
    }

    ///
    /// Adds a node and registers its id, returning its index
    ///
    pub fn add_node(&mut self, node: FlowNode) -> NodeIndex {
        let id = node.id.clone();
        let idx = self.graph.add_node(node);
        self.node_by_id.insert(id, idx);
        idx
    }

    ///
    /// Adds an edge between two nodes and registers its id, returning its
    /// index
    ///
    pub fn add_edge(&mut self, source: NodeIndex, target: NodeIndex, edge: FlowEdge) -> EdgeIndex {
        let id = edge.id.clone();
        let idx = self.graph.add_edge(source, target, edge);
        self.edge_by_id.insert(id, idx);
        idx
    }

    ///
    /// Registers a node as the start event of an object type
    ///
    pub fn register_start_event(&mut self, ot: &str, idx: NodeIndex) {
        if !self.object_types.iter().any(|o| o == ot) {
            self.object_types.push(ot.to_string());
        }
        self.start_events.insert(ot.to_string(), idx);
    }

    ///
    /// Registers a node as the end event of an object type
    ///
    pub fn register_end_event(&mut self, ot: &str, idx: NodeIndex) {
        self.end_events.insert(ot.to_string(), idx);
    }

    fn ensure_activity_pair(&mut self, shared_id: &str, activity: &str) {
        let entry_id = format!("{shared_id}-in");
        if !self.node_by_id.contains_key(&entry_id) {
            self.add_node(FlowNode {
                id: entry_id,
                node_type: FlowNodeType::ActivityEntry,
                activity: Some(activity.to_string()),
                ot: None,
                branches: None,
                branch_info: None,
                position: Position::default(),
                width: 0.0,
                height: 0.0,
            });
        }
        let exit_id = format!("{shared_id}-out");
        if !self.node_by_id.contains_key(&exit_id) {
            self.add_node(FlowNode {
                id: exit_id,
                node_type: FlowNodeType::ActivityExit,
                activity: Some(activity.to_string()),
                ot: None,
                branches: None,
                branch_info: None,
                position: Position::default(),
                width: 0.0,
                height: 0.0,
            });
        }
    }

    fn add_exec_option_edge(&mut self, ot: &str, shared_id: &str, activity: &str, option: ExecOption) {
        let (label, from, to) = match option {
            ExecOption::Skip => ("skip", format!("{shared_id}-in"), format!("{shared_id}-out")),
            ExecOption::Execute { .. } => {
                ("execute", format!("{shared_id}-in"), format!("{shared_id}-out"))
            }
            ExecOption::Loop => ("loop", format!("{shared_id}-out"), format!("{shared_id}-in")),
        };
        let id = format!("edge-{label}-{ot}-{activity}");
        if self.edge_by_id.contains_key(&id) {
            return;
        }
        let (Some(&source), Some(&target)) =
            (self.node_by_id.get(&from), self.node_by_id.get(&to))
        else {
            return;
        };
        self.add_edge(
            source,
            target,
            FlowEdge {
                id,
                ot: ot.to_string(),
                exec_option: Some(option),
                activity: option
                    .is_execute()
                    .then(|| activity.to_string()),
                source_handle: None,
                target_handle: None,
            },
        );
    }

    /// Connects the source node's exit point to the target node's entry point
    /// for one lane. Activity ids resolve to their connector pair.
    fn add_link_edge(
        &mut self,
        ot: &str,
        source_flat_id: &str,
        target_flat_id: &str,
        branch_idx: Option<usize>,
        source_branch_info: Option<&BranchInfo>,
    ) {
        let Some(source) = self.exit_point(source_flat_id) else {
            eprintln!("Flow graph: unknown link source {source_flat_id}");
            return;
        };
        let Some(target) = self.entry_point(target_flat_id) else {
            eprintln!("Flow graph: unknown link target {target_flat_id}");
            return;
        };

        let mut id = format!("edge-{ot}-{source_flat_id}-{target_flat_id}");
        if let Some(branch_idx) = branch_idx {
            id.push_str(&format!("-b{branch_idx}"));
        }
        if self.edge_by_id.contains_key(&id) {
            return;
        }

        let source_handle = branch_idx.map(|idx| format!("branch-{idx}"));
        let target_is_join = self.graph.node_weight(target).is_some_and(|node| {
            matches!(
                node.node_type,
                FlowNodeType::Inter(InterNodeType::ParallelJoin)
                    | FlowNodeType::Inter(InterNodeType::XorJoin)
            )
        });
        let target_handle = if target_is_join {
            source_branch_info
                .map(|info| format!("branch-{}", info.branch_id))
                .or_else(|| branch_idx.map(|idx| format!("branch-{idx}")))
        } else {
            None
        };

        self.add_edge(
            source,
            target,
            FlowEdge {
                id,
                ot: ot.to_string(),
                exec_option: None,
                activity: None,
                source_handle,
                target_handle,
            },
        );
    }

    fn entry_point(&self, flat_id: &str) -> Option<NodeIndex> {
        self.node_by_id
            .get(flat_id)
            .or_else(|| self.node_by_id.get(&format!("{flat_id}-in")))
            .copied()
    }

    fn exit_point(&self, flat_id: &str) -> Option<NodeIndex> {
        self.node_by_id
            .get(flat_id)
            .or_else(|| self.node_by_id.get(&format!("{flat_id}-out")))
            .copied()
    }

    ///
    /// Returns the start event node of an object type
    ///
    pub fn start_event(&self, ot: &str) -> Option<NodeIndex> {
        self.start_events.get(ot).copied()
    }

    ///
    /// Returns the end event node of an object type
    ///
    pub fn end_event(&self, ot: &str) -> Option<NodeIndex> {
        self.end_events.get(ot).copied()
    }

    ///
    /// Returns the node behind an index
    ///
    pub fn node(&self, idx: NodeIndex) -> Option<&FlowNode> {
        self.graph.node_weight(idx)
    }

    ///
    /// Returns the edge behind an index
    ///
    pub fn edge(&self, idx: EdgeIndex) -> Option<&FlowEdge> {
        self.graph.edge_weight(idx)
    }

    ///
    /// Returns an edge's source and target nodes
    ///
    pub fn edge_endpoints(&self, idx: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(idx)
    }

    ///
    /// Looks an edge up by its id
    ///
    pub fn edge_index_by_id(&self, id: &str) -> Option<EdgeIndex> {
        self.edge_by_id.get(id).copied()
    }

    ///
    /// Looks a node up by its id
    ///
    pub fn node_index_by_id(&self, id: &str) -> Option<NodeIndex> {
        self.node_by_id.get(id).copied()
    }

    ///
    /// Returns a node's outgoing edges in insertion order
    ///
    pub fn outgoing_edges(&self, idx: NodeIndex) -> Vec<EdgeIndex> {
        let mut edges: Vec<EdgeIndex> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|edge| edge.id())
            .collect();
        // petgraph yields most-recently-added first
        edges.reverse();
        edges
    }

    ///
    /// Returns the edges leaving an edge's target node, in insertion order
    ///
    pub fn edge_successors(&self, idx: EdgeIndex) -> Vec<EdgeIndex> {
        self.edge_endpoints(idx)
            .map(|(_, target)| self.outgoing_edges(target))
            .unwrap_or_default()
    }

    ///
    /// Iterates over all edges with their indices
    ///
    pub fn edges(&self) -> impl Iterator<Item = (EdgeIndex, &FlowEdge)> {
        self.graph
            .edge_references()
            .map(|edge| (edge.id(), edge.weight()))
    }

    ///
    /// Iterates over all nodes with their indices
    ///
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &FlowNode)> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx).map(|node| (idx, node)))
    }

    ///
    /// Returns the number of nodes
    ///
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    ///
    /// Returns the number of edges
    ///
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    ///
    /// Returns the lanes' object types in synthesis order
    ///
    pub fn object_types(&self) -> &[ObjectType] {
        &self.object_types
    }

    ///
    /// Assigns layout positions and sizes to all nodes
    ///
    /// Columns follow the longest chain from the start events (back edges of
    /// loops excluded); rows follow the lane of the node's object type,
    /// shifted per branch and damped by nesting depth.
    ///
    pub fn assign_positions(&mut self) {
        let mut columns: HashMap<NodeIndex, usize> = HashMap::new();
        for &start in self.start_events.values() {
            columns.insert(start, 0);
        }

        // Longest-path layering by bounded relaxation
        let mut changed = true;
        let mut guard = 0;
        while changed && guard <= self.graph.node_count() {
            changed = false;
            guard += 1;
            let edges: Vec<(NodeIndex, NodeIndex, EdgeIndex)> = self
                .graph
                .edge_references()
                .map(|edge| (edge.source(), edge.target(), edge.id()))
                .collect();
            for (source, target, edge_idx) in edges {
                if self.is_back_edge(edge_idx) {
                    continue;
                }
                let Some(&source_col) = columns.get(&source) else {
                    continue;
                };
                let next_col = source_col + 1;
                if columns.get(&target).map_or(true, |&col| col < next_col) {
                    columns.insert(target, next_col);
                    changed = true;
                }
            }
        }

        let lane_indices: HashMap<&str, usize> = self
            .object_types
            .iter()
            .enumerate()
            .map(|(idx, ot)| (ot.as_str(), idx))
            .collect();

        let node_indices: Vec<NodeIndex> = self.graph.node_indices().collect();
        for idx in node_indices {
            let column = columns.get(&idx).copied().unwrap_or(0);
            let Some(node) = self.graph.node_weight_mut(idx) else {
                continue;
            };
            let lane = node
                .ot
                .as_deref()
                .and_then(|ot| lane_indices.get(ot).copied())
                .unwrap_or(0);
            let branch_offset = node.branch_info.as_ref().map_or(0.0, |info| {
                info.branch_id as f64 * (BRANCH_Y_SPACING / info.depth as f64)
            });
            node.position = Position {
                x: X_START + column as f64 * NODE_X_SPACING,
                y: LANE_Y_OFFSET + lane as f64 * LANE_Y_SPACING + branch_offset,
            };
            let (width, height) = match node.node_type {
                FlowNodeType::Inter(InterNodeType::StartEvent)
                | FlowNodeType::Inter(InterNodeType::EndEvent) => {
                    (EVENT_NODE_SIZE, EVENT_NODE_SIZE)
                }
                FlowNodeType::Inter(_) => (GATEWAY_NODE_SIZE, GATEWAY_NODE_SIZE),
                FlowNodeType::ActivityEntry | FlowNodeType::ActivityExit => {
                    (ACTIVITY_CONNECTOR_WIDTH, ACTIVITY_CONNECTOR_HEIGHT)
                }
            };
            node.width = width;
            node.height = height;
        }
    }

    /// Loop edges of connector pairs and the repeat edge of a div loop point
    /// backwards and are excluded from layering.
    fn is_back_edge(&self, idx: EdgeIndex) -> bool {
        let Some(edge) = self.graph.edge_weight(idx) else {
            return false;
        };
        if matches!(edge.exec_option, Some(ExecOption::Loop)) {
            return true;
        }
        let Some((source, target)) = self.graph.edge_endpoints(idx) else {
            return false;
        };
        let source_is_loop_end = self.graph.node_weight(source).is_some_and(|node| {
            node.node_type == FlowNodeType::Inter(InterNodeType::DivLoopEnd)
        });
        let target_is_loop_start = self.graph.node_weight(target).is_some_and(|node| {
            node.node_type == FlowNodeType::Inter(InterNodeType::DivLoopStart)
        });
        source_is_loop_end && target_is_loop_start
    }

    ///
    /// Runs horizontal overlap resolution over the intermediate nodes
    /// (activity connector nodes excluded) and writes the adjusted x
    /// positions back; returns the number of unresolved overlaps
    ///
    pub fn resolve_node_overlaps(&mut self) -> usize {
        let mut rects: Vec<NodeRect> = self
            .nodes()
            .filter(|(_, node)| matches!(node.node_type, FlowNodeType::Inter(_)))
            .map(|(_, node)| NodeRect {
                id: node.id.clone(),
                x: node.position.x,
                y: node.position.y,
                width: node.width,
                height: node.height,
            })
            .collect();
        let remaining = resolve_horizontal_overlaps(&mut rects);
        for rect in rects {
            if let Some(&idx) = self.node_by_id.get(&rect.id) {
                if let Some(node) = self.graph.node_weight_mut(idx) {
                    node.position.x = rect.x;
                }
            }
        }
        remaining
    }

    ///
    /// Exports the graph in the render shape, without tokens
    ///
    pub fn to_render(&self) -> RenderGraph {
        self.to_render_with_tokens(&HashMap::new())
    }

    ///
    /// Exports the graph in the render shape, attaching the given per-edge
    /// token lists to the edges' data
    ///
    pub fn to_render_with_tokens(
        &self,
        tokens_by_edge: &HashMap<String, Vec<Token>>,
    ) -> RenderGraph {
        let nodes = self
            .nodes()
            .map(|(_, node)| RenderNode {
                id: node.id.clone(),
                node_type: node.node_type.type_name().to_string(),
                position: node.position,
                data: RenderNodeData {
                    label: node
                        .activity
                        .clone()
                        .unwrap_or_else(|| node.node_type.type_name().to_string()),
                    ot: node.ot.clone(),
                    branches: node.branches,
                    activity: node.activity.clone(),
                },
                width: node.width,
                height: node.height,
            })
            .collect();

        let edges = self
            .edges()
            .map(|(idx, edge)| {
                let (source, target) = self
                    .edge_endpoints(idx)
                    .map(|(s, t)| {
                        (
                            self.node(s).map(|n| n.id.clone()).unwrap_or_default(),
                            self.node(t).map(|n| n.id.clone()).unwrap_or_default(),
                        )
                    })
                    .unwrap_or_default();
                RenderEdge {
                    id: edge.id.clone(),
                    source,
                    target,
                    source_handle: edge.source_handle.clone(),
                    target_handle: edge.target_handle.clone(),
                    data: RenderEdgeData {
                        ot: edge.ot.clone(),
                        exec_option: edge.exec_option,
                        activity: edge.activity.clone(),
                        tokens: tokens_by_edge.get(&edge.id).cloned().unwrap_or_default(),
                    },
                }
            })
            .collect();

        RenderGraph { nodes, edges }
    }
}

///
/// Synthesizes, materializes, and lays out the flow graph for a tree and a
/// set of object types
///
pub fn build_flow_graph(
    tree: &OCPT,
    object_types: &[ObjectType],
) -> Result<FlowGraph, FlowSynthesisError> {
    let description = synthesize_flows(tree, object_types)?;
    let mut graph = FlowGraph::from_description(&description);
    graph.assign_positions();
    graph.resolve_node_overlaps();
    Ok(graph)
}

///
/// Render-facing node payload
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenderNodeData {
    /// Display label
    pub label: String,
    /// Lane object type, absent for shared connector nodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ot: Option<ObjectType>,
    /// Branch count for splits and joins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branches: Option<usize>,
    /// Activity name for connector nodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
}

///
/// A node in the render output shape
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenderNode {
    /// Node id
    pub id: String,
    /// Render node type
    #[serde(rename = "type")]
    pub node_type: String,
    /// Layout position
    pub position: Position,
    /// Node payload
    pub data: RenderNodeData,
    /// Node width
    pub width: f64,
    /// Node height
    pub height: f64,
}

///
/// Render-facing edge payload
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenderEdgeData {
    /// Object type of the edge's lane
    pub ot: ObjectType,
    /// Execution option for connector-pair edges
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exec_option: Option<ExecOption>,
    /// Activity name on execute edges
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    /// Tokens replayed onto the edge
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<Token>,
}

///
/// An edge in the render output shape
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenderEdge {
    /// Edge id
    pub id: String,
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Handle on the source node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    /// Handle on the target node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    /// Edge payload
    pub data: RenderEdgeData,
}

///
/// The complete render output of one flow graph
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderGraph {
    /// All nodes
    pub nodes: Vec<RenderNode>,
    /// All edges
    pub edges: Vec<RenderEdge>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process_tree::process_tree_struct::OCPTNodeDescription;
    use std::collections::HashSet;

    fn tree_from_json(json: &str) -> OCPT {
        let description: OCPTNodeDescription = serde_json::from_str(json).unwrap();
        OCPT::from_description(&description).unwrap()
    }

    fn order_item_tree() -> OCPT {
        tree_from_json(
            r#"{
                "value": "sequence",
                "children": [
                    { "value": { "activity": "Create Order", "objectTypes": [{ "ot": "Order" }, { "ot": "Item", "exhibits": ["div"] }] } },
                    { "value": "parallel", "children": [
                        { "value": { "activity": "Pick Item", "objectTypes": [{ "ot": "Item" }] } },
                        { "value": { "activity": "Send Invoice", "objectTypes": [{ "ot": "Order" }] } }
                    ] },
                    { "value": { "activity": "Ship Order", "objectTypes": [{ "ot": "Order" }] } }
                ]
            }"#,
        )
    }

    #[test]
    fn connector_pairs_are_shared_across_lanes() {
        let tree = order_item_tree();
        let graph =
            build_flow_graph(&tree, &["Order".to_string(), "Item".to_string()]).unwrap();

        let entries: Vec<_> = graph
            .nodes()
            .filter(|(_, node)| {
                node.node_type == FlowNodeType::ActivityEntry
                    && node.activity.as_deref() == Some("Create Order")
            })
            .collect();
        assert_eq!(entries.len(), 1);

        // Both lanes have their own execute edge through the shared pair
        assert!(graph.edge_index_by_id("edge-execute-Order-Create Order").is_some());
        assert!(graph.edge_index_by_id("edge-execute-Item-Create Order").is_some());
        // Only the divergent Item lane can skip or repeat it
        assert!(graph.edge_index_by_id("edge-skip-Item-Create Order").is_some());
        assert!(graph.edge_index_by_id("edge-loop-Item-Create Order").is_some());
        assert!(graph.edge_index_by_id("edge-skip-Order-Create Order").is_none());
    }

    #[test]
    fn every_lane_activity_has_a_reachable_execute_edge() {
        let tree = order_item_tree();
        let object_types = vec!["Order".to_string(), "Item".to_string()];
        let graph = build_flow_graph(&tree, &object_types).unwrap();

        for ot in &object_types {
            let start = graph.start_event(ot).unwrap();
            // Edge-level BFS restricted to the lane's edges
            let mut frontier = graph.outgoing_edges(start);
            frontier.retain(|&edge| graph.edge(edge).unwrap().ot == *ot);
            let mut seen: HashSet<EdgeIndex> = frontier.iter().copied().collect();
            let mut reached_execute: HashSet<String> = HashSet::new();
            while let Some(edge_idx) = frontier.pop() {
                let edge = graph.edge(edge_idx).unwrap();
                if edge.is_execute() {
                    reached_execute.insert(edge.activity.clone().unwrap());
                }
                for succ in graph.edge_successors(edge_idx) {
                    if graph.edge(succ).unwrap().ot == *ot && seen.insert(succ) {
                        frontier.push(succ);
                    }
                }
            }
            let expected: HashSet<String> = match ot.as_str() {
                "Order" => ["Create Order", "Send Invoice", "Ship Order"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                _ => ["Create Order", "Pick Item"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            };
            assert_eq!(reached_execute, expected, "lane {ot}");
        }
    }

    #[test]
    fn split_outgoing_edges_match_branch_count() {
        let tree = order_item_tree();
        let graph = build_flow_graph(&tree, &["Order".to_string()]).unwrap();
        let (split_idx, split) = graph
            .nodes()
            .find(|(_, node)| {
                node.node_type == FlowNodeType::Inter(InterNodeType::ParallelSplit)
            })
            .unwrap();
        assert_eq!(
            graph.outgoing_edges(split_idx).len(),
            split.branches.unwrap()
        );
    }

    #[test]
    fn positions_advance_along_the_chain() {
        let tree = tree_from_json(
            r#"{
                "value": "sequence",
                "children": [
                    { "value": { "activity": "Create Order", "objectTypes": [{ "ot": "Order" }] } },
                    { "value": { "activity": "Ship Order", "objectTypes": [{ "ot": "Order" }] } }
                ]
            }"#,
        );
        let graph = build_flow_graph(&tree, &["Order".to_string()]).unwrap();
        let x_of = |id: &str| {
            graph
                .node(graph.node_index_by_id(id).unwrap())
                .unwrap()
                .position
                .x
        };
        let start_x = x_of("startEvent-Order");
        let create_in = x_of("activity-Create Order-in");
        let create_out = x_of("activity-Create Order-out");
        let ship_in = x_of("activity-Ship Order-in");
        let end_x = x_of("endEvent-Order");
        assert!(start_x < create_in);
        assert!(create_in < create_out);
        assert!(create_out < ship_in);
        assert!(ship_in < end_x);
    }

    #[test]
    fn render_export_contains_all_nodes_and_edges() {
        let tree = order_item_tree();
        let graph =
            build_flow_graph(&tree, &["Order".to_string(), "Item".to_string()]).unwrap();
        let render = graph.to_render();
        assert_eq!(render.nodes.len(), graph.node_count());
        assert_eq!(render.edges.len(), graph.edge_count());
        let json = serde_json::to_string(&render).unwrap();
        assert!(json.contains("\"sourceHandle\""));
        assert!(json.contains("startEvent-Order"));
    }
}
