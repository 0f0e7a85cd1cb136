//! Token replay of object flows over a synthesized flow graph
//!
//! For every object, the engine walks the object's chronological activity
//! history through its type's lane: a breadth-first search over edges finds
//! the shortest route to each next activity's execute edge, the elapsed
//! wall-clock time is distributed evenly over the route, and one timestamped
//! token is emitted per traversed edge. Parallel splits propagate resumption
//! contexts onto their dormant branches; parallel joins buffer arriving
//! tokens and release a single merged token once every branch has delivered.
//!
//! The flow graph itself stays read-only: token lists, join buffers, and
//! branch contexts are engine-local state, keyed by edge and node handles.

use crate::flow::flow_graph_struct::{FlowEdge, FlowGraph, FlowNodeType};
use crate::flow::flow_synthesis::InterNodeType;
use crate::replay::object_flow::{observation_window_end, ObjectFlowRecord};
use chrono::{DateTime, Duration, Utc};
use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use rayon::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

///
/// One object's presence on one flow-graph edge during replay
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// Object id
    pub id: String,
    /// Object type
    #[serde(rename = "type")]
    pub object_type: String,
    /// Interpolated timestamp of the token on this edge
    pub timestamp: DateTime<Utc>,
    /// `timestamp` in epoch milliseconds
    pub timestamp_ms: i64,
    /// Animation duration of the edge traversal, scaled by the playback
    /// divisor
    pub execution_duration_ms: f64,
    /// Wall-clock share of the segment spent on this edge, in milliseconds
    pub real_time_execution_duration_ms: f64,
    /// Activity (or event) the walk segment started from
    pub from_activity: String,
    /// Activity (or event) the walk segment heads to
    pub to_activity: String,
    /// Number of edges on the walk segment
    pub path_length: usize,
    /// Zero-based position of this edge on the walk segment
    pub current_position_in_path: usize,
    /// Activity name, set when the token traverses an execute edge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
}

///
/// Resumption context left on a dormant branch edge when an object passes a
/// parallel split
///
#[derive(Debug, Clone, PartialEq)]
pub struct BranchOriginContext {
    /// Time at which the object passed the split
    pub timestamp: DateTime<Utc>,
    /// Activity the object came from when it passed the split
    pub from_activity: String,
}

///
/// Errors that can occur while replaying a single object
///
#[derive(Debug, Clone, PartialEq)]
pub enum TokenReplayError {
    /// The object's type has no start event (or no outgoing lane edges)
    NoStartEvent {
        /// The object type without a start event
        object_type: String,
    },
    /// The object's type has no end event
    NoEndEvent {
        /// The object type without an end event
        object_type: String,
    },
    /// No open edge reaches the object's next activity
    NoPathFound {
        /// The replayed object
        object_id: String,
        /// The unreachable target
        target: String,
    },
    /// An edge handle did not resolve in the graph
    MissingEdge {
        /// Debug rendering of the stale handle
        edge: String,
    },
    /// A parallel join received more tokens than it has branches
    JoinOverflow {
        /// The overflowing join node
        join_id: String,
        /// The join's branch count
        branches: usize,
        /// Tokens received
        received: usize,
    },
    /// A parallel join flushed without any buffered token
    MissingJoinToken {
        /// The join node without tokens
        join_id: String,
    },
}

impl std::fmt::Display for TokenReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenReplayError::NoStartEvent { object_type } => {
                write!(f, "No start event for object type {object_type:?}")
            }
            TokenReplayError::NoEndEvent { object_type } => {
                write!(f, "No end event for object type {object_type:?}")
            }
            TokenReplayError::NoPathFound { object_id, target } => {
                write!(f, "No path for object {object_id:?} to {target:?}")
            }
            TokenReplayError::MissingEdge { edge } => {
                write!(f, "Flow edge {edge} not found in graph")
            }
            TokenReplayError::JoinOverflow {
                join_id,
                branches,
                received,
            } => {
                write!(
                    f,
                    "Parallel join {join_id} with {branches} branches received {received} tokens"
                )
            }
            TokenReplayError::MissingJoinToken { join_id } => {
                write!(f, "Parallel join {join_id} flushed without buffered tokens")
            }
        }
    }
}

impl std::error::Error for TokenReplayError {}

///
/// Options of a replay run
///
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOptions {
    /// Divisor applied to wall-clock durations for animation playback
    pub playback_divisor: f64,
    /// End of the observation window; defaults to the latest record
    /// timestamp
    pub window_end: Option<DateTime<Utc>>,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            playback_divisor: 1.0,
            window_end: None,
        }
    }
}

///
/// Result of a replay run
///
/// Failed objects do not abort the run; their count and ids are reported
/// alongside the tokens of all successfully replayed objects.
///
#[derive(Debug, Clone, Default, Serialize)]
pub struct TokenReplayResult {
    /// Replayed tokens per edge id, in record order
    pub tokens_by_edge: HashMap<String, Vec<Token>>,
    /// Number of objects whose replay failed
    pub replay_errors: u64,
    /// Record keys of the failed objects
    pub failed_objects: Vec<String>,
}

impl TokenReplayResult {
    /// Total number of emitted tokens
    pub fn token_count(&self) -> usize {
        self.tokens_by_edge.values().map(Vec::len).sum()
    }
}

/// An edge an object may continue its walk from. `consumed` edges were
/// already traversed (they are the previously executed activity's execute
/// edge), so searches start at their successors; fresh edges (start-event
/// edges, dormant branch edges) are traversed by the walk itself.
#[derive(Debug, Clone, Copy)]
struct OpenEdge {
    edge: EdgeIndex,
    consumed: bool,
}

#[derive(Debug, Default)]
struct WalkState {
    open_edges: Vec<OpenEdge>,
    contexts: HashMap<EdgeIndex, BranchOriginContext>,
    join_buffers: HashMap<NodeIndex, Vec<Token>>,
    deposits: Vec<(EdgeIndex, Token)>,
}

enum WalkOutcome {
    /// The walk reached the segment target
    Completed,
    /// The walk stopped at a parallel join awaiting the other branches
    Parked,
}

///
/// Replays all object flow records over the flow graph
///
/// Objects replay independently of each other (and in parallel); their token
/// deposits are merged into the per-edge lists in deterministic record-key
/// order. A failed object is counted and logged, and the run continues with
/// the remaining objects.
///
pub fn replay_object_flows(
    graph: &FlowGraph,
    records: &BTreeMap<String, ObjectFlowRecord>,
    options: &ReplayOptions,
) -> TokenReplayResult {
    let window_end = options
        .window_end
        .or_else(|| observation_window_end(records))
        .unwrap_or(DateTime::UNIX_EPOCH);
    let divisor = if options.playback_divisor > 0.0 {
        options.playback_divisor
    } else {
        1.0
    };

    let outcomes: Vec<(&String, Result<Vec<(EdgeIndex, Token)>, TokenReplayError>)> = records
        .par_iter()
        .map(|(key, record)| (key, replay_single_object(graph, record, window_end, divisor)))
        .collect();

    let mut result = TokenReplayResult::default();
    for (key, outcome) in outcomes {
        match outcome {
            Ok(deposits) => {
                for (edge_idx, token) in deposits {
                    let Some(edge) = graph.edge(edge_idx) else {
                        continue;
                    };
                    result
                        .tokens_by_edge
                        .entry(edge.id.clone())
                        .or_default()
                        .push(token);
                }
            }
            Err(err) => {
                eprintln!("Token replay failed for object {key}: {err}");
                result.replay_errors += 1;
                result.failed_objects.push(key.clone());
            }
        }
    }
    result
}

fn replay_single_object(
    graph: &FlowGraph,
    record: &ObjectFlowRecord,
    window_end: DateTime<Utc>,
    divisor: f64,
) -> Result<Vec<(EdgeIndex, Token)>, TokenReplayError> {
    let start = graph
        .start_event(&record.object_type)
        .ok_or_else(|| TokenReplayError::NoStartEvent {
            object_type: record.object_type.clone(),
        })?;
    let end = graph
        .end_event(&record.object_type)
        .ok_or_else(|| TokenReplayError::NoEndEvent {
            object_type: record.object_type.clone(),
        })?;
    let start_label = node_id(graph, start);
    let end_label = node_id(graph, end);

    let mut state = WalkState::default();
    for edge_idx in graph.outgoing_edges(start) {
        if graph
            .edge(edge_idx)
            .is_some_and(|edge| edge.ot == record.object_type)
        {
            state.open_edges.push(OpenEdge {
                edge: edge_idx,
                consumed: false,
            });
        }
    }
    if state.open_edges.is_empty() {
        return Err(TokenReplayError::NoStartEvent {
            object_type: record.object_type.clone(),
        });
    }

    let mut prev_activity = start_label;
    let mut prev_ts: Option<DateTime<Utc>> = None;

    for (activity, &ts) in record.activities.iter().zip(record.timestamps.iter()) {
        // A walk parking at a parallel join consumes its open edge without
        // reaching the target; the remaining branches keep trying until the
        // join releases the merged token and the target is reached.
        loop {
            let Some((open_idx, path)) =
                best_path(graph, &state.open_edges, &record.object_type, |edge| {
                    edge.is_execute() && edge.activity.as_deref() == Some(activity.as_str())
                })
            else {
                return Err(TokenReplayError::NoPathFound {
                    object_id: record.id.clone(),
                    target: activity.clone(),
                });
            };
            let chosen = state.open_edges.remove(open_idx);
            let (seg_start, from_activity) = match state.contexts.remove(&chosen.edge) {
                Some(context) => (context.timestamp, context.from_activity),
                None => (prev_ts.unwrap_or(ts), prev_activity.clone()),
            };
            let outcome = walk_path(
                graph,
                record,
                &path,
                seg_start,
                ts,
                &from_activity,
                activity,
                divisor,
                &mut state,
            )?;
            if let WalkOutcome::Completed = outcome {
                if let Some(&last) = path.last() {
                    if !state.open_edges.iter().any(|open| open.edge == last) {
                        state.open_edges.insert(
                            0,
                            OpenEdge {
                                edge: last,
                                consumed: true,
                            },
                        );
                    }
                }
                break;
            }
        }
        prev_activity = activity.clone();
        prev_ts = Some(ts);
    }

    // The history is exhausted; every remaining open edge walks to the end
    // event, closing dormant branches along the way.
    while !state.open_edges.is_empty() {
        let chosen = state.open_edges.remove(0);
        let Some(path) = shortest_path(graph, chosen, &record.object_type, |edge_idx, _| {
            graph
                .edge_endpoints(edge_idx)
                .is_some_and(|(_, target)| target == end)
        }) else {
            return Err(TokenReplayError::NoPathFound {
                object_id: record.id.clone(),
                target: end_label.clone(),
            });
        };
        let (seg_start, from_activity) = match state.contexts.remove(&chosen.edge) {
            Some(context) => (context.timestamp, context.from_activity),
            None => (prev_ts.unwrap_or(window_end), prev_activity.clone()),
        };
        walk_path(
            graph,
            record,
            &path,
            seg_start,
            window_end,
            &from_activity,
            &end_label,
            divisor,
            &mut state,
        )?;
    }

    Ok(state.deposits)
}

fn node_id(graph: &FlowGraph, idx: NodeIndex) -> String {
    graph.node(idx).map(|node| node.id.clone()).unwrap_or_default()
}

/// Finds the globally shortest path among all open edges; ties resolve to
/// the earliest open edge.
fn best_path(
    graph: &FlowGraph,
    open_edges: &[OpenEdge],
    ot: &str,
    goal: impl Fn(&FlowEdge) -> bool,
) -> Option<(usize, Vec<EdgeIndex>)> {
    let mut best: Option<(usize, Vec<EdgeIndex>)> = None;
    for (open_idx, &open) in open_edges.iter().enumerate() {
        if let Some(path) = shortest_path(graph, open, ot, |_, edge| goal(edge)) {
            if best
                .as_ref()
                .map_or(true, |(_, best_path)| path.len() < best_path.len())
            {
                best = Some((open_idx, path));
            }
        }
    }
    best
}

/// Breadth-first search over edges, restricted to the object type's lane.
///
/// The frontier starts at the open edge itself, or at its successors if the
/// edge was already traversed. Execute edges of activities other than the
/// goal are never expanded: an object cannot pass through another activity's
/// execution while heading to its real destination. BFS guarantees a
/// minimum-edge-count path; among equal-length paths the first-discovered
/// (FIFO queue order) wins.
fn shortest_path(
    graph: &FlowGraph,
    from: OpenEdge,
    ot: &str,
    goal: impl Fn(EdgeIndex, &FlowEdge) -> bool,
) -> Option<Vec<EdgeIndex>> {
    let mut predecessors: HashMap<EdgeIndex, EdgeIndex> = HashMap::new();
    let mut visited: HashSet<EdgeIndex> = HashSet::new();
    let mut queue: VecDeque<EdgeIndex> = VecDeque::new();

    let seeds = if from.consumed {
        graph.edge_successors(from.edge)
    } else {
        vec![from.edge]
    };
    for seed in seeds {
        let Some(edge) = graph.edge(seed) else {
            continue;
        };
        if edge.ot != ot || !visited.insert(seed) {
            continue;
        }
        if goal(seed, edge) {
            return Some(reconstruct_path(&predecessors, seed));
        }
        if !edge.is_execute() {
            queue.push_back(seed);
        }
    }

    while let Some(current) = queue.pop_front() {
        for successor in graph.edge_successors(current) {
            let Some(edge) = graph.edge(successor) else {
                continue;
            };
            if edge.ot != ot || !visited.insert(successor) {
                continue;
            }
            predecessors.insert(successor, current);
            if goal(successor, edge) {
                return Some(reconstruct_path(&predecessors, successor));
            }
            if !edge.is_execute() {
                queue.push_back(successor);
            }
        }
    }

    None
}

fn reconstruct_path(
    predecessors: &HashMap<EdgeIndex, EdgeIndex>,
    goal: EdgeIndex,
) -> Vec<EdgeIndex> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(&previous) = predecessors.get(&current) {
        path.push(previous);
        current = previous;
    }
    path.reverse();
    path
}

/// Walks one path segment, distributing the segment duration evenly over its
/// edges and depositing one token per edge.
#[allow(clippy::too_many_arguments)]
fn walk_path(
    graph: &FlowGraph,
    record: &ObjectFlowRecord,
    path: &[EdgeIndex],
    seg_start: DateTime<Utc>,
    seg_end: DateTime<Utc>,
    from_activity: &str,
    to_activity: &str,
    divisor: f64,
    state: &mut WalkState,
) -> Result<WalkOutcome, TokenReplayError> {
    let path_length = path.len();
    let segment_ms = (seg_end - seg_start).num_milliseconds().max(0) as f64;
    let step_ms = if path_length > 0 {
        segment_ms / path_length as f64
    } else {
        0.0
    };

    // Token released by a flushed parallel join, to be deposited on the
    // join's outgoing edge instead of a freshly interpolated one
    let mut merged: Option<Token> = None;

    for (position, &edge_idx) in path.iter().enumerate() {
        let edge = graph
            .edge(edge_idx)
            .ok_or_else(|| TokenReplayError::MissingEdge {
                edge: format!("{edge_idx:?}"),
            })?;
        let timestamp =
            seg_start + Duration::milliseconds(((position as f64 + 1.0) * step_ms).round() as i64);
        let mut token = match merged.take() {
            Some(mut merged_token) => {
                merged_token.path_length = path_length;
                merged_token.current_position_in_path = position;
                merged_token
            }
            None => Token {
                id: record.id.clone(),
                object_type: record.object_type.clone(),
                timestamp,
                timestamp_ms: timestamp.timestamp_millis(),
                execution_duration_ms: step_ms / divisor,
                real_time_execution_duration_ms: step_ms,
                from_activity: from_activity.to_string(),
                to_activity: to_activity.to_string(),
                path_length,
                current_position_in_path: position,
                activity: None,
            },
        };
        if edge.is_execute() {
            token.activity = edge.activity.clone();
        }

        let (_, target) = graph
            .edge_endpoints(edge_idx)
            .ok_or_else(|| TokenReplayError::MissingEdge {
                edge: format!("{edge_idx:?}"),
            })?;
        let Some(target_node) = graph.node(target) else {
            return Err(TokenReplayError::MissingEdge {
                edge: format!("{edge_idx:?}"),
            });
        };

        match target_node.node_type {
            FlowNodeType::Inter(InterNodeType::ParallelJoin) => {
                let branches = target_node.branches.unwrap_or(0);
                let join_id = target_node.id.clone();
                state.deposits.push((edge_idx, token.clone()));
                let buffered = {
                    let buffer = state.join_buffers.entry(target).or_default();
                    buffer.push(token);
                    buffer.len()
                };
                if buffered > branches {
                    return Err(TokenReplayError::JoinOverflow {
                        join_id,
                        branches,
                        received: buffered,
                    });
                }
                if buffered < branches {
                    return Ok(WalkOutcome::Parked);
                }
                let tokens = state.join_buffers.remove(&target).unwrap_or_default();
                let latest = tokens
                    .into_iter()
                    .max_by_key(|token| token.timestamp_ms)
                    .ok_or(TokenReplayError::MissingJoinToken { join_id })?;
                merged = Some(latest);
            }
            FlowNodeType::Inter(InterNodeType::ParallelSplit) => {
                // Every dormant branch gets a resumption context and joins
                // the object's open edges
                let chosen_next = path.get(position + 1).copied();
                for branch_edge in graph.outgoing_edges(target) {
                    if Some(branch_edge) == chosen_next {
                        continue;
                    }
                    if !graph
                        .edge(branch_edge)
                        .is_some_and(|edge| edge.ot == record.object_type)
                    {
                        continue;
                    }
                    state.contexts.insert(
                        branch_edge,
                        BranchOriginContext {
                            timestamp: token.timestamp,
                            from_activity: from_activity.to_string(),
                        },
                    );
                    if !state.open_edges.iter().any(|open| open.edge == branch_edge) {
                        state.open_edges.push(OpenEdge {
                            edge: branch_edge,
                            consumed: false,
                        });
                    }
                }
                state.deposits.push((edge_idx, token));
            }
            _ => {
                state.deposits.push((edge_idx, token));
            }
        }
    }

    Ok(WalkOutcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::flow_graph_struct::{build_flow_graph, FlowNode, Position};
    use crate::flow::flow_synthesis::ExecOption;
    use crate::process_tree::process_tree_struct::{OCPTNodeDescription, OCPT};
    use crate::replay::object_flow::object_flow_key;
    use chrono::TimeZone;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()
    }

    fn record(object_type: &str, id: &str, history: &[(&str, DateTime<Utc>)]) -> ObjectFlowRecord {
        ObjectFlowRecord {
            id: id.to_string(),
            object_type: object_type.to_string(),
            timestamps: history.iter().map(|(_, ts)| *ts).collect(),
            activities: history.iter().map(|(activity, _)| activity.to_string()).collect(),
        }
    }

    fn records(
        entries: Vec<ObjectFlowRecord>,
    ) -> BTreeMap<String, ObjectFlowRecord> {
        entries
            .into_iter()
            .map(|record| (object_flow_key(&record.object_type, &record.id), record))
            .collect()
    }

    fn tree_from_json(json: &str) -> OCPT {
        let description: OCPTNodeDescription = serde_json::from_str(json).unwrap();
        OCPT::from_description(&description).unwrap()
    }

    fn plain_node(id: &str, node_type: FlowNodeType, activity: Option<&str>) -> FlowNode {
        FlowNode {
            id: id.to_string(),
            node_type,
            activity: activity.map(str::to_string),
            ot: Some("Order".to_string()),
            branches: None,
            branch_info: None,
            position: Position::default(),
            width: 0.0,
            height: 0.0,
        }
    }

    fn plain_edge(id: &str, exec: Option<ExecOption>, activity: Option<&str>) -> FlowEdge {
        FlowEdge {
            id: id.to_string(),
            ot: "Order".to_string(),
            exec_option: exec,
            activity: activity.map(str::to_string),
            source_handle: None,
            target_handle: None,
        }
    }

    /// A minimal straight flow graph: start -> Create -> Ship -> end, with
    /// the edges into the activity nodes acting as their execute edges.
    fn straight_graph() -> FlowGraph {
        let mut graph = FlowGraph::new();
        let start = graph.add_node(plain_node(
            "startEvent-Order",
            FlowNodeType::Inter(InterNodeType::StartEvent),
            None,
        ));
        let create = graph.add_node(plain_node(
            "node-Create",
            FlowNodeType::ActivityExit,
            Some("Create"),
        ));
        let ship = graph.add_node(plain_node(
            "node-Ship",
            FlowNodeType::ActivityExit,
            Some("Ship"),
        ));
        let end = graph.add_node(plain_node(
            "endEvent-Order",
            FlowNodeType::Inter(InterNodeType::EndEvent),
            None,
        ));
        graph.register_start_event("Order", start);
        graph.register_end_event("Order", end);
        graph.add_edge(
            start,
            create,
            plain_edge(
                "edge-start-Create",
                Some(ExecOption::Execute { cardinality: None }),
                Some("Create"),
            ),
        );
        graph.add_edge(
            create,
            ship,
            plain_edge(
                "edge-Create-Ship",
                Some(ExecOption::Execute { cardinality: None }),
                Some("Ship"),
            ),
        );
        graph.add_edge(ship, end, plain_edge("edge-Ship-end", None, None));
        graph
    }

    #[test]
    fn straight_replay_emits_one_token_per_edge() {
        let graph = straight_graph();
        let records = records(vec![record(
            "Order",
            "o1",
            &[("Create", ts(0)), ("Ship", ts(10))],
        )]);
        let options = ReplayOptions {
            playback_divisor: 10.0,
            window_end: Some(ts(20)),
        };
        let result = replay_object_flows(&graph, &records, &options);

        assert_eq!(result.replay_errors, 0);
        assert_eq!(result.token_count(), 3);
        assert_eq!(result.tokens_by_edge["edge-start-Create"].len(), 1);
        assert_eq!(result.tokens_by_edge["edge-Create-Ship"].len(), 1);
        assert_eq!(result.tokens_by_edge["edge-Ship-end"].len(), 1);

        let create_token = &result.tokens_by_edge["edge-start-Create"][0];
        let ship_token = &result.tokens_by_edge["edge-Create-Ship"][0];
        let end_token = &result.tokens_by_edge["edge-Ship-end"][0];
        assert!(create_token.timestamp_ms < ship_token.timestamp_ms);
        assert!(ship_token.timestamp_ms < end_token.timestamp_ms);
        // Ten minutes of wall clock, divided by the playback divisor
        assert_eq!(ship_token.real_time_execution_duration_ms, 600_000.0);
        assert_eq!(ship_token.execution_duration_ms, 60_000.0);
        assert_eq!(create_token.activity.as_deref(), Some("Create"));
        assert_eq!(ship_token.activity.as_deref(), Some("Ship"));
        assert_eq!(end_token.activity, None);
    }

    #[test]
    fn sequential_synthesized_graph_conserves_tokens() {
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
        let records = records(vec![record(
            "Order",
            "o1",
            &[("Create Order", ts(0)), ("Ship Order", ts(10))],
        )]);
        let result = replay_object_flows(&graph, &records, &ReplayOptions::default());

        assert_eq!(result.replay_errors, 0);
        // start->Create: link + execute; Create->Ship: link + execute;
        // Ship->end: link. Five edges, five tokens.
        assert_eq!(result.token_count(), 5);
        let execute_tokens = &result.tokens_by_edge["edge-execute-Order-Create Order"];
        assert_eq!(execute_tokens.len(), 1);
        assert_eq!(execute_tokens[0].activity.as_deref(), Some("Create Order"));
    }

    #[test]
    fn parallel_branches_merge_at_the_join() {
        let tree = tree_from_json(
            r#"{
                "value": "sequence",
                "children": [
                    { "value": { "activity": "A", "objectTypes": [{ "ot": "Order" }] } },
                    { "value": "parallel", "children": [
                        { "value": { "activity": "B", "objectTypes": [{ "ot": "Order" }] } },
                        { "value": { "activity": "C", "objectTypes": [{ "ot": "Order" }] } }
                    ] },
                    { "value": { "activity": "D", "objectTypes": [{ "ot": "Order" }] } }
                ]
            }"#,
        );
        let graph = build_flow_graph(&tree, &["Order".to_string()]).unwrap();
        let records = records(vec![record(
            "Order",
            "o1",
            &[("A", ts(0)), ("B", ts(1)), ("C", ts(2)), ("D", ts(3))],
        )]);
        let result = replay_object_flows(&graph, &records, &ReplayOptions::default());

        assert_eq!(result.replay_errors, 0);
        // Both branch edges into the join carry a token, the join's outgoing
        // edge carries exactly the one merged token
        let join_outgoing = result
            .tokens_by_edge
            .iter()
            .filter(|(edge_id, _)| edge_id.contains("parallelJoin") && edge_id.contains("activity-D"))
            .collect::<Vec<_>>();
        assert_eq!(join_outgoing.len(), 1);
        assert_eq!(join_outgoing[0].1.len(), 1);

        let incoming_tokens: usize = result
            .tokens_by_edge
            .iter()
            .filter(|(edge_id, _)| edge_id.ends_with("-parallelJoin-1"))
            .map(|(_, tokens)| tokens.len())
            .sum();
        assert_eq!(incoming_tokens, 2);
        // Every activity was executed exactly once
        for activity in ["A", "B", "C", "D"] {
            let tokens = &result.tokens_by_edge[&format!("edge-execute-Order-{activity}")];
            assert_eq!(tokens.len(), 1, "activity {activity}");
        }
    }

    #[test]
    fn divergent_activity_repeats_over_the_loop_edge() {
        let tree = tree_from_json(
            r#"{
                "value": "sequence",
                "children": [
                    { "value": { "activity": "Pick Item", "objectTypes": [{ "ot": "Item", "exhibits": ["div"] }] } }
                ]
            }"#,
        );
        let graph = build_flow_graph(&tree, &["Item".to_string()]).unwrap();
        let records = records(vec![record(
            "Item",
            "i1",
            &[("Pick Item", ts(0)), ("Pick Item", ts(5))],
        )]);
        let result = replay_object_flows(&graph, &records, &ReplayOptions::default());

        assert_eq!(result.replay_errors, 0);
        // The second execution routes over the connector pair's loop edge
        assert_eq!(result.tokens_by_edge["edge-loop-Item-Pick Item"].len(), 1);
        assert_eq!(
            result.tokens_by_edge["edge-execute-Item-Pick Item"].len(),
            2
        );
    }

    #[test]
    fn failed_objects_do_not_abort_the_run() {
        let tree = tree_from_json(
            r#"{
                "value": "sequence",
                "children": [
                    { "value": { "activity": "Create Order", "objectTypes": [{ "ot": "Order" }] } }
                ]
            }"#,
        );
        let graph = build_flow_graph(&tree, &["Order".to_string()]).unwrap();
        let records = records(vec![
            record("Order", "o1", &[("Create Order", ts(0))]),
            record("Order", "o2", &[("Bogus", ts(1))]),
        ]);
        let result = replay_object_flows(&graph, &records, &ReplayOptions::default());

        assert_eq!(result.replay_errors, 1);
        assert_eq!(result.failed_objects, vec!["Order-o2"]);
        // o1 still produced its tokens
        assert_eq!(
            result.tokens_by_edge["edge-execute-Order-Create Order"].len(),
            1
        );
    }

    #[test]
    fn unknown_object_type_is_counted_per_object() {
        let graph = straight_graph();
        let records = records(vec![record("Item", "i1", &[("Create", ts(0))])]);
        let result = replay_object_flows(&graph, &records, &ReplayOptions::default());
        assert_eq!(result.replay_errors, 1);
        assert_eq!(result.token_count(), 0);
    }

    #[test]
    fn empty_records_yield_zero_tokens() {
        let graph = straight_graph();
        let result =
            replay_object_flows(&graph, &BTreeMap::new(), &ReplayOptions::default());
        assert_eq!(result.replay_errors, 0);
        assert_eq!(result.token_count(), 0);
    }
}
