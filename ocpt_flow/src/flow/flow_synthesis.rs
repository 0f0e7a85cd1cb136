//! Flow synthesis from projected object-centric process trees
//!
//! Converts a tree, per object type, into a flat directed flow description:
//! start/end events, split/join gateways, div-loop constructs, and activity
//! nodes with per-object-type execution options. The traversal is pre-order
//! and continuation-passing: every recursive call receives the id of the flow
//! node its result must link to, so sequences are built right-to-left.

use crate::process_tree::process_tree_struct::{
    ExhibitKind, ObjectType, ObjectTypeRef, OCPTNode, OCPTOperatorType, OCPT, TAU_LABEL,
};
use crate::process_tree::projection::project_tree;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

///
/// Type of an intermediate (non-activity) flow node
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum InterNodeType {
    /// Source event of an object type's lane
    StartEvent,
    /// Sink event of an object type's lane
    EndEvent,
    /// Opening gateway of concurrent branches
    ParallelSplit,
    /// Synchronizing gateway of concurrent branches
    ParallelJoin,
    /// Opening gateway of exclusive branches
    XorSplit,
    /// Merging gateway of exclusive branches
    XorJoin,
    /// Entry of a divergence loop (order-arbitrary, repeatable region)
    DivLoopStart,
    /// Exit of a divergence loop, with a back edge to its start
    DivLoopEnd,
}

impl InterNodeType {
    ///
    /// Returns the id prefix used for generated nodes of this type
    ///
    pub fn id_prefix(&self) -> &'static str {
        match self {
            InterNodeType::StartEvent => "startEvent",
            InterNodeType::EndEvent => "endEvent",
            InterNodeType::ParallelSplit => "parallelSplit",
            InterNodeType::ParallelJoin => "parallelJoin",
            InterNodeType::XorSplit => "xorSplit",
            InterNodeType::XorJoin => "xorJoin",
            InterNodeType::DivLoopStart => "divLoopStart",
            InterNodeType::DivLoopEnd => "divLoopEnd",
        }
    }
}

///
/// How an object type may pass through an activity
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "option", rename_all = "camelCase")]
pub enum ExecOption {
    /// Bypass the activity
    Skip,
    /// Execute the activity, optionally with a cardinality marker for a
    /// property folded into the execution (e.g., convergence)
    Execute {
        /// Property folded into the execution
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cardinality: Option<ExhibitKind>,
    },
    /// Return to the activity's entry for another execution
    Loop,
}

impl ExecOption {
    ///
    /// Returns `true` for `Execute` options, with or without cardinality
    ///
    pub fn is_execute(&self) -> bool {
        matches!(self, ExecOption::Execute { .. })
    }
}

///
/// Identifies which branch of which split a flow node belongs to
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BranchInfo {
    /// Id of the split that opened the branch
    pub parent_split_id: String,
    /// Index of the branch among the split's children
    pub branch_id: usize,
    /// Nesting depth of the branch (top level splits open depth 1)
    pub depth: usize,
}

///
/// An intermediate node of the flat flow description
///
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlatInterNode {
    /// Unique node id
    pub id: String,
    /// Node type
    pub node_type: InterNodeType,
    /// Branch count for splits and joins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branches: Option<usize>,
    /// Ids of the successor nodes (one per branch for splits)
    pub next: Vec<String>,
    /// Branch the node itself lies on, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_info: Option<BranchInfo>,
    /// Object type of the lane the node belongs to
    pub ot: ObjectType,
}

///
/// An activity node of the flat flow description
///
/// The id is shared across all object-type lanes passing through the same
/// activity name; each lane contributes only its own execution options.
///
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlatActivityNode {
    /// Shared node id (`activity-<name>`)
    pub id: String,
    /// The activity name
    pub activity: String,
    /// This object type's ways through the activity
    pub exec_options: Vec<ExecOption>,
    /// Id of the successor node
    pub next: String,
    /// Branch the node lies on, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_info: Option<BranchInfo>,
    /// Object type of the lane this occurrence belongs to
    pub ot: ObjectType,
}

///
/// A node of the flat flow description
///
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum FlatFlowNode {
    /// Intermediate node (events, gateways, loop markers)
    Inter(FlatInterNode),
    /// Activity node
    Activity(FlatActivityNode),
}

impl FlatFlowNode {
    ///
    /// Returns the node's id
    ///
    pub fn id(&self) -> &str {
        match self {
            FlatFlowNode::Inter(node) => &node.id,
            FlatFlowNode::Activity(node) => &node.id,
        }
    }

    ///
    /// Returns the ids of the node's successors
    ///
    pub fn next_ids(&self) -> Vec<&str> {
        match self {
            FlatFlowNode::Inter(node) => node.next.iter().map(String::as_str).collect(),
            FlatFlowNode::Activity(node) => vec![node.next.as_str()],
        }
    }
}

///
/// One object type's flat flow: a start event, an end event, and the nodes
/// in between
///
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlowLane {
    /// The lane's object type
    pub ot: ObjectType,
    /// Id of the lane's start event
    pub start_id: String,
    /// Id of the lane's end event
    pub end_id: String,
    /// All flow nodes of the lane, start and end included
    pub nodes: Vec<FlatFlowNode>,
}

///
/// Flat flow descriptions for a set of object types over one tree
///
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct FlowDescription {
    /// One lane per requested object type, in request order
    pub lanes: Vec<FlowLane>,
}

impl FlowDescription {
    ///
    /// Returns all distinct activity names across all lanes
    ///
    pub fn activities(&self) -> BTreeSet<&str> {
        self.lanes
            .iter()
            .flat_map(|lane| lane.nodes.iter())
            .filter_map(|node| match node {
                FlatFlowNode::Activity(activity) => Some(activity.activity.as_str()),
                FlatFlowNode::Inter(_) => None,
            })
            .collect()
    }
}

///
/// Errors that can occur during flow synthesis
///
#[derive(Debug, Clone, PartialEq)]
pub enum FlowSynthesisError {
    /// The `loop` operator has no defined flow semantics; synthesizing a
    /// plausible-looking graph for it would be wrong, so it is rejected
    UnsupportedLoopOperator {
        /// Id of the offending tree node
        node_id: usize,
    },
}

impl std::fmt::Display for FlowSynthesisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowSynthesisError::UnsupportedLoopOperator { node_id } => {
                write!(
                    f,
                    "Flow synthesis for the loop operator is not supported (tree node {node_id})"
                )
            }
        }
    }
}

impl std::error::Error for FlowSynthesisError {}

///
/// Generator for unique gateway node ids, shared across all lanes of one
/// synthesis run
///
#[derive(Debug, Default)]
pub struct FlowIdGen {
    next: usize,
}

impl FlowIdGen {
    ///
    /// Returns a fresh id for a node of the given type
    ///
    pub fn next_id(&mut self, node_type: InterNodeType) -> String {
        let id = self.next;
        self.next += 1;
        format!("{}-{}", node_type.id_prefix(), id)
    }
}

///
/// Returns the shared flow node id of an activity name
///
pub fn activity_node_id(activity: &str) -> String {
    format!("activity-{activity}")
}

///
/// Derives an object type's execution options at an activity from the
/// exhibited properties of its [`ObjectTypeRef`]
///
/// No exhibited properties yields a single plain `Execute`. A divergent type
/// may skip, execute, or re-execute the activity (`[Skip, Execute, Loop]`),
/// with any further exhibited property folded into the `Execute` cardinality.
/// Otherwise, each exhibited property yields its own `Execute` entry.
///
pub fn exec_options_for(ot_ref: &ObjectTypeRef) -> Vec<ExecOption> {
    let exhibits = ot_ref.exhibits.as_ref().filter(|set| !set.is_empty());
    match exhibits {
        None => vec![ExecOption::Execute { cardinality: None }],
        Some(set) if set.contains(&ExhibitKind::Divergent) => {
            let cardinality = set
                .iter()
                .copied()
                .find(|kind| *kind != ExhibitKind::Divergent);
            vec![
                ExecOption::Skip,
                ExecOption::Execute { cardinality },
                ExecOption::Loop,
            ]
        }
        Some(set) => set
            .iter()
            .copied()
            .map(|kind| ExecOption::Execute {
                cardinality: Some(kind),
            })
            .collect(),
    }
}

///
/// Synthesizes flat flow lanes for the given object types over one tree
///
/// The tree is projected onto each object type individually (always from the
/// given original), then traversed into that type's lane. Gateway ids are
/// unique across the whole description; activity node ids are shared across
/// lanes by activity name. An empty object-type list yields an empty
/// description.
///
pub fn synthesize_flows(
    tree: &OCPT,
    object_types: &[ObjectType],
) -> Result<FlowDescription, FlowSynthesisError> {
    let mut ids = FlowIdGen::default();
    let mut lanes = Vec::with_capacity(object_types.len());
    for ot in object_types {
        let projected = project_tree(tree, std::slice::from_ref(ot));
        lanes.push(synthesize_lane(&projected, ot, &mut ids)?);
    }
    Ok(FlowDescription { lanes })
}

///
/// Synthesizes one object type's lane from a tree already projected onto it
///
pub fn synthesize_lane(
    projected: &OCPT,
    ot: &str,
    ids: &mut FlowIdGen,
) -> Result<FlowLane, FlowSynthesisError> {
    let start_id = format!("{}-{ot}", InterNodeType::StartEvent.id_prefix());
    let end_id = format!("{}-{ot}", InterNodeType::EndEvent.id_prefix());

    let mut body = Vec::new();
    let first = synth_node(&projected.root, ot, &end_id, None, false, ids, &mut body)?;
    let entry = first.unwrap_or_else(|| end_id.clone());

    let mut nodes = Vec::with_capacity(body.len() + 2);
    nodes.push(FlatFlowNode::Inter(FlatInterNode {
        id: start_id.clone(),
        node_type: InterNodeType::StartEvent,
        branches: None,
        next: vec![entry],
        branch_info: None,
        ot: ot.to_string(),
    }));
    nodes.extend(body);
    nodes.push(FlatFlowNode::Inter(FlatInterNode {
        id: end_id.clone(),
        node_type: InterNodeType::EndEvent,
        branches: None,
        next: Vec::new(),
        branch_info: None,
        ot: ot.to_string(),
    }));

    Ok(FlowLane {
        ot: ot.to_string(),
        start_id,
        end_id,
        nodes,
    })
}

/// Recursive synthesis step. `next_id` is the id the subtree's flow must link
/// to; the returned id is the subtree's first node (`None` if the subtree is
/// fully elided for this object type).
fn synth_node(
    node: &OCPTNode,
    ot: &str,
    next_id: &str,
    branch: Option<&BranchInfo>,
    in_div_loop: bool,
    ids: &mut FlowIdGen,
    out: &mut Vec<FlatFlowNode>,
) -> Result<Option<String>, FlowSynthesisError> {
    match node {
        OCPTNode::Leaf(leaf) => {
            if leaf.is_true_silent() || leaf.activity == TAU_LABEL {
                return Ok(None);
            }
            let Some(ot_ref) = leaf.object_type_ref(ot) else {
                return Ok(None);
            };
            let id = activity_node_id(&leaf.activity);
            out.push(FlatFlowNode::Activity(FlatActivityNode {
                id: id.clone(),
                activity: leaf.activity.clone(),
                exec_options: exec_options_for(ot_ref),
                next: next_id.to_string(),
                branch_info: branch.cloned(),
                ot: ot.to_string(),
            }));
            Ok(Some(id))
        }
        OCPTNode::Operator(op) => match op.operator {
            OCPTOperatorType::Skip => Ok(None),
            OCPTOperatorType::Loop => Err(FlowSynthesisError::UnsupportedLoopOperator {
                node_id: op.id,
            }),
            OCPTOperatorType::Sequence => {
                synth_sequence(&op.children, ot, next_id, branch, in_div_loop, ids, out)
            }
            // Inside a div loop everything is flattened to a sequential chain
            _ if in_div_loop => {
                synth_sequence(&op.children, ot, next_id, branch, true, ids, out)
            }
            OCPTOperatorType::Concurrency => synth_split_join(
                &op.children,
                InterNodeType::ParallelSplit,
                InterNodeType::ParallelJoin,
                ot,
                next_id,
                branch,
                ids,
                out,
            ),
            OCPTOperatorType::ExclusiveChoice => synth_split_join(
                &op.children,
                InterNodeType::XorSplit,
                InterNodeType::XorJoin,
                ot,
                next_id,
                branch,
                ids,
                out,
            ),
            OCPTOperatorType::Arbitrary => {
                synth_div_loop(&op.children, ot, next_id, branch, ids, out)
            }
        },
    }
}

/// Children are threaded right-to-left: each child's first node becomes the
/// continuation of its left sibling, so the chain reads left-to-right and ends
/// at the caller's continuation.
fn synth_sequence(
    children: &[OCPTNode],
    ot: &str,
    next_id: &str,
    branch: Option<&BranchInfo>,
    in_div_loop: bool,
    ids: &mut FlowIdGen,
    out: &mut Vec<FlatFlowNode>,
) -> Result<Option<String>, FlowSynthesisError> {
    let mut next = next_id.to_string();
    for child in children.iter().rev() {
        if let Some(first) = synth_node(child, ot, &next, branch, in_div_loop, ids, out)? {
            next = first;
        }
    }
    Ok(if next == next_id { None } else { Some(next) })
}

#[allow(clippy::too_many_arguments)]
fn synth_split_join(
    children: &[OCPTNode],
    split_type: InterNodeType,
    join_type: InterNodeType,
    ot: &str,
    next_id: &str,
    branch: Option<&BranchInfo>,
    ids: &mut FlowIdGen,
    out: &mut Vec<FlatFlowNode>,
) -> Result<Option<String>, FlowSynthesisError> {
    let split_id = ids.next_id(split_type);
    let join_id = ids.next_id(join_type);
    let depth = branch.map_or(0, |b| b.depth) + 1;

    let mut branch_firsts = Vec::with_capacity(children.len());
    for (branch_id, child) in children.iter().enumerate() {
        let child_branch = BranchInfo {
            parent_split_id: split_id.clone(),
            branch_id,
            depth,
        };
        let first = synth_node(child, ot, &join_id, Some(&child_branch), false, ids, out)?;
        // A fully elided branch connects the split directly to the join
        branch_firsts.push(first.unwrap_or_else(|| join_id.clone()));
    }

    out.push(FlatFlowNode::Inter(FlatInterNode {
        id: split_id.clone(),
        node_type: split_type,
        branches: Some(children.len()),
        next: branch_firsts,
        branch_info: branch.cloned(),
        ot: ot.to_string(),
    }));
    out.push(FlatFlowNode::Inter(FlatInterNode {
        id: join_id,
        node_type: join_type,
        branches: Some(children.len()),
        next: vec![next_id.to_string()],
        branch_info: branch.cloned(),
        ot: ot.to_string(),
    }));

    Ok(Some(split_id))
}

/// A div loop chains its children sequentially between a start and an end
/// marker; the end links both to the caller's continuation and back to the
/// start, so the region may repeat.
fn synth_div_loop(
    children: &[OCPTNode],
    ot: &str,
    next_id: &str,
    branch: Option<&BranchInfo>,
    ids: &mut FlowIdGen,
    out: &mut Vec<FlatFlowNode>,
) -> Result<Option<String>, FlowSynthesisError> {
    let start_id = ids.next_id(InterNodeType::DivLoopStart);
    let end_id = ids.next_id(InterNodeType::DivLoopEnd);

    let mut next = end_id.clone();
    for child in children.iter().rev() {
        if let Some(first) = synth_node(child, ot, &next, branch, true, ids, out)? {
            next = first;
        }
    }

    out.push(FlatFlowNode::Inter(FlatInterNode {
        id: start_id.clone(),
        node_type: InterNodeType::DivLoopStart,
        branches: None,
        next: vec![next],
        branch_info: branch.cloned(),
        ot: ot.to_string(),
    }));
    out.push(FlatFlowNode::Inter(FlatInterNode {
        id: end_id,
        node_type: InterNodeType::DivLoopEnd,
        branches: None,
        next: vec![next_id.to_string(), start_id.clone()],
        branch_info: branch.cloned(),
        ot: ot.to_string(),
    }));

    Ok(Some(start_id))
}
