use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// An object type name (e.g., `"Order"` or `"Item"`)
pub type ObjectType = String;

/// The placeholder activity label of silent leaves in imported trees
pub const TAU_LABEL: &str = "tau";

///
/// A behavioral property an [`ObjectType`] exhibits at an activity
///
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum ExhibitKind {
    /// Divergent: one activity execution, many objects of the type
    #[serde(rename = "div")]
    Divergent,
    /// Convergent: many activity executions, one object of the type
    #[serde(rename = "con")]
    Convergent,
    /// Default: neither divergent nor convergent
    #[serde(rename = "def")]
    Default,
}

///
/// A reference to an object type on a tree node, with the properties the
/// type exhibits at that node
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectTypeRef {
    /// Name of the referenced object type
    pub ot: ObjectType,
    /// Exhibited properties; absent means the type behaves plainly here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exhibits: Option<BTreeSet<ExhibitKind>>,
}

impl ObjectTypeRef {
    ///
    /// Creates a reference without exhibited properties
    ///
    pub fn new<S: Into<ObjectType>>(ot: S) -> Self {
        Self {
            ot: ot.into(),
            exhibits: None,
        }
    }

    ///
    /// Creates a reference with the given exhibited properties
    ///
    pub fn with_exhibits<S: Into<ObjectType>>(
        ot: S,
        exhibits: impl IntoIterator<Item = ExhibitKind>,
    ) -> Self {
        Self {
            ot: ot.into(),
            exhibits: Some(exhibits.into_iter().collect()),
        }
    }

    ///
    /// Returns `true` if the referenced type exhibits the given property
    ///
    pub fn exhibits_kind(&self, kind: ExhibitKind) -> bool {
        self.exhibits
            .as_ref()
            .is_some_and(|exhibits| exhibits.contains(&kind))
    }
}

///
/// Operator type enum for [`OCPTOperator`]
///
/// `Skip` and `Arbitrary` never occur in imported trees; they are written by
/// the object-type projection when a whole subtree becomes skippable or
/// order-arbitrary for the projected types.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum OCPTOperatorType {
    /// Sequence operator
    #[serde(rename = "sequence")]
    Sequence,
    /// Exclusive choice operator
    #[serde(rename = "xor")]
    ExclusiveChoice,
    /// Concurrency operator
    #[serde(rename = "parallel")]
    Concurrency,
    /// Loop operator
    #[serde(rename = "loop")]
    Loop,
    /// The whole subtree is skippable for the projected object types
    #[serde(rename = "skip")]
    Skip,
    /// The subtree's behavior is order-arbitrary for the projected object types
    #[serde(rename = "arbitrary")]
    Arbitrary,
}

///
/// Node in an object-centric process tree
///
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OCPTNode {
    /// Operator node of an object-centric process tree
    Operator(OCPTOperator),
    /// Leaf node of an object-centric process tree
    Leaf(OCPTLeaf),
}

impl OCPTNode {
    ///
    /// Returns the identifier of a node in an object-centric process tree
    ///
    pub fn get_id(&self) -> usize {
        match self {
            OCPTNode::Operator(op) => op.id,
            OCPTNode::Leaf(leaf) => leaf.id,
        }
    }

    ///
    /// Returns `true` if the node is a leaf
    ///
    pub fn is_leaf(&self) -> bool {
        matches!(self, OCPTNode::Leaf(_))
    }

    ///
    /// Returns the object-type set of the node: a leaf's referenced types, or
    /// the intersection annotation of an extended operator (`None` for plain,
    /// unannotated operators)
    ///
    pub fn object_types(&self) -> Option<&[ObjectTypeRef]> {
        match self {
            OCPTNode::Operator(op) => op.object_types.as_deref(),
            OCPTNode::Leaf(leaf) => Some(&leaf.object_types),
        }
    }

    ///
    /// Returns `true` if a loop operator has at least two children or if all
    /// other operators have at least one child.
    ///
    pub fn check_children_valid(&self) -> bool {
        match self {
            OCPTNode::Operator(op) => match op.operator {
                OCPTOperatorType::Loop => op.children.len() >= 2,
                _ => !op.children.is_empty(),
            },
            OCPTNode::Leaf(_) => true,
        }
    }
}

///
/// An operator node in an object-centric process tree
///
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OCPTOperator {
    /// The node ID
    pub id: usize,
    /// The [`OCPTOperatorType`] of the node
    pub operator: OCPTOperatorType,
    /// Intersection of the children's object-type sets; `None` until the node
    /// has been annotated or rewritten by a projection
    #[serde(rename = "objectTypes", skip_serializing_if = "Option::is_none")]
    pub object_types: Option<Vec<ObjectTypeRef>>,
    /// Whether the node is expanded in an interactive host
    #[serde(rename = "isExpanded")]
    pub is_expanded: bool,
    /// The children nodes of the operator node
    pub children: Vec<OCPTNode>,
}

impl OCPTOperator {
    ///
    /// Returns `true` if the operator carries an object-type annotation
    ///
    pub fn is_extended(&self) -> bool {
        self.object_types.is_some()
    }
}

///
/// A leaf in an object-centric process tree
///
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OCPTLeaf {
    /// The node ID
    pub id: usize,
    /// The activity label
    pub activity: String,
    /// The object types involved in the activity
    #[serde(rename = "objectTypes")]
    pub object_types: Vec<ObjectTypeRef>,
    /// Whether the activity is elided for the currently projected object types
    #[serde(rename = "isSilent")]
    pub is_silent: bool,
    /// Whether the node is expanded in an interactive host
    #[serde(rename = "isExpanded")]
    pub is_expanded: bool,
}

impl OCPTLeaf {
    ///
    /// Returns `true` if the leaf is silenced, i.e., invisible for the
    /// currently projected object types
    ///
    pub fn is_true_silent(&self) -> bool {
        self.is_silent
    }

    ///
    /// Returns the [`ObjectTypeRef`] for the given object type, if the leaf
    /// involves it
    ///
    pub fn object_type_ref(&self, ot: &str) -> Option<&ObjectTypeRef> {
        self.object_types.iter().find(|r| r.ot == ot)
    }
}

///
/// Errors that can occur when building an [`OCPT`] from its description
///
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessTreeError {
    /// An activity-valued node carried children
    ActivityWithChildren {
        /// The offending activity label
        activity: String,
    },
    /// An operator-valued node carried no children
    OperatorWithoutChildren {
        /// The offending operator type
        operator: OCPTOperatorType,
    },
    /// The description was not valid JSON for a tree
    InvalidJson(String),
}

impl std::fmt::Display for ProcessTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessTreeError::ActivityWithChildren { activity } => {
                write!(f, "Activity node {activity:?} must not have children")
            }
            ProcessTreeError::OperatorWithoutChildren { operator } => {
                write!(f, "Operator node {operator:?} must have children")
            }
            ProcessTreeError::InvalidJson(err) => {
                write!(f, "Invalid tree JSON: {err}")
            }
        }
    }
}

impl std::error::Error for ProcessTreeError {}

///
/// JSON-shaped value of a node description: an activity (optionally silenced),
/// a plain operator, or an operator already annotated with object types
///
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum OCPTValueDescription {
    /// An activity leaf with an explicit silence flag
    SilentActivity {
        /// The activity label
        activity: String,
        /// The object types involved in the activity
        #[serde(rename = "objectTypes")]
        object_types: Vec<ObjectTypeRef>,
        /// Whether the activity is elided
        #[serde(rename = "isSilent")]
        is_silent: bool,
    },
    /// An activity leaf
    Activity {
        /// The activity label
        activity: String,
        /// The object types involved in the activity
        #[serde(rename = "objectTypes")]
        object_types: Vec<ObjectTypeRef>,
    },
    /// An operator annotated with the intersection of its children's types
    ExtendedOperator {
        /// The operator type
        operator: OCPTOperatorType,
        /// The annotated object types
        #[serde(rename = "objectTypes")]
        object_types: Vec<ObjectTypeRef>,
    },
    /// A plain operator
    Operator(OCPTOperatorType),
}

///
/// JSON-shaped description of a tree node: `{ value, isExpanded?, children? }`
///
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OCPTNodeDescription {
    /// The node value
    pub value: OCPTValueDescription,
    /// Whether the node is expanded (defaults to `true`)
    #[serde(rename = "isExpanded", default = "default_expanded")]
    pub is_expanded: bool,
    /// The children descriptions; absent for leaves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<OCPTNodeDescription>>,
}

fn default_expanded() -> bool {
    true
}

///
/// Generator for pre-order node ids
///
/// Passed explicitly through the tree construction so id assignment is
/// deterministic and free of global state.
///
#[derive(Debug, Default)]
pub struct NodeIdGen {
    next: usize,
}

impl NodeIdGen {
    ///
    /// Creates a generator starting at id `0`
    ///
    pub fn new() -> Self {
        Self::default()
    }

    ///
    /// Returns the next id and advances the counter
    ///
    pub fn next_id(&mut self) -> usize {
        let id = self.next;
        self.next += 1;
        id
    }
}

///
/// Object-centric process tree struct that contains [`OCPTNode`] as root
///
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OCPT {
    /// The root of the object-centric process tree
    pub root: OCPTNode,
}

impl OCPT {
    ///
    /// Initializes the object-centric process tree with the given node as root
    ///
    pub fn new(root: OCPTNode) -> Self {
        Self { root }
    }

    ///
    /// Builds a tree from its JSON-shaped description, assigning node ids with
    /// a fresh pre-order counter
    ///
    /// Activity values with children and operator values without children are
    /// rejected; neither shape has a meaningful interpretation.
    ///
    pub fn from_description(description: &OCPTNodeDescription) -> Result<Self, ProcessTreeError> {
        let mut ids = NodeIdGen::new();
        let root = build_node(description, &mut ids)?;
        Ok(Self { root })
    }

    ///
    /// Returns `true` if all operator nodes have the right number of children
    ///
    pub fn is_valid(&self) -> bool {
        fn check(node: &OCPTNode) -> bool {
            if !node.check_children_valid() {
                return false;
            }
            match node {
                OCPTNode::Operator(op) => op.children.iter().all(check),
                OCPTNode::Leaf(_) => true,
            }
        }
        check(&self.root)
    }

    ///
    /// Returns all descendant [`OCPTLeaf`]
    ///
    pub fn find_all_leaves(&self) -> Vec<&OCPTLeaf> {
        let mut result: Vec<&OCPTLeaf> = Vec::new();

        let mut curr_operators: Vec<&OCPTOperator> = Vec::new();
        match &self.root {
            OCPTNode::Operator(op) => curr_operators.push(op),
            OCPTNode::Leaf(leaf) => result.push(leaf),
        };

        let mut next_operators = Vec::new();

        while !curr_operators.is_empty() {
            curr_operators.iter().for_each(|op| {
                op.children.iter().for_each(|child| match child {
                    OCPTNode::Operator(op) => next_operators.push(op),
                    OCPTNode::Leaf(leaf) => result.push(leaf),
                })
            });

            curr_operators = next_operators;
            next_operators = Vec::new();
        }

        result
    }

    ///
    /// Returns all distinct object types referenced by the tree's leaves, in
    /// first-encountered order
    ///
    pub fn collect_object_types(&self) -> Vec<ObjectType> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut result = Vec::new();
        for leaf in self.find_all_leaves() {
            for ot_ref in &leaf.object_types {
                if seen.insert(ot_ref.ot.as_str()) {
                    result.push(ot_ref.ot.clone());
                }
            }
        }
        result
    }
}

fn build_node(
    description: &OCPTNodeDescription,
    ids: &mut NodeIdGen,
) -> Result<OCPTNode, ProcessTreeError> {
    let id = ids.next_id();
    let has_children = description
        .children
        .as_ref()
        .is_some_and(|children| !children.is_empty());

    match &description.value {
        OCPTValueDescription::Activity {
            activity,
            object_types,
        }
        | OCPTValueDescription::SilentActivity {
            activity,
            object_types,
            ..
        } => {
            if has_children {
                return Err(ProcessTreeError::ActivityWithChildren {
                    activity: activity.clone(),
                });
            }
            let is_silent = match &description.value {
                OCPTValueDescription::SilentActivity { is_silent, .. } => *is_silent,
                _ => false,
            };
            Ok(OCPTNode::Leaf(OCPTLeaf {
                id,
                activity: activity.clone(),
                object_types: object_types.clone(),
                is_silent,
                is_expanded: description.is_expanded,
            }))
        }
        OCPTValueDescription::Operator(operator) => {
            build_operator(description, id, *operator, None, ids)
        }
        OCPTValueDescription::ExtendedOperator {
            operator,
            object_types,
        } => build_operator(
            description,
            id,
            *operator,
            Some(object_types.clone()),
            ids,
        ),
    }
}

fn build_operator(
    description: &OCPTNodeDescription,
    id: usize,
    operator: OCPTOperatorType,
    object_types: Option<Vec<ObjectTypeRef>>,
    ids: &mut NodeIdGen,
) -> Result<OCPTNode, ProcessTreeError> {
    let children = description
        .children
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|child| build_node(child, ids))
        .collect::<Result<Vec<_>, _>>()?;
    if children.is_empty() {
        return Err(ProcessTreeError::OperatorWithoutChildren { operator });
    }
    Ok(OCPTNode::Operator(OCPTOperator {
        id,
        operator,
        object_types,
        is_expanded: description.is_expanded,
        children,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_item_tree_json() -> &'static str {
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
        }"#
    }

    #[test]
    fn build_assigns_preorder_ids() {
        let description: OCPTNodeDescription =
            serde_json::from_str(order_item_tree_json()).unwrap();
        let tree = OCPT::from_description(&description).unwrap();

        assert_eq!(tree.root.get_id(), 0);
        let OCPTNode::Operator(root) = &tree.root else {
            panic!("expected operator root");
        };
        assert_eq!(root.operator, OCPTOperatorType::Sequence);
        assert_eq!(root.children[0].get_id(), 1);
        assert_eq!(root.children[1].get_id(), 2);
        let OCPTNode::Operator(parallel) = &root.children[1] else {
            panic!("expected parallel operator");
        };
        assert_eq!(parallel.children[0].get_id(), 3);
        assert_eq!(parallel.children[1].get_id(), 4);
        assert_eq!(root.children[2].get_id(), 5);
        assert!(tree.is_valid());
    }

    #[test]
    fn build_parses_exhibits() {
        let description: OCPTNodeDescription =
            serde_json::from_str(order_item_tree_json()).unwrap();
        let tree = OCPT::from_description(&description).unwrap();
        let leaves = tree.find_all_leaves();
        let create = leaves
            .iter()
            .find(|leaf| leaf.activity == "Create Order")
            .unwrap();
        let item_ref = create.object_type_ref("Item").unwrap();
        assert!(item_ref.exhibits_kind(ExhibitKind::Divergent));
        assert!(!item_ref.exhibits_kind(ExhibitKind::Convergent));
        assert!(create.object_type_ref("Order").unwrap().exhibits.is_none());
    }

    #[test]
    fn collect_object_types_in_first_encounter_order() {
        let description: OCPTNodeDescription =
            serde_json::from_str(order_item_tree_json()).unwrap();
        let tree = OCPT::from_description(&description).unwrap();
        assert_eq!(tree.collect_object_types(), vec!["Order", "Item"]);
    }

    #[test]
    fn activity_with_children_is_rejected() {
        let description: OCPTNodeDescription = serde_json::from_str(
            r#"{
                "value": { "activity": "Create Order", "objectTypes": [{ "ot": "Order" }] },
                "children": [ { "value": { "activity": "Ship Order", "objectTypes": [{ "ot": "Order" }] } } ]
            }"#,
        )
        .unwrap();
        let err = OCPT::from_description(&description).unwrap_err();
        assert_eq!(
            err,
            ProcessTreeError::ActivityWithChildren {
                activity: "Create Order".to_string()
            }
        );
    }

    #[test]
    fn operator_without_children_is_rejected() {
        let description: OCPTNodeDescription =
            serde_json::from_str(r#"{ "value": "xor" }"#).unwrap();
        let err = OCPT::from_description(&description).unwrap_err();
        assert_eq!(
            err,
            ProcessTreeError::OperatorWithoutChildren {
                operator: OCPTOperatorType::ExclusiveChoice
            }
        );
    }

    #[test]
    fn silent_activity_value_roundtrip() {
        let description: OCPTNodeDescription = serde_json::from_str(
            r#"{ "value": { "activity": "tau", "objectTypes": [], "isSilent": true } }"#,
        )
        .unwrap();
        let tree = OCPT::from_description(&description).unwrap();
        let OCPTNode::Leaf(leaf) = &tree.root else {
            panic!("expected leaf root");
        };
        assert!(leaf.is_true_silent());
        assert_eq!(leaf.activity, TAU_LABEL);
    }
}
