//! Object-type projection of object-centric process trees
//!
//! Restricts a tree's visible behavior to a chosen set of object types:
//! unrelated leaves are silenced, and whole subtrees are reclassified as
//! skippable or order-arbitrary where every child allows it. Projection is a
//! pure transform of a fresh clone; the input tree is never modified, so every
//! projection starts from the same source of truth.

use crate::process_tree::process_tree_struct::{
    ExhibitKind, ObjectType, ObjectTypeRef, OCPTLeaf, OCPTNode, OCPTOperatorType, OCPT,
};
use std::collections::BTreeSet;

///
/// Intersects two object-type reference lists
///
/// Entries match on object-type name; a matching pair keeps the name and the
/// set intersection of the exhibited properties (absent if either side has
/// none or the sets are disjoint). The operation is commutative and
/// associative up to entry order, which follows the left operand.
///
pub fn intersect_object_type_refs(a: &[ObjectTypeRef], b: &[ObjectTypeRef]) -> Vec<ObjectTypeRef> {
    a.iter()
        .filter_map(|ref_a| {
            b.iter().find(|ref_b| ref_b.ot == ref_a.ot).map(|ref_b| {
                let exhibits: BTreeSet<ExhibitKind> = match (&ref_a.exhibits, &ref_b.exhibits) {
                    (Some(ex_a), Some(ex_b)) => ex_a.intersection(ex_b).copied().collect(),
                    _ => BTreeSet::new(),
                };
                ObjectTypeRef {
                    ot: ref_a.ot.clone(),
                    exhibits: if exhibits.is_empty() {
                        None
                    } else {
                        Some(exhibits)
                    },
                }
            })
        })
        .collect()
}

///
/// Intersects any number of object-type reference lists as a left-to-right
/// reduction; an empty input yields an empty result
///
pub fn intersect_object_type_sets<I>(sets: I) -> Vec<ObjectTypeRef>
where
    I: IntoIterator<Item = Vec<ObjectTypeRef>>,
{
    sets.into_iter()
        .reduce(|acc, next| intersect_object_type_refs(&acc, &next))
        .unwrap_or_default()
}

///
/// Projects a tree onto the given target object types, returning a new tree
///
/// An empty target list is a defined no-op: the result is an unchanged clone.
/// Leaves with no target type are silenced; operator subtrees whose children
/// all became invisible (or order-irrelevant) are rewritten to `Skip` or
/// `Arbitrary` operators carrying the intersection of their children's
/// object-type sets. Always project from the unprojected original; projections
/// are not composable.
///
pub fn project_tree(tree: &OCPT, target_types: &[ObjectType]) -> OCPT {
    let mut projected = tree.clone();
    if target_types.is_empty() {
        return projected;
    }
    project_node(&mut projected.root, target_types);
    projected
}

fn project_node(node: &mut OCPTNode, target_types: &[ObjectType]) {
    match node {
        OCPTNode::Leaf(leaf) => {
            let related = leaf
                .object_types
                .iter()
                .any(|r| target_types.contains(&r.ot));
            if !related {
                leaf.is_silent = true;
            }
        }
        OCPTNode::Operator(op) => {
            op.children
                .iter_mut()
                .for_each(|child| project_node(child, target_types));

            if children_form_skip(&op.children) {
                op.operator = OCPTOperatorType::Skip;
                op.object_types = Some(children_intersection(&op.children));
            } else if children_form_arbitrary(&op.children, target_types) {
                op.operator = OCPTOperatorType::Arbitrary;
                op.object_types = Some(children_intersection(&op.children));
            }
        }
    }
}

/// Every child is invisible: a silenced leaf or an already-skippable subtree.
fn children_form_skip(children: &[OCPTNode]) -> bool {
    children.iter().all(|child| match child {
        OCPTNode::Leaf(leaf) => leaf.is_true_silent(),
        OCPTNode::Operator(op) => op.operator == OCPTOperatorType::Skip,
    })
}

/// Every child is either invisible, already order-arbitrary, or a leaf whose
/// target types all diverge (so no ordering constraint survives for them).
fn children_form_arbitrary(children: &[OCPTNode], target_types: &[ObjectType]) -> bool {
    children.iter().all(|child| match child {
        OCPTNode::Operator(op) => matches!(
            op.operator,
            OCPTOperatorType::Skip | OCPTOperatorType::Arbitrary
        ),
        OCPTNode::Leaf(leaf) => {
            leaf.is_true_silent() || leaf_unconstrained_for(leaf, target_types)
        }
    })
}

/// A leaf is unconstrained when it references no target type at all, or when
/// every referenced target type exhibits divergence.
fn leaf_unconstrained_for(leaf: &OCPTLeaf, target_types: &[ObjectType]) -> bool {
    leaf.object_types
        .iter()
        .filter(|r| target_types.contains(&r.ot))
        .all(|r| r.exhibits_kind(ExhibitKind::Divergent))
}

fn children_intersection(children: &[OCPTNode]) -> Vec<ObjectTypeRef> {
    intersect_object_type_sets(
        children
            .iter()
            .map(|child| child.object_types().unwrap_or_default().to_vec()),
    )
}

///
/// Annotates every operator node with the intersection of its children's
/// object-type sets, bottom-up and independent of any target-type filter
///
/// Operator types are left untouched; this pass only precomputes the
/// annotations (e.g., divergence markers) once, before any projection.
///
pub fn annotate_with_extended_operators(tree: &mut OCPT) {
    annotate_node(&mut tree.root);
}

fn annotate_node(node: &mut OCPTNode) {
    if let OCPTNode::Operator(op) = node {
        op.children.iter_mut().for_each(annotate_node);
        op.object_types = Some(children_intersection(&op.children));
    }
}
