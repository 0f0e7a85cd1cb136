//! Horizontal overlap resolution for positioned flow nodes
//!
//! A sweep-line pass detects x-axis overlaps between vertically co-resident
//! rectangles; resolution iteratively pushes the right-hand rectangle of each
//! overlapping pair further right. The pass is decoupled from flow synthesis
//! and works on plain positioned rectangles.

use ordered_float::OrderedFloat;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Horizontal distance between consecutive flow-node columns
pub const NODE_X_SPACING: f64 = 120.0;
/// X position of the first column
pub const X_START: f64 = 50.0;
/// Y position of the first object-type lane
pub const LANE_Y_OFFSET: f64 = 100.0;
/// Vertical distance between object-type lanes
pub const LANE_Y_SPACING: f64 = 150.0;
/// Vertical offset per branch inside a split, scaled down by nesting depth
pub const BRANCH_Y_SPACING: f64 = 60.0;
/// Width and height of start/end event nodes
pub const EVENT_NODE_SIZE: f64 = 30.0;
/// Width and height of gateway nodes (splits, joins, loop markers)
pub const GATEWAY_NODE_SIZE: f64 = 40.0;
/// Width of an activity connector node
pub const ACTIVITY_CONNECTOR_WIDTH: f64 = 20.0;
/// Height of an activity connector node
pub const ACTIVITY_CONNECTOR_HEIGHT: f64 = 80.0;

/// Extra horizontal gap added when pushing an overlapping rectangle aside
pub const OVERLAP_PADDING: f64 = 10.0;
/// Upper bound on resolution iterations
pub const OVERLAP_RESOLUTION_MAX_ITERATIONS: usize = 100;

///
/// A positioned, sized rectangle taking part in overlap resolution
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NodeRect {
    /// Id of the flow node the rectangle belongs to
    pub id: String,
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Rectangle width
    pub width: f64,
    /// Rectangle height
    pub height: f64,
}

///
/// A detected horizontal overlap between two vertically co-resident
/// rectangles
///
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Overlap {
    /// Id of the first rectangle
    pub node1: String,
    /// Id of the second rectangle
    pub node2: String,
    /// Width of the overlapping x range
    pub overlap_amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SweepEventKind {
    // Ends sort before starts at equal y, so rectangles that merely touch
    // vertically do not count as co-resident
    End,
    Start,
}

/// Index-based detection shared by the public detection and the resolution
/// loop.
fn detect_overlap_indices(rects: &[NodeRect]) -> Vec<(usize, usize, f64)> {
    let mut events: Vec<(OrderedFloat<f64>, SweepEventKind, usize)> = Vec::new();
    for (idx, rect) in rects.iter().enumerate() {
        events.push((OrderedFloat(rect.y), SweepEventKind::Start, idx));
        events.push((OrderedFloat(rect.y + rect.height), SweepEventKind::End, idx));
    }
    events.sort();

    let mut active: Vec<usize> = Vec::new();
    let mut overlaps = Vec::new();

    for (_, kind, idx) in events {
        match kind {
            SweepEventKind::Start => {
                let rect = &rects[idx];
                for &other_idx in &active {
                    let other = &rects[other_idx];
                    let overlap_start = rect.x.max(other.x);
                    let overlap_end = (rect.x + rect.width).min(other.x + other.width);
                    if overlap_start < overlap_end {
                        overlaps.push((other_idx, idx, overlap_end - overlap_start));
                    }
                }
                active.push(idx);
            }
            SweepEventKind::End => {
                active.retain(|&other_idx| other_idx != idx);
            }
        }
    }

    overlaps
}

///
/// Detects all horizontal overlaps between vertically co-resident rectangles
///
pub fn detect_horizontal_overlaps(rects: &[NodeRect]) -> Vec<Overlap> {
    detect_overlap_indices(rects)
        .into_iter()
        .map(|(idx1, idx2, amount)| Overlap {
            node1: rects[idx1].id.clone(),
            node2: rects[idx2].id.clone(),
            overlap_amount: amount,
        })
        .collect()
}

///
/// Resolves horizontal overlaps by repeatedly pushing the rectangle with the
/// larger x position of each overlapping pair further right
///
/// Each iteration handles the detected overlaps in order of descending
/// overlap amount and moves one rectangle of each pair by half the overlap
/// plus a fixed padding. The loop stops early once no overlaps remain and is
/// bounded at [`OVERLAP_RESOLUTION_MAX_ITERATIONS`]; if the bound is hit the
/// result may still contain overlaps (an accepted approximation). Returns the
/// number of overlaps remaining.
///
pub fn resolve_horizontal_overlaps(rects: &mut [NodeRect]) -> usize {
    for _ in 0..OVERLAP_RESOLUTION_MAX_ITERATIONS {
        let mut overlaps = detect_overlap_indices(rects);
        if overlaps.is_empty() {
            return 0;
        }
        overlaps.sort_by_key(|&(_, _, amount)| std::cmp::Reverse(OrderedFloat(amount)));
        for (idx1, idx2, amount) in overlaps {
            let push = amount / 2.0 + OVERLAP_PADDING;
            let target = if rects[idx1].x > rects[idx2].x {
                idx1
            } else {
                idx2
            };
            rects[target].x += push;
        }
    }
    detect_overlap_indices(rects).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(id: &str, x: f64, y: f64, width: f64, height: f64) -> NodeRect {
        NodeRect {
            id: id.to_string(),
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn detects_overlap_of_co_resident_rectangles() {
        let rects = vec![
            rect("a", 0.0, 0.0, 50.0, 40.0),
            rect("b", 30.0, 20.0, 50.0, 40.0),
        ];
        let overlaps = detect_horizontal_overlaps(&rects);
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].node1, "a");
        assert_eq!(overlaps[0].node2, "b");
        assert_eq!(overlaps[0].overlap_amount, 20.0);
    }

    #[test]
    fn vertically_disjoint_rectangles_do_not_overlap() {
        let rects = vec![
            rect("a", 0.0, 0.0, 50.0, 40.0),
            rect("b", 10.0, 40.0, 50.0, 40.0),
        ];
        assert!(detect_horizontal_overlaps(&rects).is_empty());
    }

    #[test]
    fn horizontally_disjoint_rectangles_do_not_overlap() {
        let rects = vec![
            rect("a", 0.0, 0.0, 50.0, 40.0),
            rect("b", 50.0, 0.0, 50.0, 40.0),
        ];
        assert!(detect_horizontal_overlaps(&rects).is_empty());
    }

    #[test]
    fn resolution_clears_a_single_pair() {
        let mut rects = vec![
            rect("a", 0.0, 0.0, 50.0, 40.0),
            rect("b", 30.0, 0.0, 50.0, 40.0),
        ];
        let remaining = resolve_horizontal_overlaps(&mut rects);
        assert_eq!(remaining, 0);
        assert!(detect_horizontal_overlaps(&rects).is_empty());
        // Only the right-hand rectangle moved
        assert_eq!(rects[0].x, 0.0);
        assert!(rects[1].x >= 50.0);
    }

    #[test]
    fn resolution_does_not_increase_overlaps() {
        let mut rects = vec![
            rect("a", 0.0, 0.0, 60.0, 40.0),
            rect("b", 20.0, 10.0, 60.0, 40.0),
            rect("c", 40.0, 20.0, 60.0, 40.0),
        ];
        let before = detect_horizontal_overlaps(&rects).len();
        let remaining = resolve_horizontal_overlaps(&mut rects);
        assert!(remaining <= before);
        assert_eq!(remaining, detect_horizontal_overlaps(&rects).len());
    }

    #[test]
    fn identical_rectangles_are_separated() {
        let mut rects = vec![
            rect("a", 10.0, 0.0, 40.0, 40.0),
            rect("b", 10.0, 0.0, 40.0, 40.0),
        ];
        let remaining = resolve_horizontal_overlaps(&mut rects);
        assert_eq!(remaining, 0);
    }
}
