use chrono::{DateTime, Utc};
use itertools::Itertools;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Key prefix of per-object-type reference fields in flattened events
pub const OCEL_TYPE_PREFIX: &str = "ocel:type:";

///
/// One event of an object-centric event log, flattened to a single record
///
/// Object references are carried in `ocel:type:<X>` fields, one per object
/// type, each holding a comma-separated list of object ids.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FlattenedOCELEvent {
    /// Event id
    #[serde(rename = "ocel:eid")]
    pub event_id: String,
    /// Event timestamp
    #[serde(rename = "ocel:timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Activity name
    #[serde(rename = "ocel:activity")]
    pub activity: String,
    /// Per-object-type references (`ocel:type:<X>` fields)
    #[serde(flatten)]
    pub object_refs: HashMap<String, String>,
}

///
/// The chronological activity history of one object instance
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectFlowRecord {
    /// Object id
    pub id: String,
    /// Object type
    #[serde(rename = "type")]
    pub object_type: String,
    /// Timestamps, ascending and index-aligned with `activities`
    pub timestamps: Vec<DateTime<Utc>>,
    /// Activity names, index-aligned with `timestamps`
    pub activities: Vec<String>,
}

///
/// Returns the record-map key of an object: `<Type>-<objectId>`
///
pub fn object_flow_key(object_type: &str, object_id: &str) -> String {
    format!("{object_type}-{object_id}")
}

///
/// Reduces flattened events to one chronological [`ObjectFlowRecord`] per
/// referenced object
///
/// Events are sorted ascending by timestamp (stable for ties) before
/// grouping. Comma-joined multi-valued references are split into one entry
/// per object, and empty references are dropped.
///
pub fn build_object_flow_records(
    events: &[FlattenedOCELEvent],
) -> BTreeMap<String, ObjectFlowRecord> {
    let mut records: BTreeMap<String, ObjectFlowRecord> = BTreeMap::new();

    for event in events.iter().sorted_by_key(|event| event.timestamp) {
        for (field, value) in &event.object_refs {
            let Some(object_type) = field.strip_prefix(OCEL_TYPE_PREFIX) else {
                continue;
            };
            for object_id in value.split(',').map(str::trim).filter(|id| !id.is_empty()) {
                let record = records
                    .entry(object_flow_key(object_type, object_id))
                    .or_insert_with(|| ObjectFlowRecord {
                        id: object_id.to_string(),
                        object_type: object_type.to_string(),
                        timestamps: Vec::new(),
                        activities: Vec::new(),
                    });
                record.timestamps.push(event.timestamp);
                record.activities.push(event.activity.clone());
            }
        }
    }

    records
}

///
/// Returns the latest timestamp over all records, i.e., the end of the
/// observation window
///
pub fn observation_window_end(
    records: &BTreeMap<String, ObjectFlowRecord>,
) -> Option<DateTime<Utc>> {
    records
        .values()
        .filter_map(|record| record.timestamps.last())
        .max()
        .copied()
}
