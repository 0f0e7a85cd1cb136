#![warn(
    clippy::doc_markdown,
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs
)]

#![doc = include_str!("../README.md")]

///
/// Object-centric process trees ([`OCPT`]) and their object-type projection
///
pub mod process_tree {
    /// [`OCPT`] struct and sub-structs
    ///
    /// [`OCPT`]: process_tree_struct::OCPT
    pub mod process_tree_struct;
    /// Object-type projection and operator annotation of trees
    pub mod projection;
}

///
/// Flow graphs synthesized from projected trees
///
pub mod flow {
    /// [`FlowGraph`] struct and render export
    ///
    /// [`FlowGraph`]: flow_graph_struct::FlowGraph
    pub mod flow_graph_struct;
    /// Per-object-type flow synthesis from a tree
    pub mod flow_synthesis;
    /// Sweep-line overlap resolution for positioned flow nodes
    pub mod layout;
}

///
/// Token replay of object-centric event data over a flow graph
///
pub mod replay {
    /// Reduction of flattened event data to per-object activity histories
    pub mod object_flow;
    /// The token replay engine
    pub mod token_replay;
}

use std::fs::File;
use std::io::BufReader;
use std::io::BufWriter;
use std::path::Path;

#[doc(inline)]
pub use process_tree::process_tree_struct::{
    ExhibitKind, ObjectType, ObjectTypeRef, OCPTNodeDescription, ProcessTreeError, OCPT,
};

#[doc(inline)]
pub use process_tree::projection::annotate_with_extended_operators;

#[doc(inline)]
pub use process_tree::projection::intersect_object_type_refs;

#[doc(inline)]
pub use process_tree::projection::project_tree;

#[doc(inline)]
pub use flow::flow_synthesis::synthesize_flows;

#[doc(inline)]
pub use flow::flow_synthesis::{FlowDescription, FlowSynthesisError};

#[doc(inline)]
pub use flow::flow_graph_struct::build_flow_graph;

#[doc(inline)]
pub use flow::flow_graph_struct::{FlowGraph, RenderGraph};

#[doc(inline)]
pub use flow::layout::{detect_horizontal_overlaps, resolve_horizontal_overlaps, NodeRect};

#[doc(inline)]
pub use replay::object_flow::build_object_flow_records;

#[doc(inline)]
pub use replay::object_flow::{FlattenedOCELEvent, ObjectFlowRecord};

#[doc(inline)]
pub use replay::token_replay::replay_object_flows;

#[doc(inline)]
pub use replay::token_replay::{ReplayOptions, Token, TokenReplayResult};

///
/// Serialize an [`OCPT`] as a JSON [`String`]
///
pub fn tree_to_json(tree: &OCPT) -> String {
    serde_json::to_string(tree).unwrap()
}

///
/// Build an [`OCPT`] from the JSON tree description format
///
pub fn json_to_tree(tree_json: &str) -> Result<OCPT, ProcessTreeError> {
    let description: OCPTNodeDescription = serde_json::from_str(tree_json)
        .map_err(|err| ProcessTreeError::InvalidJson(err.to_string()))?;
    OCPT::from_description(&description)
}

///
/// Import an [`OCPT`] from a JSON tree description file given by a filepath
///
/// See also [`import_tree_json_from_slice`].
///
pub fn import_tree_json_from_path<P: AsRef<Path>>(path: P) -> Result<OCPT, std::io::Error> {
    let reader: BufReader<File> = BufReader::new(File::open(path)?);
    let description: OCPTNodeDescription = serde_json::from_reader(reader)?;
    OCPT::from_description(&description)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}

///
/// Import an [`OCPT`] from a JSON tree description byte slice
///
/// See also [`import_tree_json_from_path`].
///
pub fn import_tree_json_from_slice(slice: &[u8]) -> Result<OCPT, std::io::Error> {
    let description: OCPTNodeDescription = serde_json::from_slice(slice)?;
    OCPT::from_description(&description)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}

///
/// Import flattened OCEL events from a JSON file given by a filepath
///
/// See also [`import_flattened_events_json_from_slice`].
///
pub fn import_flattened_events_json_from_path<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<FlattenedOCELEvent>, std::io::Error> {
    let reader: BufReader<File> = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

///
/// Import flattened OCEL events from a JSON byte slice
///
/// See also [`import_flattened_events_json_from_path`].
///
pub fn import_flattened_events_json_from_slice(
    slice: &[u8],
) -> Result<Vec<FlattenedOCELEvent>, std::io::Error> {
    Ok(serde_json::from_slice(slice)?)
}

///
/// Serialize a [`RenderGraph`] as a JSON [`String`]
///
pub fn render_graph_to_json(render: &RenderGraph) -> String {
    serde_json::to_string(render).unwrap()
}

///
/// Export a [`RenderGraph`] to a JSON file at the specified path
///
pub fn export_render_graph_json_path<P: AsRef<Path>>(
    render: &RenderGraph,
    path: P,
) -> Result<(), std::io::Error> {
    let writer: BufWriter<File> = BufWriter::new(File::create(path)?);
    Ok(serde_json::to_writer(writer, render)?)
}
