//! Decoded result shapes handed to the web tier.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value as JsonValue;

/// One decoded row: column name to decoded cell.
pub type ParsedRow = BTreeMap<String, JsonValue>;

/// Generic, JSON-serializable result of one statement.
///
/// Besides the tabular part, every vertex, edge and path found anywhere in
/// the result is collected into the flattened element lists so graph views can
/// render them regardless of column or nesting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedResult {
    pub headers: Vec<String>,
    #[serde(rename = "tables")]
    pub rows: Vec<ParsedRow>,
    pub vertices: Vec<ParsedVertex>,
    pub edges: Vec<ParsedEdge>,
    pub paths: Vec<ParsedPath>,
    /// Engine-side latency in microseconds.
    pub time_cost: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ParsedResult {
    /// Look up a cell by row index and column name.
    pub fn cell(&self, row: usize, column: &str) -> Option<&JsonValue> {
        self.rows.get(row).and_then(|r| r.get(column))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "vertex")]
pub struct ParsedVertex {
    pub vid: JsonValue,
    pub tags: Vec<String>,
    /// Tag name to that tag's properties.
    pub properties: BTreeMap<String, BTreeMap<String, JsonValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "edge")]
pub struct ParsedEdge {
    #[serde(rename = "srcID")]
    pub src_id: JsonValue,
    #[serde(rename = "dstID")]
    pub dst_id: JsonValue,
    #[serde(rename = "edgeName")]
    pub edge_name: String,
    pub rank: i64,
    pub properties: BTreeMap<String, JsonValue>,
}

/// One hop of a decoded path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedRelationship {
    #[serde(rename = "srcID")]
    pub src_id: JsonValue,
    #[serde(rename = "dstID")]
    pub dst_id: JsonValue,
    #[serde(rename = "edgeName")]
    pub edge_name: String,
    pub rank: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "path")]
pub struct ParsedPath {
    /// Set only for a path without relationships (a single node).
    #[serde(rename = "srcID", skip_serializing_if = "Option::is_none")]
    pub src_id: Option<JsonValue>,
    pub relationships: Vec<ParsedRelationship>,
}
