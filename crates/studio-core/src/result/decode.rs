//! Recursive decoding of engine values into JSON-safe cells.

use std::collections::BTreeMap;

use serde_json::{Number, Value as JsonValue};

use crate::error::{DecodeError, DecodeResult};
use crate::value::{Edge, Path, Properties, ResultSet, Value, Vertex};

use super::model::{
    ParsedEdge, ParsedPath, ParsedRelationship, ParsedResult, ParsedRow, ParsedVertex,
};
use super::plan;

/// Flattened graph elements collected while walking a result.
#[derive(Debug, Default)]
struct Elements {
    vertices: Vec<ParsedVertex>,
    edges: Vec<ParsedEdge>,
    paths: Vec<ParsedPath>,
}

/// Decode one native engine result.
///
/// Plans decode to their tabular or diagram form; everything else decodes
/// row by row, collecting every structural value into the flattened lists.
pub fn parse_result(result: &ResultSet) -> DecodeResult<ParsedResult> {
    if let Some(plan) = &result.plan {
        let mut parsed = plan::parse_plan(plan)?;
        parsed.time_cost = result.latency_us;
        parsed.namespace = result.namespace.clone();
        return Ok(parsed);
    }

    let mut elements = Elements::default();
    let mut rows = Vec::with_capacity(result.rows.len());

    for row in &result.rows {
        if row.len() != result.columns.len() {
            return Err(DecodeError::RowWidth {
                expected: result.columns.len(),
                found: row.len(),
            });
        }

        let mut parsed_row = ParsedRow::new();
        for (column, value) in result.columns.iter().zip(row) {
            let cell = decode_value(value, &mut elements)?;
            parsed_row.insert(column.clone(), cell);
        }
        rows.push(parsed_row);
    }

    Ok(ParsedResult {
        headers: result.columns.clone(),
        rows,
        vertices: elements.vertices,
        edges: elements.edges,
        paths: elements.paths,
        time_cost: result.latency_us,
        namespace: result.namespace.clone(),
    })
}

/// Decode a single value, pushing structural values into `elements`.
///
/// Structural values and containers keep their canonical text in the cell;
/// their decoded records live in the flattened lists.
fn decode_value(value: &Value, elements: &mut Elements) -> DecodeResult<JsonValue> {
    match value {
        Value::Vertex(vertex) => {
            let parsed = parse_vertex(vertex, elements)?;
            elements.vertices.push(parsed);
            Ok(JsonValue::String(value.to_string()))
        }
        Value::Edge(edge) => {
            let parsed = parse_edge(edge, elements)?;
            elements.edges.push(parsed);
            Ok(JsonValue::String(value.to_string()))
        }
        Value::Path(path) => {
            let parsed = parse_path(path)?;
            elements.paths.push(parsed);
            Ok(JsonValue::String(value.to_string()))
        }
        Value::List(items) | Value::Set(items) => {
            for item in items {
                decode_value(item, elements)?;
            }
            Ok(JsonValue::String(value.to_string()))
        }
        Value::Map(map) => {
            for item in map.values() {
                decode_value(item, elements)?;
            }
            Ok(JsonValue::String(value.to_string()))
        }
        scalar => decode_scalar(scalar),
    }
}

/// Decode a scalar value.
fn decode_scalar(value: &Value) -> DecodeResult<JsonValue> {
    let decoded = match value {
        Value::Empty => JsonValue::String(String::new()),
        Value::Null(kind) => JsonValue::String(kind.sentinel().to_string()),
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::Number((*i).into()),
        Value::Float(x) => match Number::from_f64(*x) {
            Some(n) => JsonValue::Number(n),
            None => JsonValue::String(value.to_string()),
        },
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Date(_) | Value::Time(_) | Value::DateTime(_) | Value::Duration(_) => {
            JsonValue::String(value.to_string())
        }
        Value::Geography(wkt) => JsonValue::String(wkt.clone()),
        Value::Unknown(tag) => {
            return Err(DecodeError::UnsupportedType { tag: tag.clone() });
        }
        other => {
            return Err(DecodeError::UnsupportedType {
                tag: other.kind().to_string(),
            });
        }
    };
    Ok(decoded)
}

fn decode_id(value: &Value) -> DecodeResult<JsonValue> {
    match value {
        Value::Int(i) => Ok(JsonValue::Number((*i).into())),
        Value::String(s) => Ok(JsonValue::String(s.clone())),
        other => Err(DecodeError::InvalidId {
            tag: other.kind().to_string(),
        }),
    }
}

fn decode_props(
    props: &Properties,
    elements: &mut Elements,
) -> DecodeResult<BTreeMap<String, JsonValue>> {
    let mut decoded = BTreeMap::new();
    for (key, value) in props {
        decoded.insert(key.clone(), decode_value(value, elements)?);
    }
    Ok(decoded)
}

fn parse_vertex(vertex: &Vertex, elements: &mut Elements) -> DecodeResult<ParsedVertex> {
    let vid = decode_id(&vertex.vid)?;
    let mut tags = Vec::with_capacity(vertex.tags.len());
    let mut properties = BTreeMap::new();

    for tag in &vertex.tags {
        tags.push(tag.name.clone());
        properties.insert(tag.name.clone(), decode_props(&tag.props, elements)?);
    }

    Ok(ParsedVertex {
        vid,
        tags,
        properties,
    })
}

fn parse_edge(edge: &Edge, elements: &mut Elements) -> DecodeResult<ParsedEdge> {
    let (src, dst) = edge.endpoints();
    Ok(ParsedEdge {
        src_id: decode_id(src)?,
        dst_id: decode_id(dst)?,
        edge_name: edge.name.clone(),
        rank: edge.ranking,
        properties: decode_props(&edge.props, elements)?,
    })
}

fn parse_path(path: &Path) -> DecodeResult<ParsedPath> {
    let mut relationships = Vec::with_capacity(path.steps.len());
    let mut prev = decode_id(&path.src.vid)?;

    for step in &path.steps {
        let next = decode_id(&step.dst.vid)?;
        let (src_id, dst_id) = if step.edge_type < 0 {
            (next.clone(), prev)
        } else {
            (prev, next.clone())
        };
        relationships.push(ParsedRelationship {
            src_id,
            dst_id,
            edge_name: step.name.clone(),
            rank: step.ranking,
        });
        prev = next;
    }

    let src_id = if relationships.is_empty() {
        Some(decode_id(&path.src.vid)?)
    } else {
        None
    };

    Ok(ParsedPath {
        src_id,
        relationships,
    })
}
