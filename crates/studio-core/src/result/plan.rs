//! Decoding of `EXPLAIN` / `PROFILE` execution plans.

use std::collections::HashMap;
use std::fmt::Write;

use serde_json::{json, Value as JsonValue};

use crate::error::{DecodeError, DecodeResult};
use crate::value::{PlanDescription, PlanNode, ProfilingStats};

use super::model::{ParsedResult, ParsedRow};

/// Column headers of a tabular plan.
pub const PLAN_HEADERS: [&str; 5] = [
    "id",
    "name",
    "dependencies",
    "profiling data",
    "operator info",
];

/// Header of the single column used for diagram plans.
pub const DIAGRAM_HEADER: &str = "format";

pub(crate) fn parse_plan(plan: &PlanDescription) -> DecodeResult<ParsedResult> {
    match plan.format.as_str() {
        "" | "row" => Ok(plan_table(plan)),
        "dot" => Ok(diagram(render_dot(plan, false))),
        "dot:struct" => Ok(diagram(render_dot(plan, true))),
        other => Err(DecodeError::UnsupportedPlanFormat(other.to_string())),
    }
}

fn plan_table(plan: &PlanDescription) -> ParsedResult {
    let rows = plan
        .nodes
        .iter()
        .map(|node| {
            let mut row = ParsedRow::new();
            row.insert("id".to_string(), json!(node.id));
            row.insert("name".to_string(), json!(node.name));
            row.insert(
                "dependencies".to_string(),
                json!(join_ids(&node.dependencies)),
            );
            row.insert(
                "profiling data".to_string(),
                json!(profiling_data(&node.profiles)),
            );
            row.insert("operator info".to_string(), json!(operator_info(node)));
            row
        })
        .collect();

    ParsedResult {
        headers: PLAN_HEADERS.iter().map(|h| h.to_string()).collect(),
        rows,
        ..Default::default()
    }
}

fn diagram(text: String) -> ParsedResult {
    let mut row = ParsedRow::new();
    row.insert(DIAGRAM_HEADER.to_string(), JsonValue::String(text));
    ParsedResult {
        headers: vec![DIAGRAM_HEADER.to_string()],
        rows: vec![row],
        ..Default::default()
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn profile_json(stats: &ProfilingStats) -> JsonValue {
    json!({
        "rows": stats.rows,
        "execTime": format!("{}(us)", stats.exec_duration_us),
        "totalTime": format!("{}(us)", stats.total_duration_us),
    })
}

/// A single profile renders as an object, several (one per version) as a list.
fn profiling_data(profiles: &[ProfilingStats]) -> String {
    match profiles {
        [] => String::new(),
        [single] => profile_json(single).to_string(),
        many => JsonValue::Array(many.iter().map(profile_json).collect()).to_string(),
    }
}

fn operator_info(node: &PlanNode) -> String {
    let mut lines = vec![format!("outputVar: {}", node.output_var)];
    lines.extend(node.description.iter().map(|(k, v)| format!("{k}: {v}")));
    lines.join("\n")
}

fn node_key(node: &PlanNode) -> String {
    format!("{}_{}", node.name, node.id)
}

fn escape_label(s: &str, record: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '{' | '}' | '|' | '<' | '>' if record => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\l"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the plan as a Graphviz digraph, data flowing bottom to top.
fn render_dot(plan: &PlanDescription, with_details: bool) -> String {
    let by_id: HashMap<i64, &PlanNode> = plan.nodes.iter().map(|n| (n.id, n)).collect();
    let mut out = String::from("digraph exec_plan {\n\trankdir=BT;\n");

    for node in &plan.nodes {
        let key = node_key(node);
        if with_details {
            let details = escape_label(&operator_info(node), true);
            let _ = writeln!(
                out,
                "\t\"{key}\"[label=\"{{{}|{details}\\l}}\", shape=Mrecord];",
                escape_label(&key, true)
            );
        } else {
            let _ = writeln!(
                out,
                "\t\"{key}\"[label=\"{}\", shape=box];",
                escape_label(&key, false)
            );
        }
    }

    for node in &plan.nodes {
        for dep in &node.dependencies {
            let from = by_id
                .get(dep)
                .map(|n| node_key(n))
                .unwrap_or_else(|| dep.to_string());
            let _ = writeln!(out, "\t\"{from}\"->\"{}\";", node_key(node));
        }
    }

    out.push('}');
    out
}
