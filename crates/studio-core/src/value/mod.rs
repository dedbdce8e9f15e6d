//! Engine-native value model.
//!
//! Engine client backends convert their wire values into these types so the
//! rest of the gateway never depends on a particular driver. The model follows
//! the graph engine's value union: scalars, typed nulls, temporal values,
//! structural graph values and containers.

mod display;

use std::collections::BTreeMap;

/// Property map of a vertex tag or an edge.
pub type Properties = BTreeMap<String, Value>;

/// One value as returned by the graph engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The engine's "no value" marker (distinct from null).
    Empty,
    Null(NullKind),
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(Date),
    Time(Time),
    DateTime(DateTime),
    Duration(Duration),
    /// Geography value in WKT form.
    Geography(String),
    Vertex(Vertex),
    Edge(Edge),
    Path(Path),
    List(Vec<Value>),
    /// Elements are unique; the engine deduplicates before sending.
    Set(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// A wire type the backend received but has no mapping for.
    Unknown(String),
}

/// Null subtypes reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullKind {
    Null,
    NaN,
    BadData,
    BadType,
    ErrOverflow,
    UnknownProp,
    DivByZero,
    OutOfRange,
}

impl NullKind {
    /// Sentinel string used in decoded output.
    pub fn sentinel(&self) -> &'static str {
        match self {
            NullKind::Null => "NULL",
            NullKind::NaN => "NaN",
            NullKind::BadData => "BAD_DATA",
            NullKind::BadType => "BAD_TYPE",
            NullKind::ErrOverflow => "ERR_OVERFLOW",
            NullKind::UnknownProp => "UNKNOWN_PROP",
            NullKind::DivByZero => "DIV_BY_ZERO",
            NullKind::OutOfRange => "OUT_OF_RANGE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
    pub year: i16,
    pub month: i8,
    pub day: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time {
    pub hour: i8,
    pub minute: i8,
    pub sec: i8,
    pub microsec: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    pub date: Date,
    pub time: Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duration {
    pub seconds: i64,
    pub microseconds: i32,
    pub months: i32,
}

/// A tag (label) attached to a vertex together with its properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub props: Properties,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    /// Vertex id; the engine uses either integer or string ids.
    pub vid: Box<Value>,
    pub tags: Vec<Tag>,
}

/// An edge as stored by the engine.
///
/// `edge_type` carries direction in its sign: a negative type means the edge
/// was read in reverse, so `src`/`dst` are swapped relative to the stored edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub src: Box<Value>,
    pub dst: Box<Value>,
    pub edge_type: i32,
    pub name: String,
    pub ranking: i64,
    pub props: Properties,
}

/// One hop of a path, from the previous vertex to `dst`.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub dst: Vertex,
    pub edge_type: i32,
    pub name: String,
    pub ranking: i64,
    pub props: Properties,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub src: Vertex,
    pub steps: Vec<Step>,
}

/// Type tag of a [`Value`], used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Empty,
    Null,
    Bool,
    Int,
    Float,
    String,
    Date,
    Time,
    DateTime,
    Duration,
    Geography,
    Vertex,
    Edge,
    Path,
    List,
    Set,
    Map,
    Unknown,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Empty => "empty",
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Date => "date",
            ValueKind::Time => "time",
            ValueKind::DateTime => "datetime",
            ValueKind::Duration => "duration",
            ValueKind::Geography => "geography",
            ValueKind::Vertex => "vertex",
            ValueKind::Edge => "edge",
            ValueKind::Path => "path",
            ValueKind::List => "list",
            ValueKind::Set => "set",
            ValueKind::Map => "map",
            ValueKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Empty => ValueKind::Empty,
            Value::Null(_) => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::Date(_) => ValueKind::Date,
            Value::Time(_) => ValueKind::Time,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::Duration(_) => ValueKind::Duration,
            Value::Geography(_) => ValueKind::Geography,
            Value::Vertex(_) => ValueKind::Vertex,
            Value::Edge(_) => ValueKind::Edge,
            Value::Path(_) => ValueKind::Path,
            Value::List(_) => ValueKind::List,
            Value::Set(_) => ValueKind::Set,
            Value::Map(_) => ValueKind::Map,
            Value::Unknown(_) => ValueKind::Unknown,
        }
    }

    /// Shorthand for a string value.
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl Vertex {
    pub fn new(vid: Value) -> Self {
        Self {
            vid: Box::new(vid),
            tags: Vec::new(),
        }
    }

    /// Attach a tag with properties.
    pub fn with_tag(mut self, name: impl Into<String>, props: Properties) -> Self {
        self.tags.push(Tag {
            name: name.into(),
            props,
        });
        self
    }
}

impl Edge {
    pub fn new(src: Value, dst: Value, name: impl Into<String>, ranking: i64) -> Self {
        Self {
            src: Box::new(src),
            dst: Box::new(dst),
            edge_type: 1,
            name: name.into(),
            ranking,
            props: Properties::new(),
        }
    }

    /// Source and destination in stored-edge direction.
    pub fn endpoints(&self) -> (&Value, &Value) {
        if self.edge_type < 0 {
            (&self.dst, &self.src)
        } else {
            (&self.src, &self.dst)
        }
    }
}

/// Execution plan attached to an `EXPLAIN`/`PROFILE` result.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanDescription {
    /// `row`, `dot` or `dot:struct`.
    pub format: String,
    pub nodes: Vec<PlanNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    pub id: i64,
    pub name: String,
    pub output_var: String,
    pub dependencies: Vec<i64>,
    /// Operator description as key/value pairs.
    pub description: Vec<(String, String)>,
    pub profiles: Vec<ProfilingStats>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfilingStats {
    pub rows: i64,
    pub exec_duration_us: i64,
    pub total_duration_us: i64,
}

/// One native engine result for a single statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Engine-side latency in microseconds.
    pub latency_us: i64,
    /// Namespace the session is in after the statement, if reported.
    pub namespace: Option<String>,
    pub plan: Option<PlanDescription>,
}

impl ResultSet {
    /// A result with columns and rows.
    pub fn table(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.plan.is_none()
    }
}
