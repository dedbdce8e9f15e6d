//! Bolt protocol backend built on `neo4rs`.
//!
//! `neo4rs` pools connections itself and has no notion of a signed-in
//! session, so a session here is a `Graph` bound to one database. `USE`
//! statements are answered locally by rebinding that graph and checking the
//! new database answers.
//!
//! The driver has no idle timeout for its connections, so
//! [`PoolOptions::idle_timeout`] is not used by this backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use neo4rs::{BoltNode, BoltPath, BoltType, ConfigBuilder, Graph, Query};
use studio_core::value::{self, Edge, NullKind, Path, Properties, Step, Tag, Vertex};
use studio_core::{ResultSet, Value};
use tokio::net::TcpStream;
use tracing::debug;

use crate::engine::{ConnectionPool, Connector, EngineError, EngineSession, HostAddr, PoolOptions};

const DEFAULT_DATABASE: &str = "neo4j";
const FETCH_SIZE: usize = 200;

/// Opens [`BoltPool`]s.
#[derive(Debug, Clone, Default)]
pub struct BoltConnector;

#[async_trait]
impl Connector for BoltConnector {
    async fn open_pool(
        &self,
        hosts: &[HostAddr],
        options: &PoolOptions,
    ) -> Result<Arc<dyn ConnectionPool>, EngineError> {
        let host = hosts
            .first()
            .cloned()
            .ok_or_else(|| EngineError::Transport("no engine host given".to_string()))?;
        debug!(
            host = %host,
            idle_timeout_secs = options.idle_timeout.as_secs(),
            "Opening bolt pool; driver keeps its own connection lifetimes"
        );
        Ok(Arc::new(BoltPool {
            host,
            max_connections: options.max_connections,
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct BoltPool {
    host: HostAddr,
    max_connections: usize,
    closed: AtomicBool,
}

impl BoltPool {
    fn uri(&self) -> String {
        format!("bolt://{}", self.host)
    }
}

#[async_trait]
impl ConnectionPool for BoltPool {
    async fn ping(&self, host: &HostAddr, timeout: Duration) -> Result<(), EngineError> {
        let addr = host.to_string();
        match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(EngineError::Transport(e.to_string())),
            Err(_) => Err(EngineError::Transport(format!(
                "no answer from {addr} within {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn get_session(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Box<dyn EngineSession>, EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed("connection pool"));
        }
        let mut session = BoltSession {
            uri: self.uri(),
            username: username.to_string(),
            password: password.to_string(),
            max_connections: self.max_connections,
            database: DEFAULT_DATABASE.to_string(),
            graph: None,
        };
        // The driver connects lazily; a cheap query forces the handshake so
        // bad credentials fail here.
        session.execute("RETURN 1").await?;
        Ok(Box::new(session))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(host = %self.host, "Bolt pool closed");
        }
    }
}

pub struct BoltSession {
    uri: String,
    username: String,
    password: String,
    max_connections: usize,
    database: String,
    graph: Option<Graph>,
}

impl BoltSession {
    async fn graph(&mut self) -> Result<Graph, EngineError> {
        if let Some(graph) = &self.graph {
            return Ok(graph.clone());
        }
        let config = ConfigBuilder::default()
            .uri(&self.uri)
            .user(&self.username)
            .password(&self.password)
            .db(self.database.as_str())
            .max_connections(self.max_connections)
            .fetch_size(FETCH_SIZE)
            .build()
            .map_err(engine_error)?;
        let graph = Graph::connect(config).await.map_err(engine_error)?;
        self.graph = Some(graph.clone());
        Ok(graph)
    }

    async fn run(&mut self, statement: &str) -> Result<ResultSet, EngineError> {
        let started = Instant::now();
        let graph = self.graph().await?;
        let mut stream = graph
            .execute(Query::new(statement.to_string()))
            .await
            .map_err(engine_error)?;

        let mut records: Vec<HashMap<String, BoltType>> = Vec::new();
        while let Some(row) = stream.next().await.map_err(engine_error)? {
            let record = row
                .to::<HashMap<String, BoltType>>()
                .map_err(|e| EngineError::statement(-1, e.to_string()))?;
            records.push(record);
        }

        let mut result = rows_to_result(records);
        result.latency_us = started.elapsed().as_micros() as i64;
        result.namespace = Some(self.database.clone());
        Ok(result)
    }

    /// Bind the session to `database`. The old binding is kept when the new
    /// database does not answer.
    async fn switch_database(&mut self, database: String) -> Result<(), EngineError> {
        if database == self.database && self.graph.is_some() {
            return Ok(());
        }
        let previous_database = std::mem::replace(&mut self.database, database);
        let previous_graph = self.graph.take();

        // Graph::connect does no I/O, so ask the new database something.
        if let Err(err) = self.run("RETURN 1").await {
            debug!(database = %self.database, error = %err, "Database switch rejected");
            self.database = previous_database;
            self.graph = previous_graph;
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl EngineSession for BoltSession {
    async fn execute(&mut self, statement: &str) -> Result<ResultSet, EngineError> {
        if let Some(database) = parse_use(statement) {
            self.switch_database(database).await?;
            return Ok(ResultSet {
                namespace: Some(self.database.clone()),
                ..Default::default()
            });
        }
        self.run(statement).await
    }

    async fn release(self: Box<Self>) {
        debug!(uri = %self.uri, "Bolt session released");
    }
}

fn engine_error(err: neo4rs::Error) -> EngineError {
    match &err {
        neo4rs::Error::AuthenticationError(message) => EngineError::Auth(message.clone()),
        neo4rs::Error::IOError { .. } | neo4rs::Error::ConnectionError => {
            EngineError::Transport(err.to_string())
        }
        _ => EngineError::statement(-1, err.to_string()),
    }
}

/// Database named by a `USE` statement, if that is what `statement` is.
fn parse_use(statement: &str) -> Option<String> {
    let trimmed = statement.trim().trim_end_matches(';').trim();
    let (keyword, rest) = trimmed.split_once(char::is_whitespace)?;
    if !keyword.eq_ignore_ascii_case("USE") {
        return None;
    }
    let name = rest.trim();
    let name = name
        .strip_prefix('`')
        .and_then(|n| n.strip_suffix('`'))
        .map(|n| n.replace("\\`", "`"))
        .unwrap_or_else(|| name.to_string());
    (!name.is_empty()).then_some(name)
}

/// Bolt records are maps, so column order is lost; columns come back sorted.
fn rows_to_result(records: Vec<HashMap<String, BoltType>>) -> ResultSet {
    let mut columns: Vec<String> = records
        .first()
        .map(|record| record.keys().cloned().collect())
        .unwrap_or_default();
    columns.sort();

    let rows = records
        .into_iter()
        .map(|mut record| {
            columns
                .iter()
                .map(|column| record.remove(column).map(bolt_value).unwrap_or(Value::Empty))
                .collect()
        })
        .collect();
    ResultSet::table(columns, rows)
}

fn bolt_props(map: neo4rs::BoltMap) -> Properties {
    map.value
        .into_iter()
        .map(|(key, value)| (key.value, bolt_value(value)))
        .collect()
}

fn bolt_vertex(node: BoltNode) -> Vertex {
    let labels: Vec<String> = node
        .labels
        .value
        .into_iter()
        .filter_map(|label| match label {
            BoltType::String(s) => Some(s.value),
            _ => None,
        })
        .collect();
    let props = bolt_props(node.properties);
    let mut tags: Vec<Tag> = labels
        .into_iter()
        .map(|name| Tag {
            name,
            props: Properties::new(),
        })
        .collect();
    match tags.first_mut() {
        Some(first) => first.props = props,
        None => tags.push(Tag {
            name: String::new(),
            props,
        }),
    }
    Vertex {
        vid: Box::new(Value::Int(node.id.value)),
        tags,
    }
}

/// Rebuild a path from Bolt's packed form.
///
/// `indices` alternates a 1-based relationship index, negative when the hop
/// runs against the relationship, and a 0-based index into `nodes`. A path
/// that does not follow that layout is reported as an unknown `path`.
fn bolt_path(path: BoltPath) -> Value {
    let nodes: Vec<Vertex> = path.nodes().into_iter().map(bolt_vertex).collect();
    let rels = path.rels();
    let indices: Vec<i64> = path.indices().into_iter().map(|i| i.value).collect();

    let Some(src) = nodes.first().cloned() else {
        return Value::Unknown("path".to_string());
    };
    if indices.len() % 2 != 0 {
        return Value::Unknown("path".to_string());
    }

    let mut steps = Vec::with_capacity(indices.len() / 2);
    for hop in indices.chunks_exact(2) {
        let (rel_index, node_index) = (hop[0], hop[1]);
        let rel = usize::try_from(rel_index.unsigned_abs())
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| rels.get(i));
        let dst = usize::try_from(node_index).ok().and_then(|i| nodes.get(i));
        let (Some(rel), Some(dst)) = (rel, dst) else {
            return Value::Unknown("path".to_string());
        };
        steps.push(Step {
            dst: dst.clone(),
            edge_type: if rel_index < 0 { -1 } else { 1 },
            name: rel.typ.value.clone(),
            ranking: 0,
            props: bolt_props(rel.properties.clone()),
        });
    }
    Value::Path(Path { src, steps })
}

fn date_of(date: NaiveDate) -> value::Date {
    value::Date {
        year: date.year() as i16,
        month: date.month() as i8,
        day: date.day() as i8,
    }
}

fn time_of(time: NaiveTime) -> value::Time {
    value::Time {
        hour: time.hour() as i8,
        minute: time.minute() as i8,
        sec: time.second() as i8,
        microsec: (time.nanosecond() / 1_000) as i32,
    }
}

fn datetime_value(datetime: NaiveDateTime) -> Value {
    Value::DateTime(value::DateTime {
        date: date_of(datetime.date()),
        time: time_of(datetime.time()),
    })
}

/// Temporal values the driver cannot represent come back as bad data.
fn bad_data<E>(_: E) -> Value {
    Value::Null(NullKind::BadData)
}

fn bolt_value(bolt: BoltType) -> Value {
    match bolt {
        BoltType::Null(_) => Value::Null(NullKind::Null),
        BoltType::Boolean(b) => Value::Bool(b.value),
        BoltType::Integer(i) => Value::Int(i.value),
        BoltType::Float(f) => Value::Float(f.value),
        BoltType::String(s) => Value::String(s.value),
        BoltType::List(list) => Value::List(list.value.into_iter().map(bolt_value).collect()),
        BoltType::Map(map) => Value::Map(bolt_props(map)),
        BoltType::Node(node) => Value::Vertex(bolt_vertex(node)),
        BoltType::Relation(rel) => {
            let mut edge = Edge::new(
                Value::Int(rel.start_node_id.value),
                Value::Int(rel.end_node_id.value),
                rel.typ.value,
                0,
            );
            edge.props = bolt_props(rel.properties);
            Value::Edge(edge)
        }
        BoltType::Path(path) => bolt_path(path),
        BoltType::Date(date) => {
            TryInto::<NaiveDate>::try_into(date).map_or_else(bad_data, |d| Value::Date(date_of(d)))
        }
        BoltType::Time(time) => {
            let (time, _offset): (NaiveTime, FixedOffset) = time.into();
            Value::Time(time_of(time))
        }
        BoltType::LocalTime(time) => Value::Time(time_of(NaiveTime::from(time))),
        BoltType::DateTime(datetime) => {
            TryInto::<chrono::DateTime<FixedOffset>>::try_into(datetime)
                .map_or_else(bad_data, |dt| datetime_value(dt.naive_utc()))
        }
        BoltType::LocalDateTime(datetime) => {
            TryInto::<NaiveDateTime>::try_into(datetime).map_or_else(bad_data, datetime_value)
        }
        BoltType::DateTimeZoneId(datetime) => {
            TryInto::<(NaiveDateTime, String)>::try_into(datetime)
                .map_or_else(bad_data, |(dt, _zone)| datetime_value(dt))
        }
        BoltType::Duration(duration) => {
            let duration = std::time::Duration::from(duration);
            Value::Duration(value::Duration {
                seconds: duration.as_secs() as i64,
                microseconds: duration.subsec_micros() as i32,
                months: 0,
            })
        }
        BoltType::Point2D(point) => {
            Value::Geography(format!("POINT({} {})", point.x.value, point.y.value))
        }
        BoltType::Point3D(point) => Value::Geography(format!(
            "POINT Z({} {} {})",
            point.x.value, point.y.value, point.z.value
        )),
        BoltType::UnboundedRelation(_) => Value::Unknown("unbounded_relation".to_string()),
        BoltType::Bytes(_) => Value::Unknown("bytes".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use neo4rs::{
        BoltDate, BoltDateTime, BoltDuration, BoltFloat, BoltInteger, BoltList, BoltMap,
        BoltPoint2D, BoltString, BoltTime, BoltUnboundedRelation,
    };
    use studio_core::parse_result;

    fn node(id: i64, label: &str) -> BoltType {
        let mut props = BoltMap::new();
        props.put(BoltString::from("name"), BoltType::String(BoltString::from(label)));
        BoltType::Node(BoltNode::new(
            BoltInteger::new(id),
            BoltList::from(vec![BoltType::String(BoltString::from(label))]),
            props,
        ))
    }

    fn rel(id: i64, typ: &str) -> BoltType {
        BoltType::UnboundedRelation(BoltUnboundedRelation::new(
            BoltInteger::new(id),
            BoltString::from(typ),
            BoltMap::new(),
        ))
    }

    fn ints(values: &[i64]) -> BoltList {
        BoltList::from(
            values
                .iter()
                .map(|v| BoltType::Integer(BoltInteger::new(*v)))
                .collect::<Vec<_>>(),
        )
    }

    fn single(value: Value) -> ResultSet {
        ResultSet::table(vec!["p".into()], vec![vec![value]])
    }

    #[test]
    fn test_parse_use() {
        assert_eq!(parse_use("USE `movies`"), Some("movies".to_string()));
        assert_eq!(parse_use("use movies;"), Some("movies".to_string()));
        assert_eq!(parse_use("MATCH (n) RETURN n"), None);
        assert_eq!(parse_use("USER"), None);
    }

    #[test]
    fn test_single_node_path_is_collected() {
        let path = BoltType::Path(BoltPath {
            nodes: BoltList::from(vec![node(1, "Person")]),
            rels: BoltList::new(),
            indices: BoltList::new(),
        });
        let value = bolt_value(path);
        assert!(matches!(value, Value::Path(_)));

        let parsed = parse_result(&single(value)).unwrap();
        assert_eq!(parsed.paths.len(), 1);
        assert_eq!(parsed.paths[0].src_id, Some(serde_json::json!(1)));
    }

    #[test]
    fn test_path_hops_keep_direction() {
        // (1)-[:KNOWS]->(2)<-[:LIKES]-(3)
        let path = BoltType::Path(BoltPath {
            nodes: BoltList::from(vec![node(1, "A"), node(2, "B"), node(3, "C")]),
            rels: BoltList::from(vec![rel(10, "KNOWS"), rel(11, "LIKES")]),
            indices: ints(&[1, 1, -2, 2]),
        });
        let Value::Path(path) = bolt_value(path) else {
            panic!("expected a path");
        };
        assert_eq!(path.src.vid.as_int(), Some(1));
        assert_eq!(path.steps.len(), 2);
        assert_eq!(path.steps[0].name, "KNOWS");
        assert_eq!(path.steps[0].edge_type, 1);
        assert_eq!(path.steps[0].dst.vid.as_int(), Some(2));
        assert_eq!(path.steps[1].name, "LIKES");
        assert_eq!(path.steps[1].edge_type, -1);
        assert_eq!(path.steps[1].dst.vid.as_int(), Some(3));

        let parsed = parse_result(&single(Value::Path(path))).unwrap();
        let hops = &parsed.paths[0].relationships;
        assert_eq!(hops[1].src_id, serde_json::json!(3));
        assert_eq!(hops[1].dst_id, serde_json::json!(2));
    }

    #[test]
    fn test_malformed_path_fails_decoding() {
        let path = BoltType::Path(BoltPath {
            nodes: BoltList::from(vec![node(1, "A")]),
            rels: BoltList::new(),
            indices: ints(&[1, 0]),
        });
        let value = bolt_value(path);
        assert_eq!(value, Value::Unknown("path".to_string()));
        assert!(parse_result(&single(value)).is_err());
    }

    #[test]
    fn test_temporal_values() {
        let date = NaiveDate::from_ymd_opt(2021, 3, 14).unwrap();
        assert_eq!(
            bolt_value(BoltType::Date(BoltDate::from(date))),
            Value::Date(value::Date {
                year: 2021,
                month: 3,
                day: 14,
            })
        );

        let time = NaiveTime::from_hms_micro_opt(9, 26, 53, 589_000).unwrap();
        let offset = FixedOffset::east_opt(3600).unwrap();
        assert_eq!(
            bolt_value(BoltType::Time(BoltTime::from((time, offset)))),
            Value::Time(value::Time {
                hour: 9,
                minute: 26,
                sec: 53,
                microsec: 589_000,
            })
        );

        let datetime = offset.with_ymd_and_hms(2021, 3, 14, 10, 0, 0).unwrap();
        let decoded = bolt_value(BoltType::DateTime(BoltDateTime::from(datetime)));
        let Value::DateTime(decoded) = decoded else {
            panic!("expected a datetime");
        };
        assert_eq!(decoded.date.day, 14);
        assert_eq!(decoded.time.hour, 9);

        let duration = std::time::Duration::from_millis(90_500);
        assert_eq!(
            bolt_value(BoltType::Duration(BoltDuration::from(duration))),
            Value::Duration(value::Duration {
                seconds: 90,
                microseconds: 500_000,
                months: 0,
            })
        );
    }

    #[test]
    fn test_point_is_geography() {
        let point = BoltType::Point2D(BoltPoint2D {
            sr_id: BoltInteger::new(7203),
            x: BoltFloat::new(1.5),
            y: BoltFloat::new(-2.0),
        });
        assert_eq!(bolt_value(point), Value::Geography("POINT(1.5 -2)".to_string()));
    }

    #[test]
    fn test_unmapped_type_names_its_tag() {
        let value = bolt_value(rel(3, "KNOWS"));
        assert_eq!(value, Value::Unknown("unbounded_relation".to_string()));
        let err = parse_result(&single(value)).unwrap_err();
        assert!(err.to_string().contains("unbounded_relation"));
    }

    #[tokio::test]
    async fn test_use_fails_when_database_does_not_answer() {
        let mut session = BoltSession {
            uri: "bolt://127.0.0.1:1".to_string(),
            username: "neo4j".to_string(),
            password: "secret".to_string(),
            max_connections: 1,
            database: DEFAULT_DATABASE.to_string(),
            graph: None,
        };
        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            session.execute("USE `no_such_database`"),
        )
        .await
        .expect("switch must not hang");
        assert!(outcome.is_err());
        assert_eq!(session.database, DEFAULT_DATABASE);
    }
}
