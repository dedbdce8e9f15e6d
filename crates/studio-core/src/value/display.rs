//! Canonical text rendering of engine values.
//!
//! Matches the console notation of the graph engine so that row cells holding
//! structural values read the same as in the engine's own shell.

use std::fmt::{self, Display, Formatter, Write};

use super::{Date, DateTime, Duration, Edge, Path, Properties, Time, Value, Vertex};

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => f.write_str("__EMPTY__"),
            Value::Null(kind) => f.write_str(kind.sentinel()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write_float(f, *x),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Time(t) => write!(f, "{t}"),
            Value::DateTime(dt) => write!(f, "{dt}"),
            Value::Duration(d) => write!(f, "{d}"),
            Value::Geography(wkt) => f.write_str(wkt),
            Value::Vertex(v) => write!(f, "{v}"),
            Value::Edge(e) => write!(f, "{e}"),
            Value::Path(p) => write!(f, "{p}"),
            Value::List(items) => write_seq(f, "[", items, "]"),
            Value::Set(items) => write_seq(f, "{", items, "}"),
            Value::Map(map) => {
                f.write_char('{')?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_char('}')
            }
            Value::Unknown(tag) => write!(f, "<{tag}>"),
        }
    }
}

fn write_float(f: &mut Formatter<'_>, x: f64) -> fmt::Result {
    if x.is_nan() {
        f.write_str("NaN")
    } else if x.is_infinite() {
        f.write_str(if x > 0.0 { "inf" } else { "-inf" })
    } else if x.fract() == 0.0 && x.abs() < 1e15 {
        write!(f, "{x:.1}")
    } else {
        write!(f, "{x}")
    }
}

fn write_seq(f: &mut Formatter<'_>, open: &str, items: &[Value], close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(close)
}

fn write_props(f: &mut Formatter<'_>, props: &Properties) -> fmt::Result {
    f.write_char('{')?;
    for (i, (k, v)) in props.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{k}: {v}")?;
    }
    f.write_char('}')
}

impl Display for Date {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl Display for Time {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}.{:06}",
            self.hour, self.minute, self.sec, self.microsec
        )
    }
}

impl Display for DateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}T{}", self.date, self.time)
    }
}

impl Display for Duration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P{}MT{}.{:06}S",
            self.months, self.seconds, self.microseconds
        )
    }
}

impl Display for Vertex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.vid)?;
        for tag in &self.tags {
            write!(f, " :{}", tag.name)?;
            write_props(f, &tag.props)?;
        }
        f.write_char(')')
    }
}

impl Display for Edge {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (left, right) = if self.edge_type < 0 {
            ("<-", "-")
        } else {
            ("-", "->")
        };
        write!(f, "({}){left}[:{}@{}", self.src, self.name, self.ranking)?;
        write_props(f, &self.props)?;
        write!(f, "]{right}({})", self.dst)
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.src)?;
        for step in &self.steps {
            let (left, right) = if step.edge_type < 0 {
                ("<-", "-")
            } else {
                ("-", "->")
            };
            write!(f, "{left}[:{}@{}", step.name, step.ranking)?;
            write_props(f, &step.props)?;
            write!(f, "]{right}{}", step.dst)?;
        }
        f.write_char('>')
    }
}

#[cfg(test)]
mod tests {
    use super::super::*;

    fn props(pairs: &[(&str, Value)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_scalars() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::string("Tim").to_string(), "\"Tim\"");
        assert_eq!(Value::Null(NullKind::DivByZero).to_string(), "DIV_BY_ZERO");
        assert_eq!(Value::Empty.to_string(), "__EMPTY__");
    }

    #[test]
    fn test_temporal() {
        let date = Date { year: 2024, month: 3, day: 7 };
        let time = Time { hour: 9, minute: 5, sec: 0, microsec: 12 };
        assert_eq!(Value::Date(date).to_string(), "2024-03-07");
        assert_eq!(Value::Time(time).to_string(), "09:05:00.000012");
        assert_eq!(
            Value::DateTime(DateTime { date, time }).to_string(),
            "2024-03-07T09:05:00.000012"
        );
    }

    #[test]
    fn test_vertex_and_edge() {
        let v = Vertex::new(Value::string("player100"))
            .with_tag("player", props(&[("age", Value::Int(42)), ("name", Value::string("Tim"))]));
        assert_eq!(v.to_string(), "(\"player100\" :player{age: 42, name: \"Tim\"})");

        let mut e = Edge::new(Value::string("a"), Value::string("b"), "follow", 0);
        assert_eq!(e.to_string(), "(\"a\")-[:follow@0{}]->(\"b\")");
        e.edge_type = -1;
        assert_eq!(e.to_string(), "(\"a\")<-[:follow@0{}]-(\"b\")");
    }

    #[test]
    fn test_containers() {
        let list = Value::List(vec![Value::Int(1), Value::string("x")]);
        assert_eq!(list.to_string(), "[1, \"x\"]");
        let set = Value::Set(vec![Value::Int(1)]);
        assert_eq!(set.to_string(), "{1}");
        let map = Value::Map(props(&[("k", Value::Bool(true))]));
        assert_eq!(map.to_string(), "{k: true}");
    }

    #[test]
    fn test_path() {
        let path = Path {
            src: Vertex::new(Value::Int(1)),
            steps: vec![Step {
                dst: Vertex::new(Value::Int(2)),
                edge_type: 3,
                name: "like".to_string(),
                ranking: 0,
                props: Properties::new(),
            }],
        };
        assert_eq!(path.to_string(), "<(1)-[:like@0{}]->(2)>");
    }
}
