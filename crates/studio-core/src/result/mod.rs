//! Decoding of native engine results into [`ParsedResult`].

mod decode;
pub mod model;
mod plan;

pub use decode::parse_result;
pub use model::{
    ParsedEdge, ParsedPath, ParsedRelationship, ParsedResult, ParsedRow, ParsedVertex,
};
pub use plan::{DIAGRAM_HEADER, PLAN_HEADERS};
