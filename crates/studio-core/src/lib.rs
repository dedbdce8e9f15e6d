//! Graph Studio Core
//!
//! Engine value model, result decoding and gateway configuration shared by
//! the session gateway and its front ends.

pub mod config;
pub mod error;
pub mod result;
pub mod value;

pub use config::GatewayConfig;
pub use error::{CoreError, CoreResult, DecodeError, DecodeResult};
pub use result::{parse_result, ParsedResult};
pub use value::{ResultSet, Value};
