pub mod error;
pub mod jsonrpc;
pub mod metric;

pub use error::{MetrixError, Result};
pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use metric::{Ack, CryptPayload, Metric, MetricKind, MetricRecord, MetricValue};
