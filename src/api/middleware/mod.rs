pub mod metrics;
pub mod trace_id;

pub use metrics::metrics_middleware;
pub use trace_id::{trace_id_middleware, TraceId};
