/*!
 * Monitoring
 * Guard lifecycle counters and tracing setup
 */

mod stats;
mod tracer;

pub use stats::{TimeoutStats, TimeoutStatsSnapshot};
pub use tracer::{init_tracing, TRACE_JSON_ENV};
