//! Component G: the disjoint multi-path query engine.

mod engine;
mod path;
mod types;

pub use engine::run;
pub use path::ClaimSet;
pub use types::{CancelToken, PathOutcome, PathStep, QueryConfig, QueryFn, QueryId, QueryOutcome};
