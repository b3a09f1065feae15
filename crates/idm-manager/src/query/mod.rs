//! Query evaluation over materialized regions.

mod engine;
mod order;
pub(crate) mod relationship;
