//! Shared data model for the pipemon collector fleet.
//!
//! Every collector process links this crate for the [`types::MetricSample`]
//! and [`types::AlertRecord`] shapes that cross the storage boundary, plus
//! the snowflake ID generator used for row IDs and dedup tokens.

pub mod id;
pub mod types;
