//! Grouping queries over stored grade records.
//!
//! A [`ComparisonQuery`] names a scope (which courses), a metric, whether to
//! keep only regular faculty, and what to group by. The [`Engine`] resolves the
//! scope against the course collection, then runs one grouping query over the
//! grade collection and orders the groups from highest to lowest average.

pub mod engine;
pub mod types;
pub mod utility;

pub use engine::Engine;
pub use types::{ComparisonQuery, ComparisonReport, CourseOverviewRow, GroupBy, GroupStat, Scope};
pub use utility::mean;
