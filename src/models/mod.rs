pub mod query;
pub mod schedule;
