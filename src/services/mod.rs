pub mod generator;
pub mod pipeline;
pub mod sql_guard;
