pub mod prelude;

pub mod saved_queries;
pub mod scheduled_queries;
