pub mod record;
pub mod schedule;
