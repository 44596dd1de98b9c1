pub use super::saved_queries::Entity as SavedQueries;
pub use super::scheduled_queries::Entity as ScheduledQueries;
