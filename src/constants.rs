/// Service name used for secrets in the OS credential store.
pub const KEYRING_SERVICE: &str = "sqlpilot";

pub mod limits {

    pub const MAX_TABLES_PER_QUERY: usize = 10;

    pub const MAX_QUESTION_LENGTH: usize = 1000;

    pub const DEFAULT_HISTORY_LIMIT: u64 = 50;
}

pub mod schedule {

    /// All schedules are interpreted in this timezone, independent of the
    /// host clock.
    pub const TIMEZONE: chrono_tz::Tz = chrono_tz::Europe::Istanbul;

    /// Fires discovered late (process was asleep or restarted) but within
    /// this window are still executed; anything later is skipped.
    pub const MISFIRE_GRACE_SECS: i64 = 3600;
}
