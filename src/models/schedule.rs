use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Unsupported schedule type: {0}")]
    UnsupportedType(String),

    #[error("Invalid schedule time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("Invalid schedule day {day} for {kind} schedule")]
    InvalidDay { kind: &'static str, day: i32 },

    #[error("Custom schedule requires a cron expression")]
    MissingCron,

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("Scheduled query {0} not found")]
    NotFound(i32),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

/// Time of day in the scheduler's fixed timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    /// Default fire time used when daily/weekly/monthly schedules omit one.
    pub const NINE_AM: Self = Self { hour: 9, minute: 0 };

    pub fn parse(value: &str) -> Result<Self, ScheduleError> {
        let invalid = || ScheduleError::InvalidTime(value.to_string());

        let (h, m) = value.split_once(':').ok_or_else(invalid)?;
        let hour: u8 = h.trim().parse().map_err(|_| invalid())?;
        let minute: u8 = m.trim().parse().map_err(|_| invalid())?;

        if hour > 23 || minute > 59 {
            return Err(invalid());
        }

        Ok(Self { hour, minute })
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// A validated schedule specification.
///
/// Each variant carries only the fields its schedule type needs, so an
/// inconsistent combination (e.g. a weekly schedule without a valid weekday)
/// is rejected when the spec is built, not when the job fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleSpec {
    /// Minute 0 of every hour.
    Hourly,
    Daily {
        time: TimeOfDay,
    },
    /// `weekday` is 0-6 with Monday = 0.
    Weekly {
        weekday: u8,
        time: TimeOfDay,
    },
    /// `day` is the day of month, 1-31.
    Monthly {
        day: u8,
        time: TimeOfDay,
    },
    /// Standard 5-field crontab expression.
    Custom {
        cron: String,
    },
}

impl ScheduleSpec {
    /// Builds a spec from the loosely-typed fields a caller (or a stored
    /// definition) provides, applying the documented defaults.
    pub fn from_parts(
        schedule_type: &str,
        schedule_time: Option<&str>,
        schedule_day: Option<i32>,
        cron_expression: Option<&str>,
    ) -> Result<Self, ScheduleError> {
        let time = || -> Result<TimeOfDay, ScheduleError> {
            schedule_time.map_or(Ok(TimeOfDay::NINE_AM), TimeOfDay::parse)
        };

        match schedule_type {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily { time: time()? }),
            "weekly" => {
                let day = schedule_day.unwrap_or(0);
                let weekday = u8::try_from(day)
                    .ok()
                    .filter(|d| *d <= 6)
                    .ok_or(ScheduleError::InvalidDay { kind: "weekly", day })?;
                Ok(Self::Weekly {
                    weekday,
                    time: time()?,
                })
            }
            "monthly" => {
                let day = schedule_day.unwrap_or(1);
                let dom = u8::try_from(day)
                    .ok()
                    .filter(|d| (1..=31).contains(d))
                    .ok_or(ScheduleError::InvalidDay {
                        kind: "monthly",
                        day,
                    })?;
                Ok(Self::Monthly { day: dom, time: time()? })
            }
            "custom" => {
                let cron = cron_expression
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .ok_or(ScheduleError::MissingCron)?;
                Ok(Self::Custom {
                    cron: cron.to_string(),
                })
            }
            other => Err(ScheduleError::UnsupportedType(other.to_string())),
        }
    }

    /// The persisted `(schedule_type, schedule_time, schedule_day,
    /// cron_expression)` column values for this spec.
    #[must_use]
    pub fn to_parts(&self) -> (&'static str, Option<String>, Option<i32>, Option<String>) {
        match self {
            Self::Hourly => ("hourly", None, None, None),
            Self::Daily { time } => ("daily", Some(time.to_string()), None, None),
            Self::Weekly { weekday, time } => (
                "weekly",
                Some(time.to_string()),
                Some(i32::from(*weekday)),
                None,
            ),
            Self::Monthly { day, time } => (
                "monthly",
                Some(time.to_string()),
                Some(i32::from(*day)),
                None,
            ),
            Self::Custom { cron } => ("custom", None, None, Some(cron.clone())),
        }
    }
}

/// Outcome of one scheduled firing, as persisted on the definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Error,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// A persisted recurring query definition.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleDefinition {
    pub id: i32,
    pub question: String,
    pub tables_used: Vec<String>,
    pub schedule_type: String,
    pub schedule_time: Option<String>,
    pub schedule_day: Option<i32>,
    pub cron_expression: Option<String>,
    pub is_active: bool,
    pub created_at: Option<String>,
    pub last_run_at: Option<String>,
    pub last_run_status: Option<String>,
    pub run_count: i32,
}

impl ScheduleDefinition {
    /// Re-validates the stored schedule fields into a spec.
    pub fn spec(&self) -> Result<ScheduleSpec, ScheduleError> {
        ScheduleSpec::from_parts(
            &self.schedule_type,
            self.schedule_time.as_deref(),
            self.schedule_day,
            self.cron_expression.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_time_of_day() {
        let t = TimeOfDay::parse("09:30").unwrap();
        assert_eq!(t.hour, 9);
        assert_eq!(t.minute, 30);
        assert_eq!(t.to_string(), "09:30");

        assert!(TimeOfDay::parse("24:00").is_err());
        assert!(TimeOfDay::parse("12:60").is_err());
        assert!(TimeOfDay::parse("noon").is_err());
    }

    #[test]
    fn daily_defaults_to_nine_am() {
        let spec = ScheduleSpec::from_parts("daily", None, None, None).unwrap();
        assert_eq!(
            spec,
            ScheduleSpec::Daily {
                time: TimeOfDay::NINE_AM
            }
        );
    }

    #[test]
    fn weekly_defaults_to_monday() {
        let spec = ScheduleSpec::from_parts("weekly", Some("10:15"), None, None).unwrap();
        assert_eq!(
            spec,
            ScheduleSpec::Weekly {
                weekday: 0,
                time: TimeOfDay::parse("10:15").unwrap()
            }
        );
    }

    #[test]
    fn rejects_out_of_range_days() {
        assert!(matches!(
            ScheduleSpec::from_parts("weekly", None, Some(7), None),
            Err(ScheduleError::InvalidDay { kind: "weekly", day: 7 })
        ));
        assert!(matches!(
            ScheduleSpec::from_parts("monthly", None, Some(0), None),
            Err(ScheduleError::InvalidDay { kind: "monthly", day: 0 })
        ));
        assert!(matches!(
            ScheduleSpec::from_parts("monthly", None, Some(32), None),
            Err(ScheduleError::InvalidDay { kind: "monthly", day: 32 })
        ));
    }

    #[test]
    fn custom_requires_cron() {
        assert!(matches!(
            ScheduleSpec::from_parts("custom", None, None, None),
            Err(ScheduleError::MissingCron)
        ));
        assert!(matches!(
            ScheduleSpec::from_parts("custom", None, None, Some("  ")),
            Err(ScheduleError::MissingCron)
        ));
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(matches!(
            ScheduleSpec::from_parts("fortnightly", None, None, None),
            Err(ScheduleError::UnsupportedType(_))
        ));
    }

    #[test]
    fn parts_round_trip() {
        let specs = [
            ScheduleSpec::Hourly,
            ScheduleSpec::Daily {
                time: TimeOfDay::parse("18:45").unwrap(),
            },
            ScheduleSpec::Weekly {
                weekday: 4,
                time: TimeOfDay::NINE_AM,
            },
            ScheduleSpec::Monthly {
                day: 15,
                time: TimeOfDay::NINE_AM,
            },
            ScheduleSpec::Custom {
                cron: "*/5 * * * *".to_string(),
            },
        ];

        for spec in specs {
            let (ty, time, day, cron) = spec.to_parts();
            let rebuilt =
                ScheduleSpec::from_parts(ty, time.as_deref(), day, cron.as_deref()).unwrap();
            assert_eq!(rebuilt, spec);
        }
    }
}
