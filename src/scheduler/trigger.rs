use chrono::DateTime;
use chrono_tz::Tz;
use croner::Cron;

use crate::models::schedule::{ScheduleError, ScheduleSpec};

/// A schedule spec compiled down to a cron pattern with a leading seconds
/// field, plus a parsed form for computing fire times.
#[derive(Debug, Clone)]
pub struct CompiledTrigger {
    pattern: String,
    cron: Cron,
}

impl CompiledTrigger {
    /// The six-field cron pattern handed to the scheduler runtime.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Next fire strictly after `from`, in the fixed scheduler timezone.
    #[must_use]
    pub fn next_occurrence(&self, from: DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.cron.find_next_occurrence(&from, false).ok()
    }

    /// Next fire at or after `from`. Used for misfire catch-up, where the
    /// search starts at the edge of the grace window.
    #[must_use]
    pub fn occurrence_from(&self, from: DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.cron.find_next_occurrence(&from, true).ok()
    }
}

/// Compiles a spec into a cron trigger.
///
/// Custom expressions are validated here, so a bad expression surfaces when
/// the schedule is created rather than when the job first fires.
pub fn compile(spec: &ScheduleSpec) -> Result<CompiledTrigger, ScheduleError> {
    let pattern = match spec {
        ScheduleSpec::Hourly => "0 0 * * * *".to_string(),
        ScheduleSpec::Daily { time } => format!("0 {} {} * * *", time.minute, time.hour),
        ScheduleSpec::Weekly { weekday, time } => format!(
            "0 {} {} * * {}",
            time.minute,
            time.hour,
            cron_weekday(*weekday)
        ),
        ScheduleSpec::Monthly { day, time } => {
            format!("0 {} {} {} * *", time.minute, time.hour, day)
        }
        ScheduleSpec::Custom { cron } => normalize_custom(cron)?,
    };

    let cron = Cron::new(&pattern)
        .with_seconds_required()
        .parse()
        .map_err(|e| ScheduleError::InvalidCron {
            expression: pattern.clone(),
            reason: e.to_string(),
        })?;

    Ok(CompiledTrigger { pattern, cron })
}

/// Weekly schedules use Monday = 0; cron uses Sunday = 0.
const fn cron_weekday(weekday: u8) -> u8 {
    (weekday + 1) % 7
}

/// Accepts standard 5-field crontab expressions and 6-field ones that
/// already carry a seconds field.
fn normalize_custom(cron: &str) -> Result<String, ScheduleError> {
    let trimmed = cron.trim();
    match trimmed.split_whitespace().count() {
        5 => Ok(format!("0 {trimmed}")),
        6 => Ok(trimmed.to_string()),
        n => Err(ScheduleError::InvalidCron {
            expression: trimmed.to_string(),
            reason: format!("expected 5 or 6 fields, got {n}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::schedule::TIMEZONE;
    use crate::models::schedule::TimeOfDay;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        TIMEZONE.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn hourly_fires_at_minute_zero() {
        let trigger = compile(&ScheduleSpec::Hourly).unwrap();
        assert_eq!(trigger.pattern(), "0 0 * * * *");
        assert_eq!(
            trigger.next_occurrence(at(2026, 3, 10, 14, 30)),
            Some(at(2026, 3, 10, 15, 0))
        );
    }

    #[test]
    fn daily_before_and_after_the_fire_time() {
        let trigger = compile(&ScheduleSpec::Daily {
            time: TimeOfDay { hour: 9, minute: 0 },
        })
        .unwrap();

        // one minute before: same day
        assert_eq!(
            trigger.next_occurrence(at(2026, 3, 10, 8, 59)),
            Some(at(2026, 3, 10, 9, 0))
        );
        // one minute after: next day
        assert_eq!(
            trigger.next_occurrence(at(2026, 3, 10, 9, 1)),
            Some(at(2026, 3, 11, 9, 0))
        );
    }

    #[test]
    fn weekly_monday_is_zero() {
        let trigger = compile(&ScheduleSpec::Weekly {
            weekday: 0,
            time: TimeOfDay { hour: 8, minute: 30 },
        })
        .unwrap();
        assert_eq!(trigger.pattern(), "0 30 8 * * 1");

        // 2026-03-10 is a Tuesday; next Monday is the 16th.
        assert_eq!(
            trigger.next_occurrence(at(2026, 3, 10, 12, 0)),
            Some(at(2026, 3, 16, 8, 30))
        );
    }

    #[test]
    fn weekly_sunday_wraps_to_cron_zero() {
        let trigger = compile(&ScheduleSpec::Weekly {
            weekday: 6,
            time: TimeOfDay { hour: 9, minute: 0 },
        })
        .unwrap();
        assert_eq!(trigger.pattern(), "0 0 9 * * 0");
    }

    #[test]
    fn monthly_on_day_of_month() {
        let trigger = compile(&ScheduleSpec::Monthly {
            day: 15,
            time: TimeOfDay { hour: 7, minute: 45 },
        })
        .unwrap();
        assert_eq!(
            trigger.next_occurrence(at(2026, 3, 16, 0, 0)),
            Some(at(2026, 4, 15, 7, 45))
        );
    }

    #[test]
    fn custom_five_field_gets_seconds_prefix() {
        let trigger = compile(&ScheduleSpec::Custom {
            cron: "*/15 * * * *".to_string(),
        })
        .unwrap();
        assert_eq!(trigger.pattern(), "0 */15 * * * *");
    }

    #[test]
    fn custom_six_field_kept_verbatim() {
        let trigger = compile(&ScheduleSpec::Custom {
            cron: "30 0 9 * * 1".to_string(),
        })
        .unwrap();
        assert_eq!(trigger.pattern(), "30 0 9 * * 1");
    }

    #[test]
    fn custom_garbage_is_rejected() {
        assert!(matches!(
            compile(&ScheduleSpec::Custom {
                cron: "not a cron".to_string(),
            }),
            Err(ScheduleError::InvalidCron { .. })
        ));
        assert!(matches!(
            compile(&ScheduleSpec::Custom {
                cron: "61 * * * *".to_string(),
            }),
            Err(ScheduleError::InvalidCron { .. })
        ));
    }

    #[test]
    fn inclusive_search_finds_the_boundary_fire() {
        let trigger = compile(&ScheduleSpec::Daily {
            time: TimeOfDay { hour: 9, minute: 0 },
        })
        .unwrap();
        assert_eq!(
            trigger.occurrence_from(at(2026, 3, 10, 9, 0)),
            Some(at(2026, 3, 10, 9, 0))
        );
    }
}
