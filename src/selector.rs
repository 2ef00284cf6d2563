//! Turns the selector options into a single [`QueryDescriptor`].

use crate::error::{ObserveError, Result};
use crate::time::{self, TimeBoundary};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Number of records shown when no selector is given.
pub const DEFAULT_FLOW_COUNT: u64 = 20;

/// Count used for `--all`: no limit on the buffered records.
pub const ALL_FLOWS: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    First,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Bounded { count: u64, direction: Direction },
    /// No buffered records; stream whatever arrives from now on.
    Unbounded,
}

/// Raw selector values as collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct SelectorOptions {
    pub all: bool,
    pub last: u64,
    pub first: u64,
    pub since: String,
    pub until: String,
    pub follow: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryDescriptor {
    pub mode: Mode,
    pub since: Option<TimeBoundary>,
    pub until: Option<TimeBoundary>,
    pub follow: bool,
}

impl QueryDescriptor {
    /// Resolve and validate selector options against `now`.
    pub fn build(opts: &SelectorOptions, now: DateTime<Utc>) -> Result<Self> {
        let active: Vec<&'static str> = [
            (opts.all, "--all"),
            (opts.last > 0, "--last"),
            (opts.first > 0, "--first"),
        ]
        .into_iter()
        .filter_map(|(set, flag)| set.then_some(flag))
        .collect();

        if active.len() > 1 {
            return Err(ObserveError::ConflictingSelectors { flags: active });
        }

        let mode = if opts.all {
            Mode::Bounded {
                count: ALL_FLOWS,
                direction: Direction::First,
            }
        } else if opts.last > 0 {
            Mode::Bounded {
                count: opts.last,
                direction: Direction::Last,
            }
        } else if opts.first > 0 {
            Mode::Bounded {
                count: opts.first,
                direction: Direction::First,
            }
        } else if opts.follow {
            Mode::Unbounded
        } else {
            Mode::Bounded {
                count: DEFAULT_FLOW_COUNT,
                direction: Direction::Last,
            }
        };

        let since = time::resolve(&opts.since, now)?;
        let until = time::resolve(&opts.until, now)?;

        if let (Some(since_at), Some(until_at)) = (since, until) {
            if since_at.instant() > until_at.instant() {
                return Err(ObserveError::InvalidTimeRange {
                    since: opts.since.clone(),
                    until: opts.until.clone(),
                });
            }
        }

        let descriptor = Self {
            mode,
            since,
            until,
            follow: opts.follow,
        };
        debug!(?descriptor, "Resolved query");
        Ok(descriptor)
    }

    /// Whether the caller must keep the source open until cancelled.
    pub fn is_long_lived(&self) -> bool {
        self.follow
    }

    /// Whether `time` falls inside the inclusive `since`/`until` range.
    pub fn in_range(&self, time: &DateTime<Utc>) -> bool {
        let after_since = self.since.map_or(true, |since| *time >= since.instant());
        let before_until = self.until.map_or(true, |until| *time <= until.instant());
        after_since && before_until
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_default_is_last_n() {
        let query = QueryDescriptor::build(&SelectorOptions::default(), now()).unwrap();
        assert_eq!(
            query.mode,
            Mode::Bounded {
                count: DEFAULT_FLOW_COUNT,
                direction: Direction::Last,
            }
        );
        assert!(!query.follow);
        assert!(!query.is_long_lived());
    }

    #[test]
    fn test_follow_alone_is_unbounded() {
        let opts = SelectorOptions {
            follow: true,
            ..Default::default()
        };
        let query = QueryDescriptor::build(&opts, now()).unwrap();
        assert_eq!(query.mode, Mode::Unbounded);
        assert!(query.is_long_lived());
    }

    #[test]
    fn test_pairwise_conflicts() {
        let pairs = [
            SelectorOptions {
                all: true,
                last: 5,
                ..Default::default()
            },
            SelectorOptions {
                all: true,
                first: 5,
                ..Default::default()
            },
            SelectorOptions {
                last: 5,
                first: 5,
                ..Default::default()
            },
        ];
        for opts in pairs {
            let err = QueryDescriptor::build(&opts, now()).unwrap_err();
            match err {
                ObserveError::ConflictingSelectors { flags } => assert_eq!(flags.len(), 2),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_conflict_message_names_flags() {
        let opts = SelectorOptions {
            all: true,
            last: 1,
            first: 1,
            ..Default::default()
        };
        let err = QueryDescriptor::build(&opts, now()).unwrap_err();
        assert_eq!(err.to_string(), "--all, --last, --first are mutually exclusive");
    }

    #[test]
    fn test_follow_combinations_stay_distinct() {
        let last = SelectorOptions {
            last: 5,
            follow: true,
            ..Default::default()
        };
        let first = SelectorOptions {
            first: 5,
            follow: true,
            ..Default::default()
        };
        let last = QueryDescriptor::build(&last, now()).unwrap();
        let first = QueryDescriptor::build(&first, now()).unwrap();
        assert_eq!(
            last.mode,
            Mode::Bounded {
                count: 5,
                direction: Direction::Last,
            }
        );
        assert_eq!(
            first.mode,
            Mode::Bounded {
                count: 5,
                direction: Direction::First,
            }
        );
        assert!(last.follow && first.follow);
    }

    #[test]
    fn test_all_has_no_count_limit() {
        let opts = SelectorOptions {
            all: true,
            ..Default::default()
        };
        let query = QueryDescriptor::build(&opts, now()).unwrap();
        assert_eq!(
            query.mode,
            Mode::Bounded {
                count: ALL_FLOWS,
                direction: Direction::First,
            }
        );
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let opts = SelectorOptions {
            since: "2024-01-02".to_string(),
            until: "2024-01-01".to_string(),
            ..Default::default()
        };
        let err = QueryDescriptor::build(&opts, now()).unwrap_err();
        assert!(matches!(err, ObserveError::InvalidTimeRange { .. }));
        assert!(err.is_usage());
    }

    #[test]
    fn test_relative_range() {
        let opts = SelectorOptions {
            since: "2h".to_string(),
            until: "1h".to_string(),
            last: 3,
            ..Default::default()
        };
        let query = QueryDescriptor::build(&opts, now()).unwrap();
        assert_eq!(query.since.unwrap().instant(), now() - Duration::hours(2));
        assert!(query.in_range(&(now() - Duration::minutes(90))));
        assert!(!query.in_range(&(now() - Duration::minutes(30))));
        assert!(!query.in_range(&(now() - Duration::hours(3))));
    }

    #[test]
    fn test_invalid_since_is_reported() {
        let opts = SelectorOptions {
            since: "last tuesday".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            QueryDescriptor::build(&opts, now()),
            Err(ObserveError::InvalidTimeExpression { .. })
        ));
    }
}
