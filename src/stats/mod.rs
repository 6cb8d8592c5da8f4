//! Activity counters and statistics reporting
//!
//! [`StatsService`] is the fire-and-forget sink the loops report successful
//! actions to. It keeps an hourly and a daily tally and logs each when its
//! period ends. The [`report`] submodule reads graph statistics from the
//! database for the `stats` command.

mod report;

pub use report::{load_statistics, print_statistics, GraphStatistics};

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

/// Counters reported by the loops
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Counter {
    Followed,
    Unfollowed,
    Liked,
    UsersToFollowFetched,
}

impl Counter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Counter::Followed => "followed",
            Counter::Unfollowed => "unfollowed",
            Counter::Liked => "liked",
            Counter::UsersToFollowFetched => "users_to_follow_fetched",
        }
    }
}

impl std::fmt::Display for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct Tallies {
    hourly: BTreeMap<Counter, u64>,
    daily: BTreeMap<Counter, u64>,
}

/// Aggregating counter sink shared by all loops
#[derive(Debug)]
pub struct StatsService {
    tallies: Mutex<Tallies>,
    period: Duration,
}

impl Default for StatsService {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsService {
    /// Number of hourly periods per daily report
    pub const PERIODS_PER_DAY: u32 = 24;

    pub fn new() -> Self {
        Self::with_period(Duration::from_secs(3600))
    }

    /// Creates a service reporting every `period` instead of every hour
    pub fn with_period(period: Duration) -> Self {
        Self {
            tallies: Mutex::new(Tallies::default()),
            period,
        }
    }

    /// Adds one to `counter` in both the hourly and daily tallies
    pub fn increment(&self, counter: Counter) {
        let mut tallies = match self.tallies.lock() {
            Ok(t) => t,
            Err(poisoned) => poisoned.into_inner(),
        };
        *tallies.hourly.entry(counter).or_insert(0) += 1;
        *tallies.daily.entry(counter).or_insert(0) += 1;
    }

    /// Current hourly count of `counter`
    pub fn hourly(&self, counter: Counter) -> u64 {
        self.snapshot(|t| t.hourly.get(&counter).copied().unwrap_or(0))
    }

    /// Current daily count of `counter`
    pub fn daily(&self, counter: Counter) -> u64 {
        self.snapshot(|t| t.daily.get(&counter).copied().unwrap_or(0))
    }

    fn snapshot<T>(&self, read: impl FnOnce(&Tallies) -> T) -> T {
        match self.tallies.lock() {
            Ok(t) => read(&t),
            Err(poisoned) => read(&poisoned.into_inner()),
        }
    }

    /// Logs and clears the hourly tally, and the daily tally on every
    /// [`PERIODS_PER_DAY`](Self::PERIODS_PER_DAY)th period
    ///
    /// # Returns
    ///
    /// The hourly tally that was reported.
    pub fn report_period(&self, period_number: u32) -> BTreeMap<Counter, u64> {
        let (hourly, daily) = {
            let mut tallies = match self.tallies.lock() {
                Ok(t) => t,
                Err(poisoned) => poisoned.into_inner(),
            };
            let hourly = std::mem::take(&mut tallies.hourly);
            let daily = if period_number % Self::PERIODS_PER_DAY == 0 {
                Some(std::mem::take(&mut tallies.daily))
            } else {
                None
            };
            (hourly, daily)
        };

        tracing::info!("Hourly stats: {}", format_tally(&hourly));
        if let Some(daily) = daily {
            tracing::info!("Daily stats: {}", format_tally(&daily));
        }
        hourly
    }

    /// Reports forever, once per period
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.period);
        // The first tick completes immediately.
        interval.tick().await;

        let mut period_number: u32 = 0;
        loop {
            interval.tick().await;
            period_number = period_number.wrapping_add(1);
            self.report_period(period_number);
        }
    }
}

fn format_tally(tally: &BTreeMap<Counter, u64>) -> String {
    if tally.is_empty() {
        return "no activity".to_string();
    }
    tally
        .iter()
        .map(|(counter, count)| format!("{}={}", counter, count))
        .collect::<Vec<_>>()
        .join(", ")
}
