/*!
Archival window and destination prefix computation.

Export granularity is one day. Each run archives the 24 hours that end
`retention_days` days before "now", so a day is captured once as it crosses
the retention boundary and never again on later runs:

```text
----|<------ exported window ------>|--------------------------------|
  now-(r+1)d                      now-r d                           now
```
*/

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Length of one export window in milliseconds
pub const WINDOW_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Half-open time range `[from, to)` handed to the export task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    from: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    to: DateTime<Utc>,
}

impl TimeWindow {
    /// Compute the window for `retention_days` relative to `now`.
    ///
    /// Offsets reaching past the earliest representable instant clamp to
    /// `DateTime::<Utc>::MIN_UTC`. `RunConfig::validate` rejects such offsets.
    pub fn for_retention(retention_days: u32, now: DateTime<Utc>) -> Self {
        let days = i64::from(retention_days);
        TimeWindow {
            from: days_before(now, days + 1),
            to: days_before(now, days),
        }
    }

    pub fn from_time(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn to_time(&self) -> DateTime<Utc> {
        self.to
    }

    /// Start of the window as epoch milliseconds
    pub fn from_millis(&self) -> i64 {
        self.from.timestamp_millis()
    }

    /// End of the window as epoch milliseconds
    pub fn to_millis(&self) -> i64 {
        self.to.timestamp_millis()
    }

    pub fn duration(&self) -> Duration {
        self.to - self.from
    }

    /// Date stamp of the window start, `Y-M-D` in UTC without zero padding
    pub fn date_stamp(&self) -> String {
        format!(
            "{}-{}-{}",
            self.from.year(),
            self.from.month(),
            self.from.day()
        )
    }
}

fn days_before(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now.checked_sub_signed(Duration::days(days))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Compute the archival window for a retention offset
pub fn compute_window(retention_days: u32, now: DateTime<Utc>) -> TimeWindow {
    TimeWindow::for_retention(retention_days, now)
}

/// Key prefix under which one export task writes its objects.
///
/// `/aws/lambda/orders` exported for a window starting 2019-03-05 yields
/// `aws-lambda-orders/2019-3-5`. Slashes become dashes and a single leading
/// dash is dropped, so names without a leading slash keep their first
/// character: `app/web` becomes `app-web`.
pub fn destination_prefix(source: &str, window: &TimeWindow) -> String {
    format!("{}/{}", sanitize_source(source), window.date_stamp())
}

fn sanitize_source(source: &str) -> String {
    let dashed = source.replace('/', "-");
    match dashed.strip_prefix('-') {
        Some(rest) => rest.to_string(),
        None => dashed,
    }
}
