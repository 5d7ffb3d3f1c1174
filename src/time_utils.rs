use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::fmt;

/// Forecast lead time formatted as `DDHHMMSS`, the offset string used in
/// model output file names (e.g. 8 h -> `00080000`).
pub fn ddhhmmss(lead: Duration) -> String {
    let total = lead.num_seconds().max(0);
    let days = total / 86400;
    let hours = (total % 86400) / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{:02}{:02}{:02}{:02}", days, hours, minutes, seconds)
}

/// Inclusive list of lead times from `start` to `end` in steps of `inc`.
pub fn make_timelist(start: Duration, end: Duration, inc: Duration) -> Vec<Duration> {
    let mut times = Vec::new();
    if inc <= Duration::zero() {
        return times;
    }
    let mut t = start;
    while t <= end {
        times.push(t);
        t += inc;
    }
    times
}

/// Lead time in fractional hours
pub fn lead_hours(lead: Duration) -> f64 {
    lead.num_seconds() as f64 / 3600.0
}

/// Initialisation date in the `YYYYMMDDHH` form used for ensemble directories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitDate(pub DateTime<Utc>);

impl InitDate {
    pub fn valid_time(&self, lead: Duration) -> DateTime<Utc> {
        self.0 + lead
    }
}

impl fmt::Display for InitDate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y%m%d%H"))
    }
}

/// Parse an initialisation date string `YYYYMMDDHH`
pub fn parse_init_date(date_str: &str) -> Result<InitDate, String> {
    if date_str.len() != 10 || !date_str.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!(
            "Invalid date format: {}. Expected: YYYYMMDDHH",
            date_str
        ));
    }
    NaiveDateTime::parse_from_str(&format!("{}0000", date_str), "%Y%m%d%H%M%S")
        .map_err(|_| format!("Invalid date: {}", date_str))
        .map(|dt| InitDate(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)))
}
