use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;

// The unit tail is `[^a-z]|$` instead of `\b`: compact tokens such as `1d2h`
// put a digit right after the unit letter, which defeats a word boundary.
static DAYS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s*d(?:ays?)?(?:[^a-z]|$)").expect("days pattern"));
static CLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3}):(\d{2})(?::(\d{2}))?").expect("clock pattern"));
static HOURS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s*h(?:(?:ou)?rs?)?(?:[^a-z]|$)").expect("hours pattern"));
static MINUTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s*m(?:in(?:ute)?s?)?(?:[^a-z]|$)").expect("minutes pattern"));
static SECONDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s*s(?:ec(?:ond)?s?)?(?:[^a-z]|$)").expect("seconds pattern"));
static TOKEN_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9dhms]+$").expect("token shape"));

/// A stored plan duration broken into controller time-span components.
///
/// The first applicable match per unit class wins: an `HH:MM:SS` clock group
/// supplies hours/minutes/seconds when present, textual units (`2 hours`,
/// `30m`) otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDuration {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl ParsedDuration {
    /// Extract duration components from free-form text. `None` when nothing
    /// in the input names a time unit.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        let days = capture(&DAYS, input, 1);
        let clock = CLOCK.captures(input);
        let (clock_hours, clock_minutes, clock_seconds) = match &clock {
            Some(caps) => (
                caps.get(1).and_then(|m| m.as_str().parse().ok()),
                caps.get(2).and_then(|m| m.as_str().parse().ok()),
                caps.get(3).and_then(|m| m.as_str().parse().ok()),
            ),
            None => (None, None, None),
        };
        let hours = clock_hours.or_else(|| capture(&HOURS, input, 1));
        let minutes = clock_minutes.or_else(|| capture(&MINUTES, input, 1));
        let seconds = clock_seconds.or_else(|| capture(&SECONDS, input, 1));

        if days.is_none() && hours.is_none() && minutes.is_none() && seconds.is_none() {
            return None;
        }

        Some(Self {
            days: days.unwrap_or(0),
            hours: hours.unwrap_or(0),
            minutes: minutes.unwrap_or(0),
            seconds: seconds.unwrap_or(0),
        })
    }

    /// The controller's compact span token: `<N>d<N>h<N>m`, zero components
    /// omitted. A trailing `<N>s` appears only when no coarser unit
    /// contributed, so sub-minute spans stay representable.
    pub fn token(&self) -> Option<String> {
        let mut out = String::new();
        if self.days > 0 {
            out.push_str(&format!("{}d", self.days));
        }
        if self.hours > 0 {
            out.push_str(&format!("{}h", self.hours));
        }
        if self.minutes > 0 {
            out.push_str(&format!("{}m", self.minutes));
        }
        if out.is_empty() && self.seconds > 0 {
            out.push_str(&format!("{}s", self.seconds));
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    pub fn to_chrono(&self) -> Duration {
        Duration::days(self.days)
            + Duration::hours(self.hours)
            + Duration::minutes(self.minutes)
            + Duration::seconds(self.seconds)
    }
}

/// Normalize a stored duration into the controller token grammar.
///
/// Returns `None` rather than an error when the input is empty or carries no
/// recognizable unit. Idempotent over its own output.
pub fn normalize(input: &str) -> Option<String> {
    let token = ParsedDuration::parse(input)?.token()?;
    if !TOKEN_SHAPE.is_match(&token) {
        return None;
    }
    Some(token)
}

fn capture(pattern: &Regex, input: &str, group: usize) -> Option<i64> {
    pattern
        .captures(input)
        .and_then(|caps| caps.get(group))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_and_clock_components_combine() {
        assert_eq!(normalize("1 day 02:00:00").as_deref(), Some("1d2h"));
    }

    #[test]
    fn clock_only_minutes() {
        assert_eq!(normalize("00:30:00").as_deref(), Some("30m"));
    }

    #[test]
    fn textual_units_are_recognized() {
        assert_eq!(normalize("2 hours").as_deref(), Some("2h"));
        assert_eq!(normalize("90 minutes").as_deref(), Some("90m"));
        assert_eq!(normalize("3 days").as_deref(), Some("3d"));
    }

    #[test]
    fn empty_and_garbage_yield_none() {
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("   "), None);
        assert_eq!(normalize("garbage"), None);
    }

    #[test]
    fn normalizing_a_token_is_stable() {
        for token in ["1d2h", "30m", "2h30m", "45s"] {
            assert_eq!(normalize(token).as_deref(), Some(token));
        }
    }

    #[test]
    fn seconds_survive_only_without_coarser_units() {
        assert_eq!(normalize("00:00:45").as_deref(), Some("45s"));
        assert_eq!(normalize("1:00:30").as_deref(), Some("1h"));
    }

    #[test]
    fn all_zero_clock_is_none() {
        assert_eq!(normalize("00:00:00"), None);
    }

    #[test]
    fn chrono_conversion_sums_components() {
        let parsed = ParsedDuration::parse("1 day 02:30:00").expect("parses");
        assert_eq!(parsed.to_chrono(), Duration::hours(26) + Duration::minutes(30));
    }
}
