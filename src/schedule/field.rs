use std::{collections::BTreeSet, sync::LazyLock};

use regex::Regex;
use strum::Display;

use super::CronError;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];
const SCHEDULE_WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// `*`, `a`, `a-b`, each optionally followed by `/step`.
static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\*)|([0-9A-Za-z]+)(?:-([0-9A-Za-z]+))?)(?:/([0-9]+))?$")
        .expect("cron token pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum FieldKind {
    Second,
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl FieldKind {
    /// Inclusive bounds accepted in an expression.
    ///
    /// Day-of-week accepts 7 as an alias of Sunday.
    pub const fn bounds(self) -> (u32, u32) {
        match self {
            Self::Second | Self::Minute => (0, 59),
            Self::Hour => (0, 23),
            Self::DayOfMonth => (1, 31),
            Self::Month => (1, 12),
            Self::DayOfWeek => (0, 7),
        }
    }

    const fn wildcard_bounds(self) -> (u32, u32) {
        match self {
            Self::DayOfWeek => (0, 6),
            other => other.bounds(),
        }
    }

    const fn is_day_field(self) -> bool {
        matches!(self, Self::DayOfMonth | Self::DayOfWeek)
    }

    fn value_of(self, token: &str) -> Option<u32> {
        if let Ok(number) = token.parse::<u32>() {
            return Some(number);
        }

        let upper = token.to_ascii_uppercase();
        let names: &[&str] = match self {
            Self::Month => &MONTH_NAMES,
            Self::DayOfWeek => &WEEKDAY_NAMES,
            _ => return None,
        };
        let offset = u32::from(self == Self::Month);

        names
            .iter()
            .position(|name| *name == upper)
            .and_then(|index| u32::try_from(index).ok())
            .map(|index| index + offset)
    }
}

/// One parsed field of a cron expression, expanded into the set of values it matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronField {
    kind: FieldKind,
    raw: String,
    values: BTreeSet<u32>,
    step: Option<u32>,
}

impl CronField {
    pub fn parse(kind: FieldKind, raw: &str) -> Result<Self, CronError> {
        let mut values = BTreeSet::new();
        let mut step = None;
        let parts: Vec<&str> = raw.split(',').collect();

        for part in &parts {
            let part = if *part == "?" && kind.is_day_field() {
                "*"
            } else {
                part
            };

            let captures = TOKEN
                .captures(part)
                .ok_or_else(|| CronError::InvalidToken {
                    field: kind,
                    token: (*part).to_string(),
                })?;

            let part_step = match captures.get(4) {
                Some(step_match) => {
                    let value: u32 =
                        step_match
                            .as_str()
                            .parse()
                            .map_err(|_| CronError::InvalidToken {
                                field: kind,
                                token: (*part).to_string(),
                            })?;
                    if value == 0 {
                        return Err(CronError::ZeroStep {
                            field: kind,
                            token: (*part).to_string(),
                        });
                    }
                    Some(value)
                }
                None => None,
            };

            let (start, end) = if captures.get(1).is_some() {
                kind.wildcard_bounds()
            } else {
                let start = parse_value(kind, captures.get(2).map_or("", |m| m.as_str()), part)?;
                let end = match captures.get(3) {
                    Some(end) => parse_value(kind, end.as_str(), part)?,
                    // `a/n` walks from `a` to the end of the field
                    None if part_step.is_some() => kind.wildcard_bounds().1.max(start),
                    None => start,
                };
                if start > end {
                    return Err(CronError::InvertedRange {
                        field: kind,
                        start,
                        end,
                    });
                }
                (start, end)
            };

            let increment = part_step.unwrap_or(1);
            let mut value = start;
            while value <= end {
                values.insert(normalize(kind, value));
                match value.checked_add(increment) {
                    Some(next) => value = next,
                    None => break,
                }
            }

            if parts.len() == 1 && captures.get(1).is_some() {
                step = part_step;
            }
        }

        Ok(Self {
            kind,
            raw: raw.to_string(),
            values,
            step,
        })
    }

    pub const fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub const fn values(&self) -> &BTreeSet<u32> {
        &self.values
    }

    /// True for a bare `*` (or `?` on the day fields).
    pub fn is_unrestricted(&self) -> bool {
        self.raw == "*" || (self.raw == "?" && self.kind.is_day_field())
    }

    pub fn contains(&self, value: u32) -> bool {
        self.values.contains(&value)
    }

    pub fn single(&self) -> Option<u32> {
        if self.values.len() == 1 {
            self.values.first().copied()
        } else {
            None
        }
    }

    /// The interval of a `*/n` field.
    pub const fn every(&self) -> Option<u32> {
        self.step
    }

    /// Renders the field for the `cron` crate, which numbers weekdays differently,
    /// so weekdays are always emitted by name.
    pub(crate) fn schedule_token(&self) -> String {
        if self.is_unrestricted() {
            return "*".to_string();
        }

        self.values
            .iter()
            .map(|value| match self.kind {
                FieldKind::DayOfWeek => SCHEDULE_WEEKDAYS[*value as usize % 7].to_string(),
                _ => value.to_string(),
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn parse_value(kind: FieldKind, token: &str, part: &str) -> Result<u32, CronError> {
    let value = kind.value_of(token).ok_or_else(|| CronError::InvalidToken {
        field: kind,
        token: part.to_string(),
    })?;

    let (min, max) = kind.bounds();
    if value < min || value > max {
        return Err(CronError::OutOfRange {
            field: kind,
            value,
            min,
            max,
        });
    }

    Ok(value)
}

const fn normalize(kind: FieldKind, value: u32) -> u32 {
    match kind {
        FieldKind::DayOfWeek if value == 7 => 0,
        _ => value,
    }
}
