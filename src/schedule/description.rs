use std::collections::BTreeSet;

use super::{cron_expression::CronExpression, field::CronField};

const WEEKDAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];
const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];
/// Clock times are listed individually up to this many hours.
const MAX_LISTED_TIMES: usize = 6;

pub(super) fn describe(expression: &CronExpression) -> String {
    let times = fixed_times(expression);
    let mut text = match &times {
        Some(times) => format!("at {}", join_list(times)),
        None => time_of_day(expression),
    };

    text.push_str(&day_phrase(expression, times.is_some()));
    text.push_str(&month_phrase(expression.months()));

    capitalize(&text)
}

/// "09:00", "17:30:15" when the expression fires at a handful of exact times.
fn fixed_times(expression: &CronExpression) -> Option<Vec<String>> {
    let second = expression.seconds().single()?;
    let minute = expression.minutes().single()?;
    let hours = expression.hours();

    if hours.is_unrestricted() || hours.every().is_some() || hours.values().len() > MAX_LISTED_TIMES
    {
        return None;
    }

    let times = hours
        .values()
        .iter()
        .map(|hour| {
            if second == 0 {
                format!("{hour:02}:{minute:02}")
            } else {
                format!("{hour:02}:{minute:02}:{second:02}")
            }
        })
        .collect();

    Some(times)
}

fn time_of_day(expression: &CronExpression) -> String {
    let units = [
        (expression.seconds(), "second", "seconds"),
        (expression.minutes(), "minute", "minutes"),
        (expression.hours(), "hour", "hours"),
    ];
    let start = usize::from(expression.seconds().single() == Some(0));

    let (field, singular, plural) = units[start];
    let (mut text, anchored) = if field.is_unrestricted() {
        (format!("every {singular}"), false)
    } else if let Some(step) = field.every() {
        (format!("every {step} {plural}"), false)
    } else {
        (format!("at {}", listed(field, singular, plural)), true)
    };

    for (index, (field, singular, plural)) in units.iter().enumerate().skip(start + 1) {
        if field.is_unrestricted() {
            if anchored && index == start + 1 {
                text.push_str(&format!(" of every {singular}"));
            }
        } else if let Some(step) = field.every() {
            text.push_str(&format!(", every {step} {plural}"));
        } else {
            text.push_str(&format!(" during {}", listed(field, singular, plural)));
        }
    }

    text
}

fn day_phrase(expression: &CronExpression, at_fixed_times: bool) -> String {
    let days_of_week = expression.days_of_week();
    let days_of_month = expression.days_of_month();

    if !days_of_week.is_unrestricted() {
        let names = compact(days_of_week.values(), |day| WEEKDAYS[*day as usize % 7].to_string(), " through ");
        return format!(" on {}", join_list(&names));
    }

    if !days_of_month.is_unrestricted() {
        return match days_of_month.every() {
            Some(step) => format!(" every {step} days"),
            None => format!(" on {} of the month", listed(days_of_month, "day", "days")),
        };
    }

    if at_fixed_times {
        " every day".to_string()
    } else {
        String::new()
    }
}

fn month_phrase(months: &CronField) -> String {
    if months.is_unrestricted() {
        return String::new();
    }

    match months.every() {
        Some(step) => format!(" every {step} months"),
        None => {
            let names = compact(
                months.values(),
                |month| MONTHS[(*month as usize).saturating_sub(1) % 12].to_string(),
                " through ",
            );
            format!(" in {}", join_list(&names))
        }
    }
}

fn listed(field: &CronField, singular: &str, plural: &str) -> String {
    let noun = if field.values().len() == 1 {
        singular
    } else {
        plural
    };
    let items = compact(field.values(), u32::to_string, "-");

    format!("{noun} {}", join_list(&items))
}

/// Collapses runs of three or more consecutive values into `first{joiner}last`.
fn compact(values: &BTreeSet<u32>, render: impl Fn(&u32) -> String, joiner: &str) -> Vec<String> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for value in values {
        match runs.last_mut() {
            Some((_, end)) if *end + 1 == *value => *end = *value,
            _ => runs.push((*value, *value)),
        }
    }

    let mut items = Vec::new();
    for (start, end) in runs {
        if end >= start + 2 {
            items.push(format!("{}{joiner}{}", render(&start), render(&end)));
        } else {
            items.extend((start..=end).map(|value| render(&value)));
        }
    }
    items
}

fn join_list(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn described(source: &str) -> String {
        CronExpression::parse(source).unwrap().describe()
    }

    #[test]
    fn test_describes_common_schedules() {
        let cases = [
            ("0 9 * * *", "At 09:00 every day"),
            ("*/5 * * * *", "Every 5 minutes"),
            ("0 9 * * 1-5", "At 09:00 on Monday through Friday"),
            ("0 0 1 * *", "At 00:00 on day 1 of the month"),
            ("30 * * * *", "At minute 30 of every hour"),
            ("0 9,17 * * *", "At 09:00 and 17:00 every day"),
            ("* * * * *", "Every minute"),
            ("0 */2 * * *", "At minute 0, every 2 hours"),
        ];

        for (source, expected) in cases {
            assert_eq!(described(source), expected, "describing '{source}'");
        }
    }

    #[test]
    fn test_describes_seconds() {
        assert_eq!(described("*/10 * * * * *"), "Every 10 seconds");
        assert_eq!(described("30 0 9 * * *"), "At 09:00:30 every day");
        assert_eq!(described("15 * * * * *"), "At second 15 of every minute");
    }

    #[test]
    fn test_describes_lists_and_ranges() {
        assert_eq!(
            described("0 0 1,15 * *"),
            "At 00:00 on days 1 and 15 of the month"
        );
        assert_eq!(
            described("0 12 * * 1,3,5"),
            "At 12:00 on Monday, Wednesday and Friday"
        );
        assert_eq!(
            described("0,30 9-17 * * *"),
            "At minutes 0 and 30 during hours 9-17"
        );
        assert_eq!(
            described("0 8 * JAN,JUL *"),
            "At 08:00 every day in January and July"
        );
        assert_eq!(
            described("0 6 ? * SAT,SUN"),
            "At 06:00 on Sunday and Saturday"
        );
    }

    #[test]
    fn test_compact_only_collapses_long_runs() {
        let values: BTreeSet<u32> = [1, 2, 4, 5, 6, 9].into_iter().collect();

        assert_eq!(
            compact(&values, u32::to_string, "-"),
            vec!["1", "2", "4-6", "9"]
        );
    }

    #[test]
    fn test_join_list() {
        assert_eq!(join_list(&[]), "");
        assert_eq!(join_list(&["a".to_string()]), "a");
        assert_eq!(join_list(&["a".to_string(), "b".to_string()]), "a and b");
        assert_eq!(
            join_list(&["a".to_string(), "b".to_string(), "c".to_string()]),
            "a, b and c"
        );
    }
}
