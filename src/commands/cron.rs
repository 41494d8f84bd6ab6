use std::process;

use chrono::{DateTime, Local, Utc};

use crate::schedule::{CronError, CronExpression};

pub fn handle_cron_command(expression: &str, count: usize) {
    match render(expression, count, Utc::now()) {
        Ok(report) => print!("{report}"),
        Err(e) => {
            eprintln!("❌ Invalid cron expression '{expression}': {e}");
            process::exit(1);
        }
    }
}

/// Description of `expression` followed by its next `count` trigger times,
/// in UTC and local time.
fn render(
    expression: &str,
    count: usize,
    now: DateTime<Utc>,
) -> Result<String, CronError> {
    let parsed = CronExpression::parse(expression)?;

    let mut report = format!("🕒 {}\n   {}\n", parsed, parsed.describe());

    let upcoming = parsed.upcoming(&now, count);
    if upcoming.is_empty() {
        report.push_str("\nNo upcoming trigger times\n");
        return Ok(report);
    }

    report.push_str("\nNext trigger times:\n");
    for instant in upcoming {
        report.push_str(&format!(
            "  📅 {} UTC ({})\n",
            instant.format("%Y-%m-%d %H:%M:%S"),
            instant.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S %:z")
        ));
    }

    Ok(report)
}
