//! Starter scripts offered to operators when they create a new script.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Template {
    pub name: &'static str,
    pub description: &'static str,
    pub code: &'static str,
}

const TEMPLATES: &[Template] = &[
    Template {
        name: "Simple test script",
        description: "Prints a greeting and the current time. Useful to check that scheduling works.",
        code: r#"// A minimal script to verify that runs are recorded.
let started = now();
print("Hello from the script scheduler!");
print(`Current unix time: ${started}`);
info("simple test script finished");
"#,
    },
    Template {
        name: "Daily digest",
        description: "Assembles a numbered list of headlines into a single report.",
        code: r#"// Replace the headlines with whatever the digest should contain.
let headlines = [
    "Deployment window opens at 18:00",
    "Database backups completed",
    "Two new services registered",
];

print(`Digest for day starting at ${today()}`);
for (headline, index) in headlines {
    print(`${index + 1}. ${headline}`);
}
print(`${headlines.len()} items in total`);
"#,
    },
    Template {
        name: "Threshold monitor",
        description: "Compares readings against limits and fails the run when one is exceeded.",
        code: r#"// A failed run is the alert: check the run history for the reason.
let limits = #{ cpu: 90, memory: 80, disk: 95 };
let readings = #{ cpu: 42, memory: 61, disk: 73 };

let exceeded = [];
for name in limits.keys() {
    let reading = readings[name];
    let limit = limits[name];
    print(`${name}: ${reading} (limit ${limit})`);
    if reading > limit {
        exceeded.push(name);
    }
}

if exceeded.len() > 0 {
    throw `limits exceeded: ${exceeded}`;
}
print("all readings within limits");
"#,
    },
    Template {
        name: "Exchange rate table",
        description: "Converts an amount into several currencies from a table of rates.",
        code: r#"// Rates are relative to the base currency.
let base = "USD";
let amount = 250.0;
let rates = #{ EUR: 0.92, GBP: 0.79, JPY: 157.3, CHF: 0.9 };

print(`${amount} ${base} is worth:`);
for currency in rates.keys() {
    let converted = amount * rates[currency];
    print(`  ${converted.round()} ${currency}`);
}
"#,
    },
    Template {
        name: "Heartbeat",
        description: "Logs a heartbeat through the service log as well as the run output.",
        code: r#"let beat = now();
info(`heartbeat at ${beat}`);
print(`alive at ${beat}`);
"#,
    },
    Template {
        name: "Paced batch",
        description: "Processes a batch in steps, pausing between them with sleep.",
        code: r#"// sleep() takes milliseconds and counts against the execution timeout.
let batch = [3, 1, 4, 1, 5];
let total = 0;

for item in batch {
    total += item;
    print(`processed ${item}, running total ${total}`);
    sleep(50);
}

print(`batch done, total ${total}`);
"#,
    },
];

pub const fn all() -> &'static [Template] {
    TEMPLATES
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc, time::Duration};

    use super::*;
    use crate::{
        database::models::run_status::RunStatus,
        executor::{RhaiRunner, ScriptExecutor},
    };

    #[test]
    fn test_template_names_are_unique() {
        let names: HashSet<_> = all().iter().map(|template| template.name).collect();

        assert_eq!(names.len(), all().len());
        assert!(all().len() >= 5);
    }

    #[tokio::test]
    async fn test_every_template_runs_successfully() {
        let executor = ScriptExecutor::new(
            Arc::new(RhaiRunner::new(1_000_000)),
            Duration::from_secs(5),
            65_536,
        );

        for template in all() {
            let outcome = executor.execute(template.code).await;

            assert_eq!(
                outcome.status,
                RunStatus::Success,
                "template '{}' failed: {:?}",
                template.name,
                outcome.error
            );
            assert!(!outcome.output.is_empty(), "template '{}'", template.name);
        }
    }
}
