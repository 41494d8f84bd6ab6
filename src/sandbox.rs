//! Functions and limits shared by every Rhai engine the service builds: the
//! script runner and the interactive console.

use rhai::Engine;
use tracing::{error, info, warn};

/// Caps that keep a runaway script from exhausting memory.
const MAX_STRING_SIZE: usize = 1024 * 1024;
const MAX_ARRAY_SIZE: usize = 100_000;
const MAX_MAP_SIZE: usize = 100_000;
const MAX_CALL_LEVELS: usize = 64;

/// An engine with the sandbox functions registered and resource limits applied.
#[must_use]
pub fn engine(max_operations: u64) -> Engine {
    let mut engine = Engine::new();

    engine
        .set_max_operations(max_operations)
        .set_max_string_size(MAX_STRING_SIZE)
        .set_max_array_size(MAX_ARRAY_SIZE)
        .set_max_map_size(MAX_MAP_SIZE)
        .set_max_call_levels(MAX_CALL_LEVELS);

    register_logging_functions(&mut engine);
    register_utility_functions(&mut engine);

    engine
}

pub fn register_logging_functions(engine: &mut Engine) {
    engine.register_fn("info", |msg: &str| {
        info!("📜 {}", msg);
    });

    engine.register_fn("warn", |msg: &str| {
        warn!("📜 {}", msg);
    });

    engine.register_fn("error", |msg: &str| {
        error!("📜 {}", msg);
    });
}

pub fn register_utility_functions(engine: &mut Engine) {
    engine.register_fn("now", || chrono::Utc::now().timestamp());

    engine.register_fn("today", || {
        let now = chrono::Utc::now();
        now.date_naive()
            .and_hms_opt(0, 0, 0)
            .map_or(now.timestamp(), |midnight| midnight.and_utc().timestamp())
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utility_functions_are_available() {
        let engine = engine(10_000);

        let now: i64 = engine.eval("now()").unwrap();
        let today: i64 = engine.eval("today()").unwrap();

        assert!(today <= now);
        assert!(now - today < 86_400);
        assert_eq!(today % 86_400, 0);
    }

    #[test]
    fn test_operation_limit_stops_endless_loops() {
        let engine = engine(1_000);

        let result = engine.run("let x = 0; loop { x += 1; }");

        assert!(result.is_err());
    }
}
