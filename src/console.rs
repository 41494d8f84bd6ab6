//! Interactive Rhai REPL for trying out script code before scheduling it.

use rhai::{Array, Dynamic, Engine, EvalAltResult, Scope};
use rustyline::{error::ReadlineError, DefaultEditor, Result as RustyResult};
use tracing::error;

use crate::{
    config::{Config, RunnerConfig},
    environment::Environment,
    sandbox,
    schedule::{validate_and_describe, CronExpression, MAX_UPCOMING},
    templates,
};

/// Operation budget when scripts run in an external process instead of Rhai.
const FALLBACK_MAX_OPERATIONS: u64 = 50_000_000;

pub struct RhaiConsole {
    engine: Engine,
    environment: Environment,
}

impl RhaiConsole {
    /// A console with the same functions and limits scheduled Rhai scripts get.
    #[must_use]
    pub fn new(environment: Environment, config: &Config) -> Self {
        let max_operations = match config.executor.runner {
            RunnerConfig::Rhai { max_operations } => max_operations,
            RunnerConfig::Process { .. } => FALLBACK_MAX_OPERATIONS,
        };

        let mut engine = sandbox::engine(max_operations);
        Self::register_console_functions(&mut engine);

        Self {
            engine,
            environment,
        }
    }

    pub fn start_interactive(&mut self) -> RustyResult<()> {
        println!("🧩 Rhai Console");
        println!("Environment: {}", self.environment);
        println!("Type 'help' for available commands, 'exit' to quit");
        println!("Rhai documentation: https://rhai.rs/book/");
        println!();

        let mut rl = DefaultEditor::new()?;
        let mut scope = self.scope();

        loop {
            match rl.readline("rhai> ") {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    rl.add_history_entry(line)?;
                    match line {
                        "exit" | "quit" => {
                            println!("Goodbye! 👋");
                            break;
                        }
                        "help" => Self::show_help(),
                        "clear" => print!("\x1B[2J\x1B[1;1H"),
                        _ => match self.evaluate(line, &mut scope) {
                            Ok(result) if result.is_unit() => {}
                            Ok(result) => println!("=> {result}"),
                            Err(e) => error!("Rhai error: {}", e),
                        },
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C pressed, exiting...");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D pressed, exiting...");
                    break;
                }
                Err(err) => {
                    error!("Error reading line: {:?}", err);
                    break;
                }
            }
        }

        Ok(())
    }

    fn scope(&self) -> Scope<'static> {
        let mut scope = Scope::new();
        scope.push("env", self.environment.to_string());
        scope
    }

    pub fn evaluate(
        &self,
        code: &str,
        scope: &mut Scope<'_>,
    ) -> Result<Dynamic, Box<EvalAltResult>> {
        self.engine.eval_with_scope::<Dynamic>(scope, code)
    }

    fn register_console_functions(engine: &mut Engine) {
        engine.register_fn("describe_cron", |expression: &str| {
            validate_and_describe(expression).description
        });

        engine.register_fn("next_runs", |expression: &str, count: i64| -> Array {
            let Ok(parsed) = CronExpression::parse(expression) else {
                return Array::new();
            };
            let count = usize::try_from(count).unwrap_or_default().min(MAX_UPCOMING);

            parsed
                .upcoming(&chrono::Utc::now(), count)
                .into_iter()
                .map(|instant| Dynamic::from(instant.to_rfc3339()))
                .collect()
        });

        engine.register_fn("templates", || -> Array {
            templates::all()
                .iter()
                .map(|template| Dynamic::from(template.name.to_string()))
                .collect()
        });

        engine.register_fn("template", |name: &str| -> Dynamic {
            templates::all()
                .iter()
                .find(|template| template.name == name)
                .map_or(Dynamic::UNIT, |template| {
                    Dynamic::from(template.code.to_string())
                })
        });
    }

    fn show_help() {
        println!("🧩 Rhai Console");
        println!();
        println!("Built-in Commands:");
        println!("  help                  - Show this help message");
        println!("  clear                 - Clear the screen");
        println!("  exit/quit             - Exit the console");
        println!();
        println!("Script Functions:");
        println!("  print(value)          - Write to the run output");
        println!("  info/warn/error(msg)  - Write to the service log");
        println!("  now()                 - Current unix timestamp");
        println!("  today()               - Unix timestamp of today's midnight (UTC)");
        println!();
        println!("Console Functions:");
        println!("  describe_cron(expr)   - Explain a cron expression");
        println!("  next_runs(expr, n)    - Next n trigger times of a cron expression");
        println!("  templates()           - Names of the starter templates");
        println!("  template(name)        - Code of a starter template");
        println!();
        println!("Examples:");
        println!("  describe_cron(\"0 9 * * 1-5\")");
        println!("  next_runs(\"*/15 * * * *\", 3)");
        println!("  print(template(\"Heartbeat\"));");
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{boot::read_config, environment::Environment};

    fn console() -> RhaiConsole {
        RhaiConsole::new(Environment::Test, &read_config(&Environment::Test))
    }

    #[test]
    fn test_console_functions() {
        let console = console();
        let mut scope = console.scope();

        let description = console
            .evaluate("describe_cron(\"*/5 * * * *\")", &mut scope)
            .unwrap();
        let runs = console
            .evaluate("next_runs(\"0 9 * * *\", 3).len()", &mut scope)
            .unwrap();
        let invalid = console
            .evaluate("next_runs(\"nonsense\", 3).len()", &mut scope)
            .unwrap();

        assert_eq!(description.into_string().unwrap(), "Every 5 minutes");
        assert_eq!(runs.as_int().unwrap(), 3);
        assert_eq!(invalid.as_int().unwrap(), 0);
    }

    #[test]
    fn test_next_runs_count_is_capped() {
        let console = console();
        let mut scope = console.scope();

        let huge = console
            .evaluate("next_runs(\"* * * * * *\", 9223372036854775807).len()", &mut scope)
            .unwrap();
        let negative = console
            .evaluate("next_runs(\"0 9 * * *\", -5).len()", &mut scope)
            .unwrap();

        assert_eq!(
            usize::try_from(huge.as_int().unwrap()).unwrap(),
            MAX_UPCOMING
        );
        assert_eq!(negative.as_int().unwrap(), 0);
    }

    #[test]
    fn test_scope_keeps_variables_between_lines() {
        let console = console();
        let mut scope = console.scope();

        console.evaluate("let answer = 40;", &mut scope).unwrap();
        let result = console.evaluate("answer + 2", &mut scope).unwrap();

        assert_eq!(result.as_int().unwrap(), 42);
        assert_eq!(
            console
                .evaluate("env", &mut scope)
                .unwrap()
                .into_string()
                .unwrap(),
            "test"
        );
    }

    #[test]
    fn test_templates_are_reachable_from_the_console() {
        let console = console();
        let mut scope = console.scope();

        let count = console.evaluate("templates().len()", &mut scope).unwrap();
        let code = console
            .evaluate("template(\"Heartbeat\")", &mut scope)
            .unwrap();

        assert_eq!(
            usize::try_from(count.as_int().unwrap()).unwrap(),
            templates::all().len()
        );
        assert!(code.into_string().unwrap().contains("heartbeat"));
    }
}
