use std::process;

use crate::{config::Config, console::RhaiConsole, environment::Environment};

pub fn handle_console_command(environment: Environment, config: &Config) {
    println!("🧩 Starting Rhai console...");

    let mut console = RhaiConsole::new(environment, config);

    if let Err(e) = console.start_interactive() {
        eprintln!("Console error: {e}");
        process::exit(1);
    }
}
