use std::{env, str::FromStr as _};

use clap::Parser as _;
use config_rs::Config as ConfigRs;
use tracing::{debug, trace};

use crate::{
    app_info::AppInfo,
    cli::{Cli, Commands},
    commands::{console, cron, migrate, serve, version},
    config::Config,
    environment::Environment,
    setup_tracing::setup_tracing_for_command,
};

const ENVIRONMENT_VARIABLE: &str = "APP_ENVIRONMENT";
const CONFIG_ENV_PREFIX: &str = "APP";
const CONFIG_ENV_SEPARATOR: &str = "__";

pub async fn boot(app_info: AppInfo) {
    let cli = Cli::parse();

    if matches!(cli.command, Some(Commands::Version)) {
        version::print_version_info(app_info);
        return;
    }

    let environment = set_environment();

    let app_config = read_config(&environment);

    setup_tracing_for_command(&cli.command, &app_config.tracing.log_level);

    debug!("Environment set to: {:?}", environment);
    trace!("Configuration loaded: {:?}", app_config);

    handle_command(environment, app_config, cli, app_info).await;
}

#[must_use]
pub fn set_environment() -> Environment {
    env::var(ENVIRONMENT_VARIABLE)
        .ok()
        .and_then(|s| Environment::from_str(&s).ok())
        .unwrap_or_default()
}

/// Reads `config/{environment}.toml`, overridden by `APP__SECTION__KEY`
/// environment variables.
///
/// # Panics
///
/// Panics if the file is missing or does not describe a valid [`Config`].
pub fn read_config(environment: &Environment) -> Config {
    let config_file_name = format!("config/{environment}");

    trace!("Reading configuration from: {}", config_file_name);

    ConfigRs::builder()
        .add_source(config_rs::File::with_name(&config_file_name))
        .add_source(
            config_rs::Environment::with_prefix(CONFIG_ENV_PREFIX)
                .prefix_separator(CONFIG_ENV_SEPARATOR)
                .separator(CONFIG_ENV_SEPARATOR)
                .try_parsing(true),
        )
        .build()
        .expect("Failed to read configuration")
        .try_deserialize()
        .expect("Failed to deserialize configuration")
}

pub async fn handle_command(
    environment: Environment,
    config: Config,
    cli: Cli,
    app_info: AppInfo,
) {
    match cli.command {
        Some(Commands::Migrate { action }) => {
            migrate::handle_migrate_command(&config, action).await;
        }
        Some(Commands::Console) => {
            console::handle_console_command(environment, &config);
        }
        Some(Commands::Cron { expression, count }) => {
            cron::handle_cron_command(&expression, count);
        }
        Some(Commands::Version) => {
            version::print_version_info(app_info);
        }
        Some(Commands::Serve) | None => {
            serve::handle_serve_command(environment, config).await;
        }
    }
}
