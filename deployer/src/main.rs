//! Deployer - Entry Point
//!
//! Serves the push and manual trigger endpoints and runs the deployment
//! pipeline. `--deploy` asks an already running instance to deploy.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use colored::Colorize;
use deployer::app::options::AppOptions;
use deployer::app::run::run;
use deployer::cli::trigger_deploy;
use deployer::filesys::file::File;
use deployer::logs::{init_logging, LogOptions};
use deployer::storage::settings::Settings;
use deployer::storage::variables::{deploy_secret_from_env, DeployerVariables};
use deployer::utils::version_info;

use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "deployer.json";

#[tokio::main]
async fn main() -> ExitCode {
    // Secrets may live in a .env file next to the binary
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return ExitCode::SUCCESS;
    }

    // Retrieve the settings file
    let config_path = cli_args
        .get("config")
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_PATH);
    let settings_file = File::new(config_path);
    let using_defaults = !settings_file.exists().await;
    let settings = match Settings::load(&settings_file).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {}", "Unable to read settings file:".red(), e);
            return ExitCode::FAILURE;
        }
    };

    // Send the manual trigger to the running service and exit
    if let Some(product) = cli_args.get("deploy") {
        let product = match product.as_str() {
            "true" => settings.deployer.product_name.clone(),
            product => product.to_string(),
        };
        return deploy(&settings, &product).await;
    }

    // Both secrets are required before anything listens
    let variables = match DeployerVariables::from_env() {
        Ok(variables) => variables,
        Err(e) => {
            eprintln!("{} {}", "Missing secrets:".red(), e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.clone(),
        json_format: settings.log_json,
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };
    if using_defaults {
        info!("No settings file at {}, using defaults", config_path);
    }

    // Run the server
    let options = AppOptions::from_settings(&settings);
    info!(
        "Running deployer {} ({}) with options: {:?}",
        version.version, version.git_hash, options
    );
    if let Err(e) = run(options, variables, await_shutdown_signal()).await {
        error!("Failed to run the deployer: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn deploy(settings: &Settings, product: &str) -> ExitCode {
    let secret = match deploy_secret_from_env() {
        Ok(secret) => secret,
        Err(e) => {
            eprintln!("{} {}", "Missing secret:".red(), e);
            return ExitCode::FAILURE;
        }
    };

    match trigger_deploy(settings, product, &secret).await {
        Ok((status, body)) if status.is_success() => {
            println!("{} {}. {}", "Deployer Response:".green(), status, body);
            ExitCode::SUCCESS
        }
        Ok((status, body)) => {
            println!("{} {}. {}", "Deployer Response:".red(), status, body);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{} {:#}", "Deploy request failed:".red(), e);
            ExitCode::FAILURE
        }
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Failed to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}
