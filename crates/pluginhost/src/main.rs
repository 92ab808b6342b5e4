mod demo;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info};

use pluginhost_core::kernel::constants;
use pluginhost_core::{Application, PluginConfig};

/// Pluginhost: boots plugin clusters from template files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Print "pong" and exit
    #[arg(long)]
    ping: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the built-in plugin classes
    Catalog,
    /// Start a cluster template, print the published services and shut down
    Run {
        /// Cluster template (.json, .yaml or .toml)
        file: PathBuf,
        /// Cluster parameter as KEY=VALUE; may be repeated
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env = env_logger::Env::default().default_filter_or(default_level);
    if let Err(e) = env_logger::Builder::from_env(env).try_init() {
        eprintln!("Failed to initialize env_logger: {}", e);
    }
}

fn run(app: &mut Application, file: PathBuf, params: Vec<(String, String)>) -> pluginhost_core::Result<()> {
    let mut parameters = PluginConfig::new("parameters");
    for (key, value) in params {
        parameters.put(&key, value);
    }

    let cluster = app.load_and_run(&file, &parameters)?;
    let contexts = cluster.plugin_contexts();
    println!(
        "Cluster {} running ({} of {} plugins started)",
        cluster.id(),
        contexts.iter().flatten().count(),
        contexts.len()
    );

    println!("Services:");
    let table = app.service_table();
    if table.is_empty() {
        println!("  (none)");
    }
    for entry in table {
        let ids: Vec<String> = entry.ids.iter().map(u64::to_string).collect();
        println!("  {} -> [{}]", entry.name, ids.join(", "));
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    if args.ping {
        println!("pong");
        return ExitCode::SUCCESS;
    }

    init_logging(args.verbose);
    info!("{} v{}", constants::APP_NAME, constants::APP_VERSION);

    let Some(command) = args.command else {
        println!("No command specified; try `{} --help`", constants::APP_NAME);
        return ExitCode::SUCCESS;
    };

    match command {
        Commands::Catalog => {
            println!("Built-in plugins:");
            for name in demo::catalog().names() {
                println!("  - {}", name);
            }
            ExitCode::SUCCESS
        }
        Commands::Run { file, params } => {
            println!("Initializing application...");
            let mut app = Application::new(demo::catalog());
            let outcome = run(&mut app, file, params);

            println!("Shutting down application...");
            let shutdown = app.shutdown();
            match outcome.and(shutdown) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!("{}", e);
                    eprintln!("Error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}
