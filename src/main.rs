use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;

use autha_directory::telemetry::{self, BoxError};
use autha_directory::{Configuration, LoginAttempt, MultiDirectory};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of the YAML configuration.
    #[arg(long, short, env = "AUTHA_DIRECTORY_CONFIG")]
    config: Option<PathBuf>,
    /// Export logs to this OTLP collector.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,
    /// Print Prometheus metrics to stderr once the command is done.
    #[arg(long)]
    metrics: bool,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Check a password and print the matching user.
    Login {
        name: String,
        /// Read from stdin when unset.
        #[arg(long, env = "AUTHA_DIRECTORY_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Print users found for the given logins.
    Users {
        #[arg(required = true)]
        logins: Vec<String>,
    },
    /// Report which servers answer.
    Ping,
}

fn read_password() -> Result<String, BoxError> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

async fn run(args: Args) -> Result<(), BoxError> {
    let config = Configuration::read(args.config.as_deref())?;
    let directory = MultiDirectory::new(config);

    let output = match args.cmd {
        Commands::Login { name, password } => {
            let password = match password {
                Some(password) => password,
                None => read_password()?,
            };
            let user = directory.login(&LoginAttempt::new(name, password)).await?;
            serde_json::to_string_pretty(&user)?
        },
        Commands::Users { logins } => {
            serde_json::to_string_pretty(&directory.users(&logins).await?)?
        },
        Commands::Ping => serde_json::to_string_pretty(&directory.ping().await?)?,
    };

    println!("{output}");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let provider = match telemetry::init(args.otlp_endpoint.as_deref()) {
        Ok(provider) => provider,
        Err(err) => {
            eprintln!("cannot initialize logging: {err}");
            return ExitCode::FAILURE;
        },
    };

    let metrics = match telemetry::setup_metrics_recorder() {
        Ok(handle) => args.metrics.then_some(handle),
        Err(err) => {
            eprintln!("cannot install metrics recorder: {err}");
            return ExitCode::FAILURE;
        },
    };

    let code = match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("{err}");
            ExitCode::FAILURE
        },
    };

    if let Some(handle) = metrics {
        eprint!("{}", handle.render());
    }

    if let Some(provider) = provider {
        if let Err(err) = provider.shutdown() {
            eprintln!("failed to flush logs: {err}");
        }
    }

    code
}
