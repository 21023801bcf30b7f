//! `auditchain-verify verify <pack.json> [--public-key <pem>]...`
//!
//! Exit status 0 on PASS, 1 on FAIL or any usage error.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use auditchain_verify::{verify_pack_file, TrustedKeys};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Offline verifier for auditchain forensic packs.
#[derive(Parser)]
#[command(name = "auditchain-verify")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log each check as it runs (also honours RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify a forensic pack
    Verify {
        /// Path to the exported pack JSON
        pack: PathBuf,

        /// Trusted checkpoint public key (SPKI PEM or raw hex); repeatable
        #[arg(long = "public-key", value_name = "PEM")]
        public_keys: Vec<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if cli.verbose || std::env::var_os("RUST_LOG").is_some() {
        let default = if cli.verbose { "debug" } else { "warn" };
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
            )
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }

    match run(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> anyhow::Result<bool> {
    match command {
        Command::Verify {
            pack,
            public_keys,
            json,
        } => {
            let keys = TrustedKeys::from_files(&public_keys).context("loading public keys")?;
            let report = verify_pack_file(&pack, &keys)
                .with_context(|| format!("verifying {}", pack.display()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report.to_json())?);
            } else {
                print!("{report}");
            }
            Ok(report.passed())
        }
    }
}
