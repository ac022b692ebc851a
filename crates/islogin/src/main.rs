#![forbid(unsafe_code)]

//! islogin CLI: verify island.is login tokens from the command line.

use std::io::Read;
use std::path::PathBuf;
use std::process;

use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand};
use islogin::{Error, TrustAnchorSource, Verifier, VerifierConfig};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "islogin",
    about = "Verify island.is electronic ID login tokens",
    version
)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a base64 login token and print its identity as JSON
    Verify {
        /// Token file (default: stdin)
        token: Option<PathBuf>,

        /// JSON configuration file
        #[arg(short, long, env = "ISLOGIN_CONFIG")]
        config: Option<PathBuf>,

        /// Expected audience, overrides the configuration
        #[arg(short, long, env = "ISLOGIN_AUDIENCE")]
        audience: Option<String>,

        /// Trust anchor PEM file, overrides the configuration
        #[arg(long)]
        anchor: Option<PathBuf>,

        /// Verify as of this RFC 3339 time instead of now
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Do not check NotBefore/NotOnOrAfter (testing only)
        #[arg(long = "no-verify-dates")]
        no_verify_dates: bool,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Show the configured trust anchors
    Anchors {
        /// JSON configuration file
        #[arg(short, long, env = "ISLOGIN_CONFIG")]
        config: Option<PathBuf>,

        /// Trust anchor PEM file, overrides the configuration
        #[arg(long)]
        anchor: Option<PathBuf>,
    },

    /// List supported algorithms
    Info,
}

/// Printed on stdout when a token is rejected.
#[derive(Serialize)]
struct Rejection {
    kind: islogin::ErrorKind,
    reason: String,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Verify {
            token,
            config,
            audience,
            anchor,
            at,
            no_verify_dates,
            pretty,
        } => cmd_verify(token, config, audience, anchor, at, no_verify_dates, pretty),

        Commands::Anchors { config, anchor } => cmd_anchors(config, anchor),

        Commands::Info => cmd_info(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(2);
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_verify(
    token: Option<PathBuf>,
    config: Option<PathBuf>,
    audience: Option<String>,
    anchor: Option<PathBuf>,
    at: Option<DateTime<Utc>>,
    no_verify_dates: bool,
    pretty: bool,
) -> Result<(), Error> {
    let mut config = load_config(config, anchor)?;
    if audience.is_some() {
        config.expected_audience = audience;
    }
    if no_verify_dates {
        config.enforce_temporal_window = false;
    }
    let verifier = Verifier::new(config)?;
    let token = read_token(token)?;

    let result = match at {
        Some(now) => verifier.verify_at(&token, now),
        None => verifier.verify(&token),
    };
    match result {
        Ok(identity) => {
            print_json(&identity, pretty)?;
            Ok(())
        }
        Err(e @ Error::Configuration(_)) => Err(e),
        Err(e) => {
            print_json(
                &Rejection {
                    kind: e.kind(),
                    reason: e.reason(),
                },
                pretty,
            )?;
            process::exit(1);
        }
    }
}

fn cmd_anchors(config: Option<PathBuf>, anchor: Option<PathBuf>) -> Result<(), Error> {
    let config = load_config(config, anchor)?;
    let store = config.trust_anchor.load()?;
    for anchor in store.anchors() {
        let cert = anchor.certificate();
        println!("Subject:    {}", cert.subject());
        println!("Issuer:     {}", cert.issuer());
        println!("Valid from: {}", cert.not_before());
        println!("Valid to:   {}", cert.not_after());
        if let Ok(Some(ski)) = cert.subject_key_identifier() {
            println!("Key ID:     {}", hex(&ski));
        }
        println!();
    }
    Ok(())
}

fn cmd_info() -> Result<(), Error> {
    println!("islogin {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Supported canonicalization:");
    println!("  C14N 1.0 (±comments)");
    println!("  Exclusive C14N 1.0 (±comments)");
    println!();
    println!("Supported transforms:");
    println!("  Enveloped signature, canonicalization");
    println!();
    println!("Supported digest algorithms:");
    println!("  SHA-1, SHA-256, SHA-384, SHA-512");
    println!();
    println!("Supported signature algorithms:");
    println!("  RSA PKCS#1 v1.5 (SHA-1, SHA-256, SHA-384, SHA-512)");
    println!("  ECDSA P-256 (SHA-1, SHA-256, SHA-384, SHA-512)");
    println!("  ECDSA P-384 (SHA-256, SHA-384, SHA-512)");
    Ok(())
}

// ── Utility functions ────────────────────────────────────────────────

fn load_config(path: Option<PathBuf>, anchor: Option<PathBuf>) -> Result<VerifierConfig, Error> {
    let mut config = match path {
        Some(path) => VerifierConfig::from_json_file(path)?,
        None => VerifierConfig::default(),
    };
    if let Some(anchor) = anchor {
        config.trust_anchor = TrustAnchorSource::PemFile(anchor);
    }
    Ok(config)
}

fn read_token(path: Option<PathBuf>) -> Result<String, Error> {
    match path {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(&path)
            .map_err(|e| Error::Configuration(format!("{}: {e}", path.display()))),
        _ => {
            let mut token = String::new();
            std::io::stdin()
                .read_to_string(&mut token)
                .map_err(|e| Error::Configuration(format!("stdin: {e}")))?;
            Ok(token)
        }
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), Error> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| Error::Configuration(format!("cannot serialize output: {e}")))?;
    println!("{json}");
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}
