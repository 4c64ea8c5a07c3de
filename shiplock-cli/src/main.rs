//! ShipLock command line.
//!
//! Usage:
//!   shiplock keygen --out-dir keys/
//!   shiplock issue --key keys/shiplock_private.key --product P-1 --client Acme --expires 2025-12-31
//!   shiplock verify --license license.key --public-key keys/shiplock_public.key
//!   shiplock manifest build --root bundle/
//!   shiplock gate --config shiplock.toml
//!
//! Results go to stdout, logs to stderr. `verify`, `manifest verify` and
//! `gate` exit with the gate exit codes.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use shiplock_gate::EXIT_USAGE;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shiplock", version)]
#[command(about = "Offline license issuance and bundle integrity gate")]
struct Args {
    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a vendor key pair
    Keygen {
        /// Directory for shiplock_private.key and shiplock_public.key
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Passphrase sealing the private key
        #[arg(long, env = "SHIPLOCK_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,

        /// Store the private key without a passphrase
        #[arg(long, conflicts_with = "passphrase")]
        no_passphrase: bool,
    },

    /// Issue a signed license
    Issue {
        /// Vendor private key file
        #[arg(short, long)]
        key: PathBuf,

        #[arg(long, env = "SHIPLOCK_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,

        #[arg(long)]
        product: String,

        #[arg(long)]
        client: String,

        /// YYYY-MM-DD, RFC 3339 timestamp, or "never"
        #[arg(long, default_value = "never")]
        expires: String,

        /// Bind to this machine
        #[arg(long)]
        machine_bound: bool,

        /// Bind to another machine's id (from `shiplock fingerprint`)
        #[arg(long, conflicts_with = "machine_bound")]
        machine_id: Option<String>,

        /// Feature flag as NAME=VALUE; VALUE is parsed as JSON when possible
        #[arg(long = "feature", value_name = "NAME=VALUE")]
        features: Vec<String>,

        /// Output artifact path
        #[arg(short, long, default_value = "license.key")]
        out: PathBuf,
    },

    /// Verify a license artifact
    Verify {
        #[arg(short, long, default_value = "license.key")]
        license: PathBuf,

        /// Trusted vendor public key (PEM)
        #[arg(long)]
        public_key: Option<PathBuf>,

        /// Refuse artifacts when no trusted key is given
        #[arg(long)]
        require_trusted_key: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print this machine's fingerprint
    Fingerprint {
        #[arg(long)]
        json: bool,
    },

    /// Build or verify a bundle manifest
    Manifest {
        #[command(subcommand)]
        action: ManifestAction,
    },

    /// Run the runtime gate
    Gate {
        #[arg(short, long, default_value = shiplock_gate::CONFIG_FILE)]
        config: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Verify a license and record a local activation
    Activate {
        #[arg(short, long, default_value = "license.key")]
        license: PathBuf,

        #[arg(long)]
        public_key: Option<PathBuf>,

        /// Activation record path (default ~/.shiplock/activation.json)
        #[arg(long)]
        store: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ManifestAction {
    /// Digest every file under ROOT into MANIFEST.json
    Build {
        #[arg(short, long)]
        root: PathBuf,

        /// Output path (default ROOT/MANIFEST.json)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Relative path to leave out; repeatable
        #[arg(long)]
        exclude: Vec<String>,

        #[arg(long)]
        workers: Option<usize>,
    },

    /// Check ROOT against its manifest
    Verify {
        #[arg(short, long)]
        root: PathBuf,

        /// Manifest path (default ROOT/MANIFEST.json)
        #[arg(short, long)]
        manifest: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match commands::run(args.command) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_USAGE as u8)
        }
    }
}
