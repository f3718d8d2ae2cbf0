mod cmd;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "opengpt")]
#[command(version = "0.5.0")]
#[command(about = "Inspect and validate GGUF model files", long_about = None)]
struct Cli {
    /// Log decoding progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print header, metadata and tensor directory
    Info {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Exit with status 0 if the file is a usable text model
    Check { path: PathBuf },
    /// Read one tensor's payload
    Tensor {
        path: PathBuf,
        name: String,
        /// Read unknown tensor types as f32
        #[arg(long)]
        f32_fallback: bool,
        /// Number of values to print
        #[arg(short, long, default_value_t = 16)]
        limit: usize,
    },
    /// Prompt for a language model path until a valid one is given
    Select,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("OPENGPT_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Info { path, json } => cmd::info(&path, json).map(|_| true),
        Commands::Check { path } => cmd::check(&path),
        Commands::Tensor {
            path,
            name,
            f32_fallback,
            limit,
        } => cmd::tensor(&path, &name, f32_fallback, limit).map(|_| true),
        Commands::Select => cmd::select().map(|_| true),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}
