// CLI application
use clap::Parser;
use compression::CompressionLevel;
use std::path::PathBuf;

mod commands;
mod compression;
mod progress;

#[derive(Parser)]
#[command(name = "jremap")]
#[command(about = "Recover class, method and field mappings between obfuscated JVM builds")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the full remapping pipeline
    Remap {
        /// Snapshot of the old build (.json or .json.zst)
        #[arg(long)]
        old: PathBuf,

        /// Snapshot of the new build (.json or .json.zst)
        #[arg(long)]
        new: PathBuf,

        /// Matcher configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Report output path
        #[arg(short, long, default_value = "remap-report.json")]
        output: PathBuf,

        /// Only match methods reachable from framework callbacks
        #[arg(long)]
        reachable: bool,

        /// Zstd level for `.zst` outputs (1-22)
        #[arg(long, default_value_t = 3)]
        level: i32,
    },
    /// Match classes only
    Classes {
        #[arg(long)]
        old: PathBuf,

        #[arg(long)]
        new: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write candidates as JSON instead of printing them
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Zstd level for `.zst` outputs (1-22)
        #[arg(long, default_value_t = 3)]
        level: i32,
    },
    /// Recover opaque-predicate constants from one snapshot
    Opaque {
        #[arg(short, long)]
        snapshot: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        reachable: bool,
    },
    /// Write the default matcher configuration
    Config {
        #[arg(short, long, default_value = "jremap.json")]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Remap {
            old,
            new,
            config,
            output,
            reachable,
            level,
        } => commands::remap(&old, &new, config.as_deref(), &output, reachable, CompressionLevel::new(level))?,
        Commands::Classes {
            old,
            new,
            config,
            output,
            level,
        } => commands::classes(&old, &new, config.as_deref(), output.as_deref(), CompressionLevel::new(level))?,
        Commands::Opaque {
            snapshot,
            config,
            reachable,
        } => {
            let pb = progress::create_progress_bar("Scanning call sites...");
            commands::opaque(&snapshot, config.as_deref(), reachable)?;
            pb.finish_and_clear();
        }
        Commands::Config { output } => commands::write_default_config(&output)?,
    }

    Ok(())
}
