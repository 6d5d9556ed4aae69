// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use clap::{Parser, Subcommand};
use neural_ledger_cli::commands::{checkpoint, load, report, timeline, verify};
use neural_ledger_node::load::LoadProfile;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "neural-ledger")]
#[command(about = "Neural Ledger audit tool - verify, report on and exercise a tamper-evident event archive", long_about = None)]
struct Cli {
    /// Root directory of the event archive.
    #[arg(long, short, global = true, default_value = "ledger-archive")]
    archive: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-hash archived events and check the chain links
    Verify {
        /// Window start (RFC 3339 or YYYY-MM-DD). Defaults to seven days ago.
        #[arg(long)]
        from: Option<String>,
        /// Window end, exclusive. Defaults to now.
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Generate a compliance report
    Report {
        /// hipaa, gdpr, fda, a comma-separated list, or all
        #[arg(long, short, default_value = "all")]
        framework: String,
        /// Restrict to one data subject (user id)
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List archived events in chain order
    Timeline {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        user: Option<String>,
        /// Show at most this many of the latest events
        #[arg(long, short, default_value_t = 50)]
        limit: usize,
    },
    /// Create a Merkle checkpoint, or verify a saved one
    Checkpoint {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        /// Save the checkpoint as JSON
        #[arg(long)]
        out: Option<PathBuf>,
        /// Verify this saved checkpoint instead of creating one
        #[arg(long, conflicts_with = "out")]
        verify: Option<PathBuf>,
    },
    /// Sustained load: a batch of concurrent appends every interval
    Load {
        #[arg(long, default_value_t = 10)]
        batch: usize,
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
        #[arg(long, default_value_t = 60)]
        duration_secs: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let archive = cli.archive.as_path();

    match cli.command {
        Commands::Verify { from, to, json } => verify::run(archive, from.as_deref(), to.as_deref(), json),
        Commands::Report {
            framework,
            subject,
            from,
            to,
            json,
        } => report::run(
            archive,
            &framework,
            subject.as_deref(),
            from.as_deref(),
            to.as_deref(),
            json,
        ),
        Commands::Timeline {
            from,
            to,
            session,
            user,
            limit,
        } => timeline::run(
            archive,
            timeline::TimelineArgs {
                from: from.as_deref(),
                to: to.as_deref(),
                session: session.as_deref(),
                user: user.as_deref(),
                limit,
            },
        ),
        Commands::Checkpoint { from, to, out, verify } => match verify {
            Some(path) => checkpoint::verify(archive, &path),
            None => checkpoint::create(archive, from.as_deref(), to.as_deref(), out.as_deref()).map(|_| ()),
        },
        Commands::Load {
            batch,
            interval_ms,
            duration_secs,
        } => {
            neural_ledger_node::telemetry::init_telemetry();
            let profile = LoadProfile {
                batch_size: batch,
                interval: Duration::from_millis(interval_ms),
                duration: Duration::from_secs(duration_secs),
            };
            load::run(archive, profile).map(|_| ())
        }
    }
}
