use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::{
    AttendanceLedger, Config, Directory, Embedding, EuclideanMatcher, Mark, Matcher,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rollcall", about = "rollcall attendance tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List roster identities, enrollment status and member counts
    Roster,
    /// Print the attendance ledger
    Ledger,
    /// Record attendance for one identity; members not listed are marked absent
    Mark {
        /// Identity (roster name) the members belong to
        identity: String,
        /// Member marked present (repeatable)
        #[arg(short, long = "present")]
        present: Vec<String>,
    },
    /// Match a probe embedding (JSON) against the gallery
    Match {
        /// File holding one embedding, e.g. {"values": [...]}
        probe: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Roster => {
            let directory = load_directory(&config)?;
            for identity in directory.gallery.identities() {
                let status = match &identity.embedding {
                    Some(e) => format!("enrolled ({} dims)", e.dim()),
                    None => "NOT ENROLLED".to_string(),
                };
                println!(
                    "{:<24} {:<20} {} members",
                    identity.name,
                    status,
                    directory.members.members_of(&identity.name).len()
                );
            }
        }
        Commands::Ledger => {
            let ledger = AttendanceLedger::new(&config.ledger_path);
            let table = ledger
                .load()
                .with_context(|| format!("reading {}", config.ledger_path.display()))?;
            if table.is_empty() {
                println!("No attendance recorded");
            }
            tracing::debug!(rows = table.len(), path = %ledger.path().display(), "ledger read");
            for record in table.records() {
                println!(
                    "{:<24} {:<24} {}",
                    record.identity,
                    record.member,
                    if record.present { "P" } else { "" }
                );
            }
        }
        Commands::Mark { identity, present } => {
            let directory = load_directory(&config)?;
            if !directory.members.contains(&identity) {
                bail!("{identity:?} is not in the roster");
            }
            let members = directory.members.members_of(&identity);
            if let Some(unknown) = present.iter().find(|p| !members.contains(p)) {
                bail!("{unknown:?} is not a member under {identity:?}");
            }
            let marks: Vec<Mark> = members
                .iter()
                .map(|m| Mark::new(m.clone(), present.contains(m)))
                .collect();
            tracing::debug!(identity = %identity, members = members.len(), "recording manual attendance");

            let ledger = AttendanceLedger::new(&config.ledger_path);
            let table = ledger
                .upsert(&identity, &marks)
                .with_context(|| format!("saving {}", config.ledger_path.display()))?;
            println!(
                "Attendance updated for {identity}: {} present of {} ({} rows in ledger)",
                marks.iter().filter(|m| m.present).count(),
                marks.len(),
                table.len()
            );
        }
        Commands::Match { probe } => {
            let directory = load_directory(&config)?;
            let text = std::fs::read_to_string(&probe)
                .with_context(|| format!("reading {}", probe.display()))?;
            let embedding: Embedding = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", probe.display()))?;
            let outcome = EuclideanMatcher.compare(
                &embedding,
                directory.gallery.identities(),
                config.match_threshold,
            );
            tracing::debug!(probe = %probe.display(), dim = embedding.dim(), ?outcome, "probe matched");
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }

    Ok(())
}

fn load_directory(config: &Config) -> Result<Directory> {
    Directory::load(&config.roster_path, &config.enroll_dir).with_context(|| {
        format!(
            "loading roster {} with enrollments from {}",
            config.roster_path.display(),
            config.enroll_dir.display()
        )
    })
}
