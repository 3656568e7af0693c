use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use p3erp::{grand_average, run_participants, ParticipantOutcome, PipelineConfig};

/// Latency window (s) searched for the positive peak in the summary.
const P3_WINDOW: (f32, f32) = (0.25, 0.5);

#[derive(Parser)]
#[command(name = "p3erp", version, about = "P3 ERP pipeline: per-participant epochs and grand average")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Preprocess, epoch and persist each listed participant
    RunPerParticipant(ConfigArgs),
    /// Pool all persisted epoch sets into the grand average
    Aggregate(ConfigArgs),
    /// Print the resolved configuration as TOML
    PrintConfig(ConfigArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum Variant {
    A,
    B,
}

#[derive(Args)]
struct ConfigArgs {
    /// TOML configuration; missing keys take the preset's values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Built-in preset used when no --config is given
    #[arg(long, value_enum, default_value_t = Variant::A)]
    variant: Variant,

    /// Participant ids (comma-separated), replacing the configured list
    #[arg(long, value_delimiter = ',')]
    participants: Vec<String>,

    /// Output directory for epoch sets and plots
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl ConfigArgs {
    fn resolve(&self) -> Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => PipelineConfig::from_toml_file(path)?,
            None => match self.variant {
                Variant::A => PipelineConfig::variant_a(),
                Variant::B => PipelineConfig::variant_b(),
            },
        };
        if !self.participants.is_empty() {
            cfg.participants = self.participants.clone();
        }
        if let Some(dir) = &self.output_dir {
            cfg.output_dir = dir.clone();
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    match cli.command {
        Command::RunPerParticipant(args) => {
            let cfg = args.resolve()?;
            for (id, outcome) in run_participants(&cfg)? {
                match outcome {
                    ParticipantOutcome::Included { n_epochs, drop_rate, .. } => {
                        println!("P{id}: included, {n_epochs} epochs ({drop_rate:.1}% dropped)");
                    }
                    ParticipantOutcome::Excluded { drop_rate, output } => {
                        let note = if output.is_some() { ", persisted anyway" } else { "" };
                        println!("P{id}: excluded ({drop_rate:.1}% dropped{note})");
                    }
                }
            }
        }
        Command::Aggregate(args) => {
            let cfg = args.resolve()?;
            let grand = grand_average(&cfg)?;
            println!("Pooled {} epochs from {} file(s)", grand.epochs.len(), grand.sources.len());
            for ev in &grand.evokeds {
                let trace = ev.pick_mean(&cfg.plot.picks)?;
                match ev.peak_in(&trace, P3_WINDOW.0, P3_WINDOW.1) {
                    Some((t, v)) => println!("  {}: N={}, peak {:.2} µV at {:.0} ms", ev.comment, ev.nave, v * 1e6, t * 1e3),
                    None => println!("  {}: N={}", ev.comment, ev.nave),
                }
            }
            for path in &grand.plots {
                println!("Written → {}", path.display());
            }
        }
        Command::PrintConfig(args) => {
            print!("{}", args.resolve()?.to_toml()?);
        }
    }
    Ok(())
}
