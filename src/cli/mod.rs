// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap, hands a config to the matching
// use case and prints its result. No computation happens here.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{CensusArgs, Commands, EvaluateArgs, RemediateArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "token-dynamics",
    version = "0.1.0",
    about = "Record per-token training dynamics of a sequence tagger and use them to remediate noisy labels."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)     => run_train(args),
            Commands::Remediate(args) => run_remediate(args),
            Commands::Evaluate(args)  => run_evaluate(args),
            Commands::Census(args)    => run_census(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on '{}'", args.train_file);
    let output_dir = args.output_dir.clone();
    let summaries = TrainUseCase::new(args.into()).execute()?;

    if let Some(last) = summaries.last() {
        println!(
            "Trained {} epochs: loss {:.4}, observed acc {:.2}%, clean acc {:.2}%",
            last.epoch,
            last.train_loss,
            last.observed_accuracy * 100.0,
            last.clean_accuracy * 100.0
        );
    }
    println!("Epoch logs written to '{output_dir}'");
    Ok(())
}

fn run_remediate(args: RemediateArgs) -> Result<()> {
    use crate::application::remediate_use_case::{RemediateConfig, RemediateUseCase};

    let config = RemediateConfig::from_file(std::path::Path::new(&args.experiment))?;
    let output_dir = config.output_dir.clone();
    let report = RemediateUseCase::new(config).execute()?;

    println!("Initial noise F1: {:.4}", report.initial.micro.f1);
    for outcome in &report.outcomes {
        println!(
            "epoch {:>3} | category {} | {:<7} | changed {:>6} | propagated {:>5} | F1 {:.4}",
            outcome.step.trigger_epoch,
            outcome.step.category,
            outcome.step.action.to_string(),
            outcome.counts.changed,
            outcome.counts.propagated,
            outcome.evaluation.micro.f1
        );
    }
    println!("Outputs written to '{output_dir}'");
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let result = EvaluateUseCase::new(args.corpus, args.separator.separator()).execute()?;
    println!("micro F1: {:.4}", result.micro.f1);
    println!("macro F1: {:.4}", result.macro_avg.f1);
    println!("accuracy: {:.4}\n", result.accuracy);
    print!("{}", result.detailed_report());
    Ok(())
}

fn run_census(args: CensusArgs) -> Result<()> {
    use crate::application::census_use_case::CensusUseCase;

    let (rows, path) = CensusUseCase::new(args.epoch_log_dir).execute()?;
    println!("{:>5} {:>8} {:>8} {:>8}", "epoch", "category", "clean", "noisy");
    for row in &rows {
        println!("{:>5} {:>8} {:>8} {:>8}", row.epoch, row.category.id(), row.clean, row.noisy);
    }
    println!("Census written to '{}'", path.display());
    Ok(())
}
