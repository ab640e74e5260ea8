// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Four subcommands: `train`, `remediate`, `evaluate`, `census`.
//
// Mode-like flags (--metrics-mode, --layer-loss) are parsed
// through the FromStr impls of their application types, so
// the accepted spellings match the JSON configs.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainConfig;
use crate::data::loader::DEFAULT_DOCUMENT_SEPARATOR;
use crate::ml::model::LayerLossWeighting;
use crate::ml::trainer::MetricsMode;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the tagger and record per-token training dynamics
    Train(TrainArgs),

    /// Mask or relabel tokens per category from recorded epoch logs
    Remediate(RemediateArgs),

    /// Report the label noise of a corpus (observed vs clean)
    Evaluate(EvaluateArgs),

    /// Count clean/noisy tokens per category for every epoch log
    Census(CensusArgs),
}

/// Separator handling shared by the corpus-reading commands.
#[derive(Args, Debug)]
pub struct SeparatorArgs {
    /// Token that marks document boundaries; such sentences are skipped
    #[arg(long, default_value = DEFAULT_DOCUMENT_SEPARATOR)]
    pub document_separator: String,

    /// Treat document separator lines as ordinary sentences
    #[arg(long)]
    pub no_document_separator: bool,
}

impl SeparatorArgs {
    pub fn separator(&self) -> Option<String> {
        (!self.no_document_separator).then(|| self.document_separator.clone())
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Three-column corpus file: token, clean tag, observed tag
    #[arg(long)]
    pub train_file: String,

    /// Run directory for epoch logs, metrics.csv and config
    #[arg(long, default_value = "runs/baseline")]
    pub output_dir: String,

    #[command(flatten)]
    pub separator: SeparatorArgs,

    #[arg(long, default_value_t = 10)]
    pub epochs: u32,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Width of embeddings and hidden blocks
    #[arg(long, default_value_t = 128)]
    pub d_model: usize,

    /// Number of stacked feed-forward blocks
    #[arg(long, default_value_t = 4)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Vocabulary rows, including [PAD] and [UNK]
    #[arg(long, default_value_t = 50_000)]
    pub max_vocab: usize,

    /// Seed for weights and batch shuffling
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Decoder head after every block plus the layer metrics
    #[arg(long)]
    pub early_exit: bool,

    /// Early-exit loss: average, weighted or last_only
    #[arg(long, default_value = "average")]
    pub layer_loss: LayerLossWeighting,

    /// When metrics are taken: batch_forward or epoch_end
    #[arg(long, default_value = "batch_forward")]
    pub metrics_mode: MetricsMode,

    /// Add the MASK label type (zero loss weight)
    #[arg(long)]
    pub with_mask: bool,

    /// Save the final weights into the run directory
    #[arg(long)]
    pub save_model: bool,
}

impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            document_separator: a.separator.separator(),
            train_file:         a.train_file,
            output_dir:         a.output_dir,
            epochs:             a.epochs,
            batch_size:         a.batch_size,
            lr:                 a.lr,
            d_model:            a.d_model,
            num_layers:         a.num_layers,
            dropout:            a.dropout,
            max_vocab:          a.max_vocab,
            seed:               a.seed,
            early_exit:         a.early_exit,
            layer_loss:         a.layer_loss,
            metrics_mode:       a.metrics_mode,
            with_mask:          a.with_mask,
            save_model:         a.save_model,
        }
    }
}

#[derive(Args, Debug)]
pub struct RemediateArgs {
    /// JSON experiment file (train_file, epoch_log_dir, modify_categoryN, ...)
    #[arg(long)]
    pub experiment: String,
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Three-column corpus file
    #[arg(long)]
    pub corpus: String,

    #[command(flatten)]
    pub separator: SeparatorArgs,
}

#[derive(Args, Debug)]
pub struct CensusArgs {
    /// Run directory holding epoch_log_<n>.log files
    #[arg(long)]
    pub epoch_log_dir: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_args_into_config() {
        let cli = Cli::try_parse_from([
            "token-dynamics", "train",
            "--train-file", "noisy.train",
            "--early-exit",
            "--layer-loss", "last_only",
            "--metrics-mode", "epoch_end",
            "--no-document-separator",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();

        assert_eq!(cfg.train_file, "noisy.train");
        assert!(cfg.early_exit);
        assert_eq!(cfg.layer_loss, LayerLossWeighting::LastOnly);
        assert_eq!(cfg.metrics_mode, MetricsMode::EpochEnd);
        assert_eq!(cfg.document_separator, None);
    }

    #[test]
    fn test_unknown_metrics_mode_rejected() {
        let parsed = Cli::try_parse_from([
            "token-dynamics", "train", "--train-file", "x", "--metrics-mode", "never",
        ]);
        assert!(parsed.is_err());
    }
}
