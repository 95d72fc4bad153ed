use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use views_mlp::{Experiment, OptimizerKind, RunConfig, table};

/// Train a feed-forward regressor on video metadata and report how well it
/// predicts view counts.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Metadata table (CSV with a header row).
    data: PathBuf,

    /// JSON run configuration; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f32>,

    /// adam, sgd or sgd_momentum.
    #[arg(long)]
    optimizer: Option<OptimizerKind>,

    /// Seed for the train/test split.
    #[arg(long)]
    seed: Option<u64>,

    /// Seed for parameter init, dropout and shuffling (OS entropy when absent).
    #[arg(long)]
    init_seed: Option<u64>,

    #[arg(long)]
    target_column: Option<String>,

    /// Print the epoch history as JSON once training finishes.
    #[arg(long)]
    history_json: bool,
}

impl Args {
    fn run_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_path(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => RunConfig::default(),
        };

        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(lr) = self.learning_rate {
            config.learning_rate = lr;
        }
        if let Some(optimizer) = self.optimizer {
            config.optimizer = optimizer;
        }
        if let Some(seed) = self.seed {
            config.random_seed = seed;
        }
        if self.init_seed.is_some() {
            config.init_seed = self.init_seed;
        }
        if let Some(target) = &self.target_column {
            config.target_column = target.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.run_config()?;

    let table = table::load_csv(&args.data, &config.target_column, &config.exclude_columns)
        .with_context(|| format!("loading table {}", args.data.display()))?;
    info!(
        "loaded {} rows with features {:?}",
        table.matrix.len(),
        table.feature_names
    );

    let experiment = Experiment::new(config)?;
    let report = experiment.run_with(&table.matrix, |r| {
        println!(
            "Epoch {:>3}/{}: train loss {:.4}, train rmse {:.4}, test loss {:.4}, test rmse {:.4}",
            r.epoch,
            experiment.config().epochs,
            r.train_loss,
            r.train_rmse,
            r.test_loss,
            r.test_rmse
        );
    })?;

    println!(
        "Correlation (log scale):    {:.4}",
        report.evaluation.log_correlation()
    );
    println!(
        "Correlation (linear scale): {:.4}",
        report.evaluation.linear_correlation()
    );

    if args.history_json {
        println!("{}", serde_json::to_string_pretty(&report.history)?);
    }

    Ok(())
}
