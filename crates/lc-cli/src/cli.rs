//! Command definitions and handlers.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use lc_data::{apply_features, CsvLoader};
use lc_models::GradientBoostedTrees;
use lc_optimizer::{
    ModelType, ReportingPruningFactory, SearchSpace, Study, TrialObjective, TrialParameters,
    TuningConfig,
};
use lc_types::{Dataset, HORIZON_COLUMN};

/// Environment variable naming a default tuning config file.
pub const CONFIG_ENV: &str = "LOADCAST_CONFIG";

#[derive(Parser, Debug)]
#[command(name = "loadcast", version, about = "Load forecasting features and hyperparameter tuning")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Derive feature columns and write the enriched data
    Features(FeaturesArgs),
    /// Tune booster hyperparameters and print the best set as JSON
    Tune(TuneArgs),
}

#[derive(Args, Debug)]
pub struct FeaturesArgs {
    /// Input CSV with a timestamp column and `load` first
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output CSV
    #[arg(short, long)]
    pub output: PathBuf,

    /// Features to derive, comma separated (e.g. T-1d,IsWeekendDay)
    #[arg(short, long, value_delimiter = ',')]
    pub features: Option<Vec<String>>,

    /// Forecast horizon in hours; also written as the `horizon` column
    #[arg(long)]
    pub horizon: Option<f64>,
}

#[derive(Args, Debug)]
pub struct TuneArgs {
    /// Input CSV with a timestamp column and `load` first
    #[arg(short, long)]
    pub input: PathBuf,

    /// Search space JSON (defaults to the built-in gradient boosted ranges)
    #[arg(short, long)]
    pub space: Option<PathBuf>,

    /// Tuning config JSON (defaults to $LOADCAST_CONFIG when set)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of trials
    #[arg(short, long)]
    pub trials: Option<usize>,

    /// Worker threads for parallel trials
    #[arg(short, long)]
    pub jobs: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Wall-clock budget in seconds
    #[arg(long)]
    pub budget_secs: Option<u64>,

    /// Forecast horizon in hours
    #[arg(long)]
    pub horizon: Option<f64>,

    /// Features to derive before tuning, comma separated
    #[arg(short, long, value_delimiter = ',')]
    pub features: Option<Vec<String>>,
}

/// Load, derive features and place the horizon column last.
fn prepare(input: &Path, features: Option<&[String]>, horizon: Option<f64>) -> anyhow::Result<Dataset> {
    let data = CsvLoader::new()
        .load(input)
        .with_context(|| format!("loading {}", input.display()))?;

    let horizon_hours = match horizon {
        Some(h) => h,
        None => data
            .column(HORIZON_COLUMN)
            .and_then(|c| c.first().copied())
            .unwrap_or(24.0),
    };
    let data = apply_features(data, features, horizon_hours)?;

    Ok(match horizon {
        Some(h) => data.with_horizon(h),
        None => data,
    })
}

pub fn cmd_features(args: &FeaturesArgs) -> anyhow::Result<()> {
    let data = prepare(&args.input, args.features.as_deref(), args.horizon)?;
    CsvLoader::new()
        .write(&data, &args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    tracing::info!(
        "Wrote {} columns to {}",
        data.num_columns(),
        args.output.display()
    );
    Ok(())
}

fn load_config(args: &TuneArgs) -> anyhow::Result<TuningConfig> {
    let path = args
        .config
        .clone()
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    let mut config = match path {
        Some(path) => TuningConfig::from_json_file(&path)
            .with_context(|| format!("reading tuning config {}", path.display()))?,
        None => TuningConfig::default(),
    };

    if let Some(trials) = args.trials {
        config = config.with_trials(trials);
    }
    if let Some(jobs) = args.jobs {
        config = config.with_jobs(jobs);
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    if let Some(budget) = args.budget_secs {
        config = config.with_time_budget_secs(budget);
    }
    config.validate()?;
    Ok(config)
}

pub fn cmd_tune(args: &TuneArgs) -> anyhow::Result<TrialParameters> {
    let config = load_config(args)?;
    let space = match &args.space {
        Some(path) => SearchSpace::from_json_file(path)
            .with_context(|| format!("reading search space {}", path.display()))?,
        None => {
            let model = ModelType::default();
            tracing::info!("Using the default {} search space", model);
            model.default_search_space()
        }
    };
    let data = prepare(&args.input, args.features.as_deref(), args.horizon)?;
    if !data.has_column(HORIZON_COLUMN) {
        bail!("input has no `{HORIZON_COLUMN}` column; pass --horizon");
    }

    tracing::info!(
        rows = data.len(),
        columns = data.num_columns(),
        trials = config.n_trials,
        budget_secs = config.time_budget_secs,
        "Tuning gradient boosted trees"
    );

    let mut study = Study::new(&config);
    if config.n_jobs > 1 {
        study.optimize_parallel(
            &data,
            &space,
            &config,
            &ReportingPruningFactory,
            GradientBoostedTrees::default,
            config.n_trials,
        )?;
    } else {
        let mut model = GradientBoostedTrees::default();
        let mut objective =
            TrialObjective::new(&data, &space, &config, &mut model, &ReportingPruningFactory)?;
        study.optimize(&mut objective, config.n_trials)?;
    }

    let best = study
        .best_trial()
        .context("no trial completed; check the time budget and the data")?;
    tracing::info!(trial = best.trial_number, loss = best.loss, "Best trial");
    Ok(best.parameters.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn hourly_csv(days: usize) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,load,temp").unwrap();
        for hour in 0..days * 24 {
            let (day, h) = (hour / 24, hour % 24);
            let temp = 5.0 + (h as f64 - 12.0).abs() * 0.5;
            let load = 200.0 - 3.0 * temp + if (8..18).contains(&h) { 25.0 } else { 0.0 };
            writeln!(
                file,
                "2023-03-{:02}T{:02}:00:00Z,{load},{temp}",
                day + 1,
                h
            )
            .unwrap();
        }
        file
    }

    #[test]
    fn parses_tune_flags() {
        let cli = Cli::try_parse_from([
            "loadcast", "tune", "--input", "data.csv", "--space", "space.json", "--trials", "5",
            "--features", "T-1d,IsSunday",
        ])
        .unwrap();
        let Commands::Tune(args) = cli.command else {
            panic!("expected tune");
        };
        assert_eq!(args.trials, Some(5));
        assert_eq!(
            args.features,
            Some(vec!["T-1d".to_string(), "IsSunday".to_string()])
        );
        assert!(args.config.is_none());
        assert_eq!(args.space, Some(PathBuf::from("space.json")));

        let cli = Cli::try_parse_from(["loadcast", "tune", "--input", "data.csv"]).unwrap();
        let Commands::Tune(args) = cli.command else {
            panic!("expected tune");
        };
        assert!(args.space.is_none());
    }

    #[test]
    fn features_command_writes_enriched_csv() {
        let input = hourly_csv(10);
        let output = NamedTempFile::new().unwrap();
        let args = FeaturesArgs {
            input: input.path().to_path_buf(),
            output: output.path().to_path_buf(),
            features: Some(vec!["T-1d".into(), "IsWeekendDay".into()]),
            horizon: Some(24.0),
        };
        cmd_features(&args).unwrap();

        let written = CsvLoader::new().load(output.path()).unwrap();
        assert_eq!(written.column_names()[0], "load");
        assert!(written.has_column("T-1d"));
        assert!(written.has_column("IsWeekendDay"));
        assert_eq!(written.column_names().last().unwrap(), "horizon");
    }

    #[test]
    fn tune_prints_parameters_within_bounds() {
        let input = hourly_csv(20);
        let mut space = NamedTempFile::new().unwrap();
        space
            .write_all(br#"{"eta": [[0.05, 0.3], false], "max_depth": [[2, 5], false]}"#)
            .unwrap();
        let args = TuneArgs {
            input: input.path().to_path_buf(),
            space: Some(space.path().to_path_buf()),
            config: None,
            trials: Some(3),
            jobs: None,
            seed: Some(7),
            budget_secs: None,
            horizon: Some(24.0),
            features: Some(vec!["T-1d".into()]),
        };
        let best = cmd_tune(&args).unwrap();
        let eta = best.get("eta").and_then(|v| v.as_f64()).unwrap();
        assert!((0.05..=0.3).contains(&eta));
        assert!(best.get("max_depth").and_then(|v| v.as_i64()).is_some());
    }

    #[test]
    fn tune_falls_back_to_the_default_space() {
        let input = hourly_csv(20);
        let args = TuneArgs {
            input: input.path().to_path_buf(),
            space: None,
            config: None,
            trials: Some(2),
            jobs: None,
            seed: Some(3),
            budget_secs: None,
            horizon: Some(24.0),
            features: None,
        };
        let best = cmd_tune(&args).unwrap();
        assert_eq!(best.len(), 6);
        let subsample = best.get("subsample").and_then(|v| v.as_f64()).unwrap();
        assert!((0.5..=1.0).contains(&subsample));
        let depth = best.get("max_depth").and_then(|v| v.as_i64()).unwrap();
        assert!((3..=10).contains(&depth));
    }

    #[test]
    fn tune_requires_a_horizon() {
        let input = hourly_csv(5);
        let mut space = NamedTempFile::new().unwrap();
        space.write_all(br#"{"max_depth": [[2, 5], false]}"#).unwrap();
        let args = TuneArgs {
            input: input.path().to_path_buf(),
            space: Some(space.path().to_path_buf()),
            config: None,
            trials: Some(1),
            jobs: None,
            seed: None,
            budget_secs: None,
            horizon: None,
            features: None,
        };
        assert!(cmd_tune(&args).is_err());
    }
}
