//! Volcast CLI binary.
//!
//! Builds bucket tables from trades, joins instruments and runs the volume
//! forecasting pipeline against the persistence baseline.

use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use volcast::data::cache::open_cache;
use volcast::data::io::{parse_time, read_table_csv, read_trades_csv, write_table_csv};
use volcast::data::{
    CachedProvider, CsvProvider, Instrument, SessionConfig, aggregate_trades, load_joined,
};
use volcast::eval::{ExportFormat, Exporter, MetricsExport};
use volcast::{PipelineConfig, VolumePipeline};

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "volcast")]
#[command(about = "Volcast: intraday volume forecasting", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a trades CSV into session buckets
    Aggregate {
        /// Trades CSV with `time` and `size` columns
        #[arg(long)]
        trades: PathBuf,

        /// Bucket CSV to write
        #[arg(long)]
        output: PathBuf,

        /// Bucket length in seconds
        #[arg(long, default_value = "600")]
        bucket_secs: u32,
    },

    /// Join futures, ETF and options buckets into one table
    Join {
        /// Futures bucket CSV
        #[arg(long)]
        fut: PathBuf,

        /// ETF bucket CSV
        #[arg(long)]
        etf: PathBuf,

        /// Options bucket CSV
        #[arg(long)]
        opt: PathBuf,

        /// Joined CSV to write
        #[arg(long)]
        output: PathBuf,

        /// First timestamp to keep (`%Y-%m-%d %H:%M:%S`)
        #[arg(long)]
        start: Option<String>,

        /// Last timestamp to keep (`%Y-%m-%d %H:%M:%S`)
        #[arg(long)]
        end: Option<String>,

        /// Read through the SQLite bucket cache
        #[arg(long)]
        cache: bool,

        /// Cache database (default: platform cache directory)
        #[arg(long)]
        cache_path: Option<PathBuf>,

        /// Reload every instrument and overwrite cached rows
        #[arg(long)]
        refresh: bool,
    },

    /// Score the persistence baseline on the test partition
    Baseline {
        /// Joined table CSV
        #[arg(long)]
        input: PathBuf,

        /// Forecast the de-seasonalized target (`--remove-seasonality false`
        /// for the raw one; default: the config's setting)
        #[arg(long, num_args = 0..=1, default_missing_value = "true")]
        remove_seasonality: Option<bool>,

        /// Test fraction (overrides the config)
        #[arg(long)]
        test_size: Option<f64>,

        /// Validation fraction (overrides the config)
        #[arg(long)]
        val_size: Option<f64>,

        /// Pipeline configuration JSON
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Rank lag features and print the selection
    Select {
        /// Joined table CSV
        #[arg(long)]
        input: PathBuf,

        /// Pipeline configuration JSON
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run the full pipeline and compare against the baseline
    Run {
        /// Joined table CSV
        #[arg(long)]
        input: PathBuf,

        /// Pipeline configuration JSON
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the result here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Csv,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "volcast=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Aggregate {
            trades,
            output,
            bucket_secs,
        } => aggregate(&trades, &output, bucket_secs),
        Commands::Join {
            fut,
            etf,
            opt,
            output,
            start,
            end,
            cache,
            cache_path,
            refresh,
        } => {
            let provider = CsvProvider::new()
                .with_file(Instrument::Futures, fut)
                .with_file(Instrument::Etf, etf)
                .with_file(Instrument::Options, opt);
            let range = TimeRange::parse(start.as_deref(), end.as_deref())?;
            let cache = cache.then_some(CacheOptions {
                path: cache_path,
                refresh,
            });
            join(provider, range, cache, &output)
        }
        Commands::Baseline {
            input,
            remove_seasonality,
            test_size,
            val_size,
            config,
        } => {
            let config = BaselineOverrides {
                remove_seasonality,
                test_size,
                val_size,
            }
            .apply(load_config(config.as_deref())?);
            baseline(&input, config)
        }
        Commands::Select { input, config } => select(&input, load_config(config.as_deref())?),
        Commands::Run {
            input,
            config,
            output,
            format,
        } => run_pipeline(&input, load_config(config.as_deref())?, output.as_deref(), format),
    }
}

fn load_config(path: Option<&Path>) -> CliResult<PipelineConfig> {
    match path {
        Some(path) => Ok(PipelineConfig::from_file(path)?),
        None => Ok(PipelineConfig::default()),
    }
}

/// Command-line values replacing the config file's; `None` keeps the file's.
#[derive(Debug, Default, Clone, Copy)]
struct BaselineOverrides {
    remove_seasonality: Option<bool>,
    test_size: Option<f64>,
    val_size: Option<f64>,
}

impl BaselineOverrides {
    fn apply(self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(remove_seasonality) = self.remove_seasonality {
            config.remove_seasonality = remove_seasonality;
        }
        if let Some(test_size) = self.test_size {
            config.split.test_size = test_size;
        }
        if let Some(val_size) = self.val_size {
            config.split.val_size = val_size;
        }
        config
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message.to_string());
    pb
}

fn aggregate(trades: &Path, output: &Path, bucket_secs: u32) -> CliResult<()> {
    let session = SessionConfig {
        bucket_secs,
        ..Default::default()
    };
    let trades = read_trades_csv(trades)?;
    let buckets = aggregate_trades(&trades, &session)?;
    write_table_csv(&buckets, output)?;

    println!(
        "✓ {} trades aggregated into {} buckets ({} per session) -> {}",
        trades.len(),
        buckets.height(),
        session.bins(),
        output.display()
    );
    Ok(())
}

/// Inclusive load range; open ends cover every plausible session.
#[derive(Debug, Clone, Copy)]
struct TimeRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl TimeRange {
    fn parse(start: Option<&str>, end: Option<&str>) -> CliResult<Self> {
        let bound = |raw: Option<&str>, year: i32| -> CliResult<NaiveDateTime> {
            match raw {
                Some(raw) => Ok(parse_time(raw)?),
                None => NaiveDate::from_ymd_opt(year, 1, 1)
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .ok_or_else(|| format!("invalid default year {year}").into()),
            }
        };
        Ok(Self {
            start: bound(start, 1970)?,
            end: bound(end, 2100)?,
        })
    }
}

struct CacheOptions {
    path: Option<PathBuf>,
    refresh: bool,
}

fn join(
    provider: CsvProvider,
    range: TimeRange,
    cache: Option<CacheOptions>,
    output: &Path,
) -> CliResult<()> {
    let pb = spinner("Loading instruments...");
    let joined = match cache {
        Some(options) => {
            let cache = open_cache(options.path)?;
            let cached = CachedProvider::new(provider, cache).with_force_refresh(options.refresh);
            let joined = load_joined(&cached, range.start, range.end);
            if let Ok(stats) = cached.cache().get_stats() {
                tracing::info!(?stats, "bucket cache");
            }
            joined
        }
        None => load_joined(&provider, range.start, range.end),
    };
    let joined = match joined {
        Ok(joined) => joined,
        Err(e) => {
            pb.finish_with_message("Failed!");
            return Err(e.into());
        }
    };
    pb.finish_with_message(format!("Joined {} buckets", joined.height()));

    write_table_csv(&joined, output)?;
    println!("✓ Wrote {}", output.display());
    Ok(())
}

fn baseline(input: &Path, config: PipelineConfig) -> CliResult<()> {
    let mode = if config.remove_seasonality {
        "de-seasonalized"
    } else {
        "raw, bucket-aligned"
    };
    let table = read_table_csv(input)?;
    let metrics = VolumePipeline::new(config)?.evaluate_baseline(&table)?;

    println!("\nPersistence baseline ({mode})");
    println!("=============================\n");
    println!("  R²:    {:>10.4}", metrics.r2);
    println!("  MAE:   {:>10.4}", metrics.mae);
    println!("  MAPE:  {:>10.4}", metrics.mape);
    println!("  Rows:  {:>10}", metrics.n);
    Ok(())
}

fn select(input: &Path, config: PipelineConfig) -> CliResult<()> {
    let table = read_table_csv(input)?;
    let pb = spinner("Ranking lag features...");
    let importance = VolumePipeline::new(config)?.select_features(&table);
    let importance = match importance {
        Ok(importance) => importance,
        Err(e) => {
            pb.finish_with_message("Failed!");
            return Err(e.into());
        }
    };
    pb.finish_with_message(format!(
        "Selected {} of {} features",
        importance.selected.len(),
        importance.ranking.len()
    ));

    println!("\n{}", importance.plot());
    println!("Selected: {}", importance.selected.join(", "));
    Ok(())
}

fn run_pipeline(
    input: &Path,
    config: PipelineConfig,
    output: Option<&Path>,
    format: OutputFormat,
) -> CliResult<()> {
    let table = read_table_csv(input)?;
    let pipeline = VolumePipeline::new(config)?;

    let pb = spinner("Running pipeline...");
    let report = match pipeline.run(&table) {
        Ok(report) => report,
        Err(e) => {
            pb.finish_with_message("Failed!");
            return Err(e.into());
        }
    };
    pb.finish_with_message(format!(
        "Scored {} test rows with {} features",
        report.rows.test,
        report.selected_features().len()
    ));

    match (format, output) {
        (OutputFormat::Text, None) => println!("{}", report.to_report().to_ascii_table()),
        (OutputFormat::Text, Some(path)) => {
            std::fs::write(path, report.to_report().to_ascii_table())?;
        }
        (OutputFormat::Json, None) => println!("{}", report.to_report().to_json()?),
        (OutputFormat::Json, Some(path)) => std::fs::write(path, report.to_report().to_json()?)?,
        (OutputFormat::Csv, None) => {
            print!("{}", report.metrics_rows().export_to_string(ExportFormat::Csv)?);
        }
        (OutputFormat::Csv, Some(path)) => {
            report.metrics_rows().export_to_file(path, ExportFormat::Csv)?;
            let ranking = importance_path(path);
            report.importance_rows().export_to_file(&ranking, ExportFormat::Csv)?;
            println!("✓ Wrote {} and {}", path.display(), ranking.display());
        }
    }

    if output.is_none() && format == OutputFormat::Text {
        let gain = improvement(&report.metrics_rows());
        if let Some(gain) = gain {
            println!("MAE change vs baseline: {:+.2}%", gain * 100.0);
        }
    }
    Ok(())
}

/// `metrics.csv` -> `metrics_importance.csv`
fn importance_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    path.with_file_name(format!("{stem}_importance.{}", ExportFormat::Csv.extension()))
}

/// Relative MAE change of the model against the baseline (negative is better).
fn improvement(rows: &[MetricsExport]) -> Option<f64> {
    let [model, baseline] = rows else {
        return None;
    };
    (baseline.mae > 0.0).then(|| (model.mae - baseline.mae) / baseline.mae)
}
