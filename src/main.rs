use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};

use compositionality::{
    read_language, read_substitution_table, save_distance_matrix, Analysis, AnalysisConfig,
    AnalysisReport, BatchOptions, CorrelationMethod, MantelConfig, Segmentation, Tail,
};

fn default_workers() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

/// Measure compositionality: Mantel test between alignment-based word
/// distances and meaning distances.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Language CSV: header line, then `word,feature1,feature2,...` per item
    language: PathBuf,

    /// Substitution-weight CSV: header `label,sym1,...`, then one row per symbol
    weights: PathBuf,

    /// Score added per gap position during alignment
    #[arg(long, default_value_t = -1.0, allow_hyphen_values = true)]
    gap: f64,

    /// Write the labelled word-distance matrix to this CSV path
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Correlation coefficient (pearson, spearman)
    #[arg(long, default_value_t = CorrelationMethod::Pearson)]
    method: CorrelationMethod,

    /// Tail of the null distribution (upper, lower, two-sided)
    #[arg(long, default_value_t = Tail::Upper)]
    tail: Tail,

    /// Number of permutation trials, including the identity
    #[arg(long, default_value_t = 10_000)]
    permutations: usize,

    /// Seed for the permutation stream (default: OS entropy, not reproducible)
    #[arg(long)]
    seed: Option<u64>,

    /// Split words into symbols on this character instead of per character
    #[arg(long)]
    delimiter: Option<char>,

    /// Enable threaded distance and permutation computation (default: off)
    #[arg(long, default_value_t = false)]
    threads: bool,

    /// Number of worker threads (default: max available - 1)
    #[arg(long, default_value_t = default_workers())]
    max_workers: usize,

    /// Write the result report as JSON to this path
    #[arg(long)]
    json: Option<PathBuf>,

    /// Verbose/info output (default: quiet)
    #[arg(long, short = 'v', alias = "info")]
    verbose: bool,

    /// Debug output (prints every pairwise alignment)
    #[arg(long)]
    debug: bool,

    /// Trace output
    #[arg(long)]
    trace: bool,
}

impl Args {
    fn segmentation(&self) -> Segmentation {
        self.delimiter
            .map_or(Segmentation::Characters, Segmentation::Delimited)
    }

    fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            gap_cost: self.gap,
            mantel: MantelConfig {
                method: self.method,
                tail: self.tail,
                permutations: self.permutations,
                seed: self.seed,
                use_threads: self.threads,
                max_workers: self.max_workers,
            },
            batch: BatchOptions {
                use_threads: self.threads,
                max_workers: self.max_workers,
            },
        }
    }
}

fn main() {
    let args = Args::parse();
    let log_level = if args.trace {
        "trace"
    } else if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "error"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("language: {}", args.language.display());
    info!("weights: {}", args.weights.display());

    match run_pipeline(&args) {
        Ok(report) => {
            println!("Mantel test result");
            println!(
                "r= {} p= {} z= {}",
                report.mantel.correlation, report.mantel.p_value, report.mantel.z_score
            );
        }
        Err(error) => {
            eprintln!("Analysis failed: {error:?}");
            std::process::exit(1);
        }
    }
}

fn run_pipeline(args: &Args) -> Result<AnalysisReport> {
    let language = read_language(&args.language, args.segmentation())
        .with_context(|| format!("Failed to read language from {}", args.language.display()))?;
    let table = read_substitution_table(&args.weights).with_context(|| {
        format!(
            "Failed to read substitution weights from {}",
            args.weights.display()
        )
    })?;
    info!(
        "Read {} items and {} substitution symbols",
        language.len(),
        table.len()
    );

    let config = args.analysis_config();
    if config.mantel.seed.is_none() {
        debug!("No seed given; permutation results will vary between runs");
    }
    let analysis = Analysis::new(config);
    let distances = analysis.distances(&language, &table)?;

    // saved before the Mantel stage, which can still reject the language
    if let Some(path) = &args.output {
        save_distance_matrix(path, &distances.words, &distances.word_distances)
            .with_context(|| format!("Failed to write distance matrix to {}", path.display()))?;
        info!("Word distance matrix written to {}", path.display());
    }

    let report = analysis.test(distances)?;

    if let Some(path) = &args.json {
        write_json(path, &report, &config)?;
        info!("Report written to {}", path.display());
    }

    Ok(report)
}

fn write_json(path: &Path, report: &AnalysisReport, config: &AnalysisConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writeln!(
        file,
        "{}",
        serde_json::to_string_pretty(&report.summary(config))?
    )?;
    Ok(())
}
