//! cellfreq - immune-cell frequency CLI
//!
//! Command-line interface for loading sample counts, filtering the store and
//! comparing cell population frequencies between groups.

use cellfreq::analysis::{compare_filtered, subset_summary, ResponderAnalysis};
use cellfreq::compare::TestKind;
use cellfreq::config::{AnalysisConfig, TableNames};
use cellfreq::error::{CellFreqError, Result};
use cellfreq::filter::{Criteria, FilterEngine};
use cellfreq::ingest::read_samples;
use cellfreq::overview::build_overview;
use cellfreq::pipeline::Pipeline;
use cellfreq::store::TabularStore;
use cellfreq::visualize::distributions;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// CLI-friendly test kind enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliTestKind {
    /// Welch's t-test
    Parametric,
    /// Mann-Whitney U test
    RankBased,
}

impl From<CliTestKind> for TestKind {
    fn from(kind: CliTestKind) -> Self {
        match kind {
            CliTestKind::Parametric => TestKind::Parametric,
            CliTestKind::RankBased => TestKind::RankBased,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Immune-cell frequency store and group comparisons
#[derive(Parser)]
#[command(name = "cellfreq")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load samples from CSV and rebuild the overview table
    Load {
        /// Path to the sample CSV
        #[arg(short, long)]
        input: PathBuf,

        /// Path to the store file
        #[arg(short, long, default_value = "cell-count.db")]
        store: PathBuf,

        /// Name of the samples table
        #[arg(long, default_value = "samples")]
        samples_table: String,

        /// Name of the overview table
        #[arg(long, default_value = "overview")]
        overview_table: String,
    },

    /// Select rows of a table
    Filter {
        /// Path to the store file
        #[arg(short, long, default_value = "cell-count.db")]
        store: PathBuf,

        /// Table to read
        #[arg(short, long, default_value = "overview")]
        table: String,

        /// Join another table on sample_id (e.g. samples)
        #[arg(short, long)]
        join: Option<String>,

        /// Criteria: column=value, column=a,b,c or column=lo..hi
        #[arg(short, long = "where")]
        criteria: Vec<String>,

        /// Columns to output (comma-separated, default all)
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,

        /// Also print a five-number summary of VALUE per GROUP (GROUP:VALUE)
        #[arg(long)]
        describe: Option<String>,

        /// Write rows as TSV to this path instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Compare two groups of samples
    ///
    /// Without --value-column, relative frequencies of every cell type are
    /// compared (overview joined to samples) and BH-adjusted.
    Compare {
        /// Path to the store file
        #[arg(short, long, default_value = "cell-count.db")]
        store: PathBuf,

        /// Column holding the group labels
        #[arg(short, long, default_value = "response")]
        group_column: String,

        /// First group value
        #[arg(short = 'a', long, default_value = "yes")]
        group_a: String,

        /// Second group value
        #[arg(short = 'b', long, default_value = "no")]
        group_b: String,

        /// Compare this column of --table instead of cell-type frequencies
        #[arg(long)]
        value_column: Option<String>,

        /// Table for --value-column comparisons
        #[arg(long, default_value = "samples")]
        table: String,

        /// Name of the samples table joined for cell-type comparisons
        #[arg(long, default_value = "samples")]
        samples_table: String,

        /// Name of the overview table holding relative frequencies
        #[arg(long, default_value = "overview")]
        overview_table: String,

        /// Criteria: column=value, column=a,b,c or column=lo..hi
        #[arg(short, long = "where")]
        criteria: Vec<String>,

        /// Test to run
        #[arg(long, value_enum, default_value = "rank-based")]
        test: CliTestKind,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Count rows of a filtered subset, grouped by columns
    Summary {
        /// Path to the store file
        #[arg(short, long, default_value = "cell-count.db")]
        store: PathBuf,

        /// Table to read
        #[arg(short, long, default_value = "samples")]
        table: String,

        /// Criteria: column=value, column=a,b,c or column=lo..hi
        #[arg(short, long = "where")]
        criteria: Vec<String>,

        /// Columns to break the subset down by (comma-separated)
        #[arg(long, value_delimiter = ',')]
        by: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Run a pipeline from a YAML configuration file
    Run {
        /// Path to pipeline configuration YAML
        #[arg(short, long)]
        config: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print an example configuration
    ExampleConfig {
        /// Write to this path instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Load {
            input,
            store,
            samples_table,
            overview_table,
        } => cmd_load(&input, &store, &samples_table, &overview_table),

        Commands::Filter {
            store,
            table,
            join,
            criteria,
            columns,
            describe,
            output,
            format,
        } => cmd_filter(
            &store,
            &table,
            join.as_deref(),
            &criteria,
            &columns,
            describe.as_deref(),
            output.as_ref(),
            format,
        ),

        Commands::Compare {
            store,
            group_column,
            group_a,
            group_b,
            value_column,
            table,
            samples_table,
            overview_table,
            criteria,
            test,
            format,
        } => cmd_compare(
            &store,
            &group_column,
            &group_a,
            &group_b,
            value_column.as_deref(),
            &table,
            &TableNames {
                samples: samples_table,
                overview: overview_table,
            },
            &criteria,
            test.into(),
            format,
        ),

        Commands::Summary {
            store,
            table,
            criteria,
            by,
            format,
        } => cmd_summary(&store, &table, &criteria, &by, format),

        Commands::Run { config, format } => cmd_run(&config, format),

        Commands::ExampleConfig { output } => cmd_example_config(output.as_ref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Load samples and derive the overview
fn cmd_load(
    input: &PathBuf,
    store_path: &PathBuf,
    samples_table: &str,
    overview_table: &str,
) -> Result<()> {
    eprintln!("Reading samples from {:?}...", input);
    let samples = read_samples(input)?;
    let overview = build_overview(&samples)?;

    eprintln!("Writing store {:?}...", store_path);
    let (n_samples, n_rows) = TabularStore::with(store_path, |store| {
        store.load_dataset(samples_table, overview_table, &samples, &overview)
    })?;

    eprintln!(
        "Done! {} samples in '{}', {} rows in '{}'",
        n_samples, samples_table, n_rows, overview_table
    );
    Ok(())
}

/// Filter a table, optionally joined with another
#[allow(clippy::too_many_arguments)]
fn cmd_filter(
    store_path: &PathBuf,
    table: &str,
    join: Option<&str>,
    criteria: &[String],
    columns: &[String],
    describe: Option<&str>,
    output: Option<&PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let criteria = Criteria::parse_all(criteria)?;
    let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
    let projection = if columns.is_empty() {
        None
    } else {
        Some(columns.as_slice())
    };

    TabularStore::with(store_path, |store| {
        let engine = FilterEngine::new(store);
        let rows = match join {
            Some(right) => engine.filter_joined(table, right, "sample_id", &criteria, projection)?,
            None => match projection {
                Some(cols) => engine.filter_columns(table, &criteria, cols)?,
                None => engine.filter(table, &criteria)?,
            },
        };
        eprintln!("{} rows selected from {}", rows.len(), rows.source_name());

        match (output, format) {
            (Some(path), _) => {
                rows.to_tsv(path)?;
                eprintln!("Rows written to {:?}", path);
            }
            (None, OutputFormat::Json) => println!("{}", serde_json::to_string_pretty(&rows)?),
            (None, OutputFormat::Text) => rows.write_tsv(&mut std::io::stdout().lock())?,
        }

        if let Some(spec) = describe {
            let (group, value) = spec.split_once(':').ok_or_else(|| {
                CellFreqError::InvalidParameter(format!(
                    "--describe expects GROUP:VALUE, got '{}'",
                    spec
                ))
            })?;
            let dists = distributions(&rows, group, value)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&dists)?),
                OutputFormat::Text => {
                    eprintln!("\n{}\tn\tmin\tq1\tmedian\tq3\tmax", group);
                    for d in &dists {
                        eprintln!(
                            "{}\t{}\t{:.4}\t{:.4}\t{:.4}\t{:.4}\t{:.4}",
                            d.group, d.n, d.min, d.q1, d.median, d.q3, d.max
                        );
                    }
                }
            }
        }
        Ok(())
    })
}

/// Compare two groups
#[allow(clippy::too_many_arguments)]
fn cmd_compare(
    store_path: &PathBuf,
    group_column: &str,
    group_a: &str,
    group_b: &str,
    value_column: Option<&str>,
    table: &str,
    tables: &TableNames,
    criteria: &[String],
    test: TestKind,
    format: OutputFormat,
) -> Result<()> {
    let criteria = Criteria::parse_all(criteria)?;
    eprintln!(
        "Comparing {}={} vs {}={} with {}...",
        group_column,
        group_a,
        group_column,
        group_b,
        test.test_name()
    );

    TabularStore::with(store_path, |store| {
        match value_column {
            Some(value_column) => {
                let result = compare_filtered(
                    store,
                    table,
                    &criteria,
                    group_column,
                    group_a,
                    group_b,
                    value_column,
                    test,
                )?;
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
                    OutputFormat::Text => println!("{}", result),
                }
            }
            None => {
                let report = ResponderAnalysis::new(group_column, group_a, group_b)
                    .tables(&tables.samples, &tables.overview)
                    .filters(criteria.clone())
                    .test_kind(test)
                    .run(store)?;
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                    OutputFormat::Text => {
                        print!("{}", report);
                        let n_sig = report.correction.n_significant(0.05);
                        eprintln!("  {} cell type(s) significant at q < 0.05", n_sig);
                    }
                }
            }
        }
        Ok(())
    })
}

/// Grouped counts of a filtered subset
fn cmd_summary(
    store_path: &PathBuf,
    table: &str,
    criteria: &[String],
    by: &[String],
    format: OutputFormat,
) -> Result<()> {
    let criteria = Criteria::parse_all(criteria)?;
    let by: Vec<&str> = by.iter().map(String::as_str).collect();
    let summary =
        TabularStore::with(store_path, |store| subset_summary(store, table, &criteria, &by))?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => print!("{}", summary),
    }
    Ok(())
}

/// Run a pipeline from configuration
fn cmd_run(config_path: &PathBuf, format: OutputFormat) -> Result<()> {
    eprintln!("Loading pipeline configuration from {:?}...", config_path);
    let config = AnalysisConfig::from_file(config_path)?;

    eprintln!("Running pipeline '{}'...", config.name);
    let report = Pipeline::from_config(&config)?.run()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", report),
    }
    eprintln!("Done! {} step(s) completed", report.outputs.len());
    Ok(())
}

/// Print or write the example configuration
fn cmd_example_config(output: Option<&PathBuf>) -> Result<()> {
    let yaml = AnalysisConfig::example().to_yaml()?;
    match output {
        Some(path) => {
            std::fs::write(path, &yaml)?;
            eprintln!("Example configuration written to {:?}", path);
        }
        None => print!("{}", yaml),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_accepts_table_names() {
        let cli = Cli::try_parse_from([
            "cellfreq",
            "compare",
            "--samples-table",
            "raw_samples",
            "--overview-table",
            "frequencies",
        ])
        .unwrap();
        match cli.command {
            Commands::Compare {
                samples_table,
                overview_table,
                value_column,
                ..
            } => {
                assert_eq!(samples_table, "raw_samples");
                assert_eq!(overview_table, "frequencies");
                assert!(value_column.is_none());
            }
            _ => panic!("expected the compare subcommand"),
        }
    }

    #[test]
    fn test_compare_table_names_default() {
        let cli = Cli::try_parse_from(["cellfreq", "compare"]).unwrap();
        match cli.command {
            Commands::Compare {
                samples_table,
                overview_table,
                ..
            } => {
                let defaults = TableNames::default();
                assert_eq!(samples_table, defaults.samples);
                assert_eq!(overview_table, defaults.overview);
            }
            _ => panic!("expected the compare subcommand"),
        }
    }
}
