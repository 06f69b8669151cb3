//! CLI entry point for the EasyA grade tools.
//!
//! Provides subcommands for importing grade exports, loading the faculty
//! roster, reconciling instructor names, and comparing grade distributions.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use easya::{
    aggregate::{ComparisonQuery, ComparisonReport, Engine, GroupBy, Scope},
    config::Settings,
    fetch::load_source,
    identity::{Resolver, Roster},
    logging::init_logging,
    normalize::{Importer, SourceFormat},
    output::{append_records, log_import_summary, log_results, print_json, write_json},
    records::Metric,
    store::{GradeStore, JsonFileStore},
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "easya")]
#[command(about = "Import, reconcile and compare course grade distributions", long_about = None)]
struct Cli {
    /// Directory holding the stored collections (overrides EASYA_DATA_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a grade export from a file or URL
    Import {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// Source layout
        #[arg(long, value_enum, default_value_t = FormatArg::Auto)]
        format: FormatArg,

        /// Add to the stored data instead of replacing it
        #[arg(long, default_value_t = false)]
        append: bool,

        /// Keep rows whose A, D and F percentages are all zero
        #[arg(long, default_value_t = false)]
        keep_all_zero: bool,

        /// Also write the import summary as JSON
        #[arg(long, value_name = "PATH")]
        summary: Option<PathBuf>,
    },
    /// Load the faculty roster as regular-faculty instructors
    Roster {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Canonicalize instructor names and flag regular faculty
    Resolve {
        /// Faculty roster file
        #[arg(value_name = "ROSTER")]
        roster: PathBuf,

        /// Only report which names match the roster
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Compare average grades across instructors or courses
    Compare {
        /// Department code, e.g. MATH
        #[arg(short, long, required_unless_present = "instructor")]
        department: Option<String>,

        /// Single course number
        #[arg(short, long, conflicts_with_all = ["level", "level_prefix", "instructor"])]
        number: Option<u32>,

        /// Course level, e.g. 100 or 400
        #[arg(short, long, conflicts_with_all = ["level_prefix", "instructor"])]
        level: Option<u32>,

        /// Leading digit of the course number, matched against the course id
        #[arg(long, conflicts_with = "instructor")]
        level_prefix: Option<u8>,

        /// Every course taught by this instructor
        #[arg(short, long)]
        instructor: Option<String>,

        /// What each result row represents
        #[arg(long, value_enum)]
        by: Option<ByArg>,

        #[arg(short, long, value_enum, default_value_t = MetricArg::A)]
        metric: MetricArg,

        /// Only include regular faculty
        #[arg(long, default_value_t = false)]
        faculty_only: bool,

        /// Write the report as JSON
        #[arg(long, value_name = "PATH")]
        json: Option<PathBuf>,

        /// Append results to a CSV file
        #[arg(long, value_name = "PATH")]
        csv: Option<PathBuf>,
    },
    /// Both metrics per instructor for one course
    Course {
        /// Course id, e.g. MATH111
        #[arg(value_name = "COURSE_ID")]
        course_id: String,
    },
    /// List stored departments
    Departments,
    /// Stored grade records per academic year
    Years,
    /// Delete every stored record
    Reset,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Auto,
    Tabular,
    Nested,
    Flat,
}

impl FormatArg {
    fn source_format(self) -> Option<SourceFormat> {
        match self {
            FormatArg::Auto => None,
            FormatArg::Tabular => Some(SourceFormat::Tabular),
            FormatArg::Nested => Some(SourceFormat::Nested),
            FormatArg::Flat => Some(SourceFormat::Flat),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ByArg {
    Instructor,
    Course,
}

#[derive(Clone, Copy, ValueEnum)]
enum MetricArg {
    /// Percent A
    A,
    /// Percent D plus percent F
    Df,
}

impl From<MetricArg> for Metric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::A => Metric::PercentA,
            MetricArg::Df => Metric::PercentDf,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let mut settings = Settings::from_env();
    let _log_guard = init_logging(&settings.log_file_path);

    let cli = Cli::parse();
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }
    let mut rules = settings.import_rules()?;
    let store = JsonFileStore::open(&settings.data_dir)
        .with_context(|| format!("opening store at {}", settings.data_dir.display()))?;

    match cli.command {
        Commands::Import {
            source,
            format,
            append,
            keep_all_zero,
            summary,
        } => {
            if keep_all_zero {
                rules.skip_all_zero = false;
            }
            let bytes = load_source(&source).await?;

            // Fail on an unreadable source before the old data is dropped.
            let importer = Importer::new(&store, rules);
            let normalized = importer
                .normalizer()
                .normalize(format.source_format(), &bytes)
                .with_context(|| format!("importing {source}"))?;

            if !append {
                info!("Clearing stored collections before import");
                store.clear().await?;
            }
            let report = importer.write(normalized).await?;
            log_import_summary(&report);
            if let Some(path) = summary {
                write_json(path, &report)?;
            }
        }
        Commands::Roster { file } => {
            let roster = Roster::load(&file, rules.roster_delimiter)
                .with_context(|| format!("reading roster {}", file.display()))?;
            let changed = Resolver::new(&store, &roster).load_roster().await?;
            info!(entries = roster.len(), changed, "Roster stored");
        }
        Commands::Resolve { roster, dry_run } => {
            let roster = Roster::load(&roster, rules.roster_delimiter)
                .with_context(|| format!("reading roster {}", roster.display()))?;
            let resolver = Resolver::new(&store, &roster);

            if dry_run {
                print_json(&resolver.match_report().await?)?;
            } else {
                resolver.load_roster().await?;
                let summary = resolver.run().await?;
                print_json(&summary)?;
            }
        }
        Commands::Compare {
            department,
            number,
            level,
            level_prefix,
            instructor,
            by,
            metric,
            faculty_only,
            json,
            csv,
        } => {
            let scope = build_scope(department, number, level, level_prefix, instructor)?;
            let mut query = ComparisonQuery::new(scope, metric.into()).faculty_only(faculty_only);
            if let Some(by) = by {
                query = query.grouped_by(match by {
                    ByArg::Instructor => GroupBy::Instructor,
                    ByArg::Course => GroupBy::Course,
                });
            }

            let results = Engine::new(&store).compare(&query).await?;
            log_results(&results);

            if let Some(path) = csv {
                append_records(path, &results)?;
            }
            if let Some(path) = json {
                write_json(path, &ComparisonReport::new(query, results))?;
            }
        }
        Commands::Course { course_id } => {
            let rows = Engine::new(&store).course_overview(&course_id).await?;
            if rows.is_empty() {
                info!(%course_id, "No grade data for course");
            }
            print_json(&rows)?;
        }
        Commands::Departments => {
            let departments = store.distinct_departments().await?;
            info!(total = departments.len(), "Departments");
            for department in &departments {
                info!(%department, "Department");
            }
        }
        Commands::Years => {
            for (year, count) in Engine::new(&store).year_distribution().await? {
                info!(year, count, "Year distribution");
            }
        }
        Commands::Reset => {
            store.clear().await?;
            info!(dir = %settings.data_dir.display(), "All collections cleared");
        }
    }

    Ok(())
}

fn build_scope(
    department: Option<String>,
    number: Option<u32>,
    level: Option<u32>,
    level_prefix: Option<u8>,
    instructor: Option<String>,
) -> Result<Scope> {
    if let Some(name) = instructor {
        return Ok(Scope::Instructor { name });
    }
    let Some(department) = department else {
        bail!("--department is required unless --instructor is given");
    };

    Ok(match (number, level, level_prefix) {
        (Some(number), _, _) => Scope::Course { department, number },
        (_, Some(level), _) => Scope::Level { department, level },
        (_, _, Some(digit)) => Scope::LevelPrefix { department, digit },
        _ => Scope::Department { department },
    })
}
