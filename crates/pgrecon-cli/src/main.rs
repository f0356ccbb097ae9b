//! pgrecon CLI - Postgres catalog inspection and duplicate reconciliation.

mod config;
mod output;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};
use config::ConfigError;
use output::{Table, format_bytes};
use owo_colors::OwoColorize;
use pgrecon::{
    Config, ConsolidationPolicy, Consolidator, ConstraintKind, ConstraintKinds, Context,
    DEFAULT_POOL_SIZE, DumpOptions, ReferenceAudit, RelationKind, SchemaSnapshot,
    ScriptWriter,
};
use std::process::ExitCode;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pgrecon")]
#[command(about = "Postgres catalog inspection and duplicate reconciliation")]
#[command(version)]
struct Cli {
    /// Environment file to load before reading DATABASE_URL
    #[arg(long, default_value = ".env.local")]
    env: Utf8PathBuf,

    /// Connection URL; overrides DATABASE_URL and the config file
    #[arg(long)]
    database_url: Option<String>,

    /// Schema to inspect; overrides the config file
    #[arg(long)]
    schema: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog objects in the schema
    List {
        #[arg(value_enum)]
        what: Listing,

        /// Only relations having this column (tables and relations)
        #[arg(long)]
        column: Option<String>,

        /// Only this table (constraints)
        #[arg(long)]
        table: Option<String>,

        /// Kind filter: relation labels (`table`, `view`, ...) or constraint codes (`f`, `p`, ...)
        #[arg(long = "kind")]
        kinds: Vec<String>,
    },

    /// Stream the rows of a table
    Dump {
        table: String,

        /// Sort key; prefix with `-` for descending. Repeatable.
        #[arg(long, allow_hyphen_values = true)]
        order_by: Vec<String>,

        /// 1-based page, used with --limit
        #[arg(long)]
        page: Option<u64>,

        #[arg(long)]
        limit: Option<u64>,

        /// Rows fetched per round trip
        #[arg(long)]
        batch_size: Option<u32>,
    },

    /// Capture a schema snapshot as JSON
    Structure {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<Utf8PathBuf>,

        /// Overwrite an existing output file
        #[arg(long, short)]
        force: bool,
    },

    /// Compare indexes between two snapshots, or a snapshot and the live schema
    DiffIndexes {
        before: Utf8PathBuf,

        /// Defaults to the live schema
        after: Option<Utf8PathBuf>,
    },

    /// Print tables in an order safe for deletion
    Order,

    /// Write repair scripts for the configured uniqueness rules
    Dedupe {
        /// Directory for the generated scripts; must not exist
        #[arg(short, long, default_value = "repair")]
        output: Utf8PathBuf,
    },

    /// Count references that match no parent row
    Audit,
}

#[derive(Clone, Copy, ValueEnum)]
enum Listing {
    Tables,
    Relations,
    Constraints,
    Indexes,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pgrecon(#[from] pgrecon::Error),

    #[error("no database URL: pass --database-url, set DATABASE_URL, or add database_url to .config/pgrecon.styx")]
    MissingDatabaseUrl,

    #[error("nothing to do: .config/pgrecon.styx has no `{0}` section")]
    MissingSection(&'static str),

    #[error("unknown kind '{0}'")]
    UnknownKind(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match dotenvy::from_path(&cli.env) {
        Ok(()) => tracing::debug!(path = %cli.env, "loaded environment file"),
        Err(e) if e.not_found() => tracing::debug!(path = %cli.env, "no environment file"),
        Err(e) => tracing::warn!(path = %cli.env, "could not load environment file: {}", e),
    }

    let (config, config_path) = config::load_or_default()?;
    if let Some(path) = &config_path {
        tracing::debug!(%path, "loaded config");
    }

    // Snapshot-to-snapshot comparison needs no database.
    if let Commands::DiffIndexes {
        before,
        after: Some(after),
    } = &cli.command
    {
        let before = SchemaSnapshot::load(before)?;
        let after = SchemaSnapshot::load(after)?;
        print!("{}", before.diff_indexes(&after));
        return Ok(());
    }

    let url = database_url(cli.database_url.clone(), &config)?;
    tracing::info!(url = %mask_password(&url), "connecting");
    let ctx = Context::new();
    let exec = ctx
        .executors()
        .get_or_connect("default", &url, DEFAULT_POOL_SIZE)
        .await?;
    let catalog = ctx.catalog(&exec);
    let schema = cli.schema.as_deref().unwrap_or(config.schema());

    match cli.command {
        Commands::List {
            what,
            column,
            table,
            kinds,
        } => match what {
            Listing::Tables => {
                let tables = catalog.list_tables(schema, column.as_deref()).await?;
                print_relations(&tables);
            }
            Listing::Relations => {
                let kinds = relation_kinds(&kinds)?;
                let relations = catalog
                    .list_relations(schema, &kinds, column.as_deref())
                    .await?;
                print_relations(&relations);
            }
            Listing::Constraints => {
                let kinds = constraint_kinds(&kinds)?;
                let constraints = catalog
                    .list_constraints(schema, table.as_deref(), &kinds)
                    .await?;
                let mut out = Table::new(["table", "name", "kind", "columns", "references"]);
                for c in &constraints {
                    let references = match (&c.foreign_table, &c.foreign_columns) {
                        (Some(t), Some(cols)) => format!("{}({})", t, cols.join(", ")),
                        _ => String::new(),
                    };
                    out.row([
                        c.table.clone(),
                        c.name.clone(),
                        c.kind.code().to_string(),
                        c.columns.join(", "),
                        references,
                    ]);
                }
                out.print();
            }
            Listing::Indexes => {
                let indexes = catalog.list_indexes(schema).await?;
                let mut out = Table::new(["table", "index", "columns", "unique", "primary"]);
                for i in &indexes {
                    out.row([
                        i.table_name.clone(),
                        i.index_name.clone(),
                        i.column_names.join(", "),
                        i.is_unique.to_string(),
                        i.is_primary.to_string(),
                    ]);
                }
                out.print();
            }
        },

        Commands::Dump {
            table,
            order_by,
            page,
            limit,
            batch_size,
        } => {
            let options = DumpOptions {
                order_by,
                page,
                limit,
                batch_size: batch_size.unwrap_or(config.batch_size()),
            };
            let mut header_printed = false;
            let count = catalog
                .dump_table(schema, &table, &options, |row| {
                    if !header_printed {
                        let names: Vec<&str> = row.iter().map(|(n, _)| n.as_str()).collect();
                        println!("{}", names.join("\t").bold());
                        header_printed = true;
                    }
                    let values: Vec<String> = row.iter().map(|(_, v)| v.to_string()).collect();
                    println!("{}", values.join("\t"));
                    Ok(())
                })
                .await?;
            eprintln!("{} rows", count);
        }

        Commands::Structure { output, force } => {
            let snapshot = catalog.snapshot(schema).await?;
            match output {
                Some(path) => {
                    snapshot.save(&path, force)?;
                    eprintln!(
                        "{} {} ({} columns)",
                        "Wrote".green(),
                        path,
                        snapshot.column_count()
                    );
                }
                None => println!("{}", snapshot.to_json()?),
            }
        }

        Commands::DiffIndexes { before, after: _ } => {
            let before = SchemaSnapshot::load(&before)?;
            let live = catalog.snapshot(schema).await?;
            print!("{}", before.diff_indexes(&live));
        }

        Commands::Order => {
            let order = catalog.deletion_order(schema).await?;
            for table in &order.tables {
                println!("{}", table);
            }
            if !order.is_complete() {
                eprintln!(
                    "{} foreign key cycle among: {}",
                    "warning:".yellow().bold(),
                    order.cyclic.join(", ")
                );
            }
        }

        Commands::Dedupe { output } => {
            if config.unique.is_empty() {
                return Err(CliError::MissingSection("unique"));
            }
            let policy = ConsolidationPolicy::from_config(&config)?;
            let writer = ScriptWriter::create(output)?;
            let consolidator = Consolidator::new(catalog, schema, policy);
            let reports = consolidator.run(&config.unique, &writer).await?;
            for report in &reports {
                println!("{}", report);
            }
            eprintln!("{} {}", "Scripts in".green(), writer.dir());
        }

        Commands::Audit => {
            let Some(references) = &config.references else {
                return Err(CliError::MissingSection("references"));
            };
            let rows = ReferenceAudit::new(catalog, schema).run(references).await?;
            let mut out = Table::new(["parent", "child", "column", "total", "dangling", "%"]);
            for r in &rows {
                out.row([
                    r.parent.clone(),
                    r.child.clone(),
                    r.column.clone(),
                    r.total.to_string(),
                    r.dangling.to_string(),
                    format!("{:.2}", r.percent),
                ]);
            }
            if out.is_empty() {
                println!("No referencing tables found.");
            } else {
                out.print();
            }
        }
    }

    Ok(())
}

fn print_relations(relations: &[pgrecon::TableDescriptor]) {
    let mut out = Table::new(["name", "kind", "size"]);
    for r in relations {
        out.row([
            r.name.clone(),
            r.kind.label().to_string(),
            format_bytes(r.size_bytes),
        ]);
    }
    out.print();
}

/// `--database-url`, then `DATABASE_URL`, then the config file.
fn database_url(flag: Option<String>, config: &Config) -> Result<String, CliError> {
    flag.or_else(|| std::env::var("DATABASE_URL").ok())
        .or_else(|| config.database_url.clone())
        .ok_or(CliError::MissingDatabaseUrl)
}

fn relation_kinds(labels: &[String]) -> Result<Vec<RelationKind>, CliError> {
    if labels.is_empty() {
        return Ok(RelationKind::ALL.to_vec());
    }
    labels
        .iter()
        .map(|l| RelationKind::from_label(l).ok_or_else(|| CliError::UnknownKind(l.clone())))
        .collect()
}

fn constraint_kinds(codes: &[String]) -> Result<ConstraintKinds, CliError> {
    if codes.is_empty() {
        return Ok(ConstraintKinds::All);
    }
    codes
        .iter()
        .map(|c| ConstraintKind::from_code(c).ok_or_else(|| CliError::UnknownKind(c.clone())))
        .collect::<Result<Vec<_>, _>>()
        .map(ConstraintKinds::Only)
}

/// Mask the password in a database URL for display.
fn mask_password(url: &str) -> String {
    if let Some(start) = url.find("://")
        && let Some(at) = url.rfind('@')
        && let Some(colon) = url[start + 3..at].find(':')
    {
        let user = &url[start + 3..start + 3 + colon];
        return format!("{}{}:***{}", &url[..start + 3], user, &url[at..]);
    }
    url.to_string()
}
