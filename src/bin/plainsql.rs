//! plainsql: resolve and run SQL templates from the shell.
//!
//! # Usage
//!
//! ```bash
//! # Resolve a template (no database needed)
//! plainsql render "SELECT * FROM user WHERE id = :id" --params '{"id": 42}'
//!
//! # Run a named query from a file
//! plainsql run --file queries/user.sql --name get_by_id --params @params.json
//!
//! # Show what a template expects
//! plainsql inspect "UPDATE user SET :@user{name, email} WHERE id = :id"
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use plainsql::config::{Config, OutputFormat};
use plainsql::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "plainsql")]
#[command(version)]
#[command(about = "Resolve SQL templates with named placeholders", long_about = None)]
#[command(after_help = "EXAMPLES:
    plainsql render 'SELECT * FROM user WHERE id = :id' --params '{\"id\": 42}'
    plainsql render 'SELECT * FROM user WHERE id IN :?' --params '{\"?\": [[1, 2, 3]]}'
    plainsql run --file user.sql --name get_all --database-url sqlite://app.db
    plainsql inspect --file user.sql --name update_user")]
struct Cli {
    /// Config file (default: ./plainsql.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the template comes from.
#[derive(Args)]
struct Source {
    /// Template SQL text
    sql: Option<String>,

    /// Read the template from a .sql file
    #[arg(short, long, conflicts_with = "sql")]
    file: Option<PathBuf>,

    /// Query name inside the file (defaults to its only query)
    #[arg(short, long, requires = "file")]
    name: Option<String>,

    /// Parameters as a JSON object, or @path to a JSON file
    #[arg(short, long)]
    params: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a template and print the SQL
    Render {
        #[command(flatten)]
        source: Source,

        /// Escaping dialect
        #[arg(short, long, value_enum)]
        dialect: Option<DialectKind>,
    },
    /// Resolve a template and execute it
    Run {
        #[command(flatten)]
        source: Source,

        /// Database connection URL
        #[arg(long, env = "PLAINSQL_DATABASE_URL")]
        database_url: Option<String>,

        /// Output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// List a template's placeholders and check parameters against them
    Inspect {
        #[command(flatten)]
        source: Source,

        /// Escaping dialect
        #[arg(short, long, value_enum)]
        dialect: Option<DialectKind>,
    },
    /// Show the placeholder reference
    Syntax,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = dispatch(&cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(PlainError::BackendQueryFailed { query, source }) = e.downcast_ref::<PlainError>() {
            eprintln!("  {} {}", "Query:".dimmed(), query.yellow());
            eprintln!("  {} {}", "Cause:".dimmed(), source);
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "plainsql=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(cli: &Cli) -> Result<()> {
    if let Commands::Syntax = cli.command {
        show_syntax();
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Render { source, dialect } => {
            let query = source.query()?;
            let params = source.params()?;
            let adapter = dialect.unwrap_or_else(|| config.effective_dialect()).adapter();
            println!("{}", query.resolve(&params, adapter)?);
        }
        Commands::Run {
            source,
            database_url,
            format,
        } => {
            let query = source.query()?;
            let params = source.params()?;
            let Some(url) = database_url.as_ref().or(config.database_url.as_ref()) else {
                bail!("no database URL; use --database-url, set PLAINSQL_DATABASE_URL, or add database_url to {}",
                    plainsql::config::CONFIG_FILE);
            };

            if cli.verbose {
                println!("{} {}", "Connecting to:".dimmed(), url);
            }
            let adapter = SqlxAdapter::connect(url).await?;
            let rows = query.run(&params, &adapter).await?;
            format_output(&rows, format.unwrap_or(config.format));
        }
        Commands::Inspect { source, dialect } => {
            let params = source.params()?;
            let adapter = dialect.unwrap_or_else(|| config.effective_dialect()).adapter();
            for (i, query) in source.queries()?.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                inspect_query(query, &params, adapter)?;
            }
        }
        Commands::Syntax => unreachable!(), // handled above
    }

    Ok(())
}

impl Source {
    /// The selected queries: the inline template, the named query, or every
    /// query in the file.
    fn queries(&self) -> Result<Vec<Query>> {
        if let Some(sql) = &self.sql {
            return Ok(vec![define_query(sql.as_str())]);
        }
        let Some(path) = &self.file else {
            bail!("give the template as an argument or with --file");
        };

        let queries = load_queries(path).with_context(|| format!("failed to load '{}'", path.display()))?;
        match &self.name {
            Some(name) => Ok(vec![queries.require(name)?.clone()]),
            None => Ok(queries.iter().cloned().collect()),
        }
    }

    /// Exactly one query.
    fn query(&self) -> Result<Query> {
        let mut queries = self.queries()?;
        if queries.len() != 1 {
            let names: Vec<&str> = queries.iter().filter_map(Query::name).collect();
            bail!(
                "expected one query, found {}; pick one with --name ({})",
                queries.len(),
                names.join(", ")
            );
        }
        Ok(queries.remove(0))
    }

    fn params(&self) -> Result<ParamBag> {
        let Some(raw) = &self.params else {
            return Ok(ParamBag::new());
        };
        let text = match raw.strip_prefix('@') {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read parameters from '{}'", path))?,
            None => raw.clone(),
        };
        let json: serde_json::Value = serde_json::from_str(&text).context("parameters are not valid JSON")?;
        Ok(ParamBag::from_json(json)?)
    }
}

fn format_output(results: &[Row], format: OutputFormat) {
    if results.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results).unwrap_or_default());
        }
        OutputFormat::Table => {
            let mut columns: Vec<&String> = results[0].keys().collect();
            columns.sort();

            let mut widths: HashMap<&String, usize> = columns.iter().map(|c| (*c, c.len())).collect();
            for row in results {
                for (col, val) in row {
                    let len = val_to_string(val).chars().count();
                    if let Some(w) = widths.get_mut(col) {
                        *w = (*w).max(len);
                    }
                }
            }

            let header: Vec<String> = columns
                .iter()
                .map(|c| format!("{:width$}", c, width = widths[*c]))
                .collect();
            println!("{}", header.join(" │ ").white().bold());

            let sep: Vec<String> = columns.iter().map(|c| "─".repeat(widths[*c])).collect();
            println!("{}", sep.join("─┼─").dimmed());

            for row in results {
                let cells: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        let val = row.get(*c).map(val_to_string).unwrap_or_default();
                        format!("{:width$}", val, width = widths[*c])
                    })
                    .collect();
                println!("{}", cells.join(" │ "));
            }

            println!();
            println!("{} row(s) returned", results.len().to_string().cyan());
        }
    }
}

fn val_to_string(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => val.to_string(),
    }
}

fn inspect_query(query: &Query, params: &ParamBag, adapter: &dyn Adapter) -> Result<()> {
    if let Some(name) = query.name() {
        println!("{} {}", "Query:".dimmed(), name.cyan());
    }
    println!("{} {}", "Template:".dimmed(), query.sql().yellow());
    println!();

    let placeholders: Vec<&Placeholder> = query.placeholders().collect();
    if placeholders.is_empty() {
        println!("{}", "(no placeholders)".dimmed());
    } else {
        println!("{}", "Placeholders:".green().bold());
        for p in &placeholders {
            let schema = p.schema.as_deref().map(|s| format!("{{{}}}", s)).unwrap_or_default();
            println!(
                "  {:16} {:14} {}",
                p.key().white(),
                format!("{:?}", p.modifier).cyan(),
                schema.dimmed()
            );
        }
    }

    let validation = query.template().validate(params)?;
    println!();
    if !validation.missing.is_empty() {
        println!("{} {}", "Missing:".red().bold(), validation.missing.join(", "));
    }
    if !validation.unresolved_optional.is_empty() {
        println!(
            "{} {}",
            "Omitted fragments:".yellow(),
            validation.unresolved_optional.join(", ")
        );
    }

    if validation.is_valid() {
        match query.resolve(params, adapter) {
            Ok(sql) => {
                println!("{}", "Resolved SQL:".green().bold());
                println!("  {}", sql.white());
            }
            Err(e) => println!("{} {}", "Unresolvable:".red().bold(), e),
        }
    }

    Ok(())
}

fn show_syntax() {
    println!("{}", "plainsql Placeholder Reference".cyan().bold());
    println!();

    let rows = [
        (":?", "Anon", "Next value from the \"?\" list", "5"),
        (":name", "Static", "Escaped scalar or list", "'john', (1, 2)"),
        (":!name", "Raw", "Scalar text, unescaped", "created_at"),
        (":~name", "Dynamic", "Condition parts joined", "a = 1 AND b = 2"),
        (":$name{a, b}", "Insert", "Record values in key order", "(1, 'x')"),
        (":@name{a, b}", "Update", "Record assignments", "a = 1, b = 'x'"),
        (":*name{x = *}", "Optional", "Fragment or nothing", "x = 3"),
        ("::", "Cast", "Left alone", "id::text"),
    ];

    println!(
        "{:16} {:10} {:30} {}",
        "Syntax".white().bold(),
        "Name".white().bold(),
        "Function".white().bold(),
        "Renders".white().bold()
    );
    println!("{}", "─".repeat(80).dimmed());

    for (syntax, name, function, sql) in rows {
        println!(
            "{:16} {:10} {:30} {}",
            syntax.cyan().bold(),
            name.yellow(),
            function.white(),
            sql.dimmed()
        );
    }
}
