//! rocrate-tabular CLI: flatten an RO-Crate into SQLite tables.

use std::path::PathBuf;

use clap::Parser;
use miette::Result;

use rocrate_tabular::engine::{Tabulator, TabulatorConfig};
use rocrate_tabular::flatten::DEFAULT_MAX_COLUMN_SUFFIX;
use rocrate_tabular::graph::CrateSource;
use rocrate_tabular::plan::DEFAULT_JUNCTION_THRESHOLD;

#[derive(Parser)]
#[command(name = "rocrate-tabular", version, about = "RO-Crate to tables")]
struct Cli {
    /// RO-Crate URL, directory or metadata file.
    #[arg(value_name = "CRATE")]
    crate_location: String,

    /// SQLite database file (recreated on every run).
    #[arg(default_value = "output.db")]
    output: PathBuf,

    /// Configuration file; generated from the crate if it does not exist.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Property whose targets are loaded as text into the database.
    #[arg(short, long = "text")]
    text: Option<String>,

    /// Find CSV files in the crate and concatenate them into `csv_files`.
    #[arg(long)]
    csv: bool,

    /// Directory for exported CSV files and their metadata.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// When generating a config, make every type a table.
    #[arg(long)]
    all_tables: bool,

    /// Values per entity above which a property gets a junction table.
    #[arg(long, default_value_t = DEFAULT_JUNCTION_THRESHOLD)]
    junction_threshold: usize,

    /// Highest numeric suffix for repeated columns.
    #[arg(long, default_value_t = DEFAULT_MAX_COLUMN_SUFFIX)]
    max_suffix: usize,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let settings = TabulatorConfig {
        junction_threshold: cli.junction_threshold,
        max_column_suffix: cli.max_suffix,
        text_prop: cli.text.clone(),
    };
    let mut tab = Tabulator::open(&cli.output, settings)?;

    println!("Building properties table");
    tab.load_crate(&CrateSource::parse(&cli.crate_location))?;

    if cli.config.is_file() {
        println!("Loading config from {}", cli.config.display());
        tab.read_config(&cli.config)?;
    } else {
        println!(
            "Config {} not found - generating default",
            cli.config.display()
        );
        let config = tab.infer_config()?;
        if cli.all_tables {
            config.promote_all();
        }
    }

    let types: Vec<String> = tab.config()?.tables.keys().cloned().collect();
    for entity_type in &types {
        println!("Building entity table for {entity_type}");
        tab.build_table(entity_type)?;
    }

    tab.write_config(&cli.config)?;
    println!(
        "\nUpdated config file: {}, edit this file to change the flattening \
         configuration or delete it to start over\n",
        cli.config.display()
    );

    if cli.csv {
        let summary = tab.ingest_csv_files()?;
        println!(
            "Loaded {} rows from {} CSV files",
            summary.rows, summary.files
        );
    }

    if !tab.config()?.export_queries.is_empty() {
        for file in tab.export_csv(&cli.out_dir)? {
            println!("Exported {} ({} rows)", file.path.display(), file.rows);
        }
    }

    println!("{}", tab.info()?);
    Ok(())
}
