use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use geotally::input::{LabelColumn, TableOptions, load_table};
use geotally::{
    CancelSignal, GeoTallyConfig, GeoTallyError, Pipeline, geocoding, logging, report,
};

/// Count place names in a CSV file and geocode each distinct one
#[derive(Parser, Debug)]
#[command(name = "geotally")]
#[command(version)]
#[command(about, long_about = None)]
struct Cli {
    /// Input CSV file
    #[arg(short, long, value_name = "CSV")]
    input: PathBuf,

    /// Zero-based index of the place-name column
    #[arg(short, long, default_value = "0", conflicts_with = "column_name")]
    column: usize,

    /// Header name of the place-name column
    #[arg(long, value_name = "HEADER")]
    column_name: Option<String>,

    /// The first row is data, not a header
    #[arg(long)]
    no_header: bool,

    /// Also write the JSON report to this file
    #[arg(short, long, value_name = "JSON")]
    output: Option<PathBuf>,

    /// Configuration file
    #[arg(long, value_name = "TOML")]
    config: Option<PathBuf>,

    /// Concurrent resolution workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Fold case before counting
    #[arg(long)]
    case_insensitive: bool,

    /// Strip administrative suffixes (province, city) before counting
    #[arg(long)]
    strip_suffixes: bool,

    /// Resolve from a JSON lookup table instead of the online geocoder
    #[arg(long, value_name = "JSON")]
    table: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn table_options(&self) -> TableOptions {
        let column = match &self.column_name {
            Some(name) => LabelColumn::Name(name.clone()),
            None => LabelColumn::Index(self.column),
        };
        TableOptions {
            has_header: !self.no_header,
            column,
            ..TableOptions::default()
        }
    }

    fn apply_overrides(&self, config: &mut GeoTallyConfig) {
        if let Some(workers) = self.workers {
            config.pipeline.workers = u32::try_from(workers).unwrap_or(u32::MAX);
        }
        if self.case_insensitive {
            config.pipeline.case_insensitive = true;
        }
        if self.strip_suffixes {
            config.pipeline.strip_admin_suffixes = true;
        }
        if let Some(table) = &self.table {
            config.geocoding.provider = "table".to_string();
            config.geocoding.table_path = Some(table.display().to_string());
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = match e.downcast_ref::<GeoTallyError>() {
                Some(err) => format!("{} ({err})", err.user_message()),
                None => format!("{e:#}"),
            };
            eprintln!("Error: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = GeoTallyConfig::load_from_path(cli.config.clone())?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    logging::init(&config.logging, cli.verbose);
    info!("geotally {} starting", geotally::VERSION);

    let provider = geocoding::provider_from_config(&config.geocoding)?;

    let table = load_table(&cli.input, &cli.table_options())?;

    let (handle, signal) = CancelSignal::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            handle.cancel();
        }
    });

    let pipeline = Pipeline::from_config(&config, provider)?.with_cancel(signal);
    let result = pipeline
        .run(&table.rows, |row| table.label_of(row))
        .await?;

    if let Some(path) = &cli.output {
        report::write_json(&result, path)?;
    }
    print!("{}", report::summary(&result));

    Ok(())
}
