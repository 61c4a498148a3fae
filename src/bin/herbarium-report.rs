use clap::{Parser, Subcommand};
use std::path::PathBuf;

use herbarium::auth::SessionUser;
use herbarium::config::HerbariumConfig;
use herbarium::error::{Error, Result};
use herbarium::report::{
    available_families, available_years, export_csv, DashboardSummary, ReportFilter, ReportKind,
    ReportViews,
};
use herbarium::users::{AccountStatus, Role};
use herbarium::Herbarium;

#[derive(Parser, Debug)]
#[clap(name = "herbarium-report", version)]
#[clap(about = "Catalog summaries and CSV reports for the herbarium", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// Service role key. Falls back to HERBARIUM_SERVICE_KEY.
    #[clap(long)]
    service_key: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print dashboard numbers and the available filters
    Summary,
    /// Export one report as CSV
    Report {
        /// family, conservation, location, trend or specimens
        kind: String,
        /// Collection year, or "all"
        #[clap(long, default_value = "all")]
        year: String,
        /// Family name, or "all"
        #[clap(long, default_value = "all")]
        family: String,
        /// Write the file into this directory instead of stdout
        #[clap(long)]
        out: Option<PathBuf>,
    },
}

/// The service role acts with administrator rights
fn service_user() -> SessionUser {
    SessionUser {
        id: "service-role".to_string(),
        email: "service-role@localhost".to_string(),
        role: Role::Admin,
        status: AccountStatus::Active,
        first_name: String::new(),
        last_name: String::new(),
    }
}

fn connect(service_key: Option<String>) -> Result<Herbarium> {
    let url = std::env::var("HERBARIUM_URL")
        .map_err(|_| Error::config("HERBARIUM_URL environment variable not found"))?;
    let key = service_key
        .or_else(|| std::env::var("HERBARIUM_SERVICE_KEY").ok())
        .ok_or_else(|| {
            Error::config("Service key not provided via --service-key or HERBARIUM_SERVICE_KEY")
        })?;

    let mut config = HerbariumConfig::new(&url, key)?;
    if let Ok(env_config) = HerbariumConfig::from_env() {
        config = config.with_options(env_config.options);
    }
    Ok(Herbarium::new(config))
}

async fn run() -> Result<()> {
    dotenv::dotenv().ok();
    pretty_env_logger::init();
    let cli = Cli::parse();

    let herbarium = connect(cli.service_key)?;
    let specimens = herbarium
        .specimens()
        .get_all_specimens()
        .await
        .into_result()
        .map_err(Error::general)?;
    log::info!("Loaded {} specimens", specimens.len());

    match cli.command {
        Commands::Summary => {
            let summary = DashboardSummary::compute(&specimens);
            println!("Specimens:        {}", summary.total_specimens);
            println!("Families:         {}", summary.distinct_families);
            println!("Threatened:       {}", summary.threatened);
            println!("With coordinates: {}", summary.with_coordinates);
            println!("Recent:");
            for specimen in &summary.recent {
                println!("  {}  {}", specimen.collection_date, specimen.scientific_name);
            }
            let years: Vec<String> = available_years(&specimens)
                .iter()
                .map(|y| y.to_string())
                .collect();
            println!("Years:    {}", years.join(", "));
            println!("Families: {}", available_families(&specimens).join(", "));
        }
        Commands::Report {
            kind,
            year,
            family,
            out,
        } => {
            let kind: ReportKind = kind.parse()?;
            let filter = ReportFilter::parse(&year, &family)?;
            let views = ReportViews::compute(&specimens, &filter);
            let selected = filter.apply(&specimens);
            let export = export_csv(Some(&service_user()), kind, &views, &selected)?;

            match out {
                Some(dir) => {
                    let path = export.write_to(&dir).await?;
                    println!("{} rows matched, wrote {}", views.filter_matches, path.display());
                }
                None => print!("{}", export.body),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
