use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vpr_cache::{CacheConfig, PatientCacheKey, PatientDataCache};
use vpr_core::{get_patient_data, parse_vpr_str, CoreConfig, HttpVistaClient};
use vpr_types::{CallerId, PatientId, StationId};

#[derive(Parser)]
#[command(name = "vpr")]
#[command(about = "VPR patient data access CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a VPR JSON document and print a summary
    Parse {
        /// Path to the VPR JSON document
        file: String,
        /// Station the document came from (defaults to DEFAULT_STATION)
        #[arg(long)]
        station: Option<String>,
        /// Patient DFN
        #[arg(long, default_value = "")]
        dfn: String,
    },
    /// Report the health of the configured cache backend
    CacheHealth,
    /// Drop a cached patient view
    Invalidate {
        /// Station number
        station: String,
        /// Patient DFN
        dfn: String,
        /// Caller DUZ (defaults to DEFAULT_DUZ)
        duz: Option<String>,
    },
    /// Fetch a patient's record through the cache
    Fetch {
        /// Station number
        station: String,
        /// Patient DFN
        dfn: String,
        /// Caller DUZ (defaults to DEFAULT_DUZ)
        #[arg(long)]
        duz: Option<String>,
    },
}

fn caller_or_default(duz: Option<String>, config: &CoreConfig) -> Result<CallerId, vpr_types::TextError> {
    match duz {
        Some(duz) => CallerId::new(duz),
        None => Ok(config.default_duz().clone()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("vpr_core=warn".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = CoreConfig::from_env()?;

    match cli.command {
        Some(Commands::Parse { file, station, dfn }) => {
            let text = std::fs::read_to_string(&file)?;
            let station = station.unwrap_or_else(|| config.default_station().to_string());
            match parse_vpr_str(&text, &station, &dfn) {
                Ok(collection) => {
                    let summary = collection.summary(chrono::Utc::now());
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
                Err(e) => eprintln!("Error parsing {}: {}", file, e),
            }
        }
        Some(Commands::CacheHealth) => {
            let cache = PatientDataCache::from_config(&CacheConfig::from_env()?).await?;
            let health = cache.health().await;
            println!("{}", serde_json::to_string_pretty(&health)?);
            cache.close().await;
        }
        Some(Commands::Invalidate { station, dfn, duz }) => {
            let key = PatientCacheKey::new(
                StationId::new(station)?,
                PatientId::new(dfn)?,
                caller_or_default(duz, &config)?,
            );
            let cache = PatientDataCache::from_config(&CacheConfig::from_env()?).await?;
            if cache.invalidate_patient_data(&key).await {
                println!("Invalidated {}", key);
            } else {
                println!("Nothing cached for {}", key);
            }
            cache.close().await;
        }
        Some(Commands::Fetch { station, dfn, duz }) => {
            let station = StationId::new(station)?;
            let dfn = PatientId::new(dfn)?;
            let caller = caller_or_default(duz, &config)?;
            let client = HttpVistaClient::from_config(&config)?;
            let cache = PatientDataCache::from_config(&CacheConfig::from_env()?).await?;
            let outcome = get_patient_data(&client, &cache, &station, &dfn, &caller).await;
            cache.close().await;
            match outcome {
                Ok(collection) => println!("{}", serde_json::to_string_pretty(&collection)?),
                Err(e) => eprintln!("Error fetching patient {} at {}: {}", dfn, station, e),
            }
        }
        None => {
            println!("Use 'vpr --help' for commands");
        }
    }

    Ok(())
}
