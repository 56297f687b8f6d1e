use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{LevelFilter, info};
use std::path::PathBuf;

use geosort::cache::{JsonFileCache, LocationCache};
use geosort::config::{Config, mask_key, parse_alias, parse_service_key};
use geosort::geocode::{NameStyle, ProviderKind, create_geocoding_service};
use geosort::metadata::MetadataReader;
use geosort::organize::collect_media_files;
use geosort::resolver::LocationResolver;
use geosort::sort::{SortResult, SortSummary, Sorter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Sort photos and videos into dated, location-named folders"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Path to the location cache file
    #[arg(long, value_name = "FILE", global = true)]
    cache: Option<PathBuf>,

    /// Print progress information
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print debug information
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize with a default config file
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Sort media files into `<date> <place>` folders
    Sort {
        /// Files or directories to sort
        #[arg(required = true, value_name = "INPUTS")]
        inputs: Vec<PathBuf>,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Geocoding service: Nominatim, OpenCage or LocationIQ
        #[arg(short, long, value_name = "PROVIDER")]
        service: Option<ProviderKind>,

        /// Service asked when the main one fails or knows no place (repeatable)
        #[arg(long, value_name = "PROVIDER")]
        fallback: Vec<ProviderKind>,

        /// Decimal places kept when grouping coordinates
        #[arg(short, long, value_name = "N")]
        precision: Option<u32>,

        /// Print what would be moved without moving anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// API key for a service, e.g. OpenCage:abc123
        #[arg(
            short,
            long = "key",
            value_name = "SERVICE:KEY",
            value_parser = parse_service_key
        )]
        keys: Vec<(ProviderKind, String)>,

        /// Use DEST wherever SOURCE was resolved
        #[arg(
            short,
            long = "alias",
            value_name = "SOURCE=DEST",
            value_parser = parse_alias
        )]
        aliases: Vec<(String, String)>,

        /// How much of the address goes into folder names
        #[arg(long, value_enum)]
        style: Option<NameStyle>,
    },

    /// Save an API key in the config file for later runs
    SetKey {
        /// Service and key, e.g. OpenCage:abc123
        #[arg(value_name = "SERVICE:KEY", value_parser = parse_service_key)]
        key: (ProviderKind, String),
    },

    /// Inspect or empty the location cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// List cached locations, aliases and configured keys
    List,
    /// Remove every cached location
    Clear,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.debug);

    match &cli.command {
        Commands::Init { force } => init_config(&cli.config, *force),
        Commands::Sort {
            inputs,
            recursive,
            service,
            fallback,
            precision,
            dry_run,
            keys,
            aliases,
            style,
        } => {
            let mut config = load_config(&cli.config)?;
            if let Some(service) = service {
                config.provider = *service;
            }
            if !fallback.is_empty() {
                config.fallback = fallback.clone();
            }
            if let Some(precision) = precision {
                config.precision = *precision;
            }
            if let Some(style) = style {
                config.name_style = *style;
            }

            let files = collect_media_files(inputs, *recursive);
            if files.is_empty() {
                println!("No media files found");
                return Ok(());
            }

            let cache_path = config.cache_path(&cli.cache);
            let cache =
                JsonFileCache::open(&cache_path).context("Failed to open location cache")?;
            let credentials = config.credentials(keys);
            let geocoder = create_geocoding_service(
                config.provider,
                &credentials,
                &config.provider_options(config.provider),
            )?;
            let fallbacks = config
                .fallback_providers(&credentials)
                .into_iter()
                .map(|provider| {
                    create_geocoding_service(
                        provider,
                        &credentials,
                        &config.provider_options(provider),
                    )
                })
                .collect::<Result<Vec<_>, _>>()?;
            let resolver = LocationResolver::new(
                geocoder,
                cache,
                config.alias_table(aliases),
                config.resolver_options(),
            )
            .with_fallbacks(fallbacks);

            info!(
                "Sorting {} files using {} (cache: {})",
                files.len(),
                config.provider,
                cache_path.display()
            );

            let reader = MetadataReader::detect().await;
            let mut sorter = Sorter::new(resolver, *dry_run);
            let results = sorter
                .sort_files(&reader, &files)
                .await
                .context("Sorting stopped, no files were moved")?;

            print_results(&results);

            let summary = SortSummary::from_results(&results);
            let stats = sorter.stats();
            if *dry_run {
                println!("\nDry run: {} files would be moved", summary.planned);
            } else {
                println!("\nMoved {} files", summary.moved);
            }
            if summary.skipped > 0 || summary.failed > 0 {
                println!(
                    "Skipped {} existing, {} failed",
                    summary.skipped, summary.failed
                );
            }
            println!(
                "Locations: {} from cache, {} provider requests, {} unresolved after errors",
                stats.cache_hits, stats.provider_calls, stats.failures
            );

            Ok(())
        }
        Commands::SetKey {
            key: (provider, key),
        } => {
            let config_path = Config::get_config_path(&cli.config);
            let mut config = Config::load_or_default(&config_path)?;
            config.set_key(*provider, key.as_str());
            config.save_to_file(&config_path)?;
            println!(
                "Saved {} key {} to {}",
                provider,
                mask_key(key),
                config_path.display()
            );
            Ok(())
        }
        Commands::Cache { command } => {
            let config = load_config(&cli.config)?;
            let cache_path = config.cache_path(&cli.cache);
            let mut cache =
                JsonFileCache::open(&cache_path).context("Failed to open location cache")?;

            match command {
                CacheCommands::List => {
                    list_cache(&cache, &config);
                    Ok(())
                }
                CacheCommands::Clear => {
                    let count = cache.len();
                    cache.clear().context("Failed to clear location cache")?;
                    println!("Removed {} cached locations from {}", count, cache_path.display());
                    Ok(())
                }
            }
        }
    }
}

fn init_logging(verbose: bool, debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else if verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

fn init_config(config_path_opt: &Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = Config::get_config_path(config_path_opt);

    if config_path.exists() && !force {
        println!("Config file already exists at {}", config_path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    let config = Config::default();
    config
        .save_to_file(&config_path)
        .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

    println!("Created config file at {}", config_path.display());
    Ok(())
}

fn load_config(config_path_opt: &Option<PathBuf>) -> Result<Config> {
    let config_path = Config::get_config_path(config_path_opt);
    Config::load_or_default(&config_path)
}

fn print_results(results: &[SortResult]) {
    for result in results {
        match result {
            SortResult::Moved(planned) => println!(
                "{} -> {}",
                planned.source.display(),
                planned.destination.display()
            ),
            SortResult::Planned(planned) => println!(
                "[dry run] {} -> {}",
                planned.source.display(),
                planned.destination.display()
            ),
            SortResult::Skipped(planned) => println!(
                "Skipped {}: {} already exists",
                planned.source.display(),
                planned.destination.display()
            ),
            SortResult::Failed(path, message) => {
                eprintln!("Failed {}: {}", path.display(), message)
            }
        }
    }
}

fn list_cache(cache: &JsonFileCache, config: &Config) {
    println!("Cache file: {}", cache.path().display());

    let entries = cache.list();
    if entries.is_empty() {
        println!("No cached locations");
    } else {
        println!("Cached locations ({}):", entries.len());
        for (key, place) in entries {
            println!("  {key} -> {place}");
        }
    }

    let aliases = config.alias_table(&[]);
    if !aliases.is_empty() {
        println!("Aliases:");
        for (source, destination) in aliases.rules() {
            println!("  {source} = {destination}");
        }
    }

    println!("Service keys:");
    for provider in ProviderKind::ALL {
        let key = config
            .keys
            .get(&provider)
            .map(|key| key.trim())
            .filter(|key| !key.is_empty());
        match (key, provider.requires_key()) {
            (Some(key), _) => println!("  {provider}: {}", mask_key(key)),
            (None, true) => println!("  {provider}: not set"),
            (None, false) => println!("  {provider}: not required"),
        }
    }
}
