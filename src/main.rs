use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use housing_desk::api::HttpBackend;
use housing_desk::cache::{CachePolicy, FileStorage, PersistentCache};
use housing_desk::clock::SystemClock;
use housing_desk::config::Config;
use housing_desk::filters::{PersonFilterPatch, PropertyFilterPatch, SortBy};
use housing_desk::models::{EntityId, PersonRole, Property, PropertyType};
use housing_desk::store::{LoadStatus, Store};

/// Housing Desk - keep track of properties and the people around them
#[derive(Parser, Debug)]
#[command(name = "housing-desk")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "housing-desk.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch everything from the backend and refresh the local cache
    Sync,

    /// List properties matching the given filters
    List {
        /// Text matched against properties, their connections and persons
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        zone: Option<String>,
        /// Property type, repeatable
        #[arg(long = "type")]
        types: Vec<PropertyType>,
        /// price_asc, price_desc, size_asc, size_desc, rating_desc, oldest, newest
        #[arg(long)]
        sort: Option<SortBy>,
    },

    /// Show a property with its persons, connections and links
    Show { id: EntityId },

    /// List persons matching the given filters
    People {
        #[arg(long)]
        search: Option<String>,
        /// Person role, repeatable
        #[arg(long)]
        role: Vec<PersonRole>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    config.logging.init();

    let store = build_store(&config)?;

    match cli.command {
        Commands::Sync => sync(&store).await,
        Commands::List {
            search,
            zone,
            types,
            sort,
        } => {
            load(&store).await?;
            store.update_filters(PropertyFilterPatch {
                search_query: Some(search.unwrap_or_default()),
                zone: Some(zone),
                property_types: Some(types),
                sort_by: sort,
                ..PropertyFilterPatch::default()
            });
            store.flush_derivations();

            let properties = store.filtered_properties();
            for (i, property) in properties.iter().enumerate() {
                print_property(i + 1, property);
            }
            info!(shown = properties.len(), total = store.properties().len(), "Listed properties");
            Ok(())
        }
        Commands::Show { id } => {
            store.load_from_cache();
            let Some(details) = store.load_property_details(id).await else {
                bail!(store.error().unwrap_or_else(|| format!("Property {id} not found")));
            };

            print_property(1, &details.property);
            if !details.property.description.is_empty() {
                println!("   {}", details.property.description);
            }
            for person in &details.persons {
                let role = details
                    .connections
                    .iter()
                    .find(|c| c.person_id == person.id)
                    .map(|c| c.role.as_str())
                    .unwrap_or_default();
                println!("   Person: {} ({}) {}", person.name, role, person.phone);
            }
            for link in &details.links {
                println!("   Link: {}", link.link);
            }
            Ok(())
        }
        Commands::People { search, role } => {
            load(&store).await?;
            store.update_person_filters(PersonFilterPatch {
                search_query: Some(search.unwrap_or_default()),
                roles: Some(role),
                ..PersonFilterPatch::default()
            });
            store.flush_derivations();

            for person in store.filtered_persons() {
                let properties = store.properties_for_person(person.id).len();
                println!("{} [{}] {} - {} properties", person.name, person.role, person.phone, properties);
            }
            Ok(())
        }
    }
}

fn build_store(config: &Config) -> Result<Store> {
    let backend = HttpBackend::new(&config.api)?;
    let storage = FileStorage::new(&config.cache.dir);
    let clock = Arc::new(SystemClock);
    let cache = PersistentCache::new(Arc::new(storage), clock.clone(), CachePolicy::from(&config.cache));
    Ok(Store::new(Arc::new(backend), cache, clock, config.store.clone()))
}

async fn sync(store: &Store) -> Result<()> {
    if store.bootstrap().await == LoadStatus::Failed {
        bail!(store.error().unwrap_or_else(|| "Sync failed".into()));
    }
    let state = store.snapshot();
    println!(
        "Synced {} properties, {} persons, {} connections, {} links",
        state.properties.len(),
        state.persons.len(),
        state.connections.len(),
        state.links.len()
    );
    Ok(())
}

/// Serve from cache when it has properties, otherwise fetch
async fn load(store: &Store) -> Result<()> {
    store.load_from_cache();
    if store.properties().is_empty() && store.load_all_data().await == LoadStatus::Failed {
        bail!(store.error().unwrap_or_else(|| "Load failed".into()));
    }
    Ok(())
}

fn print_property(n: usize, property: &Property) {
    println!(
        "{}. #{} {} {} ({})",
        n, property.id, property.property_type, property.zone, property.area
    );
    println!(
        "   {:.0}-{:.0} kr, {:.0}-{:.0} kvm, rating {}",
        property.price_min, property.price_max, property.size_min, property.size_max, property.rating
    );
    if !property.tags.is_empty() {
        println!("   Tags: {}", property.tags.join(", "));
    }
}
