use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;

use stockroom::category::{
    visible_rows, CategoryId, CategoryPatch, ExpansionSet, NewCategory, SortKey, SortOrder,
};
use stockroom::config::Config;
use stockroom::store::{RecordStore, RestStore, SqliteStore};
use stockroom::sync::{SyncController, SyncSettings};
use stockroom::ui;

/// Get the config directory path (~/.config/stockroom/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("stockroom"))
}

#[derive(Parser, Debug)]
#[command(name = "stockroom", about = "Inventory category manager")]
struct Args {
    /// Config file (default: ~/.config/stockroom/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Inventory API base URL, overriding the config file
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Local SQLite store, used when no API URL is configured
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the category tree
    Tree {
        /// Only show categories matching this term, plus their ancestors
        #[arg(long)]
        search: Option<String>,
        /// name, product-count, revenue or created-at
        #[arg(long)]
        sort: Option<SortKey>,
        /// Sort descending
        #[arg(long)]
        desc: bool,
        /// Only show top-level categories
        #[arg(long)]
        collapsed: bool,
        /// Output width in columns
        #[arg(long, default_value_t = 60)]
        width: usize,
    },
    /// Create a category
    Add {
        name: String,
        #[arg(long)]
        parent: Option<CategoryId>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        icon: Option<String>,
    },
    /// Rename a category
    Rename { id: CategoryId, name: String },
    /// Move a category under a new parent, or to the top level without --parent
    Move {
        id: CategoryId,
        #[arg(long)]
        parent: Option<CategoryId>,
    },
    /// Delete categories. Refused if any of them still holds products.
    Rm {
        #[arg(required = true)]
        ids: Vec<CategoryId>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never mix with printed trees
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if let Some(url) = &args.api_url {
        config.api_url = Some(url.clone());
    }

    let store = open_store(&config, args.db.as_deref(), &config_dir).await?;
    let mut controller = SyncController::new(store, SyncSettings::from(&config));
    controller.mount();
    controller.settle().await;
    if let Some(err) = controller.last_error() {
        anyhow::bail!("Failed to load categories: {}", err);
    }

    match args.command {
        Command::Tree {
            search,
            sort,
            desc,
            collapsed,
            width,
        } => {
            let key = sort.unwrap_or(config.default_sort);
            let order = if desc { SortOrder::Desc } else { config.default_order };
            controller.set_sort(key, order);
            if let Some(term) = &search {
                controller.search(term);
            }
            controller.settle().await;
            if let Some(err) = controller.last_error() {
                anyhow::bail!("Failed to load categories: {}", err);
            }
            print_tree(&mut controller, collapsed, width);
        }
        Command::Add {
            name,
            parent,
            description,
            color,
            icon,
        } => {
            let draft = NewCategory {
                name,
                parent_id: parent,
                description,
                color,
                icon,
                ..NewCategory::default()
            };
            let record = controller.create(draft)?.wait().await?;
            println!("Created {} ({})", record.name, record.id);
        }
        Command::Rename { id, name } => {
            let record = controller
                .update(&id, CategoryPatch::rename(name))?
                .wait()
                .await?;
            println!("Renamed {} to {}", record.id, record.name);
        }
        Command::Move { id, parent } => {
            let record = controller
                .update(&id, CategoryPatch::move_to(parent))?
                .wait()
                .await?;
            match &record.parent_id {
                Some(parent) => println!("Moved {} under {}", record.name, parent),
                None => println!("Moved {} to the top level", record.name),
            }
        }
        Command::Rm { ids } => {
            let ticket = if ids.len() == 1 {
                controller.remove(&ids[0])?
            } else {
                controller.remove_many(&ids)?
            };
            ticket.wait().await?;
            println!("Deleted {} categor{}", ids.len(), if ids.len() == 1 { "y" } else { "ies" });
        }
    }

    // Let follow-up refreshes finish before the runtime shuts down
    controller.settle().await;
    controller.unmount();
    Ok(())
}

/// Remote store when an API URL is configured, local SQLite otherwise.
async fn open_store(
    config: &Config,
    db_override: Option<&std::path::Path>,
    config_dir: &std::path::Path,
) -> Result<Arc<dyn RecordStore>> {
    if db_override.is_none() {
        if let Some(url) = &config.api_url {
            let token = config.resolved_api_token().map(SecretString::from);
            let store = RestStore::new(url, token, config.request_timeout())
                .context("Failed to configure inventory API")?;
            tracing::info!(api_url = %url, "Using remote category store");
            return Ok(Arc::new(store));
        }
    }

    let db_path = match (db_override, &config.database_path) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(path)) => PathBuf::from(path),
        (None, None) => {
            if !config_dir.exists() {
                std::fs::create_dir_all(config_dir)
                    .context("Failed to create config directory")?;
            }
            config_dir.join("stockroom.db")
        }
    };
    let path = db_path.to_string_lossy();
    let store = SqliteStore::open(&path)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    Ok(Arc::new(store))
}

fn print_tree(controller: &mut SyncController, collapsed: bool, width: usize) {
    let rows = if collapsed {
        controller.visible_rows()
    } else {
        let forest = controller.forest();
        visible_rows(&forest, &ExpansionSet::new(), true)
    };

    for line in ui::render_rows(&rows, width) {
        println!("{}", line);
    }

    let status = ui::status_line(
        controller.state(),
        controller.last_error(),
        rows.len(),
        controller.records().len(),
        controller.search_term(),
    );
    println!("{}", status);
}
