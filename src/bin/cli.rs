use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crm_bridge::curl;
use crm_bridge::engine::SyncEngine;
use crm_bridge::mapping;
use crm_bridge::placeholders;
use crm_bridge::storage::{encryption, IntegrationInput, SqliteStorage, Storage};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the database
    InitDb {
        /// Database URL (default: sqlite:crm_bridge.db)
        #[arg(long, default_value = "sqlite:crm_bridge.db")]
        db_url: String,
    },
    /// Create an integration from a JSON config file
    AddIntegration {
        /// Path to the integration JSON (IntegrationInput shape)
        #[arg(short, long)]
        file: PathBuf,
        /// Database URL
        #[arg(long, default_value = "sqlite:crm_bridge.db")]
        db_url: String,
    },
    /// List configured integrations
    ListIntegrations {
        /// Database URL
        #[arg(long, default_value = "sqlite:crm_bridge.db")]
        db_url: String,
    },
    /// Show one integration (read model, credential redacted)
    ShowIntegration {
        /// Integration ID
        #[arg(short, long)]
        id: Uuid,
        /// Database URL
        #[arg(long, default_value = "sqlite:crm_bridge.db")]
        db_url: String,
    },
    /// Delete an integration
    DeleteIntegration {
        /// Integration ID
        #[arg(short, long)]
        id: Uuid,
        /// Database URL
        #[arg(long, default_value = "sqlite:crm_bridge.db")]
        db_url: String,
    },
    /// Run the login handshake against an integration's target system
    TestConnection {
        /// Integration ID
        #[arg(short, long)]
        id: Uuid,
        /// Database URL
        #[arg(long, default_value = "sqlite:crm_bridge.db")]
        db_url: String,
    },
    /// Parse a captured curl command and suggest a field mapping
    ParseCurl {
        /// Path to a file holding the pasted curl command
        #[arg(short, long)]
        file: PathBuf,
    },
    /// List the available mapping placeholders
    Placeholders,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::InitDb { db_url } => {
            // Ensure the file exists for sqlite
            if db_url.starts_with("sqlite:") {
                let path = db_url.trim_start_matches("sqlite:");
                if !std::path::Path::new(path).exists() {
                    fs::File::create(path)?;
                }
            }
            let storage = SqliteStorage::new(&db_url).await?;
            storage.init().await?;
            println!("Database initialized at {}", db_url);
        }
        Commands::AddIntegration { file, db_url } => {
            let content = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let input: IntegrationInput = serde_json::from_str(&content)?;

            // Reject a mapping that would fail at send time.
            mapping::compile(&input.field_mapping)?;
            if input.password.is_none() {
                bail!("the integration config must carry a password");
            }

            let storage = SqliteStorage::new(&db_url).await?;
            let integration = storage.create_integration(&input).await?;
            println!("Integration created: {} (ID: {})", integration.name, integration.id);
        }
        Commands::ListIntegrations { db_url } => {
            let storage = SqliteStorage::new(&db_url).await?;
            let integrations = storage.list_integrations().await?;
            for integration in integrations {
                let view = integration.view();
                println!(
                    "- {} (ID: {}, active: {}, credential: {})",
                    view.name, view.id, view.is_active, view.has_credential
                );
            }
        }
        Commands::ShowIntegration { id, db_url } => {
            let storage = SqliteStorage::new(&db_url).await?;
            let Some(integration) = storage.get_integration(id).await? else {
                bail!("no integration with ID {}", id);
            };
            println!("{}", serde_json::to_string_pretty(&integration.view())?);
        }
        Commands::DeleteIntegration { id, db_url } => {
            let storage = SqliteStorage::new(&db_url).await?;
            if storage.delete_integration(id).await? {
                println!("Integration {} deleted", id);
            } else {
                bail!("no integration with ID {}", id);
            }
        }
        Commands::TestConnection { id, db_url } => {
            let storage = SqliteStorage::new(&db_url).await?;
            let Some(integration) = storage.get_integration(id).await? else {
                bail!("no integration with ID {}", id);
            };
            let password = encryption::decrypt(&integration.password)
                .context("stored credential could not be decrypted")?;

            let engine = SyncEngine::new();
            let result = engine.test_connection(&integration, &password).await;
            if result.success {
                println!("OK: {}", result.message);
            } else {
                println!("FAILED: {}", result.message);
            }
        }
        Commands::ParseCurl { file } => {
            let content = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let request = curl::parse(&content)?;
            println!("{} {}", request.method, request.url);
            if let Some(content_type) = &request.content_type {
                println!("Content-Type: {}", content_type);
            }
            for field in curl::suggest_fields(&request) {
                match field.suggested_placeholder {
                    Some(token) => println!("  {} = {:?}  -> {}", field.name, field.value, token),
                    None => println!("  {} = {:?}", field.name, field.value),
                }
            }
        }
        Commands::Placeholders => {
            for (token, info) in placeholders::list() {
                println!("{}  {} (e.g. {})", token, info.description, info.example);
            }
        }
    }

    Ok(())
}
