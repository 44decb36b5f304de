use clap::{Parser, Subcommand};
use connection_hub::database::{DatabaseManager, DatabaseManagerImpl};
use connection_hub::{Config, Server};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "connection-hub")]
#[command(about = "OAuth connection service for linking external accounts")]
struct Cli {
    #[arg(short, long, help = "Path to configuration file")]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.logging.level))
        .init();

    if let Some(Commands::Migrate) = cli.command {
        let database = match DatabaseManagerImpl::new_from_config(&config.database).await {
            Ok(database) => database,
            Err(e) => {
                error!("Failed to connect to database: {}", e);
                std::process::exit(1);
            }
        };
        if let Err(e) = database.migrate().await {
            error!("Migration failed: {}", e);
            std::process::exit(1);
        }
        info!("Migrations complete");
        return;
    }

    info!("Starting connection hub");

    let server = match Server::new(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to initialize server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
