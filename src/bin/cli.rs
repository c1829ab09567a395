use clap::Parser;
use std::sync::Arc;
use ton_watcher::api::{Cli, CliHandler};
use ton_watcher::config::AppConfig;
use ton_watcher::database::CursorStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Less verbose than the watcher itself
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let config = AppConfig::load().unwrap_or_default();
    let db_path = cli.database.clone().unwrap_or(config.database.path);

    let store = match CursorStore::new(&db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Failed to open store at '{}': {}", db_path, e);
            std::process::exit(1);
        }
    };

    let handler = CliHandler::new(store);
    match handler.execute_command(&cli.command).await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
