use clap::Parser;
use scale_engine::cli::{Cli, Commands};
use scale_engine::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Validate = cli.command {
        let config = Config::load(&cli.config)?;
        let settings = config.validate()?;
        println!("Configuration {} is valid", cli.config);
        println!(
            "  Vault: {} bankroll {} max positions {}",
            settings.vault.id, settings.bankroll, settings.vault.max_positions
        );
        println!("  Stages: {}", settings.progression.max_stages());
        return Ok(());
    }

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using example configuration");
            toml::from_str(include_str!("../config.toml.example"))?
        }
    };

    // Initialize telemetry
    let _telemetry = scale_engine::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Simulate(args) => {
            tracing::info!(symbol = %args.symbol, direction = %args.direction, "Starting simulation");
            args.execute(&config).await?;
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Validate => {}
    }

    Ok(())
}
