use anyhow::Result;
use clap::{Parser, Subcommand};

use labdesk::config::{get_config, init_config_from};
use labdesk::errors::LabdeskError;
use labdesk::runtime::modes;
use labdesk::system::init_logging;

/// labdesk - diagnostic lab and clinic backend
#[derive(Parser)]
#[command(name = "labdesk")]
#[command(version)]
#[command(about = "Backend for multi-branch diagnostic labs and clinics", long_about = None)]
struct Cli {
    /// Path to config.toml
    #[arg(long, short = 'c', global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Apply pending database migrations and exit
    Migrate,

    /// Generate an example configuration file
    GenerateConfig {
        /// Output path (default: stdout)
        output: Option<String>,
    },
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // 生成配置不需要加载现有配置
    if let Some(Commands::GenerateConfig { output }) = &cli.command {
        return modes::generate_config(output.as_deref());
    }

    init_config_from(cli.config.as_deref());
    let config = get_config();
    let _guard = init_logging(&config.logging)?;

    let result = match cli.command {
        Some(Commands::Migrate) => modes::run_migrate().await,
        Some(Commands::Serve) | None => modes::run_server().await,
        Some(Commands::GenerateConfig { .. }) => Ok(()),
    };

    if let Err(err) = &result
        && let Some(labdesk_err) = err.downcast_ref::<LabdeskError>()
    {
        eprintln!("{}", labdesk_err.format_colored());
        std::process::exit(1);
    }
    result
}
