use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use tierdeploy::aws::{CfnDeployer, S3Store};
use tierdeploy::deploy::{plan, Deployment, Target};
use tierdeploy::handles::{ResourceHandles, STATE_DIR};
use tierdeploy::variables::Variables;
use tierdeploy::{config, logging};

#[derive(Parser)]
#[command(name = "tierdeploy", version)]
#[command(about = "Deploys a static frontend, an application backend and its database to AWS", long_about = None)]
struct Cli {
    /// TOML configuration file (default: ./tierdeploy.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// dotenv file layered under the process environment (default: ./.env when present)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
    /// tracing filter, eg: `info` or `tierdeploy=debug`
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Certificate, site, database and application, then DNS records
    Deploy,
    /// Only the TLS certificates
    Certificate,
    /// Certificates, then the static site
    Site,
    /// Only the database
    Database,
    /// Certificates, database and artifact bucket, then the application
    App,
    /// Render every stack template without calling AWS
    Plan {
        #[arg(long, default_value = ".tierdeploy/templates")]
        out: PathBuf,
    },
    /// Print the resource handles cached by the last runs
    Status,
}

fn variables(env_file: Option<&Path>) -> Result<Variables> {
    let vars = Variables::from_process();
    let default_env = Path::new(".env");
    match env_file {
        Some(path) => Ok(vars.with_dot_env(path)?),
        None if default_env.exists() => Ok(vars.with_dot_env(default_env)?),
        None => Ok(vars),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let state_dir = Path::new(STATE_DIR);

    if let Commands::Status = cli.command {
        let handles = ResourceHandles::load(state_dir).context("Failed to read cached handles")?;
        println!("{}", serde_json::to_string_pretty(&handles)?);
        return Ok(());
    }

    let vars = variables(cli.env_file.as_deref())?;
    let config = config::load(cli.config.as_deref(), &vars).context("Failed to load configuration")?;
    let log_path = logging::init(cli.log_level.as_deref(), &config.log).context("Failed to set up logging")?;
    info!(path = %log_path.display(), "Logging to file");
    logging::banner(&config);

    let target = match cli.command {
        Commands::Plan { out } => {
            let written = plan(&config, &out)?;
            info!(count = written.len(), dir = %out.display(), "Templates written");
            return Ok(());
        }
        Commands::Status => return Ok(()),
        Commands::Deploy => Target::All,
        Commands::Certificate => Target::Certificate,
        Commands::Site => Target::Site,
        Commands::Database => Target::Database,
        Commands::App => Target::App,
    };

    let deployer = CfnDeployer::new(config.wait.options());
    let store = S3Store::new(&config.region).await;
    let handles = match Deployment::new(&config, &deployer, &store).run(target).await {
        Ok(handles) => handles,
        Err(e) => {
            if e.is_transient() {
                error!(error = %e, "Deployment interrupted, re-run the same command to resume");
            } else {
                error!(error = %e, "Deployment failed");
            }
            return Err(e.into());
        }
    };

    let mut cached = ResourceHandles::load(state_dir).unwrap_or_default();
    cached.merge(handles);
    cached.save(state_dir).context("Failed to cache resource handles")?;
    info!("Deployment complete");
    Ok(())
}
