use std::path::PathBuf;

use anyhow::Result;
use boardlift_core::{BoardConfig, FileSessionStore};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod flows;

#[derive(Parser, Debug)]
#[command(name = "boardlift")]
#[command(about = "Self-service upgrade workflow for XenForo boards", long_about = None)]
struct Cli {
    /// Board configuration file
    #[arg(long, default_value = "boardlift.toml")]
    config: PathBuf,
    /// Workflow session identifier
    #[arg(long, default_value = "default")]
    session: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Authenticate against the customer portal and list licenses
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Select a license and list the products it offers
    Products {
        #[arg(long)]
        license: String,
    },
    /// Select a product and list the versions offered for it
    Versions {
        #[arg(long)]
        product: String,
    },
    /// Download, stage, expand, deploy, and install one version
    Run(RunCommand),
    /// Show pipeline progress for a version
    Status {
        #[arg(long)]
        version: String,
    },
}

#[derive(Args, Debug)]
struct RunCommand {
    #[arg(long)]
    version: String,
    /// Accept the vendor license agreement presented with the download
    #[arg(long)]
    agree: bool,
    /// Fetch the full upgrade package instead of the plain archive;
    /// defaults to on for the forum product, off for add-ons
    #[arg(long)]
    upgrade_package: Option<bool>,
    /// Mirror the expanded files to a remote host over FTP
    #[arg(long)]
    ftp_upload: bool,
    #[arg(long, default_value = "")]
    ftp_host: String,
    #[arg(long, default_value_t = 21)]
    ftp_port: u16,
    #[arg(long, default_value = "")]
    ftp_user: String,
    #[arg(long, default_value = "")]
    ftp_password: String,
    #[arg(long, default_value = "")]
    ftp_root: String,
    #[arg(long)]
    ftp_tls: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = BoardConfig::load(&cli.config)?;
    let sessions = FileSessionStore::new(&config.data_dir);

    match cli.command {
        Commands::Login { email, password } => {
            flows::login(&config, &sessions, &cli.session, email, password)
        }
        Commands::Products { license } => {
            flows::products(&sessions, &cli.session, &license)
        }
        Commands::Versions { product } => {
            flows::versions(&config, &sessions, &cli.session, &product)
        }
        Commands::Run(command) => flows::run(&config, &sessions, &cli.session, command),
        Commands::Status { version } => flows::status(&config, &version),
    }
}
