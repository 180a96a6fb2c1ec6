use anyhow::Context;
use clap::Parser;
use secret_projector::config::{self, Overrides, Settings};
use secret_projector::projector::{self, Projector};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "secret-projector")]
#[command(version)]
#[command(about = "Project credentials from creds repositories into Kubernetes Secrets", long_about = None)]
struct Cli {
    /// label=<path> pair identifying a source credentials repository (repeatable, or comma separated)
    #[arg(long = "creds-repo", value_name = "LABEL=PATH", value_delimiter = ',', value_parser = config::parse_creds_repo)]
    creds_repos: Vec<(String, PathBuf)>,

    /// Path to projection mapping yamls
    #[arg(long)]
    manifests: Option<PathBuf>,

    /// Output generated secrets here
    #[arg(long)]
    output: Option<PathBuf>,

    /// Path to the creds keys file used by encryption modules
    #[arg(long)]
    creds_encryption_key: Option<PathBuf>,

    /// Path to the file that decrypts the creds keys (module dependent)
    #[arg(long)]
    creds_key_decryption_key: Option<PathBuf>,

    /// Label secrets with --label-managed-key and --label-version-key
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    label_secrets: Option<bool>,

    /// Label all generated secrets with this key=true
    #[arg(long)]
    label_managed_key: Option<String>,

    /// Label all generated secrets with this key, using the value of --generation
    #[arg(long)]
    label_version_key: Option<String>,

    /// Generation label value (defaults to the current Unix time)
    #[arg(long)]
    generation: Option<String>,

    /// Debug logging
    #[arg(long)]
    debug: bool,

    /// Print generated secrets to stdout (only with --debug)
    #[arg(long)]
    debug_show_secrets: bool,

    /// Settings file (defaults to secret-projector/config.toml in the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            creds_repos: self.creds_repos.clone(),
            manifests: self.manifests.clone(),
            output: self.output.clone(),
            creds_encryption_key: self.creds_encryption_key.clone(),
            creds_key_decryption_key: self.creds_key_decryption_key.clone(),
            label_secrets: self.label_secrets,
            label_managed_key: self.label_managed_key.clone(),
            label_version_key: self.label_version_key.clone(),
            generation: self.generation.clone(),
            debug: self.debug,
            debug_show_secrets: self.debug_show_secrets,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_env("SECRET_PROJECTOR_LOG").unwrap_or_else(|_| {
        if cli.debug {
            EnvFilter::new("secret_projector=debug")
        } else {
            EnvFilter::new("secret_projector=info")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "secret-projector");

    let settings = Settings::load(cli.config.as_deref(), cli.overrides())
        .context("invalid settings")?;
    for (repo, path) in &settings.creds_repos {
        debug!(repo = %repo, path = %path.display(), "creds repo");
    }

    let show_secrets = settings.show_secrets();
    let projector = Projector::new(settings);
    let summary = projector.run()?;
    info!(
        secrets = summary.secrets.len(),
        written = summary.written.len(),
        "projection complete"
    );

    if show_secrets {
        print!("{}", projector::render_all(&summary.secrets)?);
    }
    Ok(())
}
