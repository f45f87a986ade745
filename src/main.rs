use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use certrenew::{
    acme::LetsEncryptConnector,
    batch::{self, BatchSettings, RenewCheck},
    config::{Config, DnsCredentials},
    issue::Issuer,
    output,
    tls::{ExpirationProber, ProbeSettings},
};

const DEFAULT_LOG_FILTER: &str = "info,reqwest=warn,hyper=warn,hyper_util=warn,rustls=warn";

#[derive(Parser, Debug)]
#[command(name = "certrenew")]
#[command(about = "Check TLS certificate expiry and issue Let's Encrypt certificates over DNS-01")]
#[command(version)]
struct Args {
    /// Path to an optional YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct IssueArgs {
    /// Domain, optionally followed by a PEM file ("-" for stdout).
    /// With --directory, any number of domains.
    #[arg(required = true, value_name = "DOMAIN|PEM-FILE")]
    targets: Vec<String>,

    /// Write each certificate to <directory>/<domain>.pem
    #[arg(long)]
    directory: Option<PathBuf>,

    /// Key file for the Let's Encrypt account. If it does not exist, new
    /// account and certificate keys are created next to it.
    #[arg(long, value_name = "KEY-FILE")]
    account: Option<PathBuf>,

    /// Contact email for the account [default: info@<domain>]
    #[arg(long)]
    email: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Request a new certificate
    Issue(IssueArgs),

    /// Request a new certificate unless the current one is still valid
    Renew {
        #[command(flatten)]
        issue: IssueArgs,

        /// Renew only when the certificate expires within this many days; 0 always renews
        #[arg(long, value_name = "DAYS")]
        check: Option<u32>,

        /// Host to probe instead of the domain
        #[arg(long)]
        server: Option<String>,
    },

    /// Print the number of days until the certificate expires
    Expiration {
        domain: String,

        /// Host to connect to instead of the domain
        #[arg(long)]
        server: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize tracing; stdout is reserved for PEM output and day counts
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if args.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let config = Config::load_or_default(args.config.as_deref())?;
    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    match args.command {
        Command::Issue(issue) => run_batch(&config, &issue, None).await,
        Command::Renew {
            issue,
            check,
            server,
        } => {
            let threshold_days = check.unwrap_or(config.renewal.check_days);
            let renew_check = RenewCheck::setup(threshold_days, server, || {
                ExpirationProber::new(ProbeSettings::from(&config.probe))
            });
            run_batch(&config, &issue, renew_check.as_ref()).await
        }
        Command::Expiration { domain, server } => {
            let prober = ExpirationProber::new(ProbeSettings::from(&config.probe));
            let report = batch::check_expiration(prober, &domain, server.as_deref()).await;
            println!("{}", report.output);
            Ok(report.exit_code())
        }
    }
}

async fn run_batch(
    config: &Config,
    args: &IssueArgs,
    renew_check: Option<&RenewCheck<ExpirationProber>>,
) -> Result<ExitCode> {
    let plan = output::plan(&args.targets, args.directory.as_deref())?;

    let issuer = Issuer::new(LetsEncryptConnector::from_config(config));
    let settings = BatchSettings {
        key_file: args
            .account
            .clone()
            .unwrap_or_else(|| config.account_file.clone()),
        key_algorithm: config.key_algorithm,
        contact_email: args.email.clone(),
    };

    let report = batch::run_batch(
        &issuer,
        plan,
        &settings,
        DnsCredentials::from_env(),
        renew_check,
    )
    .await?;

    Ok(report.exit_code())
}
