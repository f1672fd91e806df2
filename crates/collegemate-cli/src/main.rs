//! College Mate - student portal shell

mod config;
mod portal;
mod shell;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use collegemate_core::{
    auth::{CredentialStore, DeferredDelivery, LogDelivery, OtpDelivery, OtpMessage},
    Clock, FileStore, KeyValueStore, SystemClock,
};

use crate::config::CliConfig;
use crate::portal::Portal;
use crate::shell::{render_poll, Shell};

/// College Mate - campus portal for students
#[derive(Parser)]
#[command(name = "collegemate")]
#[command(about = "Student portal: accounts, daily bunk poll and study material")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the portal's storage file (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive portal session (default)
    Shell,

    /// List registered accounts
    Accounts,

    /// Show the signed-in user
    Whoami,

    /// End the current session
    Logout,

    /// Daily bunk poll
    Poll {
        #[command(subcommand)]
        action: Option<PollCommand>,
    },

    /// List uploaded study material
    Uploads {
        /// Only show one semester, e.g. "Semester 4"
        #[arg(long)]
        semester: Option<String>,
    },

    /// Write the current configuration to the config file
    InitConfig,
}

#[derive(Subcommand)]
enum PollCommand {
    /// Show today's results
    Results,

    /// Vote for yes, no or maybe
    Vote { option: String },
}

/// Mock mail service: prints the verification mail to the terminal
struct MailboxDelivery {
    ttl_secs: u64,
}

impl OtpDelivery for MailboxDelivery {
    fn dispatch(&self, message: OtpMessage) {
        debug!(recipient = %message.recipient, "delivering verification mail");
        println!("\n--- mail to {} ---", message.recipient);
        println!("{}", message.body(self.ttl_secs));
        println!("---");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::resolve(cli.config.as_deref())?.with_data_dir(cli.data_dir);

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Some(Commands::InitConfig) = cli.command {
        let path = cli.config.unwrap_or_else(CliConfig::default_path);
        config.save(&path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    let store: Arc<dyn KeyValueStore> = Arc::new(
        FileStore::open_dir(&config.data_dir)
            .with_context(|| format!("opening storage in {}", config.data_dir.display()))?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    debug!(data_dir = %config.data_dir.display(), "storage opened");

    match cli.command.unwrap_or(Commands::Shell) {
        Commands::Shell => {
            let mailbox = Arc::new(MailboxDelivery {
                ttl_secs: config.otp.code_ttl_secs,
            });
            let delivery = DeferredDelivery::on_current_runtime(config.otp.delivery_delay(), mailbox)?;
            let portal = Portal::new(store, clock, config.otp.clone(), Arc::new(delivery));

            info!("portal shell started");
            let mut shell = Shell::new(portal, tokio::io::stdin(), std::io::stdout());
            shell.run().await?;
        }

        Commands::Accounts => {
            let portal = Portal::new(store, clock, config.otp.clone(), Arc::new(LogDelivery));
            let accounts = portal.auth.credentials().list_accounts()?;

            println!("\n=== Registered Accounts ===\n");
            if accounts.is_empty() {
                println!("No accounts registered.");
            }
            for account in accounts {
                println!(
                    "{:<24} {:<32} {} {}",
                    account.name, account.email, account.branch, account.year
                );
            }
        }

        Commands::Whoami => {
            let portal = Portal::new(store, clock, config.otp.clone(), Arc::new(LogDelivery));
            match portal.auth.current_user()? {
                Some(session) => {
                    println!("{} <{}>", session.name(), session.email());
                    if let Some(started) = session.started_at {
                        println!("Signed in since {}", started.format("%Y-%m-%d %H:%M:%S UTC"));
                    }
                }
                None => println!("Not signed in"),
            }
        }

        Commands::Logout => {
            let mut portal = Portal::new(store, clock, config.otp.clone(), Arc::new(LogDelivery));
            portal.auth.log_out()?;
            portal.settle();
            println!("Signed out.");
        }

        Commands::Poll { action } => {
            let portal = Portal::new(store, clock, config.otp.clone(), Arc::new(LogDelivery));
            match action.unwrap_or(PollCommand::Results) {
                PollCommand::Results => {
                    let results = portal.poll.results()?;
                    println!("{}", render_poll(&results, portal.poll.has_voted_today()?));
                }
                PollCommand::Vote { option } => {
                    let results = portal.poll.cast_vote(&option)?;
                    println!("Vote recorded! Thanks for participating.");
                    println!("{}", render_poll(&results, true));
                }
            }
        }

        Commands::Uploads { semester } => {
            let portal = Portal::new(store, clock, config.otp.clone(), Arc::new(LogDelivery));
            let uploads = match semester.as_deref() {
                Some(semester) => portal.uploads.for_semester(semester)?,
                None => portal.uploads.list()?,
            };

            if uploads.is_empty() {
                println!("No uploads yet.");
            }
            for upload in uploads {
                println!(
                    "[{}] {} - {} ({})",
                    upload.semester, upload.subject, upload.name, upload.file
                );
            }
        }

        Commands::InitConfig => {}
    }

    Ok(())
}
