//! Restomod CLI
//!
//! Thin client that talks to the daemon via Unix socket. Fallback images and
//! vehicle categories are resolved locally and work without a daemon.
//!
//! Commands:
//! - restomod vehicle "1967 Ford Mustang" [--style vintage]
//! - restomod part Brakes [--model "1969 Chevrolet Camaro"]
//! - restomod regenerate | status | reset
//! - restomod cache clear | cache invalidate --model ... [--part ...]
//! - restomod fallback vehicle|part <name>
//! - restomod categorize --make Ford --model Mustang --year 1967
//! - restomod daemon start|stop|status

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use restomod_core::{
    restomod_home, ConfiguratorSnapshot, FallbackImageResolver, FallbackImageTable, ImageStyle,
    IpcClient, IpcError, IpcMessage, ResearchStatus, Subject, VehicleCategory,
};

/// Research plus image resolution can take a while
const SELECT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "restomod")]
#[command(about = "Research classic vehicles and parts for restomod builds")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a vehicle
    Vehicle {
        /// Vehicle model, e.g. "1967 Ford Mustang"
        model: String,

        #[command(flatten)]
        opts: SelectOpts,
    },

    /// Research a part, optionally for a specific vehicle
    Part {
        /// Part name, e.g. "Brakes"
        part: String,

        /// Vehicle the part is for
        #[arg(long)]
        model: Option<String>,

        #[command(flatten)]
        opts: SelectOpts,
    },

    /// Fetch the session's current subject again, bypassing the cache
    Regenerate {
        #[arg(long, default_value = "cli")]
        session: String,

        /// Print the raw snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a session's current state
    Status {
        #[arg(long, default_value = "cli")]
        session: String,

        /// Print the raw snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Return a session to idle
    Reset {
        #[arg(long, default_value = "cli")]
        session: String,
    },

    /// Research cache management
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Pick a curated image without contacting the daemon
    Fallback {
        #[command(subcommand)]
        command: FallbackCommands,
    },

    /// Guess the browsing category of a vehicle
    Categorize {
        #[arg(long)]
        make: String,

        #[arg(long)]
        model: String,

        #[arg(long)]
        year: i32,
    },

    /// Daemon management
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },
}

#[derive(clap::Args)]
struct SelectOpts {
    /// Image style: realistic, vintage, blueprint or modern
    #[arg(long)]
    style: Option<ImageStyle>,

    /// Configurator session name
    #[arg(long, default_value = "cli")]
    session: String,

    /// Drop any cached research before selecting
    #[arg(long)]
    refresh: bool,

    /// Print the raw snapshot as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Drop every cached entry
    Clear,

    /// Drop the entry for one vehicle or part
    Invalidate {
        /// Part name (omit to invalidate vehicle research)
        #[arg(long)]
        part: Option<String>,

        /// Vehicle model
        #[arg(long)]
        model: Option<String>,
    },
}

#[derive(Subcommand)]
enum FallbackCommands {
    /// Image for a vehicle model
    Vehicle { name: String },

    /// Image for a part
    Part { name: String },
}

#[derive(Subcommand)]
enum DaemonCommands {
    /// Start the daemon
    Start,

    /// Stop the daemon
    Stop,

    /// Check daemon status
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Vehicle { model, opts } => select(Subject::Vehicle { model }, opts)?,

        Commands::Part { part, model, opts } => select(Subject::Part { part, model }, opts)?,

        Commands::Regenerate { session, json } => {
            let snapshot = IpcClient::new()
                .with_timeout(SELECT_TIMEOUT)
                .regenerate(&session)
                .map_err(daemon_error)?;
            print_snapshot(&snapshot, json)?;
        }

        Commands::Status { session, json } => {
            let snapshot = IpcClient::new().status(&session).map_err(daemon_error)?;
            print_snapshot(&snapshot, json)?;
        }

        Commands::Reset { session } => {
            IpcClient::new()
                .acknowledge(&IpcMessage::Reset { session })
                .map_err(daemon_error)?;
            println!("Session reset");
        }

        Commands::Cache { command } => match command {
            CacheCommands::Clear => {
                IpcClient::new()
                    .acknowledge(&IpcMessage::ClearCache)
                    .map_err(daemon_error)?;
                println!("Research cache cleared");
            }
            CacheCommands::Invalidate { part, model } => {
                let subject = match (part, model) {
                    (Some(part), model) => Subject::Part { part, model },
                    (None, Some(model)) => Subject::Vehicle { model },
                    (None, None) => bail!("Pass --model, --part, or both"),
                };
                let label = subject.to_string();
                IpcClient::new()
                    .acknowledge(&IpcMessage::Invalidate { subject })
                    .map_err(daemon_error)?;
                println!("Invalidated: {}", label);
            }
        },

        Commands::Fallback { command } => {
            let table = FallbackImageTable::load_or_builtin(&restomod_home())
                .context("Failed to load fallback image table")?;
            let resolver = FallbackImageResolver::new(std::sync::Arc::new(table));
            let url = match command {
                FallbackCommands::Vehicle { name } => resolver.resolve_vehicle(&name),
                FallbackCommands::Part { name } => resolver.resolve_part(&name),
            };
            println!("{}", url);
        }

        Commands::Categorize { make, model, year } => {
            println!("{}", VehicleCategory::infer(&make, &model, year).as_str());
        }

        Commands::Daemon { command } => match command {
            DaemonCommands::Start => start_daemon()?,

            DaemonCommands::Stop => match IpcClient::new().acknowledge(&IpcMessage::Shutdown) {
                Ok(()) => println!("Daemon stopped"),
                Err(IpcError::DaemonNotRunning) => println!("Daemon is not running"),
                Err(e) => eprintln!("Error: {}", e),
            },

            DaemonCommands::Status => match IpcClient::new().ping() {
                Ok((uptime_secs, cached_entries)) => {
                    println!("Daemon: Running");
                    println!("Uptime: {}s", uptime_secs);
                    println!("Cached research: {}", cached_entries);
                }
                Err(IpcError::DaemonNotRunning) => println!("Daemon: Not running"),
                Err(e) => eprintln!("Daemon error: {}", e),
            },
        },
    }

    Ok(())
}

fn select(subject: Subject, opts: SelectOpts) -> Result<()> {
    let client = IpcClient::new().with_timeout(SELECT_TIMEOUT);

    if opts.refresh {
        client
            .acknowledge(&IpcMessage::Invalidate {
                subject: subject.clone(),
            })
            .map_err(daemon_error)?;
    }

    let snapshot = client
        .select(&opts.session, subject, opts.style)
        .map_err(daemon_error)?;
    print_snapshot(&snapshot, opts.json)?;

    if snapshot.status == ResearchStatus::Error {
        std::process::exit(1);
    }
    Ok(())
}

fn daemon_error(e: IpcError) -> anyhow::Error {
    match e {
        IpcError::DaemonNotRunning => {
            anyhow::anyhow!("Daemon is not running. Try: restomod daemon start")
        }
        other => anyhow::Error::new(other).context("Failed to communicate with daemon"),
    }
}

fn print_snapshot(snapshot: &ConfiguratorSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }

    let subject = snapshot
        .subject
        .as_ref()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("{} [{}]", subject, snapshot.status.as_str());

    if let Some(error) = &snapshot.error {
        println!("Error: {}", error);
    }

    if let Some(data) = &snapshot.data {
        println!("\n{}", data.overview);

        if let Some(range) = &data.value_range {
            println!("\nValue range: {}", range);
        }
        if let Some(trends) = &data.market_trends {
            println!("\nMarket trends:\n  {}", trends);
        }
        if let Some(specs) = &data.specifications {
            println!("\nSpecifications:");
            for (name, value) in specs {
                println!("  {}: {}", name, value);
            }
        }
        if let Some(compatibility) = &data.compatibility {
            println!("\nCompatibility:\n  {}", compatibility);
        }
        if let Some(history) = &data.history {
            println!("\nHistory:\n  {}", history);
        }
        if let Some(potential) = &data.investment_potential {
            println!("\nInvestment potential:\n  {}", potential);
        }

        let lists = [
            ("Common upgrades", &data.common_upgrades),
            ("Restomod options", &data.restomod_options),
            ("Recommended parts", &data.recommended_parts),
            ("Factors affecting value", &data.factors_affecting_value),
            ("Key moments", &data.key_moments),
            ("Notable examples", &data.notable_examples),
        ];
        for (title, items) in lists {
            if let Some(items) = items {
                println!("\n{}:", title);
                for item in items {
                    println!("  - {}", item);
                }
            }
        }
    }

    if let Some(url) = &snapshot.image_url {
        println!("\nImage: {}", url);
    }
    Ok(())
}

fn start_daemon() -> Result<()> {
    let client = IpcClient::new();
    if client.daemon_available() {
        if client.ping().is_ok() {
            println!("Daemon is already running");
            return Ok(());
        }
        // Stale socket file - remove it
        let _ = std::fs::remove_file(restomod_core::socket_path());
    }

    // Daemon binary lives next to the CLI
    let daemon_path: PathBuf = std::env::current_exe()?
        .parent()
        .map(|p| p.join("restomodd"))
        .context("Could not determine executable directory")?;

    if !daemon_path.exists() {
        eprintln!("Daemon binary not found at {:?}", daemon_path);
        eprintln!("Hint: Build with 'cargo build --release' first");
        std::process::exit(1);
    }

    let home = restomod_home();
    let logs_dir = home.join("logs");
    std::fs::create_dir_all(&logs_dir).ok();

    use std::process::{Command, Stdio};
    let log_file = std::fs::File::create(logs_dir.join("daemon.log"))
        .context("Failed to create log file")?;
    let err_file = std::fs::File::create(logs_dir.join("daemon.err"))
        .context("Failed to create error log file")?;

    let child = Command::new(&daemon_path)
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(err_file))
        .spawn()
        .context("Failed to start daemon")?;

    std::fs::write(home.join("daemon.pid"), child.id().to_string())
        .context("Failed to write PID file")?;

    println!("Daemon started with PID {}", child.id());
    println!("Logs: {}", logs_dir.display());

    // Wait a moment and verify it's running
    std::thread::sleep(Duration::from_millis(500));
    if client.ping().is_ok() {
        println!("Daemon is running and responding");
    } else {
        eprintln!("Warning: Daemon started but not responding yet");
        eprintln!("Check logs: {}", logs_dir.join("daemon.err").display());
    }
    Ok(())
}
