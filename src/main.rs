use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dump_manager::config::{self, Secret};
use dump_manager::managers::backup::BackupManager;
use dump_manager::managers::logging::{self, LoggingConfig};
use dump_manager::utils::{compression, cron, encryption};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "dump-manager")]
#[command(about = "Scheduled MySQL dumps shipped to local, SCP, SFTP and FTP destinations", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all enabled backups or a specific one
    Run {
        /// Specific backup to run (defaults to all enabled backups)
        #[arg(short, long)]
        backup: Option<String>,
    },

    /// List configured backups
    List,

    /// Validate configuration file
    Validate,

    /// Register a cron job for every enabled backup
    Setup {
        /// Show what would be done without making changes
        #[arg(long)]
        dry_run: bool,
    },

    /// Decrypt a downloaded `.enc` backup
    Decrypt {
        /// Encrypted file
        file: PathBuf,

        /// Read the passphrase from this file instead of prompting
        #[arg(long)]
        password_file: Option<PathBuf>,
    },

    /// Decompress a downloaded `.xz` backup
    Decompress {
        /// Compressed file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // File commands work on downloaded artifacts and need no config
    match &cli.command {
        Some(Commands::Decrypt { file, password_file }) => {
            logging::init_console_logging();
            return handle_decrypt(file, password_file.as_deref());
        }
        Some(Commands::Decompress { file }) => {
            logging::init_console_logging();
            return handle_decompress(file);
        }
        _ => {}
    }

    let config = config::load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    let jobs = config::resolve_all_jobs(&config)?;

    // Setup logging with file rotation (must keep guard alive)
    let logging_config = LoggingConfig::from_global(&config.global);
    let log_guard = logging::init_logging(&logging_config)?;

    let mut failed = false;

    let command = cli.command.unwrap_or(Commands::List);

    match command {
        Commands::Run { backup } => {
            let manager = BackupManager::new(jobs, &config::expand_tilde(&config.global.lock_directory));

            if let Some(id) = backup {
                println!("Running backup: {}", id);
                match manager.run_job(&id).await? {
                    Some(outcome) if outcome.success => {
                        println!("✓ Backup completed successfully");
                    }
                    Some(outcome) => {
                        let reason = outcome
                            .error
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| "unknown error".to_string());
                        eprintln!("✗ Backup failed: {}", reason);
                        failed = true;
                    }
                    None => println!("Backup '{}' is disabled, nothing to do", id),
                }
            } else {
                println!("Running all enabled backups...");
                let summary = manager.run_all().await;

                if summary.all_succeeded() {
                    println!("✓ All backups completed successfully ({} run)", summary.succeeded.len());
                } else {
                    for (id, reason) in &summary.failed {
                        eprintln!("  ✗ {}: {}", id, reason);
                    }
                    eprintln!(
                        "✗ {} of {} backups failed",
                        summary.failed.len(),
                        summary.failed.len() + summary.succeeded.len()
                    );
                    failed = true;
                }
            }
        }

        Commands::List => {
            let mut ids: Vec<_> = jobs.keys().collect();
            ids.sort();

            println!("Configured backups:");
            for id in ids {
                let job = &jobs[id];
                println!("  {}", id);
                if !job.description.is_empty() {
                    println!("    Description: {}", job.description);
                }
                println!("    Enabled: {}", job.enabled);
                println!("    Schedule: {}", job.schedule);
                println!("    Database: {}", job.database.database);
                println!("    Destination: {} ({})", job.host_name(), job.protocol_name());
                println!("    Compression: {}", job.compression_enabled);
                println!("    Encryption: {}", job.encryption_enabled());
                println!("    Keep: {}", job.max_backup_files);
                println!();
            }
        }

        Commands::Validate => {
            println!("Configuration is valid!");
            println!("Backups: {}", jobs.len());
            println!("Database connections: {}", config.db_connections.len());
            println!("Hosts: {}", config.hosts.len());
            println!("Notifications: {}", config.notifications.len());

            let warnings = config::collect_warnings(&jobs);
            if !warnings.is_empty() {
                println!();
                for warning in warnings {
                    println!("⚠ {}", warning);
                }
            }
        }

        Commands::Setup { dry_run } => {
            println!("=== Setting up dump-manager ===\n");

            if dry_run {
                println!("DRY RUN MODE - No changes will be made\n");
            }

            let log_dir = config::expand_tilde(&config.global.log_directory);
            let work_dir = config::expand_tilde(&config.global.work_directory);
            let lock_dir = config::expand_tilde(&config.global.lock_directory);

            println!("[1/3] Creating directories...");
            for dir in [&log_dir, &work_dir, &lock_dir] {
                if dry_run {
                    println!("  [DRY RUN] Would create: {}", dir.display());
                    continue;
                }
                match std::fs::create_dir_all(dir) {
                    Ok(_) => println!("  ✓ Created {}", dir.display()),
                    Err(e) => eprintln!("  ✗ Failed to create {}: {}", dir.display(), e),
                }
            }
            println!();

            println!("[2/3] Installing cron jobs...");
            #[cfg(unix)]
            {
                let mut ids: Vec<_> = jobs.keys().collect();
                ids.sort();

                for id in ids {
                    let job = &jobs[id];
                    if !job.enabled {
                        println!("  - Skipping {} (disabled)", id);
                        continue;
                    }

                    if !cron::validate_cron_schedule(&job.schedule) {
                        eprintln!("  ✗ Invalid cron schedule for {}: {}", id, job.schedule);
                        continue;
                    }

                    match cron::add_cron_job(id, &job.schedule, &cli.config, &log_dir, dry_run) {
                        Ok(_) => println!("  ✓ Added job for '{}' ({})", id, job.schedule),
                        Err(e) => eprintln!("  ✗ Failed to add job for {}: {:#}", id, e),
                    }
                }
            }

            #[cfg(windows)]
            {
                eprintln!("  ✗ Cron job setup is not supported on Windows");
                eprintln!("    Use Task Scheduler instead");
            }
            println!();

            println!("[3/3] Verifying setup...");
            if dry_run {
                println!("  [DRY RUN] Would verify cron jobs");
            } else {
                match cron::list_cron_jobs() {
                    Ok(entries) if entries.is_empty() => eprintln!("  ⚠ No cron jobs found"),
                    Ok(entries) => println!("  ✓ {} cron job(s) installed", entries.len()),
                    Err(e) => eprintln!("  ✗ Failed to list cron jobs: {:#}", e),
                }

                if log_dir.exists() {
                    println!("  ✓ Log directory accessible");
                } else {
                    eprintln!("  ✗ Log directory not found");
                }
            }
            println!();

            if dry_run {
                println!("=== Dry Run Complete ===");
                println!("No changes were made. Run without --dry-run to apply changes.");
            } else {
                println!("=== Setup Complete ===");
                println!();
                println!("Next steps:");
                println!("  1. View scheduled jobs: crontab -l");
                println!("  2. Test a backup manually:");
                println!("     dump-manager run --backup <BACKUP_ID>");
                println!("  3. Check logs in: {}", log_dir.display());
            }
        }

        Commands::Decrypt { .. } | Commands::Decompress { .. } => {
            unreachable!("File commands are handled before config loading")
        }
    }

    if failed {
        // Flush file logs before exiting
        drop(log_guard);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle decrypt command (doesn't require config)
fn handle_decrypt(file: &Path, password_file: Option<&Path>) -> Result<()> {
    let passphrase = match password_file {
        Some(path) => encryption::read_passphrase_file(path)?,
        None => {
            let entered = dialoguer::Password::new()
                .with_prompt("Encryption password")
                .interact()
                .context("Failed to read password")?;
            Secret::new(entered)
        }
    };

    if passphrase.is_empty() {
        anyhow::bail!("Encryption password must not be empty");
    }

    let target = encryption::decrypt_file(file, &passphrase)
        .context("Decryption failed (wrong password or corrupted file)")?;
    println!("✓ Decrypted to {}", target.display());
    Ok(())
}

/// Handle decompress command (doesn't require config)
fn handle_decompress(file: &Path) -> Result<()> {
    let target = compression::decompress_file(file)
        .with_context(|| format!("Failed to decompress {}", file.display()))?;
    println!("✓ Decompressed to {}", target.display());
    Ok(())
}
