use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use dirmirror_core::{
    default_settings_path, spawn_coordinator, sync_once, AppConfig, ConfigStore, KeySource, KeyringKeySource,
    StaticKey, SyncProfile, SyncStatus,
};
use dirmirror_remote_sftp::SftpConnector;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dirmirror", version, about = "dirmirror – keep a remote directory in step with a local one")]
struct Cli {
    /// Path to config file (YAML / JSON)
    #[arg(short, long, default_value = "dirmirror.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Watch the local directory and mirror it on every change (default)
    Run,
    /// Mirror once and exit
    Sync,
    /// Store connection settings for the current user
    Save {
        #[arg(long)]
        host: String,
        #[arg(long)]
        login: String,
        #[arg(long, env = "DIRMIRROR_SECRET", hide_env_values = true)]
        secret: String,
        /// Remote directory, e.g. /var/www/site/
        #[arg(long)]
        remote: String,
        /// Local directory to mirror
        #[arg(long)]
        local: PathBuf,
    },
}

fn status_line(status: &SyncStatus, profile: Option<&SyncProfile>) -> String {
    match profile {
        Some(p) => format!("{status} [{} -> {}@{}:{}]", p.local_root.display(), p.login, p.host, p.remote_root),
        None => format!("{status} [no settings]"),
    }
}

fn load_profile(store: &ConfigStore<Box<dyn KeySource>>) -> Option<SyncProfile> {
    match store.load() {
        Ok(profile) => profile,
        Err(e) => {
            warn!("saved settings unusable: {e}");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings_path = cfg
        .settings_path
        .clone()
        .or_else(default_settings_path)
        .ok_or_else(|| anyhow!("no settings path configured and no user config directory found"))?;
    let keys: Box<dyn KeySource> = match cfg.settings_key.as_deref() {
        Some(encoded) => Box::new(StaticKey::from_base64(encoded)?),
        None => Box::new(KeyringKeySource::default()),
    };
    let store = ConfigStore::new(settings_path, keys);
    let connector = SftpConnector::new(cfg.host_fingerprints.clone());

    match cli.command.unwrap_or(Cmd::Run) {
        Cmd::Save {
            host,
            login,
            secret,
            remote,
            local,
        } => {
            let profile = SyncProfile {
                host,
                login,
                secret,
                remote_root: remote,
                local_root: local,
            };
            store.save(&profile)?;
            println!("Settings have been saved.");
        }
        Cmd::Sync => {
            let profile = load_profile(&store);
            match sync_once(&connector, profile.as_ref()).await {
                Ok(report) => println!(
                    "{} ({} files, {} bytes)",
                    SyncStatus::Completed,
                    report.files_uploaded,
                    report.bytes_uploaded
                ),
                Err(e) => {
                    println!("{}", SyncStatus::from(&e));
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Cmd::Run => {
            let handle = spawn_coordinator(connector, load_profile(&store));

            let mut status_rx = handle.subscribe();
            tokio::spawn(async move {
                while status_rx.changed().await.is_ok() {
                    let status = status_rx.borrow_and_update().clone();
                    println!("{status}");
                }
            });

            println!("dirmirror running... commands: sync, status, reload, quit");
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let mut stdin_open = true;
            loop {
                tokio::select! {
                    line = lines.next_line(), if stdin_open => match line {
                        Ok(Some(line)) => match line.trim() {
                            "sync" => {
                                if !handle.request_sync() {
                                    break;
                                }
                            }
                            "status" => println!("{}", status_line(&handle.status(), handle.profile().as_deref())),
                            "reload" => match load_profile(&store) {
                                Some(profile) => {
                                    handle.update_profile(profile);
                                    println!("Settings reloaded.");
                                }
                                None => println!("No valid settings found."),
                            },
                            "quit" | "exit" => break,
                            "" => {}
                            other => println!("unknown command `{other}`"),
                        },
                        Ok(None) => stdin_open = false,
                        Err(e) => {
                            warn!("stdin: {e}");
                            stdin_open = false;
                        }
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            println!("Stopping (Ctrl-C again aborts a running sync)");
            tokio::select! {
                _ = handle.shutdown() => {}
                _ = tokio::signal::ctrl_c() => {
                    warn!("sync still running, aborting");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_names_the_mirror() {
        let profile = SyncProfile {
            host: "example.org".into(),
            login: "deploy".into(),
            secret: "hunter2".into(),
            remote_root: "/srv/".into(),
            local_root: PathBuf::from("/home/me/site"),
        };

        let line = status_line(&SyncStatus::Completed, Some(&profile));

        assert_eq!(line, "Sync completed successfully. [/home/me/site -> deploy@example.org:/srv/]");
        assert!(!line.contains("hunter2"));
        assert_eq!(status_line(&SyncStatus::Idle, None), "Idle. [no settings]");
    }
}
