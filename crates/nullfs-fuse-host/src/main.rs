// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! nullfs FUSE host
//!
//! Mounts a host directory through FUSE. Every forwarded operation is
//! recorded in the diagnostic log before it reaches the host.

#[cfg(all(feature = "fuse", target_os = "linux"))]
mod adapter;
#[cfg(all(feature = "fuse", target_os = "linux"))]
mod inodes;

#[cfg(all(feature = "fuse", target_os = "linux"))]
use adapter::NullFsFuse;
use anyhow::{bail, Context, Result};
use clap::Parser;
use nullfs_core::diagnostic;
use nullfs_core::{CapabilitySet, DiagnosticLog, NullFsConfig, OperationTable, Passthrough};
use nullfs_logging::CliLoggingArgs;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
#[cfg(not(all(feature = "fuse", target_os = "linux")))]
use tracing::warn;

#[derive(Parser)]
#[command(version, about = "Passthrough FUSE filesystem with a per-operation diagnostic log")]
struct Args {
    /// Mount point for the filesystem
    mount_point: PathBuf,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host directory to expose (default: /)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Diagnostic operation log (default: /tmp/nullfs.log)
    #[arg(long, env = "NULLFS_DIAGNOSTIC_LOG")]
    diagnostic_log: Option<PathBuf>,

    /// Keep existing diagnostic records instead of truncating the log
    #[arg(long)]
    append_diagnostic_log: bool,

    /// Allow other users to access the filesystem
    #[arg(long)]
    allow_other: bool,

    /// Allow root to access the filesystem
    #[arg(long)]
    allow_root: bool,

    /// Auto unmount on process exit
    #[arg(long)]
    auto_unmount: bool,

    #[command(flatten)]
    logging: CliLoggingArgs,
}

fn load_config(config_path: Option<&Path>) -> Result<NullFsConfig> {
    match config_path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            let config: NullFsConfig = serde_json::from_str(&content)
                .with_context(|| format!("parsing config {}", path.display()))?;
            Ok(config)
        }
        None => Ok(NullFsConfig::default()),
    }
}

/// Command-line flags (and `NULLFS_DIAGNOSTIC_LOG`) win over the file.
fn apply_overrides(config: &mut NullFsConfig, args: &Args) {
    if let Some(root) = &args.root {
        config.root = root.clone();
    }
    if let Some(path) = &args.diagnostic_log {
        config.diagnostic_log.path = path.clone();
    }
    if args.append_diagnostic_log {
        config.diagnostic_log.truncate = false;
    }
}

fn verify_root(root: &Path) -> Result<()> {
    let meta = fs::metadata(root).with_context(|| format!("root {}", root.display()))?;
    if !meta.is_dir() {
        bail!("root {} is not a directory", root.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.logging.clone().init("nullfs-fuse-host")?;

    info!("Starting nullfs FUSE host");
    info!("Mount point: {}", args.mount_point.display());

    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    info!("Configuration loaded: {:?}", config);

    verify_root(&config.root)?;

    // Modes requested through the mount reach the host unmasked.
    unsafe {
        libc::umask(0);
    }

    let log = DiagnosticLog::open(&config.diagnostic_log)?;
    diagnostic::install(log.clone())?;
    info!(path = %config.diagnostic_log.path.display(), "diagnostic log installed");

    let capabilities = CapabilitySet::probe(&config.root).restrict(&config.capabilities);
    let table = OperationTable::assemble(capabilities);
    info!(capabilities = ?table.capabilities(), "Capabilities enabled");
    let passthrough = Passthrough::new(config.root.clone(), log);

    #[cfg(all(feature = "fuse", target_os = "linux"))]
    {
        let filesystem = NullFsFuse::new(passthrough, table, &config);

        let mut mount_options = vec![
            fuser::MountOption::FSName("nullfs".to_string()),
            fuser::MountOption::Subtype("nullfs".to_string()),
        ];
        if args.allow_other {
            mount_options.push(fuser::MountOption::AllowOther);
        }
        if args.allow_root {
            mount_options.push(fuser::MountOption::AllowRoot);
        }
        if args.auto_unmount {
            mount_options.push(fuser::MountOption::AutoUnmount);
        }

        info!(
            "Cache policy: attr={}ms entry={}ms",
            config.attr_ttl_ms, config.entry_ttl_ms
        );
        info!("Mounting filesystem; blocking until unmount");
        fuser::mount2(filesystem, &args.mount_point, &mount_options)
            .with_context(|| format!("mounting {}", args.mount_point.display()))?;
        info!("Unmounted {}", args.mount_point.display());
    }

    #[cfg(not(all(feature = "fuse", target_os = "linux")))]
    {
        warn!("FUSE support not compiled in. This binary is for testing only.");
        info!(
            root = %passthrough.root().display(),
            operations = table.len(),
            "nullfs core initialized"
        );
        info!("To enable FUSE support, compile with: cargo build --features fuse");
    }

    Ok(())
}
