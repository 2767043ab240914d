//! Mount daemon: validates the command line, bootstraps the on-disk
//! layout, initializes the filesystem core and parks while the kernel
//! bridge drives the operation vtable.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use routefs::{map_io_error, Config, FsResult, RouteFs, Vfs};

/// Tier-routing passthrough filesystem daemon.
#[derive(Debug, Parser)]
#[command(name = "routefs", disable_help_flag = true)]
struct Cli {
    /// FUSE and mount options followed by `<root_dir> <mount_point>`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let Some((root_dir, mount_point)) = mount_operands(&cli.args) else {
        eprintln!("usage: routefs [FUSE and mount options] <root_dir> <mount_point>");
        return ExitCode::FAILURE;
    };

    match run(root_dir, mount_point).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "routefs failed");
            ExitCode::FAILURE
        }
    }
}

/// The last two arguments name the root dir and the mount point; neither
/// may start with a hyphen. Everything before them belongs to the bridge.
fn mount_operands(args: &[String]) -> Option<(&str, &str)> {
    if args.len() < 2 {
        return None;
    }
    let root_dir = args[args.len() - 2].as_str();
    let mount_point = args[args.len() - 1].as_str();
    if root_dir.starts_with('-') || mount_point.starts_with('-') {
        return None;
    }
    Some((root_dir, mount_point))
}

async fn run(root_dir: &str, mount_point: &str) -> FsResult<()> {
    let config = Config::load(root_dir)?;

    // The routing core expects the tier roots in place before the bridge
    // delivers the first operation.
    tokio::fs::create_dir_all(&config.meta_root).await.map_err(map_io_error)?;
    tokio::fs::create_dir_all(&config.data_root).await.map_err(map_io_error)?;
    tokio::fs::create_dir_all(&config.archive_root).await.map_err(map_io_error)?;

    let fs = RouteFs::new(config)?;
    fs.init().await?;
    info!(root_dir, mount_point, "core ready, waiting for the mount bridge");

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "cannot listen for shutdown signal");
    }
    fs.destroy().await;
    Ok(())
}
