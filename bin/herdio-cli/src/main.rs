//! HerdIO command-line client
//!
//! Operator tooling for image management and diagnostics: list images,
//! inspect image metadata, create/delete images, and flush the
//! server-side object cache for an image.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use herdio_client::{ClientConfig, VdiSession, create_image, delete_image, list_images};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "herdio-cli", about = "HerdIO cluster command-line client")]
struct Args {
    /// Cluster address
    #[arg(long, default_value = "localhost")]
    address: String,

    /// Cluster port
    #[arg(long, default_value_t = 7000)]
    port: u16,

    /// Per-request deadline in seconds (0 = wait forever)
    #[arg(long, default_value_t = 30)]
    timeout_s: u64,

    /// Log level (trace / debug / info / warn / error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the vdi ids currently in use on the cluster
    List,

    /// Show the metadata of an image or snapshot
    Info {
        /// Image name
        name: String,
        /// Snapshot id (0 = current)
        #[arg(long, default_value_t = 0)]
        snapshot: u32,
        /// Snapshot tag
        #[arg(long, default_value = "")]
        tag: String,
    },

    /// Create a new image
    Create {
        /// Image name
        name: String,
        /// Image size in bytes
        #[arg(long)]
        size: u64,
        /// Replica count
        #[arg(long, default_value_t = 3)]
        copies: u32,
    },

    /// Delete an image
    Delete {
        /// Image name
        name: String,
    },

    /// Flush the server-side object cache for an image
    Flush {
        /// Image name
        name: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = ClientConfig {
        address: args.address.clone(),
        port: args.port,
        writeback: false,
        request_timeout: (args.timeout_s > 0).then(|| Duration::from_secs(args.timeout_s)),
    };

    match args.command {
        Command::List => {
            let vids = list_images(&config).await.context("list images")?;
            for vid in &vids {
                println!("{vid:#x}");
            }
            info!("{} images", vids.len());
        }

        Command::Info {
            name,
            snapshot,
            tag,
        } => {
            let session = VdiSession::open_snapshot(&config, &name, snapshot, &tag)
                .await
                .with_context(|| format!("open {name}"))?;
            let inode = session.inode();
            println!("name:         {}", inode.name);
            if !inode.tag.is_empty() {
                println!("tag:          {}", inode.tag);
            }
            println!("vdi id:       {:#x}", inode.vdi_id);
            println!("size:         {} bytes", inode.vdi_size);
            println!("objects:      {}", inode.object_count());
            println!("copies:       {}", inode.nr_copies);
            println!("snapshot:     {}", inode.is_snapshot());
            println!("snapshot id:  {}", inode.snap_id);
            if inode.parent_vdi_id != 0 {
                println!("parent:       {:#x}", inode.parent_vdi_id);
            }
            println!("created:      {}", inode.create_time);
            session.close().await;
        }

        Command::Create { name, size, copies } => {
            let vid = create_image(&config, &name, size, copies)
                .await
                .with_context(|| format!("create {name}"))?;
            println!("created {name} (vdi {vid:#x})");
        }

        Command::Delete { name } => {
            delete_image(&config, &name)
                .await
                .with_context(|| format!("delete {name}"))?;
            println!("deleted {name}");
        }

        Command::Flush { name } => {
            let mut session = VdiSession::open(&config, &name)
                .await
                .with_context(|| format!("open {name}"))?;
            let result = session.flush().await;
            session.close().await;
            result.with_context(|| format!("flush {name}"))?;
            println!("flushed {name}");
        }
    }

    Ok(())
}
