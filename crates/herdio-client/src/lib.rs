//! HerdIO block-device translation client
//!
//! Presents a fixed-size virtual block device backed by a HerdIO object
//! storage cluster. Byte-range reads and writes are translated into
//! operations on fixed-size data objects, with copy-on-write sharing
//! across snapshots tracked through the image's inode object.
//!
//! A [`VdiSession`] owns one long-lived cluster connection and the current
//! in-memory inode. All operations on a session are strictly serialized:
//! one request/response exchange is in flight per connection at any time.
//!
//! ```no_run
//! use herdio_client::{ClientConfig, VdiSession};
//!
//! # async fn demo() -> herdio_client::Result<()> {
//! let config = ClientConfig::default();
//! let mut session = VdiSession::open(&config, "vol0").await?;
//! let mut buf = vec![0u8; 4096];
//! session.read(&mut buf, 0).await?;
//! session.write(&buf, 8192).await?;
//! session.flush().await?;
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
mod io;
pub mod session;
pub mod transport;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use session::{VdiSession, create_image, delete_image, list_images};
pub use transport::Connection;
