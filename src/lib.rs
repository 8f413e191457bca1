//! # PlotMirror-RS: live client-side mirror of a remote dataset store
//!
//! Keeps a local, path-addressable copy of the hierarchical data held by a
//! remote data server, and keeps plots of that data current as the server
//! mutates it.
//!
//! ## Architecture
//!
//! - **Remote**: transport contract (collection proxies, sessions, typed
//!   push events) plus an in-process data server
//! - **Mirror**: path registry, node arena, group sync, rank-dependent plot
//!   bindings and multiplots
//! - **Display**: collaborator contracts for the tree, attribute editors and
//!   visuals, with a headless recording implementation
//! - **Connection**: session supervision with a liveness probe, and the
//!   published plot interface
//! - **App**: the context object running the single-threaded event loop
//!
//! Remote notifications travel as [`remote::Envelope`]s through a crossbeam
//! channel and are applied on the loop thread, so the mirror itself needs no
//! locking.
//!
//! ## Configuration
//!
//! Settings are read from `config.toml` in the platform configuration
//! directory under `dev.plotmirror.plotmirror-rs`:
//!
//! - **Linux**: `~/.config/dev.plotmirror.plotmirror-rs/`
//! - **macOS**: `~/Library/Application Support/dev.plotmirror.plotmirror-rs/`
//! - **Windows**: `%APPDATA%\dev.plotmirror.plotmirror-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use plotmirror_rs::{
//!     app::App,
//!     config::AppConfig,
//!     display::headless::HeadlessDisplay,
//!     remote::memory::MemoryServer,
//! };
//!
//! let server = MemoryServer::new();
//! server.create_file("run1.h5")?;
//!
//! let mut app = App::new(
//!     AppConfig::load_or_default(),
//!     Box::new(server.connector()),
//!     Box::new(HeadlessDisplay::new()),
//! );
//! app.start()?;
//! let shutdown = app.run();
//! ```

pub mod app;
pub mod config;
pub mod connection;
pub mod display;
pub mod error;
pub mod mirror;
pub mod remote;
pub mod types;

// Re-export commonly used types
pub use app::App;
pub use config::AppConfig;
pub use connection::{ConnectionSupervisor, InterfaceCall, ShutdownRequest};
pub use error::{MirrorError, Result};
pub use mirror::{Mirror, MirrorNode, MirrorNotice, NodeKind, PathRegistry};
pub use types::{Attrs, ConnectionStatus, DataBuffer, NodeId, NodePath};
