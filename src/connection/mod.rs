//! Connection supervision
//!
//! [`ConnectionSupervisor`] owns the data server session and drives the
//! connection state machine:
//!
//! ```text
//! Disconnected --connect--> Connecting --session ok--> Connected
//!      ^                        |                          |
//!      +------- connect error --+------ probe failure -----+
//! ```
//!
//! While connected a liveness probe ticks at a fixed interval; each tick
//! issues a bounded `hello`. The first failure drops the session, stops the
//! probe and advances the mirror epoch so late deliveries from the dead
//! session are ignored. There is no automatic retry: reconnecting is an
//! explicit [`ConnectionSupervisor::connect`].

pub mod interface;

pub use interface::{handle_call, InterfaceCall, ShutdownRequest};

use crate::config::{AppConfig, EndpointConfig, LivenessConfig, ObjectNames};
use crate::error::{MirrorError, Result, ResultExt};
use crate::mirror::{Mirror, MirrorNotice};
use crate::remote::{CollectionProxy, Connector, EventTarget, RemoteEvent, SessionProxy};
use crate::types::{ConnectionStatus, NodePath};
use chrono::{DateTime, Local};
use crossbeam_channel::{tick, Receiver, Sender};
use std::time::Instant;

/// Owner of the remote session
pub struct ConnectionSupervisor {
    dataserver: EndpointConfig,
    publish: EndpointConfig,
    liveness: LivenessConfig,
    names: ObjectNames,
    connector: Box<dyn Connector>,
    session: Option<Box<dyn SessionProxy>>,
    status: ConnectionStatus,
    probe: Option<Receiver<Instant>>,
    connected_since: Option<DateTime<Local>>,
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("dataserver", &self.dataserver.url())
            .field("status", &self.status)
            .field("probing", &self.probe.is_some())
            .finish()
    }
}

impl ConnectionSupervisor {
    pub fn new(config: &AppConfig, connector: Box<dyn Connector>) -> Self {
        Self {
            dataserver: config.dataserver.clone(),
            publish: config.publish.clone(),
            liveness: config.liveness.clone(),
            names: config.names.clone(),
            connector,
            session: None,
            status: ConnectionStatus::Disconnected,
            probe: None,
            connected_since: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn connected_since(&self) -> Option<DateTime<Local>> {
        self.connected_since
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Whether a manual connect makes sense right now
    pub fn can_connect(&self) -> bool {
        self.status == ConnectionStatus::Disconnected
    }

    /// Status line for display
    pub fn status_text(&self) -> String {
        match (self.status, self.connected_since) {
            (ConnectionStatus::Connected, Some(since)) => {
                format!("Connected to {} since {}", self.dataserver.url(), since.format("%H:%M:%S"))
            }
            (status, _) => status.to_string(),
        }
    }

    /// Liveness ticks, present only while connected
    pub fn probe(&self) -> Option<&Receiver<Instant>> {
        self.probe.as_ref()
    }

    fn set_status(&mut self, status: ConnectionStatus, mirror: &Mirror) {
        if self.status != status {
            tracing::info!("Connection status: {} -> {}", self.status, status);
        }
        self.status = status;
        mirror.notify(MirrorNotice::StatusChanged {
            status,
            text: self.status_text(),
        });
    }

    /// Serve the plot interface under its well-known name
    pub fn publish(&mut self, handle: Sender<InterfaceCall>) -> Result<()> {
        let url = self.publish.url();
        self.connector
            .publish(&url, &self.names.interface, handle)
            .with_context(|| format!("Failed to publish {} at {}", self.names.interface, url))?;
        tracing::info!("Published {} at {}", self.names.interface, url);
        Ok(())
    }

    /// Establish the session, mirror every open file and start probing.
    /// A no-op when already connected.
    pub fn connect(&mut self, mirror: &mut Mirror) -> Result<()> {
        if !self.can_connect() {
            tracing::debug!("connect ignored while {}", self.status);
            return Ok(());
        }
        self.set_status(ConnectionStatus::Connecting, mirror);

        let url = self.dataserver.url();
        let session = match self.establish(&url, mirror) {
            Ok(session) => session,
            Err(e) => {
                self.set_status(ConnectionStatus::Disconnected, mirror);
                return Err(e.with_context(format!("Failed to connect to {}", url)));
            }
        };

        let files = match session.list_files() {
            Ok(files) => files,
            Err(e) => {
                Self::release_session(session.as_ref(), mirror);
                mirror.advance_epoch();
                self.set_status(ConnectionStatus::Disconnected, mirror);
                return Err(e.with_context("Failed to list open files"));
            }
        };
        self.session = Some(session);

        for (name, proxy) in files {
            if let Err(e) = Self::add_file(mirror, &name, proxy) {
                mirror.report(&format!("Failed to mirror {}", name), &e);
            }
        }

        self.connected_since = Some(Local::now());
        self.probe = Some(tick(self.liveness.interval()));
        self.set_status(ConnectionStatus::Connected, mirror);
        Ok(())
    }

    fn establish(&mut self, url: &str, mirror: &Mirror) -> Result<Box<dyn SessionProxy>> {
        tracing::info!("Connecting to {} at {}", self.names.dataserver, url);
        let session = self.connector.connect(url, &self.names.dataserver)?;
        session.subscribe(mirror.subscription(EventTarget::Session))?;
        Ok(session)
    }

    /// Withdraw our file-added registration. A dead session may refuse.
    fn release_session(session: &dyn SessionProxy, mirror: &Mirror) {
        if let Err(e) = session.unsubscribe(&mirror.subscription(EventTarget::Session)) {
            tracing::debug!("Unsubscribing from the session failed: {}", e);
        }
    }

    /// Mirror a file as a root group, replacing an existing root of the same
    /// name. Local roots (bare plots, the multiplots container) are never
    /// replaced by a file.
    pub fn add_file(
        mirror: &mut Mirror,
        name: &str,
        proxy: Box<dyn CollectionProxy>,
    ) -> Result<()> {
        let root = NodePath::root(name);
        if let Ok(existing) = mirror.lookup(&root) {
            if existing.kind().sync().is_none() {
                let local = existing.kind().label();
                return Err(MirrorError::DuplicatePath(root)
                    .with_context(format!("file {} collides with a local {} node", name, local)));
            }
            tracing::info!("Reloading {}", name);
            mirror.remove(&root)?;
        }
        mirror.add_root_group(name, Some(proxy))?;
        Ok(())
    }

    /// Ask the data server to open a file; its `file-added` event mirrors it
    pub fn open_file(&self, filename: &str) -> Result<()> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| MirrorError::Configuration("not connected".to_string()))?;
        session.get_file(filename)?;
        tracing::debug!("Requested {} from the data server", filename);
        Ok(())
    }

    /// Handle a session-level event
    pub fn handle_session_event(&mut self, mirror: &mut Mirror, event: RemoteEvent) -> Result<()> {
        match event {
            RemoteEvent::FileAdded { filename } => {
                let Some(session) = self.session.as_ref() else {
                    tracing::debug!("file-added for {} without a session", filename);
                    return Ok(());
                };
                let proxy = session.get_file(&filename)?;
                Self::add_file(mirror, &filename, proxy)
            }
            other => {
                tracing::warn!("Unexpected {} on the session", other.kind());
                Ok(())
            }
        }
    }

    /// One liveness probe. Returns whether the session is still alive.
    pub fn check_connection(&mut self, mirror: &mut Mirror) -> bool {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        match session.hello(self.liveness.timeout()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Liveness probe failed: {}", e);
                self.drop_session(mirror);
                false
            }
        }
    }

    /// Drop the session on request
    pub fn disconnect(&mut self, mirror: &mut Mirror) {
        if self.session.is_some() {
            tracing::info!("Disconnecting from {}", self.dataserver.url());
        }
        self.drop_session(mirror);
    }

    fn drop_session(&mut self, mirror: &mut Mirror) {
        if let Some(session) = self.session.take() {
            Self::release_session(session.as_ref(), mirror);
        }
        self.probe = None;
        self.connected_since = None;
        mirror.advance_epoch();
        self.set_status(ConnectionStatus::Disconnected, mirror);
    }
}
