//! Transport contract between the mirror and the remote data server
//!
//! The mirror never talks to a wire protocol directly. It consumes three
//! capabilities:
//!
//! - [`CollectionProxy`] - a handle on one remote group or dataset
//! - [`SessionProxy`] - the data server object resolved after connecting
//! - [`Connector`] - establishes sessions and publishes our own interface
//!
//! # Event Channel
//!
//! Push notifications are typed [`RemoteEvent`]s. A node subscribes by handing
//! its proxy a [`Subscription`]; the transport wraps every notification in an
//! [`Envelope`] and sends it into a crossbeam channel. The single event loop in
//! [`crate::app::App`] drains that channel and dispatches synchronously, so the
//! transport may deliver from any thread while all mirror mutation stays on
//! one thread.
//!
//! ```text
//! transport thread ──Envelope──► crossbeam channel ──► App loop ──► Mirror handlers
//! ```
//!
//! Every subscription carries the session epoch it was made in. When the
//! session is dropped the epoch advances and envelopes from older epochs are
//! discarded, so calls completing after a logical disconnect have no effect.

pub mod memory;

use crate::connection::InterfaceCall;
use crate::error::Result;
use crate::types::{Attrs, DataBuffer, NodeId};
use crossbeam_channel::Sender;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Named event classes a proxy can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Changed,
    GroupAdded,
    AttrsChanged,
    Removed,
    FileAdded,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Changed => "changed",
            EventKind::GroupAdded => "group-added",
            EventKind::AttrsChanged => "attrs-changed",
            EventKind::Removed => "removed",
            EventKind::FileAdded => "file-added",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A push notification from the remote side
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    /// Content or attributes of the dataset at `key` were updated
    Changed { key: String },
    /// A sub-collection appeared at `key`
    GroupAdded { key: String },
    /// The subscribed collection's own attributes changed
    AttrsChanged { attrs: Attrs },
    /// The entry at `key` was deleted
    Removed { key: String },
    /// The data server opened a file
    FileAdded { filename: String },
}

impl RemoteEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            RemoteEvent::Changed { .. } => EventKind::Changed,
            RemoteEvent::GroupAdded { .. } => EventKind::GroupAdded,
            RemoteEvent::AttrsChanged { .. } => EventKind::AttrsChanged,
            RemoteEvent::Removed { .. } => EventKind::Removed,
            RemoteEvent::FileAdded { .. } => EventKind::FileAdded,
        }
    }
}

/// Who an event is addressed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTarget {
    /// The data server session itself (file-added)
    Session,
    /// A mirrored group, by arena handle. Handles are never reused, so events
    /// for a removed node cannot reach a node later built at the same path.
    Node(NodeId),
}

/// An event as it travels through the channel
#[derive(Debug, Clone)]
pub struct Envelope {
    pub target: EventTarget,
    pub epoch: u64,
    pub event: RemoteEvent,
}

/// A registration handed to a proxy's `subscribe`
#[derive(Debug, Clone)]
pub struct Subscription {
    pub target: EventTarget,
    pub epoch: u64,
    sender: Sender<Envelope>,
}

impl Subscription {
    pub fn new(target: EventTarget, epoch: u64, sender: Sender<Envelope>) -> Self {
        Self {
            target,
            epoch,
            sender,
        }
    }

    /// Whether `other` registers the same target into the same channel.
    /// Epochs are ignored, so one key removes registrations from any session.
    pub fn same_registration(&self, other: &Subscription) -> bool {
        self.target == other.target && self.sender.same_channel(&other.sender)
    }

    /// Deliver an event. Returns false once the receiving loop is gone.
    pub fn deliver(&self, event: RemoteEvent) -> bool {
        self.sender
            .send(Envelope {
                target: self.target.clone(),
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}

/// Handle on one remote group or dataset.
///
/// Implementations must be `Send` so that transports can hand them across
/// threads; the mirror only ever calls them from its loop thread.
#[cfg_attr(test, mockall::automock)]
pub trait CollectionProxy: Send {
    /// Names of the direct children
    fn keys(&self) -> Result<Vec<String>>;

    /// Current attributes
    fn get_attrs(&self) -> Result<Attrs>;

    /// Write attributes back (merge)
    fn set_attrs(&self, attrs: &Attrs) -> Result<()>;

    /// Full materialized read of a terminal dataset
    fn read(&self) -> Result<DataBuffer>;

    /// Index into a child by name
    fn child(&self, name: &str) -> Result<Box<dyn CollectionProxy>>;

    /// Type tag of the remote entry
    fn is_dataset(&self) -> bool;

    /// Register for this collection's events
    fn subscribe(&self, subscription: Subscription) -> Result<()>;

    /// Drop every registration matching `subscription` (see
    /// [`Subscription::same_registration`])
    fn unsubscribe(&self, subscription: &Subscription) -> Result<()>;
}

/// The data server object of an established session
pub trait SessionProxy: Send {
    /// Every open file with a proxy on its root group
    fn list_files(&self) -> Result<BTreeMap<String, Box<dyn CollectionProxy>>>;

    /// Proxy on one file's root group, opening the file if needed
    fn get_file(&self, filename: &str) -> Result<Box<dyn CollectionProxy>>;

    /// No-op round trip; fails with `Timeout` if no reply arrives in time
    fn hello(&self, timeout: Duration) -> Result<()>;

    /// Register for file-added events
    fn subscribe(&self, subscription: Subscription) -> Result<()>;

    /// Drop every file-added registration matching `subscription`
    fn unsubscribe(&self, subscription: &Subscription) -> Result<()>;
}

/// Establishes sessions and serves our published interface
pub trait Connector {
    /// Connect to `url` and resolve the well-known `object`
    fn connect(&mut self, url: &str, object: &str) -> Result<Box<dyn SessionProxy>>;

    /// Serve `handle` under `name` at `url` so remote consumers can call in
    fn publish(&mut self, url: &str, name: &str, handle: Sender<InterfaceCall>) -> Result<()>;
}
