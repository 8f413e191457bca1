//! In-process data server
//!
//! This module provides a data server that lives in the same process and
//! implements the full transport contract. It is what the tests, benches and
//! the demo binary mirror, and it doubles as a loopback transport for scripts
//! that want to drive plots without a network.
//!
//! # Events
//!
//! Mutations emit exactly the notifications a networked data server emits:
//!
//! | Mutation | Event | Delivered to |
//! |---|---|---|
//! | [`MemoryServer::create_file`] | `file-added` | session subscribers |
//! | [`MemoryServer::create_group`] | `group-added` | parent group |
//! | [`MemoryServer::set_dataset`] | `changed` | parent group |
//! | [`MemoryServer::set_attrs`] on a dataset | `changed` | parent group |
//! | [`MemoryServer::set_attrs`] on a group | `attrs-changed` | the group |
//! | [`MemoryServer::remove`] | `removed` | parent group |
//!
//! # Fault Injection
//!
//! - [`MemoryServer::set_online`] - refuse new sessions
//! - [`MemoryServer::set_responsive`] - let liveness probes time out
//!
//! # Example
//!
//! ```ignore
//! use plotmirror_rs::remote::memory::MemoryServer;
//! use plotmirror_rs::types::NodePath;
//!
//! let server = MemoryServer::new();
//! server.create_file("run1.h5")?;
//! server.set_dataset(&NodePath::from(["run1.h5", "trace"]), data)?;
//! let connector = server.connector();
//! ```

use crate::connection::InterfaceCall;
use crate::error::{MirrorError, Result};
use crate::remote::{CollectionProxy, Connector, RemoteEvent, SessionProxy, Subscription};
use crate::types::{Attrs, DataBuffer, NodePath};
use crossbeam_channel::Sender;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Name the server resolves itself under
pub const DEFAULT_OBJECT_NAME: &str = "dataserver";

#[derive(Debug)]
enum Entry {
    Group(GroupEntry),
    Dataset(DatasetEntry),
}

#[derive(Debug, Default)]
struct GroupEntry {
    attrs: Attrs,
    children: BTreeMap<String, Entry>,
    subscribers: Vec<Subscription>,
}

impl GroupEntry {
    fn notify(&mut self, event: RemoteEvent) {
        // Drop subscribers whose loop has gone away
        self.subscribers.retain(|sub| sub.deliver(event.clone()));
    }
}

#[derive(Debug)]
struct DatasetEntry {
    attrs: Attrs,
    data: DataBuffer,
}

#[derive(Debug, Default)]
struct ServerState {
    files: BTreeMap<String, Entry>,
    session_subscribers: Vec<Subscription>,
    published: HashMap<String, Sender<InterfaceCall>>,
}

impl ServerState {
    fn entry(&self, path: &NodePath) -> Option<&Entry> {
        let (file, rest) = path.segments().split_first()?;
        let mut cur = self.files.get(file)?;
        for seg in rest {
            cur = match cur {
                Entry::Group(g) => g.children.get(seg)?,
                Entry::Dataset(_) => return None,
            };
        }
        Some(cur)
    }

    fn entry_mut(&mut self, path: &NodePath) -> Option<&mut Entry> {
        let (file, rest) = path.segments().split_first()?;
        let mut cur = self.files.get_mut(file)?;
        for seg in rest {
            cur = match cur {
                Entry::Group(g) => g.children.get_mut(seg)?,
                Entry::Dataset(_) => return None,
            };
        }
        Some(cur)
    }

    fn group_mut(&mut self, path: &NodePath) -> Result<&mut GroupEntry> {
        match self.entry_mut(path) {
            Some(Entry::Group(g)) => Ok(g),
            Some(Entry::Dataset(_)) => Err(MirrorError::Remote(format!("{} is a dataset", path))),
            None => Err(MirrorError::Remote(format!("no such entry: {}", path))),
        }
    }

    fn parent_and_key(path: &NodePath) -> Result<(NodePath, String)> {
        let parent = path
            .parent()
            .ok_or_else(|| MirrorError::Remote(format!("{} has no parent group", path)))?;
        Ok((parent, path.name().to_string()))
    }

    fn create_file(&mut self, filename: &str) {
        self.files
            .entry(filename.to_string())
            .or_insert_with(|| Entry::Group(GroupEntry::default()));
        let event = RemoteEvent::FileAdded {
            filename: filename.to_string(),
        };
        self.session_subscribers
            .retain(|sub| sub.deliver(event.clone()));
    }

    fn create_group(&mut self, path: &NodePath) -> Result<()> {
        let (parent, key) = Self::parent_and_key(path)?;
        let group = self.group_mut(&parent)?;
        if matches!(group.children.get(&key), Some(Entry::Group(_))) {
            return Ok(());
        }
        group
            .children
            .insert(key.clone(), Entry::Group(GroupEntry::default()));
        group.notify(RemoteEvent::GroupAdded { key });
        Ok(())
    }

    fn set_dataset(&mut self, path: &NodePath, data: DataBuffer) -> Result<()> {
        let (parent, key) = Self::parent_and_key(path)?;
        let group = self.group_mut(&parent)?;
        match group.children.get_mut(&key) {
            Some(Entry::Dataset(ds)) => ds.data = data,
            Some(Entry::Group(_)) => {
                return Err(MirrorError::Remote(format!("{} is a group", path)));
            }
            None => {
                group.children.insert(
                    key.clone(),
                    Entry::Dataset(DatasetEntry {
                        attrs: Attrs::new(),
                        data,
                    }),
                );
            }
        }
        group.notify(RemoteEvent::Changed { key });
        Ok(())
    }

    fn set_attrs(&mut self, path: &NodePath, attrs: &Attrs) -> Result<()> {
        let Some(parent) = path.parent() else {
            let group = self.group_mut(path)?;
            group.attrs.extend(attrs.clone());
            group.notify(RemoteEvent::AttrsChanged {
                attrs: attrs.clone(),
            });
            return Ok(());
        };

        let key = path.name().to_string();
        let group = self.group_mut(&parent)?;
        let dataset_changed = match group.children.get_mut(&key) {
            Some(Entry::Dataset(ds)) => {
                ds.attrs.extend(attrs.clone());
                true
            }
            Some(Entry::Group(g)) => {
                g.attrs.extend(attrs.clone());
                g.notify(RemoteEvent::AttrsChanged {
                    attrs: attrs.clone(),
                });
                false
            }
            None => return Err(MirrorError::Remote(format!("no such entry: {}", path))),
        };
        if dataset_changed {
            group.notify(RemoteEvent::Changed { key });
        }
        Ok(())
    }

    fn remove(&mut self, path: &NodePath) -> Result<()> {
        let Some(parent) = path.parent() else {
            return self
                .files
                .remove(path.name())
                .map(|_| ())
                .ok_or_else(|| MirrorError::Remote(format!("no such file: {}", path)));
        };
        let key = path.name().to_string();
        let group = self.group_mut(&parent)?;
        if group.children.remove(&key).is_none() {
            return Err(MirrorError::Remote(format!("no such entry: {}", path)));
        }
        group.notify(RemoteEvent::Removed { key });
        Ok(())
    }
}

fn lock(state: &Mutex<ServerState>) -> Result<MutexGuard<'_, ServerState>> {
    state
        .lock()
        .map_err(|_| MirrorError::Remote("data server state poisoned".to_string()))
}

/// A data server living in this process
#[derive(Debug, Clone)]
pub struct MemoryServer {
    state: Arc<Mutex<ServerState>>,
    online: Arc<AtomicBool>,
    responsive: Arc<AtomicBool>,
    object_name: String,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryServer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState::default())),
            online: Arc::new(AtomicBool::new(true)),
            responsive: Arc::new(AtomicBool::new(true)),
            object_name: DEFAULT_OBJECT_NAME.to_string(),
        }
    }

    /// Resolve under a different object name
    pub fn with_object_name(mut self, name: impl Into<String>) -> Self {
        self.object_name = name.into();
        self
    }

    /// A connector that establishes sessions against this server
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            server: self.clone(),
        }
    }

    /// Accept or refuse new sessions
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Answer or ignore liveness probes
    pub fn set_responsive(&self, responsive: bool) {
        self.responsive.store(responsive, Ordering::SeqCst);
    }

    /// Open a file (an empty root group). Emits `file-added` even when the
    /// file is already open, the way a reopen does.
    pub fn create_file(&self, filename: &str) -> Result<()> {
        lock(&self.state)?.create_file(filename);
        Ok(())
    }

    pub fn create_group(&self, path: &NodePath) -> Result<()> {
        lock(&self.state)?.create_group(path)
    }

    /// Create or replace a dataset's content
    pub fn set_dataset(&self, path: &NodePath, data: DataBuffer) -> Result<()> {
        lock(&self.state)?.set_dataset(path, data)
    }

    /// Merge attributes into a group or dataset
    pub fn set_attrs(&self, path: &NodePath, attrs: &Attrs) -> Result<()> {
        lock(&self.state)?.set_attrs(path, attrs)
    }

    pub fn remove(&self, path: &NodePath) -> Result<()> {
        lock(&self.state)?.remove(path)
    }

    /// Re-send `changed` for a dataset without touching it (duplicate delivery)
    pub fn notify_changed(&self, path: &NodePath) -> Result<()> {
        let (parent, key) = ServerState::parent_and_key(path)?;
        lock(&self.state)?
            .group_mut(&parent)?
            .notify(RemoteEvent::Changed { key });
        Ok(())
    }

    /// Current content of a dataset
    pub fn dataset(&self, path: &NodePath) -> Option<DataBuffer> {
        match lock(&self.state).ok()?.entry(path)? {
            Entry::Dataset(ds) => Some(ds.data.clone()),
            Entry::Group(_) => None,
        }
    }

    /// Current attributes of any entry
    pub fn attrs(&self, path: &NodePath) -> Option<Attrs> {
        match lock(&self.state).ok()?.entry(path)? {
            Entry::Dataset(ds) => Some(ds.attrs.clone()),
            Entry::Group(g) => Some(g.attrs.clone()),
        }
    }

    /// Number of live subscriptions on a group
    pub fn subscriber_count(&self, path: &NodePath) -> usize {
        match lock(&self.state).ok().as_deref().and_then(|s| s.entry(path)) {
            Some(Entry::Group(g)) => g.subscribers.len(),
            _ => 0,
        }
    }

    /// Number of live file-added subscriptions
    pub fn session_subscriber_count(&self) -> usize {
        lock(&self.state)
            .map(|s| s.session_subscribers.len())
            .unwrap_or(0)
    }

    /// Invoke an interface published through [`MemoryConnector::publish`],
    /// as a remote consumer would
    pub fn call_interface(&self, name: &str, call: InterfaceCall) -> Result<()> {
        let sender = lock(&self.state)?
            .published
            .get(name)
            .cloned()
            .ok_or_else(|| MirrorError::Remote(format!("no interface published as {}", name)))?;
        sender
            .send(call)
            .map_err(|_| MirrorError::Channel(format!("interface {} is gone", name)))
    }

    fn proxy(&self, path: NodePath) -> Box<dyn CollectionProxy> {
        Box::new(MemoryProxy {
            state: Arc::clone(&self.state),
            path,
        })
    }
}

/// Proxy on one entry of a [`MemoryServer`]
#[derive(Debug)]
pub struct MemoryProxy {
    state: Arc<Mutex<ServerState>>,
    path: NodePath,
}

impl CollectionProxy for MemoryProxy {
    fn keys(&self) -> Result<Vec<String>> {
        match lock(&self.state)?.entry(&self.path) {
            Some(Entry::Group(g)) => Ok(g.children.keys().cloned().collect()),
            Some(Entry::Dataset(_)) => Ok(Vec::new()),
            None => Err(MirrorError::Remote(format!("no such entry: {}", self.path))),
        }
    }

    fn get_attrs(&self) -> Result<Attrs> {
        match lock(&self.state)?.entry(&self.path) {
            Some(Entry::Group(g)) => Ok(g.attrs.clone()),
            Some(Entry::Dataset(ds)) => Ok(ds.attrs.clone()),
            None => Err(MirrorError::Remote(format!("no such entry: {}", self.path))),
        }
    }

    fn set_attrs(&self, attrs: &Attrs) -> Result<()> {
        lock(&self.state)?.set_attrs(&self.path, attrs)
    }

    fn read(&self) -> Result<DataBuffer> {
        match lock(&self.state)?.entry(&self.path) {
            Some(Entry::Dataset(ds)) => Ok(ds.data.clone()),
            Some(Entry::Group(_)) => Err(MirrorError::Remote(format!(
                "{} is a group and cannot be read",
                self.path
            ))),
            None => Err(MirrorError::Remote(format!("no such entry: {}", self.path))),
        }
    }

    fn child(&self, name: &str) -> Result<Box<dyn CollectionProxy>> {
        let path = self.path.child(name);
        if lock(&self.state)?.entry(&path).is_none() {
            return Err(MirrorError::Remote(format!("no such entry: {}", path)));
        }
        Ok(Box::new(MemoryProxy {
            state: Arc::clone(&self.state),
            path,
        }))
    }

    fn is_dataset(&self) -> bool {
        matches!(
            lock(&self.state).ok().as_deref().and_then(|s| s.entry(&self.path)),
            Some(Entry::Dataset(_))
        )
    }

    fn subscribe(&self, subscription: Subscription) -> Result<()> {
        let mut state = lock(&self.state)?;
        state.group_mut(&self.path)?.subscribers.push(subscription);
        Ok(())
    }

    fn unsubscribe(&self, subscription: &Subscription) -> Result<()> {
        // A removed entry took its subscribers with it
        if let Some(Entry::Group(g)) = lock(&self.state)?.entry_mut(&self.path) {
            g.subscribers.retain(|sub| !sub.same_registration(subscription));
        }
        Ok(())
    }
}

/// Session on a [`MemoryServer`]
#[derive(Debug)]
pub struct MemorySession {
    server: MemoryServer,
}

impl SessionProxy for MemorySession {
    fn list_files(&self) -> Result<BTreeMap<String, Box<dyn CollectionProxy>>> {
        let names: Vec<String> = lock(&self.server.state)?.files.keys().cloned().collect();
        Ok(names
            .into_iter()
            .map(|name| {
                let proxy = self.server.proxy(NodePath::root(name.clone()));
                (name, proxy)
            })
            .collect())
    }

    fn get_file(&self, filename: &str) -> Result<Box<dyn CollectionProxy>> {
        {
            let mut state = lock(&self.server.state)?;
            if !state.files.contains_key(filename) {
                state.create_file(filename);
            }
        }
        Ok(self.server.proxy(NodePath::root(filename)))
    }

    fn hello(&self, timeout: Duration) -> Result<()> {
        if self.server.responsive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            std::thread::sleep(timeout);
            Err(MirrorError::Timeout(format!(
                "no reply to hello within {:?}",
                timeout
            )))
        }
    }

    fn subscribe(&self, subscription: Subscription) -> Result<()> {
        lock(&self.server.state)?
            .session_subscribers
            .push(subscription);
        Ok(())
    }

    fn unsubscribe(&self, subscription: &Subscription) -> Result<()> {
        lock(&self.server.state)?
            .session_subscribers
            .retain(|sub| !sub.same_registration(subscription));
        Ok(())
    }
}

/// [`Connector`] for a [`MemoryServer`]
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    server: MemoryServer,
}

impl Connector for MemoryConnector {
    fn connect(&mut self, url: &str, object: &str) -> Result<Box<dyn SessionProxy>> {
        if !self.server.online.load(Ordering::SeqCst) {
            return Err(MirrorError::Timeout(format!("no answer from {}", url)));
        }
        if object != self.server.object_name {
            return Err(MirrorError::Remote(format!(
                "no object named {} at {}",
                object, url
            )));
        }
        tracing::debug!("In-process session established for {}", url);
        Ok(Box::new(MemorySession {
            server: self.server.clone(),
        }))
    }

    fn publish(&mut self, url: &str, name: &str, handle: Sender<InterfaceCall>) -> Result<()> {
        tracing::debug!("Publishing {} at {}", name, url);
        lock(&self.server.state)?
            .published
            .insert(name.to_string(), handle);
        Ok(())
    }
}
