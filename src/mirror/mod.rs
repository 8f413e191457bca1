//! The mirror: a local, path-addressable copy of the remote dataset tree
//!
//! [`Mirror`] is the context object that owns everything the synchronization
//! engine needs:
//!
//! - the node arena (`NodeId -> MirrorNode`) and the [`PathRegistry`]
//! - the display surfaces the nodes draw into
//! - the sending side of the remote event channel, stamped with the current
//!   session epoch
//! - the data-changed subscriptions that feed multiplots
//! - an outgoing [`MirrorNotice`] channel for observers
//!
//! All mutation happens through `&mut Mirror` on the loop thread. Remote
//! events are applied with [`Mirror::dispatch`].
//!
//! # Tree Structure
//!
//! ```text
//! run1.h5                 (group, root)
//! ├── trace               (dataset)
//! └── scan                (group)
//!     └── image           (dataset)
//! multiplots              (plain, created on demand)
//! └── trace::image        (multiplot)
//! ```

mod group;
pub mod multiplot;
pub mod node;
pub mod plot;
pub mod registry;

pub use multiplot::{multiplot_name, MultiPlotBinding, MULTIPLOTS_ROOT, MULTIPLOT_SEPARATOR};
pub use node::{DatasetNode, GroupSync, MirrorNode, NodeKind};
pub use plot::{derive_rank, PlotBinding, PlotRefresh};
pub use registry::PathRegistry;

use crate::display::DisplaySurfaces;
use crate::error::{MirrorError, Result};
use crate::remote::{Envelope, EventTarget, RemoteEvent, Subscription};
use crate::types::{Attrs, ConnectionStatus, DataBuffer, NodeId, NodePath};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use std::collections::{BTreeMap, HashMap};

/// Capacity of the notice channel; notices beyond it are dropped
pub const NOTICE_CAPACITY: usize = 1024;

/// Observable changes of the mirror
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorNotice {
    NodeAdded(NodePath),
    NodeRemoved(NodePath),
    DataChanged(NodePath),
    StatusChanged {
        status: ConnectionStatus,
        text: String,
    },
    /// An operation failed and the operator should see why
    OperatorReport { title: String, detail: String },
}

/// Snapshot of one plot-bearing node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotSummary {
    pub id: NodeId,
    pub rank: Option<usize>,
    pub shape: Option<Vec<usize>>,
    pub visible: bool,
}

/// Which tree actions a selection enables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeActions {
    pub multiplot: bool,
    pub parametric: bool,
}

/// The mirror context
pub struct Mirror {
    nodes: HashMap<NodeId, MirrorNode>,
    registry: PathRegistry,
    surfaces: Box<dyn DisplaySurfaces>,
    /// Source node -> multiplots fed by it
    data_subscribers: HashMap<NodeId, Vec<NodeId>>,
    next_id: u64,
    current_editor: Option<NodeId>,
    epoch: u64,
    event_tx: Sender<Envelope>,
    event_rx: Receiver<Envelope>,
    notice_tx: Sender<MirrorNotice>,
    notice_rx: Receiver<MirrorNotice>,
}

impl std::fmt::Debug for Mirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("nodes", &self.nodes.len())
            .field("epoch", &self.epoch)
            .field("paths", &self.registry.paths())
            .finish()
    }
}

impl Mirror {
    pub fn new(surfaces: Box<dyn DisplaySurfaces>) -> Self {
        let (event_tx, event_rx) = unbounded();
        let (notice_tx, notice_rx) = bounded(NOTICE_CAPACITY);
        Self {
            nodes: HashMap::new(),
            registry: PathRegistry::new(),
            surfaces,
            data_subscribers: HashMap::new(),
            next_id: 0,
            current_editor: None,
            epoch: 0,
            event_tx,
            event_rx,
            notice_tx,
            notice_rx,
        }
    }

    // ========================================================================
    // Access
    // ========================================================================

    pub fn registry(&self) -> &PathRegistry {
        &self.registry
    }

    /// Node at `path`
    pub fn lookup(&self, path: &NodePath) -> Result<&MirrorNode> {
        let id = self.registry.lookup(path)?;
        self.node(id).ok_or_else(|| MirrorError::NotFound(path.clone()))
    }

    pub fn lookup_id(&self, path: &NodePath) -> Result<NodeId> {
        self.registry.lookup(path)
    }

    pub fn node(&self, id: NodeId) -> Option<&MirrorNode> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Parentless nodes, sorted by path
    pub fn roots(&self) -> Vec<&MirrorNode> {
        let mut roots: Vec<&MirrorNode> =
            self.nodes.values().filter(|n| n.parent.is_none()).collect();
        roots.sort_by(|a, b| a.path.cmp(&b.path));
        roots
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Start a new session epoch. Envelopes stamped with an older epoch are
    /// ignored from now on.
    pub fn advance_epoch(&mut self) -> u64 {
        self.epoch += 1;
        tracing::debug!("Mirror epoch advanced to {}", self.epoch);
        self.epoch
    }

    /// Registration for the current epoch, delivering into the event channel
    pub fn subscription(&self, target: EventTarget) -> Subscription {
        Subscription::new(target, self.epoch, self.event_tx.clone())
    }

    /// Receiving side of the remote event channel
    pub fn events(&self) -> &Receiver<Envelope> {
        &self.event_rx
    }

    /// Receiving side of the notice channel
    pub fn notices(&self) -> &Receiver<MirrorNotice> {
        &self.notice_rx
    }

    pub(crate) fn notify(&self, notice: MirrorNotice) {
        if let Err(TrySendError::Full(notice)) = self.notice_tx.try_send(notice) {
            tracing::trace!("Notice channel full, dropping {:?}", notice);
        }
    }

    /// Turn a failed operation into an operator report
    pub fn report(&self, title: &str, err: &MirrorError) {
        tracing::error!("{}: {}", title, err);
        self.notify(MirrorNotice::OperatorReport {
            title: title.to_string(),
            detail: err.to_string(),
        });
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut MirrorNode> {
        self.nodes.get_mut(&id).ok_or_else(|| missing(id))
    }

    // ========================================================================
    // Node lifecycle
    // ========================================================================

    /// Register a node, link it under `parent` and create its display entries.
    /// Nothing is created if the path is taken.
    pub(crate) fn insert_node(
        &mut self,
        name: &str,
        parent: Option<NodeId>,
        attrs: Attrs,
        kind: NodeKind,
    ) -> Result<NodeId> {
        let path = match parent {
            Some(pid) => self
                .nodes
                .get(&pid)
                .map(|p| p.path.child(name))
                .ok_or_else(|| missing(pid))?,
            None => NodePath::root(name),
        };

        let id = NodeId(self.next_id);
        self.registry.register(path.clone(), id)?;
        self.next_id += 1;

        let tree = self.surfaces.tree();
        tree.insert_item(&path);
        if let Some(parent_path) = path.parent() {
            tree.set_expanded(&parent_path, true);
        }
        let editor = self.surfaces.attr_editor(&path, &attrs);
        if let Some(pid) = parent {
            if let Some(p) = self.nodes.get_mut(&pid) {
                p.children.insert(name.to_string(), id);
            }
        }

        tracing::debug!("Mirrored {} {} as {:?}", kind.label(), path, id);
        self.nodes.insert(
            id,
            MirrorNode {
                id,
                path: path.clone(),
                parent,
                children: BTreeMap::new(),
                attrs,
                editor,
                kind,
            },
        );
        self.notify(MirrorNotice::NodeAdded(path));
        Ok(id)
    }

    /// Remove the node at `path` and its whole subtree
    pub fn remove(&mut self, path: &NodePath) -> Result<()> {
        let id = self.registry.lookup(path)?;
        self.remove_id(id)
    }

    /// Remove a node and its subtree, releasing display resources, registry
    /// entries, parent links, remote subscriptions and multiplot
    /// subscriptions.
    pub fn remove_id(&mut self, id: NodeId) -> Result<()> {
        let children: Vec<NodeId> = match self.nodes.get(&id) {
            Some(node) => node.children.values().copied().collect(),
            None => return Err(missing(id)),
        };
        for child in children {
            self.remove_id(child)?;
        }

        let Some(mut node) = self.nodes.remove(&id) else {
            return Err(missing(id));
        };
        self.registry.unregister(&node.path);
        if let Some(pid) = node.parent {
            if let Some(parent) = self.nodes.get_mut(&pid) {
                parent.children.remove(node.path.name());
            }
        }
        if self.current_editor == Some(id) {
            self.current_editor = None;
        }

        // This node as a source: its multiplots stop showing it
        if let Some(multiplots) = self.data_subscribers.remove(&id) {
            for mp_id in multiplots {
                if let Some(mp) = self
                    .nodes
                    .get_mut(&mp_id)
                    .and_then(|n| n.kind.multiplot_mut())
                {
                    mp.forget(&node.path);
                }
            }
        }
        // This node as a multiplot: unsubscribe from every source
        if node.kind.multiplot().is_some() {
            for subscribers in self.data_subscribers.values_mut() {
                subscribers.retain(|mp| *mp != id);
            }
            self.data_subscribers.retain(|_, subs| !subs.is_empty());
        }

        // Groups are the only subscribers
        if let NodeKind::Group(sync) = &node.kind {
            let registration = self.subscription(EventTarget::Node(id));
            if let Err(e) = sync.proxy().unsubscribe(&registration) {
                tracing::debug!("Unsubscribing {} failed: {}", node.path, e);
            }
        }

        node.release(self.surfaces.tree());
        tracing::debug!("Removed {} {}", node.kind.label(), node.path);
        self.notify(MirrorNotice::NodeRemoved(node.path));
        Ok(())
    }

    // ========================================================================
    // Data
    // ========================================================================

    /// Replace the buffer of the plot-bearing node at `path`
    pub fn set_data(&mut self, path: &NodePath, data: DataBuffer) -> Result<()> {
        let id = self.registry.lookup(path)?;
        self.set_data_id(id, data)
    }

    /// Store data, refresh the plot, push tree hints and feed multiplots
    pub fn set_data_id(&mut self, id: NodeId, data: DataBuffer) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or_else(|| missing(id))?;
        let MirrorNode {
            path, attrs, kind, ..
        } = node;
        let plot = kind
            .plot_mut()
            .ok_or_else(|| MirrorError::NotPlottable(path.clone()))?;

        let refresh = plot.set_data(data, attrs, path, self.surfaces.as_mut());
        let has_visual = plot.has_visual();
        let path = path.clone();

        let tree = self.surfaces.tree();
        tree.set_shape(&path, &refresh.shape);
        if has_visual {
            tree.set_visible(&path, refresh.visible);
        }
        tracing::trace!("{} now has shape {:?}", path, refresh.shape);

        self.emit_data_changed(id);
        self.notify(MirrorNotice::DataChanged(path));
        Ok(())
    }

    /// Repeat the push into every multiplot fed by `source`
    fn emit_data_changed(&mut self, source: NodeId) {
        let multiplots = self.data_subscribers.get(&source).cloned().unwrap_or_default();
        for mp_id in multiplots {
            self.push_source(mp_id, source);
        }
    }

    fn push_source(&mut self, multiplot: NodeId, source: NodeId) {
        let Some(src) = self.nodes.get(&source) else {
            return;
        };
        let path = src.path.clone();
        let attrs = src.attrs.clone();
        let data = src.plot().and_then(|p| p.data()).cloned();

        if let Some(mp) = self
            .nodes
            .get_mut(&multiplot)
            .and_then(|n| n.kind.multiplot_mut())
        {
            mp.push(&path, data.as_ref(), &attrs);
        }
    }

    /// Merge attributes into a node, update its editor and redraw its visual
    /// if any changed key is rendered by it
    pub fn update_attrs(&mut self, id: NodeId, changed: Attrs) -> Result<()> {
        let node = self.node_mut(id)?;
        node.attrs.extend(changed.clone());
        node.editor.update_attrs(&node.attrs);
        let MirrorNode {
            path, attrs, kind, ..
        } = node;
        if let Some(plot) = kind.plot_mut() {
            if plot.redraw_if_relevant(&changed, attrs) {
                tracing::trace!("Redrew {} for attribute change", path);
            }
        }
        Ok(())
    }

    /// Replace a node's attributes with a fresh remote snapshot
    pub(crate) fn replace_attrs(&mut self, id: NodeId, attrs: Attrs) -> Result<()> {
        let node = self.node_mut(id)?;
        let changed = attrs.clone();
        node.attrs = attrs;
        node.editor.update_attrs(&node.attrs);
        let MirrorNode { attrs, kind, .. } = node;
        if let Some(plot) = kind.plot_mut() {
            plot.redraw_if_relevant(&changed, attrs);
        }
        Ok(())
    }

    /// Commit edited attributes: merge locally, then write them back to the
    /// remote entry when the node has one
    pub fn commit_attrs(&mut self, path: &NodePath, attrs: Attrs) -> Result<()> {
        let id = self.registry.lookup(path)?;
        self.update_attrs(id, attrs.clone())?;
        if let Some(sync) = self.nodes.get(&id).and_then(|n| n.kind.sync()) {
            sync.proxy().set_attrs(&attrs)?;
            tracing::debug!("Committed {} attribute(s) of {}", attrs.len(), path);
        }
        Ok(())
    }

    // ========================================================================
    // Plots
    // ========================================================================

    /// Existing top-level node named `name`, or a new bare plot node there
    pub fn add_plot(&mut self, name: &str) -> Result<NodeId> {
        let path = NodePath::root(name);
        if let Ok(id) = self.registry.lookup(&path) {
            return Ok(id);
        }
        tracing::info!("Creating local plot {}", name);
        self.insert_node(name, None, Attrs::new(), NodeKind::Plot(PlotBinding::default()))
    }

    /// Every plot-bearing node by path
    pub fn get_all_plots(&self) -> BTreeMap<NodePath, PlotSummary> {
        self.nodes
            .values()
            .filter_map(|node| {
                let plot = node.plot()?;
                Some((
                    node.path.clone(),
                    PlotSummary {
                        id: node.id,
                        rank: plot.rank(),
                        shape: plot.data().map(|d| d.shape().to_vec()),
                        visible: plot.is_visible(),
                    },
                ))
            })
            .collect()
    }

    /// The local container for multiplots. A remote file or bare plot that
    /// took the name first is never reused as the container.
    fn ensure_multiplots_root(&mut self) -> Result<NodeId> {
        let path = NodePath::root(MULTIPLOTS_ROOT);
        match self.registry.lookup(&path) {
            Ok(id) if self.is_multiplots_root(id) => Ok(id),
            Ok(_) => Err(MirrorError::DuplicatePath(path)),
            Err(_) => self.insert_node(MULTIPLOTS_ROOT, None, Attrs::new(), NodeKind::Plain),
        }
    }

    /// Whether `id` is the local multiplots container
    pub fn is_multiplots_root(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|n| {
            n.parent.is_none() && n.name() == MULTIPLOTS_ROOT && matches!(n.kind, NodeKind::Plain)
        })
    }

    /// Compose the selected plot-bearing nodes into one view under the
    /// multiplots root. The view is pushed every source now and again on
    /// every later data change of that source.
    pub fn create_multiplot(&mut self, selection: &[NodePath]) -> Result<NodeId> {
        if selection.len() < 2 {
            return Err(MirrorError::Configuration(format!(
                "a multiplot needs at least two sources, got {}",
                selection.len()
            )));
        }
        let mut sources = Vec::with_capacity(selection.len());
        for path in selection {
            let node = self.lookup(path)?;
            if node.plot().is_none() {
                return Err(MirrorError::NotPlottable(path.clone()));
            }
            sources.push(node.id);
        }

        let name = multiplot_name(selection);
        let path = NodePath::root(MULTIPLOTS_ROOT).child(name.as_str());
        if self.registry.contains(&path) {
            return Err(MirrorError::DuplicatePath(path));
        }

        let root = self.ensure_multiplots_root()?;
        let composite = self.surfaces.composite(&name);
        let binding = MultiPlotBinding::new(selection.to_vec(), composite);
        let id = self.insert_node(&name, Some(root), Attrs::new(), NodeKind::Multiplot(binding))?;

        for source in sources {
            self.data_subscribers.entry(source).or_default().push(id);
            self.push_source(id, source);
        }
        tracing::info!("Created multiplot {} over {} source(s)", name, selection.len());
        Ok(id)
    }

    /// Remove a multiplot and unsubscribe it from its sources
    pub fn remove_multiplot(&mut self, path: &NodePath) -> Result<()> {
        let node = self.lookup(path)?;
        if node.kind.multiplot().is_none() {
            return Err(MirrorError::Configuration(format!(
                "{} is not a multiplot",
                path
            )));
        }
        let id = node.id;
        self.remove_id(id)
    }

    // ========================================================================
    // Tree actions
    // ========================================================================

    /// Toggle a plot's visibility; on a container, toggle every leaf below it
    pub fn toggle(&mut self, path: &NodePath) -> Result<()> {
        let id = self.registry.lookup(path)?;
        self.toggle_id(id);
        Ok(())
    }

    fn toggle_id(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        if let Some(visible) = node.kind.plot_mut().and_then(|p| p.toggle()) {
            let path = node.path.clone();
            self.surfaces.tree().set_visible(&path, visible);
            return;
        }
        let children: Vec<NodeId> = node.children.values().copied().collect();
        for child in children {
            self.toggle_id(child);
        }
    }

    /// Show the attribute editor of `path`, hiding the one shown before
    pub fn select_for_edit(&mut self, path: &NodePath) -> Result<()> {
        let id = self.registry.lookup(path)?;
        if let Some(prev) = self.current_editor.filter(|prev| *prev != id) {
            if let Some(node) = self.nodes.get_mut(&prev) {
                node.editor.set_shown(false);
            }
        }
        self.node_mut(id)?.editor.set_shown(true);
        self.current_editor = Some(id);
        Ok(())
    }

    /// Actions enabled by a tree selection.
    ///
    /// Multiplot needs more than one selected leaf, all of rank 1. Parametric
    /// additionally needs exactly two with the same leading dimension. A
    /// selection containing a stale path enables nothing.
    pub fn tree_actions(&self, selection: &[NodePath]) -> TreeActions {
        let mut leading = Vec::with_capacity(selection.len());
        for path in selection {
            let Ok(node) = self.lookup(path) else {
                return TreeActions::default();
            };
            match node.plot() {
                Some(plot) if node.is_leaf() && plot.rank() == Some(1) => {
                    leading.push(plot.leading_dim());
                }
                _ => return TreeActions::default(),
            }
        }

        let multiplot = leading.len() > 1;
        let parametric = multiplot && leading.len() == 2 && leading[0] == leading[1];
        TreeActions {
            multiplot,
            parametric,
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Apply one remote event. Envelopes from an older epoch, events for nodes
    /// that no longer exist and session-level events are ignored here.
    pub fn dispatch(&mut self, envelope: Envelope) -> Result<()> {
        if envelope.epoch != self.epoch {
            tracing::debug!(
                "Discarding {} from epoch {} (current {})",
                envelope.event.kind(),
                envelope.epoch,
                self.epoch
            );
            return Ok(());
        }
        let EventTarget::Node(id) = envelope.target else {
            tracing::warn!("Session event {} reached the mirror", envelope.event.kind());
            return Ok(());
        };
        if !self.nodes.contains_key(&id) {
            tracing::debug!("Dropping {} for removed {:?}", envelope.event.kind(), id);
            return Ok(());
        }

        tracing::trace!("{} -> {:?}", envelope.event.kind(), id);
        match envelope.event {
            RemoteEvent::Changed { key } => self.update_child(id, &key).map(|_| ()),
            RemoteEvent::GroupAdded { key } => self.add_group(id, &key).map(|_| ()),
            RemoteEvent::AttrsChanged { attrs } => self.update_attrs(id, attrs),
            RemoteEvent::Removed { key } => self.remove_child(id, &key),
            RemoteEvent::FileAdded { filename } => {
                tracing::warn!("file-added for {} addressed to a group", filename);
                Ok(())
            }
        }
    }

    /// Apply every pending envelope, reporting failures
    pub fn drain_events(&mut self) -> usize {
        let pending: Vec<Envelope> = self.event_rx.try_iter().collect();
        let count = pending.len();
        for envelope in pending {
            let kind = envelope.event.kind();
            if let Err(e) = self.dispatch(envelope) {
                self.report(&format!("Failed to apply {}", kind), &e);
            }
        }
        count
    }
}

fn missing(id: NodeId) -> MirrorError {
    MirrorError::StaleHandle(id)
}
