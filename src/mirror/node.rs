//! Mirrored nodes
//!
//! Every addressable entry is a [`MirrorNode`] stored in the mirror's arena.
//! What a node can do beyond the base (identity, links, attributes, editor)
//! is decided by its [`NodeKind`]: a synchronized group, a dataset (group
//! sync plus a plot), a bare plot, a multiplot, or a plain local container.

use crate::display::{AttrEditor, TreeDisplay};
use crate::mirror::multiplot::MultiPlotBinding;
use crate::mirror::plot::PlotBinding;
use crate::remote::CollectionProxy;
use crate::types::{Attrs, NodeId, NodePath};
use std::collections::BTreeMap;
use std::fmt;

/// Binding of a node to its remote collection.
///
/// The node holds the only handle used for calls; children reach the remote
/// side by indexing through it.
pub struct GroupSync {
    proxy: Box<dyn CollectionProxy>,
}

impl GroupSync {
    pub fn new(proxy: Box<dyn CollectionProxy>) -> Self {
        Self { proxy }
    }

    pub fn proxy(&self) -> &dyn CollectionProxy {
        self.proxy.as_ref()
    }
}

/// A remote-backed terminal dataset
pub struct DatasetNode {
    pub sync: GroupSync,
    pub plot: PlotBinding,
}

/// Capabilities of a node
pub enum NodeKind {
    /// Local container without a remote side (the multiplots root)
    Plain,
    Group(GroupSync),
    Dataset(DatasetNode),
    /// Plot not backed by a remote proxy
    Plot(PlotBinding),
    Multiplot(MultiPlotBinding),
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Plain => "plain",
            NodeKind::Group(_) => "group",
            NodeKind::Dataset(_) => "dataset",
            NodeKind::Plot(_) => "plot",
            NodeKind::Multiplot(_) => "multiplot",
        }
    }

    pub fn plot(&self) -> Option<&PlotBinding> {
        match self {
            NodeKind::Dataset(ds) => Some(&ds.plot),
            NodeKind::Plot(plot) => Some(plot),
            _ => None,
        }
    }

    pub fn plot_mut(&mut self) -> Option<&mut PlotBinding> {
        match self {
            NodeKind::Dataset(ds) => Some(&mut ds.plot),
            NodeKind::Plot(plot) => Some(plot),
            _ => None,
        }
    }

    pub fn sync(&self) -> Option<&GroupSync> {
        match self {
            NodeKind::Group(sync) => Some(sync),
            NodeKind::Dataset(ds) => Some(&ds.sync),
            _ => None,
        }
    }

    pub fn multiplot(&self) -> Option<&MultiPlotBinding> {
        match self {
            NodeKind::Multiplot(mp) => Some(mp),
            _ => None,
        }
    }

    pub fn multiplot_mut(&mut self) -> Option<&mut MultiPlotBinding> {
        match self {
            NodeKind::Multiplot(mp) => Some(mp),
            _ => None,
        }
    }
}

/// One addressable entry of the mirror
pub struct MirrorNode {
    pub(crate) id: NodeId,
    pub(crate) path: NodePath,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: BTreeMap<String, NodeId>,
    pub(crate) attrs: Attrs,
    pub(crate) editor: Box<dyn AttrEditor>,
    pub(crate) kind: NodeKind,
}

impl fmt::Debug for MirrorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorNode")
            .field("id", &self.id)
            .field("path", &self.path.to_string())
            .field("kind", &self.kind.label())
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .field("attrs", &self.attrs)
            .finish()
    }
}

impl MirrorNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.path.name()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &BTreeMap<String, NodeId> {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<NodeId> {
        self.children.get(name).copied()
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group(_) | NodeKind::Plain)
    }

    pub fn is_dataset(&self) -> bool {
        matches!(self.kind, NodeKind::Dataset(_))
    }

    pub fn plot(&self) -> Option<&PlotBinding> {
        self.kind.plot()
    }

    /// Plot-bearing node without children
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty() && self.kind.plot().is_some()
    }

    pub fn editor_shown(&self) -> bool {
        self.editor.is_shown()
    }

    /// Release every display resource held by this node. Registry and parent
    /// links are left to the caller.
    pub(crate) fn release(&mut self, tree: &mut dyn TreeDisplay) {
        match &mut self.kind {
            NodeKind::Dataset(ds) => ds.plot.release(),
            NodeKind::Plot(plot) => plot.release(),
            NodeKind::Multiplot(mp) => mp.release(),
            NodeKind::Plain | NodeKind::Group(_) => {}
        }
        self.editor.release();
        tree.remove_item(&self.path);
    }
}
