//! Composite views over several mirrored nodes

use crate::display::CompositeVisual;
use crate::types::{Attrs, DataBuffer, NodePath};

/// Joins constituent names into a multiplot name
pub const MULTIPLOT_SEPARATOR: &str = "::";

/// Name of the synthetic root group holding every multiplot
pub const MULTIPLOTS_ROOT: &str = "multiplots";

/// Multiplot name for an ordered selection. Order matters: `a::b` and
/// `b::a` are distinct multiplots.
pub fn multiplot_name(sources: &[NodePath]) -> String {
    sources
        .iter()
        .map(|p| p.name())
        .collect::<Vec<_>>()
        .join(MULTIPLOT_SEPARATOR)
}

/// Owned composite visual plus the ordered sources it shows
pub struct MultiPlotBinding {
    sources: Vec<NodePath>,
    composite: Box<dyn CompositeVisual>,
}

impl std::fmt::Debug for MultiPlotBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiPlotBinding")
            .field("sources", &self.sources)
            .finish()
    }
}

impl MultiPlotBinding {
    pub fn new(sources: Vec<NodePath>, composite: Box<dyn CompositeVisual>) -> Self {
        Self { sources, composite }
    }

    pub fn sources(&self) -> &[NodePath] {
        &self.sources
    }

    /// Push one constituent's current content, keyed by its path
    pub(crate) fn push(&mut self, source: &NodePath, data: Option<&DataBuffer>, attrs: &Attrs) {
        self.composite.update_path(source, data, attrs);
    }

    /// Drop a constituent that was removed from the mirror
    pub(crate) fn forget(&mut self, source: &NodePath) {
        self.sources.retain(|s| s != source);
        self.composite.remove_path(source);
    }

    pub(crate) fn release(&mut self) {
        self.composite.release();
    }
}
