//! Display collaborator contracts
//!
//! The mirror drives three kinds of display surface without knowing how they
//! are rendered:
//!
//! - [`TreeDisplay`] - the hierarchical list of mirrored paths, with a shape
//!   and a visibility column per row
//! - [`AttrEditor`] - one attribute editing surface per node, hidden until
//!   the node is selected
//! - [`Visual`] / [`CompositeVisual`] - the plot for one dataset, and the
//!   combined plot for a multiplot
//!
//! All of them are created through a [`DisplaySurfaces`] factory owned by the
//! [`crate::mirror::Mirror`]. [`headless::HeadlessDisplay`] implements every
//! contract by recording what it was told, which is what the tests and the
//! demo binary use.

pub mod headless;

use crate::types::{Attrs, DataBuffer, NodePath};

/// The tree view of mirrored paths
pub trait TreeDisplay {
    /// Add a row; the parent row is `path.parent()`
    fn insert_item(&mut self, path: &NodePath);

    /// Shape column hint
    fn set_shape(&mut self, path: &NodePath, shape: &[usize]);

    /// Visibility column hint
    fn set_visible(&mut self, path: &NodePath, visible: bool);

    fn set_expanded(&mut self, path: &NodePath, expanded: bool);

    /// Release the row
    fn remove_item(&mut self, path: &NodePath);
}

/// Attribute editing surface bound to one node
pub trait AttrEditor {
    fn set_shown(&mut self, shown: bool);

    fn is_shown(&self) -> bool;

    /// Replace the displayed attributes
    fn update_attrs(&mut self, attrs: &Attrs);

    /// Release any resources; the editor is not used afterwards
    fn release(&mut self);
}

/// Visual representation of one dataset
pub trait Visual {
    /// Redraw from the given content
    fn update_plot(&mut self, data: &DataBuffer, attrs: &Attrs);

    fn toggle_hide(&mut self);

    fn is_visible(&self) -> bool;

    /// Attribute keys this representation renders
    fn plot_attrs(&self) -> &[&'static str];

    /// Release any resources; the visual is not used afterwards
    fn release(&mut self);
}

/// Combined visual over several sources, keyed by source path
pub trait CompositeVisual {
    fn update_path(&mut self, source: &NodePath, data: Option<&DataBuffer>, attrs: &Attrs);

    /// Forget a source that no longer exists
    fn remove_path(&mut self, source: &NodePath);

    fn release(&mut self);
}

/// Factory and owner of the display surfaces
pub trait DisplaySurfaces {
    fn tree(&mut self) -> &mut dyn TreeDisplay;

    /// Create the editor for a node; it starts hidden
    fn attr_editor(&mut self, path: &NodePath, attrs: &Attrs) -> Box<dyn AttrEditor>;

    /// Create the representation appropriate for `rank`
    fn visual(&mut self, path: &NodePath, rank: usize) -> Box<dyn Visual>;

    fn composite(&mut self, name: &str) -> Box<dyn CompositeVisual>;
}
