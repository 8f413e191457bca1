//! Headless display surfaces
//!
//! Implements every display contract by writing into a shared [`DisplayLog`].
//! Nothing is drawn; the log is what a test (or the demo binary) inspects to
//! see what the mirror asked the display to do.
//!
//! Rank to representation mapping used here:
//!
//! | Rank | [`VisualKind`] |
//! |---|---|
//! | 0 | `Scalar` |
//! | 1 | `Series` |
//! | 2 | `Image` |
//! | 3+ | `Slicer` |

use crate::display::{AttrEditor, CompositeVisual, DisplaySurfaces, TreeDisplay, Visual};
use crate::types::{Attrs, DataBuffer, NodePath};
use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Representation chosen for a rank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualKind {
    Scalar,
    Series,
    Image,
    Slicer,
}

impl VisualKind {
    pub fn for_rank(rank: usize) -> Self {
        match rank {
            0 => VisualKind::Scalar,
            1 => VisualKind::Series,
            2 => VisualKind::Image,
            _ => VisualKind::Slicer,
        }
    }

    /// Attribute keys the representation renders
    pub fn plot_attrs(self) -> &'static [&'static str] {
        match self {
            VisualKind::Scalar => &["title", "units"],
            VisualKind::Series => &["title", "xlabel", "ylabel", "x0", "dx"],
            VisualKind::Image => &["title", "xlabel", "ylabel", "zlabel", "colormap"],
            VisualKind::Slicer => &["title", "colormap"],
        }
    }
}

/// One row of the tree display
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeRow {
    pub shape: Option<Vec<usize>>,
    pub visible: Option<bool>,
    pub expanded: bool,
}

/// Everything a visual was told
#[derive(Debug, Clone)]
pub struct VisualRecord {
    pub kind: VisualKind,
    pub rank: usize,
    pub updates: usize,
    pub visible: bool,
    pub released: bool,
    pub last_data: Option<DataBuffer>,
    pub last_attrs: Attrs,
}

/// Everything an attribute editor was told
#[derive(Debug, Clone, Default)]
pub struct EditorRecord {
    pub shown: bool,
    pub attrs: Attrs,
    pub released: bool,
}

/// A single push into a composite
#[derive(Debug, Clone)]
pub struct CompositePush {
    pub source: NodePath,
    pub data: Option<DataBuffer>,
    pub attrs: Attrs,
}

/// Everything a composite was told
#[derive(Debug, Clone, Default)]
pub struct CompositeRecord {
    pub pushes: Vec<CompositePush>,
    pub removed: Vec<NodePath>,
    pub released: bool,
}

impl CompositeRecord {
    /// Pushes keyed by one source
    pub fn pushes_for(&self, source: &NodePath) -> Vec<&CompositePush> {
        self.pushes.iter().filter(|p| &p.source == source).collect()
    }
}

/// Shared record of display activity
#[derive(Debug, Default)]
pub struct DisplayLog {
    pub rows: BTreeMap<NodePath, TreeRow>,
    /// Visuals per path in creation order; the last one is current
    pub visuals: BTreeMap<NodePath, Vec<VisualRecord>>,
    pub editors: BTreeMap<NodePath, EditorRecord>,
    pub composites: BTreeMap<String, CompositeRecord>,
}

impl DisplayLog {
    /// The current visual of a path
    pub fn visual(&self, path: &NodePath) -> Option<&VisualRecord> {
        self.visuals.get(path).and_then(|v| v.last())
    }

    /// Editors currently shown
    pub fn shown_editors(&self) -> Vec<&NodePath> {
        self.editors
            .iter()
            .filter(|(_, e)| e.shown && !e.released)
            .map(|(p, _)| p)
            .collect()
    }
}

/// [`DisplaySurfaces`] that records instead of drawing
#[derive(Debug, Clone, Default)]
pub struct HeadlessDisplay {
    log: Rc<RefCell<DisplayLog>>,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read access to the log
    pub fn log(&self) -> Ref<'_, DisplayLog> {
        self.log.borrow()
    }

    /// Render the tree rows as indented text
    pub fn render_tree(&self) -> String {
        let log = self.log.borrow();
        let mut out = String::new();
        for (path, row) in &log.rows {
            let indent = "  ".repeat(path.len().saturating_sub(1));
            let shape = row
                .shape
                .as_ref()
                .map(|s| format!("{:?}", s))
                .unwrap_or_default();
            let visible = row.visible.map(|v| v.to_string()).unwrap_or_default();
            out.push_str(&format!("{}{}  {}  {}\n", indent, path.name(), shape, visible));
        }
        out
    }
}

impl TreeDisplay for HeadlessDisplay {
    fn insert_item(&mut self, path: &NodePath) {
        self.log
            .borrow_mut()
            .rows
            .insert(path.clone(), TreeRow::default());
    }

    fn set_shape(&mut self, path: &NodePath, shape: &[usize]) {
        if let Some(row) = self.log.borrow_mut().rows.get_mut(path) {
            row.shape = Some(shape.to_vec());
        }
    }

    fn set_visible(&mut self, path: &NodePath, visible: bool) {
        if let Some(row) = self.log.borrow_mut().rows.get_mut(path) {
            row.visible = Some(visible);
        }
    }

    fn set_expanded(&mut self, path: &NodePath, expanded: bool) {
        if let Some(row) = self.log.borrow_mut().rows.get_mut(path) {
            row.expanded = expanded;
        }
    }

    fn remove_item(&mut self, path: &NodePath) {
        self.log.borrow_mut().rows.remove(path);
    }
}

impl DisplaySurfaces for HeadlessDisplay {
    fn tree(&mut self) -> &mut dyn TreeDisplay {
        self
    }

    fn attr_editor(&mut self, path: &NodePath, attrs: &Attrs) -> Box<dyn AttrEditor> {
        self.log.borrow_mut().editors.insert(
            path.clone(),
            EditorRecord {
                shown: false,
                attrs: attrs.clone(),
                released: false,
            },
        );
        Box::new(HeadlessEditor {
            log: Rc::clone(&self.log),
            path: path.clone(),
        })
    }

    fn visual(&mut self, path: &NodePath, rank: usize) -> Box<dyn Visual> {
        let kind = VisualKind::for_rank(rank);
        let mut log = self.log.borrow_mut();
        let history = log.visuals.entry(path.clone()).or_default();
        history.push(VisualRecord {
            kind,
            rank,
            updates: 0,
            visible: true,
            released: false,
            last_data: None,
            last_attrs: Attrs::new(),
        });
        Box::new(HeadlessVisual {
            log: Rc::clone(&self.log),
            path: path.clone(),
            index: history.len() - 1,
            kind,
        })
    }

    fn composite(&mut self, name: &str) -> Box<dyn CompositeVisual> {
        self.log
            .borrow_mut()
            .composites
            .insert(name.to_string(), CompositeRecord::default());
        Box::new(HeadlessComposite {
            log: Rc::clone(&self.log),
            name: name.to_string(),
        })
    }
}

struct HeadlessEditor {
    log: Rc<RefCell<DisplayLog>>,
    path: NodePath,
}

impl HeadlessEditor {
    fn with_record(&self, f: impl FnOnce(&mut EditorRecord)) {
        if let Some(rec) = self.log.borrow_mut().editors.get_mut(&self.path) {
            f(rec);
        }
    }
}

impl AttrEditor for HeadlessEditor {
    fn set_shown(&mut self, shown: bool) {
        self.with_record(|rec| rec.shown = shown);
    }

    fn is_shown(&self) -> bool {
        self.log
            .borrow()
            .editors
            .get(&self.path)
            .map(|rec| rec.shown)
            .unwrap_or(false)
    }

    fn update_attrs(&mut self, attrs: &Attrs) {
        self.with_record(|rec| rec.attrs = attrs.clone());
    }

    fn release(&mut self) {
        self.with_record(|rec| {
            rec.shown = false;
            rec.released = true;
        });
    }
}

struct HeadlessVisual {
    log: Rc<RefCell<DisplayLog>>,
    path: NodePath,
    index: usize,
    kind: VisualKind,
}

impl HeadlessVisual {
    fn with_record<R>(&self, f: impl FnOnce(&mut VisualRecord) -> R) -> Option<R> {
        self.log
            .borrow_mut()
            .visuals
            .get_mut(&self.path)
            .and_then(|v| v.get_mut(self.index))
            .map(f)
    }
}

impl Visual for HeadlessVisual {
    fn update_plot(&mut self, data: &DataBuffer, attrs: &Attrs) {
        self.with_record(|rec| {
            rec.updates += 1;
            rec.last_data = Some(data.clone());
            rec.last_attrs = attrs.clone();
        });
    }

    fn toggle_hide(&mut self) {
        self.with_record(|rec| rec.visible = !rec.visible);
    }

    fn is_visible(&self) -> bool {
        self.with_record(|rec| rec.visible).unwrap_or(false)
    }

    fn plot_attrs(&self) -> &[&'static str] {
        self.kind.plot_attrs()
    }

    fn release(&mut self) {
        self.with_record(|rec| rec.released = true);
    }
}

struct HeadlessComposite {
    log: Rc<RefCell<DisplayLog>>,
    name: String,
}

impl CompositeVisual for HeadlessComposite {
    fn update_path(&mut self, source: &NodePath, data: Option<&DataBuffer>, attrs: &Attrs) {
        if let Some(rec) = self.log.borrow_mut().composites.get_mut(&self.name) {
            rec.pushes.push(CompositePush {
                source: source.clone(),
                data: data.cloned(),
                attrs: attrs.clone(),
            });
        }
    }

    fn remove_path(&mut self, source: &NodePath) {
        if let Some(rec) = self.log.borrow_mut().composites.get_mut(&self.name) {
            rec.removed.push(source.clone());
        }
    }

    fn release(&mut self) {
        if let Some(rec) = self.log.borrow_mut().composites.get_mut(&self.name) {
            rec.released = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_rank_mapping() {
        assert_eq!(VisualKind::for_rank(0), VisualKind::Scalar);
        assert_eq!(VisualKind::for_rank(1), VisualKind::Series);
        assert_eq!(VisualKind::for_rank(2), VisualKind::Image);
        assert_eq!(VisualKind::for_rank(5), VisualKind::Slicer);
        assert!(VisualKind::Series.plot_attrs().contains(&"xlabel"));
    }

    #[test]
    fn test_tree_rows_and_expansion() {
        let mut display = HeadlessDisplay::new();
        let root = NodePath::root("f.h5");
        let child = root.child("x");
        display.insert_item(&root);
        display.insert_item(&child);
        assert!(!display.log().rows[&root].expanded);
        display.set_expanded(&root, true);
        display.set_shape(&child, &[3]);
        display.set_visible(&child, true);

        let log = display.log();
        assert!(log.rows[&root].expanded);
        assert_eq!(log.rows[&child].shape, Some(vec![3]));
        assert_eq!(log.rows[&child].visible, Some(true));
        drop(log);

        display.remove_item(&child);
        assert!(!display.log().rows.contains_key(&child));
    }

    #[test]
    fn test_visual_records_updates() {
        let mut display = HeadlessDisplay::new();
        let path = NodePath::from(["f.h5", "x"]);
        let mut visual = display.visual(&path, 1);
        visual.update_plot(&arr1(&[1.0, 2.0]).into_dyn(), &Attrs::new());
        visual.toggle_hide();
        assert!(!visual.is_visible());
        visual.release();

        let log = display.log();
        let rec = log.visual(&path).unwrap();
        assert_eq!(rec.kind, VisualKind::Series);
        assert_eq!(rec.updates, 1);
        assert!(rec.released);
    }
}
