//! Plot binding: the visual side of a dataset.
//!
//! A [`PlotBinding`] owns the materialized buffer of one dataset, the rank
//! derived from it and the visual chosen for that rank.
//!
//! # Rank
//!
//! - No data, or an empty first axis: undefined
//! - `parametric` attribute set: length of one row minus one (rows are
//!   `[coord.., value]`), undefined if the buffer has fewer than two axes
//! - Otherwise: the number of axes
//!
//! The visual is built lazily from the first defined rank and rebuilt when a
//! later buffer has a different defined rank.

use crate::display::{DisplaySurfaces, Visual};
use crate::types::{attr_flag, Attrs, DataBuffer, NodePath, PARAMETRIC_ATTR};

/// Derive the rank of a buffer under the given attributes
pub fn derive_rank(data: Option<&DataBuffer>, attrs: &Attrs) -> Option<usize> {
    let data = data?;
    let shape = data.shape();
    if shape.first() == Some(&0) {
        return None;
    }
    if attr_flag(attrs, PARAMETRIC_ATTR) {
        shape.get(1).and_then(|row_len| row_len.checked_sub(1))
    } else {
        Some(shape.len())
    }
}

/// Display hints produced by a data update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotRefresh {
    pub shape: Vec<usize>,
    pub visible: bool,
}

/// Buffer, rank and visual of one plot-bearing node
#[derive(Default)]
pub struct PlotBinding {
    data: Option<DataBuffer>,
    rank: Option<usize>,
    /// The visual and the rank it was built for
    visual: Option<(usize, Box<dyn Visual>)>,
}

impl std::fmt::Debug for PlotBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlotBinding")
            .field("shape", &self.data.as_ref().map(|d| d.shape().to_vec()))
            .field("rank", &self.rank)
            .field("visual_rank", &self.visual.as_ref().map(|(r, _)| *r))
            .finish()
    }
}

impl PlotBinding {
    pub fn data(&self) -> Option<&DataBuffer> {
        self.data.as_ref()
    }

    pub fn rank(&self) -> Option<usize> {
        self.rank
    }

    pub fn has_visual(&self) -> bool {
        self.visual.is_some()
    }

    /// Rank the current visual was built for
    pub fn visual_rank(&self) -> Option<usize> {
        self.visual.as_ref().map(|(r, _)| *r)
    }

    pub fn is_visible(&self) -> bool {
        self.visual
            .as_ref()
            .map(|(_, v)| v.is_visible())
            .unwrap_or(false)
    }

    /// Length of the first axis
    pub fn leading_dim(&self) -> Option<usize> {
        self.data.as_ref().and_then(|d| d.shape().first().copied())
    }

    /// Store a new buffer, recompute the rank, build or rebuild the visual
    /// and redraw it from `(data, attrs)`.
    pub(crate) fn set_data(
        &mut self,
        data: DataBuffer,
        attrs: &Attrs,
        path: &NodePath,
        surfaces: &mut dyn DisplaySurfaces,
    ) -> PlotRefresh {
        self.rank = derive_rank(Some(&data), attrs);

        if let Some(rank) = self.rank {
            match self.visual.take() {
                Some((built_for, visual)) if built_for == rank => {
                    self.visual = Some((built_for, visual));
                }
                Some((built_for, mut old)) => {
                    tracing::debug!("Rank of {} changed {} -> {}, rebuilding visual", path, built_for, rank);
                    let was_visible = old.is_visible();
                    if was_visible {
                        old.toggle_hide();
                    }
                    old.release();
                    let mut visual = surfaces.visual(path, rank);
                    if visual.is_visible() != was_visible {
                        visual.toggle_hide();
                    }
                    self.visual = Some((rank, visual));
                }
                None => {
                    tracing::debug!("Building rank {} visual for {}", rank, path);
                    self.visual = Some((rank, surfaces.visual(path, rank)));
                }
            }
        }

        if let Some((_, visual)) = self.visual.as_mut() {
            visual.update_plot(&data, attrs);
        }

        let shape = data.shape().to_vec();
        self.data = Some(data);
        PlotRefresh {
            shape,
            visible: self.is_visible(),
        }
    }

    /// Redraw if any of `changed` is rendered by the current visual.
    /// Returns whether a redraw happened.
    pub(crate) fn redraw_if_relevant(&mut self, changed: &Attrs, attrs: &Attrs) -> bool {
        let (Some((_, visual)), Some(data)) = (self.visual.as_mut(), self.data.as_ref()) else {
            return false;
        };
        let relevant = changed
            .keys()
            .any(|key| visual.plot_attrs().contains(&key.as_str()));
        if relevant {
            visual.update_plot(data, attrs);
        }
        relevant
    }

    /// Toggle the visual; returns the new visibility, `None` without a visual
    pub(crate) fn toggle(&mut self) -> Option<bool> {
        let (_, visual) = self.visual.as_mut()?;
        visual.toggle_hide();
        Some(visual.is_visible())
    }

    /// Hide the visual if shown, then release it
    pub(crate) fn release(&mut self) {
        if let Some((_, mut visual)) = self.visual.take() {
            if visual.is_visible() {
                visual.toggle_hide();
            }
            visual.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::headless::{HeadlessDisplay, VisualKind};
    use ndarray::{arr1, arr2, ArrayD, IxDyn};
    use serde_json::json;

    fn parametric() -> Attrs {
        let mut attrs = Attrs::new();
        attrs.insert(PARAMETRIC_ATTR.to_string(), json!(true));
        attrs
    }

    #[test]
    fn test_rank_of_plain_buffers() {
        let attrs = Attrs::new();
        assert_eq!(derive_rank(None, &attrs), None);
        assert_eq!(derive_rank(Some(&arr1(&[1.0, 2.0]).into_dyn()), &attrs), Some(1));
        assert_eq!(
            derive_rank(Some(&ArrayD::zeros(IxDyn(&[4, 5, 6]))), &attrs),
            Some(3)
        );
        assert_eq!(derive_rank(Some(&ArrayD::zeros(IxDyn(&[0]))), &attrs), None);
    }

    #[test]
    fn test_rank_of_parametric_rows() {
        // Three (x, y) rows plot as a 1-D parametric series
        let data = arr2(&[[0.0, 1.0], [1.0, 3.0], [2.0, 5.0]]).into_dyn();
        assert_eq!(derive_rank(Some(&data), &parametric()), Some(1));

        let data = ArrayD::zeros(IxDyn(&[10, 3]));
        assert_eq!(derive_rank(Some(&data), &parametric()), Some(2));

        // Rows need at least one axis of their own
        let data = arr1(&[1.0, 2.0]).into_dyn();
        assert_eq!(derive_rank(Some(&data), &parametric()), None);
    }

    #[test]
    fn test_visual_built_lazily_and_reused() {
        let mut display = HeadlessDisplay::new();
        let path = NodePath::from(["f.h5", "x"]);
        let mut plot = PlotBinding::default();
        assert!(!plot.has_visual());

        let refresh = plot.set_data(arr1(&[1.0, 2.0, 3.0]).into_dyn(), &Attrs::new(), &path, &mut display);
        assert_eq!(refresh.shape, vec![3]);
        assert!(refresh.visible);
        plot.set_data(arr1(&[4.0, 5.0, 6.0]).into_dyn(), &Attrs::new(), &path, &mut display);

        let log = display.log();
        assert_eq!(log.visuals[&path].len(), 1);
        assert_eq!(log.visual(&path).unwrap().updates, 2);
    }

    #[test]
    fn test_empty_data_builds_no_visual() {
        let mut display = HeadlessDisplay::new();
        let path = NodePath::from(["f.h5", "x"]);
        let mut plot = PlotBinding::default();
        let refresh = plot.set_data(ArrayD::zeros(IxDyn(&[0])), &Attrs::new(), &path, &mut display);

        assert_eq!(plot.rank(), None);
        assert!(!plot.has_visual());
        assert!(!refresh.visible);
    }

    #[test]
    fn test_rank_change_rebuilds_and_keeps_visibility() {
        let mut display = HeadlessDisplay::new();
        let path = NodePath::from(["f.h5", "x"]);
        let mut plot = PlotBinding::default();
        plot.set_data(arr1(&[1.0]).into_dyn(), &Attrs::new(), &path, &mut display);
        assert_eq!(plot.toggle(), Some(false));

        plot.set_data(ArrayD::zeros(IxDyn(&[2, 2])), &Attrs::new(), &path, &mut display);
        assert_eq!(plot.visual_rank(), Some(2));
        assert!(!plot.is_visible());

        let log = display.log();
        let history = &log.visuals[&path];
        assert_eq!(history.len(), 2);
        assert!(history[0].released);
        assert_eq!(history[1].kind, VisualKind::Image);
    }

    #[test]
    fn test_redraw_only_for_rendered_attrs() {
        let mut display = HeadlessDisplay::new();
        let path = NodePath::from(["f.h5", "x"]);
        let mut plot = PlotBinding::default();
        plot.set_data(arr1(&[1.0]).into_dyn(), &Attrs::new(), &path, &mut display);

        let mut changed = Attrs::new();
        changed.insert("operator".into(), json!("alice"));
        assert!(!plot.redraw_if_relevant(&changed, &changed));

        changed.insert("xlabel".into(), json!("time"));
        assert!(plot.redraw_if_relevant(&changed, &changed));
        assert_eq!(display.log().visual(&path).unwrap().updates, 2);
    }

    #[test]
    fn test_release_hides_first() {
        let mut display = HeadlessDisplay::new();
        let path = NodePath::from(["f.h5", "x"]);
        let mut plot = PlotBinding::default();
        plot.set_data(arr1(&[1.0]).into_dyn(), &Attrs::new(), &path, &mut display);
        plot.release();

        let log = display.log();
        let rec = log.visual(&path).unwrap();
        assert!(!rec.visible);
        assert!(rec.released);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_rank_law(shape in prop::collection::vec(1usize..4, 1..5)) {
            let data = ArrayD::<f64>::zeros(IxDyn(&shape));
            prop_assert_eq!(derive_rank(Some(&data), &Attrs::new()), Some(shape.len()));
        }

        #[test]
        fn test_parametric_rank_law(rows in 1usize..20, k in 1usize..6) {
            let data = ArrayD::<f64>::zeros(IxDyn(&[rows, k]));
            prop_assert_eq!(derive_rank(Some(&data), &parametric()), Some(k - 1));
        }
    }
}
