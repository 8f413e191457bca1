//! Published plot interface
//!
//! Remote consumers (and local scripts) call into the mirror by sending
//! [`InterfaceCall`]s down the channel handed to [`Connector::publish`].
//! Calls that produce a value carry a reply sender; the constructor helpers
//! return the matching receiver.
//!
//! [`Connector::publish`]: crate::remote::Connector::publish

use crate::error::{MirrorError, Result};
use crate::mirror::{Mirror, NodeKind, PlotSummary};
use crate::types::{Attrs, DataBuffer, NodePath};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::BTreeMap;

/// A call into the published interface
#[derive(Debug)]
pub enum InterfaceCall {
    /// Every plot-bearing node
    GetAllPlots {
        reply: Sender<BTreeMap<NodePath, PlotSummary>>,
    },
    /// Top-level node `name`, created as a bare plot if absent
    AddPlot {
        name: String,
        reply: Sender<Result<NodePath>>,
    },
    /// Replace the buffer of a plot created through `AddPlot`
    SetData {
        path: NodePath,
        data: DataBuffer,
        reply: Sender<Result<()>>,
    },
    /// Merge attributes into a node
    SetAttrs {
        path: NodePath,
        attrs: Attrs,
        reply: Sender<Result<()>>,
    },
    /// Ask the process to shut down
    Quit,
}

impl InterfaceCall {
    pub fn get_all_plots() -> (Self, Receiver<BTreeMap<NodePath, PlotSummary>>) {
        let (reply, rx) = bounded(1);
        (InterfaceCall::GetAllPlots { reply }, rx)
    }

    pub fn add_plot(name: impl Into<String>) -> (Self, Receiver<Result<NodePath>>) {
        let (reply, rx) = bounded(1);
        let call = InterfaceCall::AddPlot {
            name: name.into(),
            reply,
        };
        (call, rx)
    }

    pub fn set_data(path: NodePath, data: DataBuffer) -> (Self, Receiver<Result<()>>) {
        let (reply, rx) = bounded(1);
        (InterfaceCall::SetData { path, data, reply }, rx)
    }

    pub fn set_attrs(path: NodePath, attrs: Attrs) -> (Self, Receiver<Result<()>>) {
        let (reply, rx) = bounded(1);
        (InterfaceCall::SetAttrs { path, attrs, reply }, rx)
    }

    pub fn name(&self) -> &'static str {
        match self {
            InterfaceCall::GetAllPlots { .. } => "get_all_plots",
            InterfaceCall::AddPlot { .. } => "add_plot",
            InterfaceCall::SetData { .. } => "set_data",
            InterfaceCall::SetAttrs { .. } => "set_attrs",
            InterfaceCall::Quit => "quit",
        }
    }
}

/// Returned instead of exiting when `quit` is called; the process
/// supervisor decides what to do with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownRequest {
    pub reason: String,
}

impl ShutdownRequest {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Apply one call to the mirror. Replies to callers that went away are
/// dropped.
pub fn handle_call(mirror: &mut Mirror, call: InterfaceCall) -> Option<ShutdownRequest> {
    tracing::debug!("Interface call {}", call.name());
    match call {
        InterfaceCall::GetAllPlots { reply } => {
            let _ = reply.send(mirror.get_all_plots());
        }
        InterfaceCall::AddPlot { name, reply } => {
            let result = mirror.add_plot(&name).and_then(|id| {
                mirror
                    .node(id)
                    .map(|n| n.path().clone())
                    .ok_or_else(|| MirrorError::NotFound(NodePath::root(name.as_str())))
            });
            let _ = reply.send(result);
        }
        InterfaceCall::SetData { path, data, reply } => {
            let result = ensure_local_plot(mirror, &path).and_then(|_| mirror.set_data(&path, data));
            let _ = reply.send(result);
        }
        InterfaceCall::SetAttrs { path, attrs, reply } => {
            let _ = reply.send(mirror.commit_attrs(&path, attrs));
        }
        InterfaceCall::Quit => {
            tracing::info!("Quit requested through the interface");
            return Some(ShutdownRequest::new("quit called"));
        }
    }
    None
}

/// Mirrored datasets follow the data server; only bare plots take data
/// from callers
fn ensure_local_plot(mirror: &Mirror, path: &NodePath) -> Result<()> {
    match mirror.lookup(path)?.kind() {
        NodeKind::Plot(_) => Ok(()),
        NodeKind::Dataset(_) => Err(MirrorError::Configuration(format!(
            "{} is mirrored from the data server",
            path
        ))),
        _ => Err(MirrorError::NotPlottable(path.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::headless::HeadlessDisplay;
    use ndarray::arr1;
    use serde_json::json;

    fn mirror() -> Mirror {
        Mirror::new(Box::new(HeadlessDisplay::new()))
    }

    #[test]
    fn test_add_plot_then_set_data() {
        let mut mirror = mirror();
        let (call, rx) = InterfaceCall::add_plot("scratch");
        assert!(handle_call(&mut mirror, call).is_none());
        let path = rx.try_recv().unwrap().unwrap();
        assert_eq!(path, NodePath::root("scratch"));

        let (call, rx) = InterfaceCall::set_data(path.clone(), arr1(&[1.0, 2.0]).into_dyn());
        handle_call(&mut mirror, call);
        rx.try_recv().unwrap().unwrap();

        let (call, rx) = InterfaceCall::get_all_plots();
        handle_call(&mut mirror, call);
        let plots = rx.try_recv().unwrap();
        assert_eq!(plots[&path].shape, Some(vec![2]));
    }

    #[test]
    fn test_set_data_on_missing_path() {
        let mut mirror = mirror();
        let (call, rx) = InterfaceCall::set_data(NodePath::root("nope"), arr1(&[1.0]).into_dyn());
        handle_call(&mut mirror, call);
        assert!(rx.try_recv().unwrap().unwrap_err().is_not_found());
    }

    #[test]
    fn test_set_attrs_merges() {
        let mut mirror = mirror();
        mirror.add_plot("p").unwrap();
        let mut attrs = Attrs::new();
        attrs.insert("title".into(), json!("Scan"));
        let (call, rx) = InterfaceCall::set_attrs(NodePath::root("p"), attrs);
        handle_call(&mut mirror, call);
        rx.try_recv().unwrap().unwrap();

        let node = mirror.lookup(&NodePath::root("p")).unwrap();
        assert_eq!(node.attrs()["title"], json!("Scan"));
    }

    #[test]
    fn test_quit_requests_shutdown() {
        let mut mirror = mirror();
        let request = handle_call(&mut mirror, InterfaceCall::Quit).unwrap();
        assert_eq!(request.reason, "quit called");
    }
}
