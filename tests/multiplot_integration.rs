//! Integration tests for multiplots and selection-driven tree actions

mod common;

use common::builders::ServerBuilder;
use common::{series, Rig};
use plotmirror_rs::mirror::{MirrorNotice, TreeActions};
use plotmirror_rs::{MirrorError, NodePath};

fn rig() -> Rig {
    Rig::start(
        ServerBuilder::new()
            .file("f.h5")
            .dataset(["f.h5", "a"], series(10))
            .dataset(["f.h5", "b"], series(10))
            .dataset(["f.h5", "c"], series(4))
            .build(),
    )
}

fn p(name: &str) -> NodePath {
    NodePath::from(["f.h5", name])
}

#[test]
fn test_selection_enables_actions() {
    let rig = rig();
    let mirror = rig.app.mirror();

    assert_eq!(
        mirror.tree_actions(&[p("a"), p("b")]),
        TreeActions {
            multiplot: true,
            parametric: true
        }
    );
    assert_eq!(
        mirror.tree_actions(&[p("a"), p("c")]),
        TreeActions {
            multiplot: true,
            parametric: false
        }
    );
    // Groups are not leaves
    assert_eq!(
        mirror.tree_actions(&[NodePath::root("f.h5"), p("a")]),
        TreeActions::default()
    );
}

#[test]
fn test_multiplot_follows_remote_changes() {
    let mut rig = rig();
    let mp = rig
        .app
        .mirror_mut()
        .create_multiplot(&[p("a"), p("b")])
        .unwrap();
    assert_eq!(
        rig.app.mirror().node(mp).unwrap().path(),
        &NodePath::from(["multiplots", "a::b"])
    );

    rig.server.set_dataset(&p("a"), series(20)).unwrap();
    rig.settle();

    let log = rig.display.log();
    let composite = &log.composites["a::b"];
    let pushes = composite.pushes_for(&p("a"));
    assert_eq!(pushes.len(), 2);
    assert_eq!(pushes[1].data.as_ref().unwrap().len(), 20);
    assert_eq!(composite.pushes_for(&p("b")).len(), 1);
}

#[test]
fn test_multiplot_of_missing_path() {
    let mut rig = rig();
    let err = rig
        .app
        .mirror_mut()
        .create_multiplot(&[p("a"), p("zzz")])
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(rig.app.mirror().lookup(&NodePath::root("multiplots")).is_err());
}

#[test]
fn test_multiplot_of_group_is_rejected() {
    let mut rig = rig();
    let err = rig
        .app
        .mirror_mut()
        .create_multiplot(&[NodePath::root("f.h5"), p("a")])
        .unwrap_err();
    assert!(matches!(err, MirrorError::NotPlottable(_)));
}

#[test]
fn test_constituent_removed_remotely() {
    let mut rig = rig();
    let mp = rig
        .app
        .mirror_mut()
        .create_multiplot(&[p("a"), p("b")])
        .unwrap();

    rig.server.remove(&p("a")).unwrap();
    rig.settle();

    let sources = rig
        .app
        .mirror()
        .node(mp)
        .unwrap()
        .kind()
        .multiplot()
        .unwrap()
        .sources()
        .to_vec();
    assert_eq!(sources, vec![p("b")]);
    assert_eq!(rig.display.log().composites["a::b"].removed, vec![p("a")]);
}

#[test]
fn test_removed_multiplot_stops_listening() {
    let mut rig = rig();
    rig.app
        .mirror_mut()
        .create_multiplot(&[p("a"), p("b")])
        .unwrap();
    rig.app
        .mirror_mut()
        .remove_multiplot(&NodePath::from(["multiplots", "a::b"]))
        .unwrap();

    rig.server.set_dataset(&p("a"), series(3)).unwrap();
    rig.settle();

    let log = rig.display.log();
    assert!(log.composites["a::b"].released);
    assert_eq!(log.composites["a::b"].pushes_for(&p("a")).len(), 1);
    // The multiplots root stays for the next one
    drop(log);
    assert!(rig.app.mirror().lookup(&NodePath::root("multiplots")).is_ok());
}

#[test]
fn test_remove_multiplot_rejects_other_nodes() {
    let mut rig = rig();
    assert!(rig.app.mirror_mut().remove_multiplot(&p("a")).is_err());
    assert!(rig.app.mirror().lookup(&p("a")).is_ok());
}

#[test]
fn test_remote_file_cannot_replace_multiplots_root() {
    let mut rig = rig();
    let mp = rig
        .app
        .mirror_mut()
        .create_multiplot(&[p("a"), p("b")])
        .unwrap();
    rig.notices();

    rig.server.create_file("multiplots").unwrap();
    rig.settle();

    assert!(rig.app.mirror().node(mp).is_some());
    let notices = rig.notices();
    assert!(!notices
        .iter()
        .any(|n| matches!(n, MirrorNotice::NodeRemoved(_))));
    assert!(notices
        .iter()
        .any(|n| matches!(n, MirrorNotice::OperatorReport { .. })));
    assert!(!rig.display.log().composites["a::b"].released);
}

#[test]
fn test_multiplots_not_attached_to_remote_file() {
    let server = ServerBuilder::new()
        .file("multiplots")
        .file("f.h5")
        .dataset(["f.h5", "a"], series(10))
        .dataset(["f.h5", "b"], series(10))
        .build();
    let mut rig = Rig::start(server);

    let err = rig
        .app
        .mirror_mut()
        .create_multiplot(&[p("a"), p("b")])
        .unwrap_err();
    assert!(matches!(err, MirrorError::DuplicatePath(path) if path == NodePath::root("multiplots")));
    assert!(rig
        .app
        .mirror()
        .lookup(&NodePath::from(["multiplots", "a::b"]))
        .is_err());
    assert!(rig.display.log().composites.is_empty());
}
