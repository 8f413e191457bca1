//! Group synchronization
//!
//! A group binds to its remote collection, pulls its attributes, subscribes
//! to its events and then enumerates its keys, feeding each one through
//! [`Mirror::update_child`]. Initial population and live `changed` events
//! share that one handler.
//!
//! Key resolution:
//!
//! - known dataset: re-fetch attributes and buffer
//! - known group: refresh its attributes
//! - unknown key: build from the child proxy's type tag; a dataset is then
//!   fetched once
//!
//! `group-added` replaces a dataset at the same key and is a no-op for an
//! existing group. Construction is all-or-nothing: a failure anywhere in a
//! subtree removes the partially built node.

use super::{missing, DatasetNode, GroupSync, Mirror, NodeKind, PlotBinding};
use crate::error::{MirrorError, Result};
use crate::remote::{CollectionProxy, EventTarget};
use crate::types::NodeId;

impl Mirror {
    /// Mirror a remote root collection (one open file). A root needs a proxy.
    pub fn add_root_group(
        &mut self,
        name: &str,
        proxy: Option<Box<dyn CollectionProxy>>,
    ) -> Result<NodeId> {
        let id = self.construct_group(name, None, proxy)?;
        tracing::info!("Mirrored {} ({} nodes total)", name, self.len());
        Ok(id)
    }

    fn proxy_of(&self, id: NodeId) -> Result<&dyn CollectionProxy> {
        let node = self.nodes.get(&id).ok_or_else(|| missing(id))?;
        node.kind.sync().map(GroupSync::proxy).ok_or_else(|| {
            MirrorError::Configuration(format!("{} has no remote collection", node.path))
        })
    }

    /// Build the node for `name`, from `proxy` or else by indexing the
    /// parent's proxy. Groups sync their whole subtree before returning.
    pub(crate) fn construct_group(
        &mut self,
        name: &str,
        parent: Option<NodeId>,
        proxy: Option<Box<dyn CollectionProxy>>,
    ) -> Result<NodeId> {
        let proxy = match (proxy, parent) {
            (Some(proxy), _) => proxy,
            (None, Some(pid)) => self.proxy_of(pid)?.child(name)?,
            (None, None) => {
                return Err(MirrorError::Configuration(format!(
                    "root group {} needs a remote proxy",
                    name
                )));
            }
        };

        let attrs = proxy.get_attrs()?;
        let kind = if proxy.is_dataset() {
            NodeKind::Dataset(DatasetNode {
                sync: GroupSync::new(proxy),
                plot: PlotBinding::default(),
            })
        } else {
            NodeKind::Group(GroupSync::new(proxy))
        };
        let is_group = matches!(kind, NodeKind::Group(_));
        let id = self.insert_node(name, parent, attrs, kind)?;

        if is_group {
            if let Err(e) = self.sync_group(id) {
                self.rollback(id);
                return Err(e.with_context(format!("failed to sync group {}", name)));
            }
        }
        Ok(id)
    }

    /// Subscribe first, then enumerate, so nothing falls between the
    /// snapshot and the subscription.
    fn sync_group(&mut self, id: NodeId) -> Result<()> {
        let subscription = self.subscription(EventTarget::Node(id));
        let keys = {
            let proxy = self.proxy_of(id)?;
            proxy.subscribe(subscription)?;
            proxy.keys()?
        };
        tracing::debug!("Syncing {} key(s) under {:?}", keys.len(), id);
        for key in keys {
            self.update_child(id, &key)?;
        }
        Ok(())
    }

    fn rollback(&mut self, id: NodeId) {
        if let Err(e) = self.remove_id(id) {
            tracing::warn!("Rollback of {:?} failed: {}", id, e);
        }
    }

    /// Handle `changed` for `key` under `parent`
    pub fn update_child(&mut self, parent: NodeId, key: &str) -> Result<NodeId> {
        let existing = self
            .nodes
            .get(&parent)
            .ok_or_else(|| missing(parent))?
            .child(key);

        if let Some(child) = existing {
            if self.nodes.get(&child).is_some_and(|n| n.is_dataset()) {
                self.update_data(child)?;
            } else {
                self.refresh_attrs(child)?;
            }
            return Ok(child);
        }

        let proxy = self.proxy_of(parent)?.child(key)?;
        let child = self.construct_group(key, Some(parent), Some(proxy))?;
        if self.nodes.get(&child).is_some_and(|n| n.is_dataset()) {
            if let Err(e) = self.update_data(child) {
                self.rollback(child);
                return Err(e);
            }
        }
        Ok(child)
    }

    /// Handle `group-added` for `key` under `parent`
    pub fn add_group(&mut self, parent: NodeId, key: &str) -> Result<NodeId> {
        let existing = self
            .nodes
            .get(&parent)
            .ok_or_else(|| missing(parent))?
            .child(key);

        if let Some(child) = existing {
            match self.nodes.get(&child).map(|n| &n.kind) {
                Some(NodeKind::Group(_)) => return Ok(child),
                _ => {
                    tracing::debug!("{} under {:?} became a group", key, parent);
                    self.remove_id(child)?;
                }
            }
        }
        self.construct_group(key, Some(parent), None)
    }

    /// Handle `removed` for `key` under `parent`
    pub fn remove_child(&mut self, parent: NodeId, key: &str) -> Result<()> {
        let existing = self
            .nodes
            .get(&parent)
            .ok_or_else(|| missing(parent))?
            .child(key);
        match existing {
            Some(child) => self.remove_id(child),
            None => {
                tracing::debug!("removed for unmirrored {} under {:?}", key, parent);
                Ok(())
            }
        }
    }

    /// Re-fetch a dataset's attributes and buffer and refresh its plot
    pub fn update_data(&mut self, id: NodeId) -> Result<()> {
        let (attrs, data) = {
            let proxy = self.proxy_of(id)?;
            (proxy.get_attrs()?, proxy.read()?)
        };
        let node = self.node_mut(id)?;
        node.attrs = attrs;
        node.editor.update_attrs(&node.attrs);
        self.set_data_id(id, data)
    }

    fn refresh_attrs(&mut self, id: NodeId) -> Result<()> {
        let attrs = match self.proxy_of(id) {
            Ok(proxy) => proxy.get_attrs()?,
            Err(_) => return Ok(()),
        };
        self.replace_attrs(id, attrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::headless::HeadlessDisplay;
    use crate::remote::MockCollectionProxy;
    use crate::types::{Attrs, NodePath};
    use ndarray::arr1;

    fn mirror() -> (Mirror, HeadlessDisplay) {
        let display = HeadlessDisplay::new();
        (Mirror::new(Box::new(display.clone())), display)
    }

    fn dataset_proxy(fail_read: bool) -> MockCollectionProxy {
        let mut proxy = MockCollectionProxy::new();
        proxy.expect_get_attrs().returning(|| Ok(Attrs::new()));
        proxy.expect_is_dataset().return_const(true);
        proxy.expect_read().returning(move || {
            if fail_read {
                Err(MirrorError::Remote("read refused".into()))
            } else {
                Ok(arr1(&[1.0, 2.0, 3.0]).into_dyn())
            }
        });
        proxy
    }

    fn group_proxy(keys: Vec<String>, fail_read: bool) -> MockCollectionProxy {
        let mut proxy = MockCollectionProxy::new();
        proxy.expect_get_attrs().returning(|| Ok(Attrs::new()));
        proxy.expect_is_dataset().return_const(false);
        proxy.expect_subscribe().returning(|_| Ok(()));
        proxy.expect_unsubscribe().returning(|_| Ok(()));
        proxy.expect_keys().returning(move || Ok(keys.clone()));
        proxy
            .expect_child()
            .returning(move |_| Ok(Box::new(dataset_proxy(fail_read)) as Box<dyn CollectionProxy>));
        proxy
    }

    #[test]
    fn test_root_without_proxy_is_configuration_error() {
        let (mut mirror, display) = mirror();
        let err = mirror.add_root_group("run1.h5", None).unwrap_err();
        assert!(matches!(err, MirrorError::Configuration(_)));
        assert!(mirror.is_empty());
        assert!(display.log().rows.is_empty());
    }

    #[test]
    fn test_initial_sync_builds_datasets() {
        let (mut mirror, _) = mirror();
        let proxy = group_proxy(vec!["a".into(), "b".into()], false);
        mirror.add_root_group("f.h5", Some(Box::new(proxy))).unwrap();

        assert_eq!(mirror.len(), 3);
        let a = mirror.lookup(&NodePath::from(["f.h5", "a"])).unwrap();
        assert!(a.is_dataset());
        assert_eq!(a.plot().unwrap().rank(), Some(1));
    }

    #[test]
    fn test_failed_fetch_rolls_back_whole_group() {
        let (mut mirror, display) = mirror();
        let proxy = group_proxy(vec!["a".into()], true);
        let err = mirror.add_root_group("f.h5", Some(Box::new(proxy))).unwrap_err();

        assert!(matches!(err.root(), MirrorError::Remote(_)));
        assert!(mirror.is_empty());
        assert!(mirror.registry().is_empty());
        assert!(display.log().rows.is_empty());
    }

    #[test]
    fn test_failed_subscribe_rolls_back() {
        let (mut mirror, _) = mirror();
        let mut proxy = MockCollectionProxy::new();
        proxy.expect_get_attrs().returning(|| Ok(Attrs::new()));
        proxy.expect_is_dataset().return_const(false);
        proxy
            .expect_subscribe()
            .returning(|_| Err(MirrorError::Remote("no events".into())));
        proxy.expect_unsubscribe().times(1).returning(|_| Ok(()));
        proxy.expect_keys().never();

        assert!(mirror.add_root_group("f.h5", Some(Box::new(proxy))).is_err());
        assert!(mirror.lookup(&NodePath::root("f.h5")).is_err());
    }

    #[test]
    fn test_removing_group_withdraws_its_registration() {
        let (mut mirror, _) = mirror();
        // First node of a fresh mirror
        let expected = mirror.subscription(EventTarget::Node(NodeId(0)));

        let mut proxy = MockCollectionProxy::new();
        proxy.expect_get_attrs().returning(|| Ok(Attrs::new()));
        proxy.expect_is_dataset().return_const(false);
        proxy.expect_subscribe().times(1).returning(|_| Ok(()));
        proxy.expect_keys().returning(|| Ok(Vec::new()));
        proxy
            .expect_unsubscribe()
            .withf(move |sub| sub.same_registration(&expected))
            .times(1)
            .returning(|_| Ok(()));

        let id = mirror.add_root_group("f.h5", Some(Box::new(proxy))).unwrap();
        assert_eq!(id, NodeId(0));
        mirror.remove(&NodePath::root("f.h5")).unwrap();
    }

    #[test]
    fn test_events_for_unknown_parent_are_stale() {
        let (mut mirror, _) = mirror();
        assert!(matches!(
            mirror.update_child(NodeId(42), "x").unwrap_err(),
            MirrorError::StaleHandle(NodeId(42))
        ));
        assert!(matches!(
            mirror.remove_child(NodeId(42), "x").unwrap_err(),
            MirrorError::StaleHandle(NodeId(42))
        ));
    }
}
