//! Test data builders for in-process data servers

use plotmirror_rs::{remote::memory::MemoryServer, Attrs, DataBuffer, NodePath};
use serde_json::Value;

enum Step {
    File(String),
    Group(NodePath),
    Dataset(NodePath, DataBuffer),
    Attr(NodePath, String, Value),
}

/// Builder for a populated [`MemoryServer`]. Steps are applied in order.
#[derive(Default)]
pub struct ServerBuilder {
    steps: Vec<Step>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: &str) -> Self {
        self.steps.push(Step::File(name.to_string()));
        self
    }

    pub fn group<P: Into<NodePath>>(mut self, path: P) -> Self {
        self.steps.push(Step::Group(path.into()));
        self
    }

    pub fn dataset<P: Into<NodePath>>(mut self, path: P, data: DataBuffer) -> Self {
        self.steps.push(Step::Dataset(path.into(), data));
        self
    }

    pub fn attr<P: Into<NodePath>>(mut self, path: P, key: &str, value: Value) -> Self {
        self.steps
            .push(Step::Attr(path.into(), key.to_string(), value));
        self
    }

    pub fn build(self) -> MemoryServer {
        let server = MemoryServer::new();
        for step in self.steps {
            match step {
                Step::File(name) => server.create_file(&name).unwrap(),
                Step::Group(path) => server.create_group(&path).unwrap(),
                Step::Dataset(path, data) => server.set_dataset(&path, data).unwrap(),
                Step::Attr(path, key, value) => {
                    let mut attrs = Attrs::new();
                    attrs.insert(key, value);
                    server.set_attrs(&path, &attrs).unwrap();
                }
            }
        }
        server
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::series;

    #[test]
    fn test_server_builder() {
        let server = ServerBuilder::new()
            .file("f.h5")
            .group(["f.h5", "g"])
            .dataset(["f.h5", "g", "x"], series(3))
            .attr(["f.h5", "g", "x"], "units", Value::from("V"))
            .build();

        let path = NodePath::from(["f.h5", "g", "x"]);
        assert_eq!(server.dataset(&path).unwrap().len(), 3);
        assert_eq!(server.attrs(&path).unwrap()["units"], Value::from("V"));
    }
}
