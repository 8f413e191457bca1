//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use ndarray::{ArrayD, IxDyn};
use plotmirror_rs::{
    app::App, config::AppConfig, display::headless::HeadlessDisplay, mirror::MirrorNotice,
    remote::memory::MemoryServer, DataBuffer,
};

/// 1-D buffer `0, 1, .., n-1`
pub fn series(n: usize) -> DataBuffer {
    ArrayD::from_shape_fn(IxDyn(&[n]), |i| i[0] as f64)
}

/// Buffer of the given shape filled with `value`
pub fn filled(shape: &[usize], value: f64) -> DataBuffer {
    ArrayD::from_elem(IxDyn(shape), value)
}

/// Config with a probe bound short enough for tests
pub fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.liveness.interval_ms = 10;
    config.liveness.timeout_ms = 1;
    config
}

/// An app wired to an in-process server and a headless display
pub struct Rig {
    pub server: MemoryServer,
    pub app: App,
    pub display: HeadlessDisplay,
}

impl Rig {
    /// Build the rig and start the app (publish + connect)
    pub fn start(server: MemoryServer) -> Self {
        let display = HeadlessDisplay::new();
        let mut app = App::new(
            fast_config(),
            Box::new(server.connector()),
            Box::new(display.clone()),
        );
        app.start().unwrap();
        Self {
            server,
            app,
            display,
        }
    }

    /// Apply everything the server has sent so far
    pub fn settle(&mut self) {
        assert!(self.app.process_pending().is_none(), "unexpected shutdown");
    }

    /// Drain and return pending notices
    pub fn notices(&self) -> Vec<MirrorNotice> {
        self.app.mirror().notices().try_iter().collect()
    }
}
