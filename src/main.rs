//! PlotMirror - Demo Entry Point
//!
//! Starts an in-process data server with sample files, mirrors it and prints
//! the mirrored tree. With `--serve` the event loop keeps running until the
//! published interface receives `quit`.

use anyhow::Context;
use ndarray::{ArrayD, IxDyn};
use plotmirror_rs::{
    app::App,
    config::AppConfig,
    display::headless::HeadlessDisplay,
    remote::memory::MemoryServer,
    types::{Attrs, NodePath},
};
use serde_json::json;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn sample_server() -> anyhow::Result<MemoryServer> {
    let server = MemoryServer::new();
    server.create_file("run1.h5")?;

    let trace = NodePath::from(["run1.h5", "trace"]);
    server.set_dataset(
        &trace,
        ArrayD::from_shape_fn(IxDyn(&[100]), |i| (i[0] as f64 * 0.1).sin()),
    )?;
    let mut attrs = Attrs::new();
    attrs.insert("title".into(), json!("Photodiode"));
    attrs.insert("ylabel".into(), json!("V"));
    server.set_attrs(&trace, &attrs)?;

    let scan = NodePath::from(["run1.h5", "scan"]);
    server.create_group(&scan)?;
    server.set_dataset(
        &scan.child("image"),
        ArrayD::from_shape_fn(IxDyn(&[32, 32]), |i| (i[0] * i[1]) as f64),
    )?;

    let sweep = scan.child("sweep");
    server.set_dataset(
        &sweep,
        ArrayD::from_shape_fn(IxDyn(&[50, 2]), |i| {
            if i[1] == 0 {
                i[0] as f64
            } else {
                (i[0] as f64).sqrt()
            }
        }),
    )?;
    let mut attrs = Attrs::new();
    attrs.insert("parametric".into(), json!(true));
    server.set_attrs(&sweep, &attrs)?;

    Ok(server)
}

fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,plotmirror_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting PlotMirror demo");

    let serve = std::env::args().any(|arg| arg == "--serve");
    let config = AppConfig::load_or_default();
    let server = sample_server().context("Failed to build sample data server")?;
    let display = HeadlessDisplay::new();

    let mut app = App::new(config, Box::new(server.connector()), Box::new(display.clone()));
    app.start().context("Failed to start")?;
    app.process_pending();

    println!("{}", app.supervisor().status_text());
    print!("{}", display.render_tree());

    if serve {
        let request = app.run();
        tracing::info!("Shutting down: {}", request.reason);
    }
    Ok(ExitCode::SUCCESS)
}
