//! Application context and event loop
//!
//! [`App`] is the session object: it owns the [`Mirror`], the
//! [`ConnectionSupervisor`] and the receiving end of the published
//! interface. Everything runs on the thread that calls [`App::run`] (or
//! [`App::process_pending`]); other threads only ever send into channels.
//!
//! # Event Sources
//!
//! | Channel | Handled by |
//! |---|---|
//! | remote events, node targets | [`Mirror::dispatch`] |
//! | remote events, session target | [`ConnectionSupervisor::handle_session_event`] |
//! | interface calls | [`handle_call`] |
//! | liveness ticks | [`ConnectionSupervisor::check_connection`] |

use crate::config::AppConfig;
use crate::connection::{handle_call, ConnectionSupervisor, InterfaceCall, ShutdownRequest};
use crate::display::DisplaySurfaces;
use crate::error::Result;
use crate::mirror::Mirror;
use crate::remote::{Connector, Envelope, EventTarget};
use crossbeam_channel::{never, select, unbounded, Receiver, Sender};

/// The session/context object
pub struct App {
    config: AppConfig,
    mirror: Mirror,
    supervisor: ConnectionSupervisor,
    interface_tx: Sender<InterfaceCall>,
    interface_rx: Receiver<InterfaceCall>,
}

impl App {
    pub fn new(
        config: AppConfig,
        connector: Box<dyn Connector>,
        surfaces: Box<dyn DisplaySurfaces>,
    ) -> Self {
        let supervisor = ConnectionSupervisor::new(&config, connector);
        let (interface_tx, interface_rx) = unbounded();
        Self {
            config,
            mirror: Mirror::new(surfaces),
            supervisor,
            interface_tx,
            interface_rx,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    pub fn mirror_mut(&mut self) -> &mut Mirror {
        &mut self.mirror
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    /// Sender for local consumers of the plot interface
    pub fn interface(&self) -> Sender<InterfaceCall> {
        self.interface_tx.clone()
    }

    /// Publish the interface, then try to connect. An unreachable data
    /// server leaves the app disconnected rather than failing.
    pub fn start(&mut self) -> Result<()> {
        self.supervisor.publish(self.interface_tx.clone())?;
        if let Err(e) = self.connect() {
            if e.is_timeout() {
                tracing::warn!("Data server not reachable: {}", e);
            } else {
                self.mirror.report("Connect", &e);
            }
        }
        Ok(())
    }

    pub fn connect(&mut self) -> Result<()> {
        self.supervisor.connect(&mut self.mirror)
    }

    pub fn disconnect(&mut self) {
        self.supervisor.disconnect(&mut self.mirror);
    }

    /// Ask the data server to open a file
    pub fn open_file(&mut self, filename: &str) {
        if let Err(e) = self.supervisor.open_file(filename) {
            self.mirror.report(&format!("Open {}", filename), &e);
        }
    }

    /// Run a UI-driven operation, turning a failure into an operator report
    pub fn perform<T>(&mut self, title: &str, op: impl FnOnce(&mut Mirror) -> Result<T>) -> Option<T> {
        match op(&mut self.mirror) {
            Ok(value) => Some(value),
            Err(e) => {
                self.mirror.report(title, &e);
                None
            }
        }
    }

    fn handle_envelope(&mut self, envelope: Envelope) {
        let kind = envelope.event.kind();
        let result = match envelope.target {
            EventTarget::Session if envelope.epoch == self.mirror.epoch() => self
                .supervisor
                .handle_session_event(&mut self.mirror, envelope.event),
            EventTarget::Session => {
                tracing::debug!("Discarding {} from epoch {}", kind, envelope.epoch);
                Ok(())
            }
            EventTarget::Node(_) => self.mirror.dispatch(envelope),
        };
        if let Err(e) = result {
            self.mirror.report(&format!("Failed to apply {}", kind), &e);
        }
    }

    /// Handle everything already queued without blocking. Returns a shutdown
    /// request if `quit` was among the calls.
    pub fn process_pending(&mut self) -> Option<ShutdownRequest> {
        loop {
            let mut progressed = false;

            while let Ok(envelope) = self.mirror.events().try_recv() {
                self.handle_envelope(envelope);
                progressed = true;
            }
            while let Ok(call) = self.interface_rx.try_recv() {
                if let Some(request) = handle_call(&mut self.mirror, call) {
                    return Some(request);
                }
                progressed = true;
            }
            if self.supervisor.probe().is_some_and(|p| p.try_recv().is_ok()) {
                self.supervisor.check_connection(&mut self.mirror);
                progressed = true;
            }

            if !progressed {
                return None;
            }
        }
    }

    /// Block on every event source until `quit` is called
    pub fn run(&mut self) -> ShutdownRequest {
        tracing::info!("Entering event loop");
        let events = self.mirror.events().clone();
        let interface = self.interface_rx.clone();
        loop {
            let probe = self.supervisor.probe().cloned().unwrap_or_else(never);
            select! {
                recv(events) -> envelope => {
                    if let Ok(envelope) = envelope {
                        self.handle_envelope(envelope);
                    }
                }
                recv(interface) -> call => {
                    if let Ok(call) = call {
                        if let Some(request) = handle_call(&mut self.mirror, call) {
                            tracing::info!("Leaving event loop: {}", request.reason);
                            return request;
                        }
                    }
                }
                recv(probe) -> _ => {
                    self.supervisor.check_connection(&mut self.mirror);
                }
            }
        }
    }
}
