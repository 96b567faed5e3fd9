//! [`ManualControlBridge`] – the entry point the connection layer talks to.
//!
//! The bridge ties together the client lock, the lifecycle monitor, the
//! thread-backed scheduler, the command router and the outbound notifier.
//! Every inbound message ends up in
//! [`handle_request`][ManualControlBridge::handle_request] and leaves as a
//! [`Response`] envelope:
//!
//! ```json
//! {"ok": true,  "result": {"handle": 0}}
//! {"ok": false, "error": {"kind": "unknown_handle", "message": "Unknown handle id 4"}}
//! ```

use std::sync::Arc;

use mancon_hal::{BusTransport, ModuleEvent, ModuleEventSink, ModuleId};
use mancon_kernel::{Acquired, ClientLock, LifecycleMonitor, ProgramScheduler, TaskQueue};
use mancon_types::{
    ClientConnection, ClientId, ControlError, ErrorResponse, LifecycleState, Notification, Outbound,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::commands;
use crate::config::BridgeConfig;
use crate::dispatch::Router;
use crate::notify::ClientNotifier;
use crate::scheduler::{HARDWARE_THREAD_NAME, ThreadScheduler};
use crate::session::ManualControlSession;

pub const START: &str = "start";
pub const STOP: &str = "stop";

/// Response envelope for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

impl From<Result<Value, ControlError>> for Response {
    fn from(outcome: Result<Value, ControlError>) -> Self {
        match outcome {
            Ok(result) => Self {
                ok: true,
                result: Some(result),
                error: None,
            },
            Err(err) => Self {
                ok: false,
                result: None,
                error: Some(ErrorResponse::from(&err)),
            },
        }
    }
}

/// Result of a successful `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResult {
    pub api_version: u32,
}

/// Snapshot for observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub state: LifecycleState,
    pub allowed_client: Option<ClientId>,
    pub active_program: String,
    /// `None` when the hardware thread was too busy to count them.
    pub open_handles: Option<usize>,
}

pub struct ManualControlBridge {
    lock: ClientLock,
    lifecycle: Arc<LifecycleMonitor>,
    session: ManualControlSession,
    router: Router,
    notifier: Arc<dyn ClientNotifier>,
    config: BridgeConfig,
    scheduler: ThreadScheduler,
}

impl ManualControlBridge {
    /// Build a bridge over `transport` and subscribe it to the transport's
    /// module events.
    pub fn new(
        transport: Arc<dyn BusTransport>,
        config: BridgeConfig,
        notifier: Arc<dyn ClientNotifier>,
    ) -> Arc<Self> {
        let lifecycle = Arc::new(LifecycleMonitor::new(config.ownership_timeout()));
        let queue = Arc::new(TaskQueue::new());
        let scheduler = ThreadScheduler::new(
            lifecycle.clone(),
            queue.clone(),
            transport.clone(),
            config.clone(),
        );
        let bridge = Arc::new(Self {
            lock: ClientLock::new(),
            session: ManualControlSession::new(lifecycle.clone(), queue),
            lifecycle,
            router: commands::router(),
            notifier,
            config,
            scheduler,
        });
        let sink: Arc<dyn ModuleEventSink> = bridge.clone();
        transport.set_event_sink(Arc::downgrade(&sink));
        bridge
    }

    pub fn scheduler(&self) -> &ThreadScheduler {
        &self.scheduler
    }

    /// Handle one inbound message from `client`.
    pub fn handle_request(
        &self,
        client: &ClientConnection,
        command: &str,
        payload: Value,
    ) -> Response {
        let outcome = self.route(client, command, payload);
        if let Err(err) = &outcome {
            debug!(
                client = %client.id,
                command,
                kind = ?err.kind(),
                error = %err,
                "request failed"
            );
        }
        Response::from(outcome)
    }

    fn route(
        &self,
        client: &ClientConnection,
        command: &str,
        payload: Value,
    ) -> Result<Value, ControlError> {
        match command {
            START => {
                let started = self.start(client)?;
                serde_json::to_value(started).map_err(|e| ControlError::Internal(e.to_string()))
            }
            STOP => {
                if self.lock.holder().is_some() {
                    self.lock.check(&client.id)?;
                }
                self.stop();
                Ok(Value::Null)
            }
            _ => {
                if !self.router.contains(command) {
                    return Err(ControlError::invalid(
                        "command",
                        format!("unknown command '{command}'"),
                    ));
                }
                self.lock.check(&client.id)?;
                self.router.dispatch(&self.session, command, payload)
            }
        }
    }

    /// Lock the bridge to `client` and make manual control the active
    /// program.  Idempotent for the client already holding the lock.
    pub fn start(&self, client: &ClientConnection) -> Result<StartResult, ControlError> {
        let acquired = self.lock.acquire(client)?;
        if let Err(err) = self.lifecycle.request_ownership(&self.scheduler) {
            if acquired == Acquired::Fresh {
                self.lock.release_if_held_by(&client.id);
            }
            warn!(client = %client.id, error = %err, "manual control could not start");
            return Err(err);
        }
        if self.lock.holder().as_ref() != Some(&client.id) {
            if self.lock.holder().is_none() {
                self.scheduler.stop_manual_control();
            }
            return Err(ControlError::SessionEnded(
                "manual control was stopped while it was starting".to_string(),
            ));
        }
        if acquired == Acquired::Fresh {
            info!(client = %client.id, "manual control started");
        }
        Ok(StartResult {
            api_version: self.config.api_version,
        })
    }

    /// End the session: notify the allowed client, clear the lock and stop
    /// the manual-control program.  Idempotent.
    pub fn stop(&self) {
        self.end_session("manual control stopped");
    }

    /// Connection-layer hook: `client` went away.
    pub fn on_client_disconnected(&self, client: &ClientId) {
        if self.lock.holder().as_ref() == Some(client) {
            info!(%client, "allowed client disconnected");
            self.end_session("client disconnected");
        }
    }

    /// Let a foreign program take over, ending any manual-control session.
    pub fn preempt(&self, program: &str) {
        self.end_session(&format!("program '{program}' took over the robot"));
        self.scheduler.start_foreign_program(program);
    }

    /// Stop the foreign program started by [`preempt`][Self::preempt].
    pub fn release_preemption(&self) {
        self.scheduler.stop_foreign_program();
    }

    /// Forward `event` about `module` to the allowed client, keyed by every
    /// handle id that wraps it.
    fn forward_module_event(
        &self,
        module: ModuleId,
        event: ModuleEvent,
    ) -> Result<(), ControlError> {
        if std::thread::current().name() == Some(HARDWARE_THREAD_NAME) {
            return Err(ControlError::Internal(
                "module events cannot be raised on the hardware-owning thread".to_string(),
            ));
        }
        let Some(client) = self.lock.holder() else {
            return Ok(());
        };
        let handles = self
            .session
            .run(true, move |ctx| Ok(ctx.handles().handles_for(module)))?;
        if handles.is_empty() {
            debug!(%module, ?event, "module event for a module with no open handles");
            return Ok(());
        }
        let notification = match event {
            ModuleEvent::StatusChanged => Notification::HardwareStatusChanged { handles },
            ModuleEvent::AddressChanged { new_address } => Notification::AddressChanged {
                handles,
                new_address,
            },
        };
        self.notifier.notify(&client, Outbound::new(notification));
        Ok(())
    }

    pub fn status(&self) -> BridgeStatus {
        let state = self.lifecycle.state();
        let open_handles = if state == LifecycleState::ManualControlOwner {
            self.session
                .query(self.config.device_timeout(), |ctx| Ok(ctx.handles().len()))
                .inspect_err(|err| debug!(error = %err, "could not count open handles"))
                .ok()
        } else {
            Some(0)
        };
        BridgeStatus {
            state,
            allowed_client: self.lock.holder(),
            active_program: self.scheduler.active_program(),
            open_handles,
        }
    }

    fn end_session(&self, reason: &str) {
        if let Some(client) = self.lock.release() {
            info!(%client, reason, "manual control session ended");
            self.notifier.notify(
                &client,
                Outbound::new(Notification::SessionEnded {
                    reason: reason.to_string(),
                }),
            );
        }
        self.scheduler.stop_manual_control();
    }
}

impl ModuleEventSink for ManualControlBridge {
    fn on_module_event(&self, module: ModuleId, event: ModuleEvent) {
        if let Err(err) = self.forward_module_event(module, event) {
            debug!(%module, ?event, error = %err, "module event not forwarded");
        }
    }
}
