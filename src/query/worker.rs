//! Per-connection streaming session.

use super::command::{Command, EventMessage};
use super::connection::{Connection, Frame};
use crate::error::SessionError;
use crate::graph::GraphManager;
use crate::stream::{StreamEvent, Subscription};
use crate::types::SUPERVISOR_PREFIX;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Session settings.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Entity-name prefix of the supervisor that emits lifecycle events.
    pub lifecycle_prefix: String,
    /// Subscription ID under which lifecycle events are forwarded.
    pub lifecycle_subscription_id: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            lifecycle_prefix: SUPERVISOR_PREFIX.to_string(),
            lifecycle_subscription_id: "_all".to_string(),
        }
    }
}

/// Write half shared with subscription callbacks.
struct Outbound<C> {
    conn: Arc<C>,
    /// Serializes frames from concurrent subscription threads.
    write_lock: Mutex<()>,
}

impl<C: Connection> Outbound<C> {
    fn forward(&self, event: &StreamEvent, sub: &str) {
        let data = match event.event.body_json() {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "failed to convert event to JSON");
                return;
            }
        };
        let message = EventMessage {
            kind: event.event.type_name(),
            sub,
            data,
        };
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to convert event to JSON");
                return;
            }
        };

        let _guard = self.write_lock.lock();
        if let Err(e) = self.conn.write_text(&text) {
            debug!(peer = %self.conn.peer(), sub, error = %e, "dropping event for closed connection");
        }
    }
}

/// Serves one client: forwards graph lifecycle events, and the events of
/// every graph the client subscribes to, until the connection ends.
pub struct StreamWorker<C: Connection> {
    conn: Arc<C>,
    outbound: Arc<Outbound<C>>,
    manager: Arc<GraphManager>,
    /// Active subscriptions by graph ID (or the lifecycle ID).
    subscriptions: HashMap<String, Subscription>,
    config: WorkerConfig,
    closed: bool,
}

impl<C: Connection> StreamWorker<C> {
    pub fn new(conn: C, manager: Arc<GraphManager>) -> Self {
        Self::with_config(conn, manager, WorkerConfig::default())
    }

    pub fn with_config(conn: C, manager: Arc<GraphManager>, config: WorkerConfig) -> Self {
        let conn = Arc::new(conn);
        Self {
            outbound: Arc::new(Outbound {
                conn: Arc::clone(&conn),
                write_lock: Mutex::new(()),
            }),
            conn,
            manager,
            subscriptions: HashMap::new(),
            config,
            closed: false,
        }
    }

    /// Run the session to completion.
    ///
    /// Returns `Ok` when the client closes the connection and the failure
    /// otherwise. Either way every subscription is released before this
    /// returns.
    pub fn run(mut self) -> Result<(), SessionError> {
        let peer = self.conn.peer();
        info!(%peer, "streaming session started");

        self.subscribe_lifecycle();
        let result = self.command_loop();

        match &result {
            Ok(()) => info!(%peer, "streaming session closed"),
            Err(e) => warn!(%peer, error = %e, "streaming session failed"),
        }
        self.close();
        result
    }

    fn subscribe_lifecycle(&mut self) {
        let prefix = self.config.lifecycle_prefix.clone();
        let sub_id = self.config.lifecycle_subscription_id.clone();
        let outbound = Arc::clone(&self.outbound);
        let forward_id = sub_id.clone();

        let subscription = self.manager.stream_new_events(
            move |e| e.entity_name.starts_with(&prefix) && e.event.is_lifecycle(),
            move |e| outbound.forward(e, &forward_id),
        );
        self.subscriptions.insert(sub_id, subscription);
    }

    fn command_loop(&mut self) -> Result<(), SessionError> {
        loop {
            match self.conn.read_frame()? {
                Frame::Text(text) => {
                    let command = Command::parse(&text)?;
                    self.handle(command)?;
                }
                Frame::Close => return Ok(()),
                Frame::Other => {}
            }
        }
    }

    fn handle(&mut self, command: Command) -> Result<(), SessionError> {
        match command {
            Command::Subscribe { graph_id } => {
                if self.subscriptions.contains_key(&graph_id) {
                    return Ok(());
                }
                info!(peer = %self.conn.peer(), %graph_id, "subscribed to graph");

                let outbound = Arc::clone(&self.outbound);
                let sub_id = graph_id.clone();
                let subscription = self.manager.subscribe_graph_events(
                    &graph_id,
                    0,
                    move |e| outbound.forward(e, &sub_id),
                )?;
                self.subscriptions.insert(graph_id, subscription);
            }
            Command::Unsubscribe { graph_id } => {
                if let Some(subscription) = self.subscriptions.remove(&graph_id) {
                    debug!(peer = %self.conn.peer(), %graph_id, "unsubscribed from graph");
                    self.manager.unsubscribe_stream(&subscription);
                }
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        for (id, subscription) in self.subscriptions.drain() {
            debug!(peer = %self.conn.peer(), stream = %id, "unsubscribing");
            self.manager.unsubscribe_stream(&subscription);
        }
        self.conn.close();
    }
}

impl<C: Connection> Drop for StreamWorker<C> {
    fn drop(&mut self) {
        self.close();
    }
}
