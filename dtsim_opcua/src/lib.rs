//! The OPC UA hardware-in-the-loop bridge.
//!
//! Maintains one client session per unique `endpoint_url`, a
//! subscription-driven latest-value cache for `Read` bindings, and issues
//! concurrent batched writes for `Write` bindings. The OPC UA client
//! (`opcua` crate) runs its own synchronous I/O thread per session; calls
//! into it are bridged onto the async step loop via
//! `tokio::task::spawn_blocking`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dtsim_common::value::Value;
use dtsim_model::types::{CommunicationBinding, Direction};
use opcua::client::prelude::{
    Client, ClientBuilder, DataChangeCallback, IdentityToken, MonitoredItemCreateRequest,
    ReadValueId, Session, TimestampsToReturn, Variant, WriteValue,
};
use opcua::sync::RwLock as OpcUaRwLock;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error type for OPC UA bridge operations.
///
/// Except for [`BridgeError::NoEndpointsAvailable`], these are all
/// non-fatal once the simulation is `Running`: the step loop logs and
/// continues with stale or empty external values.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// Every endpoint failed to connect; `Initialize` has nothing to serve.
    #[error("no OPC UA endpoint could be reached")]
    NoEndpointsAvailable,

    /// A single endpoint's connect attempt failed (logged, endpoint skipped).
    #[error("failed to connect to {endpoint}: {reason}")]
    ConnectFailed { endpoint: String, reason: String },

    /// A subscription or monitored-item creation failed for an otherwise
    /// connected endpoint.
    #[error("failed to subscribe on {endpoint}: {reason}")]
    SubscribeFailed { endpoint: String, reason: String },

    /// A read call against the latest-value cache's backing session failed.
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// A single binding's write failed.
    #[error("write failed for binding {binding_id}: {reason}")]
    WriteFailed { binding_id: u64, reason: String },
}

struct EndpointSession {
    session: Arc<OpcUaRwLock<Session>>,
    subscription_id: Option<u32>,
}

/// Per-simulation OPC UA bridge. Never shared across simulations — the
/// lifecycle manager allocates one per `SimulationState`.
pub struct OpcUaBridge {
    client: Client,
    sessions: HashMap<String, EndpointSession>,
    latest_values: Arc<RwLock<HashMap<u64, Value>>>,
    node_index: Arc<RwLock<HashMap<String, u64>>>,
    bindings_by_id: HashMap<u64, CommunicationBinding>,
    timeout: Duration,
}

impl OpcUaBridge {
    /// Build a bridge with no sessions yet; call [`OpcUaBridge::initialize`]
    /// to connect and subscribe.
    pub fn new(timeout: Duration) -> Result<Self, BridgeError> {
        let client = ClientBuilder::new()
            .application_name("dtsim")
            .application_uri("urn:dtsim:engine")
            .trust_server_certs(true)
            .create_sample_keypair(false)
            .session_retry_limit(0)
            .client()
            .ok_or_else(|| BridgeError::ConnectFailed {
                endpoint: "<client>".to_string(),
                reason: "failed to build OPC UA client".to_string(),
            })?;

        Ok(Self {
            client,
            sessions: HashMap::new(),
            latest_values: Arc::new(RwLock::new(HashMap::new())),
            node_index: Arc::new(RwLock::new(HashMap::new())),
            bindings_by_id: HashMap::new(),
            timeout,
        })
    }

    /// Connect one session per unique `endpoint_url` among `bindings`,
    /// subscribe to every `Read` binding's address (publishing interval
    /// `publish_interval`), and index the reverse node map.
    ///
    /// A partially failed endpoint is rolled back and the others proceed.
    /// Only when every endpoint fails to connect does this return
    /// [`BridgeError::NoEndpointsAvailable`].
    pub fn initialize(
        &mut self,
        bindings: &[CommunicationBinding],
        publish_interval: Duration,
    ) -> Result<(), BridgeError> {
        self.bindings_by_id = bindings.iter().map(|b| (b.id, b.clone())).collect();

        let mut endpoints: Vec<&str> = bindings.iter().map(|b| b.endpoint_url.as_str()).collect();
        endpoints.sort_unstable();
        endpoints.dedup();

        let mut any_connected = false;
        for endpoint_url in endpoints {
            let read_bindings: Vec<&CommunicationBinding> = bindings
                .iter()
                .filter(|b| b.endpoint_url == endpoint_url && b.direction == Direction::Read)
                .collect();

            match self.connect_endpoint(endpoint_url, &read_bindings, publish_interval) {
                Ok(()) => any_connected = true,
                Err(e) => warn!(endpoint = endpoint_url, error = %e, "endpoint setup failed, skipping"),
            }
        }

        if !any_connected {
            return Err(BridgeError::NoEndpointsAvailable);
        }
        Ok(())
    }

    fn connect_endpoint(
        &mut self,
        endpoint_url: &str,
        read_bindings: &[&CommunicationBinding],
        publish_interval: Duration,
    ) -> Result<(), BridgeError> {
        if let Some(existing) = self.sessions.get(endpoint_url) {
            if probe_session(&existing.session) {
                debug!(endpoint = endpoint_url, "reusing live session");
                return Ok(());
            }
            info!(endpoint = endpoint_url, "stale session detected, reconnecting");
            self.teardown_endpoint(endpoint_url);
        }

        let session = self
            .client
            .connect_to_endpoint(endpoint_url, IdentityToken::Anonymous)
            .map_err(|e| BridgeError::ConnectFailed {
                endpoint: endpoint_url.to_string(),
                reason: e.to_string(),
            })?;

        let subscription_id = if read_bindings.is_empty() {
            None
        } else {
            match self.subscribe(&session, endpoint_url, read_bindings, publish_interval) {
                Ok(id) => Some(id),
                Err(e) => {
                    let _ = session.write().disconnect();
                    return Err(e);
                }
            }
        };

        self.sessions.insert(
            endpoint_url.to_string(),
            EndpointSession { session, subscription_id },
        );
        Ok(())
    }

    fn subscribe(
        &self,
        session: &Arc<OpcUaRwLock<Session>>,
        endpoint_url: &str,
        read_bindings: &[&CommunicationBinding],
        publish_interval: Duration,
    ) -> Result<u32, BridgeError> {
        let latest_values = self.latest_values.clone();
        let node_index = self.node_index.clone();

        let subscription_id = session
            .write()
            .create_subscription(
                publish_interval.as_secs_f64() * 1000.0,
                10,
                30,
                0,
                0,
                true,
                DataChangeCallback::new(move |items| {
                    let index = node_index.read();
                    let mut values = latest_values.write();
                    for item in items {
                        let node_key = item.item_to_monitor().node_id.to_string();
                        match index.get(&node_key) {
                            Some(&binding_id) => {
                                if let Some(value) = item.last_value().value.clone() {
                                    values.insert(binding_id, variant_to_json(&value));
                                }
                            }
                            None => warn!(node = node_key, "data change for unmapped node, dropping"),
                        }
                    }
                }),
            )
            .map_err(|e| BridgeError::SubscribeFailed {
                endpoint: endpoint_url.to_string(),
                reason: e.to_string(),
            })?;

        let items_to_create: Vec<MonitoredItemCreateRequest> = read_bindings
            .iter()
            .map(|b| ReadValueId::from(opcua::types::NodeId::from_str_or_null(&b.address)).into())
            .collect();

        let results = session
            .write()
            .create_monitored_items(subscription_id, TimestampsToReturn::Both, &items_to_create)
            .map_err(|e| BridgeError::SubscribeFailed {
                endpoint: endpoint_url.to_string(),
                reason: e.to_string(),
            })?;

        let mut index = self.node_index.write();
        for (binding, _result) in read_bindings.iter().zip(results.iter()) {
            // Key by the NodeId's normalized `Display` form, not the raw
            // config string: the callback looks nodes up by
            // `item_to_monitor().node_id.to_string()`, and the two don't
            // always agree (e.g. `ns=0;i=2258` normalizes to `i=2258`).
            let node_key = opcua::types::NodeId::from_str_or_null(&binding.address).to_string();
            index.insert(node_key, binding.id);
        }

        Ok(subscription_id)
    }

    fn teardown_endpoint(&mut self, endpoint_url: &str) {
        if let Some(endpoint) = self.sessions.remove(endpoint_url) {
            let mut index = self.node_index.write();
            index.retain(|_, binding_id| {
                self.bindings_by_id
                    .get(binding_id)
                    .map(|b| b.endpoint_url != endpoint_url)
                    .unwrap_or(true)
            });
            let _ = endpoint.session.write().disconnect();
        }
    }

    /// A point-in-time snapshot of the latest-value cache.
    pub fn read(&self) -> HashMap<u64, Value> {
        self.latest_values.read().clone()
    }

    /// Group `batch` (keyed by binding id) by endpoint, infer an OPC UA
    /// variant type from each JSON value, and issue writes concurrently.
    /// Individual failures are logged; the call returns once every write
    /// has completed.
    pub async fn write(&self, batch: &HashMap<u64, Value>) {
        let mut by_endpoint: HashMap<String, Vec<(u64, &Value)>> = HashMap::new();
        for (&binding_id, value) in batch {
            let Some(binding) = self.bindings_by_id.get(&binding_id) else {
                continue;
            };
            by_endpoint
                .entry(binding.endpoint_url.clone())
                .or_default()
                .push((binding_id, value));
        }

        let mut tasks = Vec::new();
        for (endpoint_url, writes) in by_endpoint {
            let Some(endpoint) = self.sessions.get(&endpoint_url) else {
                warn!(endpoint = endpoint_url, "write batch references a disconnected endpoint");
                continue;
            };
            let session = endpoint.session.clone();
            let addresses: Vec<(u64, String, Value)> = writes
                .into_iter()
                .filter_map(|(binding_id, value)| {
                    self.bindings_by_id
                        .get(&binding_id)
                        .map(|b| (binding_id, b.address.clone(), value.clone()))
                })
                .collect();
            let timeout = self.timeout;

            tasks.push(tokio::task::spawn_blocking(move || {
                write_values(&session, &addresses, timeout)
            }));
        }

        for task in tasks {
            match task.await {
                Ok(Err(e)) => warn!(error = %e, "OPC UA write batch failed"),
                Err(e) => warn!(error = %e, "OPC UA write task panicked"),
                Ok(Ok(())) => {}
            }
        }
    }

    /// Disconnect every session concurrently and drop all internal state.
    /// Errors are logged only.
    pub async fn disconnect_all(&mut self) {
        let sessions: Vec<_> = self.sessions.drain().map(|(_, s)| s.session).collect();
        let tasks: Vec<_> = sessions
            .into_iter()
            .map(|session| {
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = session.write().disconnect() {
                        warn!(error = %e, "error disconnecting OPC UA session");
                    }
                })
            })
            .collect();

        for task in tasks {
            let _ = task.await;
        }

        self.node_index.write().clear();
        self.latest_values.write().clear();
        self.bindings_by_id.clear();
    }

    /// Whether any session is currently held.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn probe_session(session: &Arc<OpcUaRwLock<Session>>) -> bool {
    session.read().get_endpoints().is_ok()
}

fn write_values(
    session: &Arc<OpcUaRwLock<Session>>,
    addresses: &[(u64, String, Value)],
    timeout: Duration,
) -> Result<(), BridgeError> {
    let nodes_to_write: Vec<WriteValue> = addresses
        .iter()
        .map(|(_, address, value)| {
            let node_id = opcua::types::NodeId::from_str_or_null(address);
            WriteValue::from((node_id, json_to_variant(value)))
        })
        .collect();

    let deadline_secs = timeout.as_secs_f64();
    let statuses = session
        .write()
        .write(&nodes_to_write)
        .map_err(|e| BridgeError::WriteFailed {
            binding_id: addresses.first().map(|(id, _, _)| *id).unwrap_or(0),
            reason: format!("{e} (budget {deadline_secs}s)"),
        })?;

    for ((binding_id, _, _), status) in addresses.iter().zip(statuses.iter()) {
        if status.is_bad() {
            warn!(binding_id, status = %status, "OPC UA write rejected for node");
        }
    }
    Ok(())
}

fn json_to_variant(value: &Value) -> Variant {
    match value {
        Value::Bool(b) => Variant::Boolean(*b),
        Value::Number(n) if n.is_i64() => Variant::Int64(n.as_i64().unwrap_or_default()),
        Value::Number(n) => Variant::Double(n.as_f64().unwrap_or_default()),
        Value::String(s) => Variant::String(s.clone().into()),
        other => Variant::String(other.to_string().into()),
    }
}

fn variant_to_json(variant: &Variant) -> Value {
    match variant {
        Variant::Boolean(b) => Value::Bool(*b),
        Variant::Int32(i) => Value::from(*i),
        Variant::Int64(i) => Value::from(*i),
        Variant::UInt32(i) => Value::from(*i),
        Variant::UInt64(i) => Value::from(*i),
        Variant::Float(f) => Value::from(*f as f64),
        Variant::Double(d) => Value::from(*d),
        Variant::String(s) => Value::String(s.to_string()),
        other => Value::String(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_to_variant_maps_bool_int_float_string() {
        assert!(matches!(json_to_variant(&json!(true)), Variant::Boolean(true)));
        assert!(matches!(json_to_variant(&json!(42)), Variant::Int64(42)));
        assert!(matches!(json_to_variant(&json!(1.5)), Variant::Double(d) if (d - 1.5).abs() < 1e-9));
        assert!(matches!(json_to_variant(&json!("on")), Variant::String(_)));
    }

    #[test]
    fn variant_to_json_roundtrips_primitives() {
        assert_eq!(variant_to_json(&Variant::Boolean(true)), json!(true));
        assert_eq!(variant_to_json(&Variant::Double(3.5)), json!(3.5));
        assert_eq!(variant_to_json(&Variant::Int32(7)), json!(7));
    }
}
