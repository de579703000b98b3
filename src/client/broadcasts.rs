//! Routes unsolicited broadcasts into state mutations.
//!
//! | Channel | Mutation |
//! |---------|----------|
//! | `models:list` | replace `models` |
//! | `models:status` | merge status into the model with `modelId` |
//! | `models:created` | append to `models` |
//! | `models:updated` | replace the model with the same `id` |
//! | `models:deleted` | remove the model with `modelId` |
//! | `models:scanned` | none, hooks only |
//! | `models:router-stopped` | clear `routerStatus`, mark every model `unloaded` |
//! | `llama:status` | replace `llamaServerStatus` |
//! | `metrics:update` | replace `metrics`, append to `metricsHistory` |
//! | `logs:entry` | prepend to `logs` |
//!
//! Hooks registered with [`BroadcastHooks::on`] run after the mutation and
//! receive the broadcast's `data` object.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::{Map, Value, json};
use tracing::{debug, trace};

use crate::protocol::{BroadcastChannel, BroadcastEnvelope, ParsedBroadcast};
use crate::state::bounded::{append_capped, prepend_capped};
use crate::state::{StateStore, keys, structural_eq};
use crate::transport::{Registration, Transport};

// ============================================================================
// Constants
// ============================================================================

/// Status written into every model when the router stops.
pub const UNLOADED_STATUS: &str = "unloaded";

/// Field added to each metrics history sample.
pub const SAMPLE_TIMESTAMP_FIELD: &str = "ts";

// ============================================================================
// BroadcastHooks
// ============================================================================

/// Side-effect callback for one channel.
pub type BroadcastHook = Arc<dyn Fn(&Value) + Send + Sync>;

/// Per-channel side-effect callbacks.
#[derive(Default)]
pub struct BroadcastHooks {
    hooks: RwLock<FxHashMap<BroadcastChannel, Vec<BroadcastHook>>>,
}

impl fmt::Debug for BroadcastHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hooks = self.hooks.read();
        let mut map = f.debug_map();
        for (channel, list) in hooks.iter() {
            map.entry(&channel.as_str(), &list.len());
        }
        map.finish()
    }
}

impl BroadcastHooks {
    /// Adds `hook` for `channel`.
    pub fn on<F>(&self, channel: BroadcastChannel, hook: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.hooks
            .write()
            .entry(channel)
            .or_default()
            .push(Arc::new(hook));
    }

    /// Runs every hook for `channel` in registration order.
    ///
    /// Returns the number of hooks run.
    pub fn fire(&self, channel: BroadcastChannel, data: &Value) -> usize {
        let targets: Vec<BroadcastHook> = match self.hooks.read().get(&channel) {
            Some(list) => list.clone(),
            None => return 0,
        };

        for hook in &targets {
            hook(data);
        }
        targets.len()
    }

    /// Returns the number of hooks for `channel`.
    #[must_use]
    pub fn count(&self, channel: BroadcastChannel) -> usize {
        self.hooks.read().get(&channel).map_or(0, Vec::len)
    }
}

// ============================================================================
// BroadcastRouter
// ============================================================================

struct BroadcastCore {
    store: StateStore,
    hooks: BroadcastHooks,
    metrics_history_cap: usize,
    log_cap: usize,
}

struct Attached {
    transport: Arc<dyn Transport>,
    registrations: Vec<Registration>,
}

/// Applies broadcasts to the state store.
pub struct BroadcastRouter {
    core: Arc<BroadcastCore>,
    attached: Mutex<Option<Attached>>,
}

impl fmt::Debug for BroadcastRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastRouter")
            .field("hooks", &self.core.hooks)
            .field("attached", &self.attached.lock().is_some())
            .finish()
    }
}

impl BroadcastRouter {
    /// Creates a router writing into `store`.
    #[must_use]
    pub fn new(store: StateStore, metrics_history_cap: usize, log_cap: usize) -> Self {
        Self {
            core: Arc::new(BroadcastCore {
                store,
                hooks: BroadcastHooks::default(),
                metrics_history_cap,
                log_cap,
            }),
            attached: Mutex::new(None),
        }
    }

    /// Returns the hook table.
    #[inline]
    #[must_use]
    pub fn hooks(&self) -> &BroadcastHooks {
        &self.core.hooks
    }

    /// Registers a handler for every channel on `transport`.
    ///
    /// A previously attached transport is released first.
    pub fn attach(&self, transport: Arc<dyn Transport>) {
        self.detach();

        let registrations = BroadcastChannel::ALL
            .into_iter()
            .map(|channel| {
                let core = Arc::clone(&self.core);
                Registration::add(
                    transport.as_ref(),
                    channel.as_str(),
                    Arc::new(move |payload: &Value| {
                        core.route(channel, payload);
                    }),
                )
            })
            .collect();

        debug!("Broadcast router attached");
        *self.attached.lock() = Some(Attached {
            transport,
            registrations,
        });
    }

    /// Removes every handler from the attached transport.
    pub fn detach(&self) {
        let attached = self.attached.lock().take();
        if let Some(attached) = attached {
            for registration in &attached.registrations {
                registration.remove(attached.transport.as_ref());
            }
        }
    }

    /// Applies `payload` received on `channel`.
    ///
    /// Returns `false` if the payload is not a broadcast.
    pub fn route(&self, channel: BroadcastChannel, payload: &Value) -> bool {
        self.core.route(channel, payload)
    }
}

impl BroadcastCore {
    fn route(&self, channel: BroadcastChannel, payload: &Value) -> bool {
        let Some(envelope) = BroadcastEnvelope::from_value(channel, payload) else {
            trace!(%channel, "Ignoring non-broadcast payload");
            return false;
        };

        trace!(%channel, "Broadcast received");
        self.apply(envelope.parse());
        self.hooks.fire(channel, &envelope.data);
        true
    }

    fn apply(&self, broadcast: ParsedBroadcast) {
        match broadcast {
            ParsedBroadcast::ModelsList { models } => {
                self.store.set(keys::MODELS, Value::Array(models));
            }

            ParsedBroadcast::ModelStatus {
                model_id,
                status,
                model,
            } => {
                let Some(model_id) = model_id else {
                    return;
                };
                self.update_models(|models| {
                    for entry in models.iter_mut() {
                        if !has_id(entry, &model_id) {
                            continue;
                        }
                        if let Value::Object(fields) = entry {
                            if let Some(status) = &status {
                                fields.insert("status".to_string(), status.clone());
                            }
                            for (key, value) in &model {
                                fields.insert(key.clone(), value.clone());
                            }
                        }
                    }
                });
            }

            ParsedBroadcast::ModelCreated { model } => {
                let Some(model) = model else {
                    return;
                };
                self.update_models(|models| models.push(model));
            }

            ParsedBroadcast::ModelUpdated { model } => {
                let Some(id) = model.as_ref().and_then(|m| m.get("id")).cloned() else {
                    return;
                };
                let Some(model) = model else {
                    return;
                };
                self.update_models(|models| {
                    for entry in models.iter_mut() {
                        if has_id(entry, &id) {
                            *entry = model.clone();
                        }
                    }
                });
            }

            ParsedBroadcast::ModelDeleted { model_id } => {
                let Some(model_id) = model_id else {
                    return;
                };
                self.update_models(|models| models.retain(|m| !has_id(m, &model_id)));
            }

            ParsedBroadcast::ModelsScanned { summary } => {
                debug!(%summary, "Model scan complete");
            }

            ParsedBroadcast::RouterStopped => {
                debug!("Router stopped, marking models unloaded");
                self.store.set(keys::ROUTER_STATUS, Value::Null);
                self.update_models(|models| {
                    for entry in models.iter_mut() {
                        if let Value::Object(fields) = entry {
                            fields.insert("status".to_string(), json!(UNLOADED_STATUS));
                        }
                    }
                });
            }

            ParsedBroadcast::LlamaStatus { status } => {
                self.store.set(keys::LLAMA_SERVER_STATUS, status);
            }

            ParsedBroadcast::MetricsUpdate { metrics } => {
                let sample = timestamped(&metrics);
                let history = append_capped(
                    self.store.get(keys::METRICS_HISTORY).as_ref(),
                    sample,
                    self.metrics_history_cap,
                );
                self.store.set(keys::METRICS, metrics);
                self.store.set(keys::METRICS_HISTORY, history);
            }

            ParsedBroadcast::LogEntry { entry } => {
                let Some(entry) = entry else {
                    return;
                };
                let logs = prepend_capped(self.store.get(keys::LOGS).as_ref(), entry, self.log_cap);
                self.store.set(keys::LOGS, logs);
            }
        }
    }

    /// Rewrites the `models` list through `mutate`.
    fn update_models(&self, mutate: impl FnOnce(&mut Vec<Value>)) {
        let mut models = match self.store.get(keys::MODELS) {
            Some(Value::Array(models)) => models,
            _ => Vec::new(),
        };
        mutate(&mut models);
        self.store.set(keys::MODELS, Value::Array(models));
    }
}

fn has_id(model: &Value, id: &Value) -> bool {
    model.get("id").is_some_and(|own| structural_eq(own, id))
}

/// Copies the sample's fields and stamps it with the capture time.
fn timestamped(metrics: &Value) -> Value {
    let mut sample = match metrics {
        Value::Object(fields) => fields.clone(),
        _ => Map::new(),
    };
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    sample.insert(SAMPLE_TIMESTAMP_FIELD.to_string(), json!(millis));
    Value::Object(sample)
}

// ============================================================================
// Tests
// ============================================================================
