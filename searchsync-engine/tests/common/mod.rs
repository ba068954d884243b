//! Shared test helpers: an in-process search node speaking the subset of the
//! HTTP API the engine uses.

#![allow(dead_code)]

use async_trait::async_trait;
use searchsync_engine::{
    EngineConfig, HttpRequest, Method, RawReply, RetryPolicy, Transport, TransportError,
    TransportErrorKind,
};
use searchsync_types::{CollectionDescriptor, Document};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

type Docs = BTreeMap<String, Value>;

#[derive(Default, Clone)]
struct NodeState {
    indices: BTreeMap<String, Docs>,
    /// alias -> indices carrying it
    aliases: BTreeMap<String, BTreeSet<String>>,
}

struct Fault {
    method: Method,
    path_contains: String,
    remaining: u32,
    kind: TransportErrorKind,
}

/// One request as seen by the node.
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: Method,
    pub path: String,
    pub body: Option<String>,
}

/// A stateful in-memory search node.
#[derive(Default)]
pub struct FakeNode {
    state: Mutex<NodeState>,
    faults: Mutex<Vec<Fault>>,
    seen: Mutex<Vec<Seen>>,
    bulk_delay: Mutex<Option<Duration>>,
    fail_acks: Mutex<BTreeSet<String>>,
    reject_bulk: Mutex<bool>,
}

impl FakeNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `times` requests matching `method` and `path_contains`.
    pub fn fail_next(
        &self,
        method: Method,
        path_contains: &str,
        times: u32,
        kind: TransportErrorKind,
    ) {
        self.faults.lock().unwrap().push(Fault {
            method,
            path_contains: path_contains.to_string(),
            remaining: times,
            kind,
        });
    }

    /// Slows every bulk write down.
    pub fn set_bulk_delay(&self, delay: Duration) {
        *self.bulk_delay.lock().unwrap() = Some(delay);
    }

    /// Makes every bulk write report item failures.
    pub fn reject_bulk(&self, reject: bool) {
        *self.reject_bulk.lock().unwrap() = reject;
    }

    /// Makes index creation answer `acknowledged: false` for names starting
    /// with `prefix`.
    pub fn refuse_index_creation(&self, prefix: &str) {
        self.fail_acks.lock().unwrap().insert(prefix.to_string());
    }

    pub fn seed_index(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .indices
            .entry(name.to_string())
            .or_default();
    }

    pub fn seed_alias(&self, alias: &str, index: &str) {
        self.seed_index(index);
        self.state
            .lock()
            .unwrap()
            .aliases
            .entry(alias.to_string())
            .or_default()
            .insert(index.to_string());
    }

    pub fn seed_document(&self, index: &str, id: &str, body: Value) {
        self.seed_index(index);
        self.state
            .lock()
            .unwrap()
            .indices
            .get_mut(index)
            .unwrap()
            .insert(id.to_string(), body);
    }

    pub fn indices(&self) -> Vec<String> {
        self.state.lock().unwrap().indices.keys().cloned().collect()
    }

    pub fn alias_targets(&self, alias: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .aliases
            .get(alias)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn documents(&self, index: &str) -> Docs {
        self.state
            .lock()
            .unwrap()
            .indices
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count_requests(&self, method: Method, path_contains: &str) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path.contains(path_contains))
            .count()
    }

    fn take_fault(&self, method: Method, path: &str) -> Option<TransportErrorKind> {
        let mut faults = self.faults.lock().unwrap();
        let fault = faults
            .iter_mut()
            .find(|f| f.method == method && path.contains(&f.path_contains) && f.remaining > 0)?;
        fault.remaining -= 1;
        Some(fault.kind)
    }

    fn handle(&self, method: Method, path: &str, query: &str, body: Option<&str>) -> (u16, Value) {
        let segments: Vec<&str> = path
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        let body: Value = body
            .and_then(|b| serde_json::from_str(b).ok())
            .unwrap_or(Value::Null);

        let mut state = self.state.lock().unwrap();
        match (method, segments.as_slice()) {
            (Method::Get, ["_aliases"]) => (200, list_aliases(&state)),
            (Method::Post, ["_aliases"]) => update_aliases(&mut state, &body),
            (Method::Post, ["_refresh"]) => (200, json!({"_shards": {"failed": 0}})),
            (Method::Put, [name]) => {
                let refused = self
                    .fail_acks
                    .lock()
                    .unwrap()
                    .iter()
                    .any(|p| name.starts_with(p.as_str()));
                if refused {
                    return (200, json!({"acknowledged": false}));
                }
                create_index(&mut state, name)
            }
            (Method::Delete, [name]) => delete_index(&mut state, name),
            (Method::Post, [target, "_search"]) => search(&state, target, &body),
            (Method::Put, [target, _type, id]) => {
                let require_alias = query.split('&').any(|p| p == "require_alias=true");
                put_document(&mut state, target, &decode(id), body, require_alias)
            }
            (Method::Delete, [target, _type, id]) => delete_document(&mut state, target, &decode(id)),
            _ => (400, json!({"error": format!("no handler for {method} {path}")})),
        }
    }

    fn handle_bulk(&self, target: &str, body: &str) -> (u16, Value) {
        if *self.reject_bulk.lock().unwrap() {
            return (
                200,
                json!({"took": 1, "errors": true, "items": [
                    {"index": {"status": 400, "error": {"type": "mapper_parsing_exception"}}}
                ]}),
            );
        }
        let mut state = self.state.lock().unwrap();
        let lines: Vec<&str> = body.lines().filter(|l| !l.is_empty()).collect();
        let mut items = Vec::new();
        let mut errors = false;

        for pair in lines.chunks(2) {
            let (Some(command), Some(source)) = (pair.first(), pair.get(1)) else {
                return (400, json!({"error": "bulk body must alternate command and source"}));
            };
            let command: Value = match serde_json::from_str(command) {
                Ok(c) => c,
                Err(e) => return (400, json!({"error": e.to_string()})),
            };
            let source: Value = match serde_json::from_str(source) {
                Ok(s) => s,
                Err(e) => return (400, json!({"error": e.to_string()})),
            };
            let index = command["index"]["_index"].as_str().unwrap_or(target);
            let id = command["index"]["_id"].as_str().unwrap_or_default().to_string();
            match state.indices.get_mut(index) {
                Some(docs) => {
                    docs.insert(id.clone(), source);
                    items.push(json!({"index": {"_index": index, "_id": id, "status": 201}}));
                }
                None => {
                    errors = true;
                    items.push(json!({
                        "index": {"_index": index, "_id": id, "status": 404,
                                  "error": {"type": "index_not_found_exception"}}
                    }));
                }
            }
        }

        (200, json!({"took": 1, "errors": errors, "items": items}))
    }
}

#[async_trait]
impl Transport for FakeNode {
    async fn send(&self, request: &HttpRequest) -> Result<RawReply, TransportError> {
        let path = path_of(&request.url);
        self.seen.lock().unwrap().push(Seen {
            method: request.method,
            path: path.clone(),
            body: request.body.clone(),
        });

        if let Some(kind) = self.take_fault(request.method, &path) {
            return Err(TransportError::new(kind, "injected failure"));
        }

        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let (status, body) = match (request.method, segments.as_slice()) {
            (Method::Post, [target, "_bulk"]) => {
                let delay = *self.bulk_delay.lock().unwrap();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                self.handle_bulk(target, request.body.as_deref().unwrap_or_default())
            }
            _ => self.handle(
                request.method,
                &path,
                query_of(&request.url),
                request.body.as_deref(),
            ),
        };

        Ok(RawReply::new(status, body.to_string()))
    }
}

fn path_of(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = without_scheme
        .find('/')
        .map_or("/", |i| &without_scheme[i..]);
    path.split('?').next().unwrap_or("/").to_string()
}

fn query_of(url: &str) -> &str {
    url.split_once('?').map_or("", |(_, query)| query)
}

fn decode(id: &str) -> String {
    urlencoding::decode(id)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| id.to_string())
}

fn not_found(name: &str) -> (u16, Value) {
    (
        404,
        json!({"error": {"type": "index_not_found_exception", "index": name}, "status": 404}),
    )
}

/// Concrete indices behind `target`, which may be an alias or an index.
fn resolve(state: &NodeState, target: &str) -> Option<Vec<String>> {
    if let Some(set) = state.aliases.get(target).filter(|s| !s.is_empty()) {
        return Some(set.iter().cloned().collect());
    }
    state
        .indices
        .contains_key(target)
        .then(|| vec![target.to_string()])
}

fn list_aliases(state: &NodeState) -> Value {
    let mut out = Map::new();
    for name in state.indices.keys() {
        let aliases: Map<String, Value> = state
            .aliases
            .iter()
            .filter(|(_, set)| set.contains(name))
            .map(|(alias, _)| (alias.clone(), json!({})))
            .collect();
        out.insert(name.clone(), json!({ "aliases": aliases }));
    }
    Value::Object(out)
}

fn update_aliases(state: &mut NodeState, body: &Value) -> (u16, Value) {
    let Some(actions) = body["actions"].as_array() else {
        return (400, json!({"error": "missing actions"}));
    };

    // Applied to a copy so a bad action leaves the node untouched.
    let mut next = state.clone();
    for action in actions {
        if let Some(add) = action.get("add") {
            let (Some(alias), Some(index)) = (add["alias"].as_str(), add["index"].as_str()) else {
                return (400, json!({"error": "malformed add"}));
            };
            if !next.indices.contains_key(index) {
                return not_found(index);
            }
            if next.indices.contains_key(alias) {
                return (400, json!({"error": {"type": "invalid_alias_name_exception"}}));
            }
            next.aliases
                .entry(alias.to_string())
                .or_default()
                .insert(index.to_string());
        } else if let Some(remove) = action.get("remove") {
            let (Some(alias), Some(index)) = (remove["alias"].as_str(), remove["index"].as_str())
            else {
                return (400, json!({"error": "malformed remove"}));
            };
            let removed = next
                .aliases
                .get_mut(alias)
                .is_some_and(|set| set.remove(index));
            if !removed {
                return (
                    404,
                    json!({"error": {"type": "aliases_not_found_exception"}, "status": 404}),
                );
            }
        } else {
            return (400, json!({"error": "unknown alias action"}));
        }
    }
    next.aliases.retain(|_, set| !set.is_empty());
    *state = next;
    (200, json!({"acknowledged": true}))
}

fn create_index(state: &mut NodeState, name: &str) -> (u16, Value) {
    if state.indices.contains_key(name) || state.aliases.contains_key(name) {
        return (
            400,
            json!({"error": {"type": "resource_already_exists_exception", "index": name}, "status": 400}),
        );
    }
    state.indices.insert(name.to_string(), Docs::new());
    (200, json!({"acknowledged": true, "index": name}))
}

fn delete_index(state: &mut NodeState, name: &str) -> (u16, Value) {
    if state.indices.remove(name).is_none() {
        return not_found(name);
    }
    for set in state.aliases.values_mut() {
        set.remove(name);
    }
    state.aliases.retain(|_, set| !set.is_empty());
    (200, json!({"acknowledged": true}))
}

fn matches(doc: &Value, query: &str) -> bool {
    if query == "*" {
        return true;
    }
    let needle = query.to_lowercase();
    match doc {
        Value::String(s) => s.to_lowercase().contains(&needle),
        Value::Array(items) => items.iter().any(|v| matches(v, query)),
        Value::Object(fields) => fields.values().any(|v| matches(v, query)),
        other => other.to_string() == needle,
    }
}

fn search(state: &NodeState, target: &str, body: &Value) -> (u16, Value) {
    let Some(indices) = resolve(state, target) else {
        return not_found(target);
    };
    let query = body
        .pointer("/query/query_string/query")
        .and_then(Value::as_str)
        .unwrap_or("*");

    let hits: Vec<Value> = indices
        .iter()
        .flat_map(|index| {
            state.indices[index]
                .iter()
                .filter(move |(_, doc)| matches(doc, query))
                .map(move |(id, doc)| json!({"_index": index, "_id": id, "_source": doc}))
        })
        .collect();

    (
        200,
        json!({"took": 1, "hits": {"total": {"value": hits.len(), "relation": "eq"}, "hits": hits}}),
    )
}

fn put_document(
    state: &mut NodeState,
    target: &str,
    id: &str,
    body: Value,
    require_alias: bool,
) -> (u16, Value) {
    let is_alias = state.aliases.get(target).is_some_and(|set| !set.is_empty());
    if require_alias && !is_alias {
        return (
            404,
            json!({"error": {"type": "index_not_found_exception", "index": target,
                             "reason": "[require_alias] request flag is [true] and target is not an alias"},
                   "status": 404}),
        );
    }
    let index = match resolve(state, target) {
        Some(indices) if indices.len() == 1 => indices[0].clone(),
        Some(_) => {
            return (
                400,
                json!({"error": {"type": "illegal_argument_exception",
                                 "reason": "alias points to more than one index"}}),
            );
        }
        None => {
            // Writing to an unknown name auto-creates the index.
            state.indices.insert(target.to_string(), Docs::new());
            target.to_string()
        }
    };
    let docs = state.indices.entry(index.clone()).or_default();
    let created = docs.insert(id.to_string(), body).is_none();
    let result = if created { "created" } else { "updated" };
    (
        if created { 201 } else { 200 },
        json!({"_index": index, "_id": id, "result": result, "ok": true}),
    )
}

fn delete_document(state: &mut NodeState, target: &str, id: &str) -> (u16, Value) {
    let Some(indices) = resolve(state, target) else {
        return not_found(target);
    };
    let found = indices.iter().any(|index| {
        state
            .indices
            .get_mut(index)
            .is_some_and(|docs| docs.remove(id).is_some())
    });
    if found {
        (200, json!({"_id": id, "result": "deleted", "found": true, "ok": true}))
    } else {
        (404, json!({"_id": id, "result": "not_found", "found": false}))
    }
}

// ── builders ────────────────────────────────────────────────────

/// Routes engine logs to the test harness; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("searchsync_engine=debug")
        .with_test_writer()
        .try_init();
}

/// Config with fast retries so tests do not wait on real backoff.
pub fn fast_config() -> EngineConfig {
    EngineConfig::default().with_retry(RetryPolicy::new(3, Duration::from_millis(5)))
}

pub fn cats() -> CollectionDescriptor {
    CollectionDescriptor::for_collection("Cats")
}

pub fn cat(i: usize) -> Document {
    Document::with_new_id()
        .with_field("name", format!("cat {i}"))
        .with_field("lives", 9i64)
}

pub fn cats_named(names: &[&str]) -> Vec<Document> {
    names
        .iter()
        .map(|name| Document::with_new_id().with_field("name", *name))
        .collect()
}
