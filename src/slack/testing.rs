//! Scriptable in-memory transport for unit tests

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;

use super::transport::{RawFailure, Transport};

type Reply = Result<Value, RawFailure>;

#[derive(Default)]
struct FakeState {
    queues: HashMap<String, VecDeque<Reply>>,
    always: HashMap<String, Reply>,
    calls: Vec<(String, Vec<(String, String)>, Instant)>,
    downloads: VecDeque<Result<Vec<u8>, RawFailure>>,
    download_always: Option<RawFailure>,
    download_urls: Vec<String>,
}

/// Replies are looked up by `method#target` first (target being the
/// `channel`, `user` or `users` parameter), then by bare method. Queued
/// replies are consumed in order; `always` replies repeat forever.
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<FakeState>,
}

pub fn network_failure() -> RawFailure {
    RawFailure::Network {
        message: "connection reset by peer".into(),
    }
}

pub fn api_failure(code: &str) -> RawFailure {
    RawFailure::Api {
        code: code.into(),
        retry_after: None,
    }
}

pub fn ok(body: Value) -> Reply {
    let mut body = body;
    body["ok"] = json!(true);
    Ok(body)
}

fn target_key(method: &str, params: &[(&str, String)]) -> Option<String> {
    params
        .iter()
        .find(|(k, _)| matches!(*k, "channel" | "user" | "users"))
        .map(|(_, v)| format!("{}#{}", method, v))
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for a method, or for `method#target`.
    pub fn push(&self, route: &str, reply: Reply) {
        self.state
            .lock()
            .unwrap()
            .queues
            .entry(route.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn fail_always(&self, route: &str, failure: RawFailure) {
        self.state
            .lock()
            .unwrap()
            .always
            .insert(route.to_string(), Err(failure));
    }

    pub fn reply_always(&self, route: &str, body: Value) {
        self.state
            .lock()
            .unwrap()
            .always
            .insert(route.to_string(), ok(body));
    }

    pub fn push_download(&self, reply: Result<Vec<u8>, RawFailure>) {
        self.state.lock().unwrap().downloads.push_back(reply);
    }

    pub fn fail_download(&self, failure: RawFailure) {
        self.state.lock().unwrap().download_always = Some(failure);
    }

    fn matching_calls(&self, route: &str) -> Vec<(Vec<(String, String)>, Instant)> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(method, params, _)| {
                method == route
                    || params
                        .iter()
                        .any(|(k, v)| matches!(k.as_str(), "channel" | "user" | "users")
                            && format!("{}#{}", method, v) == route)
            })
            .map(|(_, params, at)| (params.clone(), *at))
            .collect()
    }

    pub fn call_count(&self, route: &str) -> usize {
        self.matching_calls(route).len()
    }

    pub fn call_times(&self, route: &str) -> Vec<Instant> {
        self.matching_calls(route).into_iter().map(|(_, at)| at).collect()
    }

    pub fn params(&self, route: &str) -> Vec<Vec<(String, String)>> {
        self.matching_calls(route).into_iter().map(|(p, _)| p).collect()
    }

    pub fn download_urls(&self) -> Vec<String> {
        self.state.lock().unwrap().download_urls.clone()
    }

    fn next_reply(state: &mut FakeState, route: &str) -> Option<Reply> {
        if let Some(reply) = state.queues.get_mut(route).and_then(|q| q.pop_front()) {
            return Some(reply);
        }
        state.always.get(route).cloned()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, method: &str, params: &[(&str, String)]) -> Result<Value, RawFailure> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((
            method.to_string(),
            params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            Instant::now(),
        ));

        let keyed = target_key(method, params).and_then(|key| Self::next_reply(&mut state, &key));
        keyed
            .or_else(|| Self::next_reply(&mut state, method))
            .unwrap_or_else(|| Err(api_failure("fake_unscripted")))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, RawFailure> {
        let mut state = self.state.lock().unwrap();
        state.download_urls.push(url.to_string());
        if let Some(reply) = state.downloads.pop_front() {
            return reply;
        }
        match &state.download_always {
            Some(failure) => Err(failure.clone()),
            None => Ok(url.as_bytes().to_vec()),
        }
    }
}
