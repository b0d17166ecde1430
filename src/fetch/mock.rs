// src/fetch/mock.rs
//! Scripted transport for tests and local runs.
//!
//! Responses are queued per URL prefix (longest matching prefix wins) and
//! consumed in order; the last queued response for a prefix repeats. Unmatched
//! URLs get a 404. Every request is recorded.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::{HttpResponse, Transport};
use crate::error::FetchError;

#[derive(Debug, Clone)]
pub enum Scripted {
    Respond(HttpResponse),
    Fail(FetchError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
}

#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<(String, VecDeque<Scripted>)>>,
    log: Mutex<Vec<RecordedRequest>>,
    latency: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request takes `latency` (tokio time) before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn push(&self, prefix: &str, step: Scripted) -> &Self {
        let mut routes = self.routes.lock().expect("scripted routes poisoned");
        match routes.iter_mut().find(|(p, _)| p == prefix) {
            Some((_, queue)) => queue.push_back(step),
            None => routes.push((prefix.to_string(), VecDeque::from([step]))),
        }
        self
    }

    pub fn respond(&self, prefix: &str, status: u16, body: impl Into<Vec<u8>>) -> &Self {
        self.push(
            prefix,
            Scripted::Respond(HttpResponse {
                status,
                body: body.into(),
            }),
        )
    }

    pub fn respond_json(&self, prefix: &str, value: &serde_json::Value) -> &Self {
        self.respond(prefix, 200, value.to_string())
    }

    pub fn fail(&self, prefix: &str, err: FetchError) -> &Self {
        self.push(prefix, Scripted::Fail(err))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().expect("scripted log poisoned").clone()
    }

    /// Number of recorded requests (any method) whose URL starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.log
            .lock()
            .expect("scripted log poisoned")
            .iter()
            .filter(|r| r.url.starts_with(prefix))
            .count()
    }

    async fn answer(&self, method: &'static str, url: &str) -> Scripted {
        self.log
            .lock()
            .expect("scripted log poisoned")
            .push(RecordedRequest {
                method,
                url: url.to_string(),
            });
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut routes = self.routes.lock().expect("scripted routes poisoned");
        let best = routes
            .iter_mut()
            .filter(|(prefix, _)| url.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len());
        match best {
            Some((_, queue)) if queue.len() > 1 => queue.pop_front().unwrap_or_else(not_found),
            Some((_, queue)) => queue.front().cloned().unwrap_or_else(not_found),
            None => not_found(),
        }
    }
}

fn not_found() -> Scripted {
    Scripted::Respond(HttpResponse {
        status: 404,
        body: Vec::new(),
    })
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse, FetchError> {
        match self.answer("GET", url).await {
            Scripted::Respond(r) => Ok(r),
            Scripted::Fail(e) => Err(e),
        }
    }

    async fn head(&self, url: &str, _timeout: Duration) -> Result<u16, FetchError> {
        match self.answer("HEAD", url).await {
            Scripted::Respond(r) => Ok(r.status),
            Scripted::Fail(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn longest_prefix_wins_and_last_response_repeats() {
        let t = ScriptedTransport::new();
        t.respond("http://x/a", 200, "generic");
        t.respond("http://x/a/b", 500, "")
            .respond("http://x/a/b", 200, "specific");

        let d = Duration::from_secs(1);
        assert_eq!(t.get("http://x/a/b", d).await.unwrap().status, 500);
        assert_eq!(t.get("http://x/a/b", d).await.unwrap().body, b"specific");
        assert_eq!(t.get("http://x/a/b", d).await.unwrap().body, b"specific");
        assert_eq!(t.get("http://x/a/c", d).await.unwrap().body, b"generic");
        assert_eq!(t.get("http://y", d).await.unwrap().status, 404);
        assert_eq!(t.count("http://x/a/b"), 3);
    }
}
