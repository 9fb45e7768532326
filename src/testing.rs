//! In-memory page and endpoint doubles for unit tests.

// ============================================================================
// Imports
// ============================================================================

use std::future::pending;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::candidate::Candidate;
use crate::endpoint::{CandidateSink, Endpoint, IceCandidateEvent, IceCandidateHandler};
use crate::error::{Error, Result};
use crate::page::{
    LOCAL_CANDIDATES_SCRIPT, SDP_OFFER_SCRIPT, STATUS_SCRIPT, ScriptExecutor,
};

/// Installs a test subscriber honouring `RUST_LOG`.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MockPage
// ============================================================================

#[derive(Default)]
struct PageState {
    scripts: Vec<String>,
    offer: Option<String>,
    answer: Option<String>,
    candidates: Vec<Value>,
    status: Option<String>,
    responses: FxHashMap<String, Value>,
    failing: Vec<String>,
    hanging: Vec<String>,
    closed: bool,
}

/// Scripted stand-in for the browser test page.
#[derive(Default)]
pub(crate) struct MockPage {
    state: Mutex<PageState>,
}

impl MockPage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_offer(&self, offer: &str) {
        self.state.lock().offer = Some(offer.to_string());
    }

    pub(crate) fn push_candidate(&self, raw: &str) {
        self.push_candidate_value(Value::String(raw.to_string()));
    }

    pub(crate) fn push_candidate_value(&self, value: Value) {
        self.state.lock().candidates.push(value);
    }

    pub(crate) fn set_status(&self, status: &str) {
        self.state.lock().status = Some(status.to_string());
    }

    pub(crate) fn set_response(&self, script: &str, value: Value) {
        self.state.lock().responses.insert(script.to_string(), value);
    }

    pub(crate) fn fail_scripts_containing(&self, pattern: &str) {
        self.state.lock().failing.push(pattern.to_string());
    }

    pub(crate) fn hang_scripts_containing(&self, pattern: &str) {
        self.state.lock().hanging.push(pattern.to_string());
    }

    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
    }

    pub(crate) fn scripts(&self) -> Vec<String> {
        self.state.lock().scripts.clone()
    }

    pub(crate) fn sdp_answer(&self) -> Option<String> {
        self.state.lock().answer.clone()
    }
}

#[async_trait]
impl ScriptExecutor for MockPage {
    async fn execute_script(&self, script: &str) -> Result<Value> {
        let hang = {
            let mut state = self.state.lock();
            state.scripts.push(script.to_string());

            if state.closed {
                return Err(Error::PageClosed);
            }
            if state.failing.iter().any(|p| script.contains(p.as_str())) {
                return Err(Error::transport(format!("script failed: {script}")));
            }
            state.hanging.iter().any(|p| script.contains(p.as_str()))
        };

        if hang {
            pending::<()>().await;
        }

        let mut state = self.state.lock();

        if let Some(encoded) = script
            .strip_prefix("processSdpAnswer('")
            .and_then(|rest| rest.strip_suffix("');"))
        {
            let bytes = Base64Standard
                .decode(encoded)
                .map_err(|e| Error::protocol(e.to_string()))?;
            state.answer = Some(String::from_utf8_lossy(&bytes).into_owned());
            return Ok(Value::Null);
        }

        let value = match script {
            SDP_OFFER_SCRIPT => state.offer.clone().map(Value::String).unwrap_or(Value::Null),
            LOCAL_CANDIDATES_SCRIPT => Value::Array(state.candidates.clone()),
            STATUS_SCRIPT => state.status.clone().map(Value::String).unwrap_or(Value::Null),
            other => state.responses.get(other).cloned().unwrap_or(Value::Null),
        };

        Ok(value)
    }
}

// ============================================================================
// MockEndpoint
// ============================================================================

/// Endpoint double recording every call.
pub(crate) struct MockEndpoint {
    answer: Mutex<Result<String>>,
    received: Mutex<Vec<Candidate>>,
    add_calls: AtomicUsize,
    fail_adds: AtomicBool,
    hang_offer: AtomicBool,
    gathered: AtomicBool,
    handler: Mutex<Option<IceCandidateHandler>>,
}

impl MockEndpoint {
    pub(crate) fn answering(answer: &str) -> Self {
        Self::with_answer(Ok(answer.to_string()))
    }

    pub(crate) fn rejecting(message: &str) -> Self {
        Self::with_answer(Err(Error::transport(message)))
    }

    fn with_answer(answer: Result<String>) -> Self {
        Self {
            answer: Mutex::new(answer),
            received: Mutex::new(Vec::new()),
            add_calls: AtomicUsize::new(0),
            fail_adds: AtomicBool::new(false),
            hang_offer: AtomicBool::new(false),
            gathered: AtomicBool::new(false),
            handler: Mutex::new(None),
        }
    }

    pub(crate) fn fail_adds(&self) {
        self.fail_adds.store(true, Ordering::SeqCst);
    }

    pub(crate) fn hang_on_offer(&self) {
        self.hang_offer.store(true, Ordering::SeqCst);
    }

    pub(crate) fn received(&self) -> Vec<Candidate> {
        self.received.lock().clone()
    }

    pub(crate) fn add_calls(&self) -> usize {
        self.add_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn gathered(&self) -> bool {
        self.gathered.load(Ordering::SeqCst)
    }

    pub(crate) fn has_handler(&self) -> bool {
        self.handler.lock().is_some()
    }

    /// Simulates the endpoint discovering a local candidate.
    pub(crate) fn emit(&self, event: IceCandidateEvent) {
        if let Some(handler) = self.handler.lock().as_ref() {
            handler(event);
        }
    }
}

#[async_trait]
impl CandidateSink for MockEndpoint {
    async fn add_candidate(&self, candidate: Candidate) -> Result<()> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_adds.load(Ordering::SeqCst) {
            return Err(Error::transport("endpoint refused candidate"));
        }
        self.received.lock().push(candidate);
        Ok(())
    }
}

#[async_trait]
impl Endpoint for MockEndpoint {
    async fn process_offer(&self, _sdp_offer: &str) -> Result<String> {
        if self.hang_offer.load(Ordering::SeqCst) {
            pending::<()>().await;
        }
        match &*self.answer.lock() {
            Ok(answer) => Ok(answer.clone()),
            Err(e) => Err(Error::transport(e.to_string())),
        }
    }

    async fn gather_candidates(&self) -> Result<()> {
        self.gathered.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_ice_candidate_handler(&self, handler: IceCandidateHandler) {
        *self.handler.lock() = Some(handler);
    }

    fn clear_ice_candidate_handler(&self) {
        *self.handler.lock() = None;
    }
}
