#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use bytes::Bytes;
use studio_core::Msg;
use studio_engine::{
    FailureKind, HealthStatus, MsgSink, OperationClient, OperationError, OperationJob,
    OperationOutput,
};

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(studio_logging::initialize_for_tests);
}

type Responder = dyn Fn(&OperationJob) -> Result<OperationOutput, OperationError> + Send + Sync;

/// Client whose answers come from a closure; records everything it is asked.
pub struct ScriptedClient {
    responder: Box<Responder>,
    sources: Mutex<HashMap<String, Bytes>>,
    gate: Option<Arc<tokio::sync::Notify>>,
    pub jobs: Mutex<Vec<OperationJob>>,
    pub fetched: Mutex<Vec<String>>,
    pub discarded: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&OperationJob) -> Result<OperationOutput, OperationError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            sources: Mutex::new(HashMap::new()),
            gate: None,
            jobs: Mutex::new(Vec::new()),
            fetched: Mutex::new(Vec::new()),
            discarded: Mutex::new(Vec::new()),
        }
    }

    /// Every job echoes a distinct image: `{kind}-{item}` as URL and bytes.
    pub fn echo() -> Self {
        Self::new(|job| Ok(image_output(job)))
    }

    /// Each `invoke` waits for one permit from `gate`.
    pub fn gated(mut self, gate: Arc<tokio::sync::Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_source(self, reference: &str, bytes: &'static [u8]) -> Self {
        self.sources
            .lock()
            .unwrap()
            .insert(reference.to_string(), Bytes::from_static(bytes));
        self
    }

    pub fn jobs(&self) -> Vec<OperationJob> {
        self.jobs.lock().unwrap().clone()
    }
}

pub fn image_output(job: &OperationJob) -> OperationOutput {
    let name = format!("{}-{}.png", job.kind, job.item_id);
    OperationOutput::Image {
        url: format!("http://svc/outputs/{name}"),
        filename: Some(name.clone()),
        bytes: Some(Bytes::from(name.into_bytes())),
    }
}

pub fn failure(message: &str) -> OperationError {
    OperationError::new(FailureKind::HttpStatus(500), message)
}

#[async_trait]
impl OperationClient for ScriptedClient {
    async fn invoke(&self, job: OperationJob) -> Result<OperationOutput, OperationError> {
        self.jobs.lock().unwrap().push(job.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        (self.responder)(&job)
    }

    async fn fetch_source(&self, reference: &str) -> Result<Bytes, OperationError> {
        self.fetched.lock().unwrap().push(reference.to_string());
        self.sources
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| OperationError::new(FailureKind::HttpStatus(404), reference))
    }

    async fn discard(&self, references: &[String]) -> Result<(), OperationError> {
        self.discarded
            .lock()
            .unwrap()
            .extend(references.iter().cloned());
        Ok(())
    }

    async fn health(&self) -> Result<HealthStatus, OperationError> {
        Ok(HealthStatus {
            status: "healthy".to_string(),
            service: Some("scripted".to_string()),
        })
    }
}

#[derive(Default)]
pub struct RecordingSink {
    msgs: Mutex<Vec<Msg>>,
}

impl RecordingSink {
    pub fn take(&self) -> Vec<Msg> {
        self.msgs.lock().unwrap().drain(..).collect()
    }
}

impl MsgSink for RecordingSink {
    fn emit(&self, msg: Msg) {
        self.msgs.lock().unwrap().push(msg);
    }
}
