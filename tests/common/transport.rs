use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use sentinel_realtime::stream::{EventTransport, FrameStream, SubscribeRequest, TransportError};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

type FrameSender = mpsc::UnboundedSender<Result<String, TransportError>>;

/// Push transport driven by the test: every successful open hands out a
/// channel-backed stream the test writes frames into.
#[derive(Default)]
pub struct ScriptedTransport {
    failures: Mutex<VecDeque<TransportError>>,
    senders: Mutex<Vec<FrameSender>>,
    requests: Mutex<Vec<SubscribeRequest>>,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next open fail with `error`.
    pub fn fail_next(&self, error: TransportError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn opens(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<SubscribeRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Write a raw line into the most recently opened stream.
    pub fn send_line(&self, line: &str) -> bool {
        match self.senders.lock().unwrap().last() {
            Some(sender) => sender.unbounded_send(Ok(line.to_string())).is_ok(),
            None => false,
        }
    }

    pub fn send_json(&self, value: Value) -> bool {
        self.send_line(&value.to_string())
    }

    /// Fail the most recently opened stream with a read error.
    pub fn break_stream(&self) {
        if let Some(sender) = self.senders.lock().unwrap().last() {
            let _ = sender.unbounded_send(Err(TransportError::Read("connection reset".into())));
        }
    }

    /// End the most recently opened stream cleanly.
    pub fn end_stream(&self) {
        if let Some(sender) = self.senders.lock().unwrap().last() {
            sender.close_channel();
        }
    }

    /// Whether the reader of the most recent stream went away.
    pub fn current_stream_closed(&self) -> bool {
        self.senders
            .lock()
            .unwrap()
            .last()
            .map(|s| s.is_closed())
            .unwrap_or(true)
    }
}

#[async_trait]
impl EventTransport for ScriptedTransport {
    async fn open(&self, request: &SubscribeRequest) -> Result<FrameStream, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let (tx, rx) = mpsc::unbounded();
        self.senders.lock().unwrap().push(tx);
        Ok(rx.boxed())
    }
}
