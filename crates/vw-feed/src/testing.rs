//! Scripted transport for tests.
//!
//! Compiled for this crate's own tests, and for downstream crates through the
//! `testing` feature.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use vw_core::error::ChannelError;

use crate::channel::{Channel, Dialer};
use crate::messages::{FeedMessage, SubscribeRequest};

pub type Script = mpsc::UnboundedSender<Result<FeedMessage, ChannelError>>;

/// A channel whose reads are fed from a queue.
///
/// `receive` blocks until the test pushes a message or error, or until the
/// channel is closed. With `ignore_close` set, close is recorded but never
/// unblocks a read.
pub struct ScriptedChannel {
    inbound: Mutex<mpsc::UnboundedReceiver<Result<FeedMessage, ChannelError>>>,
    closed: CancellationToken,
    pub sent: StdMutex<Vec<SubscribeRequest>>,
    pub receive_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub fail_send: AtomicBool,
    pub fail_close: AtomicBool,
    pub ignore_close: AtomicBool,
}

impl ScriptedChannel {
    pub fn new() -> (Arc<Self>, Script) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Arc::new(Self {
            inbound: Mutex::new(rx),
            closed: CancellationToken::new(),
            sent: StdMutex::new(Vec::new()),
            receive_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            fail_send: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            ignore_close: AtomicBool::new(false),
        });
        (channel, tx)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn receive_calls(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<SubscribeRequest> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    async fn send(&self, request: &SubscribeRequest) -> Result<(), ChannelError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ChannelError::WebSocket("TestABC".into()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(request.clone());
        }
        Ok(())
    }

    async fn receive(&self) -> Result<FeedMessage, ChannelError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        let mut inbound = self.inbound.lock().await;
        if self.ignore_close.load(Ordering::SeqCst) {
            return match inbound.recv().await {
                Some(next) => next,
                None => std::future::pending().await,
            };
        }
        tokio::select! {
            _ = self.closed.cancelled() => Err(ChannelError::Closed),
            next = inbound.recv() => next.unwrap_or(Err(ChannelError::Closed)),
        }
    }

    fn close(&self) -> Result<(), ChannelError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(ChannelError::CloseFailed("TestABC".into()));
        }
        self.closed.cancel();
        Ok(())
    }
}

/// A dialer handing out pre-built channels, or failing.
pub struct ScriptedDialer {
    pub channels: StdMutex<Vec<Arc<ScriptedChannel>>>,
    pub fail: bool,
    pub dials: AtomicUsize,
}

impl ScriptedDialer {
    pub fn with(channels: Vec<Arc<ScriptedChannel>>) -> Self {
        Self {
            channels: StdMutex::new(channels),
            fail: false,
            dials: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::with(Vec::new())
        }
    }
}

#[async_trait]
impl Dialer for ScriptedDialer {
    async fn dial(
        &self,
        url: &str,
        _extra_headers: &HashMap<String, String>,
    ) -> Result<Arc<dyn Channel>, ChannelError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let dial_err = |reason: &str| ChannelError::Dial {
            url: url.to_string(),
            reason: reason.to_string(),
        };
        if self.fail {
            return Err(dial_err("TestABC"));
        }
        let mut channels = self
            .channels
            .lock()
            .map_err(|_| dial_err("scripted channels poisoned"))?;
        if channels.is_empty() {
            return Err(dial_err("no scripted channel left"));
        }
        Ok(channels.remove(0))
    }
}
