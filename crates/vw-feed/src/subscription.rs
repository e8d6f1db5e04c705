//! Per-instrument subscription lifecycle.
//!
//! A [`Subscription`] owns one [`Channel`]. Starting it sends the subscribe
//! handshake and spawns a receive loop task that classifies every inbound
//! message and pushes the resulting events into a bounded queue, consumed
//! through [`Events`].
//!
//! # Lifecycle
//!
//! ```text
//! Created ──handshake──► Running ──close()──► Stopping ──► Closed
//! ```
//!
//! Two separate mechanisms stop the loop:
//!
//! 1. A stop flag (watch channel), checked before every read and awaited
//!    while the loop is parked after a fatal read or blocked on a full queue.
//! 2. `Channel::close`, which forcibly unblocks a read in progress.
//!
//! [`Subscription::close`] raises the flag, waits for the loop to exit until
//! the deadline, then closes the channel whatever happened.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vw_core::Instrument;
use vw_core::error::{FeedError, SubscriptionError};

use crate::channel::Channel;
use crate::messages::{DecodedEvent, SubscribeRequest};

/// Lifecycle stage. Stages are entered once, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SubscriptionState {
    /// Handshake in progress; never observable on a returned subscription.
    Created,
    Running,
    Stopping,
    Closed,
}

/// How the receive loop ended during [`Subscription::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// The loop acknowledged the stop signal before the deadline.
    Graceful,
    /// The deadline passed first; the channel was closed regardless.
    TimedOut,
}

/// The event sequence of one subscription, in wire-receipt order.
///
/// Ends (yields `None`) once the receive loop has exited.
#[derive(Debug)]
pub struct Events {
    rx: mpsc::Receiver<DecodedEvent>,
}

impl Events {
    /// Wait for the next event; `None` at end of stream.
    pub async fn next_event(&mut self) -> Option<DecodedEvent> {
        self.rx.recv().await
    }
}

impl Stream for Events {
    type Item = DecodedEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// A live subscription to one instrument's trades.
pub struct Subscription {
    instrument: Instrument,
    channel: Arc<dyn Channel>,
    events: Option<Events>,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    state: SubscriptionState,
}

impl Subscription {
    /// Send the subscribe handshake over `channel` and start the receive loop.
    ///
    /// `queue_capacity` bounds the event queue (minimum 1); a consumer that
    /// stops reading eventually stalls the loop.
    pub async fn start(
        instrument: Instrument,
        channel: Arc<dyn Channel>,
        channel_name: &str,
        queue_capacity: usize,
    ) -> Result<Self, SubscriptionError> {
        if instrument.is_empty() {
            return Err(SubscriptionError::InvalidInstrument);
        }

        let request = SubscribeRequest::for_instrument(channel_name, &instrument);
        if let Err(source) = channel.send(&request).await {
            if let Err(e) = channel.close() {
                debug!("[{instrument}] close after failed handshake: {e}");
            }
            return Err(SubscriptionError::HandshakeFailed {
                instrument: instrument.to_string(),
                channel: channel_name.to_string(),
                source,
            });
        }

        let (event_tx, event_rx) = mpsc::channel(queue_capacity.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(receive_loop(
            instrument.clone(),
            Arc::clone(&channel),
            event_tx,
            stop_rx,
        ));

        info!("[{instrument}] subscribed to {channel_name} channel");

        Ok(Self {
            instrument,
            channel,
            events: Some(Events { rx: event_rx }),
            stop_tx,
            task: Some(task),
            state: SubscriptionState::Running,
        })
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Take the event sequence. Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<Events> {
        self.events.take()
    }

    /// Stop the receive loop and close the channel.
    ///
    /// Waits for the loop to exit until `deadline`; if it has not, logs a
    /// shutdown timeout and carries on. The channel is closed in every case,
    /// which unblocks a loop stuck in a read. Only a failed channel close is
    /// returned as an error. Calling `close` again closes the channel again.
    pub async fn close(&mut self, deadline: Instant) -> Result<Shutdown, SubscriptionError> {
        if self.state < SubscriptionState::Stopping {
            self.state = SubscriptionState::Stopping;
        }
        self.stop_tx.send_replace(true);

        let shutdown = match self.task.take() {
            Some(mut task) => match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(_) => Shutdown::Graceful,
                Err(_) => {
                    let timeout = SubscriptionError::ShutdownTimeout {
                        instrument: self.instrument.to_string(),
                    };
                    warn!("[{}] {timeout}", self.instrument);
                    Shutdown::TimedOut
                }
            },
            None => Shutdown::Graceful,
        };

        self.state = SubscriptionState::Closed;
        self.channel.close().map_err(SubscriptionError::ChannelCloseFailed)?;

        debug!("[{}] closed ({shutdown:?})", self.instrument);
        Ok(shutdown)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.state != SubscriptionState::Closed {
            self.stop_tx.send_replace(true);
            if let Err(e) = self.channel.close() {
                debug!("[{}] close on drop: {e}", self.instrument);
            }
        }
    }
}

/// Read, classify and enqueue until stopped or the consumer goes away.
///
/// Dropping `event_tx` on return closes the event queue, which is how
/// consumers observe the end of the stream.
async fn receive_loop(
    instrument: Instrument,
    channel: Arc<dyn Channel>,
    event_tx: mpsc::Sender<DecodedEvent>,
    mut stop_rx: watch::Receiver<bool>,
) {
    debug!("[{instrument}] receive loop started");

    loop {
        if *stop_rx.borrow() {
            debug!("[{instrument}] stop requested");
            break;
        }

        let message = match channel.receive().await {
            Ok(message) => message,
            Err(e) => {
                warn!("[{instrument}] read failed: {e}");
                let event = DecodedEvent::ProtocolError(FeedError::TransportReadFailed(e));
                // The channel must not be read again; park until told to stop.
                if deliver(&event_tx, event, &mut stop_rx).await {
                    wait_for_stop(&mut stop_rx).await;
                }
                break;
            }
        };

        match message.decode() {
            DecodedEvent::Ignored => debug!("[{instrument}] ignoring {} message", message.kind),
            event => {
                if !deliver(&event_tx, event, &mut stop_rx).await {
                    break;
                }
            }
        }
    }

    info!("[{instrument}] receive loop exited");
}

/// Enqueue `event`, giving up if stop is requested while the queue is full
/// or the consumer has dropped the queue. Returns whether it was delivered.
async fn deliver(
    event_tx: &mpsc::Sender<DecodedEvent>,
    event: DecodedEvent,
    stop_rx: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        biased;
        res = event_tx.send(event) => res.is_ok(),
        _ = wait_for_stop(stop_rx) => false,
    }
}

async fn wait_for_stop(stop_rx: &mut watch::Receiver<bool>) {
    // Err means the subscription was dropped, which also means stop.
    let _ = stop_rx.wait_for(|stopped| *stopped).await;
}
