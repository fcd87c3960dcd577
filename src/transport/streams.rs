//! Outgoing stream admission.
//!
//! [`OutgoingStreamsMap`] hands out stream numbers for one stream type under
//! the limit announced by the peer (MAX_STREAMS). Callers that cannot open a
//! stream right away either fail fast ([`OutgoingStreamsMap::open_stream`]) or
//! queue up in FIFO order ([`OutgoingStreamsMap::open_stream_sync`]) until the
//! peer raises the limit, the wait is cancelled, or the connection closes.
//!
//! Whenever an opener is held back, a STREAMS_BLOCKED frame is queued, at most
//! once per limit value.

use crate::error::{ConnectionError, StreamError};
use crate::transport::frames::{ControlFrameQueue, StreamsBlockedFrame};
use crate::transport::{StreamNum, StreamType};
use std::collections::{HashMap, VecDeque};
use std::future::{poll_fn, Future};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::Poll;
use std::time::Duration;
use tokio::sync::Notify;

/// What the admission map needs from a stream it created.
///
/// Implementations are shared behind an `Arc`, so both methods take `&self`.
pub trait OutgoingStream: Send + Sync {
    /// Apply a new send window limit from the peer's transport parameters.
    fn update_send_window(&self, limit: u64);

    /// Abort the stream because the connection is going away.
    fn close_for_shutdown(&self, err: &ConnectionError);
}

type NewStreamFn<S> = Box<dyn Fn(StreamNum) -> S + Send + Sync>;

struct State<S> {
    streams: HashMap<StreamNum, Arc<S>>,
    /// Waiting `open_stream_sync` calls, oldest first.
    open_queue: VecDeque<Arc<Notify>>,
    /// Number handed out by the next successful open.
    next_stream: StreamNum,
    /// Highest number the peer allows us to open.
    max_stream: StreamNum,
    /// Whether STREAMS_BLOCKED was queued for the current `max_stream`.
    blocked_sent: bool,
    close_err: Option<ConnectionError>,
}

impl<S> State<S> {
    fn has_capacity(&self) -> bool {
        self.next_stream <= self.max_stream
    }

    /// Wake the oldest waiter if a stream could be opened for it.
    ///
    /// Only the head of the queue is woken; it wakes its successor after
    /// taking a stream.
    fn maybe_unblock_open_sync(&self) {
        if !self.has_capacity() {
            return;
        }
        if let Some(waiter) = self.open_queue.front() {
            tracing::trace!("Waking stream opener, next stream {}", self.next_stream);
            waiter.notify_one();
        }
    }
}

/// Outgoing streams of one type (bidirectional or unidirectional).
///
/// All state sits behind a single `RwLock`. The lock is never held across an
/// `.await`: blocked openers park on their own [`Notify`] after releasing it.
///
/// The stream constructor runs while the lock is held and must not call back
/// into the map.
pub struct OutgoingStreamsMap<S> {
    stream_type: StreamType,
    state: RwLock<State<S>>,
    new_stream: NewStreamFn<S>,
    control_frames: Arc<dyn ControlFrameQueue>,
}

impl<S: OutgoingStream> OutgoingStreamsMap<S> {
    /// Create an empty map. No stream can be opened until [`set_max_stream`]
    /// grants a limit.
    ///
    /// [`set_max_stream`]: OutgoingStreamsMap::set_max_stream
    pub fn new<F>(
        stream_type: StreamType,
        new_stream: F,
        control_frames: Arc<dyn ControlFrameQueue>,
    ) -> Self
    where
        F: Fn(StreamNum) -> S + Send + Sync + 'static,
    {
        Self {
            stream_type,
            state: RwLock::new(State {
                streams: HashMap::new(),
                open_queue: VecDeque::new(),
                next_stream: StreamNum(1),
                max_stream: StreamNum::INVALID,
                blocked_sent: false,
                close_err: None,
            }),
            new_stream: Box::new(new_stream),
            control_frames,
        }
    }

    /// The stream type this map allocates.
    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    /// Open a stream without waiting.
    ///
    /// Fails with [`StreamError::LimitReached`] if the limit is exhausted or
    /// if blocked `open_stream_sync` calls are queued ahead of us.
    pub fn open_stream(&self) -> Result<Arc<S>, StreamError> {
        let mut state = self.write();

        if let Some(err) = &state.close_err {
            return Err(StreamError::Closed(err.clone()));
        }

        // if there are open_stream_sync calls waiting, they go first
        if !state.open_queue.is_empty() || !state.has_capacity() {
            self.maybe_send_blocked_frame(&mut state);
            return Err(StreamError::LimitReached);
        }
        Ok(self.open(&mut state))
    }

    /// Open a stream, waiting for the peer to raise the limit if necessary.
    ///
    /// Waiters are served in the order they arrived. `cancel` is raced
    /// against the wait; once it resolves the call gives up with
    /// [`StreamError::Cancelled`].
    pub async fn open_stream_sync<C>(&self, cancel: C) -> Result<Arc<S>, StreamError>
    where
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);

        let cancelled = poll_fn(|cx| Poll::Ready(cancel.as_mut().poll(cx).is_ready())).await;

        let mut slot = {
            let mut state = self.write();

            if let Some(err) = &state.close_err {
                return Err(StreamError::Closed(err.clone()));
            }
            if cancelled {
                return Err(StreamError::Cancelled);
            }
            if state.open_queue.is_empty() && state.has_capacity() {
                return Ok(self.open(&mut state));
            }

            let waiter = Arc::new(Notify::new());
            state.open_queue.push_back(Arc::clone(&waiter));
            self.maybe_send_blocked_frame(&mut state);
            QueueSlot {
                map: self,
                waiter,
                queued: true,
            }
        };

        loop {
            let cancelled = tokio::select! {
                biased;
                _ = &mut cancel => true,
                _ = slot.waiter.notified() => false,
            };
            if cancelled {
                // dropping `slot` gives up our place in the queue
                return Err(StreamError::Cancelled);
            }

            let mut state = self.write();

            if let Some(err) = &state.close_err {
                slot.queued = false;
                return Err(StreamError::Closed(err.clone()));
            }
            if !state.has_capacity() {
                // no stream available, keep waiting
                continue;
            }

            let stream = self.open(&mut state);
            state.open_queue.retain(|w| !Arc::ptr_eq(w, &slot.waiter));
            slot.queued = false;
            state.maybe_unblock_open_sync();
            return Ok(stream);
        }
    }

    /// Like [`open_stream_sync`], giving up after `timeout`.
    ///
    /// [`open_stream_sync`]: OutgoingStreamsMap::open_stream_sync
    pub async fn open_stream_timeout(&self, timeout: Duration) -> Result<Arc<S>, StreamError> {
        self.open_stream_sync(tokio::time::sleep(timeout)).await
    }

    /// Look up a stream we opened.
    ///
    /// Returns `Ok(None)` for a stream that was opened and has since been
    /// deleted. A number we never handed out means the peer referenced a
    /// stream that does not exist.
    pub fn get_stream(&self, num: StreamNum) -> Result<Option<Arc<S>>, StreamError> {
        let state = self.read();
        if num >= state.next_stream {
            return Err(StreamError::PeerOpenedUnknown(num));
        }
        Ok(state.streams.get(&num).cloned())
    }

    /// Forget a stream once it is fully closed.
    pub fn delete_stream(&self, num: StreamNum) -> Result<(), StreamError> {
        let mut state = self.write();
        if state.streams.remove(&num).is_none() {
            return Err(StreamError::UnknownStream(num));
        }
        tracing::trace!("Deleted outgoing {:?} stream {}", self.stream_type, num);
        Ok(())
    }

    /// Apply a MAX_STREAMS limit from the peer. Limits never decrease.
    pub fn set_max_stream(&self, num: StreamNum) {
        let mut state = self.write();

        if num <= state.max_stream {
            return;
        }
        tracing::debug!(
            "Outgoing {:?} stream limit raised from {} to {}",
            self.stream_type,
            state.max_stream,
            num
        );
        state.max_stream = num;
        state.blocked_sent = false;

        // Still short for everyone already waiting: tell the peer right away.
        let wanted = state.next_stream.0 - 1 + state.open_queue.len() as u64;
        if state.max_stream.0 < wanted {
            self.maybe_send_blocked_frame(&mut state);
        }
        state.maybe_unblock_open_sync();
    }

    /// Apply the peer's initial send window to every stream opened so far.
    ///
    /// Streams opened before the transport parameters were known (0-RTT)
    /// started with a provisional window.
    pub fn update_send_window(&self, limit: u64) {
        let state = self.read();
        for stream in state.streams.values() {
            stream.update_send_window(limit);
        }
    }

    /// Close the map. Every live stream is shut down and every waiting opener
    /// fails with `err`. Only the first call has an effect.
    pub fn close_with_error(&self, err: ConnectionError) {
        let mut state = self.write();

        if state.close_err.is_some() {
            return;
        }
        tracing::debug!(
            "Closing outgoing {:?} streams ({} open, {} waiting): {}",
            self.stream_type,
            state.streams.len(),
            state.open_queue.len(),
            err
        );

        for stream in state.streams.values() {
            stream.close_for_shutdown(&err);
        }
        for waiter in state.open_queue.drain(..) {
            waiter.notify_one();
        }
        state.close_err = Some(err);
    }

    /// Number of streams currently tracked.
    pub fn len(&self) -> usize {
        self.read().streams.len()
    }

    /// Whether no streams are currently tracked.
    pub fn is_empty(&self) -> bool {
        self.read().streams.is_empty()
    }

    /// The current limit granted by the peer.
    pub fn max_stream(&self) -> StreamNum {
        self.read().max_stream
    }

    /// The number the next opened stream will get.
    pub fn next_stream(&self) -> StreamNum {
        self.read().next_stream
    }

    fn open(&self, state: &mut State<S>) -> Arc<S> {
        let num = state.next_stream;
        let stream = Arc::new((self.new_stream)(num));
        state.streams.insert(num, Arc::clone(&stream));
        state.next_stream = num.next();
        tracing::trace!("Opened outgoing {:?} stream {}", self.stream_type, num);
        stream
    }

    /// Queue a STREAMS_BLOCKED frame for the current limit, unless one was
    /// already queued for it.
    fn maybe_send_blocked_frame(&self, state: &mut State<S>) {
        if state.blocked_sent {
            return;
        }
        tracing::debug!(
            "Outgoing {:?} streams blocked at limit {}",
            self.stream_type,
            state.max_stream
        );
        self.control_frames.queue_control_frame(StreamsBlockedFrame {
            stream_type: self.stream_type,
            stream_limit: state.max_stream,
        });
        state.blocked_sent = true;
    }

    fn read(&self) -> RwLockReadGuard<'_, State<S>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State<S>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A place in the open queue held by a waiting `open_stream_sync` call.
///
/// Dropped while still queued (cancellation, timeout, task abort), it leaves
/// the queue and hands any pending wakeup to the next waiter.
struct QueueSlot<'a, S: OutgoingStream> {
    map: &'a OutgoingStreamsMap<S>,
    waiter: Arc<Notify>,
    queued: bool,
}

impl<S: OutgoingStream> Drop for QueueSlot<'_, S> {
    fn drop(&mut self) {
        if !self.queued {
            return;
        }
        let mut state = self.map.write();
        state.open_queue.retain(|w| !Arc::ptr_eq(w, &self.waiter));
        // A limit increase may have been meant for us. Pass it on.
        state.maybe_unblock_open_sync();
    }
}

impl<S> std::fmt::Debug for OutgoingStreamsMap<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("OutgoingStreamsMap")
            .field("stream_type", &self.stream_type)
            .field("streams", &state.streams.len())
            .field("waiting", &state.open_queue.len())
            .field("next_stream", &state.next_stream)
            .field("max_stream", &state.max_stream)
            .field("blocked_sent", &state.blocked_sent)
            .field("closed", &state.close_err.is_some())
            .finish()
    }
}
