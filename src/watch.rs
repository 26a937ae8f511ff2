//! Change notification types for consumers of a store.
//!
//! Every write to a [`StateStore`](crate::StateStore) publishes one
//! [`StateChange`]. Consumers either read the raw [`ChangeStream`] or a
//! [`SelectionStream`], which only yields when the selected values change
//! under structural equality.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::debug;

use crate::state::{pick, State};

/// How a write was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Keys were overlaid onto the existing state.
    Merged,
    /// The whole state was substituted.
    Replaced,
}

/// A write applied to the store.
#[derive(Debug, Clone)]
pub struct StateChange {
    /// How the write was applied.
    pub kind: ChangeKind,
    /// State before the write.
    pub previous: Arc<State>,
    /// State after the write.
    pub current: Arc<State>,
}

impl StateChange {
    /// Create a change event.
    pub fn new(kind: ChangeKind, previous: State, current: State) -> Self {
        Self {
            kind,
            previous: Arc::new(previous),
            current: Arc::new(current),
        }
    }

    /// Keys whose value differs between `previous` and `current`,
    /// including keys that were added or removed.
    pub fn changed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .current
            .iter()
            .filter(|(key, value)| self.previous.get(key.as_str()) != Some(*value))
            .map(|(key, _)| key.clone())
            .collect();
        keys.extend(
            self.previous
                .keys()
                .filter(|key| !self.current.contains_key(key.as_str()))
                .cloned(),
        );
        keys
    }
}

/// A stream of every change applied to a store.
///
/// A subscriber that falls more than the channel capacity behind skips the
/// changes it missed and continues with the oldest one still buffered.
pub struct ChangeStream {
    inner: BroadcastStream<StateChange>,
}

impl ChangeStream {
    /// Create a new change stream.
    pub fn new(receiver: broadcast::Receiver<StateChange>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
        }
    }

    /// Narrow this stream to the properties in `selection`, starting from
    /// their values in `initial`.
    pub fn select(self, selection: &[String], initial: &State) -> SelectionStream {
        SelectionStream {
            inner: self,
            keys: selection.to_vec(),
            last: pick(initial, selection),
        }
    }
}

impl Stream for ChangeStream {
    type Item = StateChange;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(change))) => return Poll::Ready(Some(change)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    debug!(skipped, "change stream lagged");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// A stream of selected values, yielding only when they change.
///
/// Values are returned in the order the properties were selected; missing
/// properties read as `Null`.
pub struct SelectionStream {
    inner: ChangeStream,
    keys: Vec<String>,
    last: Vec<Value>,
}

impl SelectionStream {
    /// Selected property names.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Most recently yielded values.
    pub fn current(&self) -> &[Value] {
        &self.last
    }
}

impl Stream for SelectionStream {
    type Item = Vec<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(change)) => {
                    let selected = pick(&change.current, &self.keys);
                    if selected != self.last {
                        self.last = selected.clone();
                        return Poll::Ready(Some(selected));
                    }
                    // Selection unchanged, keep polling
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Handle for publishing changes to subscribers.
///
/// Closing the sender ends every outstanding stream once buffered changes
/// have been drained.
pub struct ChangeSender {
    sender: RwLock<Option<broadcast::Sender<StateChange>>>,
    capacity: usize,
}

impl ChangeSender {
    /// Create a new change sender with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: RwLock::new(Some(sender)),
            capacity,
        }
    }

    /// Send a change to all subscribers.
    pub fn send(&self, change: StateChange) {
        if let Some(sender) = self.sender.read().as_ref() {
            // Ignore send errors (no subscribers)
            let _ = sender.send(change);
        }
    }

    /// Subscribe to changes. After [`close`](Self::close) the stream ends
    /// immediately.
    pub fn subscribe(&self) -> ChangeStream {
        match self.sender.read().as_ref() {
            Some(sender) => ChangeStream::new(sender.subscribe()),
            None => {
                let (_, receiver) = broadcast::channel(self.capacity.max(1));
                ChangeStream::new(receiver)
            }
        }
    }

    /// Drop the underlying sender, ending all streams.
    pub fn close(&self) {
        self.sender.write().take();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Get the number of current subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender
            .read()
            .as_ref()
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }
}

impl Default for ChangeSender {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{into_state, parse_selection};
    use serde_json::json;
    use tokio_stream::StreamExt;

    fn state(value: Value) -> State {
        into_state(value).unwrap()
    }

    #[test]
    fn test_change_kind_serialize() {
        let json = serde_json::to_string(&ChangeKind::Replaced).unwrap();
        assert_eq!(json, "\"Replaced\"");
    }

    #[test]
    fn test_changed_keys() {
        let change = StateChange::new(
            ChangeKind::Replaced,
            state(json!({"a": 1, "b": 2, "gone": true})),
            state(json!({"a": 1, "b": 3, "new": null})),
        );
        assert_eq!(change.changed_keys(), vec!["b", "new", "gone"]);
    }

    #[tokio::test]
    async fn test_stream_receives_changes() {
        let sender = ChangeSender::new(16);
        let mut stream = sender.subscribe();
        assert_eq!(sender.receiver_count(), 1);

        sender.send(StateChange::new(
            ChangeKind::Merged,
            State::new(),
            state(json!({"count": 1})),
        ));

        let change = stream.next().await.unwrap();
        assert_eq!(change.kind, ChangeKind::Merged);
        assert_eq!(change.current["count"], json!(1));
    }

    #[tokio::test]
    async fn test_lagged_stream_skips_missed_changes() {
        let sender = ChangeSender::new(2);
        let stream = sender.subscribe();

        for count in 1..=4 {
            sender.send(StateChange::new(
                ChangeKind::Merged,
                State::new(),
                state(json!({ "count": count })),
            ));
        }
        sender.close();

        let seen: Vec<Value> = stream.map(|change| change.current["count"].clone()).collect().await;
        assert_eq!(seen, vec![json!(3), json!(4)]);
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let sender = ChangeSender::new(16);
        let mut stream = sender.subscribe();

        sender.close();
        assert!(sender.is_closed());
        assert!(stream.next().await.is_none());

        let mut late = sender.subscribe();
        assert!(late.next().await.is_none());
        assert_eq!(sender.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_selection_skips_unrelated_changes() {
        let sender = ChangeSender::new(16);
        let initial = state(json!({"count": 1, "other": 0}));
        let keys = parse_selection("count");
        let mut selection = sender.subscribe().select(&keys, &initial);

        // Only `other` changes: nothing to yield for the selection.
        sender.send(StateChange::new(
            ChangeKind::Merged,
            initial.clone(),
            state(json!({"count": 1, "other": 1})),
        ));
        sender.send(StateChange::new(
            ChangeKind::Merged,
            state(json!({"count": 1, "other": 1})),
            state(json!({"count": 2, "other": 1})),
        ));
        sender.close();

        assert_eq!(selection.next().await, Some(vec![json!(2)]));
        assert_eq!(selection.current(), &[json!(2)]);
        assert_eq!(selection.next().await, None);
    }
}
