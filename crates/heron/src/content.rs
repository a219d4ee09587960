//! Lazy, cached, replayable content streams.
//!
//! A [`StreamedContent`] wraps a fragment producer (for example the token stream of an
//! upstream generation call) together with a reducer. The producer is pulled at most once:
//! every fragment is folded into an accumulator as it passes through, so the content can be
//! replayed or read in full later without asking the producer again.
use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Folds one fragment into the accumulated value.
pub type Reducer<T> = fn(&mut T, &T);

enum State<T> {
    /// Nothing has been pulled yet.
    Fresh(BoxStream<'static, T>),
    /// At least one fragment has been pulled, the producer may still have more.
    Draining(BoxStream<'static, T>),
    /// The producer is exhausted and the accumulator holds the final value.
    Cached,
}

struct Inner<T> {
    state: State<T>,
    accumulated: T,
}

/// A handle on content that may still be produced while it is being consumed.
///
/// Clones share the same producer and cache. Consumption is serialized internally, but the
/// content is meant to be drained by one logical consumer at a time; it is not a broadcast.
pub struct StreamedContent<T> {
    inner: Arc<Mutex<Inner<T>>>,
    reducer: Reducer<T>,
}

impl<T> Clone for StreamedContent<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            reducer: self.reducer,
        }
    }
}

impl<T> fmt::Debug for StreamedContent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamedContent").finish_non_exhaustive()
    }
}

impl<T> StreamedContent<T>
where
    T: Clone + Send + 'static,
{
    /// Wrap `producer`, starting the accumulator at `identity`.
    pub fn new<S>(producer: S, identity: T, reducer: Reducer<T>) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Fresh(producer.boxed()),
                accumulated: identity,
            })),
            reducer,
        }
    }

    /// Pull the next fragment from the producer, folding it into the accumulator.
    async fn pull(&self) -> Option<T> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let next = match &mut inner.state {
            State::Fresh(producer) | State::Draining(producer) => producer.next().await,
            State::Cached => return None,
        };

        match next {
            Some(fragment) => {
                (self.reducer)(&mut inner.accumulated, &fragment);
                if matches!(inner.state, State::Fresh(_)) {
                    inner.state = match std::mem::replace(&mut inner.state, State::Cached) {
                        State::Fresh(producer) => State::Draining(producer),
                        other => other,
                    };
                }
                Some(fragment)
            }
            None => {
                inner.state = State::Cached;
                None
            }
        }
    }

    /// The accumulated value so far, unless nothing has been pulled yet.
    async fn replay(&self) -> Option<T> {
        let inner = self.inner.lock().await;
        match inner.state {
            State::Fresh(_) => None,
            State::Draining(_) | State::Cached => Some(inner.accumulated.clone()),
        }
    }

    /// Iterate over the content.
    ///
    /// On first use this yields the producer's raw fragments. Once anything has been pulled,
    /// iteration starts with the accumulated value as a single fragment and then continues
    /// with whatever the producer has left.
    pub fn iterate(&self) -> BoxStream<'static, T> {
        let content = self.clone();
        Box::pin(async_stream::stream! {
            if let Some(accumulated) = content.replay().await {
                yield accumulated;
            }
            while let Some(fragment) = content.pull().await {
                yield fragment;
            }
        })
    }

    /// Drain the producer and return the final accumulated value.
    ///
    /// The producer is only ever drained once; later calls return the cached value.
    pub async fn get(&self) -> T {
        while self.pull().await.is_some() {}
        self.inner.lock().await.accumulated.clone()
    }

    /// Whether the producer has been fully drained.
    pub async fn is_cached(&self) -> bool {
        matches!(self.inner.lock().await.state, State::Cached)
    }
}

fn concatenate(accumulated: &mut String, fragment: &String) {
    accumulated.push_str(fragment);
}

fn take_last(accumulated: &mut Value, fragment: &Value) {
    *accumulated = fragment.clone();
}

impl StreamedContent<String> {
    /// Text content: fragments are concatenated, starting from the empty string.
    pub fn text<S>(producer: S) -> Self
    where
        S: Stream<Item = String> + Send + 'static,
    {
        Self::new(producer, String::new(), concatenate)
    }
}

impl StreamedContent<Value> {
    /// Structured content where only the last produced value matters.
    pub fn last<S>(producer: S, default: Value) -> Self
    where
        S: Stream<Item = Value> + Send + 'static,
    {
        Self::new(producer, default, take_last)
    }
}
