//! Push-based streams with owned teardown.
//!
//! Sources push into an [`Emitter`]; consumers read a [`SensorStream`], which
//! is an ordinary [`futures::Stream`]. Dropping the stream runs the source's
//! teardown exactly once. [`Shared`] multicasts one source to many streams
//! and tears it down when the last of them goes away.

use std::cell::{Cell, RefCell};
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::future;
use futures::stream::{self, Stream, StreamExt};

use crate::error::SensorError;

pub type Teardown = Box<dyn FnOnce()>;
pub type Item<T> = Result<T, SensorError>;

pub fn no_teardown() -> Teardown {
    Box::new(|| {})
}

/// Write end of a stream.
pub struct Emitter<T> {
    sink: Sink<T>,
}

enum Sink<T> {
    Channel(UnboundedSender<Item<T>>),
    Fanout(Weak<Hub<T>>),
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        let sink = match &self.sink {
            Sink::Channel(tx) => Sink::Channel(tx.clone()),
            Sink::Fanout(hub) => Sink::Fanout(hub.clone()),
        };
        Emitter { sink }
    }
}

impl<T: Clone> Emitter<T> {
    /// Push a value. Returns `false` once nobody is listening.
    pub fn next(&self, value: T) -> bool {
        match &self.sink {
            Sink::Channel(tx) => tx.unbounded_send(Ok(value)).is_ok(),
            Sink::Fanout(hub) => match hub.upgrade() {
                Some(hub) => hub.broadcast(value),
                None => false,
            },
        }
    }

    /// Push the one and only failure, then close.
    pub fn fail(&self, err: SensorError) {
        log::warn!("sensor stream failed: {}", err);
        match &self.sink {
            Sink::Channel(tx) => {
                let _ = tx.unbounded_send(Err(err));
                tx.close_channel();
            }
            Sink::Fanout(hub) => {
                if let Some(hub) = hub.upgrade() {
                    hub.fail(err);
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        match &self.sink {
            Sink::Channel(tx) => tx.is_closed(),
            Sink::Fanout(hub) => hub.upgrade().map_or(true, |hub| hub.failed.get()),
        }
    }
}

/// A stream of sensor values that ends after its first failure.
pub struct SensorStream<T> {
    inner: Pin<Box<dyn Stream<Item = Item<T>>>>,
    teardown: Option<Teardown>,
    finished: bool,
}

impl<T: Clone + 'static> SensorStream<T> {
    /// Connect a source: `connect` receives the emitter and hands back its teardown.
    pub fn new<F>(connect: F) -> Self
    where
        F: FnOnce(Emitter<T>) -> Teardown,
    {
        let (tx, rx) = mpsc::unbounded();
        let teardown = connect(Emitter { sink: Sink::Channel(tx) });
        Self::from_parts(rx, teardown)
    }

    /// A stream that delivers `err` and ends.
    pub fn failed(err: SensorError) -> Self {
        SensorStream::new(move |emitter| {
            emitter.fail(err);
            no_teardown()
        })
    }
}

impl<T: 'static> SensorStream<T> {
    fn from_parts(rx: UnboundedReceiver<Item<T>>, teardown: Teardown) -> Self {
        SensorStream {
            inner: Box::pin(rx),
            teardown: Some(teardown),
            finished: false,
        }
    }

    /// Detach from the source now rather than on drop.
    pub fn close(&mut self) {
        self.finished = true;
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn into_parts(mut self) -> (Pin<Box<dyn Stream<Item = Item<T>>>>, Option<Teardown>) {
        let inner = std::mem::replace(&mut self.inner, Box::pin(stream::empty()));
        (inner, self.teardown.take())
    }

    /// Transform every value, keeping the same teardown.
    pub fn map<U, F>(self, mut f: F) -> SensorStream<U>
    where
        U: 'static,
        F: FnMut(T) -> U + 'static,
    {
        let (inner, teardown) = self.into_parts();
        SensorStream {
            inner: Box::pin(inner.map(move |item| item.map(&mut f))),
            teardown,
            finished: false,
        }
    }

    /// Leading-edge throttle: pass a value, then drop values for `window_ms`.
    ///
    /// Failures always pass.
    pub fn throttle<C>(self, window_ms: f64, clock: C) -> SensorStream<T>
    where
        C: Fn() -> f64 + 'static,
    {
        let (inner, teardown) = self.into_parts();
        let mut gate = Throttle::new(window_ms);
        let filtered = inner.filter(move |item| future::ready(item.is_err() || gate.admit(clock())));

        SensorStream {
            inner: Box::pin(filtered),
            teardown,
            finished: false,
        }
    }
}

impl<T: 'static> Stream for SensorStream<T> {
    type Item = Item<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Err(err))) => {
                self.close();
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                self.close();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl<T> Drop for SensorStream<T> {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

/// Leading-edge rate limiter over an external clock.
#[derive(Clone, Debug)]
pub struct Throttle {
    window_ms: f64,
    last: Option<f64>,
}

impl Throttle {
    pub fn new(window_ms: f64) -> Self {
        Throttle { window_ms, last: None }
    }

    pub fn admit(&mut self, now: f64) -> bool {
        match self.last {
            Some(last) if now - last < self.window_ms => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

struct Hub<T> {
    subscribers: RefCell<Vec<(u64, UnboundedSender<Item<T>>)>>,
    teardown: RefCell<Option<Teardown>>,
    next_id: Cell<u64>,
    failed: Cell<bool>,
}

impl<T: Clone> Hub<T> {
    fn new() -> Self {
        Hub {
            subscribers: RefCell::new(Vec::new()),
            teardown: RefCell::new(None),
            next_id: Cell::new(0),
            failed: Cell::new(false),
        }
    }

    fn attach(&self, tx: UnboundedSender<Item<T>>) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.subscribers.borrow_mut().push((id, tx));
        id
    }

    fn detach(&self, id: u64) {
        let now_empty = {
            let mut subscribers = self.subscribers.borrow_mut();
            subscribers.retain(|(other, _)| *other != id);
            subscribers.is_empty()
        };

        if now_empty {
            let teardown = self.teardown.borrow_mut().take();
            if let Some(teardown) = teardown {
                log::debug!("last subscriber left, releasing shared source");
                teardown();
            }
        }
    }

    fn broadcast(&self, value: T) -> bool {
        let subscribers = self.subscribers.borrow();
        let mut delivered = false;
        for (_, tx) in subscribers.iter() {
            delivered |= tx.unbounded_send(Ok(value.clone())).is_ok();
        }
        delivered
    }

    fn fail(&self, err: SensorError) {
        self.failed.set(true);
        for (_, tx) in self.subscribers.borrow().iter() {
            let _ = tx.unbounded_send(Err(err.clone()));
            tx.close_channel();
        }
    }
}

/// One source shared by reference count among any number of streams.
pub struct Shared<T> {
    connect: Box<dyn Fn(Emitter<T>) -> Teardown>,
    hub: RefCell<Weak<Hub<T>>>,
}

impl<T: Clone + 'static> Shared<T> {
    pub fn new<F>(connect: F) -> Self
    where
        F: Fn(Emitter<T>) -> Teardown + 'static,
    {
        Shared {
            connect: Box::new(connect),
            hub: RefCell::new(Weak::new()),
        }
    }

    /// Attach to the running source, connecting it first if nobody is attached
    /// or the previous connection failed.
    pub fn subscribe(&self) -> SensorStream<T> {
        let live = self.hub.borrow().upgrade().filter(|hub| !hub.failed.get());
        let (hub, fresh) = match live {
            Some(hub) => (hub, false),
            None => {
                let hub = Rc::new(Hub::new());
                *self.hub.borrow_mut() = Rc::downgrade(&hub);
                (hub, true)
            }
        };

        let (tx, rx) = mpsc::unbounded();
        let id = hub.attach(tx);

        if fresh {
            log::debug!("connecting shared source");
            let teardown = (self.connect)(Emitter {
                sink: Sink::Fanout(Rc::downgrade(&hub)),
            });
            *hub.teardown.borrow_mut() = Some(teardown);
        }

        SensorStream::from_parts(rx, Box::new(move || hub.detach(id)))
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub
            .borrow()
            .upgrade()
            .map_or(0, |hub| hub.subscribers.borrow().len())
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use futures::{FutureExt, StreamExt};

    use super::*;

    type Slot<T> = Rc<RefCell<Option<Emitter<T>>>>;

    fn captured<T: Clone + 'static>() -> (Slot<T>, Rc<Cell<u32>>, impl FnOnce(Emitter<T>) -> Teardown) {
        let slot: Slot<T> = Rc::new(RefCell::new(None));
        let torn = Rc::new(Cell::new(0));
        let (s, t) = (slot.clone(), torn.clone());
        let connect = move |emitter: Emitter<T>| -> Teardown {
            *s.borrow_mut() = Some(emitter);
            Box::new(move || t.set(t.get() + 1))
        };
        (slot, torn, connect)
    }

    #[test]
    fn values_arrive_in_push_order() {
        let (slot, _, connect) = captured::<u32>();
        let mut stream = SensorStream::new(connect);

        let emitter = slot.borrow().clone().unwrap();
        assert!(emitter.next(1));
        assert!(emitter.next(2));

        assert_eq!(block_on(stream.next()), Some(Ok(1)));
        assert_eq!(block_on(stream.next()), Some(Ok(2)));
    }

    #[test]
    fn a_failure_is_delivered_once_and_ends_the_stream() {
        let (slot, torn, connect) = captured::<u32>();
        let mut stream = SensorStream::new(connect);

        let emitter = slot.borrow().clone().unwrap();
        emitter.fail(SensorError::Unsupported("midi"));
        assert!(!emitter.next(5));
        assert!(emitter.is_closed());

        assert_eq!(block_on(stream.next()), Some(Err(SensorError::Unsupported("midi"))));
        assert_eq!(block_on(stream.next()), None);
        assert!(stream.is_finished());
        assert_eq!(torn.get(), 1);
    }

    #[test]
    fn teardown_runs_once_on_drop() {
        let (slot, torn, connect) = captured::<u32>();
        let mut stream = SensorStream::new(connect);

        stream.close();
        drop(stream);

        assert_eq!(torn.get(), 1);
        assert!(slot.borrow().as_ref().unwrap().is_closed());
    }

    #[test]
    fn failed_streams_yield_their_error() {
        let mut stream = SensorStream::<u8>::failed(SensorError::Configuration("bad".into()));
        assert_eq!(block_on(stream.next()), Some(Err(SensorError::Configuration("bad".into()))));
        assert_eq!(block_on(stream.next()), None);
    }

    #[test]
    fn map_keeps_the_source_teardown() {
        let (slot, torn, connect) = captured::<u32>();
        let mut doubled = SensorStream::new(connect).map(|v| v * 2);

        slot.borrow().as_ref().unwrap().next(21);
        assert_eq!(block_on(doubled.next()), Some(Ok(42)));

        drop(doubled);
        assert_eq!(torn.get(), 1);
    }

    #[test]
    fn throttle_drops_values_inside_the_window() {
        let clock = Rc::new(Cell::new(0.0));
        let (slot, _, connect) = captured::<u32>();
        let now = clock.clone();
        let mut throttled = SensorStream::new(connect).throttle(100.0, move || now.get());
        let emitter = slot.borrow().clone().unwrap();

        emitter.next(1);
        assert_eq!(block_on(throttled.next()), Some(Ok(1)));

        clock.set(50.0);
        emitter.next(2);
        assert_eq!(throttled.next().now_or_never(), None);

        clock.set(120.0);
        emitter.next(3);
        assert_eq!(block_on(throttled.next()), Some(Ok(3)));
    }

    #[test]
    fn throttle_gate_is_leading_edge() {
        let mut gate = Throttle::new(100.0);
        let admitted: Vec<f64> = [0.0, 50.0, 99.0, 100.0, 150.0, 260.0]
            .iter()
            .copied()
            .filter(|&at| gate.admit(at))
            .collect();

        assert_eq!(admitted, vec![0.0, 100.0, 260.0]);
    }

    #[test]
    fn shared_sources_connect_once_and_release_with_the_last_subscriber() {
        let connects = Rc::new(Cell::new(0));
        let torn = Rc::new(Cell::new(0));
        let slot: Slot<u32> = Rc::new(RefCell::new(None));

        let (c, t, s) = (connects.clone(), torn.clone(), slot.clone());
        let shared = Shared::new(move |emitter| {
            c.set(c.get() + 1);
            *s.borrow_mut() = Some(emitter);
            let t = t.clone();
            Box::new(move || t.set(t.get() + 1))
        });

        let mut first = shared.subscribe();
        let mut second = shared.subscribe();
        assert_eq!(connects.get(), 1);
        assert_eq!(shared.subscriber_count(), 2);

        slot.borrow().as_ref().unwrap().next(7);
        assert_eq!(block_on(first.next()), Some(Ok(7)));
        assert_eq!(block_on(second.next()), Some(Ok(7)));

        drop(first);
        assert_eq!(torn.get(), 0);
        drop(second);
        assert_eq!(torn.get(), 1);
        assert_eq!(shared.subscriber_count(), 0);

        let _third = shared.subscribe();
        assert_eq!(connects.get(), 2);
    }

    #[test]
    fn shared_failures_reach_every_subscriber_and_allow_retry() {
        let connects = Rc::new(Cell::new(0));
        let slot: Slot<u32> = Rc::new(RefCell::new(None));

        let (c, s) = (connects.clone(), slot.clone());
        let shared = Shared::new(move |emitter| {
            c.set(c.get() + 1);
            *s.borrow_mut() = Some(emitter);
            no_teardown()
        });

        let mut first = shared.subscribe();
        let mut second = shared.subscribe();
        slot.borrow().as_ref().unwrap().fail(SensorError::acquisition("microphone", "denied"));

        assert!(matches!(block_on(first.next()), Some(Err(SensorError::Acquisition { .. }))));
        assert!(matches!(block_on(second.next()), Some(Err(SensorError::Acquisition { .. }))));
        assert_eq!(block_on(first.next()), None);

        let _retry = shared.subscribe();
        assert_eq!(connects.get(), 2);
    }
}
