//! Access to the embedded document's layout and scroll state.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use framesync_transport::Scheduler;

use crate::detector::{LayoutMetrics, ScrollSample};

/// Callback run when the document reports a layout or scroll change.
pub type Notify = Box<dyn FnMut()>;

/// Handle for an installed observer, used to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// The document a child agent runs in.
pub trait DocumentHost {
    /// Returns true when the document is embedded in a distinct parent context.
    fn has_embedding_context(&self) -> bool;

    /// Current layout measurements.
    fn measure(&self) -> LayoutMetrics;

    /// Current scroll readings.
    fn scroll_sample(&self) -> ScrollSample;

    /// Run `notify` whenever content may have changed size.
    fn observe_layout(&self, notify: Notify) -> ObserverId;

    /// Run `notify` on every scroll event.
    fn observe_scroll(&self, notify: Notify) -> ObserverId;

    /// Remove an observer. Returns false if it was not installed.
    fn unobserve(&self, id: ObserverId) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObserverKind {
    Layout,
    Scroll,
}

type SharedNotify = Rc<RefCell<Notify>>;

/// In-memory document driven by tests and the simulator.
///
/// Every mutation queues a notification on the scheduler, the way a
/// browser delivers mutation and scroll events on a later turn. Layout
/// notifications fire even when the mutation left the size unchanged.
pub struct MemoryDocument {
    scheduler: Rc<dyn Scheduler>,
    embedded: bool,
    metrics: Cell<LayoutMetrics>,
    scroll: Cell<ScrollSample>,
    observers: RefCell<Vec<(ObserverId, ObserverKind, SharedNotify)>>,
    next_observer: Cell<u64>,
}

impl MemoryDocument {
    /// A document embedded in a parent context.
    pub fn embedded(scheduler: Rc<dyn Scheduler>) -> Rc<Self> {
        Self::new(scheduler, true)
    }

    /// A top-level document with no embedder.
    pub fn top_level(scheduler: Rc<dyn Scheduler>) -> Rc<Self> {
        Self::new(scheduler, false)
    }

    fn new(scheduler: Rc<dyn Scheduler>, embedded: bool) -> Rc<Self> {
        Rc::new(Self {
            scheduler,
            embedded,
            metrics: Cell::new(LayoutMetrics::default()),
            scroll: Cell::new(ScrollSample::page(0.0, 0.0)),
            observers: RefCell::new(Vec::new()),
            next_observer: Cell::new(1),
        })
    }

    /// Replace all layout measurements.
    pub fn set_metrics(self: &Rc<Self>, metrics: LayoutMetrics) {
        self.metrics.set(metrics);
        self.notify(ObserverKind::Layout);
    }

    pub fn set_content_height(self: &Rc<Self>, height: f64) {
        let mut metrics = self.metrics.get();
        metrics.content_scroll_height = height;
        self.set_metrics(metrics);
    }

    pub fn set_content_width(self: &Rc<Self>, width: f64) {
        let mut metrics = self.metrics.get();
        metrics.content_scroll_width = width;
        self.set_metrics(metrics);
    }

    /// A mutation that leaves the layout as it was.
    pub fn touch(self: &Rc<Self>) {
        self.notify(ObserverKind::Layout);
    }

    /// Scroll the page to `(left, top)`.
    pub fn scroll_to(self: &Rc<Self>, left: f64, top: f64) {
        self.set_scroll_sample(ScrollSample::page(left, top));
    }

    /// Replace the raw scroll readings and fire a scroll event.
    pub fn set_scroll_sample(self: &Rc<Self>, sample: ScrollSample) {
        self.scroll.set(sample);
        self.notify(ObserverKind::Scroll);
    }

    /// Number of installed observers.
    pub fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }

    fn notify(self: &Rc<Self>, kind: ObserverKind) {
        let doc: Weak<Self> = Rc::downgrade(self);
        self.scheduler.defer(Box::new(move || {
            if let Some(doc) = doc.upgrade() {
                doc.fire(kind);
            }
        }));
    }

    fn fire(&self, kind: ObserverKind) {
        let snapshot: Vec<(ObserverId, SharedNotify)> = self
            .observers
            .borrow()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(id, _, notify)| (*id, Rc::clone(notify)))
            .collect();

        for (id, notify) in snapshot {
            if !self.is_observing(id) {
                continue;
            }
            match notify.try_borrow_mut() {
                Ok(mut notify) => (*notify)(),
                Err(_) => tracing::warn!(observer = id.raw(), "skipping re-entrant observer"),
            }
        }
    }

    fn is_observing(&self, id: ObserverId) -> bool {
        self.observers.borrow().iter().any(|(oid, _, _)| *oid == id)
    }

    fn observe(&self, kind: ObserverKind, notify: Notify) -> ObserverId {
        let id = ObserverId::new(self.next_observer.get());
        self.next_observer.set(id.raw() + 1);
        self.observers
            .borrow_mut()
            .push((id, kind, Rc::new(RefCell::new(notify))));
        id
    }
}

impl DocumentHost for MemoryDocument {
    fn has_embedding_context(&self) -> bool {
        self.embedded
    }

    fn measure(&self) -> LayoutMetrics {
        self.metrics.get()
    }

    fn scroll_sample(&self) -> ScrollSample {
        self.scroll.get()
    }

    fn observe_layout(&self, notify: Notify) -> ObserverId {
        self.observe(ObserverKind::Layout, notify)
    }

    fn observe_scroll(&self, notify: Notify) -> ObserverId {
        self.observe(ObserverKind::Scroll, notify)
    }

    fn unobserve(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|(oid, _, _)| *oid != id);
        observers.len() != before
    }
}
