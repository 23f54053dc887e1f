//! `DocumentHost` over the live DOM.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use framesync_agent::{DocumentHost, LayoutMetrics, Notify, ObserverId, ScrollSample};
use framesync_transport::diag;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, HtmlElement, ResizeObserver, Window};

use crate::error::describe;

type EventClosure = Closure<dyn FnMut()>;

#[derive(Default)]
struct Observation {
    window_events: Vec<(&'static str, EventClosure)>,
    resize: Option<(ResizeObserver, EventClosure)>,
}

pub(crate) struct BrowserDocument {
    window: Window,
    document: Document,
    log: bool,
    observers: RefCell<HashMap<u64, Observation>>,
    next_observer: Cell<u64>,
}

impl BrowserDocument {
    pub(crate) fn new(window: Window, document: Document, log: bool) -> Self {
        Self {
            window,
            document,
            log,
            observers: RefCell::new(HashMap::new()),
            next_observer: Cell::new(1),
        }
    }

    fn listen(&self, observation: &mut Observation, kind: &'static str, callback: EventClosure) {
        match self
            .window
            .add_event_listener_with_callback(kind, callback.as_ref().unchecked_ref())
        {
            Ok(()) => observation.window_events.push((kind, callback)),
            Err(err) => {
                diag!(self.log, warn, event = kind, error = %describe(&err), "failed to listen for window event");
            }
        }
    }

    fn keep(&self, observation: Observation) -> ObserverId {
        let id = self.next_observer.get();
        self.next_observer.set(id + 1);
        self.observers.borrow_mut().insert(id, observation);
        ObserverId::new(id)
    }

    fn release(&self, observation: Observation) {
        for (kind, callback) in observation.window_events {
            let _ = self
                .window
                .remove_event_listener_with_callback(kind, callback.as_ref().unchecked_ref());
        }
        if let Some((observer, _callback)) = observation.resize {
            observer.disconnect();
        }
    }
}

/// One JS callback around a notify shared by several event sources.
fn callback(notify: &Rc<RefCell<Notify>>) -> EventClosure {
    let notify = Rc::clone(notify);
    EventClosure::new(move || {
        if let Ok(mut notify) = notify.try_borrow_mut() {
            (*notify)();
        }
    })
}

impl DocumentHost for BrowserDocument {
    fn has_embedding_context(&self) -> bool {
        match self.window.parent() {
            Ok(Some(parent)) => JsValue::from(parent) != JsValue::from(self.window.clone()),
            _ => false,
        }
    }

    fn measure(&self) -> LayoutMetrics {
        let mut metrics = LayoutMetrics::default();
        if let Some(body) = self.document.body() {
            metrics.content_scroll_height = f64::from(body.scroll_height());
            metrics.content_scroll_width = f64::from(body.scroll_width());
        }
        if let Some(root) = self.document.document_element() {
            metrics.root_scroll_height = f64::from(root.scroll_height());
            metrics.root_scroll_width = f64::from(root.scroll_width());
            if let Some(root) = root.dyn_ref::<HtmlElement>() {
                metrics.root_offset_height = f64::from(root.offset_height());
                metrics.root_offset_width = f64::from(root.offset_width());
            }
        }
        metrics
    }

    fn scroll_sample(&self) -> ScrollSample {
        let (document_left, document_top) = self
            .document
            .document_element()
            .map(|root| (f64::from(root.scroll_left()), f64::from(root.scroll_top())))
            .unwrap_or_default();
        ScrollSample {
            page_x: self.window.scroll_x().ok(),
            page_y: self.window.scroll_y().ok(),
            document_left,
            document_top,
        }
    }

    fn observe_layout(&self, notify: Notify) -> ObserverId {
        let notify = Rc::new(RefCell::new(notify));
        let mut observation = Observation::default();

        let on_resize = callback(&notify);
        match ResizeObserver::new(on_resize.as_ref().unchecked_ref()) {
            Ok(observer) => {
                if let Some(body) = self.document.body() {
                    observer.observe(&body);
                }
                observation.resize = Some((observer, on_resize));
            }
            Err(err) => {
                diag!(self.log, warn, error = %describe(&err), "ResizeObserver unavailable, using window resize only");
            }
        }
        self.listen(&mut observation, "resize", callback(&notify));
        self.keep(observation)
    }

    fn observe_scroll(&self, notify: Notify) -> ObserverId {
        let notify = Rc::new(RefCell::new(notify));
        let mut observation = Observation::default();
        self.listen(&mut observation, "scroll", callback(&notify));
        self.keep(observation)
    }

    fn unobserve(&self, id: ObserverId) -> bool {
        let removed = self.observers.borrow_mut().remove(&id.raw());
        match removed {
            Some(observation) => {
                self.release(observation);
                true
            }
            None => false,
        }
    }
}

impl Drop for BrowserDocument {
    fn drop(&mut self) {
        let observers: Vec<_> = self.observers.get_mut().drain().map(|(_, o)| o).collect();
        for observation in observers {
            self.release(observation);
        }
    }
}
