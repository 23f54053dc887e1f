use framesync_wire::{Dimension, ScrollPosition};

/// Raw layout measurements of the embedded document.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LayoutMetrics {
    /// Content root (`body`) scroll size.
    pub content_scroll_height: f64,
    pub content_scroll_width: f64,
    /// Document root (`html`) scroll size.
    pub root_scroll_height: f64,
    pub root_scroll_width: f64,
    /// Document root (`html`) offset size.
    pub root_offset_height: f64,
    pub root_offset_width: f64,
}

impl LayoutMetrics {
    /// Metrics for content of the given size inside an empty root.
    pub fn content(height: f64, width: f64) -> Self {
        Self {
            content_scroll_height: height,
            content_scroll_width: width,
            ..Self::default()
        }
    }

    /// Largest of the three height and width measures.
    pub fn dimension(&self) -> Dimension {
        Dimension::new(
            self.content_scroll_height
                .max(self.root_scroll_height)
                .max(self.root_offset_height),
            self.content_scroll_width
                .max(self.root_scroll_width)
                .max(self.root_offset_width),
        )
    }
}

/// Raw scroll readings of the embedded document.
///
/// Page offsets (`scrollX`/`scrollY`) are preferred; hosts that do not
/// expose them fall back to the document root's `scrollLeft`/`scrollTop`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollSample {
    pub page_x: Option<f64>,
    pub page_y: Option<f64>,
    pub document_left: f64,
    pub document_top: f64,
}

impl ScrollSample {
    pub fn page(left: f64, top: f64) -> Self {
        Self {
            page_x: Some(left),
            page_y: Some(top),
            ..Self::default()
        }
    }

    pub fn position(&self) -> ScrollPosition {
        ScrollPosition {
            top: self.page_y.unwrap_or(self.document_top),
            left: self.page_x.unwrap_or(self.document_left),
        }
    }
}

/// Decides when a layout change is worth reporting.
///
/// Keeps the last emitted dimension; a check emits only when the measured
/// dimension differs from it, or when forced.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last: Option<Dimension>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the dimension to emit, if any, and records it as emitted.
    pub fn check(&mut self, metrics: &LayoutMetrics, force: bool) -> Option<Dimension> {
        let current = metrics.dimension();
        if !force && self.last == Some(current) {
            return None;
        }
        self.last = Some(current);
        Some(current)
    }

    /// Last emitted dimension.
    pub fn last(&self) -> Option<Dimension> {
        self.last
    }
}
