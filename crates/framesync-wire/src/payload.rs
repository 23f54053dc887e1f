use serde::{Deserialize, Serialize};

/// Content size reported by a `resize` message.
///
/// `width` is optional on the wire; agents built from this crate always send it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Dimension {
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
}

impl Dimension {
    pub fn new(height: f64, width: f64) -> Self {
        Self {
            height,
            width: Some(width),
        }
    }
}

/// Scroll offset reported by a `scroll` message.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScrollPosition {
    pub top: f64,
    pub left: f64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn width_is_optional_on_the_wire() {
        let dim: Dimension = serde_json::from_value(json!({ "height": 250 })).unwrap();
        assert_eq!(dim.height, 250.0);
        assert_eq!(dim.width, None);

        let encoded = serde_json::to_value(Dimension {
            height: 1.0,
            width: None,
        })
        .unwrap();
        assert_eq!(encoded, json!({ "height": 1.0 }));
    }

    #[test]
    fn scroll_requires_both_axes() {
        assert!(serde_json::from_value::<ScrollPosition>(json!({ "top": 1 })).is_err());
    }
}
