//! Study board canvas model

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event name used for canvas changes on a board channel
pub const CANVAS_CHANGE_EVENT: &str = "canvas-change";

/// Channel name for a study group's board
pub fn canvas_channel(group_id: &str) -> String {
    format!("canvas-{group_id}")
}

/// Point on the board
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextProperties {
    pub content: String,
    pub font_size: f64,
    pub font_family: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingProperties {
    /// Vector path as absolute points
    pub points: Vec<Position>,
    pub stroke: String,
    pub stroke_width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickyProperties {
    pub text: String,
    pub color: String,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Rectangle,
    Circle,
    Triangle,
    Line,
    Arrow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeProperties {
    pub shape: ShapeKind,
    pub width: f64,
    pub height: f64,
    pub fill: Option<String>,
    pub stroke: String,
}

/// Variant-specific element payload, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "properties", rename_all = "lowercase")]
pub enum ElementKind {
    Text(TextProperties),
    Drawing(DrawingProperties),
    Sticky(StickyProperties),
    Shape(ShapeProperties),
}

impl ElementKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Drawing(_) => "drawing",
            Self::Sticky(_) => "sticky",
            Self::Shape(_) => "shape",
        }
    }
}

/// An element on a study board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasElement {
    /// Unique within a board
    pub id: String,
    pub kind: ElementKind,
    pub position: Position,
    /// Paint order; higher layers are painted on top
    pub layer: i32,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

impl CanvasElement {
    pub fn new(kind: ElementKind, position: Position, layer: i32) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            kind,
            position,
            layer,
            created_by: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Mutation carried by a canvas broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Update,
    Delete,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// Broadcast envelope for a single canvas mutation; never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasChange {
    pub id: String,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub element: CanvasElement,
    pub user_id: String,
    /// Sender wall clock (Unix ms)
    pub timestamp: i64,
}

impl CanvasChange {
    pub fn new(
        change_type: ChangeType,
        element: CanvasElement,
        user_id: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            change_type,
            element,
            user_id: user_id.into(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sticky() -> CanvasElement {
        CanvasElement::new(
            ElementKind::Sticky(StickyProperties {
                text: "Exam on Friday".to_string(),
                color: "#ffeb3b".to_string(),
                width: 200.0,
                height: 150.0,
            }),
            Position::new(10.0, 20.0),
            1,
        )
        .with_id("e1")
    }

    #[test]
    fn test_element_kind_is_tagged_by_type() {
        let value = serde_json::to_value(sticky()).unwrap();
        assert_eq!(value["kind"]["type"], "sticky");
        assert_eq!(value["kind"]["properties"]["text"], "Exam on Friday");
    }

    #[test]
    fn test_change_parses_from_wire_shape() {
        let change: CanvasChange = serde_json::from_value(json!({
            "id": "c1",
            "type": "update",
            "user_id": "u1",
            "timestamp": 200,
            "element": {
                "id": "e1",
                "kind": {
                    "type": "shape",
                    "properties": {
                        "shape": "circle",
                        "width": 40.0,
                        "height": 40.0,
                        "fill": null,
                        "stroke": "#000"
                    }
                },
                "position": {"x": 1.0, "y": 2.0},
                "layer": 3
            }
        }))
        .unwrap();

        assert_eq!(change.change_type, ChangeType::Update);
        assert_eq!(change.element.kind.name(), "shape");
        assert_eq!(change.element.created_by, None);
    }

    #[test]
    fn test_rejects_unknown_element_type() {
        let result = serde_json::from_value::<ElementKind>(json!({
            "type": "video",
            "properties": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_canvas_channel_name() {
        assert_eq!(canvas_channel("g42"), "canvas-g42");
    }
}
