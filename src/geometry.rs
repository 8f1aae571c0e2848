//! Integer rectangles in pixel space.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Largest coordinate magnitude accepted when parsing a rect.
pub const MAX_COORDINATE: i32 = 1 << 24;

/// Axis-aligned rectangle with exclusive right/bottom edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle anchored at the origin.
    pub const fn from_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> i32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> i32 {
        self.bottom.saturating_sub(self.top)
    }

    /// True when the rectangle encloses no area.
    pub fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    pub fn is_landscape(&self) -> bool {
        self.width() > self.height()
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(
            self.left.saturating_add(dx),
            self.top.saturating_add(dy),
            self.right.saturating_add(dx),
            self.bottom.saturating_add(dy),
        )
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{}][{},{}]",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Parses `left,top,right,bottom`; each edge must lie within
/// [`MAX_COORDINATE`] of the origin.
impl FromStr for Rect {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts = raw
            .split(',')
            .map(|part| part.trim().parse::<i32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid rect {raw:?}: {e}"))?;
        match parts.as_slice() {
            [left, top, right, bottom] => {
                if let Some(edge) = parts
                    .iter()
                    .find(|edge| edge.unsigned_abs() > MAX_COORDINATE.unsigned_abs())
                {
                    return Err(format!(
                        "invalid rect {raw:?}: {edge} is outside +/-{MAX_COORDINATE}"
                    ));
                }
                Ok(Rect::new(*left, *top, *right, *bottom))
            }
            _ => Err(format!(
                "invalid rect {raw:?}: expected left,top,right,bottom"
            )),
        }
    }
}

/// Per-edge insets, used for system decorations along the display edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Insets {
    #[serde(default)]
    pub left: i32,
    #[serde(default)]
    pub top: i32,
    #[serde(default)]
    pub right: i32,
    #[serde(default)]
    pub bottom: i32,
}

impl Insets {
    /// Shrink `bounds` by the insets on each edge that touches `display`.
    pub fn subtract_from(&self, bounds: &Rect, display: &Rect) -> Rect {
        let mut out = *bounds;
        if bounds.left <= display.left {
            out.left = out.left.saturating_add(self.left);
        }
        if bounds.top <= display.top {
            out.top = out.top.saturating_add(self.top);
        }
        if bounds.right >= display.right {
            out.right = out.right.saturating_sub(self.right);
        }
        if bounds.bottom >= display.bottom {
            out.bottom = out.bottom.saturating_sub(self.bottom);
        }
        out
    }
}
