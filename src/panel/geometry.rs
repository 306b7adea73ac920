//! 浮窗定位

use serde::{Deserialize, Serialize};

/// 浮窗与视口边缘的最小距离（像素）
pub const PANEL_MARGIN: f64 = 10.0;

/// 放不下时改为显示在选区下方的偏移
const BELOW_SELECTION_OFFSET: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub fn right(&self) -> f64 {
        self.origin.x + self.size.width
    }

    pub fn bottom(&self) -> f64 {
        self.origin.y + self.size.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// 初始位置：默认在锚点上方，超出左右边界时收回，超出顶部时翻到选区下方
pub fn initial_position(anchor: Point, panel: Size, viewport: Viewport) -> Point {
    let mut x = anchor.x;
    let mut y = anchor.y - panel.height - PANEL_MARGIN;

    if x + panel.width > viewport.width - PANEL_MARGIN {
        x = viewport.width - panel.width - PANEL_MARGIN;
    }
    if x < PANEL_MARGIN {
        x = PANEL_MARGIN;
    }

    if y < PANEL_MARGIN {
        y = anchor.y + BELOW_SELECTION_OFFSET;
    }

    Point { x, y }
}

/// 内容增长后重新收回视口；不需要移动时返回 None
pub fn clamp_to_viewport(rect: Rect, viewport: Viewport) -> Option<Point> {
    let mut adjusted = false;
    let mut left = rect.origin.x;
    let mut top = rect.origin.y;

    if rect.right() > viewport.width - PANEL_MARGIN {
        left = viewport.width - rect.size.width - PANEL_MARGIN;
        adjusted = true;
    }
    if rect.bottom() > viewport.height - PANEL_MARGIN {
        top = viewport.height - rect.size.height - PANEL_MARGIN;
        adjusted = true;
    }

    adjusted.then(|| Point {
        x: left.max(PANEL_MARGIN),
        y: top.max(PANEL_MARGIN),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWPORT: Viewport = Viewport {
        width: 1000.0,
        height: 800.0,
    };
    const PANEL: Size = Size {
        width: 300.0,
        height: 100.0,
    };

    #[test]
    fn test_initial_position_above_anchor() {
        let p = initial_position(Point::new(200.0, 400.0), PANEL, VIEWPORT);
        assert_eq!(p, Point::new(200.0, 290.0));
    }

    #[test]
    fn test_initial_position_flips_below_and_pulls_left() {
        let p = initial_position(Point::new(900.0, 50.0), PANEL, VIEWPORT);
        assert_eq!(p, Point::new(690.0, 70.0));

        let p = initial_position(Point::new(-5.0, 400.0), PANEL, VIEWPORT);
        assert_eq!(p.x, PANEL_MARGIN);
    }

    #[test]
    fn test_clamp_only_when_overflowing() {
        let inside = Rect {
            origin: Point::new(100.0, 100.0),
            size: PANEL,
        };
        assert_eq!(clamp_to_viewport(inside, VIEWPORT), None);

        let grown = Rect {
            origin: Point::new(100.0, 600.0),
            size: Size {
                width: 300.0,
                height: 250.0,
            },
        };
        assert_eq!(
            clamp_to_viewport(grown, VIEWPORT),
            Some(Point::new(100.0, 540.0))
        );
    }

    #[test]
    fn test_clamp_floors_at_margin() {
        let huge = Rect {
            origin: Point::new(50.0, 50.0),
            size: Size {
                width: 2000.0,
                height: 2000.0,
            },
        };
        assert_eq!(
            clamp_to_viewport(huge, VIEWPORT),
            Some(Point::new(PANEL_MARGIN, PANEL_MARGIN))
        );
    }
}
