use unicode_width::UnicodeWidthStr;

/// Cells kept free between a popup and the viewport edge.
pub const MENU_PADDING: u16 = 1;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CellPoint {
    pub col: u16,
    pub row: u16,
}

impl CellPoint {
    pub fn new(col: u16, row: u16) -> Self {
        Self { col, row }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CellSize {
    pub width: u16,
    pub height: u16,
}

impl CellSize {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Viewport {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Viewport {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u16 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u16 {
        self.y.saturating_add(self.height)
    }

    pub fn contains(&self, point: CellPoint) -> bool {
        point.col >= self.x
            && point.col < self.right()
            && point.row >= self.y
            && point.row < self.bottom()
    }
}

/// Size guess used before the menu has been rendered once: widest label plus borders and
/// horizontal padding, one row per item plus borders.
pub fn estimate_menu_size(labels: &[&str]) -> CellSize {
    let widest = labels
        .iter()
        .map(|label| UnicodeWidthStr::width(*label))
        .max()
        .unwrap_or(0);
    let width = u16::try_from(widest.saturating_add(4)).unwrap_or(u16::MAX);
    let height = u16::try_from(labels.len().saturating_add(2)).unwrap_or(u16::MAX);
    CellSize { width, height }
}

/// Origin for a popup of `size` anchored at `anchor`, shifted so the whole box stays inside
/// `viewport` minus `padding` on every side. A box larger than the usable area is pinned to
/// the top-left padding corner.
pub fn place_menu(
    anchor: CellPoint,
    size: CellSize,
    viewport: Viewport,
    padding: u16,
) -> CellPoint {
    CellPoint {
        col: clamp_axis(anchor.col, size.width, viewport.x, viewport.right(), padding),
        row: clamp_axis(anchor.row, size.height, viewport.y, viewport.bottom(), padding),
    }
}

fn clamp_axis(start: u16, extent: u16, lo: u16, hi: u16, padding: u16) -> u16 {
    let min = lo.saturating_add(padding);
    let max = hi.saturating_sub(padding).saturating_sub(extent);
    if max < min {
        return min;
    }
    start.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_inside_viewport_keeps_anchor() {
        let viewport = Viewport::new(0, 0, 80, 24);
        let origin = place_menu(CellPoint::new(10, 5), CellSize::new(20, 6), viewport, 1);
        assert_eq!(origin, CellPoint::new(10, 5));
    }

    #[test]
    fn menu_near_bottom_right_is_pulled_back_inside() {
        let viewport = Viewport::new(0, 0, 80, 24);
        let origin = place_menu(CellPoint::new(75, 22), CellSize::new(20, 6), viewport, 1);
        assert_eq!(origin, CellPoint::new(59, 17));
    }

    #[test]
    fn menu_larger_than_viewport_pins_to_padding() {
        let viewport = Viewport::new(2, 3, 10, 4);
        let origin = place_menu(CellPoint::new(5, 5), CellSize::new(30, 9), viewport, 1);
        assert_eq!(origin, CellPoint::new(3, 4));
    }

    #[test]
    fn estimate_accounts_for_borders() {
        let size = estimate_menu_size(&["Copy", "Delete for everyone"]);
        assert_eq!(size, CellSize::new(23, 4));
    }
}
