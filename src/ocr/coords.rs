use crate::geometry::Rect;
use crate::ocr::BBoxPx;

const POINTS_PER_INCH: f32 = 72.0;

/// Converts between rasterized pixel space and document point space for one page.
///
/// Pixel space has its origin at the top-left with y growing downward; point
/// space has its origin at the bottom-left with y growing upward, so every
/// conversion flips y against the page height.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateMapper {
    dpi: u32,
    page_width: f32,
    page_height: f32,
}

impl CoordinateMapper {
    pub fn new(dpi: u32, page_width: f32, page_height: f32) -> Self {
        Self {
            dpi: dpi.max(1),
            page_width,
            page_height,
        }
    }

    pub fn scale(&self) -> f32 {
        POINTS_PER_INCH / self.dpi as f32
    }

    pub fn to_points(&self, bbox: &BBoxPx) -> Rect {
        let scale = self.scale();
        let x0 = bbox.x as f32 * scale;
        let x1 = x0 + bbox.w as f32 * scale;
        let y_bottom = self.page_height - (bbox.y as f32 + bbox.h as f32) * scale;
        let y_top = self.page_height - bbox.y as f32 * scale;
        Rect::new(x0, y_bottom, x1, y_top).clamp_to(self.page_width, self.page_height)
    }

    pub fn to_pixels(&self, rect: &Rect) -> BBoxPx {
        let scale = self.scale();
        let x = (rect.x0 / scale).round().max(0.0);
        let y = ((self.page_height - rect.y1) / scale).round().max(0.0);
        let w = (rect.width() / scale).round().max(0.0);
        let h = (rect.height() / scale).round().max(0.0);
        BBoxPx {
            x: x as u32,
            y: y as u32,
            w: w as u32,
            h: h as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn flips_y_against_page_height() {
        let mapper = CoordinateMapper::new(200, 612.0, 792.0);
        assert!(approx(mapper.scale(), 0.36));
        let rect = mapper.to_points(&BBoxPx { x: 100, y: 100, w: 200, h: 20 });
        assert!(approx(rect.x0, 36.0), "x0 = {}", rect.x0);
        assert!(approx(rect.x1, 108.0), "x1 = {}", rect.x1);
        assert!(approx(rect.y0, 748.8), "y0 = {}", rect.y0);
        assert!(approx(rect.y1, 756.0), "y1 = {}", rect.y1);
    }

    #[test]
    fn box_near_image_bottom_lands_near_point_origin() {
        let mapper = CoordinateMapper::new(200, 612.0, 792.0);
        // 792pt at 200dpi is 2200px tall
        let rect = mapper.to_points(&BBoxPx { x: 0, y: 2180, w: 10, h: 20 });
        assert!(approx(rect.y0, 0.0), "y0 = {}", rect.y0);
        assert!(approx(rect.y1, 7.2), "y1 = {}", rect.y1);
    }

    #[test]
    fn clamps_to_page() {
        let mapper = CoordinateMapper::new(72, 100.0, 100.0);
        let rect = mapper.to_points(&BBoxPx { x: 90, y: 90, w: 50, h: 50 });
        assert_eq!(rect, Rect { x0: 90.0, y0: 0.0, x1: 100.0, y1: 10.0 });
    }

    #[test]
    fn pixel_round_trip() {
        let mapper = CoordinateMapper::new(300, 612.0, 792.0);
        let bbox = BBoxPx { x: 420, y: 960, w: 300, h: 45 };
        assert_eq!(mapper.to_pixels(&mapper.to_points(&bbox)), bbox);
    }
}
