use crate::ocr::BBoxPx;

pub(super) fn union_bbox(a: &BBoxPx, b: &BBoxPx) -> BBoxPx {
    let x1 = a.x.min(b.x);
    let y1 = a.y.min(b.y);
    let x2 = (a.x + a.w).max(b.x + b.w);
    let y2 = (a.y + a.h).max(b.y + b.h);
    BBoxPx {
        x: x1,
        y: y1,
        w: x2 - x1,
        h: y2 - y1,
    }
}

pub(super) fn top_distance(a: &BBoxPx, b: &BBoxPx) -> f32 {
    (a.y as f32 - b.y as f32).abs()
}
