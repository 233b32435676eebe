//! Pure geometry helpers shared by the stroke, note and session layers.

use crate::board::Stroke;
use kurbo::{BezPath, Point, Size, Vec2};

/// Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f64 {
    a.distance(b)
}

/// Whether a note at absolute `position` is near enough to the viewport to
/// be worth rendering.
///
/// `scroll` is the viewport's offset into the canvas. The note's
/// viewport-relative position must lie strictly inside the viewport grown by
/// `buffer` on every side (and by the note size on the leading edges).
pub fn is_near_viewport(
    position: Point,
    viewport: Size,
    scroll: Vec2,
    note: Size,
    buffer: f64,
) -> bool {
    let visible = position - scroll;
    visible.x > -buffer - note.width
        && visible.y > -buffer - note.height
        && visible.x < viewport.width + buffer
        && visible.y < viewport.height + buffer
}

/// Clamp a note's top-left corner so the whole note stays on the canvas.
pub fn clamp_note_position(position: Point, canvas: Size, note: Size) -> Point {
    let max_x = (canvas.width - note.width).max(0.0);
    let max_y = (canvas.height - note.height).max(0.0);
    Point::new(clamp_axis(position.x, max_x), clamp_axis(position.y, max_y))
}

fn clamp_axis(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, max)
}

/// Reduce a polyline with Ramer-Douglas-Peucker. The first and last points
/// are always kept.
pub fn simplify_points(points: &[Point], tolerance: f64) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;

    let mut ranges = vec![(0, points.len() - 1)];
    while let Some((first, last)) = ranges.pop() {
        if last <= first + 1 {
            continue;
        }

        let (index, dist) = (first + 1..last)
            .map(|i| (i, segment_distance(points[i], points[first], points[last])))
            .fold((first, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });

        if dist > tolerance {
            keep[index] = true;
            ranges.push((first, index));
            ranges.push((index, last));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(point, kept)| kept.then_some(*point))
        .collect()
}

/// Distance from `point` to the line through `a` and `b`.
fn segment_distance(point: Point, a: Point, b: Point) -> f64 {
    let line = b - a;
    let len_sq = line.hypot2();
    if len_sq < f64::EPSILON {
        return point.distance(a);
    }
    (line.cross(point - a)).abs() / len_sq.sqrt()
}

/// Build a smoothed outline of a stroke for painters.
///
/// Each interior point becomes the control point of a quadratic curve ending
/// at the midpoint to the next sample; the path finishes with a straight
/// segment to the last sample. Stored points are never modified.
pub fn smooth_path(stroke: &Stroke) -> BezPath {
    let mut path = BezPath::new();
    path.move_to(stroke.start);

    match stroke.points.as_slice() {
        [] => {}
        [only] => path.line_to(*only),
        points => {
            for pair in points.windows(2) {
                let (p1, p2) = (pair[0], pair[1]);
                path.quad_to(p1, p1.midpoint(p2));
            }
            if let Some(last) = points.last() {
                path.line_to(*last);
            }
        }
    }

    path
}
