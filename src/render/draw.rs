//! Pixel-level line drawing on RGB frames.

use image::{Rgb, RgbImage};
use nalgebra::Vector2;

/// Clips the segment `p0 → p1` to the rectangle `[min, max]` (Liang-Barsky).
///
/// Returns `None` when the segment lies entirely outside or is not finite.
pub fn clip_segment(
    p0: &Vector2<f64>,
    p1: &Vector2<f64>,
    min: &Vector2<f64>,
    max: &Vector2<f64>,
) -> Option<(Vector2<f64>, Vector2<f64>)> {
    let d = p1 - p0;
    if !p0.iter().chain(p1.iter()).chain(d.iter()).all(|v| v.is_finite()) {
        return None;
    }

    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    let edges = [
        (-d.x, p0.x - min.x),
        (d.x, max.x - p0.x),
        (-d.y, p0.y - min.y),
        (d.y, max.y - p0.y),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some((p0 + d * t0, p0 + d * t1))
}

fn stamp(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>, thickness: u32) {
    let (width, height) = (image.width() as i64, image.height() as i64);
    let t = thickness.max(1) as i64;
    let start = -(t - 1) / 2;
    for dy in start..start + t {
        for dx in start..start + t {
            let (px, py) = (x + dx, y + dy);
            if px >= 0 && px < width && py >= 0 && py < height {
                image.put_pixel(px as u32, py as u32, color);
            }
        }
    }
}

/// Draws a straight segment `thickness` pixels wide.
///
/// The segment is clipped to the frame first, so endpoints far outside the
/// image (or non-finite ones) never cause large loops or panics.
pub fn draw_line(
    image: &mut RgbImage,
    from: &Vector2<f64>,
    to: &Vector2<f64>,
    color: Rgb<u8>,
    thickness: u32,
) {
    if image.width() == 0 || image.height() == 0 {
        return;
    }
    let pad = thickness as f64;
    let min = Vector2::new(-pad, -pad);
    let max = Vector2::new(
        image.width() as f64 - 1.0 + pad,
        image.height() as f64 - 1.0 + pad,
    );
    let Some((a, b)) = clip_segment(from, to, &min, &max) else {
        return;
    };

    // Bresenham
    let (mut x0, mut y0) = (a.x.round() as i64, a.y.round() as i64);
    let (x1, y1) = (b.x.round() as i64, b.y.round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        stamp(image, x0, y0, color, thickness);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Draws segments between consecutive points, and from the last point back to
/// the first when `closed` is set.
pub fn draw_polyline(
    image: &mut RgbImage,
    points: &[Vector2<f64>],
    closed: bool,
    color: Rgb<u8>,
    thickness: u32,
) {
    for pair in points.windows(2) {
        draw_line(image, &pair[0], &pair[1], color, thickness);
    }
    if closed && points.len() > 2 {
        draw_line(image, &points[points.len() - 1], &points[0], color, thickness);
    }
}
