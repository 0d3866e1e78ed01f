/// Number of samples on every ring.
pub const SAMPLES_PER_RING: usize = 12;

/// Ring radii in pixels, from the innermost ring outwards.
///
/// Ring `k` (counting from 1) is read from blur level `k`.
pub const RING_RADII: [i32; 4] = [5, 15, 25, 35];

/// 12 point ring offsets `(dx, dy)`. Order is clockwise starting at top.
///
/// The first quadrant is computed at 0°, 30° and 60° from the vertical axis and
/// rounded; the other three quadrants are reflections of it, so the pattern is
/// symmetric about both axes for any radius. For `radius >= 2` all offsets are
/// distinct.
pub fn ring_offsets(radius: i32) -> [(i32, i32); SAMPLES_PER_RING] {
    let r = f64::from(radius);
    let (sin30, cos30) = 30f64.to_radians().sin_cos();
    let (sin60, cos60) = 60f64.to_radians().sin_cos();

    // top right quadrant
    let top = (0, radius);
    let upper = ((r * cos60).round() as i32, (r * sin60).round() as i32);
    let lower = ((r * cos30).round() as i32, (r * sin30).round() as i32);
    let right = (radius, 0);

    [
        top,
        upper,
        lower,
        right,
        // bottom right
        (lower.0, -lower.1),
        (upper.0, -upper.1),
        (top.0, -top.1),
        // bottom left
        (-upper.0, -upper.1),
        (-lower.0, -lower.1),
        (-right.0, right.1),
        // top left
        (-lower.0, lower.1),
        (-upper.0, upper.1),
    ]
}
