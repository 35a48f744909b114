/// Value of the texture cell at `(cx, cy)`.
fn cell(cx: i32, cy: i32) -> u8 {
    let h = (cx as u32).wrapping_mul(0x9E37_79B1) ^ (cy as u32).wrapping_mul(0x85EB_CA77);
    (h.wrapping_mul(0xC2B2_AE3D) >> 24) as u8
}

/// Blocky pseudo-random texture, shifted so that `shifted(x, y) = base(x - dx, y - dy)`.
pub(crate) fn texture(width: usize, height: usize, dx: i32, dy: i32) -> Vec<u8> {
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            data.push(cell((x - dx).div_euclid(4), (y - dy).div_euclid(4)));
        }
    }
    data
}

/// The base texture rotated by `angle` radians and scaled by `zoom` about the
/// picture centre, nearest sampled.
///
/// A current-picture position `p` lands at `zoom * R(angle) * (p - c) + c`.
pub(crate) fn zoomed_texture(width: usize, height: usize, zoom: f64, angle: f64) -> Vec<u8> {
    let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);
    let (sin, cos) = angle.sin_cos();
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let (vx, vy) = ((x as f64 - cx) / zoom, (y as f64 - cy) / zoom);
            let sx = cos * vx + sin * vy + cx;
            let sy = -sin * vx + cos * vy + cy;
            data.push(cell((sx / 4.0).floor() as i32, (sy / 4.0).floor() as i32));
        }
    }
    data
}

/// Adds reproducible noise in `-amplitude..=amplitude` to every sample.
pub(crate) fn add_noise(data: &mut [u8], amplitude: i32) {
    let mut state = 0x2545_F491_u32;
    for sample in data {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let noise = (state % (2 * amplitude as u32 + 1)) as i32 - amplitude;
        *sample = (i32::from(*sample) + noise).clamp(0, 255) as u8;
    }
}
