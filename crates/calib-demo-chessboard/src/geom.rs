use nalgebra::Vector2;

/// Estimate the two grid axes from edge vectors between neighbouring corners.
///
/// Grid edges are symmetric under 90° rotations, so angles are averaged in
/// quadruple-angle space. Returns unit vectors `(u, v)` with `v` = `u`
/// rotated by +90°, or `None` when no direction dominates.
pub fn estimate_grid_axes(edges: &[Vector2<f32>]) -> Option<(Vector2<f32>, Vector2<f32>)> {
    let mut sum = Vector2::<f32>::zeros();
    let mut count = 0usize;

    for e in edges {
        if e.norm_squared() <= f32::EPSILON {
            continue;
        }
        let four_theta = 4.0 * e.y.atan2(e.x);
        sum += Vector2::new(four_theta.cos(), four_theta.sin());
        count += 1;
    }

    if count == 0 {
        return None;
    }
    let mean = sum / count as f32;
    if mean.norm() < 0.1 {
        return None;
    }

    let theta = 0.25 * mean.y.atan2(mean.x);
    let u = Vector2::new(theta.cos(), theta.sin());
    let v = Vector2::new(-u.y, u.x);
    Some((u, v))
}

/// Cosine of the angle between unit vector `e` and axis direction `dir`.
#[inline]
pub fn alignment(e: &Vector2<f32>, dir: &Vector2<f32>) -> f32 {
    e.dot(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_rotated_axes_from_mixed_edges() {
        let a = 0.3_f32;
        let u = Vector2::new(a.cos(), a.sin());
        let v = Vector2::new(-u.y, u.x);
        let edges = vec![u * 10.0, -u * 11.0, v * 9.5, -v * 10.0, u * 10.2];

        let (eu, ev) = estimate_grid_axes(&edges).expect("axes");
        assert!(eu.dot(&u).abs() > 0.999 || eu.dot(&v).abs() > 0.999);
        assert!(eu.dot(&ev).abs() < 1e-5);
    }

    #[test]
    fn isotropic_edges_have_no_axes() {
        let edges: Vec<_> = (0..16)
            .map(|k| {
                // Quadruple angles cover the full circle evenly.
                let t = k as f32 * std::f32::consts::PI / 32.0;
                Vector2::new(t.cos(), t.sin())
            })
            .collect();
        assert!(estimate_grid_axes(&edges).is_none());
        assert!(estimate_grid_axes(&[]).is_none());
    }
}
