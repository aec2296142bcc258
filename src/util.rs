use image::GrayImage;

/// Sigma for a Gaussian kernel of the given odd size when none is specified.
pub fn sigma_for_kernel(size: usize) -> f32 {
    0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized one dimensional Gaussian kernel of `size` taps.
pub fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = sigma_for_kernel(size);
    let center = (size / 2) as f32;
    let mut kernel = (0..size)
        .map(|i| {
            let x = i as f32 - center;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect::<Vec<_>>();
    let sum = kernel.iter().sum::<f32>();
    for value in kernel.iter_mut() {
        *value /= sum;
    }
    kernel
}

/// 2x3 affine matrix rotating by `angle_degrees` about `center`.
/// Positive angles turn the content counter-clockwise on screen.
pub fn rotation_matrix(center: (f64, f64), angle_degrees: f64, scale: f64) -> [[f64; 3]; 2] {
    let (cx, cy) = center;
    let radians = angle_degrees.to_radians();
    let alpha = radians.cos() * scale;
    let beta = radians.sin() * scale;
    [
        [alpha, beta, (1.0 - alpha) * cx - beta * cy],
        [-beta, alpha, beta * cx + (1.0 - alpha) * cy],
    ]
}

pub fn count_nonzero(image: &GrayImage) -> usize {
    image.as_raw().iter().filter(|&&p| p > 0).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_tap_kernel() {
        let kernel = gaussian_kernel(5);
        assert_eq!(kernel.len(), 5);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!((sigma_for_kernel(5) - 1.1).abs() < 1e-6);
        assert_eq!(kernel[0], kernel[4]);
        assert!(kernel[2] > kernel[1] && kernel[1] > kernel[0]);
    }

    #[test]
    fn rotation_matrix_about_center() {
        let m = rotation_matrix((50.0, 40.0), 90.0, 1.0);
        // A point right of center moves above it.
        let (x, y) = (51.0, 40.0);
        let nx = m[0][0] * x + m[0][1] * y + m[0][2];
        let ny = m[1][0] * x + m[1][1] * y + m[1][2];
        assert!((nx - 50.0).abs() < 1e-9);
        assert!((ny - 39.0).abs() < 1e-9);
    }

    #[test]
    fn zero_rotation_is_identity() {
        let m = rotation_matrix((10.0, 10.0), 0.0, 1.0);
        assert_eq!(m, [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
    }
}
