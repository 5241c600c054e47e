use burn::prelude::{Backend, Tensor};

/// Peak value of the pixel range the scorer operates on.
pub const PEAK: f64 = 255.0;

/// Peak-signal-to-noise ratio between two same-length pixel buffers in
/// the [0, 255] range. Identical buffers yield `f64::INFINITY` instead
/// of an error; this is the only place a degenerate input is absorbed.
pub fn psnr(a: &[f32], b: &[f32]) -> f64 {
    assert_eq!(a.len(), b.len(), "psnr inputs must have identical shape");
    assert!(!a.is_empty(), "psnr inputs must be non-empty");

    let mse = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum::<f64>()
        / a.len() as f64;

    if mse == 0.0 {
        f64::INFINITY
    } else {
        20.0 * (PEAK / mse.sqrt()).log10()
    }
}

/// Per-image PSNR over a `[batch, channels, height, width]` pair of
/// tensors in the training range [-1, 1]. Both batches are rescaled to
/// [0, 255] before scoring, matching the convention used for the
/// reported numbers.
pub fn batch_psnr<B: Backend>(a: Tensor<B, 4>, b: Tensor<B, 4>) -> Vec<f64> {
    let [n, c, h, w] = a.dims();
    assert_eq!([n, c, h, w], b.dims(), "batches must have identical shape");
    let stride = c * h * w;

    let a = to_pixel_values(a);
    let b = to_pixel_values(b);

    (0..n)
        .map(|i| psnr(&a[i * stride..(i + 1) * stride], &b[i * stride..(i + 1) * stride]))
        .collect()
}

fn to_pixel_values<B: Backend>(t: Tensor<B, 4>) -> Vec<f32> {
    let t = t.add_scalar(1.0).mul_scalar(127.5);
    t.into_data()
        .into_vec::<f32>()
        .expect("float tensor converts to f32 values")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_images_hit_the_sentinel() {
        let image = vec![100.0_f32; 9];
        let score = psnr(&image, &image);
        assert!(score.is_infinite() && score.is_sign_positive());
        assert!(!score.is_nan());
    }

    #[test]
    fn symmetric() {
        let a = [0.0_f32, 10.0, 200.0, 255.0];
        let b = [3.0_f32, 9.0, 180.0, 250.0];
        assert_eq!(psnr(&a, &b), psnr(&b, &a));
    }

    #[test]
    fn unit_mse_reference_value() {
        // mse = 1 => 20 * log10(255)
        let a = [0.0_f32, 1.0, 2.0, 3.0];
        let b = [1.0_f32, 2.0, 3.0, 4.0];
        let expected = 20.0 * 255.0_f64.log10();
        assert!((psnr(&a, &b) - expected).abs() < 1e-9);
    }

    #[test]
    fn larger_error_scores_lower() {
        let a = [128.0_f32; 16];
        let close: Vec<f32> = a.iter().map(|v| v + 2.0).collect();
        let far: Vec<f32> = a.iter().map(|v| v + 50.0).collect();
        assert!(psnr(&a, &close) > psnr(&a, &far));
    }
}
