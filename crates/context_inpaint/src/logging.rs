use std::path::Path;

use burn::prelude::{Backend, Tensor};
use rerun::{RecordingStream, external::ndarray};

use crate::inpaint::measures::MeasurePoint;

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("failed to read tensor data as f32 values: {0}")]
    TensorData(String),
    #[error("{0} channels cannot be rendered, expected 1 (gray) or 3 (rgb)")]
    UnsupportedChannels(usize),
    #[error("pixel buffer does not match the grid dimensions")]
    BufferMismatch,
    #[error("failed to write image file: {0}")]
    Image(#[from] image::ImageError),
    #[error("failed to build rerun image: {0}")]
    Rerun(String),
}

/// A batch rendered as one grayscale/RGB pixel grid, ready for a PNG
/// file or a rerun stream.
pub struct ImageGrid {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub pixels: Vec<u8>,
}

/// Renders a `[batch, channels, height, width]` tensor in [-1, 1] into
/// a near-square tiling of [0, 255] images.
pub fn batch_to_grid<B: Backend>(batch: Tensor<B, 4>) -> Result<ImageGrid, SnapshotError> {
    let [n, c, h, w] = batch.dims();
    if c != 1 && c != 3 {
        return Err(SnapshotError::UnsupportedChannels(c));
    }
    let data = batch
        .into_data()
        .into_vec::<f32>()
        .map_err(|e| SnapshotError::TensorData(format!("{e:?}")))?;

    let rows = (n as f64).sqrt().ceil() as usize;
    let cols = n.div_ceil(rows);
    let grid_h = rows * h;
    let grid_w = cols * w;
    let mut pixels = vec![0u8; grid_h * grid_w * c];

    for i in 0..n {
        let top = (i / cols) * h;
        let left = (i % cols) * w;
        for y in 0..h {
            for x in 0..w {
                for ch in 0..c {
                    let value = data[((i * c + ch) * h + y) * w + x];
                    let byte = (value * 127.5 + 127.5).round().clamp(0.0, 255.0) as u8;
                    pixels[((top + y) * grid_w + left + x) * c + ch] = byte;
                }
            }
        }
    }

    Ok(ImageGrid {
        width: grid_w,
        height: grid_h,
        channels: c,
        pixels,
    })
}

impl ImageGrid {
    pub fn save_png(&self, path: &Path) -> Result<(), SnapshotError> {
        let (w, h) = (self.width as u32, self.height as u32);
        match self.channels {
            1 => image::GrayImage::from_raw(w, h, self.pixels.clone())
                .ok_or(SnapshotError::BufferMismatch)?
                .save(path)?,
            3 => image::RgbImage::from_raw(w, h, self.pixels.clone())
                .ok_or(SnapshotError::BufferMismatch)?
                .save(path)?,
            other => return Err(SnapshotError::UnsupportedChannels(other)),
        }
        Ok(())
    }

    pub fn to_rerun_image(&self) -> Result<rerun::Image, SnapshotError> {
        let color_model = match self.channels {
            1 => rerun::ColorModel::L,
            3 => rerun::ColorModel::RGB,
            other => return Err(SnapshotError::UnsupportedChannels(other)),
        };
        let array = ndarray::Array3::from_shape_vec(
            (self.height, self.width, self.channels),
            self.pixels.clone(),
        )
        .map_err(|_| SnapshotError::BufferMismatch)?;
        rerun::Image::from_color_model_and_tensor(color_model, array)
            .map_err(|e| SnapshotError::Rerun(format!("{e:?}")))
    }
}

/// Streams the six measurement series, evaluation scores and image
/// snapshots to a rerun viewer.
pub struct InpaintGanLogger {
    stream: RecordingStream,
}

impl InpaintGanLogger {
    pub fn new(stream: RecordingStream) -> Self {
        Self { stream }
    }

    pub fn log_measures(&self, point: &MeasurePoint) {
        let scalars = [
            ("graphs/train/score/d_on_fake", point.d_on_fake),
            ("graphs/train/score/d_on_real", point.d_on_real),
            ("graphs/train/loss/generator/adversarial", point.adversarial),
            (
                "graphs/train/loss/generator/reconstruction",
                point.reconstruction,
            ),
            ("graphs/train/loss/generator/total", point.generator_total),
            (
                "graphs/train/loss/discriminator/total",
                point.discriminator_total,
            ),
        ];
        for (path, value) in scalars {
            let _ = self.stream.log(path, &rerun::Scalar::new(value));
        }
    }

    pub fn log_psnr(&self, psnr_patch: f64, psnr_image: f64) {
        let _ = self.stream.log(
            "graphs/eval/psnr/patch",
            &rerun::Scalar::new(psnr_patch),
        );
        let _ = self.stream.log(
            "graphs/eval/psnr/image",
            &rerun::Scalar::new(psnr_image),
        );
    }

    pub fn log_gradient_norm(&self, norm: f64) {
        let _ = self
            .stream
            .log("graphs/train/grad/generator_output", &rerun::Scalar::new(norm));
    }

    /// Mirrors an image grid to the stream; conversion failures are
    /// reported in-stream rather than aborting training.
    pub fn log_image_batch<B: Backend>(&self, path: &str, batch: Tensor<B, 4>) {
        match batch_to_grid(batch).and_then(|grid| grid.to_rerun_image()) {
            Ok(img) => {
                let _ = self.stream.log(path.to_owned(), &img);
            }
            Err(e) => {
                let _ = self.stream.log(
                    path.to_owned(),
                    &rerun::TextLog::new(format!("failed to convert batch for {path}: {e}"))
                        .with_level(rerun::TextLogLevel::ERROR),
                );
            }
        }
    }
}
