use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::PathBuf,
    sync::Arc,
};

use burn::{
    config::Config,
    data::dataloader::DataLoader,
    prelude::Backend,
    tensor::{Tensor, TensorData},
};
use image::{DynamicImage, imageops::FilterType};
use log::info;
use walkdir::WalkDir;

use crate::{
    logging::{InpaintGanLogger, batch_to_grid},
    lung_scans::{
        scan_batcher::ScanBatch,
        scan_dataset::{CropStrategy, crop_origin, is_image_file},
    },
};

use super::{
    fidelity::batch_psnr,
    generator::ContextEncoder,
    occlusion::Occluder,
    training::{ArtifactPaths, TrainingError},
};

/// Average scores of one evaluation pass over the validation split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalReport {
    /// PSNR between the generated and the real patch.
    pub psnr_patch: f64,
    /// PSNR between the composited and the real full image.
    pub psnr_image: f64,
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len().max(1) as f64
}

/// Runs the generator over the whole validation split, collecting
/// per-image PSNR both on the bare patch and on the composited image.
/// Averages are appended to `PSNRs.txt`; the file is truncated at epoch
/// zero so every fresh run starts a fresh record.
pub fn evaluate<B: Backend>(
    generator: &ContextEncoder<B>,
    occluder: &Occluder,
    dataloader: &Arc<dyn DataLoader<B, ScanBatch<B>>>,
    epoch: usize,
    paths: &ArtifactPaths,
    logger: &InpaintGanLogger,
) -> Result<EvalReport, TrainingError> {
    let mut patch_scores = vec![];
    let mut image_scores = vec![];

    for (iteration, batch) in dataloader.iter().enumerate() {
        let real = batch.images;
        let real_patch = occluder.patch(&real);
        let occluded = occluder.occlude(real.clone());
        let fake_patch = generator.forward(occluded.clone());
        let composite = occluder.composite(&occluded, fake_patch.clone());

        let batch_patch = batch_psnr(real_patch, fake_patch);
        let batch_image = batch_psnr(real.clone(), composite.clone());
        info!(
            "eval batch {iteration}: PSNR per patch {:.3} | PSNR per image {:.3}",
            mean(&batch_patch),
            mean(&batch_image)
        );
        patch_scores.extend(batch_patch);
        image_scores.extend(batch_image);

        // The first batches double as a visual record of the epoch.
        if iteration < 2 {
            logger.log_image_batch("images/eval/real", real.clone());
            logger.log_image_batch("images/eval/inpainted", composite.clone());
            for (name, images) in [("real", real), ("occluded", occluded), ("inpainted", composite)]
            {
                let path = paths
                    .snapshots()
                    .join(format!("eval_epoch_{epoch:03}_batch_{iteration}_{name}.png"));
                batch_to_grid(images)?.save_png(&path)?;
            }
        }
    }

    let report = EvalReport {
        psnr_patch: mean(&patch_scores),
        psnr_image: mean(&image_scores),
    };

    let mut log_file = if epoch == 0 {
        File::create(paths.psnr_log())?
    } else {
        OpenOptions::new()
            .append(true)
            .create(true)
            .open(paths.psnr_log())?
    };
    writeln!(
        log_file,
        "EPOCH [{epoch}] AVERAGES: PSNR per Patch: {:.4} | PSNR per Image: {:.4}",
        report.psnr_patch, report.psnr_image
    )?;

    Ok(report)
}

/// Whole-image inpainting demo on held-out high-resolution scans.
#[derive(Config, Debug)]
pub struct InpaintDemoConfig {
    /// Directory of original scans, untouched by training.
    pub originals: PathBuf,
    /// The originals are scaled and center-cropped to this canvas size.
    #[config(default = 1024)]
    pub full_size: u32,
    /// Crop origins are sampled inside a centered square of this side.
    #[config(default = 768)]
    pub center_size: u32,
    #[config(default = 3)]
    pub crops_per_image: usize,
}

/// Cuts random network-sized windows out of each full-resolution scan,
/// inpaints their centers and pastes the results back, so one output
/// image shows several reconstructions in their real surroundings.
pub fn inpaint_demo<B: Backend>(
    generator: &ContextEncoder<B>,
    occluder: &Occluder,
    config: &InpaintDemoConfig,
    epoch: usize,
    paths: &ArtifactPaths,
    device: &B::Device,
) -> Result<(), TrainingError> {
    let geometry = occluder.geometry();
    let crop = geometry.image_size;
    let channels = occluder.channels();
    let full = config.full_size as usize;

    for entry in WalkDir::new(&config.originals)
        .into_iter()
        .flat_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_image_file(entry.path()))
    {
        let image = image::ImageReader::open(entry.path())?.decode()?;
        let image = if channels == 1 {
            DynamicImage::ImageLuma8(image.to_luma8())
        } else {
            DynamicImage::ImageRgb8(image.to_rgb8())
        };
        let (w, h) = (image.width().max(1), image.height().max(1));
        let scale = config.full_size as f64 / w.min(h) as f64;
        let nw = ((w as f64 * scale).round() as u32).max(config.full_size);
        let nh = ((h as f64 * scale).round() as u32).max(config.full_size);
        let image = image.resize_exact(nw, nh, FilterType::Triangle);
        let (cx, cy) = crop_origin(nw, nh, config.full_size, CropStrategy::Center);
        let mut canvas = image
            .crop_imm(cx, cy, config.full_size, config.full_size)
            .into_bytes();

        for _ in 0..config.crops_per_image {
            let (ox, oy) = crop_origin(
                config.full_size,
                config.full_size,
                crop as u32,
                CropStrategy::RandomWithin {
                    bound: config.center_size,
                },
            );
            let (ox, oy) = (ox as usize, oy as usize);

            let mut bytes = vec![0u8; crop * crop * channels];
            for y in 0..crop {
                let src = ((oy + y) * full + ox) * channels;
                let dst = y * crop * channels;
                bytes[dst..dst + crop * channels]
                    .copy_from_slice(&canvas[src..src + crop * channels]);
            }
            let data = TensorData::new(bytes, vec![1, crop, crop, channels]);
            let window = (Tensor::<B, 4>::from_data(data, device).permute([0, 3, 1, 2]) - 127.5)
                / 127.5;

            let occluded = occluder.occlude(window);
            let fake_patch = generator.forward(occluded.clone());
            let composite = occluder.composite(&occluded, fake_patch);

            // A single-image batch renders as itself.
            let grid = batch_to_grid(composite)?;
            for y in 0..crop {
                let src = y * crop * channels;
                let dst = ((oy + y) * full + ox) * channels;
                canvas[dst..dst + crop * channels]
                    .copy_from_slice(&grid.pixels[src..src + crop * channels]);
            }
        }

        let stem = entry
            .path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "scan".into());
        let out = paths.demos().join(format!("epoch_{epoch:03}_{stem}.png"));
        match channels {
            1 => image::GrayImage::from_raw(config.full_size, config.full_size, canvas)
                .ok_or(crate::logging::SnapshotError::BufferMismatch)?
                .save(&out)?,
            _ => image::RgbImage::from_raw(config.full_size, config.full_size, canvas)
                .ok_or(crate::logging::SnapshotError::BufferMismatch)?
                .save(&out)?,
        }
    }
    Ok(())
}
