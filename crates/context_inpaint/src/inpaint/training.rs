use std::path::{Path, PathBuf};

use burn::{
    config::{Config, ConfigError},
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    module::{AutodiffModule, Module},
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::Backend,
    record::{FileRecorder, RecorderError},
    tensor::{ElementConversion, Tensor, backend::AutodiffBackend},
};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    logging::{InpaintGanLogger, SnapshotError, batch_to_grid},
    lung_scans::{
        scan_batcher::ScanBatcher,
        scan_dataset::{CropStrategy, ScanDataset, ScanDatasetError, ScanLoadOptions},
    },
};

use super::{
    discriminator::{DiscriminatorKind, InpaintDiscriminatorConfig, ScoreContext},
    evaluation::{InpaintDemoConfig, evaluate, inpaint_demo},
    generator::{ContextEncoder, ContextEncoderConfig},
    geometry::{GeometryError, PatchGeometry},
    measures::{MeasureAccumulator, MeasureSeries, MeasuresError},
    objective::{AdversarialObjective, StagingSchedule},
    occlusion::{Occluder, OcclusionError},
};

#[derive(Serialize, Deserialize, Clone)]
pub enum ScanDataConfig {
    /// Walk a scan directory and split it randomly; the resulting
    /// manifests are written next to the checkpoints so a resumed run
    /// can reuse the exact partition.
    ScanDirectory { path: PathBuf, train_ratio: f64 },
    /// Paths to previously saved train/valid manifests.
    Manifests {
        train_data: PathBuf,
        valid_data: PathBuf,
    },
}

#[derive(Config)]
pub struct InpaintTrainingConfig {
    pub discriminator_kind: DiscriminatorKind,
    pub optimizer_generator: AdamConfig,
    pub optimizer_discriminator: AdamConfig,
    pub data: ScanDataConfig,
    pub staging: StagingSchedule,
    pub inpaint_demo: Option<InpaintDemoConfig>,
    #[config(default = 128)]
    pub image_size: usize,
    #[config(default = 64)]
    pub patch_size: usize,
    #[config(default = 80)]
    pub margin_size: usize,
    /// Band of true pixels kept inside the patch boundary.
    #[config(default = 4)]
    pub overlap: usize,
    #[config(default = 1)]
    pub channels: usize,
    #[config(default = 64)]
    pub nef: usize,
    #[config(default = 64)]
    pub ndf: usize,
    #[config(default = 4000)]
    pub bottleneck: usize,
    #[config(default = 1024)]
    pub fullyconn_size: usize,
    #[config(default = 50)]
    pub num_epochs: usize,
    #[config(default = 64)]
    pub batch_size: usize,
    #[config(default = 4)]
    pub num_workers: usize,
    #[config(default = 1234)]
    pub seed: u64,
    #[config(default = 0.0002)]
    pub generator_learning_rate: f64,
    #[config(default = 0.0002)]
    pub discriminator_learning_rate: f64,
    /// Weight of the reconstruction term in the blended generator loss.
    #[config(default = 0.998)]
    pub wtl2: f64,
    /// Extra reconstruction weight on the seam band of the patch.
    #[config(default = 10.0)]
    pub overlap_l2_weight: f64,
    /// Epochs are capped at this many batches so one pass stays short
    /// enough for frequent evaluation.
    #[config(default = 200)]
    pub max_batches_per_epoch: usize,
    /// Accumulation window, in steps, between measurement datapoints.
    #[config(default = 200)]
    pub update_measures: usize,
    /// Steps between training image snapshots.
    #[config(default = 200)]
    pub update_train_img: usize,
    #[config(default = false)]
    pub continue_training: bool,
    #[config(default = false)]
    pub log_gradients: bool,
}

impl InpaintTrainingConfig {
    pub fn generator_config(&self) -> ContextEncoderConfig {
        ContextEncoderConfig::new(self.image_size, self.patch_size)
            .with_in_channels(self.channels)
            .with_out_channels(self.channels)
            .with_nef(self.nef)
            .with_bottleneck(self.bottleneck)
    }

    pub fn discriminator_config(&self) -> InpaintDiscriminatorConfig {
        InpaintDiscriminatorConfig::new(
            self.discriminator_kind,
            self.image_size,
            self.patch_size,
            self.margin_size,
        )
        .with_in_channels(self.channels)
        .with_ndf(self.ndf)
        .with_fullyconn_size(self.fullyconn_size)
    }
}

/// Last completed epoch, stored next to the checkpoints so a resumed run
/// continues the epoch numbering.
#[derive(Config)]
pub struct CheckpointMeta {
    pub epoch: usize,
}

/// All file locations below one artifact directory.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    root: PathBuf,
}

impl ArtifactPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_owned(),
        }
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.root.clone(),
            self.checkpoints(),
            self.snapshots(),
            self.demos(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn checkpoints(&self) -> PathBuf {
        self.root.join("checkpoints")
    }

    pub fn snapshots(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    pub fn demos(&self) -> PathBuf {
        self.root.join("demos")
    }

    pub fn generator_checkpoint(&self) -> PathBuf {
        self.checkpoints().join("generator")
    }

    pub fn discriminator_checkpoint(&self) -> PathBuf {
        self.checkpoints().join("discriminator")
    }

    pub fn checkpoint_meta(&self) -> PathBuf {
        self.checkpoints().join("meta.json")
    }

    pub fn measures(&self) -> PathBuf {
        self.root.join("measures.bin")
    }

    pub fn psnr_log(&self) -> PathBuf {
        self.root.join("PSNRs.txt")
    }

    pub fn training_config(&self) -> PathBuf {
        self.root.join("training_config.json")
    }

    pub fn train_manifest(&self) -> PathBuf {
        self.root.join("train_data.ron")
    }

    pub fn valid_manifest(&self) -> PathBuf {
        self.root.join("valid_data.ron")
    }
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("dataset error: {0}")]
    Dataset(#[from] ScanDatasetError),
    #[error("failed to load or save a config file: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to load or save model weights: {0}")]
    Recorder(#[from] RecorderError),
    #[error("invalid patch geometry: {0}")]
    Geometry(#[from] GeometryError),
    #[error("invalid occlusion setup: {0}")]
    Occlusion(#[from] OcclusionError),
    #[error("failed to persist the measurement series: {0}")]
    Measures(#[from] MeasuresError),
    #[error("failed to render an image snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("failed to process a demo image: {0}")]
    Image(#[from] image::ImageError),
}

fn scalar<B: Backend>(value: Tensor<B, 1>) -> f64 {
    value.mean().into_scalar().elem()
}

pub fn train<B: AutodiffBackend, R: FileRecorder<B>>(
    artifact_dir: &Path,
    config: InpaintTrainingConfig,
    device: B::Device,
    logger: InpaintGanLogger,
    recorder: R,
) -> Result<ContextEncoder<B>, TrainingError> {
    let paths = ArtifactPaths::new(artifact_dir);
    if !config.continue_training {
        std::fs::remove_dir_all(artifact_dir).ok();
    }
    paths.ensure_dirs()?;
    config.save(paths.training_config())?;

    B::seed(config.seed);

    let geometry = PatchGeometry::new(
        config.image_size,
        config.patch_size,
        config.margin_size,
        config.overlap,
    )?;
    let occluder = Occluder::for_channels(geometry, config.channels)?;
    let objective = AdversarialObjective::<B>::new(
        geometry,
        config.wtl2,
        config.overlap_l2_weight,
        &device,
    );

    let mut generator = config.generator_config().init::<B>(&device);
    let mut discriminator = config.discriminator_config().init::<B>(&device);

    let mut start_epoch = 0;
    let mut measures = MeasureSeries::default();
    if config.continue_training && paths.checkpoint_meta().exists() {
        let meta = CheckpointMeta::load(paths.checkpoint_meta())?;
        generator = generator.load_file(paths.generator_checkpoint(), &recorder, &device)?;
        discriminator =
            discriminator.load_file(paths.discriminator_checkpoint(), &recorder, &device)?;
        if paths.measures().exists() {
            measures = MeasureSeries::load(&paths.measures())?;
        }
        start_epoch = meta.epoch + 1;
        info!(
            "resuming after epoch {} with {} recorded datapoints",
            meta.epoch,
            measures.len()
        );
    }

    let (train, valid) = match &config.data {
        ScanDataConfig::ScanDirectory { path, train_ratio } => {
            let (train, valid) = ScanDataset::new(path)?.split(*train_ratio);
            train.save_to_ron(&paths.train_manifest())?;
            valid.save_to_ron(&paths.valid_manifest())?;
            (train, valid)
        }
        ScanDataConfig::Manifests {
            train_data,
            valid_data,
        } => (
            ScanDataset::load_from_ron(train_data)?,
            ScanDataset::load_from_ron(valid_data)?,
        ),
    };
    let train_size = train.len();
    let valid_size = valid.len();
    info!("training on {train_size} scans, validating on {valid_size}");

    let load_options = ScanLoadOptions::new(
        config.image_size as u32,
        config.image_size as u32,
        config.channels,
        CropStrategy::Center,
    );
    let dataloader_train = DataLoaderBuilder::<B, _, _>::new(ScanBatcher::new(load_options.clone()))
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .set_device(device.clone())
        .build(train);
    // Deterministic order so evaluation sees the same batches each epoch.
    let dataloader_valid =
        DataLoaderBuilder::<B::InnerBackend, _, _>::new(ScanBatcher::new(load_options))
            .batch_size(config.batch_size)
            .num_workers(config.num_workers)
            .set_device(device.clone())
            .build(valid);

    let mut opt_generator = config.optimizer_generator.init();
    let mut opt_discriminator = config.optimizer_discriminator.init();

    let m = MultiProgress::new();
    let sty = ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}",
    )
    .unwrap()
    .progress_chars("##-");
    let epoch_bar = m.add(ProgressBar::new(config.num_epochs as u64));
    epoch_bar.set_style(sty.clone());
    epoch_bar.set_message("Epochs");
    epoch_bar.set_position(start_epoch as u64);

    let batches_per_epoch = train_size
        .div_ceil(config.batch_size)
        .min(config.max_batches_per_epoch);
    let mut accumulator = MeasureAccumulator::default();

    for epoch in start_epoch..config.num_epochs {
        let phase = config.staging.phase(epoch);

        let training_bar = m.add(ProgressBar::new(batches_per_epoch as u64));
        training_bar.set_style(sty.clone());
        training_bar.set_message(format!("Training ({phase:?})"));

        for (iteration, batch) in dataloader_train.iter().enumerate() {
            if iteration >= config.max_batches_per_epoch {
                break;
            }
            let real = batch.images;
            let real_patch = occluder.patch(&real);
            let occluded = occluder.occlude(real.clone());

            let fake_patch = generator.forward(occluded.clone());
            let composite = occluder.composite(&occluded, fake_patch.clone());

            let real_margin = occluder.margin(&real);
            let real_context = ScoreContext {
                patch: real_patch.clone(),
                margin_patch: real_margin.clone(),
                full_image: real.clone(),
            };
            let fake_context = ScoreContext {
                patch: fake_patch.clone(),
                margin_patch: occluder.margin(&composite),
                full_image: composite.clone(),
            };

            // Discriminator sees detached fakes so its loss cannot reach
            // the generator.
            let real_score = discriminator.score(real_context);
            let fake_score = discriminator.score(fake_context.clone().detach());
            let d_on_real = scalar(real_score.clone());
            let d_on_fake = scalar(fake_score.clone());
            let loss_d = objective.discriminator_real_loss(real_score)
                + objective.discriminator_fake_loss(fake_score);
            let loss_d_value = scalar(loss_d.clone());

            if phase.updates_discriminator() {
                let grads = loss_d.backward();
                let grads = GradientsParams::from_grads(grads, &discriminator);
                discriminator = opt_discriminator.step(
                    config.discriminator_learning_rate,
                    discriminator,
                    grads,
                );
            }

            let reconstruction = objective.reconstruction_loss(fake_patch.clone(), real_patch);
            let reconstruction_value = scalar(reconstruction.clone());
            let mut adversarial_value = 0.0;
            let mut generator_total = 0.0;

            if phase.updates_generator() {
                // A frozen copy scores the live fake so the adversarial
                // gradient flows into the generator only.
                let frozen = discriminator.clone().no_grad();
                let adversarial = objective.adversarial_loss(frozen.score(fake_context));
                adversarial_value = scalar(adversarial.clone());

                if let Some(loss_g) = objective.generator_loss(adversarial, reconstruction, phase)
                {
                    generator_total = scalar(loss_g.clone());
                    let grads = loss_g.backward();
                    if config.log_gradients {
                        if let Some(grad) = fake_patch.grad(&grads) {
                            let norm: f64 =
                                grad.powf_scalar(2.0).sum().sqrt().into_scalar().elem();
                            logger.log_gradient_norm(norm);
                        }
                    }
                    let grads = GradientsParams::from_grads(grads, &generator);
                    generator = opt_generator.step(
                        config.generator_learning_rate,
                        generator,
                        grads,
                    );
                }
            }

            accumulator.add(
                d_on_fake,
                d_on_real,
                adversarial_value,
                reconstruction_value,
                generator_total,
                loss_d_value,
            );
            if accumulator.steps() >= config.update_measures {
                let point = accumulator.drain(config.wtl2);
                logger.log_measures(&point);
                measures.push(point);
            }

            if iteration % config.update_train_img == 0 {
                let mut snapshots = vec![
                    ("real", real),
                    ("occluded", occluded),
                    ("inpainted", composite.clone()),
                ];
                if config.discriminator_kind != DiscriminatorKind::Patch {
                    snapshots.push(("margin_inpainted", occluder.margin(&composite)));
                    snapshots.push(("margin_real", real_margin.clone()));
                }
                for (name, images) in snapshots {
                    logger.log_image_batch(&format!("images/train/{name}"), images.clone());
                    let path = paths
                        .snapshots()
                        .join(format!("epoch_{epoch:03}_iter_{iteration:04}_{name}.png"));
                    match batch_to_grid(images) {
                        Ok(grid) => {
                            if let Err(e) = grid.save_png(&path) {
                                warn!("failed to save training snapshot: {e}");
                            }
                        }
                        Err(e) => warn!("failed to render training snapshot: {e}"),
                    }
                }
            }
            training_bar.inc(1);
        }
        m.remove(&training_bar);

        let generator_valid = generator.valid();
        let report = evaluate(
            &generator_valid,
            &occluder,
            &dataloader_valid,
            epoch,
            &paths,
            &logger,
        )?;
        logger.log_psnr(report.psnr_patch, report.psnr_image);

        if let Some(demo) = &config.inpaint_demo {
            inpaint_demo(&generator_valid, &occluder, demo, epoch, &paths, &device)?;
        }

        generator
            .clone()
            .save_file(paths.generator_checkpoint(), &recorder)?;
        discriminator
            .clone()
            .save_file(paths.discriminator_checkpoint(), &recorder)?;
        CheckpointMeta::new(epoch).save(paths.checkpoint_meta())?;
        measures.save(&paths.measures())?;

        epoch_bar.inc(1);
    }
    Ok(generator)
}
