#![recursion_limit = "256"]

use std::path::{Path, PathBuf};

use burn::{
    backend::{Autodiff, Wgpu},
    optim::AdamConfig,
    record::CompactRecorder,
};
use context_inpaint::{
    inpaint::{
        discriminator::DiscriminatorKind,
        evaluation::InpaintDemoConfig,
        objective::StagingSchedule,
        training::{InpaintTrainingConfig, ScanDataConfig, train},
    },
    logging::InpaintGanLogger,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    type MyBackend = Wgpu<f32, i32>;
    type MyAutodiffBackend = Autodiff<MyBackend>;

    let device = burn::backend::wgpu::WgpuDevice::default();
    let artifact_dir = Path::new("./tmp/inpaint");

    let stream = rerun::RecordingStreamBuilder::new("train context inpainting").spawn()?;
    let logger = InpaintGanLogger::new(stream.clone());

    rerun::Logger::new(stream) // recording streams are ref-counted
        .with_path_prefix("logs")
        .with_filter(rerun::default_log_filter())
        .init()?;

    let scan_path = PathBuf::from("./data/lung_scans/scans");
    let demo_path = PathBuf::from("./data/lung_scans/originals");

    train::<MyAutodiffBackend, _>(
        artifact_dir,
        InpaintTrainingConfig::new(
            DiscriminatorKind::Joint,
            AdamConfig::new().with_beta_1(0.5),
            AdamConfig::new().with_beta_1(0.5),
            ScanDataConfig::ScanDirectory {
                path: scan_path,
                train_ratio: 0.9,
            },
            StagingSchedule::new().with_enabled(true),
        )
        .with_inpaint_demo(Some(InpaintDemoConfig::new(demo_path))),
        device,
        logger,
        CompactRecorder::new(),
    )?;
    Ok(())
}
