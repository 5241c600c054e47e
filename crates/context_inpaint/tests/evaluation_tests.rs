#[cfg(test)]
mod evaluation {
    use std::path::PathBuf;

    use burn::{backend::NdArray, data::dataloader::DataLoaderBuilder};
    use context_inpaint::{
        inpaint::{
            evaluation::evaluate,
            generator::ContextEncoderConfig,
            geometry::PatchGeometry,
            occlusion::Occluder,
            training::ArtifactPaths,
        },
        logging::InpaintGanLogger,
        lung_scans::{
            scan_batcher::ScanBatcher,
            scan_dataset::{CropStrategy, ScanDataset, ScanLoadOptions},
        },
    };
    use image::{GrayImage, Luma};

    type MyBackend = NdArray<f32>;

    fn scan_fixture(name: &str, count: usize) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("context_inpaint_eval_{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(dir.join("scans")).unwrap();
        for i in 0..count {
            let image = GrayImage::from_fn(24, 24, |x, y| Luma([((x * y + i as u32) % 256) as u8]));
            image
                .save(dir.join("scans").join(format!("scan_{i:02}.png")))
                .unwrap();
        }
        dir
    }

    fn run_epoch(root: &PathBuf, epoch: usize) -> (f64, f64) {
        let device = Default::default();
        let geometry = PatchGeometry::new(16, 8, 8, 2).unwrap();
        let occluder = Occluder::for_channels(geometry, 1).unwrap();
        let generator = ContextEncoderConfig::new(16, 8)
            .with_nef(8)
            .with_bottleneck(20)
            .init::<MyBackend>(&device);

        let dataset = ScanDataset::new(&root.join("scans")).unwrap();
        let dataloader = DataLoaderBuilder::<MyBackend, _, _>::new(ScanBatcher::new(
            ScanLoadOptions::new(16, 16, 1, CropStrategy::Center),
        ))
        .batch_size(2)
        .build(dataset);

        let paths = ArtifactPaths::new(root);
        paths.ensure_dirs().unwrap();
        let logger = InpaintGanLogger::new(rerun::RecordingStream::disabled());

        let report = evaluate(&generator, &occluder, &dataloader, epoch, &paths, &logger)
            .expect("evaluation succeeds");
        (report.psnr_patch, report.psnr_image)
    }

    #[test]
    fn scores_are_finite_and_positive() {
        let root = scan_fixture("scores", 4);
        let (psnr_patch, psnr_image) = run_epoch(&root, 0);
        assert!(psnr_patch.is_finite() && psnr_patch > 0.0);
        assert!(psnr_image.is_finite() && psnr_image > 0.0);
        // compositing keeps most pixels intact, so the whole image always
        // scores at least as high as the bare patch
        assert!(psnr_image >= psnr_patch);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn psnr_record_appends_one_line_per_epoch() {
        let root = scan_fixture("record", 4);
        run_epoch(&root, 0);
        run_epoch(&root, 1);

        let record = std::fs::read_to_string(ArtifactPaths::new(&root).psnr_log()).unwrap();
        let lines: Vec<&str> = record.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("EPOCH [0] AVERAGES: PSNR per Patch: "));
        assert!(lines[0].contains(" | PSNR per Image: "));
        assert!(lines[1].starts_with("EPOCH [1] AVERAGES: "));

        // epoch zero starts a fresh record
        run_epoch(&root, 0);
        let record = std::fs::read_to_string(ArtifactPaths::new(&root).psnr_log()).unwrap();
        assert_eq!(record.lines().count(), 1);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn first_batches_leave_snapshot_grids() {
        let root = scan_fixture("snapshots", 4);
        run_epoch(&root, 0);

        let paths = ArtifactPaths::new(&root);
        for name in ["real", "occluded", "inpainted"] {
            let file = paths
                .snapshots()
                .join(format!("eval_epoch_000_batch_0_{name}.png"));
            assert!(file.exists(), "missing snapshot {file:?}");
        }
        std::fs::remove_dir_all(&root).ok();
    }
}
