#[cfg(test)]
mod dataset {
    use std::path::PathBuf;

    use burn::{
        backend::NdArray,
        data::{dataloader::batcher::Batcher, dataset::Dataset},
    };
    use context_inpaint::lung_scans::{
        scan_batcher::ScanBatcher,
        scan_dataset::{CropStrategy, ScanDataset, ScanLoadOptions, crop_origin},
    };
    use image::{GrayImage, Luma};

    type MyBackend = NdArray<f32>;

    fn scan_fixture(name: &str, count: usize) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("context_inpaint_{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            let image = GrayImage::from_fn(48, 40, |x, y| Luma([((x + y + i as u32) % 256) as u8]));
            image.save(dir.join(format!("scan_{i:02}.png"))).unwrap();
        }
        dir
    }

    #[test]
    fn dataset_collects_every_image_below_the_root() {
        let dir = scan_fixture("collect", 6);
        let dataset = ScanDataset::new(&dir).unwrap();
        assert_eq!(dataset.len(), 6);
        assert!(dataset.get(0).is_some());
        assert!(dataset.get(6).is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn manifest_round_trips_through_ron() {
        let dir = scan_fixture("manifest", 4);
        let dataset = ScanDataset::new(&dir).unwrap();

        let manifest = dir.join("manifest.ron");
        dataset.save_to_ron(&manifest).unwrap();
        let restored = ScanDataset::load_from_ron(&manifest).unwrap();

        assert_eq!(dataset, restored);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn split_partitions_without_losing_items() {
        let dir = scan_fixture("split", 10);
        let dataset = ScanDataset::new(&dir).unwrap();
        let (train, valid) = dataset.split(0.8);
        assert_eq!(train.len(), 8);
        assert_eq!(valid.len(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn items_load_as_square_crops() {
        let dir = scan_fixture("load", 1);
        let dataset = ScanDataset::new(&dir).unwrap();
        let item = dataset.get(0).unwrap();

        let options = ScanLoadOptions::new(32, 16, 1, CropStrategy::Center);
        let data = item.load(&options).unwrap();
        assert_eq!(data.shape, vec![1, 16, 16, 1]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn batches_are_normalized_channel_first_tensors() {
        let dir = scan_fixture("batch", 3);
        let dataset = ScanDataset::new(&dir).unwrap();
        let items: Vec<_> = (0..3).map(|i| dataset.get(i).unwrap()).collect();

        let batcher = ScanBatcher::new(ScanLoadOptions::new(32, 32, 1, CropStrategy::Center));
        let batch = Batcher::<MyBackend, _, _>::batch(&batcher, items, &Default::default());

        assert_eq!(batch.images.dims(), [3, 1, 32, 32]);
        assert!(batch.images.clone().max().into_scalar() <= 1.0);
        assert!(batch.images.min().into_scalar() >= -1.0);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn random_crop_origins_stay_inside_the_central_bound() {
        for _ in 0..50 {
            let (x, y) = crop_origin(
                1024,
                1024,
                128,
                CropStrategy::RandomWithin { bound: 768 },
            );
            // centered 768 square spans [128, 896)
            assert!((128..=768).contains(&x));
            assert!((128..=768).contains(&y));
        }
    }

    #[test]
    fn degenerate_bounds_fall_back_to_the_center() {
        let (x, y) = crop_origin(256, 256, 128, CropStrategy::RandomWithin { bound: 64 });
        assert_eq!((x, y), (64, 64));
    }
}
