use burn::{data::dataset::Dataset, tensor::TensorData};
use image::{DynamicImage, imageops::FilterType};
use log::info;
use rand::Rng;
use ron::de::{SpannedError, from_reader};
use ron::ser::to_writer;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tif"];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// One grayscale scan on disk.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScanItem {
    pub path: PathBuf,
}

#[derive(Error, Debug)]
pub enum ScanImageError {
    #[error("failed to load image due to {:?}", .0)]
    Loading(#[from] io::Error),
    #[error("failed to decode image due to {:?}", .0)]
    Decoding(#[from] image::error::ImageError),
}

/// How a scaled scan is cropped down to the network input size.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum CropStrategy {
    /// Deterministic center crop; evaluation always uses this.
    Center,
    /// Crop origin sampled uniformly inside a centered square of side
    /// `bound`, so training patches come from the central region only.
    RandomWithin { bound: u32 },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScanLoadOptions {
    /// The shorter image side is scaled to this before cropping.
    pub scale_to: u32,
    /// Side length of the square crop handed to the network.
    pub crop_to: u32,
    pub channels: usize,
    pub crop: CropStrategy,
}

impl ScanLoadOptions {
    pub fn new(scale_to: u32, crop_to: u32, channels: usize, crop: CropStrategy) -> Self {
        Self {
            scale_to,
            crop_to,
            channels,
            crop,
        }
    }
}

impl ScanItem {
    /// Decodes, rescales and crops the scan into a
    /// `[1, crop, crop, channels]` byte tensor.
    pub fn load(&self, options: &ScanLoadOptions) -> Result<TensorData, ScanImageError> {
        let image = image::ImageReader::open(&self.path)?.decode()?;
        let image = if options.channels == 1 {
            DynamicImage::ImageLuma8(image.to_luma8())
        } else {
            DynamicImage::ImageRgb8(image.to_rgb8())
        };

        let (w, h) = (image.width(), image.height());
        let scale = options.scale_to as f64 / w.min(h).max(1) as f64;
        let nw = ((w as f64 * scale).round() as u32).max(options.scale_to);
        let nh = ((h as f64 * scale).round() as u32).max(options.scale_to);
        let image = image.resize_exact(nw, nh, FilterType::Triangle);

        let crop = options.crop_to.min(nw).min(nh);
        let (x, y) = crop_origin(nw, nh, crop, options.crop);
        let image = image.crop_imm(x, y, crop, crop);

        let bytes = image.into_bytes();
        Ok(TensorData::new(
            bytes,
            vec![1, crop as usize, crop as usize, options.channels],
        ))
    }
}

/// Top-left corner of a `crop` x `crop` window inside a `width` x
/// `height` canvas, placed according to the strategy.
pub fn crop_origin(width: u32, height: u32, crop: u32, strategy: CropStrategy) -> (u32, u32) {
    let center = ((width - crop) / 2, (height - crop) / 2);
    match strategy {
        CropStrategy::Center => center,
        CropStrategy::RandomWithin { bound } => {
            let mut rng = rand::rng();
            let mut sample = |size: u32, fallback: u32| {
                let bound = bound.min(size);
                if bound <= crop {
                    return fallback;
                }
                let lo = (size - bound) / 2;
                let hi = (size + bound) / 2 - crop;
                rng.random_range(lo..=hi)
            };
            (sample(width, center.0), sample(height, center.1))
        }
    }
}

#[derive(Error, Debug)]
pub enum ScanDatasetError {
    #[error("the path {} is not valid because {}", .path, .reason)]
    InvalidPath { path: String, reason: String },
    #[error("unable to deserialize ron file due to {:?}", .0)]
    RonDeserialization(#[from] SpannedError),
    #[error("unable to access ron file due to {:?}", .0)]
    RonFileAccess(#[from] io::Error),
    #[error("unable to serialize ron file due to {:?}", .0)]
    RonSerialization(#[from] ron::error::Error),
}

/// All scans below one directory, in deterministic path order so the
/// evaluation loader iterates identically every epoch.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ScanDataset {
    name: String,
    items: Vec<ScanItem>,
}

impl ScanDataset {
    pub fn new(root: &Path) -> Result<Self, ScanDatasetError> {
        if !root.exists() || !root.is_dir() {
            return Err(ScanDatasetError::InvalidPath {
                path: format!("{root:?}"),
                reason: "the scan path does not exist or is not a directory".into(),
            });
        }

        let mut items: Vec<ScanItem> = WalkDir::new(root)
            .into_iter()
            .flat_map(Result::ok)
            .filter(|entry| entry.file_type().is_file() && is_image_file(entry.path()))
            .map(|entry| ScanItem {
                path: entry.path().to_owned(),
            })
            .collect();
        items.sort_by(|a, b| a.path.cmp(&b.path));

        if items.is_empty() {
            return Err(ScanDatasetError::InvalidPath {
                path: format!("{root:?}"),
                reason: "the directory contains no readable image files".into(),
            });
        }
        info!("collected {} scans below {:?}", items.len(), root);

        Ok(Self {
            name: root.to_string_lossy().into_owned(),
            items,
        })
    }

    pub fn save_to_ron(&self, path: &Path) -> Result<(), ScanDatasetError> {
        if path.exists() {
            if path.is_dir() {
                return Err(ScanDatasetError::InvalidPath {
                    path: format!("{path:?}"),
                    reason: "expected a .ron file path, found a directory".into(),
                });
            }
            fs::remove_file(path)?;
        }
        let file = File::create_new(path)?;
        to_writer(file, self)?;
        Ok(())
    }

    pub fn load_from_ron(path: &Path) -> Result<Self, ScanDatasetError> {
        if !path.exists() || path.is_dir() {
            return Err(ScanDatasetError::InvalidPath {
                path: format!("{path:?}"),
                reason: "the path does not lead to a .ron manifest".into(),
            });
        }
        let file = File::open(path)?;
        Ok(from_reader(file)?)
    }

    /// Random train/test partition.
    pub fn split(mut self, train_ratio: f64) -> (Self, Self) {
        assert!(
            0.0 < train_ratio && train_ratio < 1.0,
            "the ratio must be in (0, 1)"
        );
        let train_amount = (train_ratio * self.items.len() as f64) as usize;
        let mut rng = rand::rng();
        let mut train_items = vec![];
        while train_items.len() < train_amount && !self.items.is_empty() {
            let idx = rng.random_range(0..self.items.len());
            train_items.push(self.items.swap_remove(idx));
        }
        (
            Self {
                name: "train".into(),
                items: train_items,
            },
            Self {
                name: "test".into(),
                items: self.items,
            },
        )
    }
}

impl Dataset<ScanItem> for ScanDataset {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn get(&self, index: usize) -> Option<ScanItem> {
        self.items.get(index).cloned()
    }
}
