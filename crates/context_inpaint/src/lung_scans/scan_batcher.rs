use burn::{
    data::dataloader::batcher::Batcher,
    prelude::Backend,
    tensor::Tensor,
};
use log::warn;

use crate::lung_scans::scan_dataset::{ScanItem, ScanLoadOptions};

#[derive(Clone, Debug)]
pub struct ScanBatch<B: Backend> {
    /// `[batch, channels, size, size]`, normalized to [-1, 1].
    pub images: Tensor<B, 4>,
}

#[derive(Clone, Debug)]
pub struct ScanBatcher {
    options: ScanLoadOptions,
}

impl ScanBatcher {
    pub fn new(options: ScanLoadOptions) -> Self {
        Self { options }
    }
}

impl<B: Backend> Batcher<B, ScanItem, ScanBatch<B>> for ScanBatcher {
    fn batch(&self, items: Vec<ScanItem>, device: &B::Device) -> ScanBatch<B> {
        let images: Vec<Tensor<B, 4>> = items
            .iter()
            .filter_map(|item| match item.load(&self.options) {
                Ok(data) => Some(Tensor::<B, 4>::from_data(data, device)),
                Err(e) => {
                    warn!("skipping {:?}: {e}", item.path);
                    None
                }
            })
            // [n, h, w, c] -> [n, c, h, w]
            .map(|tensor| tensor.permute([0, 3, 1, 2]))
            .collect();
        let images = Tensor::cat(images, 0);

        ScanBatch {
            images: (images - 127.5) / 127.5,
        }
    }
}
