use burn::prelude::{Backend, Tensor};
use thiserror::Error;

use super::geometry::{PatchGeometry, Rect};

/// Mean-pixel fill constant for single-channel input, `2*117/255 - 1`.
pub const FILL_GRAY: f32 = 2.0 * 117.0 / 255.0 - 1.0;
/// Per-channel fill constants for RGB input.
pub const FILL_RGB: [f32; 3] = [
    2.0 * 117.0 / 255.0 - 1.0,
    2.0 * 104.0 / 255.0 - 1.0,
    2.0 * 123.0 / 255.0 - 1.0,
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OcclusionError {
    #[error("no default fill constants for {0} channels, expected 1 or 3")]
    UnsupportedChannels(usize),
}

/// Centered crop of a `[batch, channels, height, width]` tensor.
pub fn crop<B: Backend>(batch: &Tensor<B, 4>, rect: Rect) -> Tensor<B, 4> {
    let [n, c, _, _] = batch.dims();
    batch
        .clone()
        .slice([0..n, 0..c, rect.top..rect.bottom, rect.left..rect.right])
}

/// Stamps the fill constant into the occlusion region and hosts the
/// pixel-exact crop/composite operations built on the same geometry.
#[derive(Debug, Clone)]
pub struct Occluder {
    geometry: PatchGeometry,
    fill: Vec<f32>,
}

impl Occluder {
    pub fn new(geometry: PatchGeometry, fill: Vec<f32>) -> Self {
        Self { geometry, fill }
    }

    /// Default fill palette for the given channel count.
    pub fn for_channels(geometry: PatchGeometry, channels: usize) -> Result<Self, OcclusionError> {
        match channels {
            1 => Ok(Self::new(geometry, vec![FILL_GRAY])),
            3 => Ok(Self::new(geometry, FILL_RGB.to_vec())),
            other => Err(OcclusionError::UnsupportedChannels(other)),
        }
    }

    pub fn geometry(&self) -> &PatchGeometry {
        &self.geometry
    }

    pub fn channels(&self) -> usize {
        self.fill.len()
    }

    /// Returns a new batch with the fill region overwritten per channel.
    /// The band of `overlap` pixels just inside the patch boundary keeps
    /// its true values so the generator sees real context at the seam.
    /// The caller's tensor is left untouched.
    pub fn occlude<B: Backend>(&self, batch: Tensor<B, 4>) -> Tensor<B, 4> {
        let [n, c, _, _] = batch.dims();
        assert_eq!(
            c,
            self.fill.len(),
            "fill palette covers {} channels but batch has {}",
            self.fill.len(),
            c
        );
        let r = self.geometry.fill_rect;
        let mut occluded = batch;
        for (ch, &value) in self.fill.iter().enumerate() {
            let stamp = Tensor::full([n, 1, r.height(), r.width()], value, &occluded.device());
            occluded = occluded.slice_assign(
                [0..n, ch..ch + 1, r.top..r.bottom, r.left..r.right],
                stamp,
            );
        }
        occluded
    }

    /// The central patch the generator must reconstruct.
    pub fn patch<B: Backend>(&self, batch: &Tensor<B, 4>) -> Tensor<B, 4> {
        crop(batch, self.geometry.patch_rect)
    }

    /// The margin-extended patch for the margin/joint discriminators.
    pub fn margin<B: Backend>(&self, batch: &Tensor<B, 4>) -> Tensor<B, 4> {
        crop(batch, self.geometry.margin_rect)
    }

    /// Writes the generated patch back into the patch rectangle of the
    /// occluded input. Every pixel outside the patch equals the occluded
    /// input, so fill constants persist where the write-back does not
    /// reach.
    pub fn composite<B: Backend>(
        &self,
        occluded: &Tensor<B, 4>,
        fake_patch: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [n, c, _, _] = occluded.dims();
        let r = self.geometry.patch_rect;
        occluded
            .clone()
            .slice_assign([0..n, 0..c, r.top..r.bottom, r.left..r.right], fake_patch)
    }
}
