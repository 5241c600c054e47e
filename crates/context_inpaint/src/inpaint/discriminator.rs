use burn::{
    config::Config,
    module::Module,
    nn::{
        BatchNorm, BatchNormConfig, Initializer, LeakyRelu, LeakyReluConfig, Linear,
        LinearConfig, PaddingConfig2d, Sigmoid,
        conv::{Conv2d, Conv2dConfig},
    },
    prelude::Backend,
    tensor::Tensor,
};
use serde::{Deserialize, Serialize};

/// DCGAN-style tower: stride-2 convs halve the resolution while the
/// input is even and above 4, a final full-kernel conv collapses the
/// remainder to a 1x1 feature map of `out_channels`.
#[derive(Module, Debug)]
pub struct ConvTower<B: Backend> {
    convs: Vec<Conv2d<B>>,
    norms: Vec<BatchNorm<B, 2>>,
    head: Conv2d<B>,
    lrelu: LeakyRelu,
}

#[derive(Config, Debug)]
pub struct ConvTowerConfig {
    pub input_size: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    #[config(default = "64")]
    pub ndf: usize,
    #[config(default = "0.02")]
    pub init_stddev: f64,
}

impl ConvTowerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvTower<B> {
        let init = Initializer::Normal {
            mean: 0.0,
            std: self.init_stddev,
        };
        let mut convs = vec![];
        let mut norms = vec![];
        let cap = self.ndf * 8;
        let mut channels = self.in_channels;
        let mut next = self.ndf;
        let mut size = self.input_size;
        while size > 4 && size % 2 == 0 {
            let cout = next.min(cap);
            convs.push(
                Conv2dConfig::new([channels, cout], [4, 4])
                    .with_stride([2, 2])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .with_initializer(init.clone())
                    .init(device),
            );
            if convs.len() > 1 {
                norms.push(BatchNormConfig::new(cout).init(device));
            }
            channels = cout;
            next *= 2;
            size /= 2;
        }
        let head = Conv2dConfig::new([channels, self.out_channels], [size, size])
            .with_initializer(init.clone())
            .init(device);

        ConvTower {
            convs,
            norms,
            head,
            lrelu: LeakyReluConfig::new().with_negative_slope(0.2).init(),
        }
    }
}

impl<B: Backend> ConvTower<B> {
    /// `[n, in_channels, s, s]` -> `[n, out_channels]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let n = x.dims()[0];
        let mut x = x;
        for (i, conv) in self.convs.iter().enumerate() {
            x = conv.forward(x);
            if i > 0 {
                x = self.norms[i - 1].forward(x);
            }
            x = self.lrelu.forward(x);
        }
        let out = self.head.forward(x);
        let channels = out.dims()[1];
        out.reshape([n, channels])
    }
}

/// Scores the bare reconstructed patch.
#[derive(Module, Debug)]
pub struct PatchDiscriminator<B: Backend> {
    tower: ConvTower<B>,
    sigmoid: Sigmoid,
}

impl<B: Backend> PatchDiscriminator<B> {
    pub fn forward(&self, patch: Tensor<B, 4>) -> Tensor<B, 1> {
        let n = patch.dims()[0];
        self.sigmoid.forward(self.tower.forward(patch)).reshape([n])
    }
}

/// Scores the margin-extended patch: the reconstruction plus a border
/// of surrounding context.
#[derive(Module, Debug)]
pub struct MarginDiscriminator<B: Backend> {
    tower: ConvTower<B>,
    sigmoid: Sigmoid,
}

impl<B: Backend> MarginDiscriminator<B> {
    pub fn forward(&self, margin_patch: Tensor<B, 4>) -> Tensor<B, 1> {
        let n = margin_patch.dims()[0];
        self.sigmoid
            .forward(self.tower.forward(margin_patch))
            .reshape([n])
    }
}

/// Scores a local (margin) view and the full image jointly: both towers
/// flatten to `fullyconn_size` features fused by a single linear layer.
#[derive(Module, Debug)]
pub struct JointDiscriminator<B: Backend> {
    local: ConvTower<B>,
    global: ConvTower<B>,
    fuse: Linear<B>,
    sigmoid: Sigmoid,
    /// When the margin degenerates to the patch, the local input is the
    /// plain un-padded patch tensor rather than the margin crop of the
    /// composited image. The two call shapes are kept distinct for
    /// checkpoint compatibility.
    plain_patch_local: bool,
}

impl<B: Backend> JointDiscriminator<B> {
    pub fn forward(&self, local_view: Tensor<B, 4>, full_image: Tensor<B, 4>) -> Tensor<B, 1> {
        let n = local_view.dims()[0];
        let local = self.local.forward(local_view);
        let global = self.global.forward(full_image);
        let fused = self.fuse.forward(Tensor::cat(vec![local, global], 1));
        self.sigmoid.forward(fused).reshape([n])
    }
}

/// Which discriminator topology the experiment runs with; chosen once
/// at configuration time.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscriminatorKind {
    Patch,
    Margin,
    Joint,
}

/// Everything a discriminator variant may look at for one batch. The
/// training loop hands in either all-real or all-generated views; the
/// variant picks the tensors it scores.
#[derive(Clone, Debug)]
pub struct ScoreContext<B: Backend> {
    pub patch: Tensor<B, 4>,
    pub margin_patch: Tensor<B, 4>,
    pub full_image: Tensor<B, 4>,
}

impl<B: Backend> ScoreContext<B> {
    /// Detaches every view so a discriminator step cannot propagate
    /// gradient into the generator.
    pub fn detach(self) -> Self {
        Self {
            patch: self.patch.detach(),
            margin_patch: self.margin_patch.detach(),
            full_image: self.full_image.detach(),
        }
    }
}

#[derive(Module, Debug)]
pub enum InpaintDiscriminator<B: Backend> {
    Patch(PatchDiscriminator<B>),
    Margin(MarginDiscriminator<B>),
    Joint(JointDiscriminator<B>),
}

impl<B: Backend> InpaintDiscriminator<B> {
    /// One realism score per image, in [0, 1].
    pub fn score(&self, context: ScoreContext<B>) -> Tensor<B, 1> {
        match self {
            InpaintDiscriminator::Patch(d) => d.forward(context.patch),
            InpaintDiscriminator::Margin(d) => d.forward(context.margin_patch),
            InpaintDiscriminator::Joint(d) => {
                let local = if d.plain_patch_local {
                    context.patch
                } else {
                    context.margin_patch
                };
                d.forward(local, context.full_image)
            }
        }
    }
}

#[derive(Config, Debug)]
pub struct InpaintDiscriminatorConfig {
    pub kind: DiscriminatorKind,
    pub image_size: usize,
    pub patch_size: usize,
    pub margin_size: usize,
    #[config(default = "1")]
    pub in_channels: usize,
    #[config(default = "64")]
    pub ndf: usize,
    /// Feature width of each tower output in the joint variant.
    #[config(default = "1024")]
    pub fullyconn_size: usize,
    #[config(default = "0.02")]
    pub init_stddev: f64,
}

impl InpaintDiscriminatorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> InpaintDiscriminator<B> {
        let tower = |input_size, out_channels| {
            ConvTowerConfig::new(input_size, self.in_channels, out_channels)
                .with_ndf(self.ndf)
                .with_init_stddev(self.init_stddev)
                .init(device)
        };
        match self.kind {
            DiscriminatorKind::Patch => InpaintDiscriminator::Patch(PatchDiscriminator {
                tower: tower(self.patch_size, 1),
                sigmoid: Sigmoid::new(),
            }),
            DiscriminatorKind::Margin => InpaintDiscriminator::Margin(MarginDiscriminator {
                tower: tower(self.margin_size, 1),
                sigmoid: Sigmoid::new(),
            }),
            DiscriminatorKind::Joint => InpaintDiscriminator::Joint(JointDiscriminator {
                local: tower(self.margin_size, self.fullyconn_size),
                global: tower(self.image_size, self.fullyconn_size),
                fuse: LinearConfig::new(self.fullyconn_size * 2, 1)
                    .with_initializer(Initializer::Normal {
                        mean: 0.0,
                        std: self.init_stddev,
                    })
                    .init(device),
                sigmoid: Sigmoid::new(),
                plain_patch_local: self.margin_size == self.patch_size,
            }),
        }
    }
}
