use burn::{
    config::Config,
    module::Module,
    nn::{
        BatchNorm, BatchNormConfig, Initializer, LeakyRelu, LeakyReluConfig, PaddingConfig2d,
        Relu, Tanh,
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
    },
    prelude::Backend,
    tensor::Tensor,
};

/// Context-encoder generator: a strided conv encoder compresses the
/// occluded image into a channel bottleneck, a transposed-conv decoder
/// expands it back to the central patch. No skip connections; the
/// occluded region must be reconstructed from the bottleneck code.
#[derive(Module, Debug)]
pub struct ContextEncoder<B: Backend> {
    enc_convs: Vec<Conv2d<B>>,
    enc_norms: Vec<BatchNorm<B, 2>>,
    bottleneck_conv: Conv2d<B>,
    dec_convs: Vec<ConvTranspose2d<B>>,
    dec_norms: Vec<BatchNorm<B, 2>>,
    out_conv: ConvTranspose2d<B>,
    lrelu: LeakyRelu,
    relu: Relu,
    tanh: Tanh,
}

#[derive(Config, Debug)]
pub struct ContextEncoderConfig {
    /// Height/width of the occluded input image.
    pub image_size: usize,
    /// Height/width of the reconstructed patch.
    pub patch_size: usize,
    #[config(default = "1")]
    pub in_channels: usize,
    #[config(default = "1")]
    pub out_channels: usize,
    /// Encoder filters in the first conv layer.
    #[config(default = "64")]
    pub nef: usize,
    /// Channels of the 1x1 bottleneck code.
    #[config(default = "4000")]
    pub bottleneck: usize,
    #[config(default = "0.02")]
    pub init_stddev: f64,
}

impl ContextEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ContextEncoder<B> {
        assert!(
            is_conv_pyramid_size(self.image_size) && is_conv_pyramid_size(self.patch_size),
            "image size {} and patch size {} must be 4 * 2^k for the stride-2 conv pyramid",
            self.image_size,
            self.patch_size
        );
        let init = Initializer::Normal {
            mean: 0.0,
            std: self.init_stddev,
        };
        let down = |cin, cout| {
            Conv2dConfig::new([cin, cout], [4, 4])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_initializer(init.clone())
        };
        let up = |cin, cout| {
            ConvTranspose2dConfig::new([cin, cout], [4, 4])
                .with_stride([2, 2])
                .with_padding([1, 1])
                .with_padding_out([0, 0])
                .with_initializer(init.clone())
        };

        // Encoder: image_size -> 4, channels nef, 2nef, ... capped at 8nef.
        // The first block has no batch norm.
        let mut enc_convs = vec![];
        let mut enc_norms = vec![];
        let cap = self.nef * 8;
        let mut channels = self.in_channels;
        let mut next = self.nef;
        let mut size = self.image_size;
        while size > 4 {
            let cout = next.min(cap);
            let conv = down(channels, cout).init(device);
            if !enc_convs.is_empty() {
                enc_norms.push(BatchNormConfig::new(cout).init(device));
            }
            enc_convs.push(conv);
            channels = cout;
            next *= 2;
            size /= 2;
        }

        // 4x4 feature map -> 1x1 bottleneck code.
        let bottleneck_conv = Conv2dConfig::new([channels, self.bottleneck], [4, 4])
            .with_initializer(init.clone())
            .init(device);

        // Decoder: 1x1 -> patch_size. The first transposed conv restores
        // the 4x4 map, the rest double the resolution while halving the
        // channels down to nef; the output conv produces the patch.
        let mut dec_convs = vec![];
        let mut dec_norms = vec![];
        let mut channels_out = cap;
        let first_up = ConvTranspose2dConfig::new([self.bottleneck, channels_out], [4, 4])
            .with_initializer(init.clone())
            .init(device);
        dec_norms.push(BatchNormConfig::new(channels_out).init(device));
        dec_convs.push(first_up);

        let mut size = 4;
        while size < self.patch_size / 2 {
            let cout = (channels_out / 2).max(self.nef);
            dec_convs.push(up(channels_out, cout).init(device));
            dec_norms.push(BatchNormConfig::new(cout).init(device));
            channels_out = cout;
            size *= 2;
        }
        let out_conv = up(channels_out, self.out_channels).init(device);

        ContextEncoder {
            enc_convs,
            enc_norms,
            bottleneck_conv,
            dec_convs,
            dec_norms,
            out_conv,
            lrelu: LeakyReluConfig::new().with_negative_slope(0.2).init(),
            relu: Relu::new(),
            tanh: Tanh::new(),
        }
    }
}

fn is_conv_pyramid_size(size: usize) -> bool {
    size >= 8 && size % 4 == 0 && (size / 4).is_power_of_two()
}

impl<B: Backend> ContextEncoder<B> {
    /// Occluded image batch in, reconstructed patch batch out, shape
    /// `[batch, out_channels, patch_size, patch_size]`.
    pub fn forward(&self, occluded: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = occluded;
        for (i, conv) in self.enc_convs.iter().enumerate() {
            x = conv.forward(x);
            if i > 0 {
                x = self.enc_norms[i - 1].forward(x);
            }
            x = self.lrelu.forward(x);
        }
        x = self.lrelu.forward(self.bottleneck_conv.forward(x));
        for (conv, norm) in self.dec_convs.iter().zip(self.dec_norms.iter()) {
            x = self.relu.forward(norm.forward(conv.forward(x)));
        }
        self.tanh.forward(self.out_conv.forward(x))
    }
}
