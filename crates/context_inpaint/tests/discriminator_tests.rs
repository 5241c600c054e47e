#[cfg(test)]
mod discriminator {
    use burn::{
        backend::NdArray,
        tensor::{Distribution, Tensor},
    };
    use context_inpaint::inpaint::{
        discriminator::{DiscriminatorKind, InpaintDiscriminatorConfig, ScoreContext},
        geometry::PatchGeometry,
        occlusion::Occluder,
    };

    type MyBackend = NdArray<f32>;

    fn context(
        geometry: PatchGeometry,
        batch: usize,
        device: &<MyBackend as burn::prelude::Backend>::Device,
    ) -> ScoreContext<MyBackend> {
        let occluder = Occluder::for_channels(geometry, 1).unwrap();
        let images = Tensor::<MyBackend, 4>::random(
            [batch, 1, geometry.image_size, geometry.image_size],
            Distribution::Default,
            device,
        );
        ScoreContext {
            patch: occluder.patch(&images),
            margin_patch: occluder.margin(&images),
            full_image: images,
        }
    }

    fn assert_scores(scores: Tensor<MyBackend, 1>, batch: usize) {
        assert_eq!(scores.dims(), [batch]);
        assert!(scores.clone().max().into_scalar() <= 1.0);
        assert!(scores.min().into_scalar() >= 0.0);
    }

    #[test]
    fn every_variant_scores_one_value_per_image() {
        let device = Default::default();
        let geometry = PatchGeometry::new(64, 32, 40, 4).unwrap();

        for kind in [
            DiscriminatorKind::Patch,
            DiscriminatorKind::Margin,
            DiscriminatorKind::Joint,
        ] {
            let discriminator = InpaintDiscriminatorConfig::new(kind, 64, 32, 40)
                .with_ndf(8)
                .with_fullyconn_size(32)
                .init::<MyBackend>(&device);
            let scores = discriminator.score(context(geometry, 3, &device));
            assert_scores(scores, 3);
        }
    }

    /// When the margin degenerates to the patch the joint variant must
    /// still accept the context, scoring the plain patch locally.
    #[test]
    fn joint_variant_handles_a_margin_equal_to_the_patch() {
        let device = Default::default();
        let geometry = PatchGeometry::new(64, 32, 32, 4).unwrap();

        let discriminator = InpaintDiscriminatorConfig::new(DiscriminatorKind::Joint, 64, 32, 32)
            .with_ndf(8)
            .with_fullyconn_size(32)
            .init::<MyBackend>(&device);
        let scores = discriminator.score(context(geometry, 2, &device));
        assert_scores(scores, 2);
    }

    /// The margin tower must cope with sizes that stop being even above
    /// 4, like 80 -> 40 -> 20 -> 10 -> 5.
    #[test]
    fn margin_variant_handles_a_non_power_of_two_size() {
        let device = Default::default();
        let geometry = PatchGeometry::new(128, 64, 80, 4).unwrap();

        let discriminator = InpaintDiscriminatorConfig::new(DiscriminatorKind::Margin, 128, 64, 80)
            .with_ndf(8)
            .init::<MyBackend>(&device);
        let scores = discriminator.score(context(geometry, 2, &device));
        assert_scores(scores, 2);
    }
}
