use burn::{
    config::Config,
    nn::loss::{BinaryCrossEntropyLoss, BinaryCrossEntropyLossConfig},
    prelude::Backend,
    tensor::{Int, Tensor},
};

use super::geometry::PatchGeometry;

/// Epoch-indexed curriculum restricting which network updates and which
/// generator loss terms are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingPhase {
    /// Generator trains on the pure reconstruction term, discriminator
    /// is frozen.
    Warmup,
    /// Discriminator trains, generator is frozen and receives no loss.
    DiscriminatorCatchup,
    /// Full blended objective, both networks update.
    Joint,
}

impl TrainingPhase {
    pub fn updates_discriminator(self) -> bool {
        !matches!(self, TrainingPhase::Warmup)
    }

    pub fn updates_generator(self) -> bool {
        !matches!(self, TrainingPhase::DiscriminatorCatchup)
    }
}

#[derive(Config, Debug)]
pub struct StagingSchedule {
    /// When false every epoch runs the full blended objective.
    #[config(default = false)]
    pub enabled: bool,
    /// Number of warmup epochs at the start of training.
    #[config(default = 2)]
    pub warmup_epochs: usize,
    /// Number of discriminator-only epochs following the warmup.
    #[config(default = 5)]
    pub catchup_epochs: usize,
}

impl StagingSchedule {
    pub fn phase(&self, epoch: usize) -> TrainingPhase {
        if !self.enabled {
            return TrainingPhase::Joint;
        }
        if epoch < self.warmup_epochs {
            TrainingPhase::Warmup
        } else if epoch < self.warmup_epochs + self.catchup_epochs {
            TrainingPhase::DiscriminatorCatchup
        } else {
            TrainingPhase::Joint
        }
    }
}

/// Both per-step losses of the adversarial game: real/fake binary
/// cross-entropy for the discriminator and the staged blend of
/// adversarial and spatially weighted reconstruction error for the
/// generator.
pub struct AdversarialObjective<B: Backend> {
    bce: BinaryCrossEntropyLoss<B>,
    geometry: PatchGeometry,
    wtl2: f64,
    overlap_l2_weight: f64,
}

impl<B: Backend> AdversarialObjective<B> {
    pub fn new(
        geometry: PatchGeometry,
        wtl2: f64,
        overlap_l2_weight: f64,
        device: &B::Device,
    ) -> Self {
        Self {
            bce: BinaryCrossEntropyLossConfig::new().init(device),
            geometry,
            wtl2,
            overlap_l2_weight,
        }
    }

    pub fn wtl2(&self) -> f64 {
        self.wtl2
    }

    fn real_labels(&self, n: usize, device: &B::Device) -> Tensor<B, 1, Int> {
        Tensor::ones([n], device)
    }

    fn fake_labels(&self, n: usize, device: &B::Device) -> Tensor<B, 1, Int> {
        Tensor::zeros([n], device)
    }

    /// BCE(score(real), 1). The caller backprops this into the
    /// discriminator only; the real batch carries no generator history.
    pub fn discriminator_real_loss(&self, real_score: Tensor<B, 1>) -> Tensor<B, 1> {
        let n = real_score.dims()[0];
        let labels = self.real_labels(n, &real_score.device());
        self.bce.forward(real_score, labels)
    }

    /// BCE(score(fake), 0). The fake score must come from a detached
    /// patch so no gradient can reach the generator.
    pub fn discriminator_fake_loss(&self, fake_score: Tensor<B, 1>) -> Tensor<B, 1> {
        let n = fake_score.dims()[0];
        let labels = self.fake_labels(n, &fake_score.device());
        self.bce.forward(fake_score, labels)
    }

    /// BCE(score(fake), 1): fake labels are real for the generator cost.
    pub fn adversarial_loss(&self, fake_score: Tensor<B, 1>) -> Tensor<B, 1> {
        let n = fake_score.dims()[0];
        let labels = self.real_labels(n, &fake_score.device());
        self.bce.forward(fake_score, labels)
    }

    /// Patch-shaped weight matrix: `wtl2 * overlap_l2_weight` on the
    /// seam band, plain `wtl2` on the interior, so reconstruction errors
    /// near the seam are penalized more heavily.
    pub fn loss_weight_matrix(&self, n: usize, c: usize, device: &B::Device) -> Tensor<B, 4> {
        let p = self.geometry.patch_size;
        let inner = p - 2 * self.geometry.overlap;
        let o = self.geometry.overlap;
        let matrix: Tensor<B, 4> =
            Tensor::full([n, c, p, p], self.wtl2 * self.overlap_l2_weight, device);
        let interior = Tensor::full([n, c, inner, inner], self.wtl2, device);
        matrix.slice_assign([0..n, 0..c, o..o + inner, o..o + inner], interior)
    }

    /// Mean of the weighted squared error between the generated and the
    /// real patch.
    pub fn reconstruction_loss(
        &self,
        fake_patch: Tensor<B, 4>,
        real_patch: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        let [n, c, _, _] = fake_patch.dims();
        let weights = self.loss_weight_matrix(n, c, &fake_patch.device());
        ((fake_patch - real_patch).powf_scalar(2.0) * weights).mean()
    }

    /// Blends the two generator terms according to the phase. Returns
    /// `None` while the generator is frozen.
    pub fn generator_loss(
        &self,
        adversarial: Tensor<B, 1>,
        reconstruction: Tensor<B, 1>,
        phase: TrainingPhase,
    ) -> Option<Tensor<B, 1>> {
        match phase {
            TrainingPhase::Warmup => Some(reconstruction),
            TrainingPhase::DiscriminatorCatchup => None,
            TrainingPhase::Joint => Some(
                adversarial.mul_scalar(1.0 - self.wtl2) + reconstruction.mul_scalar(self.wtl2),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frozen_schedule() -> StagingSchedule {
        StagingSchedule::new().with_enabled(true)
    }

    #[test]
    fn staged_phases_follow_the_default_transitions() {
        let schedule = frozen_schedule();
        assert_eq!(schedule.phase(0), TrainingPhase::Warmup);
        assert_eq!(schedule.phase(1), TrainingPhase::Warmup);
        assert_eq!(schedule.phase(2), TrainingPhase::DiscriminatorCatchup);
        assert_eq!(schedule.phase(4), TrainingPhase::DiscriminatorCatchup);
        assert_eq!(schedule.phase(6), TrainingPhase::DiscriminatorCatchup);
        assert_eq!(schedule.phase(7), TrainingPhase::Joint);
        assert_eq!(schedule.phase(8), TrainingPhase::Joint);
    }

    #[test]
    fn disabled_schedule_is_always_joint() {
        let schedule = StagingSchedule::new();
        for epoch in 0..10 {
            assert_eq!(schedule.phase(epoch), TrainingPhase::Joint);
        }
    }

    #[test]
    fn warmup_freezes_the_discriminator_only() {
        assert!(!TrainingPhase::Warmup.updates_discriminator());
        assert!(TrainingPhase::Warmup.updates_generator());
        assert!(TrainingPhase::DiscriminatorCatchup.updates_discriminator());
        assert!(!TrainingPhase::DiscriminatorCatchup.updates_generator());
        assert!(TrainingPhase::Joint.updates_discriminator());
        assert!(TrainingPhase::Joint.updates_generator());
    }

    #[test]
    fn custom_transition_epochs_are_respected() {
        let schedule = frozen_schedule()
            .with_warmup_epochs(1)
            .with_catchup_epochs(2);
        assert_eq!(schedule.phase(0), TrainingPhase::Warmup);
        assert_eq!(schedule.phase(1), TrainingPhase::DiscriminatorCatchup);
        assert_eq!(schedule.phase(2), TrainingPhase::DiscriminatorCatchup);
        assert_eq!(schedule.phase(3), TrainingPhase::Joint);
    }
}
