pub mod discriminator;
pub mod evaluation;
pub mod fidelity;
pub mod generator;
pub mod geometry;
pub mod measures;
pub mod objective;
pub mod occlusion;
pub mod training;
