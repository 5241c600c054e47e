use std::path::Path;

use bincode_derive::{Decode, Encode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeasuresError {
    #[error("failed to read or write the measures file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode the measures file: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode the measures file: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// One averaged datapoint over an accumulation window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurePoint {
    pub d_on_fake: f64,
    pub d_on_real: f64,
    pub adversarial: f64,
    pub reconstruction: f64,
    pub generator_total: f64,
    pub discriminator_total: f64,
}

/// Six parallel series, one point appended per accumulation window,
/// persisted wholesale each epoch and reloaded on resume.
#[derive(Encode, Decode, Debug, Clone, Default, PartialEq)]
pub struct MeasureSeries {
    pub d_on_fake: Vec<f64>,
    pub d_on_real: Vec<f64>,
    pub adversarial: Vec<f64>,
    pub reconstruction: Vec<f64>,
    pub generator_total: Vec<f64>,
    pub discriminator_total: Vec<f64>,
}

impl MeasureSeries {
    pub fn push(&mut self, point: MeasurePoint) {
        self.d_on_fake.push(point.d_on_fake);
        self.d_on_real.push(point.d_on_real);
        self.adversarial.push(point.adversarial);
        self.reconstruction.push(point.reconstruction);
        self.generator_total.push(point.generator_total);
        self.discriminator_total.push(point.discriminator_total);
    }

    pub fn len(&self) -> usize {
        self.d_on_fake.len()
    }

    pub fn is_empty(&self) -> bool {
        self.d_on_fake.is_empty()
    }

    /// Overwrites the file with the whole series.
    pub fn save(&self, path: &Path) -> Result<(), MeasuresError> {
        let bytes = bincode::encode_to_vec(self, bincode::config::standard())?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, MeasuresError> {
        let bytes = std::fs::read(path)?;
        let (series, _) = bincode::decode_from_slice(&bytes, bincode::config::standard())?;
        Ok(series)
    }
}

/// Per-step sums, averaged into one `MeasurePoint` per window. The
/// adversarial and reconstruction sums are reported pre-scaled by their
/// blend weights so the series show each term's contribution to the
/// generator total.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeasureAccumulator {
    d_on_fake: f64,
    d_on_real: f64,
    adversarial: f64,
    reconstruction: f64,
    generator_total: f64,
    discriminator_total: f64,
    steps: usize,
}

impl MeasureAccumulator {
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        d_on_fake: f64,
        d_on_real: f64,
        adversarial: f64,
        reconstruction: f64,
        generator_total: f64,
        discriminator_total: f64,
    ) {
        self.d_on_fake += d_on_fake;
        self.d_on_real += d_on_real;
        self.adversarial += adversarial;
        self.reconstruction += reconstruction;
        self.generator_total += generator_total;
        self.discriminator_total += discriminator_total;
        self.steps += 1;
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Averages the window and resets the sums.
    pub fn drain(&mut self, wtl2: f64) -> MeasurePoint {
        let n = self.steps.max(1) as f64;
        let point = MeasurePoint {
            d_on_fake: self.d_on_fake / n,
            d_on_real: self.d_on_real / n,
            adversarial: self.adversarial * (1.0 - wtl2) / n,
            reconstruction: self.reconstruction * wtl2 / n,
            generator_total: self.generator_total / n,
            discriminator_total: self.discriminator_total / n,
        };
        *self = Self::default();
        point
    }
}
