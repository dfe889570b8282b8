use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

/// The learning rate hyperparameter, shared between the batch producer and the optimizer.
///
/// The producer is the only writer and writes exclusively between epochs; the optimizer
/// reads it once per update. Writes are `Release` and reads `Acquire`, so every update
/// started after a decay observes the decayed value. Batches already queued when the
/// decay happens are trained with the new value.
#[derive(Debug, Clone)]
pub struct LearningRate(Arc<AtomicU32>);

impl LearningRate {
    /// Creates a new `LearningRate` with an initial value.
    pub fn new(value: f32) -> Self {
        Self(Arc::new(AtomicU32::new(value.to_bits())))
    }

    /// Returns the current value.
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Overwrites the current value.
    pub fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release);
    }

    /// Multiplies the current value by `factor`.
    ///
    /// # Returns
    /// The decayed value.
    pub fn decay(&self, factor: f32) -> f32 {
        let value = self.get() * factor;
        self.set(value);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decay_is_visible_through_clones() {
        let lr = LearningRate::new(0.001);
        let reader = lr.clone();

        lr.decay(0.5);
        assert_eq!(reader.get(), 0.0005);

        lr.set(1.0);
        assert_eq!(reader.decay(0.97), 0.97);
    }
}
