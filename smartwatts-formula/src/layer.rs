//! A frequency layer: one power model plus the two histories that feed it.
//!
//! Grounded in `src/smartwatts/model/frequency_layer.py`'s `FrequencyLayer`.

use crate::history::{ErrorHistory, SampleHistory};
use crate::model::PowerModel;

pub struct FrequencyLayer {
    pub model: PowerModel,
    pub samples: SampleHistory,
    pub errors: ErrorHistory,
}

impl FrequencyLayer {
    pub fn new(frequency_mhz: u32, history_window_size: usize, error_window_size: usize) -> Self {
        Self {
            model: PowerModel::new(frequency_mhz),
            samples: SampleHistory::new(history_window_size),
            errors: ErrorHistory::new(error_window_size),
        }
    }

    pub fn store_sample(&mut self, power_reference: f64, features: Vec<f64>) {
        self.samples.push(power_reference, features);
    }

    pub fn store_error(&mut self, error: f64) {
        self.errors.push(error);
    }

    /// Attempts a refit from the sample history. On acceptance, the error
    /// history is cleared — its contents reflected the previous model
    /// generation and no longer describe the current one.
    pub fn update_model(&mut self, min_intercept: f64, max_intercept: f64, min_samples: usize) -> bool {
        let accepted = self.model.fit(&self.samples, min_intercept, max_intercept, min_samples);
        if accepted {
            self.errors.clear();
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ErrorWindowMethod;

    #[test]
    fn update_model_clears_errors_only_on_acceptance() {
        let mut layer = FrequencyLayer::new(2000, 20, 10);
        for _ in 0..5 {
            layer.store_error(99.0);
        }
        assert!(!layer.update_model(0.0, 125.0, 10)); // not enough samples yet
        assert_eq!(layer.errors.summary(ErrorWindowMethod::Mean), 99.0);

        for i in 0..20 {
            layer.store_sample(2.0 * i as f64 + 10.0, vec![i as f64]);
        }
        assert!(layer.update_model(0.0, 125.0, 10));
        assert!(layer.errors.is_empty());
    }
}
