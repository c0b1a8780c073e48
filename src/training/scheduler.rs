/// Reduce the learning rate when a monitored loss stops improving
///
/// After `patience` epochs without an improvement of at least `min_delta`,
/// the rate is multiplied by `factor` and clamped at `min_lr`.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    lr: f64,
    factor: f64,
    patience: usize,
    min_lr: f64,
    min_delta: f64,
    cooldown: usize,
    cooldown_counter: usize,
    best: f64,
    num_bad_epochs: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(lr: f64, factor: f64, patience: usize, min_lr: f64) -> Self {
        Self {
            lr,
            factor,
            patience,
            min_lr,
            min_delta: 1e-4,
            cooldown: 0,
            cooldown_counter: 0,
            best: f64::INFINITY,
            num_bad_epochs: 0,
        }
    }

    pub fn with_cooldown(mut self, cooldown: usize) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    /// Feed the loss of a finished epoch; returns the rate for the next one
    pub fn step(&mut self, loss: f64) -> f64 {
        if self.cooldown_counter > 0 {
            self.cooldown_counter -= 1;
            self.num_bad_epochs = 0;
        }

        if loss.is_finite() && loss < self.best - self.min_delta {
            self.best = loss;
            self.num_bad_epochs = 0;
            return self.lr;
        }

        if self.cooldown_counter > 0 {
            return self.lr;
        }

        self.num_bad_epochs += 1;
        if self.num_bad_epochs >= self.patience && self.lr > self.min_lr {
            let new_lr = (self.lr * self.factor).max(self.min_lr);
            tracing::info!(
                "Reducing learning rate from {:.3e} to {:.3e}",
                self.lr,
                new_lr
            );
            self.lr = new_lr;
            self.cooldown_counter = self.cooldown;
            self.num_bad_epochs = 0;
        }

        self.lr
    }
}
