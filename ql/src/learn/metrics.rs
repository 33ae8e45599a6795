/// Decay of the reward moving average per sample: a time constant of 20 samples
pub const REWARD_AVG_DECAY: f32 = 0.951_229_4; // exp(-1/20)
/// Samples kept by [MetricsRecorder::new]; at 25 steps per sample that covers 2.5M steps
pub const DEFAULT_MAX_SAMPLES: usize = 100_000;

/// One point of the training curves
#[derive(Clone, Debug, PartialEq)]
pub struct MetricsSample {
    pub step: usize,
    pub episode: usize,
    pub epsilon: f64,
    /// loss of the most recent training batch (none before the first training step)
    pub loss: Option<f32>,
    /// mean updated Q-value of the most recent training batch
    pub mean_q: Option<f32>,
    /// rewards collected since the previous sample
    pub reward_sum: f32,
    pub reward_moving_avg: f32,
}

/// Collects the training curve samples. Only the most recent `max_samples` ones are retained;
/// older samples are dropped in chunks, so between `max_samples` and `2 * max_samples` stay available.
#[derive(Debug)]
pub struct MetricsRecorder {
    last_loss: Option<f32>,
    last_mean_q: Option<f32>,
    reward_sum: f32,
    reward_moving_avg: f32,
    max_samples: usize,
    samples: Vec<MetricsSample>,
}

impl Default for MetricsRecorder {
    fn default() -> Self { Self::with_max_samples(DEFAULT_MAX_SAMPLES) }
}

impl MetricsRecorder {
    pub fn new() -> Self { Self::default() }

    pub fn with_max_samples(max_samples: usize) -> Self {
        Self {
            last_loss: None,
            last_mean_q: None,
            reward_sum: 0.0,
            reward_moving_avg: 0.0,
            max_samples: max_samples.max(1),
            samples: vec![],
        }
    }

    pub fn record_training(
        &mut self,
        loss: f32,
        mean_q: f32,
    ) {
        self.last_loss = Some(loss);
        self.last_mean_q = Some(mean_q);
    }

    pub fn record_reward(
        &mut self,
        reward: f32,
    ) {
        self.reward_sum += reward;
    }

    pub fn take_sample(
        &mut self,
        step: usize,
        episode: usize,
        epsilon: f64,
    ) -> &MetricsSample {
        self.reward_moving_avg = (1.0 - REWARD_AVG_DECAY) * self.reward_sum + REWARD_AVG_DECAY * self.reward_moving_avg;
        if self.samples.len() >= 2 * self.max_samples {
            let surplus = self.samples.len() - self.max_samples + 1;
            self.samples.drain(..surplus);
        }
        self.samples.push(MetricsSample {
            step,
            episode,
            epsilon,
            loss: self.last_loss,
            mean_q: self.last_mean_q,
            reward_sum: self.reward_sum,
            reward_moving_avg: self.reward_moving_avg,
        });
        self.reward_sum = 0.0;
        &self.samples[self.samples.len() - 1]
    }

    pub fn samples(&self) -> &[MetricsSample] { &self.samples }
}
