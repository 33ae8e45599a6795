use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;

use ql::ml_model::mlp::MlpConfig;
use ql::ml_model::optimizer::{Optimizer, OptimizerKind};
use ql::ml_model::q_learning_model::QLearningMlpModel;
use ql::test::corridor_test_environment::{CorridorTestEnvironment, CORRIDOR_LEN};

pub const MODEL_SEED: u64 = 7;

pub fn corridor_model() -> Result<QLearningMlpModel<CorridorTestEnvironment>> {
    let config = MlpConfig::new(CORRIDOR_LEN, vec![16], 3);
    QLearningMlpModel::init_with_rng(
        &config,
        Optimizer::new(OptimizerKind::Adam, 0.01),
        &mut StdRng::seed_from_u64(MODEL_SEED),
    )
}
