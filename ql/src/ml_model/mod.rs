pub mod checkpoint;
pub mod mlp;
pub mod model;
pub mod optimizer;
pub mod q_learning_model;
