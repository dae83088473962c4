// Ranking: weight calculation, distributions, model training and scoring.

pub mod composite;
pub mod distribution;
pub mod engine;
pub mod model;
pub mod trainer;
pub mod weights;
