// GSHL stats engine: classifies fantasy-hockey stat lines, trains
// percentile ranking models, scores lines against them and rolls day lines
// up into weekly, split, total and season aggregates with standings.

pub mod aggregation;
pub mod config;
pub mod matchup;
pub mod ranking;
pub mod stats;
