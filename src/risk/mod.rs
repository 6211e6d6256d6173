pub mod analyzer;

pub use analyzer::{
    analyze_positions, liquidation_price, predict_cascade, CascadeReport, PositionRisk,
};
