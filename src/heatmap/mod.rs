pub mod builder;

pub use builder::{
    build_heatmap, detect_clusters, AssetHeatmap, Cluster, GlobalLevel, Heatmap, HeatmapLevel,
};
