pub use super::config::PipelineConfig;
pub use super::error::{PrepError, Result};
pub use super::external::{
    BiasFieldCorrector, CommandBiasCorrector, CommandFeatureEngine, CommandThreshold,
    ExtractionSettings, FeatureEngine, FeatureMap, ForegroundThreshold, ToolCommand,
};
pub use super::log::StageTimer;
pub use super::segment::{LogicalOperation, Segmentation};
pub use super::table::FeatureTable;
pub use super::volume::{LabelVolume, ScalarVolume, Volume};
