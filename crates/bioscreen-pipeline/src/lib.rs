//! bioscreen-pipeline: Descriptor generation, feature assembly and the
//! end-to-end prediction run.

pub mod cancel;
pub mod descriptors;
pub mod features;
pub mod pipeline;
pub mod workspace;

pub use cancel::CancelToken;
pub use descriptors::{DescriptorSource, DescriptorTable, PadelRunner};
pub use features::{FeatureAssembler, JoinReport};
pub use pipeline::{
    run_pipeline, Pipeline, PipelineOutcome, PipelineProgress, PipelineRequest, PipelineStage,
};
