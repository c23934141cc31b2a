//! A ready-made CI pipeline: environment check, install, tests, security
//! scan, image build and push, and dist archiving.

mod config;
mod pipeline;

pub use config::{CiConfig, BUILD_NUMBER_VAR, IMAGE_NAME_VAR, IMAGE_TAG_VAR, REGISTRY_VAR};
pub use pipeline::{build_ci_pipeline, ci_pipeline_builder, CiCollaborators, CI_STAGES};
