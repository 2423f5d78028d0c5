//! Recognition pipeline: feature encoding, the sequence window, the
//! classifier adapter, and geometric pose detection.
//!
//! The sequence model and the pose detector are independent sources; both
//! feed candidate events into the session.

pub mod classifier;
pub mod features;
pub mod pose;
pub mod sequence;
pub mod template;

pub use classifier::{
    Advisory, AdvisoryKind, ClassifierAdapter, ClassifyRequest, GestureResult, GestureSource,
    ModelError, ModelStatus, RecognitionConfig, SequenceModel,
};
pub use features::{FeatureLayout, FeatureVector, FEATURES_PER_HAND};
pub use pose::{HandPose, PoseConfig, PoseDetector};
pub use sequence::SequenceWindow;
pub use template::{load_samples, RecordedSample, TemplateModel};
