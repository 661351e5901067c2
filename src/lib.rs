use thiserror::Error;

/// Local-feature extraction: image bytes in, binary keypoint descriptors out.
pub mod features;
pub use features::{DetectorParams, FeatureExtractor};

/// Visual vocabulary (codebook) built by k-means clustering of descriptors,
/// and the histogram encoding against it.
pub mod vocab;
pub use vocab::Vocabulary;

/// Linear max-margin classifier with calibrated probability output.
pub mod svm;
pub use svm::{LinearSvm, SvmParams};

/// Labeled dataset loading from a class-per-folder directory layout.
pub mod dataset;

/// The offline training pipeline producing the artifact pair.
pub mod train;
pub use train::{train, TrainedModel, TrainingConfig};

/// Per-request inference over a loaded artifact pair.
pub mod service;
pub use service::{Classification, IncidentClassifier};

/// Descriptor dimension in bytes. Each byte is one clustering coordinate.
pub const DESC_DIM: usize = 32;

/// Supported descriptor type is a 256-bit binary array, stored as 32 bytes.
///
/// This is the layout produced by BRIEF-style extractors and is what the
/// built-in detector emits.
pub type Desc = [u8; DESC_DIM];

/// Bag-of-visual-words histogram of an image or descriptor set.
///
/// Index: visual word id in the vocabulary.
///
/// Value: number of descriptors assigned to that word.
pub type Histogram = Vec<f32>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Io Error")]
    Io(#[from] std::io::Error),
    #[error("Artifact Serialization Error")]
    Bincode(#[from] bincode::Error),
    #[error("{found} pooled descriptors cannot be clustered into {k} words")]
    InsufficientData { found: usize, k: usize },
    #[error("training set is empty")]
    EmptyTrainingSet,
    #[error("all training examples carry the same label")]
    SingleClass,
    #[error("classifier was fitted for {classifier} words but vocabulary holds {vocabulary}")]
    VocabularyMismatch { vocabulary: usize, classifier: usize },
}
