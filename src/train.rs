use std::path::Path;

use crate::dataset::load_dataset;
use crate::features::{DetectorParams, FeatureExtractor};
use crate::svm::{LinearSvm, SvmParams};
use crate::vocab::Vocabulary;
use crate::{Desc, Error, Histogram, Result};

/// Artifact file names shared by the trainer and the inference service.
pub const VOCABULARY_FILE: &str = "vocabulary.bin";
pub const CLASSIFIER_FILE: &str = "classifier.bin";

/// Configuration for one training run.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Number of visual words in the codebook.
    pub k: usize,
    /// Seed for the clustering init and the classifier's epoch ordering.
    pub seed: u64,
    pub detector: DetectorParams,
    pub svm: SvmParams,
    /// Folder-name-to-label mapping under the dataset root.
    pub classes: Vec<(String, bool)>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            k: 60,
            seed: 42,
            detector: DetectorParams::default(),
            svm: SvmParams::default(),
            classes: vec![
                ("incident".to_string(), true),
                ("background".to_string(), false),
            ],
        }
    }
}

/// The artifact pair produced by one training run. The two halves are only
/// meaningful together: the classifier reads histograms of exactly the
/// vocabulary's word count.
pub struct TrainedModel {
    pub vocabulary: Vocabulary,
    pub classifier: LinearSvm,
}

impl TrainedModel {
    /// Persist both artifacts side by side under `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        self.vocabulary.save(dir.join(VOCABULARY_FILE))?;
        self.classifier.save(dir.join(CLASSIFIER_FILE))?;
        Ok(())
    }
}

/// Run the full offline training pipeline on a dataset directory.
///
/// Extracts descriptors per image, pools them across both classes, builds
/// the vocabulary, encodes every image against it, and fits the classifier.
/// Every training-data error is fatal and surfaced; nothing is written to
/// disk here.
pub fn train(root: &Path, config: &TrainingConfig) -> Result<TrainedModel> {
    let extractor = FeatureExtractor::new(config.detector);

    log::info!("loading dataset from {}", root.display());
    let images = load_dataset(root, &config.classes, &extractor)?;
    if images.is_empty() {
        return Err(Error::EmptyTrainingSet);
    }

    let pooled: Vec<Desc> = images
        .iter()
        .flat_map(|(descriptors, _)| descriptors.iter().copied())
        .collect();
    log::info!(
        "{} descriptors pooled from {} images",
        pooled.len(),
        images.len()
    );

    log::info!("clustering into {} visual words", config.k);
    let vocabulary = Vocabulary::build(&pooled, config.k, config.seed)?;

    let examples: Vec<(Histogram, bool)> = images
        .iter()
        .map(|(descriptors, label)| (vocabulary.histogram(descriptors), *label))
        .collect();

    log::info!("fitting classifier on {} histograms", examples.len());
    let classifier = LinearSvm::fit(&examples, config.svm, config.seed)?;

    Ok(TrainedModel {
        vocabulary,
        classifier,
    })
}
