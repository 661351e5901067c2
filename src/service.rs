use std::path::Path;

use crate::features::{DetectorParams, FeatureExtractor};
use crate::svm::LinearSvm;
use crate::train::{CLASSIFIER_FILE, VOCABULARY_FILE};
use crate::vocab::Vocabulary;
use crate::{Error, Result};

/// Advisory triage signal returned for every submitted image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// 1 when the photo is judged to show a relevant incident, else 0.
    pub label: u8,
    /// Calibrated probability of the positive class, in [0, 1].
    pub confidence: f32,
}

impl Classification {
    /// Neutral result returned when an image cannot be judged at all.
    pub const NEUTRAL: Classification = Classification {
        label: 0,
        confidence: 0.0,
    };
}

/// Per-request classifier over an artifact pair loaded once at startup.
///
/// The loaded state is immutable and `classify` borrows it read-only, so a
/// single instance can serve any number of threads without locking.
pub struct IncidentClassifier {
    extractor: FeatureExtractor,
    vocabulary: Vocabulary,
    classifier: LinearSvm,
}

impl IncidentClassifier {
    /// Assemble a classifier from already-loaded parts, checking that the
    /// two artifacts agree on the vocabulary size. A mismatched pair is
    /// refused here rather than misclassifying for the rest of the process.
    pub fn new(
        params: DetectorParams,
        vocabulary: Vocabulary,
        classifier: LinearSvm,
    ) -> Result<Self> {
        if classifier.n_features() != vocabulary.len() {
            return Err(Error::VocabularyMismatch {
                vocabulary: vocabulary.len(),
                classifier: classifier.n_features(),
            });
        }
        Ok(IncidentClassifier {
            extractor: FeatureExtractor::new(params),
            vocabulary,
            classifier,
        })
    }

    /// Load the artifact pair produced by one training run.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(vocabulary: P, classifier: Q) -> Result<Self> {
        let vocabulary = Vocabulary::load(vocabulary)?;
        let classifier = LinearSvm::load(classifier)?;
        Self::new(DetectorParams::default(), vocabulary, classifier)
    }

    /// Load both artifacts from a training output directory, using the file
    /// names the trainer writes.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        Self::load(dir.join(VOCABULARY_FILE), dir.join(CLASSIFIER_FILE))
    }

    /// Classify one submitted image.
    ///
    /// This call never fails. Unparseable bytes and feature-free images
    /// resolve to [`Classification::NEUTRAL`] through the zero-histogram
    /// path, and any unexpected prediction error is absorbed here; the
    /// caller always receives a label in {0, 1} and a confidence in [0, 1].
    pub fn classify(&self, image_bytes: &[u8]) -> Classification {
        let descriptors = self.extractor.extract(image_bytes);
        let histogram = self.vocabulary.histogram(&descriptors);
        if histogram.iter().all(|&count| count == 0.0) {
            return Classification::NEUTRAL;
        }

        match self.classifier.predict(&histogram) {
            Ok((positive, confidence)) if confidence.is_finite() => Classification {
                label: positive as u8,
                confidence: confidence.max(0.0).min(1.0),
            },
            Ok(_) | Err(_) => Classification::NEUTRAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svm::SvmParams;
    use crate::{Histogram, DESC_DIM};

    fn fitted_parts() -> (Vocabulary, LinearSvm) {
        let mut pool = Vec::new();
        for i in 0..10u8 {
            pool.push([10 + i; DESC_DIM]);
            pool.push([200 + (i % 4); DESC_DIM]);
        }
        let vocabulary = Vocabulary::build(&pool, 2, 42).unwrap();
        let examples: Vec<(Histogram, bool)> = pool
            .iter()
            .map(|d| {
                let positive = d[0] < 100;
                (vocabulary.histogram(&[*d]), positive)
            })
            .collect();
        let classifier = LinearSvm::fit(&examples, SvmParams::default(), 42).unwrap();
        (vocabulary, classifier)
    }

    #[test]
    fn mismatched_pair_is_refused() {
        let (vocabulary, _) = fitted_parts();
        let examples: Vec<(Histogram, bool)> =
            vec![(vec![1.0, 0.0, 2.0], true), (vec![0.0, 3.0, 1.0], false)];
        let wrong_k = LinearSvm::fit(&examples, SvmParams::default(), 42).unwrap();

        match IncidentClassifier::new(DetectorParams::default(), vocabulary, wrong_k) {
            Err(Error::VocabularyMismatch {
                vocabulary: v,
                classifier: c,
            }) => {
                assert_eq!(v, 2);
                assert_eq!(c, 3);
            }
            _ => panic!("expected VocabularyMismatch"),
        }
    }

    #[test]
    fn corrupt_bytes_degrade_to_neutral() {
        let (vocabulary, classifier) = fitted_parts();
        let service =
            IncidentClassifier::new(DetectorParams::default(), vocabulary, classifier).unwrap();

        let result = service.classify(b"not-an-image");
        assert_eq!(result, Classification::NEUTRAL);
    }

    #[test]
    fn result_is_always_well_formed() {
        let (vocabulary, classifier) = fitted_parts();
        let service =
            IncidentClassifier::new(DetectorParams::default(), vocabulary, classifier).unwrap();

        for bytes in [&b""[..], &b"\x89PNG\r\n"[..], &[0u8; 64][..]] {
            let result = service.classify(bytes);
            assert!(result.label <= 1);
            assert!((0.0..=1.0).contains(&result.confidence));
        }
    }

    #[test]
    fn classify_is_idempotent() {
        let (vocabulary, classifier) = fitted_parts();
        let service =
            IncidentClassifier::new(DetectorParams::default(), vocabulary, classifier).unwrap();

        let bytes = b"\xffnot really an image\x00";
        assert_eq!(service.classify(bytes), service.classify(bytes));
    }

    #[test]
    fn service_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<IncidentClassifier>();
    }
}
