use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::{Desc, Error, Histogram, Result, DESC_DIM};

/// Lloyd iteration cap; assignment normally stabilizes long before this.
const MAX_ITERATIONS: usize = 100;

#[derive(Serialize, Deserialize, PartialEq, Clone)]
/// Visual vocabulary (codebook) built from a pool of image keypoint
/// descriptors. Can be:
/// 1. Created by k-means clustering of the pooled training descriptors.
/// 2. Saved to a file & loaded from a file.
/// 3. Used to encode a new descriptor set into a fixed-length histogram.
///
/// Immutable once built. A histogram is only meaningful against the
/// vocabulary whose clustering produced it.
pub struct Vocabulary {
    centroids: Vec<[f32; DESC_DIM]>,
}

/// Vocabulary API
impl Vocabulary {
    /// Cluster pooled descriptors into `k` visual words.
    ///
    /// Runs Lloyd's algorithm with squared-Euclidean distance over the
    /// descriptor bytes. Initialization samples `k` distinct descriptors
    /// with the given seed, so the result is reproducible for a fixed seed
    /// and input ordering.
    pub fn build(descriptors: &[Desc], k: usize, seed: u64) -> Result<Self> {
        if k == 0 || descriptors.len() < k {
            return Err(Error::InsufficientData {
                found: descriptors.len(),
                k,
            });
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut centroids: Vec<[f32; DESC_DIM]> = descriptors
            .choose_multiple(&mut rng, k)
            .map(|d| to_coords(d))
            .collect();

        let mut assignment = vec![usize::MAX; descriptors.len()];
        for iteration in 0..MAX_ITERATIONS {
            let mut changed = false;
            for (i, d) in descriptors.iter().enumerate() {
                let word = nearest(&centroids, d);
                if assignment[i] != word {
                    assignment[i] = word;
                    changed = true;
                }
            }
            if !changed {
                log::debug!("k-means assignment stable after {} iterations", iteration);
                break;
            }

            // Recompute means. A cluster that lost every member keeps its
            // previous centroid.
            let mut sums = vec![[0f64; DESC_DIM]; k];
            let mut counts = vec![0usize; k];
            for (i, d) in descriptors.iter().enumerate() {
                let word = assignment[i];
                counts[word] += 1;
                for (s, &b) in sums[word].iter_mut().zip(d.iter()) {
                    *s += b as f64;
                }
            }
            for (word, centroid) in centroids.iter_mut().enumerate() {
                if counts[word] == 0 {
                    continue;
                }
                for (c, s) in centroid.iter_mut().zip(sums[word].iter()) {
                    *c = (s / counts[word] as f64) as f32;
                }
            }
        }

        Ok(Vocabulary { centroids })
    }

    /// Encode a descriptor set into its bag-of-words histogram with respect
    /// to the vocabulary.
    ///
    /// The histogram always has length `self.len()`; an empty descriptor set
    /// maps to the all-zero vector. Each descriptor increments the count of
    /// its nearest word, ties going to the lowest word index.
    pub fn histogram(&self, descriptors: &[Desc]) -> Histogram {
        let mut hist: Histogram = vec![0.0; self.centroids.len()];
        for d in descriptors {
            hist[nearest(&self.centroids, d)] += 1.0;
        }
        hist
    }

    /// Number of visual words (K).
    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    /// Load a vocabulary from a file.
    pub fn load<P: AsRef<Path>>(file: P) -> Result<Self> {
        let mut file = std::fs::File::open(file)?;
        let mut buffer: Vec<u8> = Vec::new();
        std::io::Read::read_to_end(&mut file, &mut buffer)?;
        Ok(bincode::deserialize(&buffer)?)
    }

    /// Save the vocabulary to a file.
    pub fn save<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let serialized = bincode::serialize(&self)?;
        let mut file = std::fs::File::create(file)?;
        std::io::Write::write_all(&mut file, &serialized)?;
        Ok(())
    }
}

/////////////////////                Helpers                 ////////////////////////
/////////////////////////////////////////////////////////////////////////////////////

/// Index of the nearest centroid by squared Euclidean distance. The strict
/// comparison keeps the lowest index on ties.
fn nearest(centroids: &[[f32; DESC_DIM]], desc: &Desc) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = sq_dist(c, desc);
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

#[inline]
fn sq_dist(centroid: &[f32; DESC_DIM], desc: &Desc) -> f32 {
    centroid
        .iter()
        .zip(desc.iter())
        .map(|(&c, &b)| {
            let d = c - b as f32;
            d * d
        })
        .sum()
}

#[inline]
fn to_coords(desc: &Desc) -> [f32; DESC_DIM] {
    let mut out = [0f32; DESC_DIM];
    for (o, &b) in out.iter_mut().zip(desc.iter()) {
        *o = b as f32;
    }
    out
}

impl fmt::Debug for Vocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vocabulary")
            .field("Words", &self.centroids.len())
            .field("Dimension", &DESC_DIM)
            .finish()
    }
}
