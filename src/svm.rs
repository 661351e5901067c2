use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Histogram, Result};

/// Classifier hyperparameters. The defaults match the training job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvmParams {
    /// Soft-margin penalty.
    pub c: f32,
    /// Stop once the largest projected-gradient violation in an epoch falls
    /// below this.
    pub tolerance: f32,
    /// Upper bound on passes over the training set.
    pub max_epochs: usize,
}

impl Default for SvmParams {
    fn default() -> Self {
        SvmParams {
            c: 1.0,
            tolerance: 1e-4,
            max_epochs: 1000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
/// Linear max-margin classifier over histogram space, with a Platt sigmoid
/// mapping raw margins to a probability of the positive class.
///
/// Immutable once fitted; holds no reference to the training data.
pub struct LinearSvm {
    weights: Vec<f32>,
    bias: f32,
    platt_a: f32,
    platt_b: f32,
}

impl LinearSvm {
    /// Fit on (histogram, label) pairs by dual coordinate descent on the
    /// L2-regularized hinge loss, then calibrate the sigmoid on the
    /// training margins.
    ///
    /// The per-epoch example order is shuffled with `seed`, so the fitted
    /// model is reproducible for a fixed seed and input ordering.
    pub fn fit(examples: &[(Histogram, bool)], params: SvmParams, seed: u64) -> Result<Self> {
        if examples.is_empty() {
            return Err(Error::EmptyTrainingSet);
        }
        let positives = examples.iter().filter(|(_, label)| *label).count();
        if positives == 0 || positives == examples.len() {
            return Err(Error::SingleClass);
        }
        let dim = examples[0].0.len();
        for (hist, _) in examples {
            if hist.len() != dim {
                return Err(Error::VocabularyMismatch {
                    vocabulary: hist.len(),
                    classifier: dim,
                });
            }
        }

        let n = examples.len();
        let y: Vec<f32> = examples
            .iter()
            .map(|(_, label)| if *label { 1.0 } else { -1.0 })
            .collect();
        // Gram diagonal, with the constant bias feature folded in.
        let q: Vec<f32> = examples
            .iter()
            .map(|(hist, _)| 1.0 + hist.iter().map(|v| v * v).sum::<f32>())
            .collect();

        let mut weights = vec![0f32; dim];
        let mut bias = 0f32;
        let mut alpha = vec![0f32; n];
        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(seed);

        for epoch in 0..params.max_epochs {
            order.shuffle(&mut rng);
            let mut worst = 0f32;
            for &i in &order {
                let hist = &examples[i].0;
                let gradient = y[i] * (dot(&weights, hist) + bias) - 1.0;
                let projected = if alpha[i] <= 0.0 {
                    gradient.min(0.0)
                } else if alpha[i] >= params.c {
                    gradient.max(0.0)
                } else {
                    gradient
                };
                worst = worst.max(projected.abs());
                if projected == 0.0 {
                    continue;
                }

                let old = alpha[i];
                alpha[i] = (old - gradient / q[i]).max(0.0).min(params.c);
                let step = (alpha[i] - old) * y[i];
                if step != 0.0 {
                    for (w, &h) in weights.iter_mut().zip(hist.iter()) {
                        *w += step * h;
                    }
                    bias += step;
                }
            }
            if worst < params.tolerance {
                log::debug!("dual coordinate descent converged after {} epochs", epoch);
                break;
            }
        }

        let margins: Vec<f64> = examples
            .iter()
            .map(|(hist, _)| (dot(&weights, hist) + bias) as f64)
            .collect();
        let (platt_a, platt_b) = fit_sigmoid(&margins, &y);

        Ok(LinearSvm {
            weights,
            bias,
            platt_a,
            platt_b,
        })
    }

    /// Raw margin for a histogram. A histogram of the wrong length is a
    /// typed error, never a silently truncated dot product.
    pub fn decision(&self, hist: &Histogram) -> Result<f32> {
        if hist.len() != self.weights.len() {
            return Err(Error::VocabularyMismatch {
                vocabulary: hist.len(),
                classifier: self.weights.len(),
            });
        }
        Ok(dot(&self.weights, hist) + self.bias)
    }

    /// Predicted label (margin sign) and calibrated probability of the
    /// positive class.
    pub fn predict(&self, hist: &Histogram) -> Result<(bool, f32)> {
        let margin = self.decision(hist)?;
        Ok((margin > 0.0, self.probability(margin)))
    }

    /// Calibrated P(positive | margin) through the fitted sigmoid.
    fn probability(&self, margin: f32) -> f32 {
        let f = (self.platt_a * margin + self.platt_b) as f64;
        let p = if f >= 0.0 {
            (-f).exp() / (1.0 + (-f).exp())
        } else {
            1.0 / (1.0 + f.exp())
        };
        p as f32
    }

    /// Histogram length the model was fitted for. Must equal the vocabulary
    /// size of the matching codebook artifact.
    pub fn n_features(&self) -> usize {
        self.weights.len()
    }

    /// Load a fitted classifier from a file.
    pub fn load<P: AsRef<Path>>(file: P) -> Result<Self> {
        let mut file = std::fs::File::open(file)?;
        let mut buffer: Vec<u8> = Vec::new();
        std::io::Read::read_to_end(&mut file, &mut buffer)?;
        Ok(bincode::deserialize(&buffer)?)
    }

    /// Save the fitted classifier to a file.
    pub fn save<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let serialized = bincode::serialize(&self)?;
        let mut file = std::fs::File::create(file)?;
        std::io::Write::write_all(&mut file, &serialized)?;
        Ok(())
    }
}

#[inline]
fn dot(weights: &[f32], hist: &[f32]) -> f32 {
    weights.iter().zip(hist.iter()).map(|(&w, &h)| w * h).sum()
}

/// Platt scaling: fit A, B of P(y=1 | f) = 1 / (1 + exp(A f + B)) on the
/// training margins by Newton's method with backtracking line search.
/// Deterministic; targets are the usual prior-corrected values.
fn fit_sigmoid(margins: &[f64], y: &[f32]) -> (f32, f32) {
    const MAX_ITER: usize = 100;
    const MIN_STEP: f64 = 1e-10;
    const SIGMA: f64 = 1e-12;
    const EPS: f64 = 1e-5;

    let prior1 = y.iter().filter(|&&v| v > 0.0).count() as f64;
    let prior0 = y.len() as f64 - prior1;
    let hi_target = (prior1 + 1.0) / (prior1 + 2.0);
    let lo_target = 1.0 / (prior0 + 2.0);
    let targets: Vec<f64> = y
        .iter()
        .map(|&v| if v > 0.0 { hi_target } else { lo_target })
        .collect();

    let objective = |a: f64, b: f64| -> f64 {
        margins
            .iter()
            .zip(targets.iter())
            .map(|(&f, &t)| {
                let fapb = f * a + b;
                if fapb >= 0.0 {
                    t * fapb + (1.0 + (-fapb).exp()).ln()
                } else {
                    (t - 1.0) * fapb + (1.0 + fapb.exp()).ln()
                }
            })
            .sum()
    };

    let mut a = 0.0;
    let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
    let mut fval = objective(a, b);

    for _ in 0..MAX_ITER {
        let mut h11 = SIGMA;
        let mut h22 = SIGMA;
        let mut h21 = 0.0;
        let mut g1 = 0.0;
        let mut g2 = 0.0;
        for (&f, &t) in margins.iter().zip(targets.iter()) {
            let fapb = f * a + b;
            let (p, q) = if fapb >= 0.0 {
                let e = (-fapb).exp();
                (e / (1.0 + e), 1.0 / (1.0 + e))
            } else {
                let e = fapb.exp();
                (1.0 / (1.0 + e), e / (1.0 + e))
            };
            let d2 = p * q;
            h11 += f * f * d2;
            h22 += d2;
            h21 += f * d2;
            let d1 = t - p;
            g1 += f * d1;
            g2 += d1;
        }
        if g1.abs() < EPS && g2.abs() < EPS {
            break;
        }

        let det = h11 * h22 - h21 * h21;
        let da = -(h22 * g1 - h21 * g2) / det;
        let db = -(-h21 * g1 + h11 * g2) / det;
        let descent = g1 * da + g2 * db;

        let mut step = 1.0;
        while step >= MIN_STEP {
            let new_a = a + step * da;
            let new_b = b + step * db;
            let new_fval = objective(new_a, new_b);
            if new_fval < fval + 1e-4 * step * descent {
                a = new_a;
                b = new_b;
                fval = new_fval;
                break;
            }
            step /= 2.0;
        }
        if step < MIN_STEP {
            log::debug!("sigmoid line search stalled, keeping current fit");
            break;
        }
    }

    (a as f32, b as f32)
}
