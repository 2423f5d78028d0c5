//! Nearest-template sequence model built from recorded samples.
//!
//! Reads the collector's JSON sample format and scores a window by its
//! distance to the per-label mean sequence.  A stand-in for the trained
//! model so the pipeline can run end to end without one.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use super::classifier::{ModelError, SequenceModel};
use super::features::FeatureVector;

/// One recorded gesture sample, as written by the collection tooling.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordedSample {
    pub label: String,
    /// Frames × features (63 for one hand, 126 for two).
    pub landmarks: Vec<Vec<f32>>,
    #[serde(default)]
    pub signer: Option<String>,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// Read a JSON array of samples.
pub fn load_samples(path: &Path) -> Result<Vec<RecordedSample>, ModelError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| ModelError::Load(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| ModelError::Load(format!("{}: {}", path.display(), e)))
}

/// Pad a one-hand row to the frame width, or truncate a wider one.
fn fit_row(row: &[f32], width: usize) -> Vec<f32> {
    let mut out = row.to_vec();
    out.resize(width, 0.0);
    out
}

/// Resample a sequence to exactly `len` frames: repeat the last frame when
/// short, pick evenly spaced frames when long.
fn resample(frames: &[Vec<f32>], len: usize) -> Vec<Vec<f32>> {
    if frames.is_empty() || len == 0 {
        return Vec::new();
    }
    if frames.len() <= len {
        let mut out = frames.to_vec();
        let last = frames[frames.len() - 1].clone();
        out.resize(len, last);
        return out;
    }
    let step = (frames.len() - 1) as f64 / (len - 1).max(1) as f64;
    (0..len)
        .map(|i| frames[((i as f64) * step).round() as usize].clone())
        .collect()
}

/// Per-label mean sequences.
pub struct TemplateModel {
    /// One centroid per vocabulary entry; `None` when no sample exists.
    centroids: Vec<Option<Vec<f32>>>,
    sequence_length: usize,
    width: usize,
    /// Softmax temperature over negative RMS distance.
    pub temperature: f32,
}

impl TemplateModel {
    /// Build centroids for `labels` (in vocabulary order).
    pub fn from_samples(
        samples: &[RecordedSample],
        labels: &[String],
        sequence_length: usize,
        width: usize,
    ) -> Result<Self, ModelError> {
        let mut centroids = Vec::with_capacity(labels.len());
        for label in labels {
            let mut sum = vec![0.0f32; sequence_length * width];
            let mut count = 0usize;
            for sample in samples.iter().filter(|s| &s.label == label) {
                if sample.landmarks.is_empty() {
                    continue;
                }
                let rows: Vec<Vec<f32>> = sample
                    .landmarks
                    .iter()
                    .map(|r| fit_row(r, width))
                    .collect();
                for (i, v) in resample(&rows, sequence_length).iter().flatten().enumerate() {
                    sum[i] += v;
                }
                count += 1;
            }
            if count == 0 {
                debug!("No samples for label {}", label);
                centroids.push(None);
            } else {
                sum.iter_mut().for_each(|v| *v /= count as f32);
                centroids.push(Some(sum));
            }
        }

        let usable = centroids.iter().filter(|c| c.is_some()).count();
        if usable == 0 {
            return Err(ModelError::Load("no samples match the vocabulary".into()));
        }
        info!(
            "Template model built: {}/{} labels from {} samples",
            usable,
            labels.len(),
            samples.len()
        );
        Ok(Self {
            centroids,
            sequence_length,
            width,
            temperature: 0.05,
        })
    }
}

impl SequenceModel for TemplateModel {
    fn output_len(&self) -> usize {
        self.centroids.len()
    }

    fn predict(&mut self, window: &[FeatureVector]) -> Result<Vec<f32>, ModelError> {
        if window.len() != self.sequence_length {
            return Err(ModelError::InvalidInput {
                expected: self.sequence_length,
                got: window.len(),
            });
        }
        let flat: Vec<f32> = window
            .iter()
            .flat_map(|f| fit_row(f.as_slice(), self.width))
            .collect();

        let logits: Vec<Option<f32>> = self
            .centroids
            .iter()
            .map(|c| {
                c.as_ref().map(|c| {
                    let mse = c
                        .iter()
                        .zip(&flat)
                        .map(|(a, b)| (a - b) * (a - b))
                        .sum::<f32>()
                        / c.len().max(1) as f32;
                    -mse.sqrt() / self.temperature.max(1e-6)
                })
            })
            .collect();

        let max = logits
            .iter()
            .flatten()
            .fold(f32::NEG_INFINITY, |m, v| m.max(*v));
        let exps: Vec<f32> = logits
            .iter()
            .map(|l| l.map(|v| (v - max).exp()).unwrap_or(0.0))
            .collect();
        let total: f32 = exps.iter().sum();
        if !(total > 0.0) {
            return Err(ModelError::Inference("degenerate scores".into()));
        }
        Ok(exps.into_iter().map(|e| e / total).collect())
    }
}
