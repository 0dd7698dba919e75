//! Offline evaluation over a labelled CSV
//!
//! Each row (`id,text[,expected_label]`) is run through the full pipeline or
//! through the classifier alone. Predictions are written to a results CSV and
//! aggregated into label counts, mean confidence, accuracy, and a confusion
//! matrix.

use anyhow::{Context, Result};
use policyguard_agents::{AnalysisPipeline, LlmCategoryClassifier};
use policyguard_core::{
    AnalysisResponse, Category, ClassificationResult, Label, PipelineRequest, ServiceResult,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::state::{build_classifier, build_pipeline};

/// Reasons kept per row in the results file
const MAX_REASONS: usize = 5;

/// Confidence reported for classifier-only predictions
const CLASSIFIER_ONLY_CONFIDENCE: f32 = 0.8;

/// Predicted label for a row whose classification failed
pub const ERROR_LABEL: &str = "error";

/// Categories routed to `flag` rather than `block` in classifier-only mode
const FLAG_CATEGORIES: [Category; 5] = [
    Category::Harassment,
    Category::Misinformation,
    Category::Politics,
    Category::Privacy,
    Category::Spam,
];

/// Which stages an evaluation exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Classify, retrieve, and adjudicate every row
    Pipeline,
    /// Map the classifier verdict straight to a label
    ClassifierOnly,
}

/// Evaluation run settings
#[derive(Debug, Clone)]
pub struct EvalOptions {
    pub samples: PathBuf,
    pub output: Option<PathBuf>,
    pub max_samples: Option<usize>,
    pub mode: EvalMode,
    /// Pause between rows, for rate-limited backends
    pub delay: Duration,
}

/// One input row
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EvalSample {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub expected_label: String,
}

/// One prediction, as written to the results file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalRow {
    pub id: String,
    pub text: String,
    pub expected_label: String,
    pub pred_label: String,
    pub confidence: f32,
    pub reasons: String,
}

impl EvalRow {
    fn new(sample: &EvalSample, pred_label: &str, confidence: f32, reasons: &[String]) -> Self {
        Self {
            id: sample.id.clone(),
            text: sample.text.clone(),
            expected_label: canonical_label(&sample.expected_label),
            pred_label: pred_label.to_string(),
            confidence,
            reasons: reasons
                .iter()
                .take(MAX_REASONS)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }

    /// Whether the row carries an expected label
    pub fn is_labelled(&self) -> bool {
        !self.expected_label.is_empty()
    }

    pub fn is_correct(&self) -> bool {
        self.is_labelled() && self.expected_label == self.pred_label
    }
}

/// Row for a full pipeline response
pub fn pipeline_row(sample: &EvalSample, response: &AnalysisResponse) -> EvalRow {
    let decision = &response.decision;
    EvalRow::new(
        sample,
        decision.label.as_str(),
        decision.confidence,
        &decision.reasons,
    )
}

/// Row for a classifier-only verdict.
///
/// Reviewed content in a moderate category becomes `flag`, the rest `block`;
/// content that needs no review is `allowed`.
pub fn classifier_row(sample: &EvalSample, result: ServiceResult<ClassificationResult>) -> EvalRow {
    match result {
        Ok(classification) => {
            let label = if !classification.needs_review {
                Label::Allowed
            } else if FLAG_CATEGORIES.contains(&classification.category) {
                Label::Flag
            } else {
                Label::Block
            };
            let reasons = vec![format!(
                "category={}: {}",
                classification.category, classification.explanation
            )];
            EvalRow::new(sample, label.as_str(), CLASSIFIER_ONLY_CONFIDENCE, &reasons)
        }
        Err(err) => EvalRow::new(sample, ERROR_LABEL, 0.0, &[err.to_string()]),
    }
}

/// Aggregated results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalSummary {
    pub samples: usize,
    pub labelled: usize,
    pub correct: usize,
    /// Predicted label -> rows
    pub label_counts: BTreeMap<String, usize>,
    /// Predicted label -> mean confidence
    pub mean_confidence: BTreeMap<String, f32>,
    /// Expected label -> share of its rows predicted correctly
    pub accuracy_by_label: BTreeMap<String, f64>,
    /// Expected label -> predicted label -> rows
    pub confusion: BTreeMap<String, BTreeMap<String, usize>>,
}

impl EvalSummary {
    /// Share of labelled rows predicted correctly
    pub fn accuracy(&self) -> Option<f64> {
        (self.labelled > 0).then(|| self.correct as f64 / self.labelled as f64)
    }
}

/// Aggregate evaluated rows
pub fn summarize(rows: &[EvalRow]) -> EvalSummary {
    let mut summary = EvalSummary {
        samples: rows.len(),
        ..EvalSummary::default()
    };
    let mut confidence_sums: BTreeMap<String, f32> = BTreeMap::new();
    let mut expected_counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();

    for row in rows {
        *summary.label_counts.entry(row.pred_label.clone()).or_default() += 1;
        *confidence_sums.entry(row.pred_label.clone()).or_default() += row.confidence;

        if !row.is_labelled() {
            continue;
        }
        summary.labelled += 1;

        let (seen, correct) = expected_counts.entry(row.expected_label.clone()).or_default();
        *seen += 1;
        if row.is_correct() {
            *correct += 1;
            summary.correct += 1;
        }

        *summary
            .confusion
            .entry(row.expected_label.clone())
            .or_default()
            .entry(row.pred_label.clone())
            .or_default() += 1;
    }

    summary.mean_confidence = confidence_sums
        .into_iter()
        .map(|(label, sum)| {
            let count = summary.label_counts[&label];
            (label, sum / count as f32)
        })
        .collect();
    summary.accuracy_by_label = expected_counts
        .into_iter()
        .map(|(label, (seen, correct))| (label, correct as f64 / seen as f64))
        .collect();

    summary
}

impl fmt::Display for EvalSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Samples: {} ({} labelled)", self.samples, self.labelled)?;
        match self.accuracy() {
            Some(accuracy) => writeln!(f, "Accuracy: {:.3}", accuracy)?,
            None => writeln!(f, "Accuracy: n/a (no expected labels)")?,
        }

        writeln!(f, "\nPredicted labels:")?;
        for (label, count) in &self.label_counts {
            let confidence = self.mean_confidence.get(label).copied().unwrap_or_default();
            writeln!(f, "  {:<10} {:>5}  mean confidence {:.3}", label, count, confidence)?;
        }

        if !self.accuracy_by_label.is_empty() {
            writeln!(f, "\nAccuracy by expected label:")?;
            for (label, accuracy) in &self.accuracy_by_label {
                writeln!(f, "  {:<10} {:.3}", label, accuracy)?;
            }
        }

        if !self.confusion.is_empty() {
            let predicted: BTreeSet<&String> =
                self.confusion.values().flat_map(|row| row.keys()).collect();

            writeln!(f, "\nConfusion (rows: expected, columns: predicted):")?;
            write!(f, "  {:<10}", "")?;
            for label in &predicted {
                write!(f, " {:>8}", label)?;
            }
            writeln!(f)?;
            for (expected, row) in &self.confusion {
                write!(f, "  {:<10}", expected)?;
                for label in &predicted {
                    write!(f, " {:>8}", row.get(*label).copied().unwrap_or(0))?;
                }
                writeln!(f)?;
            }
        }

        Ok(())
    }
}

/// Read samples, keeping at most `max_samples` rows
pub fn read_samples(path: &Path, max_samples: Option<usize>) -> Result<Vec<EvalSample>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening samples {}", path.display()))?;

    let mut samples = Vec::new();
    for (idx, record) in reader.deserialize::<EvalSample>().enumerate() {
        if max_samples.is_some_and(|max| samples.len() >= max) {
            info!("Evaluating the first {} samples", samples.len());
            break;
        }
        let sample =
            record.with_context(|| format!("{} row {}", path.display(), idx + 2))?;
        samples.push(sample);
    }

    Ok(samples)
}

/// Write per-row predictions
pub fn write_rows(path: &Path, rows: &[EvalRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating results {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Run every sample through the pipeline
pub async fn evaluate_pipeline(
    pipeline: &AnalysisPipeline,
    samples: &[EvalSample],
    delay: Duration,
) -> Vec<EvalRow> {
    let mut rows = Vec::with_capacity(samples.len());
    for (i, sample) in samples.iter().enumerate() {
        pause_between(i, delay).await;
        info!("Processing sample {}/{}: {}", i + 1, samples.len(), sample.id);

        let response = pipeline
            .analyze(&PipelineRequest::new(sample.id.clone(), sample.text.clone()))
            .await;
        rows.push(pipeline_row(sample, &response));
    }
    rows
}

/// Run every sample through the classifier alone
pub async fn evaluate_classifier(
    classifier: &LlmCategoryClassifier,
    samples: &[EvalSample],
    delay: Duration,
) -> Vec<EvalRow> {
    let mut rows = Vec::with_capacity(samples.len());
    for (i, sample) in samples.iter().enumerate() {
        pause_between(i, delay).await;
        info!("Classifying sample {}/{}: {}", i + 1, samples.len(), sample.id);

        let result = classifier.try_classify(&sample.text).await;
        if let Err(err) = &result {
            warn!(id = %sample.id, error = %err, "Classification failed");
        }
        rows.push(classifier_row(sample, result));
    }
    rows
}

/// Run an evaluation and write its results file
pub async fn run(config: &ServerConfig, options: &EvalOptions) -> Result<EvalSummary> {
    let samples = read_samples(&options.samples, options.max_samples)?;
    info!(
        samples = samples.len(),
        mode = ?options.mode,
        "Loaded evaluation samples from {}",
        options.samples.display()
    );

    let rows = match options.mode {
        EvalMode::Pipeline => {
            let pipeline = build_pipeline(config).await?;
            evaluate_pipeline(&pipeline, &samples, options.delay).await
        }
        EvalMode::ClassifierOnly => {
            let classifier = build_classifier(config)?;
            evaluate_classifier(&classifier, &samples, options.delay).await
        }
    };

    let output = options
        .output
        .clone()
        .unwrap_or_else(|| default_output(&options.samples));
    write_rows(&output, &rows)?;
    info!("Wrote {} results to {}", rows.len(), output.display());

    Ok(summarize(&rows))
}

async fn pause_between(index: usize, delay: Duration) {
    if index > 0 && !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Label in its canonical spelling; unknown values are kept lowercased
fn canonical_label(value: &str) -> String {
    match Label::parse(value) {
        Some(label) => label.as_str().to_string(),
        None => value.trim().to_ascii_lowercase(),
    }
}

/// Default results path next to the samples file
pub fn default_output(samples: &Path) -> PathBuf {
    let stem = samples
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "samples".to_string());
    samples.with_file_name(format!("{}_results.csv", stem))
}
