//! Per-stage counts and the human-readable run summary.
//!
//! Every stage of a run records what it kept and what it excluded here, so
//! silent exclusions (short or inactive sessions, empty labels, windows with
//! missing values) stay visible after the run.

use crate::config::Config;
use crate::core::segmentation::SegmentationReport;
use crate::core::trimming::TrimReport;
use crate::core::windowing::WindowReport;
use crate::export::ExportOutcome;
use crate::model::trainer::{TrainedModel, TrainingOutcome};
use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::path::Path;
use uuid::Uuid;

/// Everything worth reporting about one run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub host: String,
    pub config: Config,
    pub segmentation: Option<SegmentationReport>,
    pub trimming: Option<TrimReport>,
    pub windows: Option<WindowReport>,
    /// (vectors, features per vector)
    pub features: Option<(usize, usize)>,
    pub training: Option<TrainingOutcome>,
    pub export: Option<ExportOutcome>,
}

impl RunSummary {
    /// Start a summary for a new run.
    pub fn new(config: &Config) -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            host,
            config: config.clone(),
            segmentation: None,
            trimming: None,
            windows: None,
            features: None,
            training: None,
            export: None,
        }
    }

    /// Short digest of the settings that shape the model.
    pub fn config_digest(&self) -> String {
        let c = &self.config;
        let features: Vec<&str> = c.features.iter().map(|f| f.short_name()).collect();
        format!(
            "session={} min_samples={} min_activity={} cut={}% window={} features=[{}] \
             scaling={:?}/{:?} seed={} grid_search={}",
            c.segmentation.samples_per_session,
            c.segmentation.min_samples(),
            c.segmentation.min_activity,
            c.trimming.cut_percentile,
            c.windowing.window_len(),
            features.join(","),
            c.scaling.method,
            c.scaling.target,
            c.training.seed,
            c.training.grid_search
        )
    }

    /// Render the summary text.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "EMG Gesture Training Summary");
        let _ = writeln!(out, "============================");
        let _ = writeln!(out, "Run id:    {}", self.run_id);
        let _ = writeln!(out, "Started:   {}", self.started_at.to_rfc3339());
        let _ = writeln!(out, "Finished:  {}", Utc::now().to_rfc3339());
        let _ = writeln!(out, "Host:      {}", self.host);
        let _ = writeln!(out, "Version:   {}", crate::VERSION);
        let _ = writeln!(out, "Config:    {}", self.config_digest());

        if let Some(seg) = &self.segmentation {
            let _ = writeln!(out, "\nSegmentation");
            for (label, counts) in &seg.labels {
                let _ = writeln!(
                    out,
                    "- {label}: {} rows, {} chunks, {} retained, {} too short, {} inactive",
                    counts.rows,
                    counts.chunks,
                    counts.retained,
                    counts.rejected_short,
                    counts.rejected_inactive
                );
            }
            let _ = writeln!(
                out,
                "- total: {} sessions, {} rows",
                seg.total_sessions(),
                seg.total_rows()
            );
        }

        if let Some(trim) = &self.trimming {
            let _ = writeln!(out, "\nTrimming");
            let _ = writeln!(
                out,
                "- {} of {} sessions kept, {} of {} rows kept",
                trim.sessions_kept, trim.sessions_in, trim.rows_kept, trim.rows_in
            );
        }

        if let Some(windows) = &self.windows {
            let _ = writeln!(out, "\nWindowing ({} samples per window)", windows.window_len);
            for (label, counts) in &windows.labels {
                let _ = writeln!(
                    out,
                    "- {label}: {} rows, {} windows, {} tail rows dropped, {} skipped for missing values",
                    counts.rows, counts.windows, counts.dropped_tail_rows, counts.skipped_missing
                );
            }
            let empty = windows.empty_labels();
            if !empty.is_empty() {
                let _ = writeln!(out, "- no usable window: {}", empty.join(", "));
            }
        }

        if let Some((vectors, width)) = self.features {
            let _ = writeln!(out, "\nFeatures");
            let _ = writeln!(out, "- {vectors} vectors of {width} features");
            let _ = writeln!(
                out,
                "- scaler: {:?} fitted on {:?}",
                self.config.scaling.method, self.config.scaling.target
            );
        }

        if let Some(training) = &self.training {
            let _ = writeln!(out, "\nTraining");
            let _ = writeln!(
                out,
                "- classes: {}",
                training.labels.classes().join(", ")
            );
            let _ = writeln!(
                out,
                "- split: {} train / {} test",
                training.train.len(),
                training.test.len()
            );
            if let Some(search) = &training.search {
                let _ = writeln!(
                    out,
                    "- grid search: {} cells x {} folds, best mean F1 {:.4}",
                    search.cells.len(),
                    search.folds,
                    search.best.mean_f1
                );
            }
            write_model(&mut out, &training.primary);
            write_model(&mut out, &training.fallback);
        }

        if let Some(export) = &self.export {
            let _ = writeln!(out, "\nExport");
            let _ = writeln!(
                out,
                "- wrote {} graph {} to {}",
                export.model_name,
                export.architecture,
                export.path.display()
            );
            let _ = writeln!(out, "- operators: {}", export.graph.op_types.join(", "));
            let _ = writeln!(
                out,
                "- round trip: predicted {} with probabilities {:?}",
                export.graph.predicted, export.graph.probabilities
            );
            for (name, reason) in &export.rejected {
                let _ = writeln!(out, "- {name} graph rejected: {reason}");
            }
        }

        out
    }

    /// Write the summary text to a file.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_text())
    }
}

fn write_model(out: &mut String, model: &TrainedModel) {
    let _ = writeln!(out, "\nModel: {} ({})", model.name, model.network.architecture());
    if let Some(params) = &model.params {
        let _ = writeln!(out, "- hyperparameters: {params}");
    }
    let _ = writeln!(
        out,
        "- {} epochs, final loss {:.5}{}",
        model.fit.epochs,
        model.fit.final_loss,
        if model.fit.converged { " (converged)" } else { "" }
    );
    let _ = writeln!(
        out,
        "- weighted F1: train {:.4}, test {:.4}",
        model.train_report.weighted_f1, model.test_report.weighted_f1
    );
    let _ = writeln!(out, "\nTrain report:\n{}", model.train_report.to_text());
    let _ = writeln!(out, "Test report:\n{}", model.test_report.to_text());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::segmentation::LabelSegmentation;

    #[test]
    fn test_empty_summary_has_header() {
        let summary = RunSummary::new(&Config::default());
        let text = summary.to_text();
        assert!(text.contains(&summary.run_id.to_string()));
        assert!(text.contains("window=17"));
        assert!(!text.contains("Segmentation"));
    }

    #[test]
    fn test_summary_lists_stage_counts() {
        let mut summary = RunSummary::new(&Config::default());
        let mut seg = SegmentationReport::default();
        seg.labels.insert(
            "Fist".to_string(),
            LabelSegmentation {
                rows: 2000,
                chunks: 2,
                retained: 2,
                rejected_short: 0,
                rejected_inactive: 0,
            },
        );
        summary.segmentation = Some(seg);
        summary.trimming = Some(TrimReport {
            sessions_in: 2,
            sessions_kept: 2,
            rows_in: 2000,
            rows_kept: 1600,
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training_summary.txt");
        summary.save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("- Fist: 2000 rows, 2 chunks, 2 retained"));
        assert!(text.contains("1600 of 2000 rows kept"));
    }
}
