//! Feedback log: on-disk JSON collection and aggregate analysis of debate
//! feedback, plus export of the accumulated data as a training artifact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const KEYWORDS: [&str; 6] = ["fact", "evidence", "logic", "tone", "argument", "rebuttal"];

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("feedback store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("feedback store parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One piece of feedback as submitted by a caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSubmission {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub round: Option<u32>,
    pub motion: Option<String>,
    /// 1-5 scale.
    pub rating: Option<f64>,
    pub comment: Option<String>,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredFeedback {
    timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    kind: Option<String>,
    round: Option<u32>,
    motion: Option<String>,
    rating: Option<f64>,
    comment: Option<String>,
    suggestion: Option<String>,
}

/// Aggregate view over the collected feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackAnalysis {
    pub average_rating: f64,
    pub common_issues: BTreeMap<String, u32>,
    pub improvement_areas: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrainingData {
    debates: Vec<serde_json::Value>,
    feedback: Vec<StoredFeedback>,
    improvements: Vec<FeedbackAnalysis>,
}

/// JSON-file backed feedback store. A mutex serializes the
/// read-modify-write cycle; the file is rewritten whole on every change.
#[derive(Debug)]
pub struct FeedbackLog {
    data_path: PathBuf,
    export_dir: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FeedbackLog {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            data_path: data_dir.join("training_data.json"),
            export_dir: data_dir.to_path_buf(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Append a feedback entry, stamped with the current time.
    pub async fn collect(&self, submission: FeedbackSubmission) -> Result<(), FeedbackError> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await?;
        data.feedback.push(StoredFeedback {
            timestamp: Utc::now(),
            kind: submission.kind,
            round: submission.round,
            motion: submission.motion,
            rating: submission.rating,
            comment: submission.comment,
            suggestion: submission.suggestion,
        });
        self.save(&data).await
    }

    /// Compute aggregate statistics over the collected feedback and record
    /// the analysis alongside the data.
    pub async fn analyze(&self) -> Result<FeedbackAnalysis, FeedbackError> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await?;

        let ratings: Vec<f64> = data.feedback.iter().filter_map(|f| f.rating).collect();
        let average_rating = if ratings.is_empty() {
            0.0
        } else {
            ratings.iter().sum::<f64>() / ratings.len() as f64
        };

        let common_issues = identify_common_issues(&data.feedback);
        let improvement_areas = suggest_improvements(&common_issues);

        let analysis = FeedbackAnalysis {
            average_rating,
            common_issues,
            improvement_areas,
            timestamp: Utc::now(),
        };
        data.improvements.push(analysis.clone());
        self.save(&data).await?;
        Ok(analysis)
    }

    /// Write the accumulated data to a timestamped export file and return
    /// its path.
    pub async fn export(&self) -> Result<String, FeedbackError> {
        let _guard = self.lock.lock().await;
        let data = self.load().await?;
        tokio::fs::create_dir_all(&self.export_dir).await?;
        let path = self.export_dir.join(format!(
            "training-export-{}.json",
            Utc::now().format("%Y%m%d%H%M%S")
        ));
        tokio::fs::write(&path, serde_json::to_vec_pretty(&data)?).await?;
        Ok(path.display().to_string())
    }

    async fn load(&self) -> Result<TrainingData, FeedbackError> {
        match tokio::fs::read_to_string(&self.data_path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TrainingData::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, data: &TrainingData) -> Result<(), FeedbackError> {
        if let Some(parent) = self.data_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.data_path, serde_json::to_vec_pretty(data)?).await?;
        Ok(())
    }
}

/// Keyword frequency across comments.
fn identify_common_issues(feedback: &[StoredFeedback]) -> BTreeMap<String, u32> {
    let mut issues = BTreeMap::new();
    for entry in feedback {
        let Some(comment) = &entry.comment else {
            continue;
        };
        let lowered = comment.to_lowercase();
        for keyword in KEYWORDS {
            if lowered.contains(keyword) {
                *issues.entry(keyword.to_string()).or_insert(0) += 1;
            }
        }
    }
    issues
}

fn suggest_improvements(issues: &BTreeMap<String, u32>) -> Vec<String> {
    let count = |key: &str| issues.get(key).copied().unwrap_or(0);
    let mut suggestions = Vec::new();
    if count("fact") > count("evidence") {
        suggestions.push("Improve factual accuracy and source citations".to_string());
    }
    if count("logic") > 2 {
        suggestions.push("Strengthen logical reasoning and argument structure".to_string());
    }
    if count("tone") > 1 {
        suggestions.push("Better adapt to different debate tones".to_string());
    }
    if count("rebuttal") > 1 {
        suggestions.push("Improve counter-argument effectiveness".to_string());
    }
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(rating: f64, comment: &str) -> FeedbackSubmission {
        FeedbackSubmission {
            kind: Some("rating".to_string()),
            round: Some(1),
            motion: Some("Schools should ban homework".to_string()),
            rating: Some(rating),
            comment: Some(comment.to_string()),
            suggestion: None,
        }
    }

    #[tokio::test]
    async fn collect_then_analyze_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let log = FeedbackLog::new(dir.path());

        log.collect(submission(4.0, "good logic overall")).await.unwrap();
        log.collect(submission(2.0, "weak rebuttal, ignored the facts"))
            .await
            .unwrap();

        let analysis = log.analyze().await.unwrap();
        assert!((analysis.average_rating - 3.0).abs() < f64::EPSILON);
        assert_eq!(analysis.common_issues.get("logic"), Some(&1));
        assert_eq!(analysis.common_issues.get("fact"), Some(&1));

        // The analysis was persisted alongside the raw feedback.
        let raw = std::fs::read_to_string(dir.path().join("training_data.json")).unwrap();
        assert!(raw.contains("averageRating"));
        assert!(raw.contains("weak rebuttal"));
    }

    #[tokio::test]
    async fn analyze_with_no_feedback_reports_zero_average() {
        let dir = tempfile::tempdir().unwrap();
        let log = FeedbackLog::new(dir.path());
        let analysis = log.analyze().await.unwrap();
        assert_eq!(analysis.average_rating, 0.0);
        assert!(analysis.common_issues.is_empty());
        assert!(analysis.improvement_areas.is_empty());
    }

    #[tokio::test]
    async fn export_writes_a_timestamped_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let log = FeedbackLog::new(dir.path());
        log.collect(submission(5.0, "flawless arguments")).await.unwrap();

        let path = log.export().await.unwrap();
        assert!(path.contains("training-export-"));
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn suggestions_follow_the_issue_thresholds() {
        let mut issues = BTreeMap::new();
        issues.insert("fact".to_string(), 3);
        issues.insert("evidence".to_string(), 1);
        issues.insert("logic".to_string(), 3);
        issues.insert("tone".to_string(), 2);
        issues.insert("rebuttal".to_string(), 2);

        let suggestions = suggest_improvements(&issues);
        assert_eq!(suggestions.len(), 4);
        assert!(suggestions[0].contains("factual accuracy"));
    }

    #[test]
    fn keyword_scan_is_case_insensitive() {
        let feedback = vec![StoredFeedback {
            timestamp: Utc::now(),
            kind: None,
            round: None,
            motion: None,
            rating: None,
            comment: Some("The TONE felt off and the Logic wobbled".to_string()),
            suggestion: None,
        }];
        let issues = identify_common_issues(&feedback);
        assert_eq!(issues.get("tone"), Some(&1));
        assert_eq!(issues.get("logic"), Some(&1));
    }
}
