//! Analysis modes: each mode pairs one prompt template with one result schema.
//!
//! The pipeline is parameterized by exactly one mode, chosen at configuration time.
//! A reply is only ever read against the active mode's schema.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::analysis::prompts::{
    CLASS_SUMMARY_TEMPLATE, KNOWLEDGE_GAPS_TEMPLATE, PER_STUDENT_TEMPLATE,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum AnalysisMode {
    /// Common issues across the class plus recommended topics.
    #[default]
    Class,
    /// Curriculum-mapped knowledge gaps with affected students.
    Gaps,
    /// One analysis per student plus a class summary.
    Students,
}

impl AnalysisMode {
    pub fn template(self) -> &'static str {
        match self {
            AnalysisMode::Class => CLASS_SUMMARY_TEMPLATE,
            AnalysisMode::Gaps => KNOWLEDGE_GAPS_TEMPLATE,
            AnalysisMode::Students => PER_STUDENT_TEMPLATE,
        }
    }

    /// Top-level keys recognized for this mode's schema.
    pub fn expected_keys(self) -> &'static [&'static str] {
        match self {
            AnalysisMode::Class => &["common_issues", "recommended_topics"],
            AnalysisMode::Gaps => &["knowledge_gaps", "recommended_topics"],
            AnalysisMode::Students => &["student_analysis", "class_summary"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisMode::Class => "class",
            AnalysisMode::Gaps => "gaps",
            AnalysisMode::Students => "students",
        }
    }

    /// Reads a parsed reply object into this mode's report type.
    /// Missing or null keys default to empty; a report list of the wrong type is an error.
    pub fn read_report(
        self,
        object: serde_json::Map<String, Value>,
    ) -> Result<KnowledgeGapReport, serde_json::Error> {
        let recognized_keys: Vec<&'static str> = self
            .expected_keys()
            .iter()
            .copied()
            .filter(|key| object.get(*key).is_some_and(|v| !v.is_null()))
            .collect();

        let value = Value::Object(object);
        let body = match self {
            AnalysisMode::Class => ReportBody::ClassSummary(serde_json::from_value(value)?),
            AnalysisMode::Gaps => ReportBody::KnowledgeGaps(serde_json::from_value(value)?),
            AnalysisMode::Students => ReportBody::PerStudent(serde_json::from_value(value)?),
        };

        Ok(KnowledgeGapReport {
            mode: self,
            body,
            recognized_keys,
        })
    }
}

impl std::fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Lenient field readers
//
// Only the top-level keys decide whether a reply fits a mode. Inside the
// report, ids may come back as numbers, chapters as strings and lists as null;
// none of that should cost the whole report.
// ────────────────────────────────────────────────────────────────────────────

/// `null` reads as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

/// A string, number or bool as text; `null` as an empty string.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_text(Value::deserialize(deserializer)?).unwrap_or_default())
}

/// A list of ids or names whose items may be strings or numbers. A lone scalar
/// is read as a one-item list; `null` items are dropped.
fn lenient_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().filter_map(scalar_text).collect(),
        other => scalar_text(other).into_iter().collect(),
    })
}

/// A chapter number given as an integer or a numeric string.
fn lenient_chapter<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Report schemas
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[serde(alias = "High", alias = "HIGH")]
    High,
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "Low", alias = "LOW")]
    Low,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::High => "high",
            Frequency::Medium => "medium",
            Frequency::Low => "low",
            Frequency::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonIssue {
    #[serde(deserialize_with = "lenient_string")]
    pub issue: String,
    #[serde(deserialize_with = "null_as_default")]
    pub frequency: Frequency,
    #[serde(deserialize_with = "lenient_string")]
    pub acm_topic: String,
    #[serde(deserialize_with = "lenient_string")]
    pub concept: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassSummaryReport {
    #[serde(deserialize_with = "null_as_default")]
    pub common_issues: Vec<CommonIssue>,
    #[serde(deserialize_with = "lenient_string_list")]
    pub recommended_topics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeGap {
    #[serde(deserialize_with = "lenient_string")]
    pub gap: String,
    #[serde(alias = "acm_topic", deserialize_with = "lenient_string")]
    pub curriculum_topic: String,
    #[serde(deserialize_with = "lenient_chapter")]
    pub chapter: Option<u32>,
    #[serde(deserialize_with = "null_as_default")]
    pub frequency: Frequency,
    #[serde(deserialize_with = "lenient_string_list")]
    pub affected_students: Vec<String>,
    #[serde(deserialize_with = "lenient_string_list")]
    pub problem_ids: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub evidence: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeGapsReport {
    #[serde(deserialize_with = "null_as_default")]
    pub knowledge_gaps: Vec<KnowledgeGap>,
    #[serde(deserialize_with = "lenient_string_list")]
    pub recommended_topics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentAnalysis {
    #[serde(deserialize_with = "lenient_string")]
    pub student_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub knowledge_gaps: Vec<KnowledgeGap>,
    #[serde(deserialize_with = "lenient_string_list")]
    pub strengths: Vec<String>,
    #[serde(deserialize_with = "lenient_string_list")]
    pub recommended_topics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassSummary {
    #[serde(deserialize_with = "null_as_default")]
    pub common_gaps: Vec<KnowledgeGap>,
    #[serde(deserialize_with = "lenient_string")]
    pub overall_assessment: String,
    #[serde(deserialize_with = "lenient_string_list")]
    pub recommended_topics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerStudentReport {
    #[serde(deserialize_with = "null_as_default")]
    pub student_analysis: Vec<StudentAnalysis>,
    pub class_summary: Option<ClassSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportBody {
    ClassSummary(ClassSummaryReport),
    KnowledgeGaps(KnowledgeGapsReport),
    PerStudent(PerStudentReport),
}

/// The validated parse of one model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeGapReport {
    pub mode: AnalysisMode,
    pub body: ReportBody,
    /// Which of the mode's top-level keys were present in the reply.
    pub recognized_keys: Vec<&'static str>,
}

impl KnowledgeGapReport {
    /// A reply with none of the mode's keys parsed fine but says nothing usable.
    pub fn is_usable(&self) -> bool {
        !self.recognized_keys.is_empty()
    }
}
