//! Report rendering for the CLI. Pure string building; `print_outcome` is the only
//! function that writes to stdout.

use std::fmt::Write;

use crate::analysis::mode::{
    ClassSummaryReport, Frequency, KnowledgeGap, KnowledgeGapReport, KnowledgeGapsReport,
    PerStudentReport, ReportBody,
};
use crate::analysis::pipeline::{AnalysisOutcome, SubmissionOutcome, SubmissionResult};

const RULE_WIDTH: usize = 60;

fn frequency_icon(frequency: Frequency) -> &'static str {
    match frequency {
        Frequency::High => "🔴",
        Frequency::Medium => "🟡",
        Frequency::Low => "🟢",
        Frequency::Unknown => "⚪",
    }
}

fn or_na(text: &str) -> &str {
    if text.trim().is_empty() {
        "N/A"
    } else {
        text
    }
}

pub fn print_outcome(outcome: &AnalysisOutcome) {
    let text = match outcome {
        AnalysisOutcome::Summary(report) => render_report(report),
        AnalysisOutcome::PerSubmission(results) => render_submission_results(results),
    };
    println!("{text}");
}

pub fn render_report(report: &KnowledgeGapReport) -> String {
    let heavy = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    let title = match &report.body {
        ReportBody::ClassSummary(_) => "CLASS ANALYSIS SUMMARY",
        ReportBody::KnowledgeGaps(_) => "KNOWLEDGE GAP ANALYSIS",
        ReportBody::PerStudent(_) => "PER-STUDENT ANALYSIS",
    };
    let _ = writeln!(out, "\n{heavy}\n{title}\n{heavy}");

    match &report.body {
        ReportBody::ClassSummary(body) => render_class_summary(&mut out, body),
        ReportBody::KnowledgeGaps(body) => render_knowledge_gaps(&mut out, body),
        ReportBody::PerStudent(body) => render_per_student(&mut out, body),
    }

    let _ = write!(out, "\n{heavy}");
    out
}

fn render_class_summary(out: &mut String, body: &ClassSummaryReport) {
    if !body.common_issues.is_empty() {
        let _ = writeln!(out, "\n📋 COMMON ISSUES ({} found)\n", body.common_issues.len());
        for (i, issue) in body.common_issues.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, or_na(&issue.issue));
            let _ = writeln!(
                out,
                "   {} Frequency: {}",
                frequency_icon(issue.frequency),
                issue.frequency.as_str().to_uppercase()
            );
            let _ = writeln!(out, "   📚 ACM Topic: {}", or_na(&issue.acm_topic));
            let _ = writeln!(out, "   💡 Concept: {}", or_na(&issue.concept));
            out.push('\n');
        }
    }
    render_recommended(out, &body.recommended_topics);
}

fn render_gap(out: &mut String, ordinal: usize, gap: &KnowledgeGap, indent: &str) {
    let _ = writeln!(out, "{indent}{ordinal}. {}", or_na(&gap.gap));
    let _ = writeln!(
        out,
        "{indent}   {} Frequency: {}",
        frequency_icon(gap.frequency),
        gap.frequency.as_str().to_uppercase()
    );
    let chapter = gap
        .chapter
        .map(|c| format!(" (chapter {c})"))
        .unwrap_or_default();
    let _ = writeln!(
        out,
        "{indent}   📚 Topic: {}{chapter}",
        or_na(&gap.curriculum_topic)
    );
    if !gap.affected_students.is_empty() {
        let _ = writeln!(
            out,
            "{indent}   👥 Students: {}",
            gap.affected_students.join(", ")
        );
    }
    if !gap.problem_ids.is_empty() {
        let _ = writeln!(out, "{indent}   🧩 Problems: {}", gap.problem_ids.join(", "));
    }
    if !gap.evidence.trim().is_empty() {
        let _ = writeln!(out, "{indent}   🔎 Evidence: {}", gap.evidence);
    }
}

fn render_knowledge_gaps(out: &mut String, body: &KnowledgeGapsReport) {
    if !body.knowledge_gaps.is_empty() {
        let _ = writeln!(out, "\n🧭 KNOWLEDGE GAPS ({} found)\n", body.knowledge_gaps.len());
        for (i, gap) in body.knowledge_gaps.iter().enumerate() {
            render_gap(out, i + 1, gap, "");
            out.push('\n');
        }
    }
    render_recommended(out, &body.recommended_topics);
}

fn render_per_student(out: &mut String, body: &PerStudentReport) {
    for student in &body.student_analysis {
        let _ = writeln!(out, "\n👤 STUDENT {}", or_na(&student.student_id));
        for (i, gap) in student.knowledge_gaps.iter().enumerate() {
            render_gap(out, i + 1, gap, "   ");
        }
        if !student.strengths.is_empty() {
            let _ = writeln!(out, "   ✅ Strengths: {}", student.strengths.join(", "));
        }
        if !student.recommended_topics.is_empty() {
            let _ = writeln!(
                out,
                "   📖 Review: {}",
                student.recommended_topics.join(", ")
            );
        }
    }

    if let Some(summary) = &body.class_summary {
        let rule = "-".repeat(RULE_WIDTH);
        let _ = writeln!(out, "\n{rule}\nCLASS SUMMARY\n{rule}");
        if !summary.overall_assessment.trim().is_empty() {
            let _ = writeln!(out, "{}\n", summary.overall_assessment);
        }
        for (i, gap) in summary.common_gaps.iter().enumerate() {
            render_gap(out, i + 1, gap, "");
        }
        render_recommended(out, &summary.recommended_topics);
    }
}

fn render_recommended(out: &mut String, topics: &[String]) {
    if topics.is_empty() {
        return;
    }
    let light = "-".repeat(RULE_WIDTH);
    let _ = writeln!(out, "{light}\n📖 RECOMMENDED TOPICS TO REVIEW\n{light}");
    for (i, topic) in topics.iter().enumerate() {
        let _ = writeln!(out, "   {}. {topic}", i + 1);
    }
}

pub fn render_submission_results(results: &[SubmissionResult]) -> String {
    if results.is_empty() {
        return "No results to display.".to_string();
    }

    let mut out = String::from("Batch Results:\n");
    for (i, result) in results.iter().enumerate() {
        let _ = writeln!(
            out,
            "\nResult for submission {} (student {}, problem {}):",
            i + 1,
            result.student_id,
            result.problem_id
        );
        match &result.outcome {
            SubmissionOutcome::Report(report) => out.push_str(&render_report(report)),
            SubmissionOutcome::Invalid(reason) => {
                let _ = write!(out, "Reply could not be used: {reason}");
            }
            SubmissionOutcome::Empty => out.push_str("No text response available."),
            SubmissionOutcome::Missing => {
                out.push_str("No response available for this submission.")
            }
            SubmissionOutcome::Failed(detail) => {
                let _ = write!(out, "Request failed: {detail}");
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::mode::{AnalysisMode, ClassSummary, CommonIssue, StudentAnalysis};

    fn class_report() -> KnowledgeGapReport {
        KnowledgeGapReport {
            mode: AnalysisMode::Class,
            body: ReportBody::ClassSummary(ClassSummaryReport {
                common_issues: vec![CommonIssue {
                    issue: "Off-by-one in loop bounds".to_string(),
                    frequency: Frequency::High,
                    acm_topic: "Iteration".to_string(),
                    concept: String::new(),
                }],
                recommended_topics: vec!["Iteration".to_string(), "Arrays".to_string()],
            }),
            recognized_keys: vec!["common_issues", "recommended_topics"],
        }
    }

    #[test]
    fn test_class_summary_layout() {
        let text = render_report(&class_report());
        assert!(text.contains("CLASS ANALYSIS SUMMARY"));
        assert!(text.contains("📋 COMMON ISSUES (1 found)"));
        assert!(text.contains("1. Off-by-one in loop bounds"));
        assert!(text.contains("🔴 Frequency: HIGH"));
        assert!(text.contains("📚 ACM Topic: Iteration"));
        assert!(text.contains("💡 Concept: N/A"));
        assert!(text.contains("   2. Arrays"));
    }

    #[test]
    fn test_empty_sections_are_skipped() {
        let report = KnowledgeGapReport {
            mode: AnalysisMode::Class,
            body: ReportBody::ClassSummary(ClassSummaryReport::default()),
            recognized_keys: vec![],
        };
        let text = render_report(&report);
        assert!(!text.contains("COMMON ISSUES"));
        assert!(!text.contains("RECOMMENDED TOPICS"));
    }

    #[test]
    fn test_per_student_layout() {
        let report = KnowledgeGapReport {
            mode: AnalysisMode::Students,
            body: ReportBody::PerStudent(PerStudentReport {
                student_analysis: vec![StudentAnalysis {
                    student_id: "s1".to_string(),
                    knowledge_gaps: vec![KnowledgeGap {
                        gap: "Scope".to_string(),
                        curriculum_topic: "Variables".to_string(),
                        chapter: Some(2),
                        ..Default::default()
                    }],
                    strengths: vec!["loops".to_string()],
                    recommended_topics: vec![],
                }],
                class_summary: Some(ClassSummary {
                    overall_assessment: "Mostly solid".to_string(),
                    ..Default::default()
                }),
            }),
            recognized_keys: vec!["student_analysis", "class_summary"],
        };
        let text = render_report(&report);
        assert!(text.contains("👤 STUDENT s1"));
        assert!(text.contains("📚 Topic: Variables (chapter 2)"));
        assert!(text.contains("✅ Strengths: loops"));
        assert!(text.contains("Mostly solid"));
    }

    #[test]
    fn test_submission_results_cover_every_outcome() {
        let result = |outcome| SubmissionResult {
            student_id: "s1".to_string(),
            problem_id: "p1".to_string(),
            outcome,
        };
        let text = render_submission_results(&[
            result(SubmissionOutcome::Report(class_report())),
            result(SubmissionOutcome::Empty),
            result(SubmissionOutcome::Missing),
            result(SubmissionOutcome::Failed("quota".to_string())),
            result(SubmissionOutcome::Invalid("not JSON".to_string())),
        ]);
        assert!(text.contains("Result for submission 1 (student s1, problem p1):"));
        assert!(text.contains("No text response available."));
        assert!(text.contains("No response available for this submission."));
        assert!(text.contains("Request failed: quota"));
        assert!(text.contains("Reply could not be used: not JSON"));
        assert_eq!(render_submission_results(&[]), "No results to display.");
    }
}
