// Analysis prompt templates, one per analysis mode.
// Every template is a system instruction that embeds the curriculum taxonomy and the
// focus problem descriptions; the submissions themselves travel in the user turn.
//
// Placeholders: {curriculum_json}, {problems_json}, {frequency_thresholds}, {json_only}

/// Class-level summary: common issues plus topics to review.
pub const CLASS_SUMMARY_TEMPLATE: &str = r#"You are an expert reviewer of Java code
written by students in an introductory CS course.
You will receive a set of student submissions. Each submission is the best graded attempt
a student made on one problem. Identify the issues that recur across the class.

CURRICULUM TAXONOMY (map every issue to one of these topics):
{curriculum_json}

PROBLEM DESCRIPTIONS (problem id -> requirement):
{problems_json}

Focus on: syntax errors, array/loop bounds, variable scope, return statements,
and any misunderstanding the problem requirement reveals.

{frequency_thresholds}

OUTPUT SCHEMA (return exactly this structure):
{
  "common_issues": [
    {
      "issue": "brief description",
      "frequency": "high" | "medium" | "low",
      "acm_topic": "topic name from the curriculum taxonomy",
      "concept": "underlying concept students misunderstand"
    }
  ],
  "recommended_topics": ["list of curriculum topics to review"]
}

RULES:
1. Report patterns across students, not a review of any single submission
2. Every acm_topic must be a topic name from the curriculum taxonomy
3. Order common_issues from most to least frequent
4. {json_only}"#;

/// Class-level knowledge gaps with evidence and affected students.
pub const KNOWLEDGE_GAPS_TEMPLATE: &str = r#"You are an expert CS educator diagnosing
conceptual knowledge gaps from student code.
You will receive a set of student submissions. Each submission is the best graded attempt
a student made on one problem. Infer which concepts students have not yet mastered.

CURRICULUM TAXONOMY (every gap must map to one of these topics):
{curriculum_json}

PROBLEM DESCRIPTIONS (problem id -> requirement):
{problems_json}

{frequency_thresholds}

OUTPUT SCHEMA (return exactly this structure):
{
  "knowledge_gaps": [
    {
      "gap": "name of the conceptual misunderstanding",
      "curriculum_topic": "topic name from the curriculum taxonomy",
      "chapter": 4,
      "frequency": "high" | "medium" | "low",
      "affected_students": ["student ids"],
      "problem_ids": ["problem ids where the gap shows"],
      "evidence": "short description of the error pattern in the code"
    }
  ],
  "recommended_topics": ["curriculum topics to review, most urgent first"]
}

RULES:
1. A gap is a concept, not a single bug; group errors with the same cause
2. Only cite student ids and problem ids that appear in the submissions
3. Low-scoring submissions are stronger evidence than high-scoring ones
4. {json_only}"#;

/// Per-student breakdown plus a class summary.
pub const PER_STUDENT_TEMPLATE: &str = r#"You are an expert CS educator writing individual feedback
for students in an introductory course.
You will receive student submissions. Each submission is the best graded attempt a student
made on one problem. Analyse every student separately, then summarise the class.

CURRICULUM TAXONOMY (every gap must map to one of these topics):
{curriculum_json}

PROBLEM DESCRIPTIONS (problem id -> requirement):
{problems_json}

{frequency_thresholds}

OUTPUT SCHEMA (return exactly this structure):
{
  "student_analysis": [
    {
      "student_id": "student id exactly as given",
      "knowledge_gaps": [
        {
          "gap": "name of the conceptual misunderstanding",
          "curriculum_topic": "topic name from the curriculum taxonomy",
          "problem_ids": ["problem ids where the gap shows"],
          "evidence": "short description of the error pattern"
        }
      ],
      "strengths": ["concepts the student applies correctly"],
      "recommended_topics": ["curriculum topics this student should review"]
    }
  ],
  "class_summary": {
    "common_gaps": [
      {
        "gap": "gap shared by several students",
        "curriculum_topic": "topic name from the curriculum taxonomy",
        "frequency": "high" | "medium" | "low"
      }
    ],
    "overall_assessment": "two or three sentences on the class as a whole",
    "recommended_topics": ["curriculum topics for whole-class review"]
  }
}

RULES:
1. One student_analysis entry per distinct student id in the submissions
2. Only cite student ids and problem ids that appear in the submissions
3. A student with no gaps gets an empty knowledge_gaps list, not an invented one
4. {json_only}"#;

/// Header line that precedes the formatted submission blocks in the user turn.
pub const SUBMISSIONS_HEADER: &str = "=== STUDENT SUBMISSIONS ===";

/// Line that closes every submission block.
pub const SUBMISSION_DELIMITER: &str = "----------";
