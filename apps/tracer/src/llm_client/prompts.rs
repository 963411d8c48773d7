// Shared prompt fragments.
// Each analysis mode defines its own template in analysis::prompts.
// This file contains the cross-cutting pieces every template embeds.

/// Output contract appended to every analysis instruction.
pub const JSON_ONLY_INSTRUCTION: &str = "\
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Frequency bands used by every mode that labels issues by prevalence.
pub const FREQUENCY_THRESHOLDS: &str = "\
FREQUENCY THRESHOLDS (share of analysed students showing the issue):
- \"high\": 40% of students or more
- \"medium\": from 15% up to 40% of students
- \"low\": under 15% of students";
