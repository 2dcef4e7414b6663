//! Prompt templates for the analyser and teacher stages.
//!
//! Each template has a fixed set of `{{placeholder}}` slots. The render
//! functions take typed parameters so that every slot is filled exactly
//! once and nothing else in the template is touched.

use crate::models::AnalysisResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How much detail the analysis should go into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Minimal,
    #[default]
    Medium,
    Maximum,
}

impl fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetailLevel::Minimal => write!(f, "minimal"),
            DetailLevel::Medium => write!(f, "medium"),
            DetailLevel::Maximum => write!(f, "maximum"),
        }
    }
}

/// What the analysis should concentrate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EducationalFocus {
    Errors,
    Improvements,
    #[default]
    Both,
}

impl fmt::Display for EducationalFocus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EducationalFocus::Errors => write!(f, "errors"),
            EducationalFocus::Improvements => write!(f, "improvements"),
            EducationalFocus::Both => write!(f, "both"),
        }
    }
}

/// Tone of the written feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackTone {
    #[default]
    Encouraging,
    Neutral,
    Direct,
}

impl fmt::Display for FeedbackTone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackTone::Encouraging => write!(f, "encouraging"),
            FeedbackTone::Neutral => write!(f, "neutral"),
            FeedbackTone::Direct => write!(f, "direct"),
        }
    }
}

/// The four knobs of the analyser prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    #[serde(default)]
    pub detail_level: DetailLevel,
    #[serde(default)]
    pub educational_focus: EducationalFocus,
    #[serde(default = "default_include_code")]
    pub include_code_suggestions: bool,
    #[serde(default)]
    pub feedback_tone: FeedbackTone,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            detail_level: DetailLevel::default(),
            educational_focus: EducationalFocus::default(),
            include_code_suggestions: default_include_code(),
            feedback_tone: FeedbackTone::default(),
        }
    }
}

fn default_include_code() -> bool {
    true
}

/// Render the analyser prompt for one submission.
pub fn render_analyser_prompt(options: &AnalysisOptions, code: &str, question: &str) -> String {
    fill(
        ANALYSER_TEMPLATE,
        &[
            ("detail_level", &options.detail_level.to_string()),
            ("educational_focus", &options.educational_focus.to_string()),
            (
                "include_code_suggestions",
                if options.include_code_suggestions {
                    "true"
                } else {
                    "false"
                },
            ),
            ("feedback_tone", &options.feedback_tone.to_string()),
            ("student_question", question),
            ("student_code", code),
        ],
    )
}

/// Render the teacher prompt, embedding the accepted analysis as JSON.
pub fn render_teacher_prompt(code: &str, question: &str, analysis: &AnalysisResult) -> String {
    let analysis_json =
        serde_json::to_string_pretty(analysis).unwrap_or_else(|_| "{}".to_string());

    fill(
        TEACHER_TEMPLATE,
        &[
            ("student_question", question),
            ("student_code", code),
            ("code_analysis", &analysis_json),
        ],
    )
}

/// Substitute every `{{name}}` slot in a single left-to-right pass.
///
/// Values are inserted verbatim and never re-scanned, so student input
/// containing `{{...}}` cannot trigger a second substitution.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let replaced = after.find("}}").and_then(|end| {
            let name = &after[..end];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, end))
        });

        match replaced {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

const ANALYSER_TEMPLATE: &str = r#"## ROLE
You are a senior programming instructor with many years of experience teaching
and reviewing student code across many languages and domains. You give precise,
constructive and actionable feedback that accelerates learning.

## PROCESS
1. Identify the programming language and infer what the code is meant to do
   from names, structure, imports and comments.
2. Classify the student's level:
   - BEGINNER: basic syntax, variables, simple conditionals and loops
   - INTERMEDIATE: well-structured functions, data structures, basic error handling
   - ADVANCED: object orientation, design patterns, performance work
   - EXPERT: clean and efficient code, advanced patterns, scalability concerns
3. Classify every error into exactly one category: syntax, logic, structural,
   performance, best_practice. Order errors by learning impact, highest first.
4. List only the topics the code actually demonstrates.

## SETTINGS
detail_level: {{detail_level}}
educational_focus: {{educational_focus}}
include_code_suggestions: {{include_code_suggestions}}
feedback_tone: {{feedback_tone}}

## OUTPUT
Respond with a single JSON object and nothing else:
{
  "general": {
    "student_level": "BEGINNER|INTERMEDIATE|ADVANCED|EXPERT",
    "language": "string",
    "code_goal": "what the code should do",
    "topics": ["topics identified"],
    "overall_score": 0-100
  },
  "error_diagnosis": {
    "total_errors": number equal to the count of all listed errors,
    "errors_by_category": {
      "syntax": [{"type": "string", "description": "string", "suggested_fix": "string", "learning_impact": "LOW|MEDIUM|HIGH"}],
      "logic": [],
      "structural": [],
      "performance": [],
      "best_practice": []
    }
  },
  "feedback": {
    "strengths": [],
    "improvement_areas": [],
    "next_steps": [],
    "recommended_resources": []
  },
  "improved_code": {
    "include": {{include_code_suggestions}},
    "corrected_version": "corrected code, required when include is true",
    "change_explanation": "explanation of each change"
  }
}

Keep the tone {{feedback_tone}}. Check before answering that total_errors
matches the errors you listed and that the JSON is complete.

## INPUT
<STUDENT_QUESTION>
{{student_question}}
</STUDENT_QUESTION>

<STUDENT_CODE>
{{student_code}}
</STUDENT_CODE>
"#;

const TEACHER_TEMPLATE: &str = r#"# ROLE
You are an experienced programming teacher. You turn a technical code analysis
into a learning experience that builds the student's own reasoning. You guide
through questions and never hand over finished answers.

# HOW TO TEACH
- Adapt vocabulary and depth to `general.student_level` from the analysis.
- Start with the strengths the analysis found, then work through the errors
  with MEDIUM or HIGH learning impact, highest first.
- For each error lead the student to discover it: ask what they expected to
  happen, why they think it behaves differently, and what they could try.
- Connect each specific error to the general concept behind it, using
  analogies that fit the student's level.
- Finish with a small reflection challenge suited to the student's level.

# HARD RULES
- NEVER give the corrected code, even if the student asks for it.
- NEVER list ready-made solutions.
- Examples are allowed only in a context clearly different from the student's code.
- End every section with a reflective question.

## INPUT
<STUDENT_QUESTION>
{{student_question}}
</STUDENT_QUESTION>

<STUDENT_CODE>
{{student_code}}
</STUDENT_CODE>

<CODE_ANALYSIS>
{{code_analysis}}
</CODE_ANALYSIS>
"#;
