//! Data models for the tutor.
//!
//! This module contains the persisted records (sessions, messages,
//! analyses, teacher responses) and the structured analysis contract
//! that the analyser stage hands to the teacher stage.

use crate::error::{Result, TutorError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Knowledge level the analyser assigns to the student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StudentLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl fmt::Display for StudentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StudentLevel::Beginner => write!(f, "BEGINNER"),
            StudentLevel::Intermediate => write!(f, "INTERMEDIATE"),
            StudentLevel::Advanced => write!(f, "ADVANCED"),
            StudentLevel::Expert => write!(f, "EXPERT"),
        }
    }
}

/// How strongly an error affects the student's learning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LearningImpact {
    Low,
    Medium,
    High,
}

impl fmt::Display for LearningImpact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LearningImpact::Low => write!(f, "LOW"),
            LearningImpact::Medium => write!(f, "MEDIUM"),
            LearningImpact::High => write!(f, "HIGH"),
        }
    }
}

/// One error found in the student's code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Short name of the specific error.
    #[serde(rename = "type")]
    pub kind: String,
    /// What is wrong and why.
    pub description: String,
    /// How the student could fix it.
    pub suggested_fix: String,
    pub learning_impact: LearningImpact,
}

/// General assessment of the submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralAssessment {
    pub student_level: StudentLevel,
    /// Detected programming language.
    pub language: String,
    /// What the code is meant to do.
    pub code_goal: String,
    /// Programming concepts involved, most relevant first.
    pub topics: Vec<String>,
    /// Overall quality score in `0..=100`.
    pub overall_score: u32,
}

/// Errors split by category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorsByCategory {
    pub syntax: Vec<ErrorDetail>,
    pub logic: Vec<ErrorDetail>,
    pub structural: Vec<ErrorDetail>,
    pub performance: Vec<ErrorDetail>,
    pub best_practice: Vec<ErrorDetail>,
}

impl ErrorsByCategory {
    /// Total number of entries across all five categories.
    pub fn len(&self) -> usize {
        self.syntax.len()
            + self.logic.len()
            + self.structural.len()
            + self.performance.len()
            + self.best_practice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over every error in category order.
    pub fn iter(&self) -> impl Iterator<Item = &ErrorDetail> {
        self.syntax
            .iter()
            .chain(&self.logic)
            .chain(&self.structural)
            .chain(&self.performance)
            .chain(&self.best_practice)
    }

    /// Number of errors rated at or above the given impact.
    pub fn count_at_least(&self, impact: LearningImpact) -> usize {
        self.iter().filter(|e| e.learning_impact >= impact).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDiagnosis {
    pub total_errors: u32,
    pub errors_by_category: ErrorsByCategory,
}

/// Educational feedback for the student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub strengths: Vec<String>,
    pub improvement_areas: Vec<String>,
    pub next_steps: Vec<String>,
    pub recommended_resources: Vec<String>,
}

/// Optional corrected version of the code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovedCode {
    pub include: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_version: Option<String>,
    pub change_explanation: String,
}

/// The structured output of the analyser stage.
///
/// A value is only accepted once [`AnalysisResult::validate`] passes;
/// use [`AnalysisResult::from_json`] to parse and validate in one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub general: GeneralAssessment,
    pub error_diagnosis: ErrorDiagnosis,
    pub feedback: Feedback,
    pub improved_code: ImprovedCode,
}

impl AnalysisResult {
    /// Parse model output and check it against the contract.
    pub fn from_json(text: &str) -> Result<Self> {
        let result: AnalysisResult = serde_json::from_str(text)
            .map_err(|e| TutorError::SchemaValidation(e.to_string()))?;
        result.validate()?;
        Ok(result)
    }

    /// Check the rules that the type system alone does not enforce.
    pub fn validate(&self) -> Result<()> {
        if self.general.overall_score > 100 {
            return Err(TutorError::SchemaValidation(format!(
                "overall_score must be within 0..=100, got {}",
                self.general.overall_score
            )));
        }

        let listed = self.error_diagnosis.errors_by_category.len();
        if self.error_diagnosis.total_errors as usize != listed {
            return Err(TutorError::SchemaValidation(format!(
                "total_errors is {} but {} errors are listed across categories",
                self.error_diagnosis.total_errors, listed
            )));
        }

        if self.improved_code.include {
            let missing = self
                .improved_code
                .corrected_version
                .as_deref()
                .map_or(true, |code| code.trim().is_empty());
            if missing {
                return Err(TutorError::SchemaValidation(
                    "improved_code.include is true but corrected_version is missing".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// JSON schema handed to the model to constrain its output.
    pub fn json_schema() -> Value {
        let string_list = json!({ "type": "array", "items": { "type": "string" } });
        let error_list = json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "type": { "type": "string" },
                    "description": { "type": "string" },
                    "suggested_fix": { "type": "string" },
                    "learning_impact": { "type": "string", "enum": ["LOW", "MEDIUM", "HIGH"] }
                },
                "required": ["type", "description", "suggested_fix", "learning_impact"]
            }
        });

        json!({
            "type": "object",
            "properties": {
                "general": {
                    "type": "object",
                    "properties": {
                        "student_level": {
                            "type": "string",
                            "enum": ["BEGINNER", "INTERMEDIATE", "ADVANCED", "EXPERT"]
                        },
                        "language": { "type": "string" },
                        "code_goal": { "type": "string" },
                        "topics": string_list.clone(),
                        "overall_score": { "type": "integer", "minimum": 0, "maximum": 100 }
                    },
                    "required": ["student_level", "language", "code_goal", "topics", "overall_score"]
                },
                "error_diagnosis": {
                    "type": "object",
                    "properties": {
                        "total_errors": { "type": "integer", "minimum": 0 },
                        "errors_by_category": {
                            "type": "object",
                            "properties": {
                                "syntax": error_list.clone(),
                                "logic": error_list.clone(),
                                "structural": error_list.clone(),
                                "performance": error_list.clone(),
                                "best_practice": error_list.clone()
                            },
                            "required": ["syntax", "logic", "structural", "performance", "best_practice"]
                        }
                    },
                    "required": ["total_errors", "errors_by_category"]
                },
                "feedback": {
                    "type": "object",
                    "properties": {
                        "strengths": string_list.clone(),
                        "improvement_areas": string_list.clone(),
                        "next_steps": string_list.clone(),
                        "recommended_resources": string_list.clone()
                    },
                    "required": ["strengths", "improvement_areas", "next_steps", "recommended_resources"]
                },
                "improved_code": {
                    "type": "object",
                    "properties": {
                        "include": { "type": "boolean" },
                        "corrected_version": { "type": "string" },
                        "change_explanation": { "type": "string" }
                    },
                    "required": ["include", "change_explanation"]
                }
            },
            "required": ["general", "error_diagnosis", "feedback", "improved_code"]
        })
    }
}

/// A conversational continuity scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// One submission of code and question within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub session_id: String,
    pub code: String,
    pub question: String,
    pub created_at: DateTime<Utc>,
}

/// The accepted analysis for a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub id: i64,
    pub message_id: i64,
    pub analysis: AnalysisResult,
    pub created_at: DateTime<Utc>,
}

/// The complete teacher text delivered for a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherResponse {
    pub id: i64,
    pub message_id: i64,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

/// A message together with whatever the pipeline produced for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Analysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<TeacherResponse>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_error(kind: &str, impact: LearningImpact) -> ErrorDetail {
        ErrorDetail {
            kind: kind.to_string(),
            description: format!("{} found", kind),
            suggested_fix: "think about the loop bounds".to_string(),
            learning_impact: impact,
        }
    }

    pub(crate) fn sample_analysis() -> AnalysisResult {
        AnalysisResult {
            general: GeneralAssessment {
                student_level: StudentLevel::Beginner,
                language: "Python 3".to_string(),
                code_goal: "increment a number".to_string(),
                topics: vec!["functions".to_string(), "arithmetic".to_string()],
                overall_score: 70,
            },
            error_diagnosis: ErrorDiagnosis {
                total_errors: 2,
                errors_by_category: ErrorsByCategory {
                    logic: vec![sample_error("off-by-one", LearningImpact::High)],
                    best_practice: vec![sample_error("naming", LearningImpact::Low)],
                    ..Default::default()
                },
            },
            feedback: Feedback {
                strengths: vec!["concise".to_string()],
                improvement_areas: vec!["naming".to_string()],
                next_steps: vec!["read about docstrings".to_string()],
                recommended_resources: vec!["the Python tutorial".to_string()],
            },
            improved_code: ImprovedCode {
                include: false,
                corrected_version: None,
                change_explanation: "not requested".to_string(),
            },
        }
    }

    #[test]
    fn test_valid_analysis_passes() {
        let analysis = sample_analysis();
        assert!(analysis.validate().is_ok());
        assert_eq!(analysis.error_diagnosis.errors_by_category.len(), 2);
        assert_eq!(
            analysis
                .error_diagnosis
                .errors_by_category
                .count_at_least(LearningImpact::Medium),
            1
        );
    }

    #[test]
    fn test_total_errors_mismatch_rejected() {
        let mut analysis = sample_analysis();
        analysis.error_diagnosis.total_errors = 5;
        let err = analysis.validate().unwrap_err();
        assert!(matches!(err, TutorError::SchemaValidation(_)));
        assert!(err.to_string().contains("total_errors is 5"));
    }

    #[test]
    fn test_score_out_of_range_rejected() {
        let mut analysis = sample_analysis();
        analysis.general.overall_score = 101;
        assert!(analysis.validate().is_err());

        analysis.general.overall_score = 100;
        assert!(analysis.validate().is_ok());

        let mut value = serde_json::to_value(sample_analysis()).unwrap();
        value["general"]["overall_score"] = json!(-1);
        assert!(AnalysisResult::from_json(&value.to_string()).is_err());
    }

    #[test]
    fn test_unknown_student_level_rejected() {
        let mut value = serde_json::to_value(sample_analysis()).unwrap();
        value["general"]["student_level"] = json!("GURU");
        let err = AnalysisResult::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, TutorError::SchemaValidation(_)));
    }

    #[test]
    fn test_include_requires_corrected_version() {
        let mut analysis = sample_analysis();
        analysis.improved_code.include = true;
        assert!(analysis.validate().is_err());

        analysis.improved_code.corrected_version = Some("def f(x): return x + 1".to_string());
        assert!(analysis.validate().is_ok());
    }

    #[test]
    fn test_wire_format() {
        let value = serde_json::to_value(sample_analysis()).unwrap();
        assert_eq!(value["general"]["student_level"], "BEGINNER");
        let logic = &value["error_diagnosis"]["errors_by_category"]["logic"][0];
        assert_eq!(logic["type"], "off-by-one");
        assert_eq!(logic["learning_impact"], "HIGH");
        assert!(value["improved_code"].get("corrected_version").is_none());
    }

    #[test]
    fn test_missing_categories_rejected() {
        let text = r#"{
            "general": {"student_level": "EXPERT", "language": "Rust", "code_goal": "x",
                        "topics": [], "overall_score": 95},
            "error_diagnosis": {"total_errors": 0, "errors_by_category": {"logic": []}},
            "feedback": {"strengths": [], "improvement_areas": [], "next_steps": [],
                         "recommended_resources": []},
            "improved_code": {"include": false, "change_explanation": ""}
        }"#;
        let err = AnalysisResult::from_json(text).unwrap_err();
        assert!(matches!(err, TutorError::SchemaValidation(_)));
        assert!(err.to_string().contains("syntax"));

        let complete = text.replace(
            r#"{"logic": []}"#,
            r#"{"syntax": [], "logic": [], "structural": [], "performance": [], "best_practice": []}"#,
        );
        let analysis = AnalysisResult::from_json(&complete).unwrap();
        assert!(analysis.error_diagnosis.errors_by_category.is_empty());
        assert_eq!(analysis.general.student_level, StudentLevel::Expert);
    }

    #[test]
    fn test_schema_lists_all_categories() {
        let schema = AnalysisResult::json_schema();
        let categories =
            &schema["properties"]["error_diagnosis"]["properties"]["errors_by_category"];
        for name in ["syntax", "logic", "structural", "performance", "best_practice"] {
            assert!(categories["properties"].get(name).is_some(), "{}", name);
        }
    }
}
