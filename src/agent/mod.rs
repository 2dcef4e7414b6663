//! The two LLM-backed stages of the tutoring pipeline.
//!
//! The analyser turns code and a question into a validated
//! [`AnalysisResult`](crate::models::AnalysisResult); the teacher turns
//! that analysis into streamed Socratic guidance.

pub mod analyser;
pub mod prompt;
pub mod teacher;

pub use analyser::CodeAnalyser;
pub use prompt::AnalysisOptions;
pub use teacher::Teacher;
