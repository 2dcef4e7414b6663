//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Every option is optional so that values
//! from `.codetutor.toml` survive unless overridden here.

use crate::agent::prompt::{DetailLevel, EducationalFocus, FeedbackTone};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// CodeTutor - two-stage LLM tutor for student code
///
/// Serves an HTTP API that analyses a student's code submission and
/// streams back Socratic guidance from a local Ollama model.
///
/// Examples:
///   codetutor
///   codetutor --bind 0.0.0.0:8000 --model qwen2.5-coder:14b
///   codetutor --db ./tutor.db --tone direct
///   codetutor --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .codetutor.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to listen on (e.g. 127.0.0.1:8000)
    #[arg(short, long, value_name = "ADDR", env = "CODETUTOR_BIND")]
    pub bind: Option<String>,

    /// Ollama model used by both stages
    #[arg(short, long, env = "CODETUTOR_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, value_name = "URL", env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Request timeout in seconds for both stages
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Persist sessions to this SQLite file instead of memory
    #[arg(long, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// How much detail the analysis goes into
    #[arg(long, value_name = "LEVEL")]
    pub detail_level: Option<DetailLevel>,

    /// What the analysis concentrates on
    #[arg(long, value_name = "FOCUS")]
    pub focus: Option<EducationalFocus>,

    /// Tone of the analysis feedback
    #[arg(long, value_name = "TONE")]
    pub tone: Option<FeedbackTone>,

    /// Do not ask the analyser for corrected code
    #[arg(long)]
    pub no_code_suggestions: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .codetutor.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref bind) = self.bind {
            if bind.parse::<SocketAddr>().is_err() {
                return Err(format!("Bind address is not a socket address: {}", bind));
            }
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref db) = self.db {
            if db.is_dir() {
                return Err(format!("Database path is a directory: {}", db.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, StoreBackend};

    fn make_args() -> Args {
        Args {
            config: None,
            bind: None,
            model: None,
            ollama_url: None,
            timeout: None,
            db: None,
            detail_level: None,
            focus: None,
            tone: None,
            no_code_suggestions: false,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "codetutor",
            "--bind",
            "0.0.0.0:9000",
            "--detail-level",
            "maximum",
            "--tone",
            "neutral",
            "--no-code-suggestions",
        ])
        .unwrap();
        assert_eq!(args.bind.as_deref(), Some("0.0.0.0:9000"));
        assert_eq!(args.detail_level, Some(DetailLevel::Maximum));
        assert_eq!(args.tone, Some(FeedbackTone::Neutral));
        assert!(args.no_code_suggestions);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_values() {
        let mut args = make_args();
        args.bind = Some("localhost".to_string());
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.ollama_url = Some("localhost:11434".to_string());
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.timeout = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_merge_overrides_only_given_values() {
        let mut config = Config::default();
        config.teacher.temperature = 0.7;

        let mut args = make_args();
        args.model = Some("codellama:13b".to_string());
        args.db = Some(PathBuf::from("tutor.db"));
        args.focus = Some(EducationalFocus::Errors);
        args.no_code_suggestions = true;
        config.merge_with_args(&args);

        assert_eq!(config.analyser.model.model, "codellama:13b");
        assert_eq!(config.teacher.model, "codellama:13b");
        assert_eq!(config.teacher.temperature, 0.7);
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.path, PathBuf::from("tutor.db"));
        assert_eq!(
            config.analyser.prompt.educational_focus,
            EducationalFocus::Errors
        );
        assert!(!config.analyser.prompt.include_code_suggestions);
    }
}
