// 🚨 Error Taxonomy - Fatal pipeline failures
// Non-fatal conditions (ambiguous roster names, unmatched payees) are NOT
// errors: they live in the stage reports.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// STAGE
// ============================================================================

/// Pipeline stage a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Load,
    Clean,
    Fetch,
    Reconcile,
    Aggregate,
    Output,
}

impl Stage {
    pub fn name(&self) -> &str {
        match self {
            Stage::Load => "load",
            Stage::Clean => "clean",
            Stage::Fetch => "fetch",
            Stage::Reconcile => "reconcile",
            Stage::Aggregate => "aggregate",
            Stage::Output => "output",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// PIPELINE ERROR
// ============================================================================

#[derive(Debug)]
pub enum PipelineError {
    /// Input source is missing. Never retried.
    SourceNotFound { path: PathBuf },

    /// Required columns absent from the header row
    Schema {
        missing: Vec<String>,
        available: Vec<String>,
    },

    /// Primary decode failed and the fallback (if any) failed too
    Encoding {
        path: PathBuf,
        primary: String,
        fallback: Option<String>,
    },

    /// Roster fetch failed after exhausting retries, or failed permanently
    Network {
        url: String,
        attempts: u32,
        message: String,
    },

    /// Roster payload could not be interpreted
    Roster { message: String },

    Io { context: String, message: String },

    Csv { message: String },

    Config { message: String },

    /// Any of the above, tagged with the stage that produced it
    Stage {
        stage: Stage,
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            // Already tagged: keep the innermost stage
            PipelineError::Stage { .. } => self,
            other => PipelineError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Strip the stage tag, if any
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self.root() {
            PipelineError::SourceNotFound { .. } => 2,
            PipelineError::Schema { .. } => 3,
            PipelineError::Encoding { .. } => 4,
            PipelineError::Network { .. } => 5,
            _ => 1,
        }
    }

    pub fn io(context: impl Into<String>, err: std::io::Error) -> Self {
        PipelineError::Io {
            context: context.into(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::SourceNotFound { path } => {
                write!(f, "source not found: {}", path.display())
            }
            PipelineError::Schema { missing, available } => write!(
                f,
                "missing required columns: {} (available: {})",
                missing.join(", "),
                available.join(", ")
            ),
            PipelineError::Encoding {
                path,
                primary,
                fallback,
            } => match fallback {
                Some(fb) => write!(
                    f,
                    "could not decode {} as {} nor as fallback {}",
                    path.display(),
                    primary,
                    fb
                ),
                None => write!(f, "could not decode {} as {}", path.display(), primary),
            },
            PipelineError::Network {
                url,
                attempts,
                message,
            } => write!(
                f,
                "roster fetch from {} failed after {} attempt(s): {}",
                url, attempts, message
            ),
            PipelineError::Roster { message } => write!(f, "invalid roster payload: {}", message),
            PipelineError::Io { context, message } => write!(f, "{}: {}", context, message),
            PipelineError::Csv { message } => write!(f, "malformed delimited input: {}", message),
            PipelineError::Config { message } => write!(f, "invalid configuration: {}", message),
            PipelineError::Stage { stage, source } => write!(f, "[{}] {}", stage, source),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Stage { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        PipelineError::Csv {
            message: err.to_string(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_tag_keeps_innermost() {
        let err = PipelineError::SourceNotFound {
            path: PathBuf::from("missing.csv"),
        }
        .in_stage(Stage::Load)
        .in_stage(Stage::Output);

        assert_eq!(err.stage(), Some(Stage::Load));
        assert_eq!(err.to_string(), "[load] source not found: missing.csv");
    }

    #[test]
    fn test_exit_codes_follow_root_cause() {
        let schema = PipelineError::Schema {
            missing: vec!["vlrLiquido".to_string()],
            available: vec!["txNomeParlamentar".to_string()],
        }
        .in_stage(Stage::Load);
        assert_eq!(schema.exit_code(), 3);

        let network = PipelineError::Network {
            url: "http://localhost".to_string(),
            attempts: 4,
            message: "timed out".to_string(),
        };
        assert_eq!(network.exit_code(), 5);

        let csv = PipelineError::Csv {
            message: "bad".to_string(),
        };
        assert_eq!(csv.exit_code(), 1);
    }

    #[test]
    fn test_schema_message_lists_missing_columns() {
        let err = PipelineError::Schema {
            missing: vec!["txtDescricao".to_string(), "vlrLiquido".to_string()],
            available: vec!["txNomeParlamentar".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("txtDescricao, vlrLiquido"));
        assert!(msg.contains("available: txNomeParlamentar"));
    }
}
