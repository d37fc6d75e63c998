use thiserror::Error;

use crate::{pipeline::PipelineState, planner::CapacityError};

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Partition sizes do not fit the disk: {0}")]
    Capacity(#[from] CapacityError),

    #[error("Precondition not met: {0}")]
    Precondition(String),

    #[error("Stage '{stage}' failed: {source}")]
    StageFailure {
        stage: &'static str,
        #[source]
        source: Box<InstallerError>,
    },

    #[error("Command '{program}' failed with exit code {code}{detail}")]
    CommandFailed {
        program: String,
        code: i32,
        detail: String,
    },

    #[error("Command '{0}' not found; is it installed?")]
    CommandNotFound(String),

    #[error("Pipeline cannot go from {from:?} to {to:?}")]
    Transition { from: PipelineState, to: PipelineState },

    /// Ctrl-C seen at a stage boundary; `after` is the last stage that
    /// completed.
    #[error("Installation interrupted by operator {}", interrupted_at(.after))]
    Interrupted { after: Option<&'static str> },

    #[error("Configuration is incomplete:\n{}", .0.join("\n"))]
    Incomplete(Vec<String>),

    #[error("Prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("Cannot read preset: {0}")]
    PresetRead(#[from] toml::de::Error),

    #[error("Cannot write preset: {0}")]
    PresetWrite(#[from] toml::ser::Error),
}

fn interrupted_at(after: &Option<&'static str>) -> String {
    match after {
        Some(stage) => format!("after stage '{stage}' completed"),
        None => format!("before {}", crate::pipeline::STAGES[0].name),
    }
}

impl InstallerError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        InstallerError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            InstallerError::Validation { .. } | InstallerError::Incomplete(_) => 2,
            InstallerError::Capacity(_) => 3,
            InstallerError::Precondition(_) => 4,
            InstallerError::Interrupted { .. } => 130,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_taxonomy() {
        assert_eq!(InstallerError::validation("hostname", "bad").exit_code(), 2);
        assert_eq!(
            InstallerError::Incomplete(vec!["disk is not set".into()]).exit_code(),
            2
        );
        assert_eq!(
            InstallerError::Capacity(CapacityError::Exceeded {
                role: crate::planner::PartitionRole::Root,
                end_mib: 10,
                capacity_mib: 5,
            })
            .exit_code(),
            3
        );
        assert_eq!(InstallerError::Precondition("no root".into()).exit_code(), 4);

        let failure = InstallerError::StageFailure {
            stage: "Formatting",
            source: Box::new(InstallerError::CommandFailed {
                program: "mkfs.ext4".into(),
                code: 1,
                detail: String::new(),
            }),
        };
        assert_eq!(failure.exit_code(), 1);
        assert!(failure.to_string().contains("Formatting"));
        assert!(failure.to_string().contains("mkfs.ext4"));
    }

    #[test]
    fn interrupt_names_the_boundary_it_stopped_at() {
        let early = InstallerError::Interrupted { after: None };
        assert_eq!(early.exit_code(), 130);
        assert_eq!(
            early.to_string(),
            "Installation interrupted by operator before Partitioning"
        );

        let late = InstallerError::Interrupted { after: Some("Mounting") };
        assert_eq!(late.exit_code(), 130);
        assert_eq!(
            late.to_string(),
            "Installation interrupted by operator after stage 'Mounting' completed"
        );
        assert!(!late.to_string().contains("failed"));
    }
}
