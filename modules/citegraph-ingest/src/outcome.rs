//! Process exit status shared by every subcommand.
//!
//! Calling automation keys off these codes, so they are fixed: "nothing to
//! do" must stay distinguishable from "failed" and from "finished with
//! failures left for inspection".

use std::fmt;
use std::process::ExitCode;

use citegraph_common::CiteGraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Failed,
    ConfigError,
    NoWork,
    PartialFailure,
}

impl RunStatus {
    pub fn code(self) -> u8 {
        match self {
            RunStatus::Completed => 0,
            RunStatus::Failed => 1,
            RunStatus::ConfigError => 2,
            RunStatus::NoWork => 3,
            RunStatus::PartialFailure => 4,
        }
    }

    pub fn exit_code(self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Aggregate the status of consecutive stages. The more severe status
    /// wins; the result is `NoWork` only if both stages had nothing to do.
    pub fn combine(self, other: RunStatus) -> RunStatus {
        if self.severity() >= other.severity() {
            self
        } else {
            other
        }
    }

    /// Configuration problems are fatal and distinct; everything else that
    /// escapes a stage as an error is a hard failure.
    pub fn from_error(err: &anyhow::Error) -> RunStatus {
        match err.downcast_ref::<CiteGraphError>() {
            Some(e) if e.is_config() => RunStatus::ConfigError,
            _ => RunStatus::Failed,
        }
    }

    fn severity(self) -> u8 {
        match self {
            RunStatus::NoWork => 0,
            RunStatus::Completed => 1,
            RunStatus::PartialFailure => 2,
            RunStatus::Failed => 3,
            RunStatus::ConfigError => 4,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::ConfigError => "config_error",
            RunStatus::NoWork => "no_work",
            RunStatus::PartialFailure => "partial_failure",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(RunStatus::Completed.code(), 0);
        assert_eq!(RunStatus::Failed.code(), 1);
        assert_eq!(RunStatus::ConfigError.code(), 2);
        assert_eq!(RunStatus::NoWork.code(), 3);
        assert_eq!(RunStatus::PartialFailure.code(), 4);
    }

    #[test]
    fn combine_keeps_the_most_severe() {
        use RunStatus::*;
        assert_eq!(NoWork.combine(NoWork), NoWork);
        assert_eq!(NoWork.combine(Completed), Completed);
        assert_eq!(Completed.combine(PartialFailure), PartialFailure);
        assert_eq!(PartialFailure.combine(Failed), Failed);
        assert_eq!(Failed.combine(NoWork), Failed);
    }

    #[test]
    fn config_errors_are_told_apart_from_failures() {
        let config = anyhow::Error::new(CiteGraphError::Config("missing NEO4J_URI".into()));
        assert_eq!(RunStatus::from_error(&config), RunStatus::ConfigError);

        let io = anyhow::Error::new(CiteGraphError::Io(std::io::Error::other("disk full")));
        assert_eq!(RunStatus::from_error(&io), RunStatus::Failed);

        let wrapped = anyhow::Error::new(CiteGraphError::Config("bad".into())).context("loading crawl state");
        assert_eq!(RunStatus::from_error(&wrapped), RunStatus::ConfigError);
    }
}
