//! Startup error taxonomy.
//!
//! Everything in the crate returns `anyhow::Result`. The few failures that must
//! abort the process before the stream loop starts are raised as a
//! `StartupError` so the binary can recover the kind with `downcast_ref` and
//! pick an exit code.

/// Which startup stage failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartupErrorKind {
    /// Missing or invalid model weights path, or an invalid option value.
    Configuration,
    /// The frame source could not be opened.
    SourceOpen,
}

impl StartupErrorKind {
    fn code(self) -> &'static str {
        match self {
            StartupErrorKind::Configuration => "configuration error",
            StartupErrorKind::SourceOpen => "source open error",
        }
    }
}

#[derive(Clone, Debug)]
pub struct StartupError {
    pub kind: StartupErrorKind,
    pub message: String,
}

impl StartupError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self {
            kind: StartupErrorKind::Configuration,
            message: message.into(),
        }
    }

    pub fn source_open(message: impl Into<String>) -> Self {
        Self {
            kind: StartupErrorKind::SourceOpen,
            message: message.into(),
        }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self.kind {
            StartupErrorKind::Configuration => 2,
            StartupErrorKind::SourceOpen => 3,
        }
    }
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for StartupError {}

/// Exit code for an arbitrary startup failure.
///
/// Looks through the anyhow chain for a `StartupError`; anything else maps to 1.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<StartupError>())
        .map(StartupError::exit_code)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn exit_code_survives_context_wrapping() {
        let err: anyhow::Result<()> = Err(StartupError::source_open("no camera 3").into());
        let err = err.context("opening frame source").unwrap_err();
        assert_eq!(exit_code_for(&err), 3);
    }

    #[test]
    fn unknown_errors_map_to_one() {
        let err = anyhow::anyhow!("boom");
        assert_eq!(exit_code_for(&err), 1);
    }

    #[test]
    fn display_names_the_stage() {
        let err = StartupError::configuration("model file not found at 'best.onnx'");
        assert_eq!(
            err.to_string(),
            "configuration error: model file not found at 'best.onnx'"
        );
    }
}
