pub type SimexResult<T> = Result<T, SimexError>;

/// What went wrong, at the granularity the command line reports as exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimexErrorCategory {
    /// Bad run configuration or parameters.
    Input,
    /// Missing files, unwritable directories, programs that cannot start.
    Io,
    /// A backengine failed or produced unusable output.
    Computation,
    Internal,
}

impl SimexErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Input => 2,
            Self::Io => 3,
            Self::Computation => 4,
            Self::Internal => 5,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Io => "io",
            Self::Computation => "computation",
            Self::Internal => "internal",
        }
    }
}

/// Error shared by every calculator stage.
///
/// The placeholder is a stable dotted identifier (`INPUT.*`, `IO.*`, `RUN.*`,
/// `SYS.*`) that tests and the command line match on; the message is free text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} error [{placeholder}] {message}", .category.label())]
pub struct SimexError {
    category: SimexErrorCategory,
    placeholder: &'static str,
    message: String,
}

impl SimexError {
    pub fn new(
        category: SimexErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
        }
    }

    pub fn input_validation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(SimexErrorCategory::Input, placeholder, message)
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(SimexErrorCategory::Io, placeholder, message)
    }

    pub fn computation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(SimexErrorCategory::Computation, placeholder, message)
    }

    pub fn internal(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(SimexErrorCategory::Internal, placeholder, message)
    }

    pub const fn category(&self) -> SimexErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        format!("ERROR: [{}] {}", self.placeholder, self.message)
    }

    pub fn fatal_exit_line(&self) -> String {
        format!("FATAL EXIT CODE: {}", self.exit_code())
    }
}

#[cfg(test)]
mod tests {
    use super::{SimexError, SimexErrorCategory};

    #[test]
    fn categories_map_to_exit_codes() {
        assert_eq!(SimexErrorCategory::Input.exit_code(), 2);
        assert_eq!(SimexErrorCategory::Io.exit_code(), 3);
        assert_eq!(SimexErrorCategory::Computation.exit_code(), 4);
        assert_eq!(SimexErrorCategory::Internal.exit_code(), 5);
        assert_eq!(
            SimexError::internal("SYS.H5_LAYOUT", "conflict").category(),
            SimexErrorCategory::Internal
        );
    }

    #[test]
    fn errors_render_diagnostic_lines() {
        let error = SimexError::input_validation(
            "INPUT.PARAMETER_VALUE",
            "parameter 'number_of_layers' must be between 2 and 5, got 6",
        );

        assert_eq!(error.exit_code(), 2);
        assert_eq!(
            error.diagnostic_line(),
            "ERROR: [INPUT.PARAMETER_VALUE] parameter 'number_of_layers' must be between 2 and 5, got 6"
        );
        assert_eq!(error.fatal_exit_line(), "FATAL EXIT CODE: 2");
    }

    #[test]
    fn display_names_the_category() {
        let error = SimexError::computation("RUN.XRTS_BACKENGINE", "xrs wrote to stderr");
        assert_eq!(
            error.to_string(),
            "computation error [RUN.XRTS_BACKENGINE] xrs wrote to stderr"
        );
    }
}
