/// Broad failure category; each maps to a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Source unreachable, bad HTTP status, or missing required columns.
    Load,
    /// A requested field is absent from a record's schema.
    Normalize,
    /// Two aggregates could not be joined on (country, period).
    Merge,
    /// The caller asked for something the derived tables do not carry.
    Query,
    /// Writing an export file failed.
    Export,
    /// Terminal setup, drawing, or input failed.
    Terminal,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Load | ErrorKind::Query => 2,
            ErrorKind::Normalize | ErrorKind::Merge => 3,
            ErrorKind::Export | ErrorKind::Terminal => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    kind: ErrorKind,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn load(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Load, message)
    }

    pub fn normalize(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Normalize, message)
    }

    pub fn merge(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Merge, message)
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Query, message)
    }

    pub fn export(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Export, message)
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Terminal, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("kind", &self.kind)
            .field("exit_code", &self.exit_code())
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_kind() {
        assert_eq!(AppError::load("x").exit_code(), 2);
        assert_eq!(AppError::query("x").exit_code(), 2);
        assert_eq!(AppError::normalize("x").exit_code(), 3);
        assert_eq!(AppError::merge("x").exit_code(), 3);
        assert_eq!(AppError::terminal("x").exit_code(), 4);
    }

    #[test]
    fn display_is_the_message() {
        let err = AppError::load("Failed to fetch dataset");
        assert_eq!(err.to_string(), "Failed to fetch dataset");
        assert_eq!(err.kind(), ErrorKind::Load);
    }
}
