//! Container errors.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContainerError {
    #[error("Dependency not found: {0}")]
    NotFound(&'static str),

    #[error("Wrong dependency type: {0}")]
    TypeMismatch(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = ContainerError::NotFound("app::Database");
        assert_eq!(err.to_string(), "Dependency not found: app::Database");
    }

    #[test]
    fn test_type_mismatch_error() {
        let err = ContainerError::TypeMismatch("u32");
        assert!(err.to_string().contains("Wrong dependency type"));
    }
}
