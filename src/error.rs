//! Errors reported by runtime module loading
//!
//! Only load-time failures are recoverable. Broken invariants inside a
//! module (out-of-range slots, double template insertion) are assertions,
//! since a correctly generated bytecode unit cannot trigger them.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Recoverable failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Two static CommonJS entries claim the same module id, either inside
    /// one unit or against an entry already registered in the domain.
    #[error("duplicate CommonJS module id {0}")]
    DuplicateModuleId(u32),

    /// Two dynamic CommonJS entries share the same filename.
    #[error("duplicate CommonJS module '{0}'")]
    DuplicateModuleName(String),

    /// A CommonJS entry names a function the unit does not contain.
    #[error("CommonJS module {module} refers to function {function} of {count}")]
    ModuleFunctionOutOfRange {
        module: u32,
        function: u32,
        count: u32,
    },

    /// The owning domain of a module was collected.
    #[error("runtime module is not attached to a live domain")]
    DomainCollected,

    /// The external compiler could not produce a body for a lazy function.
    #[error("lazy compilation failed: {0}")]
    LazyCompilation(String),

    /// Malformed textual bytecode unit.
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::DuplicateModuleId(3).to_string(),
            "duplicate CommonJS module id 3"
        );
        assert_eq!(
            Error::DuplicateModuleName("a.js".into()).to_string(),
            "duplicate CommonJS module 'a.js'"
        );
        let err = Error::ModuleFunctionOutOfRange {
            module: 1,
            function: 9,
            count: 2,
        };
        assert!(err.to_string().contains("function 9"));
        let err = Error::Syntax {
            line: 4,
            message: "unknown directive".into(),
        };
        assert_eq!(err.to_string(), "line 4: unknown directive");
    }
}
