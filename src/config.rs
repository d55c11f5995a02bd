//! Interpreter configuration.

/// Default cap on nested evaluations.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 1000;

/// Default native-stack budget for one top-level evaluation.
pub const DEFAULT_STACK_LIMIT_BYTES: usize = 1024 * 1024;

/// Configuration for an [`Interp`](crate::Interp).
#[derive(Debug, Clone)]
pub struct InterpConfig {
    /// Maximum nesting depth of evaluations before `RecursionLimit` is raised.
    pub max_nesting_depth: usize,

    /// How much native stack one top-level evaluation may consume.
    ///
    /// The engine measures stack use from the entry of the top-level
    /// evaluation and raises `RecursionLimit` when this budget is spent, even
    /// if the nesting depth is still below its maximum.
    pub stack_limit_bytes: usize,

    /// Let `break`, `continue` and custom codes escape a top-level evaluation
    /// instead of converting them into errors.
    pub allow_exceptions: bool,

    /// Name of the fallback command invoked for unresolved command names.
    pub unknown_command: String,

    /// Maximum number of dispatched commands; `None` disables the limit.
    pub command_limit: Option<u64>,

    /// Register the built-in command set on creation.
    pub builtins: bool,
}

impl Default for InterpConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            stack_limit_bytes: DEFAULT_STACK_LIMIT_BYTES,
            allow_exceptions: false,
            unknown_command: "::unknown".to_string(),
            command_limit: None,
            builtins: true,
        }
    }
}

impl InterpConfig {
    /// A config without built-in commands: the interpreter starts with empty
    /// command tables.
    pub fn bare() -> Self {
        Self {
            builtins: false,
            ..Self::default()
        }
    }

    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    pub fn with_stack_limit_bytes(mut self, bytes: usize) -> Self {
        self.stack_limit_bytes = bytes;
        self
    }

    pub fn with_allow_exceptions(mut self, allow: bool) -> Self {
        self.allow_exceptions = allow;
        self
    }

    pub fn with_unknown_command(mut self, name: impl Into<String>) -> Self {
        self.unknown_command = name.into();
        self
    }

    pub fn with_command_limit(mut self, limit: u64) -> Self {
        self.command_limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = InterpConfig::default();
        assert_eq!(config.max_nesting_depth, 1000);
        assert_eq!(config.stack_limit_bytes, DEFAULT_STACK_LIMIT_BYTES);
        assert_eq!(config.unknown_command, "::unknown");
        assert!(config.builtins);
        assert!(!config.allow_exceptions);
        assert_eq!(config.command_limit, None);
    }

    #[test]
    fn test_builders() {
        let config = InterpConfig::bare()
            .with_max_nesting_depth(10)
            .with_command_limit(5)
            .with_stack_limit_bytes(64 * 1024)
            .with_unknown_command("::fallback");
        assert!(!config.builtins);
        assert_eq!(config.max_nesting_depth, 10);
        assert_eq!(config.command_limit, Some(5));
        assert_eq!(config.stack_limit_bytes, 64 * 1024);
        assert_eq!(config.unknown_command, "::fallback");
    }
}
