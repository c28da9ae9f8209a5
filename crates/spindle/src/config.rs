/// Describes what a fresh global scope contains. Built per call, never shared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalsConfig {
    /// Install the full standard library (`Date`, `JSON`, `Promise`, ...).
    /// When `false` only the base intrinsics plus `eval` and typed arrays are
    /// available, and date values cannot be marshaled.
    pub standard_library: bool,
    /// Global name under which the whole params mapping is also exposed.
    pub params_name: Option<String>,
    /// Evaluate scripts in strict mode.
    pub strict: bool,
}

impl GlobalsConfig {
    pub const DEFAULT_PARAMS_NAME: &'static str = "params";

    #[must_use]
    pub const fn standard_library(mut self, enabled: bool) -> Self {
        self.standard_library = enabled;
        self
    }

    #[must_use]
    pub fn params_name(mut self, name: impl Into<String>) -> Self {
        self.params_name = Some(name.into());
        self
    }

    /// Only install the individual params keys as globals.
    #[must_use]
    pub fn without_params_name(mut self) -> Self {
        self.params_name = None;
        self
    }

    #[must_use]
    pub const fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl Default for GlobalsConfig {
    fn default() -> Self {
        Self {
            standard_library: true,
            params_name: Some(Self::DEFAULT_PARAMS_NAME.to_string()),
            strict: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextConfig {
    /// Heap limit for the runtime, in bytes.
    pub memory_limit: usize,
    /// Interpreter stack limit, in bytes.
    pub max_stack_size: usize,
    /// Maximum container nesting accepted by the marshaler.
    pub max_depth: usize,
    pub globals: GlobalsConfig,
}

impl ContextConfig {
    pub const DEFAULT_MEMORY_LIMIT: usize = 32 * 1024 * 1024;
    pub const DEFAULT_MAX_STACK_SIZE: usize = 1024 * 1024;
    pub const DEFAULT_MAX_DEPTH: usize = 128;

    #[must_use]
    pub const fn memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    #[must_use]
    pub const fn max_stack_size(mut self, bytes: usize) -> Self {
        self.max_stack_size = bytes;
        self
    }

    #[must_use]
    pub const fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    #[must_use]
    pub fn globals(mut self, globals: GlobalsConfig) -> Self {
        self.globals = globals;
        self
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            memory_limit: Self::DEFAULT_MEMORY_LIMIT,
            max_stack_size: Self::DEFAULT_MAX_STACK_SIZE,
            max_depth: Self::DEFAULT_MAX_DEPTH,
            globals: GlobalsConfig::default(),
        }
    }
}
