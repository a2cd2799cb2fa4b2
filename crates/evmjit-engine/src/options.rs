//! Runtime options applied with `evm_set_option`.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CacheMode {
    #[default]
    On,
    Off,
    ReadOnly,
}

impl CacheMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheMode::On => "on",
            CacheMode::Off => "off",
            CacheMode::ReadOnly => "read-only",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "on" => Some(CacheMode::On),
            "off" => Some(CacheMode::Off),
            "read-only" => Some(CacheMode::ReadOnly),
            _ => None,
        }
    }

    pub fn reads(self) -> bool {
        !matches!(self, CacheMode::Off)
    }

    pub fn writes(self) -> bool {
        matches!(self, CacheMode::On)
    }
}

pub const DEFAULT_MAX_CALL_DEPTH: u32 = 1024;

pub const OPT_CACHE: &str = "cache";
pub const OPT_MAX_CALL_DEPTH: &str = "max-call-depth";
pub const OPT_CLEAR_CACHE: &str = "clear-cache";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Options {
    pub cache: CacheMode,
    pub max_call_depth: u32,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            cache: CacheMode::On,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionError {
    UnknownName(String),
    InvalidValue { name: &'static str, value: String },
}

impl std::fmt::Display for OptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionError::UnknownName(name) => write!(f, "unknown option {name:?}"),
            OptionError::InvalidValue { name, value } => {
                write!(f, "invalid value {value:?} for option {name}")
            }
        }
    }
}

impl std::error::Error for OptionError {}

impl Options {
    /// Applies one stored option. Leaves `self` untouched on error.
    /// `clear-cache` is an action rather than a setting and is handled by
    /// the engine.
    pub fn apply(&mut self, name: &str, value: &str) -> Result<(), OptionError> {
        match name {
            OPT_CACHE => {
                self.cache = CacheMode::parse(value).ok_or_else(|| OptionError::InvalidValue {
                    name: OPT_CACHE,
                    value: value.to_string(),
                })?;
            }
            OPT_MAX_CALL_DEPTH => {
                self.max_call_depth = value
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|d| (1..=DEFAULT_MAX_CALL_DEPTH).contains(d))
                    .ok_or_else(|| OptionError::InvalidValue {
                        name: OPT_MAX_CALL_DEPTH,
                        value: value.to_string(),
                    })?;
            }
            _ => return Err(OptionError::UnknownName(name.to_string())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_fail_without_side_effects() {
        let mut opts = Options::default();
        let err = opts.apply("hello", "world").unwrap_err();
        assert_eq!(err, OptionError::UnknownName("hello".to_string()));
        assert_eq!(opts, Options::default());
    }

    #[test]
    fn bad_values_leave_options_alone() {
        let mut opts = Options::default();
        assert!(opts.apply(OPT_CACHE, "sometimes").is_err());
        assert!(opts.apply(OPT_MAX_CALL_DEPTH, "0").is_err());
        assert!(opts.apply(OPT_MAX_CALL_DEPTH, "1025").is_err());
        assert!(opts.apply(OPT_MAX_CALL_DEPTH, "deep").is_err());
        assert_eq!(opts, Options::default());
    }

    #[test]
    fn recognised_options_apply() {
        let mut opts = Options::default();
        opts.apply(OPT_CACHE, "read-only").unwrap();
        opts.apply(OPT_MAX_CALL_DEPTH, "16").unwrap();
        assert_eq!(opts.cache, CacheMode::ReadOnly);
        assert_eq!(opts.max_call_depth, 16);
        assert!(opts.cache.reads());
        assert!(!opts.cache.writes());
    }

    #[test]
    fn cache_modes_round_trip() {
        for mode in [CacheMode::On, CacheMode::Off, CacheMode::ReadOnly] {
            assert_eq!(CacheMode::parse(mode.as_str()), Some(mode));
        }
    }
}
