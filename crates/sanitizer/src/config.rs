use serde::Deserialize;

/// Resource limits for the sanitizer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Maximum input length in bytes
    pub max_input_length: usize,
    /// Maximum depth of open elements
    pub max_nesting_depth: usize,
    /// Maximum number of attributes on a single tag
    pub max_attributes: usize,
    /// Maximum number of script removal passes per call
    pub max_script_passes: usize,
    /// Maximum number of filter rounds per call
    pub max_filter_rounds: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_input_length: 10 * 1024 * 1024, // 10MB, well above any mail body we render
            max_nesting_depth: 256,
            max_attributes: 256,
            max_script_passes: 16,
            max_filter_rounds: 4,
        }
    }
}

impl SanitizerConfig {
    /// Check an input length against the configured ceiling
    pub fn accepts_length(&self, length: usize) -> bool {
        length <= self.max_input_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SanitizerConfig::default();
        assert_eq!(config.max_input_length, 10 * 1024 * 1024);
        assert_eq!(config.max_nesting_depth, 256);
        assert_eq!(config.max_attributes, 256);
        assert_eq!(config.max_script_passes, 16);
        assert_eq!(config.max_filter_rounds, 4);
        assert!(config.accepts_length(1024));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SanitizerConfig =
            serde_json::from_str(r#"{ "max_input_length": 64, "max_script_passes": 4 }"#).unwrap();
        assert_eq!(config.max_input_length, 64);
        assert_eq!(config.max_script_passes, 4);
        assert_eq!(config.max_nesting_depth, 256);
        assert!(!config.accepts_length(65));
    }
}
