use std::path::{Path, PathBuf};

/// Value attached to a named renderer option.
///
/// `Flag(true)` emits a bare `--name`; `Flag(false)` and empty text are
/// skipped entirely, matching the "absent" case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Flag(bool),
    Text(String),
}

impl OptionValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Flag(enabled) => !enabled,
            Self::Text(value) => value.is_empty(),
        }
    }
}

/// Insertion-ordered option map.
///
/// Overwriting an existing key keeps its original position, so repeated
/// merges stay deterministic: same inputs, same token sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionMap {
    entries: Vec<(String, OptionValue)>,
}

impl OptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: OptionValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Key-by-key merge: entries from `overrides` overwrite matching keys in
    /// place and append otherwise.
    pub fn merge(&mut self, overrides: OptionMap) {
        for (name, value) in overrides.entries {
            self.set(name, value);
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }
}

impl<N: Into<String>, const LEN: usize> From<[(N, OptionValue); LEN]> for OptionMap {
    fn from(entries: [(N, OptionValue); LEN]) -> Self {
        let mut map = Self::new();
        for (name, value) in entries {
            map.set(name, value);
        }
        map
    }
}

/// Resolved invocation parameters for one render call: the renderer binary
/// plus its named options. Built fresh per call, never shared.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub binary: PathBuf,
    pub options: OptionMap,
}

impl RenderConfig {
    pub fn new(binary: impl Into<PathBuf>, options: OptionMap) -> Self {
        Self {
            binary: binary.into(),
            options,
        }
    }

    /// Translate the config into argv tokens: the binary path followed by
    /// flags in insertion order. Every option value becomes its own argv
    /// entry; tokens are never joined into a shell string, so a value
    /// containing shell metacharacters stays a single inert argument.
    pub fn tokens(&self) -> Vec<String> {
        let mut tokens = vec![self.binary.to_string_lossy().into_owned()];
        for (name, value) in self.options.iter() {
            if value.is_empty() {
                continue;
            }
            match value {
                OptionValue::Flag(_) => tokens.push(format!("--{name}")),
                OptionValue::Text(text) => {
                    tokens.push(format!("--{name}"));
                    tokens.push(text.clone());
                }
            }
        }
        tokens
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_binary_then_flags_in_insertion_order() {
        let config = RenderConfig::new(
            "/usr/bin/wkhtmltopdf",
            OptionMap::from([
                ("orientation", OptionValue::text("Landscape")),
                ("quiet", OptionValue::Flag(true)),
                ("encoding", OptionValue::text("UTF-8")),
            ]),
        );

        assert_eq!(
            config.tokens(),
            vec![
                "/usr/bin/wkhtmltopdf",
                "--orientation",
                "Landscape",
                "--quiet",
                "--encoding",
                "UTF-8",
            ]
        );
    }

    #[test]
    fn skips_absent_and_disabled_options() {
        let config = RenderConfig::new(
            "render",
            OptionMap::from([
                ("title", OptionValue::text("")),
                ("grayscale", OptionValue::Flag(false)),
                ("dpi", OptionValue::text("300")),
            ]),
        );

        assert_eq!(config.tokens(), vec!["render", "--dpi", "300"]);
    }

    #[test]
    fn metacharacter_values_stay_single_tokens() {
        let hostile = "; rm -rf / #";
        let config = RenderConfig::new(
            "render",
            OptionMap::from([("title", OptionValue::text(hostile))]),
        );

        let tokens = config.tokens();
        assert_eq!(tokens, vec!["render", "--title", hostile]);
        // The hostile value is exactly one argv element, untouched.
        assert_eq!(tokens.iter().filter(|t| t.contains("rm -rf")).count(), 1);
    }

    #[test]
    fn building_twice_is_idempotent() {
        let config = RenderConfig::new(
            "render",
            OptionMap::from([
                ("b", OptionValue::text("2")),
                ("a", OptionValue::text("1")),
            ]),
        );

        assert_eq!(config.tokens(), config.tokens());
    }

    #[test]
    fn merge_overwrites_in_place_and_appends_new_keys() {
        let mut options = OptionMap::from([
            ("orientation", OptionValue::text("Portrait")),
            ("quiet", OptionValue::Flag(true)),
        ]);
        options.merge(OptionMap::from([
            ("orientation", OptionValue::text("Landscape")),
            ("dpi", OptionValue::text("300")),
        ]));

        let config = RenderConfig::new("render", options);
        assert_eq!(
            config.tokens(),
            vec![
                "render",
                "--orientation",
                "Landscape",
                "--quiet",
                "--dpi",
                "300",
            ]
        );
    }
}
