//! Options controlling how critical CSS is extracted and how the remaining
//! stylesheet is deferred.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// DOM rewrite recipe applied to a `<link rel="stylesheet">` once its
/// critical rules have been inlined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreloadMode {
    /// Leave the link untouched.
    Disabled,
    /// Move the link to the end of `<body>`.
    Body,
    /// Preload the sheet and apply it from an injected script.
    Js,
    /// Like `Js`, but the sheet stays on `media=print` until it has loaded.
    JsLazy,
    /// `media=print` plus an `onload` handler restoring the real media.
    Media,
    /// `rel=preload` that swaps to `rel=stylesheet` on load.
    Swap,
    /// `rel="alternate stylesheet"` swapped to `stylesheet` on load.
    SwapLow,
    /// `rel="alternate stylesheet preload"` swapped to `stylesheet` on load.
    SwapHigh,
    /// Preload in the head and append a regular copy of the link to `<body>`.
    #[default]
    Default,
}

impl PreloadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreloadMode::Disabled => "false",
            PreloadMode::Body => "body",
            PreloadMode::Js => "js",
            PreloadMode::JsLazy => "js-lazy",
            PreloadMode::Media => "media",
            PreloadMode::Swap => "swap",
            PreloadMode::SwapLow => "swap-low",
            PreloadMode::SwapHigh => "swap-high",
            PreloadMode::Default => "default",
        }
    }
}

impl std::str::FromStr for PreloadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "false" | "none" | "off" => Ok(PreloadMode::Disabled),
            "true" | "default" | "" => Ok(PreloadMode::Default),
            "body" => Ok(PreloadMode::Body),
            "js" => Ok(PreloadMode::Js),
            "js-lazy" => Ok(PreloadMode::JsLazy),
            "media" => Ok(PreloadMode::Media),
            "swap" => Ok(PreloadMode::Swap),
            "swap-low" => Ok(PreloadMode::SwapLow),
            "swap-high" => Ok(PreloadMode::SwapHigh),
            other => Err(format!("unknown preload mode '{other}'")),
        }
    }
}

impl fmt::Display for PreloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts either a boolean or a mode name.
#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrName {
    Bool(bool),
    Name(String),
}

impl<'de> Deserialize<'de> for PreloadMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match BoolOrName::deserialize(deserializer)? {
            BoolOrName::Bool(false) => Ok(PreloadMode::Disabled),
            BoolOrName::Bool(true) => Ok(PreloadMode::Default),
            BoolOrName::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl Serialize for PreloadMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            PreloadMode::Disabled => serializer.serialize_bool(false),
            other => serializer.serialize_str(other.as_str()),
        }
    }
}

/// Which `@keyframes` rules end up in the critical stylesheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyframesMode {
    /// Never inline keyframes.
    None,
    /// Inline keyframes referenced by critical rules.
    #[default]
    Critical,
    /// Inline every keyframes rule.
    All,
}

impl KeyframesMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyframesMode::None => "none",
            KeyframesMode::Critical => "critical",
            KeyframesMode::All => "all",
        }
    }
}

impl<'de> Deserialize<'de> for KeyframesMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match BoolOrName::deserialize(deserializer)? {
            BoolOrName::Bool(true) => Ok(KeyframesMode::All),
            BoolOrName::Bool(false) => Ok(KeyframesMode::None),
            BoolOrName::Name(name) => match name.as_str() {
                "none" => Ok(KeyframesMode::None),
                "critical" => Ok(KeyframesMode::Critical),
                "all" => Ok(KeyframesMode::All),
                other => Err(serde::de::Error::custom(format!(
                    "unknown keyframes mode '{other}'"
                ))),
            },
        }
    }
}

impl Serialize for KeyframesMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// A selector that is always kept, either verbatim or by pattern.
#[derive(Debug, Clone)]
pub enum AllowRule {
    Literal(String),
    Pattern(Regex),
}

impl AllowRule {
    /// Parse the config form: `/.../` is a regular expression, anything else
    /// a literal selector.
    pub fn parse(raw: &str) -> Result<Self, regex::Error> {
        if raw.len() >= 2 && raw.starts_with('/') && raw.ends_with('/') {
            Regex::new(&raw[1..raw.len() - 1]).map(AllowRule::Pattern)
        } else {
            Ok(AllowRule::Literal(raw.to_string()))
        }
    }

    pub fn matches(&self, selector: &str) -> bool {
        match self {
            AllowRule::Literal(literal) => literal == selector,
            AllowRule::Pattern(pattern) => pattern.is_match(selector),
        }
    }
}

impl Serialize for AllowRule {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            AllowRule::Literal(literal) => serializer.serialize_str(literal),
            AllowRule::Pattern(pattern) => {
                serializer.serialize_str(&format!("/{}/", pattern.as_str()))
            }
        }
    }
}

impl<'de> Deserialize<'de> for AllowRule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        AllowRule::parse(&raw).map_err(|e| {
            serde::de::Error::custom(format!("failed to parse regular expression. {e}"))
        })
    }
}

/// Top-level options for [`crate::Inliner`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CriticalOptions {
    /// Base directory stylesheets are resolved under. Nothing outside it is read.
    pub path: String,
    /// Public URL prefix stripped from hrefs before resolving under `path`.
    pub public_path: String,
    /// Inline whole stylesheets smaller than this many bytes (0 disables).
    pub inline_threshold: usize,
    /// Inline everything when the non-critical remainder would be smaller than
    /// this many bytes (0 disables).
    pub minimum_external_size: usize,
    /// Rewrite external stylesheets to hold only their non-critical rules.
    pub prune_source: bool,
    /// Merge all processed `<style>` elements into the first one.
    pub merge_stylesheets: bool,
    /// Extra stylesheets (paths or globs under `path`) added as inline styles.
    pub additional_stylesheets: Vec<String>,
    /// Process `<link rel="stylesheet">` elements.
    pub external: bool,
    /// Reduce `<style>` elements already present in the document.
    pub reduce_inline_styles: bool,
    pub preload: PreloadMode,
    /// Add a `<noscript>` fallback for script-dependent preload modes.
    pub noscript_fallback: bool,
    pub keyframes: KeyframesMode,
    /// Shorthand enabling font preloading, or disabling font inlining.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fonts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preload_fonts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_fonts: Option<bool>,
    /// Selectors kept regardless of whether the document uses them.
    pub allow_rules: Vec<AllowRule>,
    /// Minify the emitted stylesheets.
    pub compress: bool,
    /// Selector of the element used as matching scope. Defaults to the
    /// element carrying `data-beasties-container`, then the document element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

impl Default for CriticalOptions {
    fn default() -> Self {
        Self {
            path: String::new(),
            public_path: String::new(),
            inline_threshold: 0,
            minimum_external_size: 0,
            prune_source: false,
            merge_stylesheets: true,
            additional_stylesheets: Vec::new(),
            external: true,
            reduce_inline_styles: true,
            preload: PreloadMode::default(),
            noscript_fallback: true,
            keyframes: KeyframesMode::default(),
            fonts: None,
            preload_fonts: None,
            inline_fonts: None,
            allow_rules: Vec::new(),
            compress: true,
            container: None,
        }
    }
}

impl CriticalOptions {
    pub fn should_preload_fonts(&self) -> bool {
        self.fonts == Some(true) || self.preload_fonts == Some(true)
    }

    pub fn should_inline_fonts(&self) -> bool {
        self.fonts != Some(false) && self.inline_fonts == Some(true)
    }

    pub fn is_allowed(&self, selector: &str) -> bool {
        self.allow_rules.iter().any(|rule| rule.matches(selector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = CriticalOptions::default();
        assert!(options.merge_stylesheets);
        assert!(options.external);
        assert!(options.reduce_inline_styles);
        assert!(options.noscript_fallback);
        assert!(options.compress);
        assert_eq!(options.keyframes, KeyframesMode::Critical);
        assert_eq!(options.preload, PreloadMode::Default);
        assert!(!options.should_preload_fonts());
        assert!(!options.should_inline_fonts());
    }

    #[test]
    fn camel_case_json_with_boolean_aliases() {
        let options: CriticalOptions = serde_json::from_str(
            r#"{
                "path": "/var/www",
                "publicPath": "/static/",
                "preload": false,
                "keyframes": true,
                "inlineThreshold": 4096,
                "allowRules": [".keep", "/^\\.modal/"]
            }"#,
        )
        .unwrap();
        assert_eq!(options.path, "/var/www");
        assert_eq!(options.public_path, "/static/");
        assert_eq!(options.preload, PreloadMode::Disabled);
        assert_eq!(options.keyframes, KeyframesMode::All);
        assert_eq!(options.inline_threshold, 4096);
        assert!(options.is_allowed(".keep"));
        assert!(options.is_allowed(".modal-open"));
        assert!(!options.is_allowed(".keeper"));
    }

    #[test]
    fn preload_mode_names_parse() {
        for (name, mode) in [
            ("body", PreloadMode::Body),
            ("js", PreloadMode::Js),
            ("js-lazy", PreloadMode::JsLazy),
            ("media", PreloadMode::Media),
            ("swap", PreloadMode::Swap),
            ("swap-low", PreloadMode::SwapLow),
            ("swap-high", PreloadMode::SwapHigh),
        ] {
            assert_eq!(name.parse::<PreloadMode>().unwrap(), mode);
            assert_eq!(mode.as_str(), name);
        }
        assert!("sideways".parse::<PreloadMode>().is_err());
    }

    #[test]
    fn keyframes_false_means_none() {
        let mode: KeyframesMode = serde_json::from_str("false").unwrap();
        assert_eq!(mode, KeyframesMode::None);
        let mode: KeyframesMode = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(mode, KeyframesMode::Critical);
    }

    #[test]
    fn font_flags_combine() {
        let mut options = CriticalOptions::default();
        options.fonts = Some(true);
        assert!(options.should_preload_fonts());
        assert!(!options.should_inline_fonts());

        options.inline_fonts = Some(true);
        assert!(options.should_inline_fonts());

        options.fonts = Some(false);
        options.preload_fonts = Some(true);
        assert!(options.should_preload_fonts());
        assert!(!options.should_inline_fonts());
    }
}
