//! Critical CSS inlining for pre-rendered HTML.
//!
//! [`Inliner`] finds the rules a document actually uses, inlines them into
//! `<style>` elements and defers the full stylesheets.

pub mod css;
pub mod dom;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod inliner;
pub mod options;
pub mod paths;
pub mod preload;

pub use dom::{Document, SelectorOracle};
pub use engine::{CriticalEngine, Reduction};
pub use error::{CriticalError, ParseError, Result};
pub use hooks::{DefaultHooks, StyleHooks, StyleSource, StyleUnit};
pub use inliner::{Inliner, format_size};
pub use options::{AllowRule, CriticalOptions, KeyframesMode, PreloadMode};
