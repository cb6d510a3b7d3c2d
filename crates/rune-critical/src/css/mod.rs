//! Stylesheet model: parsing, serialization, traversal and the selector and
//! media helpers used while reducing a sheet to its critical subset.

mod ast;
mod media;
mod parser;
mod selector;
mod serializer;
mod walker;

pub use ast::{AtRule, Comment, Declaration, Node, Rule, Stylesheet};
pub use media::is_valid_media_query;
pub use parser::parse_stylesheet;
pub use selector::{SelectorCache, is_always_matching, normalize_selector};
pub use serializer::{SerializeOptions, serialize_stylesheet};
pub use walker::{
    DirectiveState, MirrorVerdict, Verdict, holds_rules, mark_only, walk_rules,
    walk_rules_mirrored,
};
