//! Tool-directive protocol embedded in assistant replies
//!
//! The assistant ends a reply with a bracketed tag of the form
//! `[[TOOLS:TRUE][<request>]]` when it wants the delegated agent to act, or
//! `[[TOOLS:FALSE][...]]` when it does not. This module turns that free-text
//! convention into a [`ToolDirective`].

mod directive;

pub use directive::{DirectiveCodec, Extraction, HideToggle, ToolDirective, encode};
