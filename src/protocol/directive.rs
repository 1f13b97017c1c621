//! Directive codec
//!
//! Parses and serializes `[[TOOLS:<BOOL>][<PAYLOAD>]]` tags. The codec is pure
//! apart from logging; the only shared state it reads is the hide toggle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

/// Boolean token is case-sensitive; payload is non-greedy and may span lines.
/// A payload containing `]]` ends at the first occurrence.
static RE_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\[\[TOOLS:(TRUE|FALSE)\]\[(.*?)\]\]").expect("valid regex")
});

/// Tool directive carried by one assistant reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolDirective {
    pub active: bool,
    pub payload: String,
}

impl ToolDirective {
    pub fn new(active: bool, payload: impl Into<String>) -> Self {
        Self {
            active,
            payload: payload.into(),
        }
    }

    /// Directive used when the reply carries no tag
    pub fn inactive() -> Self {
        Self::default()
    }
}

/// Result of running the codec over a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Text to show the user (tag removed when hiding is on)
    pub cleaned: String,
    pub directive: ToolDirective,
}

/// Runtime switch deciding whether directive tags are stripped from replies
///
/// Clones share the same flag, so a front end can flip it while sessions keep
/// extracting.
#[derive(Debug, Clone, Default)]
pub struct HideToggle(Arc<AtomicBool>);

impl HideToggle {
    pub fn new(hide: bool) -> Self {
        Self(Arc::new(AtomicBool::new(hide)))
    }

    pub fn set(&self, hide: bool) {
        self.0.store(hide, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Extracts directives from assistant text
#[derive(Debug, Clone, Default)]
pub struct DirectiveCodec {
    hide: HideToggle,
}

impl DirectiveCodec {
    pub fn new(hide: HideToggle) -> Self {
        Self { hide }
    }

    pub fn hide_toggle(&self) -> &HideToggle {
        &self.hide
    }

    /// Find the first directive in `text`
    ///
    /// A reply without a tag is the common case and yields the original text
    /// with an inactive directive.
    pub fn extract(&self, text: &str) -> Extraction {
        let Some(caps) = RE_DIRECTIVE.captures(text) else {
            warn!("No tool directive found in reply");
            return Extraction {
                cleaned: text.to_string(),
                directive: ToolDirective::inactive(),
            };
        };

        let active = &caps[1] == "TRUE";
        let payload = caps[2].to_string();
        info!(active, payload = %payload, "Extracted tool directive");

        let cleaned = if self.hide.is_enabled() {
            RE_DIRECTIVE.replace_all(text, "").trim().to_string()
        } else {
            text.to_string()
        };

        Extraction {
            cleaned,
            directive: ToolDirective { active, payload },
        }
    }
}

/// Serialize a directive into the literal tag grammar
pub fn encode(directive: &ToolDirective) -> String {
    let flag = if directive.active { "TRUE" } else { "FALSE" };
    format!("[[TOOLS:{}][{}]]", flag, directive.payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(hide: bool) -> DirectiveCodec {
        DirectiveCodec::new(HideToggle::new(hide))
    }

    #[test]
    fn test_extract_active_directive() {
        let out = codec(false).extract("我来查一下。[[TOOLS:TRUE][搜索特斯拉最新财报]]");
        assert!(out.directive.active);
        assert_eq!(out.directive.payload, "搜索特斯拉最新财报");
        assert_eq!(out.cleaned, "我来查一下。[[TOOLS:TRUE][搜索特斯拉最新财报]]");
    }

    #[test]
    fn test_extract_inactive_directive() {
        let out = codec(false).extract("不需要搜索。[[TOOLS:FALSE][无]]");
        assert!(!out.directive.active);
        assert_eq!(out.directive.payload, "无");
    }

    #[test]
    fn test_payload_spans_lines() {
        let text = "ok [[TOOLS:TRUE][step one\nstep two\n]] done";
        let out = codec(false).extract(text);
        assert!(out.directive.active);
        assert_eq!(out.directive.payload, "step one\nstep two\n");
    }

    #[test]
    fn test_no_match_returns_input() {
        let text = "A plain answer about EBITDA.";
        let out = codec(true).extract(text);
        assert_eq!(out.cleaned, text);
        assert_eq!(out.directive, ToolDirective::inactive());
    }

    #[test]
    fn test_boolean_token_is_case_sensitive() {
        let out = codec(false).extract("[[TOOLS:true][lowercase]]");
        assert!(!out.directive.active);
        assert_eq!(out.directive.payload, "");
    }

    #[test]
    fn test_first_match_wins() {
        let out = codec(false).extract("[[TOOLS:FALSE][a]] then [[TOOLS:TRUE][b]]");
        assert!(!out.directive.active);
        assert_eq!(out.directive.payload, "a");
    }

    #[test]
    fn test_nested_brackets_end_at_first_close() {
        let out = codec(false).extract("[[TOOLS:TRUE][open [x]] tail]]");
        assert_eq!(out.directive.payload, "open [x");
    }

    #[test]
    fn test_hide_mode_strips_and_trims() {
        let out = codec(true).extract("Sure. [[TOOLS:TRUE][download X]]\n");
        assert_eq!(out.cleaned, "Sure.");
        assert!(out.directive.active);
        assert_eq!(out.directive.payload, "download X");
    }

    #[test]
    fn test_hidden_directive_cannot_be_reextracted() {
        let c = codec(true);
        let first = c.extract("x [[TOOLS:TRUE][p]] y [[TOOLS:FALSE][q]]");
        let second = c.extract(&first.cleaned);
        assert!(!second.directive.active);
        assert_eq!(second.cleaned, first.cleaned);
    }

    #[test]
    fn test_toggle_is_read_per_call() {
        let toggle = HideToggle::new(false);
        let c = DirectiveCodec::new(toggle.clone());
        let text = "a[[TOOLS:TRUE][b]]";
        assert_eq!(c.extract(text).cleaned, text);

        toggle.set(true);
        assert_eq!(c.extract(text).cleaned, "a");
    }

    #[test]
    fn test_encode_matches_grammar() {
        let d = ToolDirective::new(true, "下载 Attention is All You Need");
        let tag = encode(&d);
        assert_eq!(tag, "[[TOOLS:TRUE][下载 Attention is All You Need]]");
        assert_eq!(codec(false).extract(&tag).directive, d);
    }
}
