//! Declarative element queries.
//!
//! A [`CandidateQuery`] describes *how* to find elements (by ARIA role and
//! accessible name, by label, placeholder, visible text or CSS selector),
//! optionally scoped to another element and filtered by contained text. An
//! [`Element`] is the n-th match of a query. Neither holds a live handle: the
//! driver re-resolves them on every call, so a descriptor stays valid across
//! re-renders and simply stops matching once the node is gone.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Text matcher evaluated inside the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum TextPattern {
    /// Case-insensitive substring match.
    Contains(String),
    /// Case-sensitive match against the trimmed text.
    Exact(String),
    /// Case-insensitive regular expression. The source must be valid for both
    /// the `regex` crate and ECMAScript.
    Regex(String),
}

impl fmt::Display for TextPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextPattern::Contains(value) => write!(f, "~\"{value}\""),
            TextPattern::Exact(value) => write!(f, "\"{value}\""),
            TextPattern::Regex(source) => write!(f, "/{source}/i"),
        }
    }
}

/// Case-insensitive regular expression pattern.
pub fn re(source: impl Into<String>) -> TextPattern {
    TextPattern::Regex(source.into())
}

pub fn contains(value: impl Into<String>) -> TextPattern {
    TextPattern::Contains(value.into())
}

pub fn exact(value: impl Into<String>) -> TextPattern {
    TextPattern::Exact(value.into())
}

/// Lookup strategy of a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum By {
    Role {
        role: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<TextPattern>,
    },
    Label {
        pattern: TextPattern,
    },
    Placeholder {
        pattern: TextPattern,
    },
    Text {
        pattern: TextPattern,
    },
    Css {
        selector: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateQuery {
    pub by: By,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub within: Option<Box<Element>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_text: Option<TextPattern>,
}

impl CandidateQuery {
    pub fn new(by: By) -> Self {
        Self {
            by,
            within: None,
            has_text: None,
        }
    }

    /// Elements with an explicit or implicit ARIA `role` whose accessible name
    /// matches `name`.
    pub fn role(role: impl Into<String>, name: TextPattern) -> Self {
        Self::new(By::Role {
            role: role.into(),
            name: Some(name),
        })
    }

    /// Every element with the given role, whatever its name.
    pub fn role_any(role: impl Into<String>) -> Self {
        Self::new(By::Role {
            role: role.into(),
            name: None,
        })
    }

    /// Form controls whose label (or `aria-label`) matches.
    pub fn label(pattern: TextPattern) -> Self {
        Self::new(By::Label { pattern })
    }

    pub fn placeholder(pattern: TextPattern) -> Self {
        Self::new(By::Placeholder { pattern })
    }

    /// Innermost elements whose visible text matches.
    pub fn text(pattern: TextPattern) -> Self {
        Self::new(By::Text { pattern })
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(By::Css {
            selector: selector.into(),
        })
    }

    /// Restrict matches to descendants of `scope`.
    pub fn within(mut self, scope: Element) -> Self {
        self.within = Some(Box::new(scope));
        self
    }

    /// Keep only matches whose text content matches `pattern`.
    pub fn has_text(mut self, pattern: TextPattern) -> Self {
        self.has_text = Some(pattern);
        self
    }

    pub fn nth(&self, index: usize) -> Element {
        Element {
            query: self.clone(),
            index,
        }
    }

    pub fn first(&self) -> Element {
        self.nth(0)
    }
}

impl fmt::Display for CandidateQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scope) = &self.within {
            write!(f, "{scope} >> ")?;
        }
        match &self.by {
            By::Role { role, name: None } => write!(f, "role={role}")?,
            By::Role {
                role,
                name: Some(name),
            } => write!(f, "role={role}[name={name}]")?,
            By::Label { pattern } => write!(f, "label={pattern}")?,
            By::Placeholder { pattern } => write!(f, "placeholder={pattern}")?,
            By::Text { pattern } => write!(f, "text={pattern}")?,
            By::Css { selector } => write!(f, "css={selector}")?,
        }
        if let Some(pattern) = &self.has_text {
            write!(f, "[has-text={pattern}]")?;
        }
        Ok(())
    }
}

/// The `index`-th match of `query`, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Element {
    pub query: CandidateQuery,
    pub index: usize,
}

impl Element {
    pub fn query(&self) -> &CandidateQuery {
        &self.query
    }

    /// Shorthand for `query.within(self.clone())`.
    pub fn locate(&self, query: CandidateQuery) -> CandidateQuery {
        query.within(self.clone())
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.query, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_serializes_to_the_script_wire_shape() {
        let dialog = CandidateQuery::css("[role=\"dialog\"]").first();
        let query = CandidateQuery::role("button", re("continuar"))
            .within(dialog)
            .has_text(contains("Continuar"));

        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(
            value,
            json!({
                "by": {
                    "strategy": "role",
                    "role": "button",
                    "name": { "kind": "regex", "value": "continuar" }
                },
                "within": {
                    "query": { "by": { "strategy": "css", "selector": "[role=\"dialog\"]" } },
                    "index": 0
                },
                "hasText": { "kind": "contains", "value": "Continuar" }
            })
        );
    }

    #[test]
    fn display_reads_like_a_selector_chain() {
        let query = CandidateQuery::role_any("checkbox")
            .within(CandidateQuery::css("main").first());
        assert_eq!(query.nth(2).to_string(), "css=main#0 >> role=checkbox#2");

        let named = CandidateQuery::label(re("t[ií]tulo"));
        assert_eq!(named.to_string(), "label=/t[ií]tulo/i");
    }

    #[test]
    fn equal_descriptions_compare_equal() {
        let a = CandidateQuery::text(exact("Einstein")).first();
        let b = CandidateQuery::text(exact("Einstein")).nth(0);
        assert_eq!(a, b);
        assert_ne!(a, CandidateQuery::text(contains("Einstein")).first());
    }
}
