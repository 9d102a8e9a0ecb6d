use serde::{Deserialize, Serialize};

/// An attribute test inside a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// `@attr = value`
    Equals(String, String),
    /// `contains(@attr, value)`
    Contains(String, String),
    /// `@attr = value`, ignoring ASCII case
    EqualsIgnoreCase(String, String),
}

impl Condition {
    pub fn attribute(&self) -> &str {
        match self {
            Condition::Equals(attr, _)
            | Condition::Contains(attr, _)
            | Condition::EqualsIgnoreCase(attr, _) => attr,
        }
    }

    /// Evaluate against a concrete attribute value. A missing attribute
    /// never matches.
    pub fn matches(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        match self {
            Condition::Equals(_, expected) => actual == expected,
            Condition::Contains(_, needle) => actual.contains(needle.as_str()),
            Condition::EqualsIgnoreCase(_, expected) => actual.eq_ignore_ascii_case(expected),
        }
    }

    fn to_xpath(&self) -> String {
        match self {
            Condition::Equals(attr, value) => format!("@{attr}={}", xpath_literal(value)),
            Condition::Contains(attr, value) => {
                format!("contains(@{attr}, {})", xpath_literal(value))
            }
            Condition::EqualsIgnoreCase(attr, value) => format!(
                "translate(@{attr}, '{UPPER}', '{LOWER}')={}",
                xpath_literal(&value.to_ascii_lowercase())
            ),
        }
    }
}

const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";

/// Structured element query: an optional widget class plus attribute tests,
/// all of which must hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Query {
    pub class: Option<String>,
    pub conditions: Vec<Condition>,
}

impl Query {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn class(class: impl Into<String>) -> Self {
        Self {
            class: Some(class.into()),
            conditions: Vec::new(),
        }
    }

    pub fn equals(mut self, attr: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions
            .push(Condition::Equals(attr.into(), value.into()));
        self
    }

    pub fn contains(mut self, attr: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions
            .push(Condition::Contains(attr.into(), value.into()));
        self
    }

    pub fn equals_ignore_case(mut self, attr: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions
            .push(Condition::EqualsIgnoreCase(attr.into(), value.into()));
        self
    }

    /// Render as XPath. `relative` produces a `.//` descendant query for
    /// searches scoped to an element.
    pub fn to_xpath(&self, relative: bool) -> String {
        let axis = if relative { ".//" } else { "//" };
        let node = self.class.as_deref().unwrap_or("*");
        if self.conditions.is_empty() {
            return format!("{axis}{node}");
        }
        let predicate = self
            .conditions
            .iter()
            .map(Condition::to_xpath)
            .collect::<Vec<_>>()
            .join(" and ");
        format!("{axis}{node}[{predicate}]")
    }
}

/// Represents ways to locate a UI element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// Select by full resource id (`package:id/name`)
    Id(String),
    /// Select by accessibility id (content-desc on Android)
    AccessibilityId(String),
    /// Select by widget class name
    ClassName(String),
    /// Select by exact text
    Text(String),
    /// Raw XPath, passed through to the driver
    XPath(String),
    /// Raw UiAutomator expression, passed through to the driver
    UiAutomator(String),
    /// Raw CSS selector (browser contexts only)
    Css(String),
    /// Structured attribute query
    Where(Query),
    /// Ordered alternatives; the first one that matches wins
    Any(Vec<Selector>),
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Id(v) => write!(f, "id:{v}"),
            Selector::AccessibilityId(v) => write!(f, "desc:{v}"),
            Selector::ClassName(v) => write!(f, "class:{v}"),
            Selector::Text(v) => write!(f, "text:{v}"),
            Selector::XPath(v) => write!(f, "xpath:{v}"),
            Selector::UiAutomator(v) => write!(f, "uiautomator:{v}"),
            Selector::Css(v) => write!(f, "css:{v}"),
            Selector::Where(q) => write!(f, "xpath:{}", q.to_xpath(false)),
            Selector::Any(alternatives) => {
                let parts: Vec<String> = alternatives.iter().map(|s| s.to_string()).collect();
                write!(f, "{}", parts.join(" || "))
            }
        }
    }
}

impl Selector {
    /// The WebDriver `(using, value)` pair for this selector.
    ///
    /// `relative` only affects selectors rendered to XPath by us. `Any`
    /// has no single strategy and must be expanded by the caller.
    pub fn strategy(&self, relative: bool) -> Option<(&'static str, String)> {
        match self {
            Selector::Id(v) => Some(("id", v.clone())),
            Selector::AccessibilityId(v) => Some(("accessibility id", v.clone())),
            Selector::ClassName(v) => Some(("class name", v.clone())),
            Selector::Text(v) => Some(("xpath", Query::any().equals("text", v.clone()).to_xpath(relative))),
            Selector::XPath(v) => Some(("xpath", v.clone())),
            Selector::UiAutomator(v) => Some(("-android uiautomator", v.clone())),
            Selector::Css(v) => Some(("css selector", v.clone())),
            Selector::Where(q) => Some(("xpath", q.to_xpath(relative))),
            Selector::Any(_) => None,
        }
    }

    /// Flatten nested alternatives into the order they should be tried.
    pub fn alternatives(&self) -> Vec<&Selector> {
        match self {
            Selector::Any(inner) => inner.iter().flat_map(|s| s.alternatives()).collect(),
            other => vec![other],
        }
    }
}

impl From<Query> for Selector {
    fn from(q: Query) -> Self {
        Selector::Where(q)
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();
        if s.contains("||") {
            let parts: Vec<Selector> = s
                .split("||")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(Selector::from)
                .collect();
            if parts.len() > 1 {
                return Selector::Any(parts);
            }
        }

        let lower = s.to_lowercase();
        match s {
            _ if lower.starts_with("id:") => Selector::Id(s[3..].trim().to_string()),
            _ if lower.starts_with("desc:") => Selector::AccessibilityId(s[5..].trim().to_string()),
            _ if lower.starts_with("class:") => Selector::ClassName(s[6..].trim().to_string()),
            _ if lower.starts_with("text:") => Selector::Text(s[5..].to_string()),
            _ if lower.starts_with("xpath:") => Selector::XPath(s[6..].trim().to_string()),
            _ if lower.starts_with("uiautomator:") => {
                Selector::UiAutomator(s["uiautomator:".len()..].trim().to_string())
            }
            _ if lower.starts_with("css:") => Selector::Css(s[4..].trim().to_string()),
            _ if s.starts_with('/') || s.starts_with('(') || s.starts_with("./") => {
                Selector::XPath(s.to_string())
            }
            // Bare resource ids look like `com.example:id/name`
            _ if s.contains(":id/") => Selector::Id(s.to_string()),
            _ => Selector::Text(s.to_string()),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

/// Quote a string as an XPath 1.0 literal. XPath has no escape sequences,
/// so a value holding both quote kinds is assembled with `concat()`.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    if !value.contains('"') {
        return format!("\"{value}\"");
    }
    let pieces: Vec<String> = value
        .split('\'')
        .map(|chunk| format!("'{chunk}'"))
        .collect();
    format!("concat({})", pieces.join(", \"'\", "))
}
