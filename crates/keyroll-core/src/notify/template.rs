use std::collections::BTreeMap;
use std::fmt;
use zeroize::Zeroizing;

/// Values substituted into a notification template.
///
/// Values may carry credentials: they are zeroized on drop and never shown
/// by `Debug`.
#[derive(Default, Clone)]
pub struct Bindings(BTreeMap<String, Zeroizing<String>>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), Zeroizing::new(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|value| value.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.keys()).finish()
    }
}

/// Escape a value for inclusion in HTML text or attribute content.
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render `{{ key }}` placeholders in a single pass to prevent second-order
/// substitutions.
///
/// Whitespace inside the braces is ignored. Values are HTML-escaped. Unknown
/// placeholders are kept unchanged.
pub fn render_template(template: &str, bindings: &Bindings) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        rendered.push_str(&rest[..start]);
        if let Some(end_offset) = rest[start..].find("}}") {
            let placeholder = &rest[start..start + end_offset + 2];
            let key = placeholder[2..placeholder.len() - 2].trim();
            match bindings.get(key) {
                Some(value) => rendered.push_str(&escape_html(value)),
                None => rendered.push_str(placeholder),
            }
            rest = &rest[start + end_offset + 2..];
        } else {
            rendered.push_str(&rest[start..]);
            rest = "";
        }
    }
    rendered.push_str(rest);
    rendered
}
