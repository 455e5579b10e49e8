use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

static FORM_INPUTS: Lazy<Selector> = Lazy::new(|| Selector::parse("form input").unwrap());
static ERROR_MARKER: Lazy<Selector> = Lazy::new(|| Selector::parse(".error").unwrap());

/// How to locate one value in a response document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRule {
    /// First element carrying `attr`; yields that attribute's value.
    /// A blank value counts as absent.
    Attribute { attr: &'static str },
    /// First element matching a CSS path; yields its trimmed text.
    /// Blank text counts as absent.
    Text { path: &'static str },
    /// First `<input type="hidden" name=...>` inside a form; yields its value.
    /// A missing `value` attribute yields an empty string, as a browser would submit.
    HiddenInput { name: &'static str },
}

/// Apply `rule` to an already-parsed document. `None` means the value is
/// absent; whether that is fatal is up to the caller.
pub fn extract(document: &Html, rule: &FieldRule) -> Option<String> {
    match rule {
        FieldRule::Attribute { attr } => {
            let sel = selector(&format!("[{attr}]"))?;
            document
                .select(&sel)
                .next()
                .and_then(|el| el.value().attr(attr))
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.to_string())
        }
        FieldRule::Text { path } => {
            let sel = selector(path)?;
            document
                .select(&sel)
                .next()
                .map(element_text)
                .filter(|text| !text.is_empty())
        }
        FieldRule::HiddenInput { name } => {
            document
                .select(&FORM_INPUTS)
                .find(|el| {
                    let v = el.value();
                    v.attr("type")
                        .is_some_and(|t| t.trim().eq_ignore_ascii_case("hidden"))
                        && v.attr("name") == Some(*name)
                })
                .map(|el| el.value().attr("value").unwrap_or_default().to_string())
        }
    }
}

/// Parse `body` and apply a single rule.
pub fn extract_from(body: &str, rule: &FieldRule) -> Option<String> {
    extract(&Html::parse_document(body), rule)
}

/// The service marks rejected requests with an element of class `error`.
/// Returns its text (or a placeholder when the element is empty).
pub fn find_error_marker(document: &Html) -> Option<String> {
    document.select(&ERROR_MARKER).next().map(|el| {
        let text = element_text(el);
        if text.is_empty() {
            "remote service reported an error".to_string()
        } else {
            text
        }
    })
}

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
