use scraper::{ElementRef, Html, Node};

/// Tags whose content is dropped entirely rather than kept as text.
const SKIP_CHILDREN: &[&str] = &["script", "style", "noscript", "svg", "iframe"];

/// Strip markup from backend-supplied text, keeping only visible text.
///
/// Only complete `<...>` tags count as markup. A `<` with no closing `>`
/// before the next `<` is kept as text, and entities are never decoded, so
/// text without a complete tag comes back unchanged.
pub fn strip_markup(text: &str) -> String {
    if !has_complete_tag(text) {
        return text.to_string();
    }

    let fragment = Html::parse_fragment(&escape_stray(text));
    let mut out = String::with_capacity(text.len());
    collect_text(fragment.root_element(), &mut out);
    out
}

/// Sanitize a message and drop it if nothing visible remains.
pub fn sanitize_message(text: &str) -> Option<String> {
    let clean = strip_markup(text);
    if clean.trim().is_empty() {
        None
    } else {
        Some(clean)
    }
}

fn closes_as_tag(after_open: &str) -> bool {
    after_open
        .find(|c: char| c == '<' || c == '>')
        .is_some_and(|i| after_open[i..].starts_with('>'))
}

fn has_complete_tag(text: &str) -> bool {
    text.match_indices('<').any(|(i, _)| closes_as_tag(&text[i + 1..]))
}

/// Escape everything the parser would treat specially except real tags.
fn escape_stray(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for (i, ch) in text.char_indices() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' if !closes_as_tag(&text[i + 1..]) => out.push_str("&lt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn collect_text(el: ElementRef<'_>, out: &mut String) {
    let tag = el.value().name.local.as_ref();
    if SKIP_CHILDREN.contains(&tag) {
        return;
    }

    for child_ref in el.children() {
        match child_ref.value() {
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child_ref) {
                    collect_text(child_el, out);
                }
            }
            Node::Text(t) => out.push_str(&t.text),
            _ => {}
        }
    }
}
