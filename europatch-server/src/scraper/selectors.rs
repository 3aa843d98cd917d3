//! Selector chains and text helpers shared by the page extractors
//!
//! Every extraction point is an ordered list of CSS selectors evaluated
//! first-success-wins. Chains are compiled once into statics.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

/// Compile a selector chain, skipping (and logging) any invalid entry
pub fn compile(chain: &[&str]) -> Vec<Selector> {
    chain
        .iter()
        .filter_map(|css| match Selector::parse(css) {
            Ok(selector) => Some(selector),
            Err(e) => {
                warn!(selector = %css, error = ?e, "Invalid selector skipped");
                None
            }
        })
        .collect()
}

/// Compile a single selector
pub fn one(css: &str) -> Option<Selector> {
    compile(&[css]).into_iter().next()
}

/// Collapse runs of whitespace into single spaces and trim
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of an element, whitespace-collapsed
pub fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

/// Document text with script and style content removed, whitespace-collapsed
pub fn visible_text(document: &Html) -> String {
    let parts: Vec<&str> = document
        .root_element()
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node
                .parent()
                .and_then(|parent| parent.value().as_element())
                .map(|el| matches!(el.name(), "script" | "style" | "noscript"))
                .unwrap_or(false);
            (!hidden).then_some(&**text)
        })
        .collect();
    clean_text(&parts.join(" "))
}

/// First non-empty text produced by the chain over the whole document
pub fn first_text(document: &Html, chain: &[Selector]) -> Option<String> {
    chain.iter().find_map(|selector| {
        document
            .select(selector)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

/// First non-empty text produced by the chain inside one element
pub fn first_text_within(element: ElementRef<'_>, chain: &[Selector]) -> Option<String> {
    chain.iter().find_map(|selector| {
        element
            .select(selector)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

/// First attribute value produced by the chain over the whole document
pub fn first_attr(document: &Html, chain: &[Selector], attr: &str) -> Option<String> {
    chain.iter().find_map(|selector| {
        document
            .select(selector)
            .filter_map(|el| el.value().attr(attr))
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_string)
    })
}

/// Resolve a (possibly root-relative) link against the site base
///
/// Returns None for empty, fragment-only and `javascript:` links.
pub fn absolutize(base_url: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }

    if let Ok(url) = Url::parse(href) {
        return Some(url.to_string());
    }

    Url::parse(base_url)
        .and_then(|base| base.join(href))
        .map(|url| url.to_string())
        .ok()
}

static HP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,3})\s*HP\b").expect("Invalid regex pattern"));

/// First `<n> HP` occurrence in the text
pub fn find_hp(text: &str) -> Option<i64> {
    HP_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Split a combined "name / manufacturer" label
///
/// `Plaits by Mutable Instruments` and `Plaits - Mutable Instruments` give
/// (name, manufacturer). Without a separator the first word is taken as the
/// manufacturer and the rest as the name. A single word yields None.
pub fn split_combined(text: &str) -> Option<(String, String)> {
    let text = clean_text(text);

    for separator in [" by ", " - ", " — ", " | "] {
        if let Some((left, right)) = text.split_once(separator) {
            let (name, manufacturer) = (left.trim(), right.trim());
            if !name.is_empty() && !manufacturer.is_empty() {
                return Some((name.to_string(), manufacturer.to_string()));
            }
        }
    }

    let (manufacturer, name) = text.split_once(' ')?;
    Some((name.trim().to_string(), manufacturer.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  Plaits \n\t  Macro   Oscillator "), "Plaits Macro Oscillator");
    }

    #[test]
    fn test_first_text_skips_empty_matches() {
        let doc = Html::parse_document(
            r#"<div class="name">   </div><h3>Rings</h3><div class="name">Clouds</div>"#,
        );
        let chain = compile(&[".name", "h3"]);
        // First selector yields a non-empty match further down
        assert_eq!(first_text(&doc, &chain).as_deref(), Some("Clouds"));

        let chain = compile(&[".missing", "h3"]);
        assert_eq!(first_text(&doc, &chain).as_deref(), Some("Rings"));
    }

    #[test]
    fn test_visible_text_drops_scripts() {
        let doc = Html::parse_document(
            "<html><head><style>body { color: red }</style></head>\
             <body><p>Complex  VCO</p><script>var filter = 1;</script></body></html>",
        );
        assert_eq!(visible_text(&doc), "Complex VCO");
    }

    #[test]
    fn test_invalid_selector_is_skipped() {
        let chain = compile(&["h1", "[[[", "h2"]);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_absolutize() {
        let base = "https://www.modulargrid.net";
        assert_eq!(
            absolutize(base, "/manual/test_module.pdf").as_deref(),
            Some("https://www.modulargrid.net/manual/test_module.pdf")
        );
        assert_eq!(
            absolutize(base, "https://mutable-instruments.net/plaits").as_deref(),
            Some("https://mutable-instruments.net/plaits")
        );
        assert_eq!(absolutize(base, "#top"), None);
        assert_eq!(absolutize(base, ""), None);
    }

    #[test]
    fn test_find_hp() {
        assert_eq!(find_hp("12HP"), Some(12));
        assert_eq!(find_hp("Width: 8 hp, depth 25mm"), Some(8));
        assert_eq!(find_hp("no width here"), None);
    }

    #[test]
    fn test_split_combined() {
        assert_eq!(
            split_combined("Plaits by Mutable Instruments"),
            Some(("Plaits".to_string(), "Mutable Instruments".to_string()))
        );
        assert_eq!(
            split_combined("Maths - Make Noise"),
            Some(("Maths".to_string(), "Make Noise".to_string()))
        );
        assert_eq!(
            split_combined("Intellijel Quad VCA"),
            Some(("Quad VCA".to_string(), "Intellijel".to_string()))
        );
        assert_eq!(split_combined("Plaits"), None);
    }
}
