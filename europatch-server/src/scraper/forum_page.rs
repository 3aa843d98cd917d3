//! Forum search result extraction (ModWiggler, Reddit)

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use url::form_urlencoded;

use super::selectors::{absolutize, compile, element_text, first_text_within};

pub const MODWIGGLER_FORUM_BASE: &str = "https://www.modwiggler.com/forum/";
pub const REDDIT_BASE: &str = "https://www.reddit.com";

/// Results kept per search page
pub const MAX_RESULTS: usize = 10;

static MODWIGGLER_RESULT: Lazy<Vec<Selector>> = Lazy::new(|| compile(&["div.search-result"]));
static MODWIGGLER_TITLE: Lazy<Vec<Selector>> = Lazy::new(|| compile(&["a.topictitle"]));
static MODWIGGLER_SNIPPET: Lazy<Vec<Selector>> = Lazy::new(|| compile(&[".content"]));

static REDDIT_POST: Lazy<Vec<Selector>> = Lazy::new(|| compile(&["div.Post"]));
static REDDIT_TITLE: Lazy<Vec<Selector>> = Lazy::new(|| compile(&["h3"]));
static REDDIT_LINK: Lazy<Vec<Selector>> = Lazy::new(|| compile(&[r#"a[data-click-id="body"]"#]));
static REDDIT_CONTENT: Lazy<Vec<Selector>> = Lazy::new(|| compile(&[r#"div[data-test-id="post-content"]"#]));

/// One search hit
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

fn encode(query: &str) -> String {
    form_urlencoded::byte_serialize(query.as_bytes()).collect()
}

pub fn modwiggler_search_url(module_name: &str) -> String {
    format!(
        "{}search.php?keywords={}&terms=all&sr=posts&sf=all&sk=t&sd=d",
        MODWIGGLER_FORUM_BASE,
        encode(module_name)
    )
}

pub fn reddit_search_url(module_name: &str) -> String {
    format!("{}/search/?q={}", REDDIT_BASE, encode(&format!("{} eurorack", module_name)))
}

/// Thread title, absolute link and snippet for each search result
pub fn parse_modwiggler_results(html: &str) -> Vec<ThreadHit> {
    let document = Html::parse_document(html);

    MODWIGGLER_RESULT
        .iter()
        .flat_map(|selector| document.select(selector))
        .filter_map(|result| {
            let link = MODWIGGLER_TITLE.iter().find_map(|s| result.select(s).next())?;
            let title = element_text(link);
            let url = absolutize(MODWIGGLER_FORUM_BASE, link.value().attr("href")?)?;
            if title.is_empty() {
                return None;
            }
            let snippet = first_text_within(result, &MODWIGGLER_SNIPPET).unwrap_or_default();
            Some(ThreadHit { title, url, snippet })
        })
        .take(MAX_RESULTS)
        .collect()
}

/// Post title and absolute link for each search result; snippet left empty
pub fn parse_reddit_results(html: &str) -> Vec<ThreadHit> {
    let document = Html::parse_document(html);

    REDDIT_POST
        .iter()
        .flat_map(|selector| document.select(selector))
        .filter_map(|post| {
            let title = first_text_within(post, &REDDIT_TITLE)?;
            let link = REDDIT_LINK.iter().find_map(|s| post.select(s).next())?;
            let url = absolutize(REDDIT_BASE, link.value().attr("href")?)?;
            Some(ThreadHit {
                title,
                url,
                snippet: String::new(),
            })
        })
        .take(MAX_RESULTS)
        .collect()
}

/// Body text of a Reddit post page, empty when not found
pub fn parse_reddit_post(html: &str) -> String {
    let document = Html::parse_document(html);
    REDDIT_CONTENT
        .iter()
        .find_map(|selector| document.select(selector).next())
        .map(element_text)
        .unwrap_or_default()
}
