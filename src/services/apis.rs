//! Thin clients for the third-party APIs behind the fun and utility commands.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ExternalFailure;

pub type ApiResult<T> = Result<T, ExternalFailure>;

const CAT_API: &str = "https://api.thecatapi.com/v1/images/search";
const COFFEE_API: &str = "https://coffee.alexflipnote.dev/random.json";
const FACTS_API: &str = "https://nekos.life/api/v2/fact";
const ASCII_API: &str = "https://artii.herokuapp.com/make";
const QUOTE_API: &str = "http://api.forismatic.com/api/1.0/";
const MATH_API: &str = "https://newton.now.sh/api/v2/";
const REDDIT_BASE: &str = "https://www.reddit.com/r/";
const WIKI_SUMMARY_API: &str = "https://en.wikipedia.org/api/rest_v1/page/summary/";
const WIKI_SEARCH_API: &str = "https://en.wikipedia.org/w/api.php";
const TRANSLATE_API: &str = "https://translate.googleapis.com/translate_a/single";

const BODY_EXCERPT: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct RedditPost {
    pub title: String,
    pub url: String,
    pub stickied: bool,
    pub flair: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Quote {
    #[serde(rename = "quoteText")]
    pub text: String,
    #[serde(rename = "quoteAuthor", default)]
    pub author: String,
    #[serde(rename = "quoteLink", default)]
    pub link: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WikiPage {
    pub title: String,
    pub url: String,
    pub extract: String,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WikiLookup {
    Page(WikiPage),
    Disambiguation(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub source_language: String,
    pub original: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOperation {
    Factor,
    Derive,
    Integrate,
    Zeroes,
}

impl MathOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            MathOperation::Factor => "factor",
            MathOperation::Derive => "derive",
            MathOperation::Integrate => "integrate",
            MathOperation::Zeroes => "zeroes",
        }
    }
}

pub struct ApiClient {
    http: Client,
}

impl ApiClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sneaky/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }

    async fn fetch(&self, service: &'static str, request: RequestBuilder) -> ApiResult<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_failure(service, e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!("{} responded with {}: {}", service, status, body);
        Err(ExternalFailure::Status {
            service,
            status: status.as_u16(),
            body: body.chars().take(BODY_EXCERPT).collect(),
            message: format!("{} responded with HTTP {}.", service, status.as_u16()),
        })
    }

    async fn json<T: DeserializeOwned>(&self, service: &'static str, request: RequestBuilder) -> ApiResult<T> {
        self.fetch(service, request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| transport_failure(service, e))
    }

    pub async fn random_cat(&self) -> ApiResult<String> {
        let body: Value = self.json("thecatapi", self.http.get(CAT_API)).await?;
        body.get(0)
            .and_then(|cat| cat.get("url"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| unexpected("thecatapi"))
    }

    pub async fn random_coffee(&self) -> ApiResult<String> {
        let body: Value = self.json("coffee", self.http.get(COFFEE_API)).await?;
        body.get("file")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| unexpected("coffee"))
    }

    pub async fn random_fact(&self) -> ApiResult<String> {
        let body: Value = self.json("nekos.life", self.http.get(FACTS_API)).await?;
        body.get("fact")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| unexpected("nekos.life"))
    }

    pub async fn asciify(&self, text: &str) -> ApiResult<String> {
        let request = self.http.get(ASCII_API).query(&[("text", text)]);
        self.fetch("artii", request)
            .await?
            .text()
            .await
            .map_err(|e| transport_failure("artii", e))
    }

    pub async fn random_quote(&self) -> ApiResult<Quote> {
        let form = [("method", "getQuote"), ("format", "json"), ("lang", "en")];
        self.json("forismatic", self.http.post(QUOTE_API).form(&form))
            .await
    }

    pub async fn math(&self, operation: MathOperation, expression: &str) -> ApiResult<String> {
        let mut url = Url::parse(MATH_API).map_err(|_| unexpected("newton"))?;
        url.path_segments_mut()
            .map_err(|_| unexpected("newton"))?
            .pop_if_empty()
            .push(operation.as_str())
            .push(expression);

        let body: Value = self.json("newton", self.http.get(url)).await?;
        match body.get("result") {
            Some(Value::String(result)) => Ok(result.clone()),
            Some(other) => Ok(other.to_string()),
            None => Err(unexpected("newton")),
        }
    }

    pub async fn reddit_hot(&self, subreddit: &str) -> ApiResult<Vec<RedditPost>> {
        let name = subreddit_name(subreddit);
        let url = format!("{}{}/hot.json", REDDIT_BASE, name);
        let request = self.http.get(&url).query(&[("limit", "5")]);

        let body: Value = match self.json("reddit", request).await {
            Err(ExternalFailure::Status { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() || status == StatusCode::FORBIDDEN.as_u16() =>
            {
                return Err(no_posts());
            }
            other => other?,
        };
        let posts = parse_reddit_listing(&body);
        if posts.is_empty() {
            return Err(no_posts());
        }
        Ok(posts)
    }

    pub async fn wikipedia(&self, topic: &str) -> ApiResult<WikiLookup> {
        let mut url = Url::parse(WIKI_SUMMARY_API).map_err(|_| unexpected("wikipedia"))?;
        url.path_segments_mut()
            .map_err(|_| unexpected("wikipedia"))?
            .pop_if_empty()
            .push(&topic.trim().replace(' ', "_"));

        let body: Value = match self.json("wikipedia", self.http.get(url)).await {
            Err(ExternalFailure::Status { status: 404, .. }) => {
                return Err(ExternalFailure::NotFound(format!(
                    "Page id \"{}\" does not match any pages. Try another id!",
                    topic
                )));
            }
            other => other?,
        };

        if body.get("type").and_then(Value::as_str) == Some("disambiguation") {
            let request = self.http.get(WIKI_SEARCH_API).query(&[
                ("action", "opensearch"),
                ("search", topic),
                ("limit", "6"),
                ("format", "json"),
            ]);
            let search: Value = self.json("wikipedia", request).await?;
            return Ok(WikiLookup::Disambiguation(parse_opensearch(&search, topic)));
        }

        parse_wiki_summary(&body)
            .map(WikiLookup::Page)
            .ok_or_else(|| unexpected("wikipedia"))
    }

    /// Translates with automatic source detection. `dest` must be a language code.
    pub async fn translate(&self, text: &str, dest: &str) -> ApiResult<Translation> {
        let request = self.http.get(TRANSLATE_API).query(&[
            ("client", "gtx"),
            ("sl", "auto"),
            ("tl", dest),
            ("dt", "t"),
            ("q", text),
        ]);
        let body: Value = self.json("translate", request).await?;
        parse_translation(&body, text).ok_or_else(|| unexpected("translate"))
    }
}

fn transport_failure(service: &'static str, err: reqwest::Error) -> ExternalFailure {
    if err.is_timeout() {
        ExternalFailure::Timeout { service }
    } else if err.is_decode() {
        unexpected(service)
    } else {
        ExternalFailure::Transport {
            service,
            message: format!("Could not reach {}.", service),
        }
    }
}

fn unexpected(service: &'static str) -> ExternalFailure {
    ExternalFailure::Transport {
        service,
        message: format!("{} sent an unexpected response.", service),
    }
}

fn no_posts() -> ExternalFailure {
    ExternalFailure::NotFound("Not a valid subreddit or doesn't have any posts.".to_string())
}

/// `r/rust`, `/r/rust/` and `rust` all name the same subreddit.
pub fn subreddit_name(raw: &str) -> &str {
    raw.trim_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(raw)
}

pub fn parse_reddit_listing(body: &Value) -> Vec<RedditPost> {
    let Some(children) = body.pointer("/data/children").and_then(Value::as_array) else {
        return Vec::new();
    };
    children
        .iter()
        .filter_map(|child| {
            let data = child.get("data")?;
            Some(RedditPost {
                title: data.get("title")?.as_str()?.to_string(),
                url: data.get("url")?.as_str()?.to_string(),
                stickied: data.get("stickied").and_then(Value::as_bool).unwrap_or(false),
                flair: data
                    .get("link_flair_text")
                    .and_then(Value::as_str)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string),
            })
        })
        .collect()
}

pub fn parse_wiki_summary(body: &Value) -> Option<WikiPage> {
    Some(WikiPage {
        title: body.get("title")?.as_str()?.to_string(),
        url: body
            .pointer("/content_urls/desktop/page")
            .and_then(Value::as_str)?
            .to_string(),
        extract: body
            .get("extract")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        thumbnail: body
            .pointer("/thumbnail/source")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Opensearch answers `[query, [titles...], ...]`; the query page itself is dropped.
pub fn parse_opensearch(body: &Value, topic: &str) -> Vec<String> {
    body.get(1)
        .and_then(Value::as_array)
        .map(|titles| {
            titles
                .iter()
                .filter_map(Value::as_str)
                .filter(|t| !t.eq_ignore_ascii_case(topic.trim()))
                .take(5)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// The gtx endpoint answers `[[["translated", "original", ...], ...], null, "src", ...]`.
pub fn parse_translation(body: &Value, original: &str) -> Option<Translation> {
    let segments = body.get(0)?.as_array()?;
    let text: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        return None;
    }
    Some(Translation {
        source_language: body
            .get(2)
            .and_then(Value::as_str)
            .unwrap_or("auto")
            .to_string(),
        original: original.to_string(),
        text,
    })
}

const LANGUAGES: &[(&str, &str)] = &[
    ("af", "afrikaans"),
    ("ar", "arabic"),
    ("bn", "bengali"),
    ("bg", "bulgarian"),
    ("zh-cn", "chinese (simplified)"),
    ("zh-tw", "chinese (traditional)"),
    ("cs", "czech"),
    ("da", "danish"),
    ("nl", "dutch"),
    ("en", "english"),
    ("fi", "finnish"),
    ("fr", "french"),
    ("de", "german"),
    ("el", "greek"),
    ("gu", "gujarati"),
    ("he", "hebrew"),
    ("hi", "hindi"),
    ("hu", "hungarian"),
    ("id", "indonesian"),
    ("it", "italian"),
    ("ja", "japanese"),
    ("ko", "korean"),
    ("ms", "malay"),
    ("ne", "nepali"),
    ("no", "norwegian"),
    ("fa", "persian"),
    ("pl", "polish"),
    ("pt", "portuguese"),
    ("pa", "punjabi"),
    ("ro", "romanian"),
    ("ru", "russian"),
    ("es", "spanish"),
    ("sv", "swedish"),
    ("ta", "tamil"),
    ("th", "thai"),
    ("tr", "turkish"),
    ("uk", "ukrainian"),
    ("ur", "urdu"),
    ("vi", "vietnamese"),
];

/// Resolves a language code or English name to a code.
pub fn language_code(input: &str) -> Option<&'static str> {
    let input = input.trim().to_lowercase();
    LANGUAGES
        .iter()
        .find(|(code, name)| *code == input || *name == input)
        .map(|(code, _)| *code)
}

pub fn language_name(code: &str) -> Option<&'static str> {
    let code = code.to_lowercase();
    LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Collapses whitespace and cuts at a word boundary so that the result,
/// placeholder included, fits in `width` characters.
pub fn shorten(text: &str, width: usize, placeholder: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= width {
        return collapsed;
    }

    let budget = width.saturating_sub(placeholder.chars().count());
    let mut out = String::new();
    for word in collapsed.split(' ') {
        let extra = if out.is_empty() { 0 } else { 1 };
        if out.chars().count() + extra + word.chars().count() > budget {
            break;
        }
        if extra == 1 {
            out.push(' ');
        }
        out.push_str(word);
    }
    if out.is_empty() {
        return placeholder.trim_start().to_string();
    }
    out.push_str(placeholder);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subreddit_name() {
        assert_eq!(subreddit_name("rust"), "rust");
        assert_eq!(subreddit_name("r/rust"), "rust");
        assert_eq!(subreddit_name("/r/rust/"), "rust");
    }

    #[test]
    fn test_parse_reddit_listing() {
        let body = json!({
            "data": {"children": [
                {"data": {"title": "Rules", "url": "https://r/1", "stickied": true, "link_flair_text": "Mod"}},
                {"data": {"title": "Hello", "url": "https://r/2", "stickied": false, "link_flair_text": null}},
                {"data": {"url": "https://r/3"}}
            ]}
        });
        let posts = parse_reddit_listing(&body);
        assert_eq!(posts.len(), 2);
        assert!(posts[0].stickied);
        assert_eq!(posts[0].flair.as_deref(), Some("Mod"));
        assert_eq!(posts[1].flair, None);
        assert!(parse_reddit_listing(&json!({"data": {"children": []}})).is_empty());
    }

    #[test]
    fn test_parse_translation() {
        let body = json!([[["Hello ", "Hola ", null, null, 10], ["world", "mundo", null, null, 10]], null, "es"]);
        let translated = parse_translation(&body, "Hola mundo").unwrap();
        assert_eq!(translated.text, "Hello world");
        assert_eq!(translated.source_language, "es");
        assert_eq!(translated.original, "Hola mundo");
        assert!(parse_translation(&json!([[]]), "x").is_none());
    }

    #[test]
    fn test_parse_wiki() {
        let body = json!({
            "type": "standard",
            "title": "Rust (programming language)",
            "extract": "Rust is a language.",
            "content_urls": {"desktop": {"page": "https://en.wikipedia.org/wiki/Rust_(programming_language)"}},
            "thumbnail": {"source": "https://upload/rust.png"}
        });
        let page = parse_wiki_summary(&body).unwrap();
        assert_eq!(page.title, "Rust (programming language)");
        assert_eq!(page.thumbnail.as_deref(), Some("https://upload/rust.png"));

        let search = json!(["Mercury", ["Mercury", "Mercury (planet)", "Mercury (element)"], [], []]);
        assert_eq!(
            parse_opensearch(&search, "mercury"),
            vec!["Mercury (planet)", "Mercury (element)"]
        );
    }

    #[test]
    fn test_languages() {
        assert_eq!(language_code("French"), Some("fr"));
        assert_eq!(language_code("ja"), Some("ja"));
        assert_eq!(language_code("klingon"), None);
        assert_eq!(language_name("es"), Some("spanish"));
    }

    #[test]
    fn test_shorten() {
        assert_eq!(shorten("short  text", 50, "..."), "short text");
        let long = "one two three four five six";
        let cut = shorten(long, 15, " [..]");
        assert_eq!(cut, "one two [..]");
        assert!(cut.chars().count() <= 15);
    }
}
