use std::sync::LazyLock;

use regex::Regex;
use scraper::Selector;
use serde_json::Value;
use tracing::debug;

use super::{copy_first, copy_pre_within, selector, SiteAdapter, Strategy, PRE};
use crate::dom::Element;
use crate::markup;
use crate::page::Page;

static JS_STORE: LazyLock<Selector> = LazyLock::new(|| selector(".js-store"));
static SCRIPT: LazyLock<Selector> = LazyLock::new(|| selector("script"));
static CODE_PRE: LazyLock<Selector> = LazyLock::new(|| selector("code > pre"));
static TAB_CONTENT: LazyLock<Selector> = LazyLock::new(|| selector(r#"[data-name="tab-content"]"#));
static JS_TAB_CONTENT: LazyLock<Selector> = LazyLock::new(|| selector(".js-tab-content"));
static UGAPP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"window\.UGAPP\s*=\s*").unwrap());

const WIKI_CONTENT: &str = "/store/page/data/tab_view/wiki_tab/content";
const MIN_PRE_CHARS: usize = 20;

pub struct UltimateGuitar;

const STYLES: &str = r#"
      pre {
        font-family: 'Courier New', Courier, monospace !important;
        font-size: 15px;
        line-height: 1.5;
        white-space: pre-wrap;
        color: #000;
      }
      span[style*="color: rgb(0, 0, 0)"] { color: #000 !important; }
      span[style*="color: rgb(140, 0, 0)"] { color: #e74c3c !important; font-weight: bold; }

      [data-name="chord"] {
        color: #3498db !important;
        font-weight: bold;
      }

      .chord {
        color: #e74c3c;
        font-weight: bold;
      }
      .tab {
        font-family: inherit;
      }
"#;

/// Wiki-tab markup from the `data-content` JSON of the `.js-store` element.
fn js_store(page: &Page) -> Option<Element> {
    let raw = page.document.select(&JS_STORE).next()?.value().attr("data-content")?;
    let data: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            debug!("js-store payload is not JSON: {}", e);
            return None;
        }
    };
    markup::convert(data.pointer(WIKI_CONTENT)?)
}

/// Wiki-tab markup from an inline `window.UGAPP = {...}` assignment.
fn app_state(page: &Page) -> Option<Element> {
    for script in page.document.select(&SCRIPT) {
        let body: String = script.text().collect();
        let Some(m) = UGAPP_RE.find(&body) else {
            continue;
        };
        // Only the object literal; whatever follows it is ignored.
        let mut values = serde_json::Deserializer::from_str(&body[m.end()..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(state)) => {
                if let Some(content) = state.pointer(WIKI_CONTENT) {
                    return markup::convert(content);
                }
            }
            Some(Err(e)) => debug!("UGAPP state is not JSON: {}", e),
            None => {}
        }
    }
    None
}

fn code_block(page: &Page) -> Option<Element> {
    copy_first(page, &CODE_PRE)
}

fn largest_pre(page: &Page) -> Option<Element> {
    let mut best = None;
    let mut max_len = 0;
    for pre in page.document.select(&PRE) {
        let len = pre.text().map(|t| t.chars().count()).sum::<usize>();
        if len > max_len && len > MIN_PRE_CHARS {
            max_len = len;
            best = Some(pre);
        }
    }
    best.map(Element::from_ref)
}

fn tab_content_attr(page: &Page) -> Option<Element> {
    copy_pre_within(page, &TAB_CONTENT)
}

fn js_tab_content(page: &Page) -> Option<Element> {
    copy_pre_within(page, &JS_TAB_CONTENT)
}

const STRATEGIES: &[(&str, Strategy)] = &[
    ("js-store", js_store),
    ("app-state", app_state),
    ("code-block", code_block),
    ("largest-pre", largest_pre),
    ("tab-content-attr", tab_content_attr),
    ("js-tab-content", js_tab_content),
];

impl SiteAdapter for UltimateGuitar {
    fn name(&self) -> &'static str {
        "ultimate-guitar"
    }

    fn detect(&self, host: &str) -> bool {
        host.contains("ultimate-guitar.com")
    }

    fn strategies(&self) -> &'static [(&'static str, Strategy)] {
        STRATEGIES
    }

    fn styles(&self) -> &'static str {
        STYLES
    }
}
