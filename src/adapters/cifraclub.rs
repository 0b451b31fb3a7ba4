use std::sync::LazyLock;

use scraper::Selector;

use super::{copy_first, selector, SiteAdapter, Strategy, PRE};
use crate::dom::Element;
use crate::page::Page;

static CIFRA_CNT: LazyLock<Selector> = LazyLock::new(|| selector(".cifra_cnt"));

pub struct CifraClub;

const STYLES: &str = r#"
      .cifra_cnt pre, pre {
        font-family: 'Courier New', Courier, monospace !important;
        font-size: 16px;
        line-height: 1.5;
        white-space: pre-wrap;
        color: #333;
      }
      b { color: #f96800; font-weight: bold; }
      .tablatura { color: #2c3e50; }
"#;

fn cifra_container(page: &Page) -> Option<Element> {
    copy_first(page, &CIFRA_CNT)
}

fn first_pre(page: &Page) -> Option<Element> {
    copy_first(page, &PRE)
}

const STRATEGIES: &[(&str, Strategy)] = &[("cifra-container", cifra_container), ("first-pre", first_pre)];

impl SiteAdapter for CifraClub {
    fn name(&self) -> &'static str {
        "cifraclub"
    }

    fn detect(&self, host: &str) -> bool {
        host.contains("cifraclub.com")
    }

    fn strategies(&self) -> &'static [(&'static str, Strategy)] {
        STRATEGIES
    }

    fn styles(&self) -> &'static str {
        STYLES
    }
}
