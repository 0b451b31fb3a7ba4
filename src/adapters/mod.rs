pub mod cifraclub;
pub mod ultimate_guitar;

use std::sync::LazyLock;

use scraper::Selector;
use tracing::debug;

use crate::dom::Element;
use crate::page::Page;

pub use cifraclub::CifraClub;
pub use ultimate_guitar::UltimateGuitar;

/// One way of locating song content on a page.
pub type Strategy = fn(&Page) -> Option<Element>;

/// Per-site knowledge: how to recognise the site, where its song content
/// lives, and how that content should look in the overlay.
pub trait SiteAdapter {
    fn name(&self) -> &'static str;

    /// Pure predicate over the page hostname.
    fn detect(&self, host: &str) -> bool;

    /// Extraction techniques in order of trust.
    fn strategies(&self) -> &'static [(&'static str, Strategy)];

    fn styles(&self) -> &'static str;

    /// First strategy to produce non-empty content wins. The result is a
    /// detached copy; the page is never touched.
    fn extract_content(&self, page: &Page) -> Option<Element> {
        for (label, strategy) in self.strategies() {
            if let Some(fragment) = strategy(page) {
                if is_empty(&fragment) {
                    continue;
                }
                debug!(adapter = self.name(), strategy = *label, "content extracted");
                return Some(fragment);
            }
        }
        debug!(adapter = self.name(), "no strategy produced content");
        None
    }
}

fn is_empty(fragment: &Element) -> bool {
    fragment.children.is_empty()
}

/// Adapters in priority order. The first whose `detect` accepts the host is
/// used, so registration order is significant.
pub struct Registry {
    adapters: Vec<Box<dyn SiteAdapter>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(vec![Box::new(CifraClub), Box::new(UltimateGuitar)])
    }
}

impl Registry {
    pub fn new(adapters: Vec<Box<dyn SiteAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn select(&self, host: &str) -> Option<&dyn SiteAdapter> {
        self.adapters
            .iter()
            .find(|a| a.detect(host))
            .map(|a| a.as_ref())
    }

    pub fn supports(&self, host: &str) -> bool {
        self.select(host).is_some()
    }
}

pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

pub(crate) static PRE: LazyLock<Selector> = LazyLock::new(|| selector("pre"));

/// Copy the first element matching `sel`.
pub(crate) fn copy_first(page: &Page, sel: &Selector) -> Option<Element> {
    page.document.select(sel).next().map(Element::from_ref)
}

/// Copy the first `<pre>` inside the first element matching `container`.
pub(crate) fn copy_pre_within(page: &Page, container: &Selector) -> Option<Element> {
    let outer = page.document.select(container).next()?;
    outer.select(&PRE).next().map(Element::from_ref)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fake(&'static str, &'static str);

    impl SiteAdapter for Fake {
        fn name(&self) -> &'static str {
            self.0
        }
        fn detect(&self, host: &str) -> bool {
            host.contains(self.1)
        }
        fn strategies(&self) -> &'static [(&'static str, Strategy)] {
            &[]
        }
        fn styles(&self) -> &'static str {
            ""
        }
    }

    #[test]
    fn first_registered_match_wins() {
        let registry = Registry::new(vec![
            Box::new(Fake("first", "example")),
            Box::new(Fake("second", "example.com")),
        ]);
        let chosen = registry.select("www.example.com").unwrap();
        assert_eq!(chosen.name(), "first");

        let reversed = Registry::new(vec![
            Box::new(Fake("second", "example.com")),
            Box::new(Fake("first", "example")),
        ]);
        assert_eq!(reversed.select("www.example.com").unwrap().name(), "second");
    }

    #[test]
    fn default_registry_order() {
        let registry = Registry::default();
        assert_eq!(registry.select("www.cifraclub.com.br").unwrap().name(), "cifraclub");
        assert_eq!(
            registry.select("tabs.ultimate-guitar.com").unwrap().name(),
            "ultimate-guitar"
        );
        assert!(registry.select("example.com").is_none());
        assert!(!registry.supports("www.songsterr.com"));
    }

    #[test]
    fn empty_strategy_chain_yields_nothing() {
        let page = Page::parse("<pre>x</pre>");
        assert!(Fake("f", "example").extract_content(&page).is_none());
    }
}
