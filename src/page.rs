use std::path::PathBuf;

use anyhow::{Context, Result};
use scraper::Html;

/// A parsed snapshot of the page. Adapters read from it; nothing ever writes
/// to it.
pub struct Page {
    pub document: Html,
}

impl Page {
    pub fn parse(html: &str) -> Self {
        Self {
            document: Html::parse_document(html),
        }
    }
}

/// Lower-cased hostname of a URL, without port or credentials.
pub fn host_of(url: &str) -> String {
    let rest = url.split("//").nth(1).unwrap_or(url);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host = authority.rsplit('@').next().unwrap_or(authority);
    host.split(':').next().unwrap_or("").to_ascii_lowercase()
}

/// Where page snapshots come from. Each call returns the page HTML as it is
/// now, so a page that is still loading may look different on the next call.
pub trait PageSource {
    fn url(&self) -> &str;
    async fn snapshot(&self) -> Result<String>;
}

/// A saved page on disk, re-read on every attempt.
pub struct FileSource {
    pub url: String,
    pub path: PathBuf,
}

impl PageSource for FileSource {
    fn url(&self) -> &str {
        &self.url
    }

    async fn snapshot(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read page file {}", self.path.display()))
    }
}

/// A live page fetched over HTTP on every attempt.
pub struct HttpSource {
    pub url: String,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl PageSource for HttpSource {
    fn url(&self) -> &str {
        &self.url
    }

    async fn snapshot(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("Failed to fetch {}", self.url))?;
        response
            .text()
            .await
            .with_context(|| format!("Failed to read body of {}", self.url))
    }
}

/// Either kind of source, picked at runtime.
pub enum Source {
    File(FileSource),
    Http(HttpSource),
}

impl Source {
    pub fn new(url: &str, file: Option<PathBuf>) -> Self {
        match file {
            Some(path) => Source::File(FileSource {
                url: url.to_string(),
                path,
            }),
            None => Source::Http(HttpSource::new(url)),
        }
    }
}

impl PageSource for Source {
    fn url(&self) -> &str {
        match self {
            Source::File(s) => s.url(),
            Source::Http(s) => s.url(),
        }
    }

    async fn snapshot(&self) -> Result<String> {
        match self {
            Source::File(s) => s.snapshot().await,
            Source::Http(s) => s.snapshot().await,
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use super::*;

    /// Serves a fixed sequence of snapshots; the last one repeats forever.
    /// `None` entries simulate a failed fetch.
    pub struct ScriptedSource {
        pub url: String,
        script: RefCell<VecDeque<Option<String>>>,
        last: RefCell<Option<String>>,
        pub calls: Cell<usize>,
        on_call: Option<Box<dyn Fn(usize)>>,
    }

    impl ScriptedSource {
        pub fn new(url: &str, script: Vec<Option<&str>>) -> Self {
            Self {
                url: url.to_string(),
                script: RefCell::new(script.into_iter().map(|s| s.map(str::to_string)).collect()),
                last: RefCell::new(None),
                calls: Cell::new(0),
                on_call: None,
            }
        }

        pub fn always(url: &str, html: &str) -> Self {
            Self::new(url, vec![Some(html)])
        }

        /// Run `hook` with the 1-based call number before each snapshot.
        pub fn on_call(mut self, hook: impl Fn(usize) + 'static) -> Self {
            self.on_call = Some(Box::new(hook));
            self
        }
    }

    impl PageSource for ScriptedSource {
        fn url(&self) -> &str {
            &self.url
        }

        async fn snapshot(&self) -> Result<String> {
            let n = self.calls.get() + 1;
            self.calls.set(n);
            if let Some(hook) = &self.on_call {
                hook(n);
            }
            let next = self.script.borrow_mut().pop_front();
            let html = match next {
                Some(entry) => {
                    *self.last.borrow_mut() = entry.clone();
                    entry
                }
                None => self.last.borrow().clone(),
            };
            html.ok_or_else(|| anyhow::anyhow!("snapshot {} unavailable", n))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_extraction() {
        assert_eq!(host_of("https://www.cifraclub.com.br/artist/song/"), "www.cifraclub.com.br");
        assert_eq!(host_of("https://tabs.Ultimate-Guitar.com:443/tab/x?y=1"), "tabs.ultimate-guitar.com");
        assert_eq!(host_of("http://user:pw@example.org#frag"), "example.org");
        assert_eq!(host_of("example.com/path"), "example.com");
    }

    #[tokio::test]
    async fn file_source_rereads() {
        let dir = std::env::temp_dir().join(format!("playmode-page-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("page.html");
        let source = FileSource {
            url: "https://example.com/".into(),
            path: path.clone(),
        };
        assert!(source.snapshot().await.is_err());
        std::fs::write(&path, "<p>late</p>").unwrap();
        assert_eq!(source.snapshot().await.unwrap(), "<p>late</p>");
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
