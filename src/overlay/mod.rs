//! Play-mode overlay controller.
//!
//! Owns the overlay lifecycle as an explicit state machine:
//!
//! ```text
//! Inactive → Activating → Active ⇄ Editing
//!     ↑          │           │        │
//!     └──────────┴───────────┴────────┘   (close / failure)
//! ```
//!
//! Activation selects an adapter, polls the page until the adapter finds
//! content (bounded, fixed interval, cancellable), loads preferences, then
//! segments the content and applies the stored column and hidden-block state.

pub mod layout;
pub mod view;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::adapters::{Registry, SiteAdapter};
use crate::dom::{Element, Node};
use crate::errors::ActivationError;
use crate::page::{host_of, Page, PageSource};
use crate::prefs::{ColumnPreference, HiddenBlocks, PreferenceStore, Preferences};
use crate::segment::{self, Block, BLOCK_ATTR, HIDDEN_CLASS};
use crate::settings::{RetryPolicy, Settings};

pub use view::Overlay;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Inactive,
    Activating,
    Active,
    Editing,
}

/// Transient overlay state. Never persisted.
#[derive(Debug, Clone)]
pub struct OverlayState {
    pub phase: Phase,
    pub columns: ColumnPreference,
    pub column_count: u8,
    pub scroll_locked: bool,
}

impl OverlayState {
    pub fn is_active(&self) -> bool {
        matches!(self.phase, Phase::Active | Phase::Editing)
    }

    pub fn is_editing(&self) -> bool {
        self.phase == Phase::Editing
    }
}

impl Default for OverlayState {
    fn default() -> Self {
        Self {
            phase: Phase::Inactive,
            columns: ColumnPreference::Auto,
            column_count: layout::MIN_COLUMNS,
            scroll_locked: false,
        }
    }
}

/// Shared flag that stops a pending extraction.
///
/// `activate` holds the controller mutably until it returns, so `close()` can
/// only trip the flag between activations. To stop a pending one, take a
/// token with `Controller::cancel_token` before calling `activate` and cancel
/// through it (from a signal handler, another task, or the page source).
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SupportResponse {
    pub supported: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    Activated { adapter: &'static str, blocks: usize },
    /// Activation requested while already activating or active.
    AlreadyActive,
    /// Closed before content arrived; nothing was applied.
    Cancelled,
}

enum PollOutcome {
    Found(Element),
    Exhausted(u32),
    Cancelled,
}

pub struct Controller<S> {
    registry: Registry,
    prefs: Preferences<S>,
    retry: RetryPolicy,
    column_width: u32,
    viewport_width: u32,
    state: OverlayState,
    overlay: Option<Overlay>,
    url: String,
    hidden: HiddenBlocks,
    cancel: CancelToken,
}

impl<S: PreferenceStore> Controller<S> {
    pub fn new(registry: Registry, prefs: Preferences<S>, settings: &Settings) -> Self {
        Self {
            registry,
            prefs,
            retry: settings.retry(),
            column_width: settings.column_width,
            viewport_width: settings.viewport_width,
            state: OverlayState::default(),
            overlay: None,
            url: String::new(),
            hidden: HiddenBlocks::new(),
            cancel: CancelToken::default(),
        }
    }

    pub fn state(&self) -> &OverlayState {
        &self.state
    }

    #[cfg(test)]
    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    pub fn hidden(&self) -> &HiddenBlocks {
        &self.hidden
    }

    #[cfg(test)]
    pub fn prefs(&self) -> &Preferences<S> {
        &self.prefs
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.overlay
            .as_ref()
            .map(|o| segment::blocks_of(&o.content))
            .unwrap_or_default()
    }

    pub fn check_support(&self, url: &str) -> SupportResponse {
        SupportResponse {
            supported: self.registry.supports(&host_of(url)),
        }
    }

    pub async fn activate<P: PageSource>(&mut self, source: &P) -> Result<Activation, ActivationError> {
        if self.state.phase != Phase::Inactive {
            debug!(phase = ?self.state.phase, "activation ignored");
            return Ok(Activation::AlreadyActive);
        }

        let url = source.url().to_string();
        let host = host_of(&url);
        let Some(adapter) = self.registry.select(&host) else {
            warn!(host = %host, "no adapter for page");
            return Err(ActivationError::Unsupported { host });
        };
        let (name, styles) = (adapter.name(), adapter.styles());
        info!(adapter = name, url = %url, "activating play mode");

        self.state.phase = Phase::Activating;
        self.cancel.reset();
        if self.overlay.is_none() {
            self.overlay = Some(Overlay::new());
        }

        let outcome = poll_for_content(adapter, source, self.retry, &self.cancel).await;
        let fragment = match outcome {
            PollOutcome::Found(fragment) => fragment,
            PollOutcome::Exhausted(attempts) => {
                warn!(attempts, "gave up waiting for song content");
                self.abandon();
                return Err(ActivationError::ExtractionFailed { attempts });
            }
            PollOutcome::Cancelled => {
                info!("activation cancelled while waiting for content");
                self.abandon();
                return Ok(Activation::Cancelled);
            }
        };
        if !self.still_activating() {
            self.abandon();
            return Ok(Activation::Cancelled);
        }

        self.url = url;
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.content.children = vec![Node::Element(fragment)];
            overlay.style = styles.to_string();
        }

        self.state.columns = self.prefs.columns().await;
        self.hidden = self.prefs.hidden_blocks(&self.url).await;
        if !self.still_activating() {
            self.abandon();
            return Ok(Activation::Cancelled);
        }

        self.apply_columns();
        let blocks = self
            .overlay
            .as_mut()
            .map(|o| segment::segment_into(&mut o.content))
            .unwrap_or(0);
        self.apply_hidden();

        self.state.phase = Phase::Active;
        self.state.scroll_locked = true;
        info!(blocks, hidden = self.hidden.len(), columns = %self.state.columns, "play mode active");
        Ok(Activation::Activated { adapter: name, blocks })
    }

    fn still_activating(&self) -> bool {
        self.state.phase == Phase::Activating && !self.cancel.is_cancelled()
    }

    fn deactivate(&mut self) {
        self.state.phase = Phase::Inactive;
        self.state.scroll_locked = false;
    }

    /// Deactivate after a failed or cancelled activation, dropping whatever
    /// the previous song left behind.
    fn abandon(&mut self) {
        self.deactivate();
        self.url.clear();
        self.hidden.clear();
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.content.children.clear();
            overlay.style.clear();
        }
    }

    /// Close from any state and trip the cancel token. The hidden set stays
    /// as it is until the next activation reloads it.
    pub fn close(&mut self) {
        self.cancel.cancel();
        if self.state.phase != Phase::Inactive {
            info!("closing play mode");
        }
        self.deactivate();
    }

    /// Flip between Active and Editing. Returns whether edit mode is on.
    pub fn toggle_edit(&mut self) -> bool {
        self.state.phase = match self.state.phase {
            Phase::Active => Phase::Editing,
            Phase::Editing => Phase::Active,
            other => other,
        };
        debug!(phase = ?self.state.phase, "edit mode toggled");
        self.state.is_editing()
    }

    /// Keyboard handling while the overlay is up: Escape leaves edit mode or
    /// closes, `e` toggles edit mode unless typing into a text field.
    pub fn handle_key(&mut self, key: &str, in_text_input: bool) {
        if !self.state.is_active() {
            return;
        }
        match key {
            "Escape" if self.state.is_editing() => {
                self.toggle_edit();
            }
            "Escape" => self.close(),
            "e" | "E" if !in_text_input => {
                self.toggle_edit();
            }
            _ => {}
        }
    }

    /// A click on a block. Hides it in edit mode; otherwise does nothing.
    pub async fn click_block(&mut self, id: usize) -> bool {
        if !self.state.is_editing() {
            return false;
        }
        let Some(block) = self.block_mut(id) else {
            debug!(id, "click on unknown block");
            return false;
        };
        block.add_class(HIDDEN_CLASS);
        self.hidden.insert(id);
        self.persist_hidden().await;
        true
    }

    /// Show every block again. Only available in edit mode.
    pub async fn restore_all(&mut self) -> bool {
        if !self.state.is_editing() {
            return false;
        }
        self.hidden.clear();
        self.persist_hidden().await;
        self.apply_hidden();
        true
    }

    pub async fn set_columns(&mut self, columns: ColumnPreference) {
        self.state.columns = columns;
        self.apply_columns();
        if let Err(e) = self.prefs.set_columns(columns).await {
            warn!("Failed to save column preference: {}", e);
        }
    }

    pub fn resize(&mut self, viewport_width: u32) {
        self.viewport_width = viewport_width;
        if self.state.columns == ColumnPreference::Auto && self.state.is_active() {
            self.apply_columns();
        }
    }

    pub fn render_document(&self, title: &str) -> Option<String> {
        self.overlay
            .as_ref()
            .map(|o| o.render_document(&self.state, title))
    }

    fn apply_columns(&mut self) {
        let count = layout::column_count(self.state.columns, self.viewport_width, self.column_width);
        self.state.column_count = count;
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.set_column_count(count);
        }
    }

    fn apply_hidden(&mut self) {
        let Some(overlay) = self.overlay.as_mut() else {
            return;
        };
        for block in overlay.content.element_children_mut() {
            let hidden = block
                .attr(BLOCK_ATTR)
                .and_then(|v| v.parse::<usize>().ok())
                .is_some_and(|id| self.hidden.contains(&id));
            block.set_class(HIDDEN_CLASS, hidden);
        }
    }

    fn block_mut(&mut self, id: usize) -> Option<&mut Element> {
        let wanted = id.to_string();
        self.overlay
            .as_mut()?
            .content
            .element_children_mut()
            .find(|b| b.attr(BLOCK_ATTR) == Some(wanted.as_str()))
    }

    async fn persist_hidden(&self) {
        if let Err(e) = self.prefs.save_hidden_blocks(&self.url, &self.hidden).await {
            warn!(url = %self.url, "Failed to save hidden blocks: {}", e);
        }
    }
}

/// Poll the page until the adapter finds content, the attempts run out, or the
/// token is tripped. Individual misses are silent.
async fn poll_for_content<P: PageSource>(
    adapter: &dyn SiteAdapter,
    source: &P,
    retry: RetryPolicy,
    cancel: &CancelToken,
) -> PollOutcome {
    for attempt in 1..=retry.max_attempts {
        if cancel.is_cancelled() {
            return PollOutcome::Cancelled;
        }
        match source.snapshot().await {
            Ok(snapshot) => {
                if cancel.is_cancelled() {
                    return PollOutcome::Cancelled;
                }
                let page = Page::parse(&snapshot);
                if let Some(fragment) = adapter.extract_content(&page) {
                    debug!(attempt, "content found");
                    return PollOutcome::Found(fragment);
                }
                debug!(attempt, "content not ready");
            }
            Err(e) => debug!(attempt, "snapshot unavailable: {:#}", e),
        }
        if attempt < retry.max_attempts {
            tokio::time::sleep(retry.interval).await;
        }
    }
    PollOutcome::Exhausted(retry.max_attempts)
}
