use crate::dom::{escape_text, Element};
use crate::prefs::ColumnPreference;

use super::OverlayState;

pub const OVERLAY_ID: &str = "guitar-play-mode-overlay";
pub const TOOLBAR_ID: &str = "gpm-toolbar";
pub const CONTENT_ID: &str = "gpm-content";
pub const EDIT_BTN_ID: &str = "gpm-edit-btn";
pub const RESTORE_BTN_ID: &str = "gpm-restore-btn";
pub const CLOSE_BTN_ID: &str = "gpm-close-btn";
pub const STYLE_ID: &str = "gpm-adapter-style";

pub const ACTIVE_CLASS: &str = "active";
pub const EDITING_CLASS: &str = "gpm-editing";

const BASE_STYLES: &str = r#"
  #guitar-play-mode-overlay { display: none; position: fixed; inset: 0; background: #fff; overflow: auto; }
  #guitar-play-mode-overlay.active { display: block; }
  #gpm-toolbar { display: flex; gap: 8px; padding: 8px; border-bottom: 1px solid #ddd; }
  #gpm-content { padding: 16px; column-gap: 32px; }
  .gpm-editable-block { break-inside: avoid; }
  .gpm-hidden-block { display: none !important; }
  .gpm-editing .gpm-editable-block { cursor: pointer; outline: 1px dashed #bbb; }
  .gpm-btn.active, .gpm-action-btn.editing { background: #333; color: #fff; }
"#;

/// The overlay element. Created once and reused by later activations; only the
/// content container and the injected style text change.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub content: Element,
    pub style: String,
}

impl Default for Overlay {
    fn default() -> Self {
        Self::new()
    }
}

impl Overlay {
    pub fn new() -> Self {
        Self {
            content: Element::new("div").with_attr("id", CONTENT_ID),
            style: String::new(),
        }
    }

    pub fn set_column_count(&mut self, count: u8) {
        self.content.set_attr("style", format!("column-count: {};", count));
    }

    pub fn element(&self, state: &OverlayState) -> Element {
        let mut root = Element::new("div").with_attr("id", OVERLAY_ID);
        if state.is_active() {
            root.add_class(ACTIVE_CLASS);
        }
        if state.is_editing() {
            root.add_class(EDITING_CLASS);
        }
        root.with_child(toolbar(state)).with_child(self.content.clone())
    }

    pub fn style_element(&self) -> Element {
        Element::new("style")
            .with_attr("id", STYLE_ID)
            .with_text(&self.style)
    }

    /// A standalone HTML page holding the overlay.
    pub fn render_document(&self, state: &OverlayState, title: &str) -> String {
        let body_style = if state.scroll_locked { r#" style="overflow: hidden;""# } else { "" };
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>{}</style>\n{}\n</head>\n<body{}>\n{}\n</body>\n</html>\n",
            escape_text(title),
            BASE_STYLES,
            self.style_element().to_html(),
            body_style,
            self.element(state).to_html(),
        )
    }
}

fn toolbar(state: &OverlayState) -> Element {
    let mut group = Element::new("div").with_attr("class", "gpm-btn-group");
    for pref in ColumnPreference::ALL {
        let label = match pref {
            ColumnPreference::Auto => "Auto",
            other => other.as_str(),
        };
        let mut btn = Element::new("button")
            .with_attr("class", "gpm-btn")
            .with_attr("data-cols", pref.as_str())
            .with_text(label);
        btn.set_class(ACTIVE_CLASS, pref == state.columns);
        group.children.push(btn.into());
    }

    let editing = state.is_editing();
    let mut edit = Element::new("button")
        .with_attr("id", EDIT_BTN_ID)
        .with_attr("class", "gpm-action-btn")
        .with_text(if editing { "Done (ESC)" } else { "Edit" });
    edit.set_class("editing", editing);

    let restore = Element::new("button")
        .with_attr("id", RESTORE_BTN_ID)
        .with_attr("class", "gpm-action-btn")
        .with_attr("style", if editing { "display: block;" } else { "display: none;" })
        .with_text("Restore All");

    let close = Element::new("button")
        .with_attr("id", CLOSE_BTN_ID)
        .with_attr("class", "gpm-close-btn")
        .with_text("✕");

    Element::new("div")
        .with_attr("id", TOOLBAR_ID)
        .with_child(group)
        .with_child(edit)
        .with_child(restore)
        .with_child(close)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::Phase;

    fn state(phase: Phase, columns: ColumnPreference) -> OverlayState {
        OverlayState {
            phase,
            columns,
            column_count: 3,
            scroll_locked: phase != Phase::Inactive,
        }
    }

    #[test]
    fn toolbar_reflects_state() {
        let overlay = Overlay::new();
        let el = overlay.element(&state(Phase::Editing, ColumnPreference::Three));
        assert!(el.has_class(ACTIVE_CLASS));
        assert!(el.has_class(EDITING_CLASS));

        let bar = el.first_element_child().unwrap();
        let buttons: Vec<&Element> = bar.first_element_child().unwrap().element_children().collect();
        assert_eq!(buttons.len(), 4);
        let active: Vec<&str> = buttons
            .iter()
            .filter(|b| b.has_class(ACTIVE_CLASS))
            .filter_map(|b| b.attr("data-cols"))
            .collect();
        assert_eq!(active, vec!["3"]);

        let html = el.to_html();
        assert!(html.contains("Done (ESC)"));
        assert!(html.contains(r#"id="gpm-restore-btn" class="gpm-action-btn" style="display: block;""#));
    }

    #[test]
    fn inactive_overlay_hides_restore() {
        let html = Overlay::new()
            .element(&state(Phase::Inactive, ColumnPreference::Auto))
            .to_html();
        assert!(html.starts_with(r#"<div id="guitar-play-mode-overlay"><div id="gpm-toolbar">"#));
        assert!(html.contains(">Edit</button>"));
        assert!(html.contains("display: none;"));
    }

    #[test]
    fn document_carries_style_block() {
        let mut overlay = Overlay::new();
        overlay.style = "pre { color: red; }".into();
        overlay.set_column_count(3);
        let doc = overlay.render_document(&state(Phase::Active, ColumnPreference::Auto), "A & B");
        assert!(doc.contains(r#"<style id="gpm-adapter-style">pre { color: red; }</style>"#));
        assert!(doc.contains("<title>A &amp; B</title>"));
        assert!(doc.contains(r#"<body style="overflow: hidden;">"#));
        assert!(doc.contains(r#"<div id="gpm-content" style="column-count: 3;">"#));
    }
}
