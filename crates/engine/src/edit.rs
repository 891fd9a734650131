//! Inline editing.
//!
//! One element at a time moves through
//! `Idle -> Selected -> Editing -> Saving -> (Saved | Failed)`; `Idle` is the
//! absence of an [`EditSession`]. Saves are optimistic only after the backend
//! accepted the write: a failed save leaves the page untouched.
//!
//! Elements that are themselves links, buttons or navigation (or sit inside
//! one) keep their native single-click behavior and are selected with a
//! double click, and never when the bound field is the link target itself.

use std::fmt;

use mineiro_core::{Price, PriceError, StoreSnapshot, Table};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::address::BindingAddress;
use crate::api::{ApiError, ImageUpload};
use crate::apply::{self, ApplyOptions, FieldKind, classify_field};
use crate::config::EngineConfig;
use crate::dom::{Document, ElementId};
use crate::error::EngineError;
use crate::history::ChangeHistoryEntry;
use crate::hydrate::HydrationReport;
use crate::preserved::StorageError;
use crate::resolve;
use crate::richtext::{FormatCommand, RichTextDraft};
use crate::session::{EngineSession, EngineState, returned_row};
use crate::writeback::{
    WritePlan, WritebackError, coerce_value, merge_product_row, merge_testimonial_row,
    plan_quick_add_product, plan_quick_add_testimonial, plan_write,
};

const INTERACTIVE_TAGS: &[&str] = &["a", "button", "nav", "select", "summary", "label", "input"];

const INTERACTIVE_ROLES: &[&str] = &["button", "link", "menuitem", "tab", "navigation"];

/// Tags edited with the rich-text form; other text fields get a single line.
const BLOCK_TAGS: &[&str] = &[
    "p",
    "div",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "blockquote",
    "section",
    "article",
    "li",
    "td",
];

/// Errors that can occur while editing.
#[derive(Debug, Error)]
pub enum EditError {
    #[error("Admin mode is not enabled")]
    NotAdmin,

    #[error("Store is suspended")]
    Suspended,

    #[error("No snapshot loaded")]
    NoSnapshot,

    #[error("No element is selected")]
    NoSession,

    #[error("Not allowed while the edit is {0}")]
    WrongPhase(EditPhase),

    #[error("Element {0} carries no binding")]
    NotBound(ElementId),

    #[error("Element {0} is no longer in the page")]
    ElementGone(ElementId),

    #[error("The open editor does not take images")]
    NotAnImageEditor,

    #[error("Invalid price: {0}")]
    InvalidPrice(#[from] PriceError),

    #[error(transparent)]
    Writeback(#[from] WritebackError),

    #[error("Save failed: {0}")]
    Backend(#[from] ApiError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Where the open edit stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "error", rename_all = "snake_case")]
pub enum EditPhase {
    Idle,
    Selected,
    Editing,
    Saving,
    Saved,
    /// The last save failed with this message.
    Failed(String),
}

impl fmt::Display for EditPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Selected => f.write_str("selected"),
            Self::Editing => f.write_str("editing"),
            Self::Saving => f.write_str("saving"),
            Self::Saved => f.write_str("saved"),
            Self::Failed(message) => write!(f, "failed ({message})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gesture {
    Click,
    DoubleClick,
}

/// The draft of the open editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorForm {
    /// Image URL, typed or uploaded.
    Image { url: String },
    RichText(RichTextDraft),
    /// Number box; parsed on save.
    Price { input: String },
    /// Single-line text.
    Text { input: String },
}

impl EditorForm {
    /// Replace the draft with `input`.
    pub fn set_input(&mut self, input: &str) {
        match self {
            Self::Image { url } => *url = input.to_string(),
            Self::RichText(draft) => draft.set_text(input),
            Self::Price { input: current } | Self::Text { input: current } => {
                *current = input.to_string();
            }
        }
    }

    /// Apply a formatting command. Only the rich-text form takes them.
    pub fn format(&mut self, command: &FormatCommand, range: std::ops::Range<usize>) -> bool {
        match self {
            Self::RichText(draft) => {
                draft.apply(command, range);
                true
            }
            _ => false,
        }
    }

    /// The value a save persists.
    ///
    /// # Errors
    ///
    /// Returns an error if a price input is not a number.
    pub fn value(&self) -> Result<Value, EditError> {
        Ok(match self {
            Self::Image { url } => Value::String(url.trim().to_string()),
            Self::RichText(draft) => Value::String(draft.value_to_persist()),
            Self::Price { input } => Price::parse(input)?.to_json(),
            Self::Text { input } => Value::String(input.clone()),
        })
    }

    const fn allows_markup(&self) -> bool {
        matches!(self, Self::RichText(_))
    }
}

/// The element being edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    pub element: ElementId,
    pub address: BindingAddress,
    pub phase: EditPhase,
    pub form: Option<EditorForm>,
}

/// Whether `gesture` selects an element.
#[must_use]
pub const fn gesture_selects(interactive: bool, link_field: bool, gesture: Gesture) -> bool {
    match (interactive, gesture) {
        (false, _) => true,
        (true, Gesture::DoubleClick) => !link_field,
        (true, Gesture::Click) => false,
    }
}

/// Whether the element, or an ancestor, has native click behavior.
#[must_use]
pub fn is_interactive(doc: &dyn Document, element: ElementId) -> bool {
    let body = doc.body();
    let mut current = Some(element);
    while let Some(el) = current
        && el != body
    {
        let tag = doc.tag_name(el).unwrap_or_default();
        let role = doc.attribute(el, "role").unwrap_or_default();
        if INTERACTIVE_TAGS.contains(&tag.as_str())
            || INTERACTIVE_ROLES.contains(&role.to_ascii_lowercase().as_str())
            || doc.attribute(el, "onclick").is_some()
        {
            return true;
        }
        current = doc.parent(el);
    }
    false
}

/// The value an element currently shows for `field`, read back from the page.
#[must_use]
pub fn element_value(doc: &dyn Document, element: ElementId, field: &str) -> Option<Value> {
    let tag = doc.tag_name(element)?;
    let text = match (classify_field(field), tag.as_str()) {
        (_, "img") => doc.attribute(element, "src")?,
        (FieldKind::Link, "a") => doc.attribute(element, "href")?,
        (FieldKind::Image, _) => css_url(&doc.style(element, "background-image")?)?,
        _ => {
            let html = doc.inner_html(element)?;
            if apply::looks_like_markup(&html) && apply::is_editor_markup(&html) {
                html
            } else {
                doc.text_content(element)?
            }
        }
    };
    Some(coerce_value(field, Value::String(text)))
}

fn css_url(style: &str) -> Option<String> {
    let inner = style.trim().strip_prefix("url(")?.strip_suffix(')')?.trim();
    Some(inner.trim_matches(|c| c == '"' || c == '\'').to_string())
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn form_for(
    doc: &dyn Document,
    element: ElementId,
    address: &BindingAddress,
    snapshot: Option<&StoreSnapshot>,
) -> EditorForm {
    let field = address.field();
    let tag = doc.tag_name(element).unwrap_or_default();
    let current = snapshot
        .and_then(|s| resolve::resolve(address, s))
        .or_else(|| element_value(doc, element, field))
        .map(|v| value_text(&v))
        .unwrap_or_default();

    let kind = classify_field(field);
    if kind == FieldKind::Image || tag == "img" {
        return EditorForm::Image { url: current };
    }
    match kind {
        FieldKind::Price => EditorForm::Price { input: current },
        FieldKind::Text | FieldKind::RichText if BLOCK_TAGS.contains(&tag.as_str()) => {
            EditorForm::RichText(RichTextDraft::from_html(
                &doc.inner_html(element).unwrap_or_default(),
            ))
        }
        _ => EditorForm::Text { input: current },
    }
}

fn ensure_editable(state: &EngineState) -> Result<(), EditError> {
    if !state.admin {
        return Err(EditError::NotAdmin);
    }
    if state.status.is_some_and(|s| !s.is_operational()) {
        return Err(EditError::Suspended);
    }
    if state.snapshot.is_none() {
        return Err(EditError::NoSnapshot);
    }
    Ok(())
}

/// Merge a sent write into the snapshot, re-planned against the snapshot as
/// it is now in case it changed while the write was in flight.
fn merge_write(
    snapshot: &mut StoreSnapshot,
    address: &BindingAddress,
    value: Value,
    config: &EngineConfig,
    sent: &WritePlan,
) {
    match plan_write(address, value, snapshot, config) {
        Ok(plan) => plan.apply(snapshot),
        Err(_) => sent.apply(snapshot),
    }
}

// =============================================================================
// Session operations
// =============================================================================

impl EngineSession {
    /// Handle a gesture on `element`. Returns whether it was selected.
    ///
    /// # Errors
    ///
    /// Returns an error if editing is not possible right now or the element
    /// is not bound.
    pub fn select(&self, element: ElementId, gesture: Gesture) -> Result<bool, EditError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        ensure_editable(state)?;
        if let Some(edit) = &state.edit
            && edit.phase == EditPhase::Saving
        {
            return Err(EditError::WrongPhase(EditPhase::Saving));
        }

        let doc = state.document.as_ref();
        if !doc.contains(element) {
            return Err(EditError::ElementGone(element));
        }
        let address = state
            .hydrator
            .address_of(doc, element)
            .ok_or(EditError::NotBound(element))?;
        if !gesture_selects(is_interactive(doc, element), address.is_link_field(), gesture) {
            debug!(element = %element, ?gesture, "Gesture left to the page");
            return Ok(false);
        }

        state.hydrator.capture_original(doc, element);
        debug!(element = %element, address = %address, "Selected");
        state.edit = Some(EditSession {
            element,
            address,
            phase: EditPhase::Selected,
            form: None,
        });
        Ok(true)
    }

    /// Open the editor for the selected element.
    ///
    /// A failed save keeps its draft, so reopening returns it.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is selected or a save is in flight.
    pub fn begin_edit(&self) -> Result<EditorForm, EditError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        ensure_editable(state)?;
        let edit = state.edit.as_mut().ok_or(EditError::NoSession)?;

        if edit.phase == EditPhase::Saving {
            return Err(EditError::WrongPhase(EditPhase::Saving));
        }
        if matches!(edit.phase, EditPhase::Editing | EditPhase::Failed(_))
            && let Some(form) = edit.form.clone()
        {
            edit.phase = EditPhase::Editing;
            return Ok(form);
        }

        let form = form_for(
            state.document.as_ref(),
            edit.element,
            &edit.address,
            state.snapshot.as_ref(),
        );
        edit.form = Some(form.clone());
        edit.phase = EditPhase::Editing;
        Ok(form)
    }

    /// Change the open draft.
    ///
    /// # Errors
    ///
    /// Returns an error if no editor is open.
    pub fn with_edit<R>(&self, f: impl FnOnce(&mut EditorForm) -> R) -> Result<R, EditError> {
        let mut state = self.lock();
        let edit = state.edit.as_mut().ok_or(EditError::NoSession)?;
        if !matches!(edit.phase, EditPhase::Editing | EditPhase::Failed(_)) {
            return Err(EditError::WrongPhase(edit.phase.clone()));
        }
        let form = edit.form.as_mut().ok_or(EditError::NoSession)?;
        Ok(f(form))
    }

    /// Drop the open edit without saving. Returns whether one was open.
    pub fn cancel_edit(&self) -> bool {
        self.lock().edit.take().is_some()
    }

    /// Phase of the open edit.
    #[must_use]
    pub fn edit_phase(&self) -> EditPhase {
        self.lock()
            .edit
            .as_ref()
            .map_or(EditPhase::Idle, |e| e.phase.clone())
    }

    /// Upload an image into the open image editor. When the upload endpoint
    /// fails the image is inlined as a `data:` URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the open editor is not an image editor.
    pub async fn upload_image(&self, upload: ImageUpload) -> Result<String, EditError> {
        {
            let state = self.lock();
            let edit = state.edit.as_ref().ok_or(EditError::NoSession)?;
            if edit.phase != EditPhase::Editing {
                return Err(EditError::WrongPhase(edit.phase.clone()));
            }
            if !matches!(edit.form, Some(EditorForm::Image { .. })) {
                return Err(EditError::NotAnImageEditor);
            }
        }

        let url = match self.inner.backend.upload_image(&upload).await {
            Ok(url) => url,
            Err(e) => {
                warn!(file = %upload.file_name, error = %e, "Image upload failed, inlining as data URL");
                upload.to_data_url()
            }
        };

        if let Some(EditSession {
            form: Some(EditorForm::Image { url: current }),
            ..
        }) = self.lock().edit.as_mut()
        {
            current.clone_from(&url);
        }
        Ok(url)
    }

    /// Persist the open draft.
    ///
    /// On success the value is written to every element bound to the same
    /// address, guarded, removed from the preserved set, merged into the
    /// snapshot and recorded for undo. Returns the number of elements
    /// updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft is invalid or the backend refused the
    /// write; the page is left as it was.
    #[instrument(skip(self))]
    pub async fn save(&self) -> Result<usize, EditError> {
        let (element, address, value, previous, allow_markup, plan) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            ensure_editable(state)?;
            let edit = state.edit.as_mut().ok_or(EditError::NoSession)?;
            if !matches!(edit.phase, EditPhase::Editing | EditPhase::Failed(_)) {
                return Err(EditError::WrongPhase(edit.phase.clone()));
            }
            let form = edit.form.as_ref().ok_or(EditError::NoSession)?;
            let field = edit.address.field();
            let value = coerce_value(field, form.value()?);
            let allow_markup = form.allows_markup();

            let snapshot = state.snapshot.as_ref().ok_or(EditError::NoSnapshot)?;
            let previous = resolve::resolve(&edit.address, snapshot)
                .or_else(|| element_value(state.document.as_ref(), edit.element, field));
            let plan = plan_write(&edit.address, value.clone(), snapshot, &self.inner.config)?;
            edit.phase = EditPhase::Saving;
            (edit.element, edit.address.clone(), value, previous, allow_markup, plan)
        };

        let sent = self.send_plan(&plan).await;

        let mut guard = self.lock();
        let state = &mut *guard;
        if let Err(e) = sent {
            warn!(address = %address, error = %e, "Save failed");
            if let Some(edit) = state.edit.as_mut().filter(|e| e.element == element) {
                edit.phase = EditPhase::Failed(e.to_string());
            }
            return Err(e.into());
        }

        let doc = state.document.as_mut();
        let elements = state.hydrator.elements_for(&*doc, &address);
        let options = ApplyOptions { allow_markup };
        let mut kind = None;
        for el in &elements {
            state.hydrator.capture_original(&*doc, *el);
            match apply::apply(doc, *el, &value, address.field(), options) {
                Ok(applied) => {
                    kind.get_or_insert(applied);
                }
                Err(e) => debug!(element = %el, error = %e, "Skipped element"),
            }
        }

        state.guard.mark_edited(&address, value.clone());
        if let Err(e) = state.preserved.remove(&address) {
            warn!(address = %address, error = %e, "Failed to persist preserved set");
        }
        if let Some(snapshot) = state.snapshot.as_mut() {
            merge_write(snapshot, &address, value.clone(), &self.inner.config, &plan);
        }
        state.history.push(ChangeHistoryEntry::new(
            element,
            address.clone(),
            previous,
            value,
            kind.unwrap_or_else(|| classify_field(address.field())),
        ));
        if let Some(edit) = state.edit.as_mut().filter(|e| e.element == element) {
            edit.phase = EditPhase::Saved;
        }

        info!(address = %address, elements = elements.len(), "Saved");
        Ok(elements.len())
    }

    /// Discard the draft and put the page's original markup back on every
    /// element bound to the selected address. The address is kept out of
    /// hydration across reloads and the original value is written to the
    /// backend.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is selected, the preserved set cannot be
    /// persisted or the write fails (the page stays restored).
    #[instrument(skip(self))]
    pub async fn restore_original(&self) -> Result<(), EditError> {
        let (address, original, plan) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            ensure_editable(state)?;
            let edit = state.edit.take().ok_or(EditError::NoSession)?;
            if edit.phase == EditPhase::Saving {
                state.edit = Some(edit);
                return Err(EditError::WrongPhase(EditPhase::Saving));
            }

            let doc = state.document.as_mut();
            for el in state.hydrator.elements_for(&*doc, &edit.address) {
                if let Some(markup) = state.hydrator.original(el) {
                    doc.restore(el, markup);
                }
            }
            state.preserved.insert(&edit.address)?;

            let Some(original) = element_value(&*doc, edit.element, edit.address.field()) else {
                info!(address = %edit.address, "Restored original markup");
                return Ok(());
            };
            state.guard.mark_edited(&edit.address, original.clone());
            let snapshot = state.snapshot.as_ref().ok_or(EditError::NoSnapshot)?;
            let plan = plan_write(&edit.address, original.clone(), snapshot, &self.inner.config)?;
            (edit.address, original, plan)
        };

        self.send_plan(&plan).await?;

        let mut state = self.lock();
        if let Some(snapshot) = state.snapshot.as_mut() {
            merge_write(snapshot, &address, original, &self.inner.config, &plan);
        }
        info!(address = %address, "Restored original markup");
        Ok(())
    }

    /// Revert the newest saved edit: re-issue the write with the previous
    /// value and put it back on the page. Undo itself is not recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if there is nothing to undo or the write fails, in
    /// which case the entry stays on the stack.
    #[instrument(skip(self))]
    pub async fn undo(&self) -> Result<ChangeHistoryEntry, EngineError> {
        let (entry, plan) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            if state.status.is_some_and(|s| !s.is_operational()) {
                return Err(EngineError::Suspended(self.inner.config.slug.clone()));
            }
            let entry = state.history.pop().ok_or(EngineError::NothingToUndo)?;
            let planned = match (&entry.previous_value, state.snapshot.as_ref()) {
                (Some(previous), Some(snapshot)) => {
                    plan_write(&entry.address, previous.clone(), snapshot, &self.inner.config)
                        .map(Some)
                }
                _ => Ok(None),
            };
            match planned {
                Ok(plan) => (entry, plan),
                Err(e) => {
                    state.history.push(entry);
                    return Err(EditError::from(e).into());
                }
            }
        };

        if let Some(plan) = &plan
            && let Err(e) = self.send_plan(plan).await
        {
            warn!(address = %entry.address, error = %e, "Undo write failed");
            self.lock().history.push(entry);
            return Err(e.into());
        }

        let mut guard = self.lock();
        let state = &mut *guard;
        let doc = state.document.as_mut();
        let elements = state.hydrator.elements_for(&*doc, &entry.address);
        match (&entry.previous_value, &plan) {
            (Some(previous), Some(plan)) => {
                let options = ApplyOptions {
                    allow_markup: entry.field_kind == FieldKind::RichText,
                };
                for el in &elements {
                    if let Err(e) = apply::apply(doc, *el, previous, entry.address.field(), options) {
                        debug!(element = %el, error = %e, "Skipped element");
                    }
                }
                state.guard.mark_edited(&entry.address, previous.clone());
                if let Some(snapshot) = state.snapshot.as_mut() {
                    merge_write(snapshot, &entry.address, previous.clone(), &self.inner.config, plan);
                }
            }
            _ => {
                for el in &elements {
                    if let Some(markup) = state.hydrator.original(*el) {
                        doc.restore(*el, markup);
                    }
                }
            }
        }

        info!(address = %entry.address, "Undid edit");
        Ok(entry)
    }

    /// Create (or update) a product row keyed by `dom_id` and hydrate the
    /// addresses naming it.
    ///
    /// # Errors
    ///
    /// Returns an error if editing is not possible, the fields do not form a
    /// product or the write fails.
    pub async fn quick_add_product(
        &self,
        dom_id: &str,
        fields: Map<String, Value>,
    ) -> Result<HydrationReport, EngineError> {
        self.quick_add(Table::Productos, dom_id, fields).await
    }

    /// Create (or update) a testimonial row keyed by `dom_id` and hydrate the
    /// addresses naming it.
    ///
    /// # Errors
    ///
    /// Returns an error if editing is not possible, the fields do not form a
    /// testimonial or the write fails.
    pub async fn quick_add_testimonial(
        &self,
        dom_id: &str,
        fields: Map<String, Value>,
    ) -> Result<HydrationReport, EngineError> {
        self.quick_add(Table::Testimonios, dom_id, fields).await
    }

    #[instrument(skip(self, fields))]
    async fn quick_add(
        &self,
        table: Table,
        dom_id: &str,
        fields: Map<String, Value>,
    ) -> Result<HydrationReport, EngineError> {
        let plan = {
            let state = self.lock();
            ensure_editable(&state)?;
            let snapshot = state.snapshot.as_ref().ok_or(EngineError::NoSnapshot)?;
            match table {
                Table::Testimonios => plan_quick_add_testimonial(snapshot, dom_id, fields),
                _ => plan_quick_add_product(snapshot, dom_id, fields),
            }
            .map_err(EditError::from)?
        };

        let responses = self.send_plan(&plan).await?;

        let mut guard = self.lock();
        let state = &mut *guard;
        if let Some(snapshot) = state.snapshot.as_mut() {
            plan.apply(snapshot);
            if let Some(row) = returned_row(&responses) {
                let merged = match table {
                    Table::Testimonios => {
                        serde_json::from_value(row).map(|t| merge_testimonial_row(snapshot, t))
                    }
                    _ => serde_json::from_value(row).map(|p| merge_product_row(snapshot, p)),
                };
                if let Err(e) = merged {
                    warn!(error = %e, "Keeping provisional row, backend row unreadable");
                }
            }
        }

        let dom_id = dom_id.trim();
        let report = state.rehydrate(|address| match address {
            BindingAddress::Product { identifier, .. } => {
                table == Table::Productos && identifier == dom_id
            }
            BindingAddress::Testimonial { dom_id: id, .. } => {
                table == Table::Testimonios && id == dom_id
            }
            _ => false,
        });
        info!(table = %table, dom_id, applied = report.applied, "Quick-added row");
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dom::MemoryDocument;

    #[test]
    fn test_gesture_rule() {
        assert!(gesture_selects(false, false, Gesture::Click));
        assert!(gesture_selects(false, true, Gesture::DoubleClick));
        assert!(!gesture_selects(true, false, Gesture::Click));
        assert!(gesture_selects(true, false, Gesture::DoubleClick));
        assert!(!gesture_selects(true, true, Gesture::DoubleClick));
    }

    #[test]
    fn test_interactive_ancestors() {
        let mut doc = MemoryDocument::new();
        let body = doc.body();
        let nav = doc.append_element(body, "nav", &[], "");
        let item = doc.append_element(nav, "span", &[], "Menú");
        let card = doc.append_element(body, "div", &[("role", "button")], "");
        let price = doc.append_element(body, "span", &[], "$9.990");

        assert!(is_interactive(&doc, item));
        assert!(is_interactive(&doc, card));
        assert!(!is_interactive(&doc, price));
    }

    #[test]
    fn test_element_value_reads_page() {
        let mut doc = MemoryDocument::new();
        let body = doc.body();
        let img = doc.append_element(body, "img", &[("src", "/pizza.jpg")], "");
        let link = doc.append_element(body, "a", &[("href", "https://wa.me/569")], "Escríbenos");
        let price = doc.append_element(body, "span", &[], "$9.990");
        let hero = doc.append_element(body, "section", &[], "");
        doc.set_style(hero, "background-image", "url(\"/hero.jpg\")");

        assert_eq!(element_value(&doc, img, "imagen"), Some(Value::from("/pizza.jpg")));
        assert_eq!(
            element_value(&doc, link, "whatsapp_url"),
            Some(Value::from("https://wa.me/569"))
        );
        assert_eq!(element_value(&doc, link, "texto"), Some(Value::from("Escríbenos")));
        assert_eq!(element_value(&doc, price, "precio"), Some(Value::from(9990)));
        assert_eq!(element_value(&doc, hero, "imagen_fondo"), Some(Value::from("/hero.jpg")));
    }

    #[test]
    fn test_form_values() {
        let mut form = EditorForm::Price {
            input: String::new(),
        };
        form.set_input("$12.990");
        assert_eq!(form.value().unwrap(), Value::from(12990));
        form.set_input("gratis");
        assert!(matches!(form.value(), Err(EditError::InvalidPrice(_))));

        let mut form = EditorForm::RichText(RichTextDraft::from_text("Hola mundo"));
        assert!(form.format(&FormatCommand::Bold, 0..4));
        assert_eq!(form.value().unwrap(), Value::from("<b>Hola</b> mundo"));

        let mut form = EditorForm::Text {
            input: String::new(),
        };
        assert!(!form.format(&FormatCommand::Bold, 0..4));
    }

    #[test]
    fn test_form_kind_follows_field_and_tag() {
        let mut doc = MemoryDocument::new();
        let body = doc.body();
        let p = doc.append_element(body, "p", &[], "Texto <b>largo</b>");
        let span = doc.append_element(body, "span", &[], "Corto");
        let img = doc.append_element(body, "img", &[("src", "/a.png")], "");

        let form = form_for(&doc, p, &BindingAddress::parse("hero.descripcion"), None);
        assert!(matches!(form, EditorForm::RichText(_)));
        let form = form_for(&doc, span, &BindingAddress::parse("hero.titulo"), None);
        assert_eq!(form, EditorForm::Text { input: "Corto".to_string() });
        let form = form_for(&doc, img, &BindingAddress::parse("hero.foto"), None);
        assert_eq!(form, EditorForm::Image { url: "/a.png".to_string() });
        let form = form_for(&doc, span, &BindingAddress::parse("producto-napo.precio"), None);
        assert!(matches!(form, EditorForm::Price { .. }));
    }
}
