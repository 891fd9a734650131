//! Writing resolved values into elements.
//!
//! How a value lands on the page depends on the field name and the element:
//! image URLs go to `src` or `background-image`, links to `href`, prices are
//! formatted, ratings become stars, editor markup becomes inner HTML and
//! everything else is plain text. Only the target property and the hydrated
//! marker are written; every other attribute is left alone.

use std::sync::LazyLock;

use mineiro_core::Price;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::dom::{Document, ElementId};

/// Marker attribute set on every element the engine has written to.
pub const HYDRATED_ATTRIBUTE: &str = "data-mineiro-hydrated";

const IMAGE_TOKENS: &[&str] = &[
    "imagen", "image", "img", "foto", "photo", "logo", "avatar", "fondo", "background",
];
const LINK_TOKENS: &[&str] = &["url", "link", "href", "enlace", "web"];
const PRICE_TOKENS: &[&str] = &["precio", "price", "valor", "costo", "monto"];
const RATING_TOKENS: &[&str] = &["rating", "estrellas", "stars", "calificacion", "puntuacion"];

/// Tags the rich-text editor produces.
const EDITOR_TAGS: &[&str] = &[
    "b", "i", "u", "s", "strong", "em", "span", "div", "br", "p", "font",
];

const MAX_STARS: u8 = 5;

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</?([a-zA-Z][a-zA-Z0-9]*)\b([^>]*)>").unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

static EVENT_HANDLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\bon[a-z]+\s*=|javascript:)").unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

/// Errors that can occur when applying a value.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The element was detached before the write.
    #[error("Element {0} is no longer in the document")]
    ElementGone(ElementId),

    /// The value is an object or array and has no textual form.
    #[error("Value for {field} cannot be rendered")]
    Unrenderable { field: String },
}

/// How a field is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Image,
    Link,
    Price,
    Rating,
    RichText,
    Text,
}

/// Options for one write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Accept arbitrary markup (rich-text saves). Hydration leaves this off
    /// and only accepts markup made of editor tags.
    pub allow_markup: bool,
}

/// Classify a field from its name alone.
#[must_use]
pub fn classify_field(field: &str) -> FieldKind {
    let tokens: Vec<String> = field
        .split(['.', '_', '-'])
        .map(str::to_lowercase)
        .collect();
    let has = |set: &[&str]| tokens.iter().any(|t| set.contains(&t.as_str()));

    if has(IMAGE_TOKENS) {
        FieldKind::Image
    } else if has(LINK_TOKENS) {
        FieldKind::Link
    } else if has(PRICE_TOKENS) {
        FieldKind::Price
    } else if has(RATING_TOKENS) {
        FieldKind::Rating
    } else {
        FieldKind::Text
    }
}

/// Write `value` into `element` and mark it hydrated.
///
/// # Errors
///
/// Returns an error if the element is detached or the value has no textual
/// form.
pub fn apply(
    doc: &mut dyn Document,
    element: ElementId,
    value: &Value,
    field: &str,
    options: ApplyOptions,
) -> Result<FieldKind, ApplyError> {
    if !doc.contains(element) {
        return Err(ApplyError::ElementGone(element));
    }
    let text = value_text(value).ok_or_else(|| ApplyError::Unrenderable {
        field: field.to_string(),
    })?;
    let is_img = doc.tag_name(element).as_deref() == Some("img");
    let class = classify_field(field);

    let kind = if (class == FieldKind::Image || is_img) && is_image_url(&text) {
        if is_img {
            doc.set_attribute(element, "src", &text);
        } else {
            doc.set_style(element, "background-image", &format!("url(\"{text}\")"));
        }
        FieldKind::Image
    } else if class == FieldKind::Link {
        if doc.tag_name(element).as_deref() == Some("a") {
            doc.set_attribute(element, "href", &text);
        } else {
            doc.set_text_content(element, &text);
        }
        FieldKind::Link
    } else if let Some(price) = (class == FieldKind::Price)
        .then(|| format_price(value))
        .flatten()
    {
        doc.set_text_content(element, &price);
        FieldKind::Price
    } else if let Some(stars) = (class == FieldKind::Rating)
        .then(|| render_stars(value))
        .flatten()
    {
        doc.set_text_content(element, &stars);
        FieldKind::Rating
    } else if looks_like_markup(&text) && (options.allow_markup || is_editor_markup(&text)) {
        doc.set_inner_html(element, &text);
        FieldKind::RichText
    } else {
        doc.set_text_content(element, &text);
        FieldKind::Text
    };

    mark_hydrated(doc, element);
    Ok(kind)
}

/// Format a price value as `$12.990`.
#[must_use]
pub fn format_price(value: &Value) -> Option<String> {
    Price::from_json(value).map(|p| p.display())
}

/// Five star glyphs, filled up to the clamped rating.
#[must_use]
pub fn render_stars(value: &Value) -> Option<String> {
    let rating = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok()?,
        _ => return None,
    };
    if !rating.is_finite() {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let filled = rating.round().clamp(0.0, f64::from(MAX_STARS)) as u8;
    Some(
        std::iter::repeat_n('★', usize::from(filled))
            .chain(std::iter::repeat_n('☆', usize::from(MAX_STARS - filled)))
            .collect(),
    )
}

/// Whether a string can be used as an image source.
#[must_use]
pub fn is_image_url(value: &str) -> bool {
    let value = value.trim();
    value.starts_with("https://")
        || value.starts_with("http://")
        || value.starts_with("data:image/")
        || (value.starts_with('/') && value.len() > 1)
}

/// Whether `html` contains at least one tag.
#[must_use]
pub fn looks_like_markup(html: &str) -> bool {
    TAG.is_match(html)
}

/// Whether `html` uses only the rich-text editor's formatting tags.
#[must_use]
pub fn is_editor_markup(html: &str) -> bool {
    looks_like_markup(html)
        && !EVENT_HANDLER.is_match(html)
        && TAG.captures_iter(html).all(|c| {
            let name = c[1].to_ascii_lowercase();
            EDITOR_TAGS.contains(&name.as_str())
        })
}

pub fn mark_hydrated(doc: &mut dyn Document, element: ElementId) {
    doc.set_attribute(element, HYDRATED_ATTRIBUTE, "true");
}

#[must_use]
pub fn is_hydrated(doc: &dyn Document, element: ElementId) -> bool {
    doc.attribute(element, HYDRATED_ATTRIBUTE).is_some()
}

pub fn clear_hydrated(doc: &mut dyn Document, element: ElementId) {
    doc.remove_attribute(element, HYDRATED_ATTRIBUTE);
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dom::MemoryDocument;

    fn doc_with(tag: &str, attributes: &[(&str, &str)]) -> (MemoryDocument, ElementId) {
        let mut doc = MemoryDocument::new();
        let body = doc.body();
        let el = doc.append_element(body, tag, attributes, "original");
        (doc, el)
    }

    #[test]
    fn test_classify_field() {
        assert_eq!(classify_field("imagen_url"), FieldKind::Image);
        assert_eq!(classify_field("instagram_url"), FieldKind::Link);
        assert_eq!(classify_field("precio.fam"), FieldKind::Price);
        assert_eq!(classify_field("rating"), FieldKind::Rating);
        assert_eq!(classify_field("titulo"), FieldKind::Text);
    }

    #[test]
    fn test_image_on_img_sets_src_only() {
        let (mut doc, el) = doc_with("img", &[("class", "hero"), ("alt", "Pizza")]);
        let kind = apply(&mut doc, el, &json!("https://cdn.x/p.jpg"), "imagen", ApplyOptions::default()).unwrap();

        assert_eq!(kind, FieldKind::Image);
        assert_eq!(doc.attribute(el, "src").as_deref(), Some("https://cdn.x/p.jpg"));
        assert_eq!(doc.attribute(el, "class").as_deref(), Some("hero"));
        assert_eq!(doc.attribute(el, "alt").as_deref(), Some("Pizza"));
        assert!(is_hydrated(&doc, el));
    }

    #[test]
    fn test_image_on_div_sets_background() {
        let (mut doc, el) = doc_with("div", &[("style", "color: red;")]);
        apply(&mut doc, el, &json!("/img/fondo.png"), "hero.fondo", ApplyOptions::default()).unwrap();
        assert_eq!(
            doc.style(el, "background-image").as_deref(),
            Some("url(\"/img/fondo.png\")")
        );
        assert_eq!(doc.style(el, "color").as_deref(), Some("red"));
        assert_eq!(doc.text_content(el).as_deref(), Some("original"));
    }

    #[test]
    fn test_image_field_with_non_url_is_text() {
        let (mut doc, el) = doc_with("div", &[]);
        let kind = apply(&mut doc, el, &json!("sin imagen"), "imagen", ApplyOptions::default()).unwrap();
        assert_eq!(kind, FieldKind::Text);
        assert_eq!(doc.text_content(el).as_deref(), Some("sin imagen"));
    }

    #[test]
    fn test_link() {
        let (mut doc, a) = doc_with("a", &[("class", "btn")]);
        apply(&mut doc, a, &json!("https://wa.me/569"), "whatsapp_url", ApplyOptions::default()).unwrap();
        assert_eq!(doc.attribute(a, "href").as_deref(), Some("https://wa.me/569"));
        assert_eq!(doc.text_content(a).as_deref(), Some("original"));

        let (mut doc, span) = doc_with("span", &[]);
        apply(&mut doc, span, &json!("https://x.cl"), "web", ApplyOptions::default()).unwrap();
        assert_eq!(doc.text_content(span).as_deref(), Some("https://x.cl"));
    }

    #[test]
    fn test_price_and_rating() {
        let (mut doc, el) = doc_with("span", &[]);
        apply(&mut doc, el, &json!(12990), "precio", ApplyOptions::default()).unwrap();
        assert_eq!(doc.text_content(el).as_deref(), Some("$12.990"));

        apply(&mut doc, el, &json!(4), "rating", ApplyOptions::default()).unwrap();
        assert_eq!(doc.text_content(el).as_deref(), Some("★★★★☆"));

        apply(&mut doc, el, &json!(9), "rating", ApplyOptions::default()).unwrap();
        assert_eq!(doc.text_content(el).as_deref(), Some("★★★★★"));

        let kind = apply(&mut doc, el, &json!("Consultar"), "precio", ApplyOptions::default()).unwrap();
        assert_eq!(kind, FieldKind::Text);
    }

    #[test]
    fn test_markup_gating() {
        let (mut doc, el) = doc_with("p", &[]);
        let kind = apply(&mut doc, el, &json!("Hola <b>mundo</b>"), "texto", ApplyOptions::default()).unwrap();
        assert_eq!(kind, FieldKind::RichText);
        assert_eq!(doc.inner_html(el).as_deref(), Some("Hola <b>mundo</b>"));

        let hostile = "<img src=x onerror=alert(1)>";
        let kind = apply(&mut doc, el, &json!(hostile), "texto", ApplyOptions::default()).unwrap();
        assert_eq!(kind, FieldKind::Text);
        assert_eq!(doc.text_content(el).as_deref(), Some(hostile));

        let kind = apply(&mut doc, el, &json!("<h2>Menú</h2>"), "texto", ApplyOptions { allow_markup: true }).unwrap();
        assert_eq!(kind, FieldKind::RichText);
    }

    #[test]
    fn test_detached_and_unrenderable() {
        let (mut doc, el) = doc_with("p", &[]);
        assert!(matches!(
            apply(&mut doc, el, &json!({"a": 1}), "titulo", ApplyOptions::default()),
            Err(ApplyError::Unrenderable { .. })
        ));
        doc.remove(el);
        assert!(matches!(
            apply(&mut doc, el, &json!("x"), "titulo", ApplyOptions::default()),
            Err(ApplyError::ElementGone(_))
        ));
    }

    #[test]
    fn test_editor_markup_detection() {
        assert!(is_editor_markup("<span style=\"color: red\">Hola</span><br>"));
        assert!(!is_editor_markup("Hola"));
        assert!(!is_editor_markup("<script>alert(1)</script>"));
        assert!(!is_editor_markup("<b onclick=\"x()\">Hola</b>"));
    }
}
