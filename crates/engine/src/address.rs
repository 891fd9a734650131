//! Binding address parsing.
//!
//! Site builders tag elements with free-form address strings such as
//! `hero.titulo`, `producto-pizza.precio.fam` or `menu.pizzas.napolitana.nombre`.
//! [`BindingAddress::parse`] turns them into a closed set of variants. Parsing
//! is total: an address the engine does not recognize becomes
//! [`BindingAddress::Generic`] and is still resolvable, because a typo on a
//! third-party page must never stop the rest of the page from hydrating.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static TESTIMONIAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^testimonio-([^.]+)\.(.+)$").unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

static MENU_CATEGORY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^menu\.categorias\.([^.]+)\.(.+)$").unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

static PRODUCT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^producto-([^.]+)\.(.+)$").unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

static PRODUCT_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:menu|item)-([^.]+)\.(.+)$").unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

static MENU_PRODUCT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^menu\.([^.]+)\.([^.]+)\.(.+)$").unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

/// Literal prefixes and the section they strip to.
const PREFIXES: &[(&str, Section)] = &[
    ("config-tienda.", Section::Config),
    ("hero.", Section::Hero),
    ("footer.", Section::Footer),
    ("testimonios-config.", Section::TestimonialSection),
];

#[derive(Debug, Clone, Copy)]
enum Section {
    Config,
    Hero,
    Footer,
    TestimonialSection,
}

/// A parsed binding address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BindingAddress {
    /// General site configuration field.
    Config { field: String },
    /// Hero banner field.
    Hero { field: String },
    /// Footer field.
    Footer { field: String },
    /// Testimonial-section copy.
    TestimonialSectionConfig { field: String },
    /// Field of one testimonial, addressed by its `dom_id`.
    Testimonial { dom_id: String, field: String },
    /// Field of one product, addressed by `dom_id`, id or name.
    Product {
        identifier: String,
        field: String,
        category: Option<String>,
    },
    /// Copy of a menu category.
    MenuCategory { slug: String, field: String },
    /// Anything else, kept verbatim.
    Generic { raw: String },
}

impl BindingAddress {
    /// Parse an address string. Never fails.
    #[must_use]
    pub fn parse(original: &str) -> Self {
        let raw = original.trim();

        for (prefix, section) in PREFIXES {
            if let Some(field) = raw.strip_prefix(prefix) {
                if field.is_empty() || field.split('.').any(str::is_empty) {
                    return Self::generic(original);
                }
                return section.address(field);
            }
        }

        if let Some(c) = TESTIMONIAL.captures(raw) {
            return Self::Testimonial {
                dom_id: c[1].to_string(),
                field: c[2].to_string(),
            };
        }

        if let Some(c) = MENU_CATEGORY.captures(raw) {
            return Self::MenuCategory {
                slug: c[1].to_string(),
                field: c[2].to_string(),
            };
        }

        if let Some(c) = PRODUCT.captures(raw).or_else(|| PRODUCT_ALIAS.captures(raw)) {
            return Self::Product {
                identifier: c[1].to_string(),
                field: c[2].to_string(),
                category: None,
            };
        }

        if let Some(c) = MENU_PRODUCT.captures(raw) {
            return Self::Product {
                identifier: c[2].to_string(),
                field: c[3].to_string(),
                category: Some(c[1].to_string()),
            };
        }

        match raw.split_once('.') {
            None if raw.is_empty() => Self::generic(original),
            None => Self::Config {
                field: raw.to_string(),
            },
            Some((head, rest)) => {
                if head.is_empty() || rest.split('.').any(str::is_empty) {
                    return Self::generic(original);
                }
                match head.to_ascii_lowercase().as_str() {
                    "config" | "navbar" | "nav" => Self::Config {
                        field: rest.to_string(),
                    },
                    "header" | "banner" => Self::Hero {
                        field: rest.to_string(),
                    },
                    "about" | "services" | "features" => Self::Config {
                        field: raw.to_string(),
                    },
                    "contact" | "social" => Self::Footer {
                        field: rest.to_string(),
                    },
                    _ => Self::generic(original),
                }
            }
        }
    }

    fn generic(raw: &str) -> Self {
        tracing::warn!(address = %raw, "Unrecognized binding address, treating as generic");
        Self::Generic {
            raw: raw.to_string(),
        }
    }

    /// The field part of the address (the whole string for `Generic`).
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Config { field }
            | Self::Hero { field }
            | Self::Footer { field }
            | Self::TestimonialSectionConfig { field }
            | Self::Testimonial { field, .. }
            | Self::Product { field, .. }
            | Self::MenuCategory { field, .. } => field,
            Self::Generic { raw } => raw.trim(),
        }
    }

    /// Whether the field addresses a URL (`href`) rather than visible content.
    #[must_use]
    pub fn is_link_field(&self) -> bool {
        crate::apply::classify_field(self.field()) == crate::apply::FieldKind::Link
    }
}

impl Section {
    fn address(self, field: &str) -> BindingAddress {
        let field = field.to_string();
        match self {
            Self::Config => BindingAddress::Config { field },
            Self::Hero => BindingAddress::Hero { field },
            Self::Footer => BindingAddress::Footer { field },
            Self::TestimonialSection => BindingAddress::TestimonialSectionConfig { field },
        }
    }
}

impl fmt::Display for BindingAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { field } => write!(f, "config-tienda.{field}"),
            Self::Hero { field } => write!(f, "hero.{field}"),
            Self::Footer { field } => write!(f, "footer.{field}"),
            Self::TestimonialSectionConfig { field } => write!(f, "testimonios-config.{field}"),
            Self::Testimonial { dom_id, field } => write!(f, "testimonio-{dom_id}.{field}"),
            Self::Product {
                identifier,
                field,
                category: Some(category),
            } => write!(f, "menu.{category}.{identifier}.{field}"),
            Self::Product {
                identifier, field, ..
            } => write!(f, "producto-{identifier}.{field}"),
            Self::MenuCategory { slug, field } => write!(f, "menu.categorias.{slug}.{field}"),
            Self::Generic { raw } => f.write_str(raw),
        }
    }
}

impl FromStr for BindingAddress {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}
