//! Language variants and their per-language settings.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::classify::{GenericClassifier, OutputClassifier, RubyClassifier, RustClassifier};

/// A supported language family.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Variant {
    #[default]
    Generic,
    Ruby,
    Rust,
}

impl Variant {
    /// The classifier for this variant's error payloads.
    pub fn classifier(&self) -> Arc<dyn OutputClassifier> {
        match self {
            Self::Generic => Arc::new(GenericClassifier),
            Self::Ruby => Arc::new(RubyClassifier),
            Self::Rust => Arc::new(RustClassifier),
        }
    }
}

/// Per-language settings, selected at startup and injected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageProfile {
    pub variant: Variant,
    /// Kernel language identity a session must report.
    pub language: String,
    /// Human-facing name, e.g. "Ruby".
    pub display_name: String,
    /// Line that delimits cells once trimmed.
    pub cell_separator: String,
}

impl LanguageProfile {
    pub fn for_variant(variant: Variant) -> Self {
        let (language, display_name, cell_separator) = match variant {
            Variant::Generic => ("python", "Python", "# %%"),
            Variant::Ruby => ("ruby", "Ruby", "# %%"),
            Variant::Rust => ("rust", "Rust", "// %%"),
        };
        Self {
            variant,
            language: language.to_string(),
            display_name: display_name.to_string(),
            cell_separator: cell_separator.to_string(),
        }
    }

    pub fn classifier(&self) -> Arc<dyn OutputClassifier> {
        self.variant.classifier()
    }
}

impl Default for LanguageProfile {
    fn default() -> Self {
        Self::for_variant(Variant::default())
    }
}
