/// Source scanners that find translatable call sites
///
/// Each scanner turns one decoded file into raw messages whose context is
/// still unresolved; the extractor resolves contexts once every file of the
/// tree has been seen.
pub mod cpp;
pub mod ui;

pub use cpp::CppScanner;
pub use ui::FormScanner;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a single file could not be scanned
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ScanError {
    pub line: usize,
    pub message: String,
}

impl ScanError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Where a message's context comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextSource {
    /// Named by the call, a `TRANSLATOR` comment, `Q_DECLARE_TR_FUNCTIONS` or a form's `<class>`
    Explicit(String),
    /// Qualified name of the innermost enclosing class
    Lexical(Vec<String>),
    /// A qualified scope (`Foo::bar() { ... }` or `Foo::tr(...)`) that still has
    /// to be matched against the classes declared in the tree
    Member {
        enclosing: Vec<String>,
        qualifier: Vec<String>,
        using_namespaces: Vec<Vec<String>>,
        /// Function definitions live inside `enclosing`, so an unresolved
        /// qualifier is taken relative to it
        is_definition: bool,
    },
    /// No scope applies
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub context: ContextSource,
    pub source_text: String,
    pub disambiguation: Option<String>,
    pub is_plural: bool,
    pub line: usize,
    pub extra_comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredClass {
    /// e.g. `Tiled::MapEditor`
    pub qualified_name: String,
    /// Differs from the qualified name after `Q_DECLARE_TR_FUNCTIONS`
    pub context_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutput {
    pub messages: Vec<RawMessage>,
    pub declared_classes: Vec<DeclaredClass>,
}

/// A function or macro whose string argument is translatable
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MarkerSpec {
    pub name: String,
    /// Argument holding the context; the enclosing scope is used when absent
    #[serde(default)]
    pub context_arg: Option<usize>,
    pub source_arg: usize,
    #[serde(default)]
    pub disambiguation_arg: Option<usize>,
    /// A call that passes this argument is plural
    #[serde(default)]
    pub count_arg: Option<usize>,
    #[serde(default)]
    pub always_plural: bool,
}

impl MarkerSpec {
    fn scoped(name: &str, source_arg: usize) -> Self {
        Self {
            name: name.to_string(),
            context_arg: None,
            source_arg,
            disambiguation_arg: None,
            count_arg: None,
            always_plural: false,
        }
    }

    fn explicit(name: &str) -> Self {
        Self {
            context_arg: Some(0),
            ..Self::scoped(name, 1)
        }
    }
}

/// Qt's conventions: `tr`, `translate` and the `QT_*_NOOP` family
pub fn default_markers() -> Vec<MarkerSpec> {
    vec![
        MarkerSpec {
            disambiguation_arg: Some(1),
            count_arg: Some(2),
            ..MarkerSpec::scoped("tr", 0)
        },
        MarkerSpec {
            disambiguation_arg: Some(1),
            count_arg: Some(2),
            ..MarkerSpec::scoped("trUtf8", 0)
        },
        MarkerSpec {
            disambiguation_arg: Some(2),
            count_arg: Some(3),
            ..MarkerSpec::explicit("translate")
        },
        MarkerSpec::scoped("QT_TR_NOOP", 0),
        MarkerSpec::scoped("QT_TR_NOOP_UTF8", 0),
        MarkerSpec {
            always_plural: true,
            ..MarkerSpec::scoped("QT_TR_N_NOOP", 0)
        },
        MarkerSpec::explicit("QT_TRANSLATE_NOOP"),
        MarkerSpec::explicit("QT_TRANSLATE_NOOP_UTF8"),
        MarkerSpec {
            disambiguation_arg: Some(2),
            ..MarkerSpec::explicit("QT_TRANSLATE_NOOP3")
        },
        MarkerSpec {
            always_plural: true,
            ..MarkerSpec::explicit("QT_TRANSLATE_N_NOOP")
        },
        MarkerSpec {
            disambiguation_arg: Some(2),
            always_plural: true,
            ..MarkerSpec::explicit("QT_TRANSLATE_N_NOOP3")
        },
    ]
}
