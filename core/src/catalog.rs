/// In-memory translation catalog
/// Contexts keep insertion order; messages are indexed by (context, source, disambiguation)

use crate::encoding::Newline;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("message '{source_text}' already exists in context '{context}'")]
    DuplicateMessage { context: String, source_text: String },

    #[error("no message '{source_text}' in context '{context}'")]
    UnknownMessage { context: String, source_text: String },

    #[error("message '{source_text}' cannot move from {from} to {to}")]
    InvalidTransition {
        source_text: String,
        from: MessageStatus,
        to: MessageStatus,
    },

    #[error("message '{source_text}' expects a {expected} translation")]
    TranslationShape {
        source_text: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Unfinished,
    Finished,
    Obsolete,
    Vanished,
}

impl MessageStatus {
    /// Still referenced by the last merge
    pub fn is_active(self) -> bool {
        matches!(self, Self::Unfinished | Self::Finished)
    }

    /// Anything short of vanished counts as live for context pruning
    pub fn is_live(self) -> bool {
        self != Self::Vanished
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unfinished => "unfinished",
            Self::Finished => "finished",
            Self::Obsolete => "obsolete",
            Self::Vanished => "vanished",
        };
        f.write_str(name)
    }
}

/// How source references are written to disk
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LocationStyle {
    /// `line="+12"` deltas against the previous line seen for the same file
    #[default]
    Relative,
    Absolute,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceReference {
    pub file: String,
    /// Absolute, 1-based. Locations without a line keep `None`.
    pub line: Option<u32>,
}

impl SourceReference {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line: Some(line),
        }
    }
}

/// Composite identity of a message. An empty disambiguation is the same as none.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub context: String,
    pub source: String,
    pub disambiguation: Option<String>,
}

impl MessageKey {
    pub fn new(
        context: impl Into<String>,
        source: impl Into<String>,
        disambiguation: Option<&str>,
    ) -> Self {
        Self {
            context: context.into(),
            source: source.into(),
            disambiguation: normalize_disambiguation(disambiguation),
        }
    }
}

fn normalize_disambiguation(value: Option<&str>) -> Option<String> {
    value.filter(|text| !text.is_empty()).map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    Single(String),
    /// One entry per plural category of the target language
    Plural(Vec<String>),
}

impl Translation {
    pub fn empty(is_plural: bool, forms: usize) -> Self {
        if is_plural {
            Self::Plural(vec![String::new(); forms])
        } else {
            Self::Single(String::new())
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Single(text) => text.is_empty(),
            Self::Plural(forms) => forms.iter().all(String::is_empty),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    source: String,
    disambiguation: Option<String>,
    pub translation: Translation,
    pub status: MessageStatus,
    pub references: Vec<SourceReference>,
    pub id: Option<String>,
    pub old_source: Option<String>,
    pub old_comment: Option<String>,
    /// Developer note shown to translators
    pub extra_comment: Option<String>,
    pub translator_comment: Option<String>,
    pub user_data: Option<String>,
    /// `extra-*` elements, tag suffix and text, in document order
    pub extras: Vec<(String, String)>,
}

impl Message {
    /// A fresh, untranslated message
    pub fn new(
        source: impl Into<String>,
        disambiguation: Option<&str>,
        translation: Translation,
    ) -> Self {
        Self {
            source: source.into(),
            disambiguation: normalize_disambiguation(disambiguation),
            translation,
            status: MessageStatus::Unfinished,
            references: Vec::new(),
            id: None,
            old_source: None,
            old_comment: None,
            extra_comment: None,
            translator_comment: None,
            user_data: None,
            extras: Vec::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn disambiguation(&self) -> Option<&str> {
        self.disambiguation.as_deref()
    }

    pub fn is_plural(&self) -> bool {
        matches!(self.translation, Translation::Plural(_))
    }

    pub fn has_translation(&self) -> bool {
        !self.translation.is_empty()
    }

    pub fn key(&self, context: &str) -> MessageKey {
        MessageKey {
            context: context.to_string(),
            source: self.source.clone(),
            disambiguation: self.disambiguation.clone(),
        }
    }

    /// Switches between singular and plural shape without dropping text.
    /// A singular translation becomes the first plural form. Leaving plural is
    /// refused while more than one form is translated; returns whether the
    /// message now has the requested shape.
    pub fn set_plural(&mut self, is_plural: bool, forms: usize) -> bool {
        let converted = match (&self.translation, is_plural) {
            (Translation::Single(text), true) => {
                let mut plural = vec![String::new(); forms.max(1)];
                plural[0] = text.clone();
                Translation::Plural(plural)
            }
            (Translation::Plural(plural), false) => {
                let mut translated = plural.iter().filter(|form| !form.is_empty());
                let first = translated.next().cloned().unwrap_or_default();
                if translated.next().is_some() {
                    return false;
                }
                Translation::Single(first)
            }
            _ => return true,
        };
        self.translation = converted;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    name: String,
    pub comment: Option<String>,
    messages: Vec<Message>,
}

impl Context {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            comment: None,
            messages: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn live_message_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| message.status.is_live())
            .count()
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    pub contexts: usize,
    pub messages: usize,
    pub unfinished: usize,
    pub finished: usize,
    pub obsolete: usize,
    pub vanished: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub version: String,
    /// Target locale, e.g. `pt_PT`
    pub language: String,
    pub source_language: Option<String>,
    pub location_style: LocationStyle,
    /// Line ending of the file the catalog was read from
    pub newline: Newline,
    /// Whether that file started with a UTF-8 byte order mark
    pub byte_order_mark: bool,
    pub dependencies: Vec<String>,
    contexts: Vec<Context>,
    context_index: HashMap<String, usize>,
    message_index: HashMap<MessageKey, (usize, usize)>,
}

pub const DEFAULT_TS_VERSION: &str = "2.1";

impl Catalog {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            version: DEFAULT_TS_VERSION.to_string(),
            language: language.into(),
            source_language: None,
            location_style: LocationStyle::default(),
            newline: Newline::default(),
            byte_order_mark: false,
            dependencies: Vec::new(),
            contexts: Vec::new(),
            context_index: HashMap::new(),
            message_index: HashMap::new(),
        }
    }

    pub fn find_message(&self, key: &MessageKey) -> Option<&Message> {
        let &(ctx, idx) = self.message_index.get(key)?;
        Some(&self.contexts[ctx].messages[idx])
    }

    pub fn find_message_mut(&mut self, key: &MessageKey) -> Option<&mut Message> {
        let &(ctx, idx) = self.message_index.get(key)?;
        Some(&mut self.contexts[ctx].messages[idx])
    }

    pub fn context(&self, name: &str) -> Option<&Context> {
        self.context_index.get(name).map(|&idx| &self.contexts[idx])
    }

    /// Returns the named context, appending an empty one when missing
    pub fn ensure_context(&mut self, name: &str) -> &mut Context {
        let idx = match self.context_index.get(name) {
            Some(&idx) => idx,
            None => {
                self.contexts.push(Context::new(name));
                let idx = self.contexts.len() - 1;
                self.context_index.insert(name.to_string(), idx);
                idx
            }
        };
        &mut self.contexts[idx]
    }

    /// Appends `message` to `context`. Use `find_message_mut` to update an existing triple.
    pub fn add_message(
        &mut self,
        context: &str,
        message: Message,
    ) -> Result<&mut Message, CatalogError> {
        let key = message.key(context);
        if self.message_index.contains_key(&key) {
            return Err(CatalogError::DuplicateMessage {
                context: key.context,
                source_text: key.source,
            });
        }

        self.ensure_context(context);
        let ctx = self.context_index[context];
        let messages = &mut self.contexts[ctx].messages;
        messages.push(message);
        let idx = messages.len() - 1;
        self.message_index.insert(key, (ctx, idx));
        Ok(&mut self.contexts[ctx].messages[idx])
    }

    pub fn mark_obsolete(&mut self, key: &MessageKey) -> Result<(), CatalogError> {
        self.transition(key, MessageStatus::Obsolete, |status| status.is_active())
    }

    pub fn mark_vanished(&mut self, key: &MessageKey) -> Result<(), CatalogError> {
        self.transition(key, MessageStatus::Vanished, |status| {
            status == MessageStatus::Obsolete
        })
    }

    /// Brings an obsolete or vanished message back, restoring the status its
    /// translation implies.
    pub fn resurrect(&mut self, key: &MessageKey) -> Result<MessageStatus, CatalogError> {
        let message = self.message_or_err(key)?;
        if message.status.is_active() {
            return Err(CatalogError::InvalidTransition {
                source_text: key.source.clone(),
                from: message.status,
                to: MessageStatus::Finished,
            });
        }
        message.status = if message.has_translation() {
            MessageStatus::Finished
        } else {
            MessageStatus::Unfinished
        };
        Ok(message.status)
    }

    /// Translator action: stores `translation` and marks the message finished
    /// when the text is non-empty.
    pub fn set_translation(
        &mut self,
        key: &MessageKey,
        translation: Translation,
    ) -> Result<(), CatalogError> {
        let message = self.message_or_err(key)?;
        if !message.status.is_active() {
            return Err(CatalogError::InvalidTransition {
                source_text: key.source.clone(),
                from: message.status,
                to: MessageStatus::Finished,
            });
        }
        if message.is_plural() != matches!(translation, Translation::Plural(_)) {
            return Err(CatalogError::TranslationShape {
                source_text: key.source.clone(),
                expected: if message.is_plural() { "plural" } else { "singular" },
            });
        }
        message.translation = translation;
        if message.has_translation() {
            message.status = MessageStatus::Finished;
        }
        Ok(())
    }

    pub fn iter_contexts(&self) -> std::slice::Iter<'_, Context> {
        self.contexts.iter()
    }

    pub fn iter_messages(&self) -> impl Iterator<Item = (&Context, &Message)> + '_ {
        self.contexts
            .iter()
            .flat_map(|context| context.messages.iter().map(move |message| (context, message)))
    }

    /// Every message key in stored order
    pub fn keys(&self) -> Vec<MessageKey> {
        self.iter_messages()
            .map(|(context, message)| message.key(&context.name))
            .collect()
    }

    /// Mutable access to every message in stored order. Identity fields stay read-only.
    pub fn messages_mut(&mut self) -> impl Iterator<Item = (&str, &mut Message)> + '_ {
        self.contexts.iter_mut().flat_map(|context| {
            let Context { name, messages, .. } = context;
            let name: &str = name;
            messages.iter_mut().map(move |message| (name, message))
        })
    }

    pub fn set_context_comment(&mut self, context: &str, comment: Option<String>) {
        self.ensure_context(context).comment = comment;
    }

    /// Drops messages rejected by `keep`; returns how many were removed
    pub fn retain_messages<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&str, &Message) -> bool,
    {
        let mut removed = 0;
        for context in &mut self.contexts {
            let before = context.messages.len();
            let name = context.name.clone();
            context.messages.retain(|message| keep(&name, message));
            removed += before - context.messages.len();
        }
        if removed > 0 {
            self.rebuild_index();
        }
        removed
    }

    /// Drops whole contexts (with their messages) rejected by `keep`
    pub fn retain_contexts<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&Context) -> bool,
    {
        let before = self.contexts.len();
        self.contexts.retain(|context| keep(context));
        let removed = before - self.contexts.len();
        if removed > 0 {
            self.rebuild_index();
        }
        removed
    }

    pub fn stats(&self) -> CatalogStats {
        let mut stats = CatalogStats {
            contexts: self.contexts.len(),
            ..CatalogStats::default()
        };
        for (_, message) in self.iter_messages() {
            stats.messages += 1;
            match message.status {
                MessageStatus::Unfinished => stats.unfinished += 1,
                MessageStatus::Finished => stats.finished += 1,
                MessageStatus::Obsolete => stats.obsolete += 1,
                MessageStatus::Vanished => stats.vanished += 1,
            }
        }
        stats
    }

    fn transition<F>(
        &mut self,
        key: &MessageKey,
        to: MessageStatus,
        allowed: F,
    ) -> Result<(), CatalogError>
    where
        F: Fn(MessageStatus) -> bool,
    {
        let message = self.message_or_err(key)?;
        if !allowed(message.status) {
            return Err(CatalogError::InvalidTransition {
                source_text: key.source.clone(),
                from: message.status,
                to,
            });
        }
        message.status = to;
        Ok(())
    }

    fn message_or_err(&mut self, key: &MessageKey) -> Result<&mut Message, CatalogError> {
        self.find_message_mut(key)
            .ok_or_else(|| CatalogError::UnknownMessage {
                context: key.context.clone(),
                source_text: key.source.clone(),
            })
    }

    fn rebuild_index(&mut self) {
        self.context_index.clear();
        self.message_index.clear();
        for (ctx, context) in self.contexts.iter().enumerate() {
            self.context_index.insert(context.name.clone(), ctx);
            for (idx, message) in context.messages.iter().enumerate() {
                self.message_index.insert(message.key(&context.name), (ctx, idx));
            }
        }
    }
}
