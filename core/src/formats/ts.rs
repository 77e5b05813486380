/// Qt Linguist TS reader and writer
/// Output follows the lupdate layout byte for byte so that unchanged catalogs
/// round-trip exactly.

use super::{CatalogParseError, FormatError};
use crate::catalog::{
    Catalog, LocationStyle, Message, MessageStatus, SourceReference, Translation,
};
use crate::encoding::{Encoding, UTF8_BOM};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

/// Separates length variants inside a single translation string
pub const VARIANT_SEPARATOR: char = '\u{9c}';

pub fn read(path: &Path) -> Result<Catalog, FormatError> {
    let decoded = crate::encoding::DecodedText::read_file(path).map_err(|source| FormatError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut catalog = read_str(&decoded.text).map_err(|source| FormatError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    catalog.newline = decoded.newline;
    catalog.byte_order_mark = decoded.encoding == Encoding::Utf8Bom;
    Ok(catalog)
}

/// Serializes `catalog` and replaces `path` in one rename
pub fn write(catalog: &Catalog, path: &Path) -> Result<(), FormatError> {
    crate::backup::backup_and_swap(path, &write_bytes(catalog), false)
        .map(|_| ())
        .map_err(|err| FormatError::Io {
            path: path.to_path_buf(),
            source: err.into_io(),
        })
}

pub fn read_str(input: &str) -> Result<Catalog, CatalogParseError> {
    TsReader::new(input).read_document()
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Running state used to turn relative `line="+N"` attributes into absolute lines.
/// Mirrors `LocationWriter`.
#[derive(Default)]
struct LocationState {
    current_file: Option<String>,
    message_file: Option<String>,
    lines: HashMap<String, i64>,
    saw_relative: bool,
    saw_absolute: bool,
}

struct TsReader<'a> {
    input: &'a str,
    reader: Reader<&'a [u8]>,
    locations: LocationState,
}

#[derive(Default)]
struct MessageParts {
    references: Vec<SourceReference>,
    source: Option<String>,
    old_source: Option<String>,
    comment: Option<String>,
    old_comment: Option<String>,
    extra_comment: Option<String>,
    translator_comment: Option<String>,
    user_data: Option<String>,
    extras: Vec<(String, String)>,
    translation: Option<(MessageStatus, RawTranslation)>,
}

#[derive(Default)]
struct RawTranslation {
    text: String,
    variants: Vec<String>,
    forms: Vec<String>,
}

impl<'a> TsReader<'a> {
    fn new(input: &'a str) -> Self {
        let mut reader = Reader::from_str(input);
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = true;
        Self {
            input,
            reader,
            locations: LocationState::default(),
        }
    }

    fn line(&self) -> usize {
        let pos = (self.reader.buffer_position() as usize).min(self.input.len());
        line_at(self.input, pos)
    }

    fn next(&mut self) -> Result<Event<'a>, CatalogParseError> {
        self.reader.read_event().map_err(|err| {
            let pos = (self.reader.error_position() as usize).min(self.input.len());
            CatalogParseError::Xml {
                line: line_at(self.input, pos),
                message: err.to_string(),
            }
        })
    }

    fn unexpected(&self, event: &Event<'_>, parent: &str) -> CatalogParseError {
        let found = match event {
            Event::Start(start) | Event::Empty(start) => {
                format!("<{}>", String::from_utf8_lossy(start.name().as_ref()))
            }
            Event::End(end) => format!("</{}>", String::from_utf8_lossy(end.name().as_ref())),
            Event::Text(_) | Event::CData(_) => "text".to_string(),
            _ => "markup".to_string(),
        };
        CatalogParseError::Unexpected {
            line: self.line(),
            found,
            parent: parent.to_string(),
        }
    }

    fn read_document(mut self) -> Result<Catalog, CatalogParseError> {
        loop {
            match self.next()? {
                Event::Decl(_) | Event::DocType(_) | Event::Comment(_) | Event::PI(_) => {}
                Event::Text(text) if is_blank(&text) => {}
                Event::Start(start) if start.name().as_ref() == b"TS" => {
                    let mut catalog = self.read_ts_attributes(&start)?;
                    self.read_ts_body(&mut catalog)?;
                    self.read_trailer()?;
                    return Ok(self.finish(catalog));
                }
                Event::Empty(start) if start.name().as_ref() == b"TS" => {
                    let catalog = self.read_ts_attributes(&start)?;
                    self.read_trailer()?;
                    return Ok(self.finish(catalog));
                }
                Event::Eof => return Err(CatalogParseError::MissingRoot),
                other => return Err(self.unexpected(&other, "document")),
            }
        }
    }

    fn finish(&self, mut catalog: Catalog) -> Catalog {
        catalog.location_style = if self.locations.saw_relative || !self.locations.saw_absolute {
            LocationStyle::Relative
        } else {
            LocationStyle::Absolute
        };
        catalog
    }

    fn read_trailer(&mut self) -> Result<(), CatalogParseError> {
        loop {
            match self.next()? {
                Event::Eof => return Ok(()),
                Event::Comment(_) | Event::PI(_) => {}
                Event::Text(text) if is_blank(&text) => {}
                other => return Err(self.unexpected(&other, "document")),
            }
        }
    }

    fn read_ts_attributes(&self, start: &BytesStart<'_>) -> Result<Catalog, CatalogParseError> {
        let mut version = None;
        let mut language = None;
        let mut source_language = None;
        for (key, value) in self.attributes(start)? {
            match key.as_str() {
                "version" => version = Some(value),
                "language" => language = Some(value),
                "sourcelanguage" => source_language = Some(value),
                _ => log::debug!("ignoring <TS {key}> attribute"),
            }
        }
        let version = version.ok_or(CatalogParseError::MissingVersion { line: self.line() })?;
        let mut catalog = Catalog::new(language.unwrap_or_default());
        catalog.version = version;
        catalog.source_language = source_language.filter(|lang| !lang.is_empty());
        Ok(catalog)
    }

    fn read_ts_body(&mut self, catalog: &mut Catalog) -> Result<(), CatalogParseError> {
        loop {
            let event = self.next()?;
            match &event {
                Event::Start(start) => match start.name().as_ref() {
                    b"context" => self.read_context(catalog)?,
                    b"dependencies" => self.read_dependencies(catalog)?,
                    _ => return Err(self.unexpected(&event, "TS")),
                },
                Event::Empty(start) => match start.name().as_ref() {
                    b"dependencies" => {}
                    _ => return Err(self.unexpected(&event, "TS")),
                },
                Event::End(_) => return Ok(()),
                Event::Text(text) if is_blank(text) => {}
                Event::Comment(_) => {}
                Event::Eof => return Err(eof("TS")),
                _ => return Err(self.unexpected(&event, "TS")),
            }
        }
    }

    fn read_dependencies(&mut self, catalog: &mut Catalog) -> Result<(), CatalogParseError> {
        loop {
            let event = self.next()?;
            match &event {
                Event::Empty(start) if start.name().as_ref() == b"dependency" => {
                    let catalog_name = self
                        .attributes(start)?
                        .into_iter()
                        .find(|(key, _)| key == "catalog")
                        .map(|(_, value)| value)
                        .ok_or_else(|| CatalogParseError::MissingElement {
                            line: self.line(),
                            element: "dependency",
                            child: "catalog",
                        })?;
                    catalog.dependencies.push(catalog_name);
                }
                Event::End(_) => return Ok(()),
                Event::Text(text) if is_blank(text) => {}
                Event::Eof => return Err(eof("dependencies")),
                _ => return Err(self.unexpected(&event, "dependencies")),
            }
        }
    }

    fn read_context(&mut self, catalog: &mut Catalog) -> Result<(), CatalogParseError> {
        let mut name: Option<String> = None;
        loop {
            let event = self.next()?;
            match &event {
                Event::Start(start) | Event::Empty(start) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    match start.name().as_ref() {
                        b"name" => {
                            let text = self.read_text_or_empty("name", is_empty)?;
                            catalog.ensure_context(&text);
                            name = Some(text);
                        }
                        b"comment" => {
                            let text = self.read_text_or_empty("comment", is_empty)?;
                            let context = name.as_deref().ok_or(CatalogParseError::MissingElement {
                                line: self.line(),
                                element: "context",
                                child: "name",
                            })?;
                            catalog.set_context_comment(context, Some(text));
                        }
                        b"message" => {
                            let line = self.line();
                            let context = name.clone().ok_or(CatalogParseError::MissingElement {
                                line,
                                element: "context",
                                child: "name",
                            })?;
                            let message = self.read_message(start, is_empty)?;
                            catalog.add_message(&context, message).map_err(|_| {
                                CatalogParseError::DuplicateMessage {
                                    line,
                                    context: context.clone(),
                                }
                            })?;
                        }
                        _ => return Err(self.unexpected(&event, "context")),
                    }
                }
                Event::End(_) => {
                    return match name {
                        Some(_) => Ok(()),
                        None => Err(CatalogParseError::MissingElement {
                            line: self.line(),
                            element: "context",
                            child: "name",
                        }),
                    };
                }
                Event::Text(text) if is_blank(text) => {}
                Event::Comment(_) => {}
                Event::Eof => return Err(eof("context")),
                _ => return Err(self.unexpected(&event, "context")),
            }
        }
    }

    fn read_message(
        &mut self,
        start: &BytesStart<'_>,
        is_empty: bool,
    ) -> Result<Message, CatalogParseError> {
        let line = self.line();
        let mut id = None;
        let mut is_plural = false;
        for (key, value) in self.attributes(start)? {
            match key.as_str() {
                "id" => id = Some(value),
                "numerus" => is_plural = value == "yes",
                _ => log::debug!("ignoring <message {key}> attribute"),
            }
        }

        self.locations.message_file = self.locations.current_file.clone();
        let mut parts = MessageParts::default();
        if !is_empty {
            self.read_message_body(&mut parts)?;
        }

        let source = parts.source.ok_or(CatalogParseError::MissingElement {
            line,
            element: "message",
            child: "source",
        })?;
        let (status, raw) = parts
            .translation
            .unwrap_or((MessageStatus::Unfinished, RawTranslation::default()));
        let translation = if is_plural {
            let forms = if !raw.forms.is_empty() {
                raw.forms
            } else if !raw.text.trim().is_empty() {
                vec![raw.text]
            } else {
                Vec::new()
            };
            Translation::Plural(forms)
        } else if !raw.variants.is_empty() {
            Translation::Single(join_variants(&raw.variants))
        } else {
            Translation::Single(raw.text)
        };

        let mut message = Message::new(source, parts.comment.as_deref(), translation);
        message.status = status;
        message.references = parts.references;
        message.id = id;
        message.old_source = parts.old_source;
        message.old_comment = parts.old_comment;
        message.extra_comment = parts.extra_comment;
        message.translator_comment = parts.translator_comment;
        message.user_data = parts.user_data;
        message.extras = parts.extras;
        Ok(message)
    }

    fn read_message_body(&mut self, parts: &mut MessageParts) -> Result<(), CatalogParseError> {
        loop {
            let event = self.next()?;
            match &event {
                Event::Start(start) | Event::Empty(start) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    let tag = start.name().as_ref().to_vec();
                    match tag.as_slice() {
                        b"location" => {
                            let reference = self.read_location(start, parts.references.is_empty())?;
                            parts.references.push(reference);
                            if !is_empty {
                                self.read_text("location")?;
                            }
                        }
                        b"source" => {
                            parts.source = Some(self.read_text_or_empty("source", is_empty)?)
                        }
                        b"oldsource" => {
                            parts.old_source = Some(self.read_text_or_empty("oldsource", is_empty)?)
                        }
                        b"comment" => {
                            parts.comment = Some(self.read_text_or_empty("comment", is_empty)?)
                        }
                        b"oldcomment" => {
                            parts.old_comment =
                                Some(self.read_text_or_empty("oldcomment", is_empty)?)
                        }
                        b"extracomment" => {
                            parts.extra_comment =
                                Some(self.read_text_or_empty("extracomment", is_empty)?)
                        }
                        b"translatorcomment" => {
                            parts.translator_comment =
                                Some(self.read_text_or_empty("translatorcomment", is_empty)?)
                        }
                        b"userdata" => {
                            parts.user_data = Some(self.read_text_or_empty("userdata", is_empty)?)
                        }
                        b"translation" => {
                            let status = self.translation_status(start)?;
                            let raw = if is_empty {
                                RawTranslation::default()
                            } else {
                                self.read_translation()?
                            };
                            parts.translation = Some((status, raw));
                        }
                        other if other.starts_with(b"extra-") => {
                            let name = String::from_utf8_lossy(&other[b"extra-".len()..])
                                .into_owned();
                            let element = String::from_utf8_lossy(other).into_owned();
                            let text = if is_empty {
                                String::new()
                            } else {
                                self.read_text_owned(&element)?
                            };
                            parts.extras.push((name, text));
                        }
                        _ => return Err(self.unexpected(&event, "message")),
                    }
                }
                Event::End(_) => return Ok(()),
                Event::Text(text) if is_blank(text) => {}
                Event::Comment(_) => {}
                Event::Eof => return Err(eof("message")),
                _ => return Err(self.unexpected(&event, "message")),
            }
        }
    }

    fn read_location(
        &mut self,
        start: &BytesStart<'_>,
        first_in_message: bool,
    ) -> Result<SourceReference, CatalogParseError> {
        let mut filename = None;
        let mut line_attr = None;
        for (key, value) in self.attributes(start)? {
            match key.as_str() {
                "filename" => filename = Some(value),
                "line" => line_attr = Some(value),
                _ => {}
            }
        }

        let file = match filename {
            Some(file) => {
                if first_in_message {
                    self.locations.current_file = Some(file.clone());
                }
                self.locations.message_file = Some(file.clone());
                file
            }
            None => self.locations.message_file.clone().ok_or(
                CatalogParseError::MissingElement {
                    line: self.line(),
                    element: "location",
                    child: "filename",
                },
            )?,
        };

        let line = match line_attr.filter(|value| !value.is_empty()) {
            None => None,
            Some(value) => {
                let at = self.line();
                let invalid = || CatalogParseError::InvalidAttribute {
                    line: at,
                    attribute: "line".to_string(),
                    value: value.clone(),
                };
                let parsed: i64 = value.parse().map_err(|_| invalid())?;
                let absolute = if value.starts_with('+') || value.starts_with('-') {
                    self.locations.saw_relative = true;
                    let running = self.locations.lines.entry(file.clone()).or_insert(0);
                    *running += parsed;
                    *running
                } else {
                    self.locations.saw_absolute = true;
                    parsed
                };
                Some(u32::try_from(absolute).map_err(|_| invalid())?)
            }
        };

        Ok(SourceReference { file, line })
    }

    fn translation_status(
        &self,
        start: &BytesStart<'_>,
    ) -> Result<MessageStatus, CatalogParseError> {
        let mut status = MessageStatus::Finished;
        for (key, value) in self.attributes(start)? {
            if key != "type" {
                continue;
            }
            status = match value.as_str() {
                "" => MessageStatus::Finished,
                "unfinished" => MessageStatus::Unfinished,
                "obsolete" => MessageStatus::Obsolete,
                "vanished" => MessageStatus::Vanished,
                _ => {
                    return Err(CatalogParseError::InvalidAttribute {
                        line: self.line(),
                        attribute: "type".to_string(),
                        value,
                    })
                }
            };
        }
        Ok(status)
    }

    fn read_translation(&mut self) -> Result<RawTranslation, CatalogParseError> {
        let mut raw = RawTranslation::default();
        loop {
            let event = self.next()?;
            match &event {
                Event::Text(text) => raw.text.push_str(&self.unescape(text)?),
                Event::CData(data) => raw.text.push_str(&String::from_utf8_lossy(data)),
                Event::Start(start) | Event::Empty(start) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    match start.name().as_ref() {
                        b"numerusform" if is_empty => raw.forms.push(String::new()),
                        b"numerusform" => raw.forms.push(self.read_form("numerusform")?),
                        b"lengthvariant" => {
                            let text = self.read_text_or_empty("lengthvariant", is_empty)?;
                            raw.variants.push(text);
                        }
                        b"byte" => raw.text.push(self.byte_value(start)?),
                        _ => return Err(self.unexpected(&event, "translation")),
                    }
                }
                Event::End(_) => return Ok(raw),
                Event::Comment(_) => {}
                Event::Eof => return Err(eof("translation")),
                _ => return Err(self.unexpected(&event, "translation")),
            }
        }
    }

    /// A plural form, which may itself hold length variants
    fn read_form(&mut self, tag: &'static str) -> Result<String, CatalogParseError> {
        let mut text = String::new();
        let mut variants = Vec::new();
        loop {
            let event = self.next()?;
            match &event {
                Event::Text(chunk) => text.push_str(&self.unescape(chunk)?),
                Event::CData(data) => text.push_str(&String::from_utf8_lossy(data)),
                Event::Start(start) if start.name().as_ref() == b"lengthvariant" => {
                    variants.push(self.read_text("lengthvariant")?);
                }
                Event::Empty(start) if start.name().as_ref() == b"lengthvariant" => {
                    variants.push(String::new());
                }
                Event::Empty(start) if start.name().as_ref() == b"byte" => {
                    text.push(self.byte_value(start)?);
                }
                Event::End(_) => {
                    return Ok(if variants.is_empty() {
                        text
                    } else {
                        join_variants(&variants)
                    });
                }
                Event::Comment(_) => {}
                Event::Eof => return Err(eof(tag)),
                _ => return Err(self.unexpected(&event, tag)),
            }
        }
    }

    fn read_text_or_empty(
        &mut self,
        tag: &'static str,
        is_empty: bool,
    ) -> Result<String, CatalogParseError> {
        if is_empty {
            Ok(String::new())
        } else {
            self.read_text(tag)
        }
    }

    fn read_text(&mut self, tag: &'static str) -> Result<String, CatalogParseError> {
        self.read_text_owned(tag)
    }

    /// Character content up to the closing tag, with `<byte/>` escapes decoded
    fn read_text_owned(&mut self, tag: &str) -> Result<String, CatalogParseError> {
        let mut text = String::new();
        loop {
            let event = self.next()?;
            match &event {
                Event::Text(chunk) => text.push_str(&self.unescape(chunk)?),
                Event::CData(data) => text.push_str(&String::from_utf8_lossy(data)),
                Event::Empty(start) if start.name().as_ref() == b"byte" => {
                    text.push(self.byte_value(start)?);
                }
                Event::End(_) => return Ok(text),
                Event::Comment(_) => {}
                Event::Eof => return Err(eof(tag)),
                _ => return Err(self.unexpected(&event, tag)),
            }
        }
    }

    fn byte_value(&self, start: &BytesStart<'_>) -> Result<char, CatalogParseError> {
        let value = self
            .attributes(start)?
            .into_iter()
            .find(|(key, _)| key == "value")
            .map(|(_, value)| value)
            .unwrap_or_default();
        let code = match value.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => value.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .ok_or_else(|| CatalogParseError::InvalidAttribute {
                line: self.line(),
                attribute: "value".to_string(),
                value,
            })
    }

    fn unescape<'t>(&self, text: &'t BytesText<'_>) -> Result<Cow<'t, str>, CatalogParseError> {
        text.unescape().map_err(|err| CatalogParseError::Xml {
            line: self.line(),
            message: err.to_string(),
        })
    }

    fn attributes(
        &self,
        start: &BytesStart<'_>,
    ) -> Result<Vec<(String, String)>, CatalogParseError> {
        let mut result = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|err| CatalogParseError::Xml {
                line: self.line(),
                message: err.to_string(),
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| CatalogParseError::Xml {
                    line: self.line(),
                    message: err.to_string(),
                })?
                .into_owned();
            result.push((key, value));
        }
        Ok(result)
    }
}

fn eof(element: &str) -> CatalogParseError {
    CatalogParseError::UnexpectedEof {
        element: element.to_string(),
    }
}

fn is_blank(text: &BytesText<'_>) -> bool {
    text.iter().all(u8::is_ascii_whitespace)
}

fn line_at(input: &str, pos: usize) -> usize {
    input.as_bytes()[..pos].iter().filter(|&&b| b == b'\n').count() + 1
}

fn join_variants(variants: &[String]) -> String {
    variants.join(&VARIANT_SEPARATOR.to_string())
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Emits `<location>` elements. In relative mode the `filename` attribute is
/// only written when the file changes, and `line` is a signed delta against
/// the last line written for that file.
struct LocationWriter {
    style: LocationStyle,
    current_file: Option<String>,
    lines: HashMap<String, i64>,
}

impl LocationWriter {
    fn new(style: LocationStyle) -> Self {
        Self {
            style,
            current_file: None,
            lines: HashMap::new(),
        }
    }

    fn write(&mut self, out: &mut String, references: &[SourceReference]) {
        match self.style {
            LocationStyle::None => {}
            LocationStyle::Absolute => {
                for reference in references {
                    out.push_str("        <location filename=\"");
                    protect_into(out, &reference.file);
                    out.push('"');
                    if let Some(line) = reference.line {
                        let _ = write!(out, " line=\"{line}\"");
                    }
                    out.push_str("/>\n");
                }
            }
            LocationStyle::Relative => {
                let mut message_file = self.current_file.clone();
                for (idx, reference) in references.iter().enumerate() {
                    let delta = reference.line.map(|line| {
                        let running = self.lines.entry(reference.file.clone()).or_insert(0);
                        let delta = i64::from(line) - *running;
                        *running = i64::from(line);
                        delta
                    });
                    let show_file = message_file.as_deref() != Some(reference.file.as_str());
                    if show_file {
                        if idx == 0 {
                            self.current_file = Some(reference.file.clone());
                        }
                        message_file = Some(reference.file.clone());
                    }

                    out.push_str("        <location");
                    if show_file {
                        out.push_str(" filename=\"");
                        protect_into(out, &reference.file);
                        out.push('"');
                    }
                    if let Some(delta) = delta {
                        let _ = write!(out, " line=\"{delta:+}\"");
                    }
                    out.push_str("/>\n");
                }
            }
        }
    }
}

/// File contents for `catalog`: `write_string` with the catalog's line
/// ending and byte order mark restored
pub fn write_bytes(catalog: &Catalog) -> Vec<u8> {
    let text = catalog.newline.apply(write_string(catalog));
    let mut bytes = Vec::with_capacity(text.len() + UTF8_BOM.len());
    if catalog.byte_order_mark {
        bytes.extend_from_slice(UTF8_BOM);
    }
    bytes.extend_from_slice(text.as_bytes());
    bytes
}

pub fn write_string(catalog: &Catalog) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<!DOCTYPE TS>\n");
    out.push_str("<TS version=\"");
    protect_into(&mut out, &catalog.version);
    out.push('"');
    if !catalog.language.is_empty() {
        out.push_str(" language=\"");
        protect_into(&mut out, &catalog.language);
        out.push('"');
    }
    if let Some(source_language) = catalog.source_language.as_deref().filter(|l| !l.is_empty()) {
        out.push_str(" sourcelanguage=\"");
        protect_into(&mut out, source_language);
        out.push('"');
    }
    out.push_str(">\n");

    if !catalog.dependencies.is_empty() {
        out.push_str("<dependencies>\n");
        for dependency in &catalog.dependencies {
            out.push_str("<dependency catalog=\"");
            protect_into(&mut out, dependency);
            out.push_str("\"/>\n");
        }
        out.push_str("</dependencies>\n");
    }

    let mut locations = LocationWriter::new(catalog.location_style);
    for context in catalog.iter_contexts() {
        out.push_str("<context>\n");
        write_element(&mut out, "    ", "name", context.name());
        if let Some(comment) = &context.comment {
            write_element(&mut out, "    ", "comment", comment);
        }
        for message in context.messages() {
            write_message(&mut out, &mut locations, message);
        }
        out.push_str("</context>\n");
    }
    out.push_str("</TS>\n");
    out
}

fn write_message(out: &mut String, locations: &mut LocationWriter, message: &Message) {
    out.push_str("    <message");
    if let Some(id) = &message.id {
        out.push_str(" id=\"");
        protect_into(out, id);
        out.push('"');
    }
    if message.is_plural() {
        out.push_str(" numerus=\"yes\"");
    }
    out.push_str(">\n");

    locations.write(out, &message.references);

    const INDENT: &str = "        ";
    write_element(out, INDENT, "source", message.source());
    if let Some(old_source) = &message.old_source {
        write_element(out, INDENT, "oldsource", old_source);
    }
    if let Some(comment) = message.disambiguation() {
        write_element(out, INDENT, "comment", comment);
    }
    if let Some(old_comment) = &message.old_comment {
        write_element(out, INDENT, "oldcomment", old_comment);
    }
    if let Some(extra_comment) = &message.extra_comment {
        write_element(out, INDENT, "extracomment", extra_comment);
    }
    if let Some(translator_comment) = &message.translator_comment {
        write_element(out, INDENT, "translatorcomment", translator_comment);
    }

    out.push_str("        <translation");
    match message.status {
        MessageStatus::Unfinished => out.push_str(" type=\"unfinished\""),
        MessageStatus::Obsolete => out.push_str(" type=\"obsolete\""),
        MessageStatus::Vanished => out.push_str(" type=\"vanished\""),
        MessageStatus::Finished => {}
    }
    match &message.translation {
        Translation::Plural(forms) => {
            out.push('>');
            for form in forms {
                out.push_str("\n            <numerusform");
                write_variants(out, "            ", form);
                out.push_str("</numerusform>");
            }
            out.push_str("\n        ");
        }
        Translation::Single(text) => write_variants(out, INDENT, text),
    }
    out.push_str("</translation>\n");

    if let Some(user_data) = &message.user_data {
        write_element(out, INDENT, "userdata", user_data);
    }
    for (name, value) in &message.extras {
        let tag = format!("extra-{name}");
        write_element(out, INDENT, &tag, value);
    }
    out.push_str("    </message>\n");
}

fn write_element(out: &mut String, indent: &str, tag: &str, text: &str) {
    let _ = write!(out, "{indent}<{tag}>");
    protect_into(out, text);
    let _ = writeln!(out, "</{tag}>");
}

/// Closes the opening tag and writes `text`, splitting length variants into
/// `<lengthvariant>` children.
fn write_variants(out: &mut String, indent: &str, text: &str) {
    if !text.contains(VARIANT_SEPARATOR) {
        out.push('>');
        protect_into(out, text);
        return;
    }
    out.push_str(" variants=\"yes\">");
    for variant in text.split(VARIANT_SEPARATOR) {
        let _ = write!(out, "\n    {indent}<lengthvariant>");
        protect_into(out, variant);
        out.push_str("</lengthvariant>");
    }
    let _ = write!(out, "\n{indent}");
}

/// XML-escapes payload text. Control characters that XML 1.0 cannot carry are
/// written as `<byte value="xN"/>`.
fn protect_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("&quot;"),
            '&' => out.push_str("&amp;"),
            '>' => out.push_str("&gt;"),
            '<' => out.push_str("&lt;"),
            '\'' => out.push_str("&apos;"),
            ch if (ch as u32) < 0x20 && !matches!(ch, '\r' | '\n' | '\t') => {
                let _ = write!(out, "<byte value=\"x{:x}\"/>", ch as u32);
            }
            ch => out.push(ch),
        }
    }
}
