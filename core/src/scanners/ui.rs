/// Qt Designer form scanner
///
/// Every `<string>` of a `.ui` file is translatable unless marked
/// `notr="true"`; the form's top-level `<class>` names the context.
use super::{ContextSource, RawMessage, ScanError, ScanOutput};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, Clone, Default)]
pub struct FormScanner;

impl FormScanner {
    pub fn new() -> Self {
        Self
    }

    pub fn scan(&self, content: &str) -> Result<ScanOutput, ScanError> {
        let mut reader = Reader::from_str(content);
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = true;

        let line_of = |pos: u64| {
            let pos = (pos as usize).min(content.len());
            content.as_bytes()[..pos].iter().filter(|&&b| b == b'\n').count() + 1
        };

        let mut path: Vec<Vec<u8>> = Vec::new();
        let mut class_name: Option<String> = None;
        let mut pending: Option<PendingString> = None;
        let mut found: Vec<(String, Option<String>, Option<String>, usize)> = Vec::new();

        loop {
            let event = reader.read_event().map_err(|err| {
                ScanError::new(line_of(reader.error_position()), err.to_string())
            })?;
            let line = line_of(reader.buffer_position());

            match event {
                Event::Start(start) => {
                    let name = start.name().as_ref().to_vec();
                    if name == b"string" {
                        pending = Some(PendingString::from_start(&start, line)?);
                    } else if name == b"class" && path.len() == 1 && path[0] == b"ui" {
                        class_name = Some(String::new());
                    }
                    path.push(name);
                }
                Event::Empty(start) if start.name().as_ref() == b"string" => {
                    // `<string/>` has nothing to translate
                    PendingString::from_start(&start, line)?;
                }
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .map_err(|err| ScanError::new(line, err.to_string()))?;
                    if let Some(pending) = pending.as_mut() {
                        pending.text.push_str(&text);
                    } else if is_class_element(&path) {
                        if let Some(class_name) = class_name.as_mut() {
                            class_name.push_str(text.trim());
                        }
                    }
                }
                Event::CData(data) => {
                    if let Some(pending) = pending.as_mut() {
                        pending.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::End(end) => {
                    if end.name().as_ref() == b"string" {
                        if let Some(done) = pending.take() {
                            if done.translatable && !done.text.is_empty() {
                                found.push((
                                    done.text,
                                    done.comment,
                                    done.extra_comment,
                                    done.line,
                                ));
                            }
                        }
                    }
                    path.pop();
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let context = match class_name.filter(|name| !name.is_empty()) {
            Some(name) => ContextSource::Explicit(name),
            None => {
                log::debug!("form has no <class>, using the default context");
                ContextSource::Default
            }
        };

        let messages = found
            .into_iter()
            .map(|(source_text, disambiguation, extra_comment, line)| RawMessage {
                context: context.clone(),
                source_text,
                disambiguation,
                is_plural: false,
                line,
                extra_comment,
            })
            .collect();

        Ok(ScanOutput {
            messages,
            declared_classes: Vec::new(),
        })
    }
}

fn is_class_element(path: &[Vec<u8>]) -> bool {
    path.len() == 2 && path[0] == b"ui" && path[1] == b"class"
}

struct PendingString {
    text: String,
    comment: Option<String>,
    extra_comment: Option<String>,
    translatable: bool,
    line: usize,
}

impl PendingString {
    fn from_start(start: &BytesStart<'_>, line: usize) -> Result<Self, ScanError> {
        let mut pending = Self {
            text: String::new(),
            comment: None,
            extra_comment: None,
            translatable: true,
            line,
        };
        for attr in start.attributes() {
            let attr = attr.map_err(|err| ScanError::new(line, err.to_string()))?;
            let value = attr
                .unescape_value()
                .map_err(|err| ScanError::new(line, err.to_string()))?
                .into_owned();
            match attr.key.as_ref() {
                b"notr" => pending.translatable = value != "true",
                b"comment" if !value.is_empty() => pending.comment = Some(value),
                b"extracomment" if !value.is_empty() => pending.extra_comment = Some(value),
                _ => {}
            }
        }
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ui version="4.0">
 <class>NewMapDialog</class>
 <widget class="QDialog" name="NewMapDialog">
  <property name="windowTitle">
   <string>New Map</string>
  </property>
  <widget class="QLabel" name="label">
   <property name="text">
    <string comment="map size" extracomment="Label next to the width field">Width:</string>
   </property>
  </widget>
  <widget class="QLineEdit" name="edit">
   <property name="placeholderText">
    <string notr="true">%1 x %2</string>
   </property>
   <property name="toolTip">
    <string/>
   </property>
   <property name="whatsThis">
    <string>Tiles &amp; objects</string>
   </property>
  </widget>
 </widget>
</ui>
"#;

    #[test]
    fn extracts_form_strings() {
        let output = FormScanner::new().scan(FORM).unwrap();
        let texts: Vec<&str> = output.messages.iter().map(|m| m.source_text.as_str()).collect();
        assert_eq!(texts, vec!["New Map", "Width:", "Tiles & objects"]);

        let width = &output.messages[1];
        assert_eq!(width.context, ContextSource::Explicit("NewMapDialog".into()));
        assert_eq!(width.disambiguation.as_deref(), Some("map size"));
        assert_eq!(width.extra_comment.as_deref(), Some("Label next to the width field"));
        assert_eq!(width.line, 10);
        assert_eq!(output.messages[0].line, 6);
    }

    #[test]
    fn form_without_class_uses_default_context() {
        let output = FormScanner::new()
            .scan("<ui version=\"4.0\"><widget><string>Hi</string></widget></ui>")
            .unwrap();
        assert_eq!(output.messages[0].context, ContextSource::Default);
    }

    #[test]
    fn malformed_form_reports_line() {
        let err = FormScanner::new()
            .scan("<ui>\n<class>A</class>\n<widget>\n</ui>\n")
            .unwrap_err();
        assert!(matches!(err.line, 3 | 4), "line {}", err.line);
    }
}
