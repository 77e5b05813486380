/// Plural category counts per language and normalisation of stored plural forms
use crate::catalog::{Catalog, Translation};
use crate::report::Warning;
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;

/// Used when a locale is not in the table
pub const FALLBACK_FORMS: usize = 2;

static LOCALE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z]{2,3})(?:[_-]([A-Za-z]{4}))?(?:[_-]([A-Za-z]{2}|\d{3}))?(?:[_.@-].*)?$")
        .expect("valid locale regex")
});

// Languages without grammatical number
const ONE_FORM: &[&str] = &[
    "bi", "bo", "dz", "fa", "fj", "gn", "hu", "id", "ja", "jv", "km", "ko", "lo", "ms", "my",
    "na", "om", "su", "th", "tr", "tt", "vi", "yo", "za", "zh",
];

const THREE_FORMS: &[&str] = &[
    "be", "bs", "cs", "ga", "hr", "lt", "lv", "mk", "pl", "ro", "ru", "sk", "sr", "uk",
];

const FOUR_FORMS: &[&str] = &["cy", "gd", "mt", "sl"];

const SIX_FORMS: &[&str] = &["ar"];

const TWO_FORMS: &[&str] = &[
    "af", "am", "as", "az", "bg", "bn", "br", "ca", "da", "de", "el", "en", "eo", "es", "et",
    "eu", "fi", "fil", "fo", "fr", "fy", "gl", "gu", "he", "hi", "hy", "ia", "is", "it", "ka",
    "kk", "kn", "ku", "ky", "lb", "ln", "ml", "mn", "mr", "nb", "ne", "nl", "nn", "no", "oc",
    "or", "pa", "ps", "pt", "sq", "sv", "sw", "ta", "te", "tg", "ti", "tk", "ur", "uz", "wa",
    "xh", "zu",
];

/// Language part of a locale such as `pt_PT`, `sr@latin` or `zh-Hant-TW`
pub fn language_code(locale: &str) -> Option<String> {
    LOCALE_RE
        .captures(locale.trim())
        .and_then(|captures| captures.get(1))
        .map(|language| language.as_str().to_ascii_lowercase())
}

/// Number of plural forms the target language distinguishes, if known
pub fn plural_form_count(locale: &str) -> Option<usize> {
    let language = language_code(locale)?;
    let language = language.as_str();
    if ONE_FORM.contains(&language) {
        Some(1)
    } else if TWO_FORMS.contains(&language) {
        Some(2)
    } else if THREE_FORMS.contains(&language) {
        Some(3)
    } else if FOUR_FORMS.contains(&language) {
        Some(4)
    } else if SIX_FORMS.contains(&language) {
        Some(6)
    } else {
        None
    }
}

/// Form count to use for `locale`, falling back to two forms
pub fn forms_for(locale: &str) -> usize {
    plural_form_count(locale).unwrap_or(FALLBACK_FORMS)
}

/// Pads or truncates every plural translation to the catalog language's form
/// count. Each adjusted message is reported.
pub fn normalize_plural_forms(catalog: &mut Catalog) -> Vec<Warning> {
    let mut warnings = Vec::new();
    let expected = match plural_form_count(&catalog.language) {
        Some(count) => count,
        None => {
            warn!(
                "no plural rules for locale '{}', assuming {} forms",
                catalog.language, FALLBACK_FORMS
            );
            warnings.push(Warning::UnknownLocale {
                locale: catalog.language.clone(),
                assumed_forms: FALLBACK_FORMS,
            });
            FALLBACK_FORMS
        }
    };

    for (context, message) in catalog.messages_mut() {
        let found = match &message.translation {
            Translation::Plural(forms) if forms.len() != expected => forms.len(),
            _ => continue,
        };
        let source_text = message.source().to_string();
        if let Translation::Plural(forms) = &mut message.translation {
            if forms[expected.min(found)..].iter().any(|form| !form.is_empty()) {
                warn!(
                    "{}: dropping {} translated plural form(s) of \"{}\"",
                    context,
                    found - expected,
                    source_text
                );
            }
            forms.resize(expected, String::new());
        }
        warnings.push(Warning::PluralFormMismatch {
            context: context.to_string(),
            source_text,
            expected,
            found,
        });
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Message, MessageKey};

    #[test]
    fn parses_locale_variants() {
        assert_eq!(language_code("pt_PT").as_deref(), Some("pt"));
        assert_eq!(language_code("zh-Hant-TW").as_deref(), Some("zh"));
        assert_eq!(language_code("sr@latin").as_deref(), Some("sr"));
        assert_eq!(language_code("HI").as_deref(), Some("hi"));
        assert_eq!(language_code("not a locale"), None);
    }

    #[test]
    fn counts_follow_language_family() {
        assert_eq!(plural_form_count("hi"), Some(2));
        assert_eq!(plural_form_count("pt_PT"), Some(2));
        assert_eq!(plural_form_count("ja"), Some(1));
        assert_eq!(plural_form_count("ru_RU"), Some(3));
        assert_eq!(plural_form_count("sl"), Some(4));
        assert_eq!(plural_form_count("ar"), Some(6));
        assert_eq!(plural_form_count("xx"), None);
        assert_eq!(forms_for("xx"), FALLBACK_FORMS);
    }

    fn plural_catalog(language: &str, forms: Vec<&str>) -> Catalog {
        let mut catalog = Catalog::new(language);
        let forms = forms.into_iter().map(String::from).collect();
        catalog
            .add_message(
                "Tiled::MapEditor",
                Message::new("Remove %n Object(s)", None, Translation::Plural(forms)),
            )
            .unwrap();
        catalog
    }

    fn stored_forms(catalog: &Catalog) -> Vec<String> {
        let key = MessageKey::new("Tiled::MapEditor", "Remove %n Object(s)", None);
        match &catalog.find_message(&key).unwrap().translation {
            Translation::Plural(forms) => forms.clone(),
            other => panic!("expected plural, got {other:?}"),
        }
    }

    #[test]
    fn pads_missing_forms() {
        let mut catalog =
            plural_catalog("ru", vec!["Удалить %n объект", "Удалить %n объекта"]);
        let warnings = normalize_plural_forms(&mut catalog);
        assert_eq!(stored_forms(&catalog).len(), 3);
        assert_eq!(stored_forms(&catalog)[2], "");
        assert_eq!(
            warnings,
            vec![Warning::PluralFormMismatch {
                context: "Tiled::MapEditor".into(),
                source_text: "Remove %n Object(s)".into(),
                expected: 3,
                found: 2,
            }]
        );
    }

    #[test]
    fn truncates_extra_forms() {
        let mut catalog = plural_catalog("ja", vec!["%n 個を削除", "extra"]);
        let warnings = normalize_plural_forms(&mut catalog);
        assert_eq!(stored_forms(&catalog), vec!["%n 個を削除".to_string()]);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn matching_counts_are_untouched() {
        let mut catalog = plural_catalog("pt_PT", vec!["Remover %n Objeto", "Remover %n Objetos"]);
        assert!(normalize_plural_forms(&mut catalog).is_empty());
    }

    #[test]
    fn unknown_locale_is_reported_once() {
        let mut catalog = plural_catalog("xx", vec!["a", "b"]);
        let warnings = normalize_plural_forms(&mut catalog);
        assert_eq!(
            warnings,
            vec![Warning::UnknownLocale {
                locale: "xx".into(),
                assumed_forms: 2,
            }]
        );
    }
}
