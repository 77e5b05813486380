/// Reconciles a catalog with the messages found in the current source tree
use crate::catalog::{
    Catalog, CatalogError, Message, MessageKey, MessageStatus, SourceReference, Translation,
};
use crate::extractor::FoundMessage;
use crate::plural;
use crate::report::Warning;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct MergeOptions {
    /// Drop contexts left without any non-vanished message
    pub prune_empty_contexts: bool,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub call_sites: usize,
    pub unique_messages: usize,
    pub new_messages: usize,
    /// Matched messages that were already active
    pub updated: usize,
    pub resurrected: usize,
    pub obsoleted: usize,
    pub vanished: usize,
    pub contexts_added: usize,
    pub contexts_pruned: usize,
    #[serde(skip)]
    pub warnings: Vec<Warning>,
}

/// All call sites of one (context, source, disambiguation) triple
struct Collapsed<'a> {
    key: MessageKey,
    is_plural: bool,
    plural_conflict: bool,
    references: Vec<SourceReference>,
    extra_comment: Option<&'a str>,
}

fn collapse<'a>(found: &'a [FoundMessage], warnings: &mut Vec<Warning>) -> Vec<Collapsed<'a>> {
    let mut collapsed: Vec<Collapsed<'a>> = Vec::new();
    let mut index: HashMap<MessageKey, usize> = HashMap::new();

    for message in found {
        let key = message.key();
        let reference = SourceReference::new(message.file.as_str(), message.line);
        match index.get(&key) {
            Some(&idx) => {
                let entry = &mut collapsed[idx];
                if entry.is_plural != message.is_plural && !entry.plural_conflict {
                    entry.plural_conflict = true;
                    warn!(
                        "{}:{}: \"{}\" in {} is used with and without a count",
                        message.file, message.line, message.source_text, message.context
                    );
                    warnings.push(Warning::ConflictingPlural {
                        context: message.context.clone(),
                        source_text: message.source_text.clone(),
                        file: message.file.clone(),
                        line: message.line,
                    });
                }
                entry.is_plural |= message.is_plural;
                if !entry.references.contains(&reference) {
                    entry.references.push(reference);
                }
                if entry.extra_comment.is_none() {
                    entry.extra_comment = message.extra_comment.as_deref();
                }
            }
            None => {
                index.insert(key.clone(), collapsed.len());
                collapsed.push(Collapsed {
                    key,
                    is_plural: message.is_plural,
                    plural_conflict: false,
                    references: vec![reference],
                    extra_comment: message.extra_comment.as_deref(),
                });
            }
        }
    }

    collapsed
}

/// Applies one extraction result to `catalog`.
///
/// Messages that disappeared from the sources move to obsolete, and obsolete
/// ones that are still missing move to vanished. Nothing is removed and no
/// translation text is touched. Matched messages get their references
/// replaced and are resurrected when needed; unmatched triples become new
/// unfinished messages appended to their context.
pub fn merge(
    catalog: &mut Catalog,
    found: &[FoundMessage],
    options: &MergeOptions,
) -> Result<MergeReport, CatalogError> {
    let mut report = MergeReport {
        call_sites: found.len(),
        ..MergeReport::default()
    };
    let collapsed = collapse(found, &mut report.warnings);
    report.unique_messages = collapsed.len();
    let forms = plural::forms_for(&catalog.language);

    let present: HashSet<&MessageKey> = collapsed.iter().map(|entry| &entry.key).collect();
    for key in catalog.keys() {
        if present.contains(&key) {
            continue;
        }
        let status = match catalog.find_message(&key) {
            Some(message) => message.status,
            None => continue,
        };
        match status {
            MessageStatus::Obsolete => {
                catalog.mark_vanished(&key)?;
                report.vanished += 1;
            }
            MessageStatus::Vanished => {}
            MessageStatus::Unfinished | MessageStatus::Finished => {
                catalog.mark_obsolete(&key)?;
                report.obsoleted += 1;
            }
        }
    }

    for mut entry in collapsed {
        let was_active = match catalog.find_message_mut(&entry.key) {
            Some(message) => {
                message.references = std::mem::take(&mut entry.references);
                message.extra_comment = entry.extra_comment.map(str::to_string);
                if !message.set_plural(entry.is_plural, forms) {
                    warn!(
                        "\"{}\" in {} lost its count argument; keeping its plural translations",
                        entry.key.source, entry.key.context
                    );
                    report.warnings.push(Warning::PluralShapeKept {
                        context: entry.key.context.clone(),
                        source_text: entry.key.source.clone(),
                    });
                }
                Some(message.status.is_active())
            }
            None => None,
        };

        match was_active {
            Some(true) => report.updated += 1,
            Some(false) => {
                let status = catalog.resurrect(&entry.key)?;
                debug!(
                    "resurrected \"{}\" in {} as {}",
                    entry.key.source, entry.key.context, status
                );
                report.resurrected += 1;
            }
            None => {
                if catalog.context(&entry.key.context).is_none() {
                    report.contexts_added += 1;
                }
                let mut message = Message::new(
                    entry.key.source.as_str(),
                    entry.key.disambiguation.as_deref(),
                    Translation::empty(entry.is_plural, forms),
                );
                message.references = entry.references;
                message.extra_comment = entry.extra_comment.map(str::to_string);
                catalog.add_message(&entry.key.context, message)?;
                report.new_messages += 1;
            }
        }
    }

    if options.prune_empty_contexts {
        report.contexts_pruned =
            catalog.retain_contexts(|context| context.live_message_count() > 0);
    }

    Ok(report)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PruneOptions {
    /// Also drop obsolete messages, not only vanished ones
    pub include_obsolete: bool,
    pub empty_contexts: bool,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub removed_messages: usize,
    pub removed_contexts: usize,
}

/// Hard-removes vanished messages (and obsolete ones on request). This is the
/// only operation that deletes translations.
pub fn prune(catalog: &mut Catalog, options: &PruneOptions) -> PruneReport {
    let removed_messages = catalog.retain_messages(|_, message| match message.status {
        MessageStatus::Vanished => false,
        MessageStatus::Obsolete => !options.include_obsolete,
        MessageStatus::Unfinished | MessageStatus::Finished => true,
    });
    let removed_contexts = if options.empty_contexts {
        catalog.retain_contexts(|context| context.live_message_count() > 0)
    } else {
        0
    };
    PruneReport {
        removed_messages,
        removed_contexts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found(context: &str, source: &str, file: &str, line: u32) -> FoundMessage {
        FoundMessage {
            context: context.to_string(),
            source_text: source.to_string(),
            disambiguation: None,
            is_plural: false,
            file: file.to_string(),
            line,
            extra_comment: None,
        }
    }

    fn translated(catalog: &mut Catalog, context: &str, source: &str, text: &str) {
        let mut message = Message::new(source, None, Translation::Single(text.to_string()));
        message.status = MessageStatus::Finished;
        catalog.add_message(context, message).unwrap();
    }

    fn status_of(catalog: &Catalog, context: &str, source: &str) -> MessageStatus {
        catalog
            .find_message(&MessageKey::new(context, source, None))
            .unwrap()
            .status
    }

    #[test]
    fn missing_message_goes_obsolete_then_vanished() {
        let mut catalog = Catalog::new("fr");
        translated(&mut catalog, "Dialog", "OK", "Bien");

        let report = merge(&mut catalog, &[], &MergeOptions::default()).unwrap();
        assert_eq!(report.obsoleted, 1);
        let key = MessageKey::new("Dialog", "OK", None);
        let message = catalog.find_message(&key).unwrap();
        assert_eq!(message.status, MessageStatus::Obsolete);
        assert_eq!(message.translation, Translation::Single("Bien".into()));

        let report = merge(&mut catalog, &[], &MergeOptions::default()).unwrap();
        assert_eq!(report.vanished, 1);
        let message = catalog.find_message(&key).unwrap();
        assert_eq!(message.status, MessageStatus::Vanished);
        assert_eq!(message.translation, Translation::Single("Bien".into()));

        // Vanished stays vanished until an explicit prune
        merge(&mut catalog, &[], &MergeOptions::default()).unwrap();
        assert_eq!(status_of(&catalog, "Dialog", "OK"), MessageStatus::Vanished);
    }

    #[test]
    fn new_call_site_creates_unfinished_message() {
        let mut catalog = Catalog::new("fr");
        let report = merge(
            &mut catalog,
            &[found("Dialog", "Cancel", "src/dialog.cpp", 42)],
            &MergeOptions::default(),
        )
        .unwrap();

        assert_eq!(report.new_messages, 1);
        assert_eq!(report.contexts_added, 1);
        let message = catalog
            .find_message(&MessageKey::new("Dialog", "Cancel", None))
            .unwrap();
        assert_eq!(message.status, MessageStatus::Unfinished);
        assert_eq!(message.translation, Translation::Single(String::new()));
        assert_eq!(message.references, vec![SourceReference::new("src/dialog.cpp", 42)]);
    }

    #[test]
    fn duplicate_call_sites_collapse() {
        let mut catalog = Catalog::new("fr");
        let sites = [
            found("Dialog", "Save", "src/dialog.cpp", 10),
            found("Dialog", "Save", "src/dialog.cpp", 88),
            found("Dialog", "Save", "src/dialog.cpp", 10),
        ];
        let report = merge(&mut catalog, &sites, &MergeOptions::default()).unwrap();

        assert_eq!(report.call_sites, 3);
        assert_eq!(report.unique_messages, 1);
        assert_eq!(catalog.stats().messages, 1);
        let message = catalog
            .find_message(&MessageKey::new("Dialog", "Save", None))
            .unwrap();
        assert_eq!(
            message.references,
            vec![
                SourceReference::new("src/dialog.cpp", 10),
                SourceReference::new("src/dialog.cpp", 88),
            ]
        );
    }

    #[test]
    fn reappearing_message_is_resurrected_with_new_references() {
        let mut catalog = Catalog::new("fr");
        translated(&mut catalog, "Dialog", "OK", "Bien");
        catalog
            .add_message(
                "Dialog",
                Message::new("Apply", None, Translation::Single(String::new())),
            )
            .unwrap();
        merge(&mut catalog, &[], &MergeOptions::default()).unwrap();
        assert_eq!(status_of(&catalog, "Dialog", "OK"), MessageStatus::Obsolete);

        let sites = [
            found("Dialog", "OK", "src/dialog.cpp", 12),
            found("Dialog", "Apply", "src/dialog.cpp", 13),
        ];
        let report = merge(&mut catalog, &sites, &MergeOptions::default()).unwrap();
        assert_eq!(report.resurrected, 2);
        assert_eq!(status_of(&catalog, "Dialog", "OK"), MessageStatus::Finished);
        assert_eq!(status_of(&catalog, "Dialog", "Apply"), MessageStatus::Unfinished);
        let ok = catalog
            .find_message(&MessageKey::new("Dialog", "OK", None))
            .unwrap();
        assert_eq!(ok.references, vec![SourceReference::new("src/dialog.cpp", 12)]);
    }

    #[test]
    fn vanished_message_is_resurrected_too() {
        let mut catalog = Catalog::new("fr");
        translated(&mut catalog, "Dialog", "OK", "Bien");
        merge(&mut catalog, &[], &MergeOptions::default()).unwrap();
        merge(&mut catalog, &[], &MergeOptions::default()).unwrap();

        merge(
            &mut catalog,
            &[found("Dialog", "OK", "src/dialog.cpp", 3)],
            &MergeOptions::default(),
        )
        .unwrap();
        assert_eq!(status_of(&catalog, "Dialog", "OK"), MessageStatus::Finished);
    }

    #[test]
    fn disambiguation_is_a_separate_message() {
        let mut catalog = Catalog::new("de");
        translated(&mut catalog, "Dialog", "Open", "Öffnen");

        let mut site = found("Dialog", "Open", "src/dialog.cpp", 7);
        site.disambiguation = Some("adjective".into());
        let report = merge(&mut catalog, &[site], &MergeOptions::default()).unwrap();

        assert_eq!(report.new_messages, 1);
        assert_eq!(report.obsoleted, 1);
        let new = catalog
            .find_message(&MessageKey::new("Dialog", "Open", Some("adjective")))
            .unwrap();
        assert_eq!(new.status, MessageStatus::Unfinished);
        assert!(!new.has_translation());
    }

    #[test]
    fn plural_call_sites_get_locale_forms() {
        let mut catalog = Catalog::new("ru");
        let mut site = found("Tiled::MapEditor", "Remove %n Object(s)", "src/mapeditor.cpp", 5);
        site.is_plural = true;
        merge(&mut catalog, &[site], &MergeOptions::default()).unwrap();

        let message = catalog
            .find_message(&MessageKey::new("Tiled::MapEditor", "Remove %n Object(s)", None))
            .unwrap();
        assert_eq!(message.translation, Translation::Plural(vec![String::new(); 3]));
    }

    #[test]
    fn mixed_plural_usage_warns_and_becomes_plural() {
        let mut catalog = Catalog::new("en");
        let singular = found("Dialog", "%n file(s)", "src/a.cpp", 1);
        let mut plural = found("Dialog", "%n file(s)", "src/a.cpp", 9);
        plural.is_plural = true;

        let report = merge(&mut catalog, &[singular, plural], &MergeOptions::default()).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(report.warnings[0], Warning::ConflictingPlural { line: 9, .. }));
        let message = catalog
            .find_message(&MessageKey::new("Dialog", "%n file(s)", None))
            .unwrap();
        assert!(message.is_plural());
    }

    #[test]
    fn matched_message_keeps_translation_when_turning_plural() {
        let mut catalog = Catalog::new("de");
        translated(&mut catalog, "Dialog", "%n item(s)", "%n Element(e)");
        let mut site = found("Dialog", "%n item(s)", "src/a.cpp", 4);
        site.is_plural = true;

        merge(&mut catalog, &[site], &MergeOptions::default()).unwrap();
        let message = catalog
            .find_message(&MessageKey::new("Dialog", "%n item(s)", None))
            .unwrap();
        assert_eq!(
            message.translation,
            Translation::Plural(vec!["%n Element(e)".into(), String::new()])
        );
        assert_eq!(message.status, MessageStatus::Finished);
    }

    #[test]
    fn plural_translations_survive_losing_the_count() {
        let mut catalog = Catalog::new("ru");
        let mut message = Message::new("%n file(s)", None, Translation::empty(true, 3));
        message.translation =
            Translation::Plural(vec!["файл".into(), "файла".into(), "файлов".into()]);
        message.status = MessageStatus::Finished;
        catalog.add_message("Dialog", message).unwrap();

        let site = found("Dialog", "%n file(s)", "src/a.cpp", 4);
        let report = merge(&mut catalog, &[site], &MergeOptions::default()).unwrap();

        let message = catalog
            .find_message(&MessageKey::new("Dialog", "%n file(s)", None))
            .unwrap();
        assert_eq!(
            message.translation,
            Translation::Plural(vec!["файл".into(), "файла".into(), "файлов".into()])
        );
        assert_eq!(message.status, MessageStatus::Finished);
        assert_eq!(message.references, vec![SourceReference::new("src/a.cpp", 4)]);
        assert!(matches!(
            report.warnings.as_slice(),
            [Warning::PluralShapeKept { context, .. }] if context == "Dialog"
        ));
    }

    #[test]
    fn empty_contexts_survive_unless_pruning_requested() {
        let mut catalog = Catalog::new("fr");
        translated(&mut catalog, "Old", "Gone", "Parti");
        merge(&mut catalog, &[], &MergeOptions::default()).unwrap();
        merge(&mut catalog, &[], &MergeOptions::default()).unwrap();
        assert!(catalog.context("Old").is_some());

        let options = MergeOptions {
            prune_empty_contexts: true,
        };
        let report = merge(&mut catalog, &[], &options).unwrap();
        assert_eq!(report.contexts_pruned, 1);
        assert!(catalog.context("Old").is_none());
    }

    #[test]
    fn new_contexts_are_appended_in_found_order() {
        let mut catalog = Catalog::new("fr");
        translated(&mut catalog, "Zeta", "Z", "Z");
        let sites = [
            found("Beta", "B", "src/b.cpp", 1),
            found("Alpha", "A", "src/a.cpp", 1),
            found("Zeta", "Z", "src/z.cpp", 1),
        ];
        merge(&mut catalog, &sites, &MergeOptions::default()).unwrap();
        let names: Vec<&str> = catalog.iter_contexts().map(|c| c.name()).collect();
        assert_eq!(names, vec!["Zeta", "Beta", "Alpha"]);
    }

    #[test]
    fn prune_removes_vanished_and_optionally_obsolete() {
        let mut catalog = Catalog::new("fr");
        translated(&mut catalog, "Dialog", "Old", "Vieux");
        translated(&mut catalog, "Dialog", "Older", "Plus vieux");
        translated(&mut catalog, "Other", "Gone", "Parti");
        translated(&mut catalog, "Dialog", "Kept", "Gardé");
        let both = [
            found("Dialog", "Kept", "a.cpp", 1),
            found("Dialog", "Old", "a.cpp", 2),
        ];
        merge(&mut catalog, &both, &MergeOptions::default()).unwrap();
        let kept = [found("Dialog", "Kept", "a.cpp", 1)];
        merge(&mut catalog, &kept, &MergeOptions::default()).unwrap();
        assert_eq!(status_of(&catalog, "Dialog", "Old"), MessageStatus::Obsolete);
        assert_eq!(status_of(&catalog, "Dialog", "Older"), MessageStatus::Vanished);

        let report = prune(&mut catalog, &PruneOptions::default());
        assert_eq!(report.removed_messages, 2);
        assert_eq!(report.removed_contexts, 0);
        assert!(catalog.context("Other").is_some());

        let report = prune(
            &mut catalog,
            &PruneOptions {
                include_obsolete: true,
                empty_contexts: true,
            },
        );
        assert_eq!(report.removed_messages, 1);
        assert_eq!(report.removed_contexts, 1);
        assert_eq!(catalog.stats().messages, 1);
    }
}
