use crate::catalog::{same_name, TargetCatalog};
use crate::i18n::{keys, I18n};
use crate::mapper::IssueTypeMapper;
use crate::message::MessageSet;

/// Required issue types must be mapped onto an existing type of the same kind.
pub fn validate_issue_types(
    i18n: &dyn I18n,
    mapper: &IssueTypeMapper,
    catalog: &TargetCatalog,
) -> MessageSet {
    let mut messages = MessageSet::new();
    for old_id in mapper.ids.required_old_ids() {
        let name = mapper.ids.display_name(old_id);
        let subtask = mapper.is_subtask(old_id);

        if let Some(new_id) = mapper.ids.mapped_id(old_id) {
            match catalog.issue_type(new_id) {
                None => messages.add_error(i18n.text(keys::ISSUE_TYPE_MISSING, &[&name])),
                Some(target) if target.subtask != subtask => {
                    messages.add_error(subtask_mismatch(i18n, &name, subtask))
                }
                Some(_) => {}
            }
            continue;
        }

        let same_named = mapper
            .ids
            .key(old_id)
            .and_then(|key| catalog.issue_types.iter().find(|t| same_name(&t.name, key)));
        match same_named {
            Some(target) if target.subtask != subtask => {
                messages.add_error(subtask_mismatch(i18n, &name, subtask))
            }
            _ => messages.add_error(i18n.text(keys::ISSUE_TYPE_MISSING, &[&name])),
        }
    }
    messages
}

fn subtask_mismatch(i18n: &dyn I18n, name: &str, subtask_in_backup: bool) -> String {
    let key = if subtask_in_backup {
        keys::ISSUE_TYPE_SUBTASK_IN_BACKUP
    } else {
        keys::ISSUE_TYPE_SUBTASK_IN_TARGET
    };
    i18n.text(key, &[name])
}
