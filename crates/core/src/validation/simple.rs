use crate::backup::BackupProject;
use crate::i18n::{keys, I18n};
use crate::mapper::IdMapper;
use crate::message::MessageSet;

/// Every required old id must be mapped; `missing_key` names the message.
pub fn validate_simple_mapper(i18n: &dyn I18n, mapper: &IdMapper, missing_key: &str) -> MessageSet {
    let mut messages = MessageSet::new();
    for old_id in mapper.unmapped_required() {
        messages.add_error(i18n.text(missing_key, &[&mapper.display_name(old_id)]));
    }
    messages
}

pub fn validate_issue_security_levels(
    i18n: &dyn I18n,
    mapper: &IdMapper,
    backup_project: &BackupProject,
) -> MessageSet {
    let mut messages = MessageSet::new();
    for old_id in mapper.unmapped_required() {
        messages.add_error(i18n.text(
            keys::SECURITY_LEVEL_MISSING,
            &[&mapper.display_name(old_id), backup_project.key()],
        ));
    }
    messages
}
