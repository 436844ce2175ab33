use crate::catalog::{same_name, TargetCatalog, TargetStatus};
use crate::i18n::{keys, I18n};
use crate::mapper::{IssueTypeMapper, StatusMapper};
use crate::message::MessageSet;

/// Required statuses must be mapped, valid for every issue type using them,
/// and no two backup statuses may share one target status.
pub fn validate_statuses(
    i18n: &dyn I18n,
    mapper: &StatusMapper,
    issue_types: &IssueTypeMapper,
    catalog: &TargetCatalog,
) -> MessageSet {
    let mut messages = MessageSet::new();

    for old_id in mapper.ids.required_old_ids() {
        let name = mapper.ids.display_name(old_id);
        let target = match mapper.ids.mapped_id(old_id) {
            Some(new_id) => catalog.status(new_id),
            None => mapper
                .ids
                .key(old_id)
                .and_then(|key| catalog.statuses.iter().find(|s| same_name(&s.name, key))),
        };
        let Some(target) = target else {
            messages.add_error(i18n.text(keys::STATUS_MISSING, &[&name]));
            continue;
        };

        let invalid = invalid_issue_types(mapper, issue_types, old_id, target);
        if invalid.is_empty() && mapper.ids.mapped_id(old_id).is_none() {
            messages.add_error(i18n.text(keys::STATUS_MISSING, &[&name]));
        }
        for issue_type in invalid {
            messages.add_error(i18n.text(keys::STATUS_NOT_IN_WORKFLOW, &[&name, &issue_type]));
        }
    }

    for (new_id, old_ids) in mapper.ids.duplicate_mappings() {
        let names: Vec<String> = old_ids
            .iter()
            .map(|id| format!("'{}'", mapper.ids.display_name(id)))
            .collect();
        let target = catalog
            .status(new_id)
            .map_or_else(|| new_id.to_string(), |s| s.name.clone());
        messages.add_error(i18n.text(keys::STATUS_DUPLICATE, &[&names.join(", "), &target]));
    }

    messages
}

/// Display names of mapped issue types using the status whose workflow lacks it.
fn invalid_issue_types(
    mapper: &StatusMapper,
    issue_types: &IssueTypeMapper,
    status_id: &str,
    target: &TargetStatus,
) -> Vec<String> {
    mapper
        .issue_types_for_status(status_id)
        .filter(|old_type| {
            issue_types
                .ids
                .mapped_id(old_type)
                .is_some_and(|new_type| !target.valid_for_issue_type(new_type))
        })
        .map(|old_type| issue_types.ids.display_name(old_type))
        .collect()
}
