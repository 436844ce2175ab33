//! Work items run on the bounded executor during persistence.
//!
//! Each job owns what it needs, takes the mapper lock only around pure
//! lookups, and records every failure in the results instead of returning it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use carryover_core::external::{
    ExternalAttachment, ExternalCustomFieldValue, ExternalIssue, ExternalProjectRoleActor,
    ExternalUser,
};
use carryover_core::i18n::keys;

use super::transform::{self, IssueRelated, SecondDegree};
use super::PersistContext;
use crate::store::TargetRoleActor;

pub(crate) async fn create_user(ctx: Arc<PersistContext>, user: ExternalUser) {
    if let Err(err) = ctx.directory.create_user(&user).await {
        ctx.record_error(keys::PERSIST_USER_FAILED, &[&user.name, &err.to_string()]);
        return;
    }
    let mapped = ctx.mappers_mut().user.map_existing_user(&user.name);
    match mapped {
        Ok(()) => ctx.results.increment_users_created(),
        Err(err) => ctx.record_error(keys::PERSIST_USER_FAILED, &[&user.name, &err.to_string()]),
    }
}

pub(crate) async fn create_issue(
    ctx: Arc<PersistContext>,
    issue: ExternalIssue,
    project_id: String,
    max_key_number: Arc<AtomicI64>,
) {
    let transformed = transform::issue(&ctx.mappers(), &issue, &project_id);
    let created = match transformed {
        Ok(new_issue) => ctx.persister.create_issue(&new_issue).await.map_err(|e| e.to_string()),
        Err(err) => Err(err.to_string()),
    };
    let new_id = match created {
        Ok(id) => id,
        Err(err) => {
            ctx.record_error(keys::PERSIST_ISSUE_FAILED, &[&issue.key, &err]);
            return;
        }
    };

    let mapped = ctx.mappers_mut().issue.map_value(&issue.id, &new_id);
    if let Err(err) = mapped {
        ctx.record_error(keys::PERSIST_ISSUE_FAILED, &[&issue.key, &err.to_string()]);
        return;
    }
    ctx.results.increment_issues_created();
    if let Some(number) = issue.key_number() {
        max_key_number.fetch_max(number, Ordering::AcqRel);
    }
}

/// Target id of a link end: the new id of a project issue, or the id of an
/// issue outside the project that already exists in the target.
async fn resolve_link_end(ctx: &PersistContext, old_id: &str) -> Option<String> {
    let mapped = ctx.mappers().issue.mapped_id(old_id).map(str::to_string);
    if mapped.is_some() || ctx.project.contains_issue(old_id) {
        return mapped;
    }
    let key = ctx.system.issue_key(old_id)?;
    match ctx.persister.issue_id_by_key(key).await {
        Ok(id) => id,
        Err(err) => {
            tracing::warn!(issue_key = %key, error = %err, "Could not look up linked issue");
            None
        }
    }
}

pub(crate) async fn create_issue_related(ctx: Arc<PersistContext>, entity: IssueRelated) {
    let representation = match &entity {
        IssueRelated::Link(link) => {
            let source = resolve_link_end(&ctx, &link.source_id).await;
            let destination = resolve_link_end(&ctx, &link.destination_id).await;
            let (Some(source), Some(destination)) = (source, destination) else {
                tracing::debug!(link = %link.id, "Skipping link to an issue missing from the target");
                return;
            };
            transform::link(&ctx.mappers(), link, source, destination).map(Some)
        }
        other => transform::issue_related(&ctx.mappers(), other),
    };

    let representation = match representation {
        Ok(Some(representation)) => representation,
        Ok(None) => return,
        Err(err) => {
            record_entity_error(&ctx, entity.entity_name(), entity.display_id(), entity.issue_id(), &err.to_string());
            return;
        }
    };

    match ctx.persister.create_entity(&representation).await {
        Ok(new_id) => {
            let mapped = match &entity {
                IssueRelated::Comment(c) => ctx.mappers_mut().comment.map_value(&c.id, &new_id),
                IssueRelated::ChangeGroup(g) => ctx.mappers_mut().change_group.map_value(&g.id, &new_id),
                _ => Ok(()),
            };
            if let Err(err) = mapped {
                tracing::warn!(entity = entity.entity_name(), error = %err, "Could not record new id");
            }
            ctx.results.increment_entities_created(entity.entity_name());
        }
        Err(err) => {
            record_entity_error(&ctx, entity.entity_name(), entity.display_id(), entity.issue_id(), &err.to_string())
        }
    }
}

pub(crate) async fn create_second_degree(ctx: Arc<PersistContext>, entity: SecondDegree) {
    let Some(representation) = transform::second_degree(&ctx.mappers(), &entity) else {
        return;
    };
    match ctx.persister.create_entity(&representation).await {
        Ok(_) => ctx.results.increment_entities_created(entity.entity_name()),
        Err(err) => ctx.record_error(
            keys::PERSIST_ENTITY_FAILED,
            &[entity.entity_name(), entity.display_id(), "-", &err.to_string()],
        ),
    }
}

pub(crate) async fn create_custom_field_value(ctx: Arc<PersistContext>, value: ExternalCustomFieldValue) {
    let transformed = transform::custom_field_value(&ctx.mappers(), &value);
    let result = match transformed {
        Ok(Some(representation)) => ctx
            .persister
            .create_entity(&representation)
            .await
            .map_err(|e| e.to_string()),
        Ok(None) => return,
        Err(err) => Err(err.to_string()),
    };
    match result {
        Ok(_) => ctx.results.increment_custom_field_values_created(),
        Err(err) => {
            let (field, issue) = {
                let mappers = ctx.mappers();
                (
                    mappers.custom_field.ids.display_name(&value.custom_field_id),
                    mappers.issue.display_name(&value.issue_id),
                )
            };
            ctx.record_error(keys::PERSIST_CUSTOM_FIELD_VALUE_FAILED, &[&field, &issue, &err]);
        }
    }
}

pub(crate) async fn create_attachment(
    ctx: Arc<PersistContext>,
    attachment: ExternalAttachment,
    root: PathBuf,
) {
    let (transformed, issue_key) = {
        let mappers = ctx.mappers();
        (
            transform::attachment(&mappers, &attachment),
            mappers.issue.key(&attachment.issue_id).map(str::to_string),
        )
    };
    let (Some(transformed), Some(issue_key)) = (transformed, issue_key) else {
        return;
    };
    let path = attachment.file_path(&root, ctx.project.key(), &issue_key);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        tracing::debug!(path = %path.display(), "Skipping attachment without a file");
        return;
    }
    match ctx.persister.create_attachment_copying_file(&transformed, &path).await {
        Ok(_) => ctx.results.increment_attachments_created(),
        Err(err) => ctx.record_error(
            keys::PERSIST_ATTACHMENT_FAILED,
            &[&attachment.file_name, &issue_key, &err.to_string()],
        ),
    }
}

pub(crate) async fn create_role_member(ctx: Arc<PersistContext>, actor: ExternalProjectRoleActor, project_id: String) {
    let (role_id, member, role_name) = {
        let mappers = ctx.mappers();
        let name = actor.role_actor.as_str();
        let member = if actor.is_user_actor() {
            mappers
                .user
                .user_exists(name)
                .then(|| mappers.user.mapped_user_key(name).to_string())
        } else if actor.is_group_actor() {
            mappers.group.mapped_id(name).map(str::to_string)
        } else {
            None
        };
        (
            mappers.project_role.mapped_id(&actor.role_id).map(str::to_string),
            member,
            mappers.project_role.display_name(&actor.role_id),
        )
    };
    let (Some(role_id), Some(member)) = (role_id, member) else {
        tracing::debug!(actor = %actor.role_actor, role = %role_name, "Skipping unresolved role member");
        return;
    };

    let target = TargetRoleActor {
        project_id,
        role_id,
        role_type: actor.role_type.clone(),
        actor: member,
    };
    let outcome = match ctx.persister.role_actor_exists(&target).await {
        Ok(true) => Ok(false),
        Ok(false) => ctx.persister.create_role_actor(&target).await.map(|()| true),
        Err(err) => Err(err),
    };
    match outcome {
        Ok(true) => ctx.results.increment_role_member_created(&role_name),
        Ok(false) => ctx.results.increment_role_member_existing(&role_name),
        Err(err) => ctx.record_error(
            keys::PERSIST_ROLE_ACTOR_FAILED,
            &[&actor.role_actor, &role_name, &err.to_string()],
        ),
    }
}

fn record_entity_error(ctx: &PersistContext, entity: &str, id: &str, old_issue_id: &str, error: &str) {
    let issue = ctx.mappers().issue.display_name(old_issue_id);
    ctx.record_error(keys::PERSIST_ENTITY_FAILED, &[entity, id, &issue, error]);
}
