//! The post-instance state machine. Every status decision in the service goes
//! through [`plan`] (transitions) or [`ensure_editable`] (field edits); handlers
//! never inspect `status` themselves.
//!
//! ```text
//! Planned  --attach_content--> Draft
//! Draft    --submit----------> Needs Approval
//! Needs Approval --approve---> Approved
//! Needs Approval --reject----> Draft
//! Approved --schedule--------> Scheduled
//! Scheduled --publish_ok-----> Posted
//! Scheduled --publish_fail---> Failed
//! Failed   --retry-----------> Scheduled
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{PostInstance, PostInstanceChanges};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostStatus {
    Planned,
    Draft,
    NeedsApproval,
    Approved,
    Scheduled,
    Posted,
    Failed,
}

/// Statuses that count against a missed `draft_due_date`.
pub const OVERDUE_STATUSES: [PostStatus; 2] = [PostStatus::Draft, PostStatus::NeedsApproval];

impl PostStatus {
    pub const ALL: [PostStatus; 7] = [
        PostStatus::Planned,
        PostStatus::Draft,
        PostStatus::NeedsApproval,
        PostStatus::Approved,
        PostStatus::Scheduled,
        PostStatus::Posted,
        PostStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Planned => "Planned",
            PostStatus::Draft => "Draft",
            PostStatus::NeedsApproval => "Needs Approval",
            PostStatus::Approved => "Approved",
            PostStatus::Scheduled => "Scheduled",
            PostStatus::Posted => "Posted",
            PostStatus::Failed => "Failed",
        }
    }

    pub fn is_editable(self) -> bool {
        matches!(self, PostStatus::Planned | PostStatus::Draft)
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = WorkflowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        PostStatus::ALL
            .into_iter()
            .find(|status| {
                status.as_str().eq_ignore_ascii_case(normalized)
                    || status
                        .as_str()
                        .replace(' ', "_")
                        .eq_ignore_ascii_case(normalized)
            })
            .ok_or_else(|| WorkflowError::Precondition(format!("unknown status '{value}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostEvent {
    AttachContent,
    Submit,
    Approve,
    Reject,
    Schedule,
    PublishOk,
    PublishFail,
    Retry,
}

impl PostEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            PostEvent::AttachContent => "attach_content",
            PostEvent::Submit => "submit",
            PostEvent::Approve => "approve",
            PostEvent::Reject => "reject",
            PostEvent::Schedule => "schedule",
            PostEvent::PublishOk => "publish_ok",
            PostEvent::PublishFail => "publish_fail",
            PostEvent::Retry => "retry",
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum WorkflowError {
    #[error("cannot {event} a post in status '{from}'")]
    IllegalTransition { from: String, event: &'static str },
    #[error("post in status '{0}' can no longer be edited")]
    NotEditable(String),
    #[error("{0}")]
    Precondition(String),
    #[error("the author of a post cannot approve it")]
    SelfApproval,
}

/// The edge table. Re-delivery of a publisher's terminal signal maps a
/// terminal state onto itself.
pub fn next_status(from: PostStatus, event: PostEvent) -> Result<PostStatus, WorkflowError> {
    use PostEvent as E;
    use PostStatus as S;

    match (from, event) {
        (S::Planned, E::AttachContent) => Ok(S::Draft),
        (S::Draft, E::Submit) => Ok(S::NeedsApproval),
        (S::NeedsApproval, E::Approve) => Ok(S::Approved),
        (S::NeedsApproval, E::Reject) => Ok(S::Draft),
        (S::Approved, E::Schedule) => Ok(S::Scheduled),
        (S::Scheduled | S::Posted, E::PublishOk) => Ok(S::Posted),
        (S::Scheduled | S::Failed, E::PublishFail) => Ok(S::Failed),
        (S::Failed, E::Retry) => Ok(S::Scheduled),
        _ => Err(WorkflowError::IllegalTransition {
            from: from.as_str().to_string(),
            event: event.as_str(),
        }),
    }
}

/// Content being attached, already resolved and tenant-checked by the caller.
#[derive(Debug, Clone)]
pub struct AttachedContent {
    pub id: Uuid,
    pub body: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Command {
    AttachContent {
        content: Option<AttachedContent>,
        channel_ids: Option<Vec<Uuid>>,
        body_text: Option<String>,
        suggested_category: Option<String>,
    },
    Submit,
    Approve,
    Reject {
        notes: Option<String>,
    },
    Schedule {
        scheduled_at: Option<NaiveDateTime>,
    },
    PublishOk,
    PublishFail {
        error: Option<String>,
    },
    Retry {
        scheduled_at: Option<NaiveDateTime>,
    },
}

impl Command {
    pub fn event(&self) -> PostEvent {
        match self {
            Command::AttachContent { .. } => PostEvent::AttachContent,
            Command::Submit => PostEvent::Submit,
            Command::Approve => PostEvent::Approve,
            Command::Reject { .. } => PostEvent::Reject,
            Command::Schedule { .. } => PostEvent::Schedule,
            Command::PublishOk => PostEvent::PublishOk,
            Command::PublishFail { .. } => PostEvent::PublishFail,
            Command::Retry { .. } => PostEvent::Retry,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Actor<'a> {
    pub user_id: Uuid,
    pub username: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub from: PostStatus,
    pub to: PostStatus,
    pub event: PostEvent,
    pub changes: PostInstanceChanges,
}

impl Plan {
    /// False for an idempotent re-delivery that leaves the row as it is.
    pub fn is_noop(&self) -> bool {
        self.changes == PostInstanceChanges::default()
    }
}

pub fn current_status(post: &PostInstance) -> Result<PostStatus, WorkflowError> {
    post.status.parse()
}

pub fn ensure_editable(post: &PostInstance) -> Result<(), WorkflowError> {
    let status = current_status(post)?;
    if status.is_editable() {
        Ok(())
    } else {
        Err(WorkflowError::NotEditable(status.as_str().to_string()))
    }
}

/// Validates `command` against the post's current state and returns the
/// resulting status plus the column changes to persist.
pub fn plan(
    post: &PostInstance,
    command: Command,
    actor: &Actor<'_>,
    now: NaiveDateTime,
) -> Result<Plan, WorkflowError> {
    let from = current_status(post)?;
    let event = command.event();
    let to = next_status(from, event)?;

    if from == to {
        return Ok(Plan {
            from,
            to,
            event,
            changes: PostInstanceChanges::default(),
        });
    }

    let mut changes = PostInstanceChanges {
        status: Some(to.as_str().to_string()),
        ..Default::default()
    };

    match command {
        Command::AttachContent {
            content,
            channel_ids,
            body_text,
            suggested_category,
        } => {
            let content = content.ok_or_else(|| {
                WorkflowError::Precondition("content_item_id is required".to_string())
            })?;
            let channel_ids = dedupe(channel_ids.unwrap_or_else(|| post.channel_ids.clone()));
            if channel_ids.is_empty() {
                return Err(WorkflowError::Precondition(
                    "at least one channel account is required".to_string(),
                ));
            }

            let body = non_blank(body_text)
                .or_else(|| non_blank(post.body_text.clone()))
                .or_else(|| non_blank(Some(content.body.clone())));
            let category = non_blank(suggested_category)
                .or_else(|| non_blank(post.suggested_category.clone()))
                .or_else(|| non_blank(content.category.clone()));

            changes.content_item_id = Some(Some(content.id));
            changes.channel_ids = Some(channel_ids);
            changes.body_text = Some(body);
            changes.suggested_category = Some(category);
        }
        Command::Submit => {
            if non_blank(post.body_text.clone()).is_none() {
                return Err(WorkflowError::Precondition(
                    "body_text must not be empty".to_string(),
                ));
            }
            match post.scheduled_at {
                Some(at) if at <= now => {
                    return Err(WorkflowError::Precondition(
                        "scheduled_at must be in the future".to_string(),
                    ))
                }
                Some(_) => {}
                None if post.draft_due_date.is_none() => {
                    return Err(WorkflowError::Precondition(
                        "scheduled_at or draft_due_date is required".to_string(),
                    ))
                }
                None => {}
            }
        }
        Command::Approve => {
            if is_author(post, actor) {
                return Err(WorkflowError::SelfApproval);
            }
            changes.reviewer = Some(Some(actor.username.to_string()));
        }
        Command::Reject { notes } => {
            if let Some(notes) = non_blank(notes) {
                changes.notes = Some(Some(notes));
            }
        }
        Command::Schedule { scheduled_at } => {
            if post.content_item_id.is_none() {
                return Err(WorkflowError::Precondition(
                    "content must be attached before scheduling".to_string(),
                ));
            }
            let at = scheduled_at.or(post.scheduled_at).ok_or_else(|| {
                WorkflowError::Precondition("scheduled_at is required".to_string())
            })?;
            ensure_future(at, now)?;
            changes.scheduled_at = Some(Some(at));
        }
        Command::PublishOk => {
            changes.published_at = Some(Some(now));
            changes.last_error = Some(None);
        }
        Command::PublishFail { error } => {
            let message = non_blank(error).unwrap_or_else(|| "publish failed".to_string());
            changes.last_error = Some(Some(message));
        }
        Command::Retry { scheduled_at } => {
            if let Some(at) = scheduled_at {
                ensure_future(at, now)?;
                changes.scheduled_at = Some(Some(at));
            }
            changes.last_error = Some(None);
        }
    }

    Ok(Plan {
        from,
        to,
        event,
        changes,
    })
}

fn is_author(post: &PostInstance, actor: &Actor<'_>) -> bool {
    match post.author_id {
        Some(author_id) => author_id == actor.user_id,
        None => post.author_username.as_deref() == Some(actor.username),
    }
}

fn ensure_future(at: NaiveDateTime, now: NaiveDateTime) -> Result<(), WorkflowError> {
    if at <= now {
        return Err(WorkflowError::Precondition(
            "scheduled_at must be in the future".to_string(),
        ));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

fn dedupe(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> NaiveDateTime {
        chrono::Utc::now().naive_utc()
    }

    fn post(status: PostStatus, author: Uuid) -> PostInstance {
        let ts = now();
        PostInstance {
            id: Uuid::new_v4(),
            tenant_id: Some("all_county".into()),
            channel_ids: vec![],
            content_item_id: None,
            body_text: None,
            scheduled_at: None,
            draft_due_date: None,
            status: status.as_str().to_string(),
            author_id: Some(author),
            author_username: Some("author".into()),
            reviewer: None,
            suggested_category: None,
            notes: None,
            published_at: None,
            last_error: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    fn actor(id: Uuid) -> Actor<'static> {
        Actor {
            user_id: id,
            username: "reviewer",
        }
    }

    fn content(category: Option<&str>) -> AttachedContent {
        AttachedContent {
            id: Uuid::new_v4(),
            body: "Fresh water heater install".into(),
            category: category.map(str::to_string),
        }
    }

    #[test]
    fn edge_table_matches_the_graph() {
        use PostEvent as E;
        use PostStatus as S;
        let edges = [
            (S::Planned, E::AttachContent, S::Draft),
            (S::Draft, E::Submit, S::NeedsApproval),
            (S::NeedsApproval, E::Approve, S::Approved),
            (S::NeedsApproval, E::Reject, S::Draft),
            (S::Approved, E::Schedule, S::Scheduled),
            (S::Scheduled, E::PublishOk, S::Posted),
            (S::Scheduled, E::PublishFail, S::Failed),
            (S::Failed, E::Retry, S::Scheduled),
        ];
        for (from, event, to) in edges {
            assert_eq!(next_status(from, event), Ok(to), "{from} --{event:?}-->");
        }
    }

    #[test]
    fn everything_off_the_graph_is_illegal() {
        use PostEvent as E;
        let events = [
            E::AttachContent,
            E::Submit,
            E::Approve,
            E::Reject,
            E::Schedule,
            E::PublishOk,
            E::PublishFail,
            E::Retry,
        ];
        let mut legal = 0;
        for from in PostStatus::ALL {
            for event in events {
                if next_status(from, event).is_ok() {
                    legal += 1;
                }
            }
        }
        // eight graph edges plus the two idempotent terminal re-deliveries
        assert_eq!(legal, 10);
        assert!(matches!(
            next_status(PostStatus::Posted, PostEvent::PublishFail),
            Err(WorkflowError::IllegalTransition { .. })
        ));
        assert!(next_status(PostStatus::Draft, PostEvent::Approve).is_err());
    }

    #[test]
    fn status_parsing_accepts_display_and_snake_forms() {
        assert_eq!(
            "Needs Approval".parse::<PostStatus>(),
            Ok(PostStatus::NeedsApproval)
        );
        assert_eq!(
            "needs_approval".parse::<PostStatus>(),
            Ok(PostStatus::NeedsApproval)
        );
        assert!("archived".parse::<PostStatus>().is_err());
    }

    #[test]
    fn attach_requires_content_and_channels() {
        let author = Uuid::new_v4();
        let slot = post(PostStatus::Planned, author);
        let missing_content = plan(
            &slot,
            Command::AttachContent {
                content: None,
                channel_ids: Some(vec![Uuid::new_v4()]),
                body_text: None,
                suggested_category: None,
            },
            &actor(author),
            now(),
        );
        assert!(matches!(missing_content, Err(WorkflowError::Precondition(_))));

        let missing_channels = plan(
            &slot,
            Command::AttachContent {
                content: Some(content(None)),
                channel_ids: None,
                body_text: None,
                suggested_category: None,
            },
            &actor(author),
            now(),
        );
        assert!(matches!(missing_channels, Err(WorkflowError::Precondition(_))));
    }

    #[test]
    fn attach_defaults_category_and_body_from_content() {
        let author = Uuid::new_v4();
        let slot = post(PostStatus::Planned, author);
        let channel = Uuid::new_v4();
        let attached = content(Some("before_after"));
        let plan = plan(
            &slot,
            Command::AttachContent {
                content: Some(attached.clone()),
                channel_ids: Some(vec![channel, channel]),
                body_text: None,
                suggested_category: None,
            },
            &actor(author),
            now(),
        )
        .unwrap();

        assert_eq!(plan.to, PostStatus::Draft);
        assert_eq!(plan.changes.channel_ids, Some(vec![channel]));
        assert_eq!(plan.changes.content_item_id, Some(Some(attached.id)));
        assert_eq!(
            plan.changes.suggested_category,
            Some(Some("before_after".to_string()))
        );
        assert_eq!(plan.changes.body_text, Some(Some(attached.body)));
    }

    #[test]
    fn explicit_category_override_is_preserved() {
        let author = Uuid::new_v4();
        let mut slot = post(PostStatus::Planned, author);
        slot.suggested_category = Some("seasonal".into());

        let plan = plan(
            &slot,
            Command::AttachContent {
                content: Some(content(Some("before_after"))),
                channel_ids: Some(vec![Uuid::new_v4()]),
                body_text: None,
                suggested_category: None,
            },
            &actor(author),
            now(),
        )
        .unwrap();
        assert_eq!(
            plan.changes.suggested_category,
            Some(Some("seasonal".to_string()))
        );
    }

    #[test]
    fn submit_needs_body_and_a_future_date_or_due_date() {
        let author = Uuid::new_v4();
        let mut draft = post(PostStatus::Draft, author);
        assert!(plan(&draft, Command::Submit, &actor(author), now()).is_err());

        draft.body_text = Some("Text".into());
        assert!(plan(&draft, Command::Submit, &actor(author), now()).is_err());

        draft.draft_due_date = Some(now() - Duration::days(1));
        let submitted = plan(&draft, Command::Submit, &actor(author), now()).unwrap();
        assert_eq!(submitted.to, PostStatus::NeedsApproval);

        draft.scheduled_at = Some(now() - Duration::hours(1));
        assert!(plan(&draft, Command::Submit, &actor(author), now()).is_err());
    }

    #[test]
    fn four_eyes_rule_blocks_self_approval_but_not_self_rejection() {
        let author = Uuid::new_v4();
        let pending = post(PostStatus::NeedsApproval, author);

        assert_eq!(
            plan(&pending, Command::Approve, &actor(author), now()),
            Err(WorkflowError::SelfApproval)
        );
        let rejected = plan(
            &pending,
            Command::Reject {
                notes: Some("tone it down".into()),
            },
            &actor(author),
            now(),
        )
        .unwrap();
        assert_eq!(rejected.to, PostStatus::Draft);

        let approved = plan(&pending, Command::Approve, &actor(Uuid::new_v4()), now()).unwrap();
        assert_eq!(
            approved.changes.reviewer,
            Some(Some("reviewer".to_string()))
        );
    }

    #[test]
    fn schedule_pins_a_future_time_and_needs_content() {
        let author = Uuid::new_v4();
        let mut approved = post(PostStatus::Approved, author);
        let later = now() + Duration::days(2);

        let no_content = plan(
            &approved,
            Command::Schedule {
                scheduled_at: Some(later),
            },
            &actor(author),
            now(),
        );
        assert!(matches!(no_content, Err(WorkflowError::Precondition(_))));

        approved.content_item_id = Some(Uuid::new_v4());
        let past = plan(
            &approved,
            Command::Schedule {
                scheduled_at: Some(now() - Duration::minutes(5)),
            },
            &actor(author),
            now(),
        );
        assert!(past.is_err());

        let scheduled = plan(
            &approved,
            Command::Schedule {
                scheduled_at: Some(later),
            },
            &actor(author),
            now(),
        )
        .unwrap();
        assert_eq!(scheduled.to, PostStatus::Scheduled);
        assert_eq!(scheduled.changes.scheduled_at, Some(Some(later)));
    }

    #[test]
    fn publish_signals_are_idempotent() {
        let author = Uuid::new_v4();
        let posted = post(PostStatus::Posted, author);
        let again = plan(&posted, Command::PublishOk, &actor(author), now()).unwrap();
        assert!(again.is_noop());

        let failed = post(PostStatus::Failed, author);
        let again = plan(
            &failed,
            Command::PublishFail { error: None },
            &actor(author),
            now(),
        )
        .unwrap();
        assert!(again.is_noop());

        let scheduled = post(PostStatus::Scheduled, author);
        let fail = plan(
            &scheduled,
            Command::PublishFail {
                error: Some("token expired".into()),
            },
            &actor(author),
            now(),
        )
        .unwrap();
        assert_eq!(fail.to, PostStatus::Failed);
        assert_eq!(
            fail.changes.last_error,
            Some(Some("token expired".to_string()))
        );
    }

    #[test]
    fn only_planned_and_draft_posts_are_editable() {
        let author = Uuid::new_v4();
        assert!(ensure_editable(&post(PostStatus::Planned, author)).is_ok());
        assert!(ensure_editable(&post(PostStatus::Draft, author)).is_ok());
        assert!(ensure_editable(&post(PostStatus::Approved, author)).is_err());
    }
}
