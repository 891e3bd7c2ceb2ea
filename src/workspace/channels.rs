//! Channels and chat messages

use bson::doc;
use serde::Deserialize;

use super::WorkspaceService;
use crate::auth::AuthContext;
use crate::db::schemas::{ChannelDoc, MessageDoc, Metadata};
use crate::db::{get_scoped, modify_scoped};
use crate::tenancy::ensure_member;
use crate::types::{IbError, Result};

pub const MAX_MESSAGE_CHARS: usize = 4000;
const DEFAULT_MESSAGE_PAGE: usize = 50;
const MAX_MESSAGE_PAGE: usize = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostMessageRequest {
    pub body: String,
}

fn normalize_channel_name(name: &str) -> Result<String> {
    let name = name.trim().trim_start_matches('#').to_lowercase();
    if name.is_empty() {
        return Err(IbError::Validation("name is required".into()));
    }
    if name.chars().count() > 80 {
        return Err(IbError::Validation("name must be at most 80 characters".into()));
    }
    Ok(name)
}

fn ensure_channel_member(channel: &ChannelDoc, user_id: &str) -> Result<()> {
    if channel.member_ids.iter().any(|m| m == user_id) {
        Ok(())
    } else {
        Err(IbError::Forbidden("You are not a member of this channel".into()))
    }
}

impl WorkspaceService {
    pub async fn create_channel(&self, ctx: &AuthContext, req: CreateChannelRequest) -> Result<ChannelDoc> {
        let name = normalize_channel_name(&req.name)?;
        let taken = self
            .stores
            .channels
            .count(doc! { "org_id": &ctx.org_id, "name": &name })
            .await?;
        if taken > 0 {
            return Err(IbError::Conflict(format!("Channel '{name}' already exists")));
        }

        let mut member_ids = vec![ctx.user_id.clone()];
        for id in req.member_ids {
            if !member_ids.contains(&id) {
                ensure_member(&self.stores, &ctx.org_id, &id).await?;
                member_ids.push(id);
            }
        }

        let channel = ChannelDoc {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: Metadata::new(),
            org_id: ctx.org_id.clone(),
            name,
            member_ids,
            created_by: ctx.user_id.clone(),
        };

        let channel = self.stores.channels.insert(channel).await?;
        self.audit.record(ctx, "channel.created", "channel", &channel.id).await;
        Ok(channel)
    }

    /// Members may invite; the invitee must belong to the org
    pub async fn add_channel_member(
        &self,
        ctx: &AuthContext,
        id: &str,
        req: AddMemberRequest,
    ) -> Result<ChannelDoc> {
        let user = ensure_member(&self.stores, &ctx.org_id, &req.user_id).await?;

        let channel = modify_scoped(self.stores.channels.as_ref(), &ctx.org_id, id, |channel| {
            ensure_channel_member(channel, &ctx.user_id)?;
            if !channel.member_ids.contains(&user.id) {
                channel.member_ids.push(user.id.clone());
            }
            Ok(())
        })
        .await?;

        self.notify(
            &channel.org_id,
            &user.id,
            "Added to channel",
            &format!("#{}", channel.name),
            format!("channel:{}", channel.id),
        )
        .await;
        Ok(channel)
    }

    /// Channels the caller belongs to
    pub async fn list_channels(&self, ctx: &AuthContext) -> Result<Vec<ChannelDoc>> {
        self.stores
            .channels
            .find_many(doc! { "org_id": &ctx.org_id, "member_ids": &ctx.user_id })
            .await
    }

    pub async fn post_message(
        &self,
        ctx: &AuthContext,
        channel_id: &str,
        req: PostMessageRequest,
    ) -> Result<MessageDoc> {
        let body = req.body.trim().to_string();
        if body.is_empty() {
            return Err(IbError::Validation("body must not be empty".into()));
        }
        if body.chars().count() > MAX_MESSAGE_CHARS {
            return Err(IbError::Validation(format!(
                "body must be at most {MAX_MESSAGE_CHARS} characters"
            )));
        }

        let channel = get_scoped(self.stores.channels.as_ref(), &ctx.org_id, channel_id).await?;
        ensure_channel_member(&channel, &ctx.user_id)?;

        let message = MessageDoc {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: Metadata::new(),
            org_id: ctx.org_id.clone(),
            channel_id: channel.id,
            sender_id: ctx.user_id.clone(),
            body,
        };
        self.stores.messages.insert(message).await
    }

    /// Most recent messages first
    pub async fn list_messages(
        &self,
        ctx: &AuthContext,
        channel_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<MessageDoc>> {
        let channel = get_scoped(self.stores.channels.as_ref(), &ctx.org_id, channel_id).await?;
        ensure_channel_member(&channel, &ctx.user_id)?;

        let limit = limit.unwrap_or(DEFAULT_MESSAGE_PAGE).clamp(1, MAX_MESSAGE_PAGE);
        let mut messages = self
            .stores
            .messages
            .find_many(doc! { "org_id": &ctx.org_id, "channel_id": &channel.id })
            .await?;
        messages.truncate(limit);
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::schemas::UserDoc;
    use crate::db::Stores;
    use crate::logging::AuditLogger;

    async fn setup() -> (WorkspaceService, Vec<AuthContext>) {
        let stores = Stores::memory();
        let mut people = Vec::new();
        for name in ["ops", "dev", "qa"] {
            let user = stores
                .users
                .insert(UserDoc::new("org-1", &format!("{name}@x.io"), name, String::new(), Role::Member))
                .await
                .unwrap();
            people.push(AuthContext::from_user(&user));
        }
        (WorkspaceService::new(stores, AuditLogger::new()), people)
    }

    #[tokio::test]
    async fn test_names_are_unique_per_org() {
        let (service, people) = setup().await;
        let channel = service
            .create_channel(&people[0], CreateChannelRequest { name: "#General".into(), member_ids: vec![] })
            .await
            .unwrap();
        assert_eq!(channel.name, "general");
        assert_eq!(channel.member_ids, vec![people[0].user_id.clone()]);

        assert!(matches!(
            service
                .create_channel(&people[1], CreateChannelRequest { name: "general".into(), member_ids: vec![] })
                .await,
            Err(IbError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_members_only_messaging() {
        let (service, people) = setup().await;
        let (ops, dev, qa) = (&people[0], &people[1], &people[2]);
        let channel = service
            .create_channel(
                ops,
                CreateChannelRequest {
                    name: "release".into(),
                    member_ids: vec![dev.user_id.clone()],
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            service
                .post_message(qa, &channel.id, PostMessageRequest { body: "hi".into() })
                .await,
            Err(IbError::Forbidden(_))
        ));
        assert!(service.list_channels(qa).await.unwrap().is_empty());

        assert!(matches!(
            service
                .post_message(dev, &channel.id, PostMessageRequest { body: "   ".into() })
                .await,
            Err(IbError::Validation(_))
        ));
        assert!(service
            .post_message(dev, &channel.id, PostMessageRequest { body: "x".repeat(MAX_MESSAGE_CHARS + 1) })
            .await
            .is_err());

        for n in 0..3 {
            service
                .post_message(dev, &channel.id, PostMessageRequest { body: format!("build {n}") })
                .await
                .unwrap();
        }
        let page = service.list_messages(ops, &channel.id, Some(2)).await.unwrap();
        assert_eq!(page.len(), 2);

        service
            .add_channel_member(dev, &channel.id, AddMemberRequest { user_id: qa.user_id.clone() })
            .await
            .unwrap();
        assert_eq!(service.list_channels(qa).await.unwrap().len(), 1);
        assert_eq!(service.list_notifications(qa, true).await.unwrap().len(), 1);
    }
}
