//! Per-user notifications

use bson::doc;
use tracing::warn;

use super::WorkspaceService;
use crate::auth::AuthContext;
use crate::db::schemas::{Metadata, NotificationDoc};
use crate::db::{modify_scoped, Repository};
use crate::types::{IbError, Result};

impl WorkspaceService {
    /// Queue a notification. Delivery is best effort: a failed insert is
    /// logged and never fails the operation that triggered it.
    pub(super) async fn notify(&self, org_id: &str, user_id: &str, title: &str, body: &str, link: String) {
        let notification = NotificationDoc {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: Metadata::new(),
            org_id: org_id.to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            link: Some(link),
            read: false,
        };
        if let Err(e) = self.stores.notifications.insert(notification).await {
            warn!(user_id = %user_id, "Failed to store notification: {}", e);
        }
    }

    pub async fn list_notifications(
        &self,
        ctx: &AuthContext,
        unread_only: bool,
    ) -> Result<Vec<NotificationDoc>> {
        let mut filter = doc! { "org_id": &ctx.org_id, "user_id": &ctx.user_id };
        if unread_only {
            filter.insert("read", false);
        }
        self.stores.notifications.find_many(filter).await
    }

    pub async fn mark_notification_read(&self, ctx: &AuthContext, id: &str) -> Result<NotificationDoc> {
        modify_scoped(self.stores.notifications.as_ref(), &ctx.org_id, id, |n| {
            // someone else's notification looks like a missing one
            if n.user_id != ctx.user_id {
                return Err(IbError::not_found("notification", id));
            }
            n.read = true;
            Ok(())
        })
        .await
    }

    /// Returns how many notifications changed
    pub async fn mark_all_notifications_read(&self, ctx: &AuthContext) -> Result<u64> {
        let repo: &dyn Repository<NotificationDoc> = self.stores.notifications.as_ref();
        let unread = repo
            .find_many(doc! { "org_id": &ctx.org_id, "user_id": &ctx.user_id, "read": false })
            .await?;

        let mut marked = 0;
        for mut notification in unread {
            notification.read = true;
            match repo.update(notification).await {
                Ok(_) => marked += 1,
                // a concurrent mark_read got there first
                Err(IbError::VersionConflict(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(marked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::schemas::UserDoc;
    use crate::db::Stores;
    use crate::logging::AuditLogger;

    #[tokio::test]
    async fn test_read_flags_are_per_user() {
        let service = WorkspaceService::new(Stores::memory(), AuditLogger::new());
        let alice = AuthContext::from_user(&UserDoc::new("o", "a@x.io", "A", String::new(), Role::Member));
        let bob = AuthContext::from_user(&UserDoc::new("o", "b@x.io", "B", String::new(), Role::Member));

        service.notify("o", &alice.user_id, "One", "", "task:1".into()).await;
        service.notify("o", &alice.user_id, "Two", "", "task:2".into()).await;
        service.notify("o", &bob.user_id, "Three", "", "task:3".into()).await;

        let mine = service.list_notifications(&alice, true).await.unwrap();
        assert_eq!(mine.len(), 2);

        assert!(matches!(
            service.mark_notification_read(&bob, &mine[0].id).await,
            Err(IbError::NotFound(_))
        ));
        service.mark_notification_read(&alice, &mine[0].id).await.unwrap();
        assert_eq!(service.list_notifications(&alice, true).await.unwrap().len(), 1);

        assert_eq!(service.mark_all_notifications_read(&alice).await.unwrap(), 1);
        assert!(service.list_notifications(&alice, true).await.unwrap().is_empty());
        assert_eq!(service.list_notifications(&alice, false).await.unwrap().len(), 2);
        assert_eq!(service.list_notifications(&bob, true).await.unwrap().len(), 1);
    }
}
