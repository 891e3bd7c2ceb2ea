//! Super-admin view over every tenant

use bson::doc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::auth::AuthContext;
use crate::db::schemas::{OrgStatus, OrganizationDoc, PLATFORM_ORG_ID};
use crate::db::{modify_scoped, Stores};
use crate::logging::{AuditEvent, AuditLogger};
use crate::types::{IbError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct SetOrgStatusRequest {
    pub status: OrgStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformStats {
    pub total_orgs: u64,
    pub orgs_by_status: BTreeMap<String, u64>,
    pub total_users: u64,
    pub active_users: u64,
}

#[derive(Clone)]
pub struct PlatformService {
    stores: Stores,
    audit: AuditLogger,
}

impl PlatformService {
    pub fn new(stores: Stores, audit: AuditLogger) -> Self {
        Self { stores, audit }
    }

    /// Every tenant except the platform itself
    pub async fn list_orgs(&self, status: Option<OrgStatus>) -> Result<Vec<OrganizationDoc>> {
        let mut filter = doc! { "id": { "$ne": PLATFORM_ORG_ID } };
        if let Some(status) = status {
            filter.insert("status", status);
        }
        self.stores.organizations.find_many(filter).await
    }

    pub async fn set_org_status(
        &self,
        ctx: &AuthContext,
        org_id: &str,
        req: SetOrgStatusRequest,
    ) -> Result<OrganizationDoc> {
        if org_id == PLATFORM_ORG_ID {
            return Err(IbError::Forbidden("The platform organization cannot be changed".into()));
        }

        let org = modify_scoped(self.stores.organizations.as_ref(), org_id, org_id, |org| {
            org.status = req.status;
            Ok(())
        })
        .await?;

        self.audit
            .log(
                AuditEvent::new("org.status_changed", "organization", &org.id)
                    .by(ctx)
                    .in_org(&org.id)
                    .with_detail(serde_json::json!({ "status": org.status })),
            )
            .await;
        Ok(org)
    }

    pub async fn platform_stats(&self) -> Result<PlatformStats> {
        let orgs = self.list_orgs(None).await?;
        let mut orgs_by_status = BTreeMap::new();
        for org in &orgs {
            *orgs_by_status.entry(org.status.to_string()).or_insert(0) += 1;
        }

        let tenant_users = doc! { "org_id": { "$ne": PLATFORM_ORG_ID } };
        let total_users = self.stores.users.count(tenant_users.clone()).await?;
        let mut active = tenant_users;
        active.insert("is_active", true);
        let active_users = self.stores.users.count(active).await?;

        Ok(PlatformStats {
            total_orgs: orgs.len() as u64,
            orgs_by_status,
            total_users,
            active_users,
        })
    }
}
