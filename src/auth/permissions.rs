//! Roles and capabilities
//!
//! A user's `role_id` claim maps to a fixed capability set. Route handlers ask
//! for a capability, never for a role, except where a workflow step names the
//! role itself (commit approvals).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::IbError;

/// Role carried in the `role_id` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform operator, not bound to a tenant
    SuperAdmin,
    /// Tenant administrator
    OrgAdmin,
    Ceo,
    FinanceHead,
    SalesManager,
    ProcurementManager,
    Legal,
    Accountant,
    Sales,
    Procurement,
    /// Workspace-only access
    #[default]
    Member,
}

/// What a request is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    PlatformAdmin,
    ManageOrg,
    ManageUsers,
    CommerceRead,
    CommerceWrite,
    FinanceRead,
    FinanceWrite,
    /// Approve/issue billings, post journal entries, approve payables
    FinancePost,
    Workspace,
}

impl Role {
    pub const ALL: [Role; 11] = [
        Role::SuperAdmin,
        Role::OrgAdmin,
        Role::Ceo,
        Role::FinanceHead,
        Role::SalesManager,
        Role::ProcurementManager,
        Role::Legal,
        Role::Accountant,
        Role::Sales,
        Role::Procurement,
        Role::Member,
    ];

    /// Capabilities granted to this role
    pub fn capabilities(self) -> &'static [Capability] {
        use Capability::*;

        match self {
            Role::SuperAdmin => &[
                PlatformAdmin,
                ManageOrg,
                ManageUsers,
                CommerceRead,
                CommerceWrite,
                FinanceRead,
                FinanceWrite,
                FinancePost,
                Workspace,
            ],
            Role::OrgAdmin => &[
                ManageOrg,
                ManageUsers,
                CommerceRead,
                CommerceWrite,
                FinanceRead,
                FinanceWrite,
                FinancePost,
                Workspace,
            ],
            Role::Ceo => &[CommerceRead, CommerceWrite, FinanceRead, Workspace],
            Role::FinanceHead => &[
                CommerceRead,
                FinanceRead,
                FinanceWrite,
                FinancePost,
                Workspace,
            ],
            Role::SalesManager | Role::ProcurementManager | Role::Sales | Role::Procurement => {
                &[CommerceRead, CommerceWrite, Workspace]
            }
            Role::Legal => &[CommerceRead, Workspace],
            Role::Accountant => &[FinanceRead, FinanceWrite, Workspace],
            Role::Member => &[Workspace],
        }
    }

    pub fn has(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Seniority used to order approval chains (lower approves first)
    pub fn approval_rank(self) -> u8 {
        match self {
            Role::SalesManager | Role::ProcurementManager => 0,
            Role::Legal => 1,
            Role::FinanceHead => 2,
            Role::Ceo => 3,
            _ => 10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::OrgAdmin => "org_admin",
            Role::Ceo => "ceo",
            Role::FinanceHead => "finance_head",
            Role::SalesManager => "sales_manager",
            Role::ProcurementManager => "procurement_manager",
            Role::Legal => "legal",
            Role::Accountant => "accountant",
            Role::Sales => "sales",
            Role::Procurement => "procurement",
            Role::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = IbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| IbError::BadRequest(format!("Unknown role '{s}'")))
    }
}

impl From<Role> for bson::Bson {
    fn from(role: Role) -> Self {
        bson::Bson::String(role.as_str().to_string())
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::PlatformAdmin => "platform_admin",
            Capability::ManageOrg => "manage_org",
            Capability::ManageUsers => "manage_users",
            Capability::CommerceRead => "commerce_read",
            Capability::CommerceWrite => "commerce_write",
            Capability::FinanceRead => "finance_read",
            Capability::FinanceWrite => "finance_write",
            Capability::FinancePost => "finance_post",
            Capability::Workspace => "workspace",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_is_workspace_only() {
        assert!(Role::Member.has(Capability::Workspace));
        assert!(!Role::Member.has(Capability::CommerceRead));
        assert!(!Role::Member.has(Capability::FinanceRead));
    }

    #[test]
    fn test_only_super_admin_is_platform_admin() {
        for role in Role::ALL {
            assert_eq!(
                role.has(Capability::PlatformAdmin),
                role == Role::SuperAdmin,
                "{role}"
            );
        }
    }

    #[test]
    fn test_finance_post_restricted() {
        assert!(Role::FinanceHead.has(Capability::FinancePost));
        assert!(Role::OrgAdmin.has(Capability::FinancePost));
        assert!(!Role::Accountant.has(Capability::FinancePost));
        assert!(!Role::Sales.has(Capability::FinancePost));
    }

    #[test]
    fn test_role_round_trip_through_str() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.as_str()));
        }
        assert!("wizard".parse::<Role>().is_err());
    }

    #[test]
    fn test_approval_rank_ordering() {
        assert!(Role::SalesManager.approval_rank() < Role::Legal.approval_rank());
        assert!(Role::Legal.approval_rank() < Role::FinanceHead.approval_rank());
        assert!(Role::FinanceHead.approval_rank() < Role::Ceo.approval_rank());
    }
}
