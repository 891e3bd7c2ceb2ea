//! One repository per collection, shared by every service

use std::sync::Arc;

use crate::db::mongo::MongoClient;
use crate::db::repository::{MemoryRepository, Repository};
use crate::db::schemas::{
    ApprovalRequestDoc, AssetDoc, BillingDoc, ChannelDoc, CommitDoc, ContractDoc, EvaluationDoc,
    HandoffDoc, JournalEntryDoc, LeadDoc, MessageDoc, NotificationDoc, OrganizationDoc, PayableDoc,
    ReceivableDoc, TaskDoc, UserDoc,
};
use crate::types::Result;

type Repo<T> = Arc<dyn Repository<T>>;

#[derive(Clone)]
pub struct Stores {
    pub users: Repo<UserDoc>,
    pub organizations: Repo<OrganizationDoc>,
    pub leads: Repo<LeadDoc>,
    pub evaluations: Repo<EvaluationDoc>,
    pub commits: Repo<CommitDoc>,
    pub contracts: Repo<ContractDoc>,
    pub handoffs: Repo<HandoffDoc>,
    pub billings: Repo<BillingDoc>,
    pub receivables: Repo<ReceivableDoc>,
    pub payables: Repo<PayableDoc>,
    pub journal_entries: Repo<JournalEntryDoc>,
    pub assets: Repo<AssetDoc>,
    pub tasks: Repo<TaskDoc>,
    pub approval_requests: Repo<ApprovalRequestDoc>,
    pub channels: Repo<ChannelDoc>,
    pub messages: Repo<MessageDoc>,
    pub notifications: Repo<NotificationDoc>,
}

impl Stores {
    /// Open every collection on MongoDB, applying indexes
    pub async fn mongo(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            users: Arc::new(client.collection::<UserDoc>().await?),
            organizations: Arc::new(client.collection::<OrganizationDoc>().await?),
            leads: Arc::new(client.collection::<LeadDoc>().await?),
            evaluations: Arc::new(client.collection::<EvaluationDoc>().await?),
            commits: Arc::new(client.collection::<CommitDoc>().await?),
            contracts: Arc::new(client.collection::<ContractDoc>().await?),
            handoffs: Arc::new(client.collection::<HandoffDoc>().await?),
            billings: Arc::new(client.collection::<BillingDoc>().await?),
            receivables: Arc::new(client.collection::<ReceivableDoc>().await?),
            payables: Arc::new(client.collection::<PayableDoc>().await?),
            journal_entries: Arc::new(client.collection::<JournalEntryDoc>().await?),
            assets: Arc::new(client.collection::<AssetDoc>().await?),
            tasks: Arc::new(client.collection::<TaskDoc>().await?),
            approval_requests: Arc::new(client.collection::<ApprovalRequestDoc>().await?),
            channels: Arc::new(client.collection::<ChannelDoc>().await?),
            messages: Arc::new(client.collection::<MessageDoc>().await?),
            notifications: Arc::new(client.collection::<NotificationDoc>().await?),
        })
    }

    /// Process-local stores for dev mode and tests
    pub fn memory() -> Self {
        Self {
            users: Arc::new(MemoryRepository::new()),
            organizations: Arc::new(MemoryRepository::new()),
            leads: Arc::new(MemoryRepository::new()),
            evaluations: Arc::new(MemoryRepository::new()),
            commits: Arc::new(MemoryRepository::new()),
            contracts: Arc::new(MemoryRepository::new()),
            handoffs: Arc::new(MemoryRepository::new()),
            billings: Arc::new(MemoryRepository::new()),
            receivables: Arc::new(MemoryRepository::new()),
            payables: Arc::new(MemoryRepository::new()),
            journal_entries: Arc::new(MemoryRepository::new()),
            assets: Arc::new(MemoryRepository::new()),
            tasks: Arc::new(MemoryRepository::new()),
            approval_requests: Arc::new(MemoryRepository::new()),
            channels: Arc::new(MemoryRepository::new()),
            messages: Arc::new(MemoryRepository::new()),
            notifications: Arc::new(MemoryRepository::new()),
        }
    }
}
