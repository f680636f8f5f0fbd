use std::sync::Arc;

use pinline_backend_memory::{
    MemoryAccounts, MemoryCluster, MemoryKeyStore, MemoryLedger, MemoryMailer,
    MemoryNamePublisher, MemoryNode, MemoryStaging,
};

use crate::services::Services;

/// Handles on the in-memory collaborators behind [`memory_services`].
pub(crate) struct Backends {
    pub accounts: Arc<MemoryAccounts>,
    pub node: MemoryNode,
}

pub(crate) fn memory_services() -> (Services, Backends) {
    let accounts = Arc::new(MemoryAccounts::new());
    let node = MemoryNode::new();
    let ledger = Arc::new(MemoryLedger::new());
    let services = Services {
        store: Arc::new(node.clone()),
        cluster: Arc::new(MemoryCluster::new()),
        staging: Arc::new(MemoryStaging::new()),
        names: Arc::new(MemoryNamePublisher::new()),
        uploads: ledger.clone(),
        ipns: ledger,
        keys: Arc::new(MemoryKeyStore::new()),
        access: accounts.clone(),
        networks: accounts.clone(),
        users: accounts.clone(),
        credits: accounts.clone(),
        mailer: Arc::new(MemoryMailer::new()),
    };
    (services, Backends { accounts, node })
}
