use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use pinline_backend_ipfs::{ClusterRestClient, KuboConnector, KuboNamePublisher};
use pinline_backend_redb::RedbStore;
use pinline_backend_s3::S3Staging;
use pinline_backend_sendgrid::SendGridMailer;
use pinline_core::{
    AccessControl, ClusterClient, ContentStoreConnector, CreditLedger, Email, IpnsLedger,
    KeyStore, Mailer, NamePublisher, NetworkDirectory, ObjectStaging, UploadLedger, UserDirectory,
};

use crate::config::PipelineConfig;

/// Every collaborator the consumers talk to.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn ContentStoreConnector>,
    pub cluster: Arc<dyn ClusterClient>,
    pub staging: Arc<dyn ObjectStaging>,
    pub names: Arc<dyn NamePublisher>,
    pub uploads: Arc<dyn UploadLedger>,
    pub ipns: Arc<dyn IpnsLedger>,
    pub keys: Arc<dyn KeyStore>,
    pub access: Arc<dyn AccessControl>,
    pub networks: Arc<dyn NetworkDirectory>,
    pub users: Arc<dyn UserDirectory>,
    pub credits: Arc<dyn CreditLedger>,
    pub mailer: Arc<dyn Mailer>,
}

impl Services {
    /// Wires the production backends described by `config`.
    ///
    /// Optional sections that are missing are replaced by a collaborator
    /// that fails every call, so only the consumers needing them break.
    pub fn from_config(config: &PipelineConfig) -> anyhow::Result<Self> {
        let db = Arc::new(
            RedbStore::open(&config.database.path)
                .with_context(|| format!("opening database in {}", config.database.path))?,
        );

        let cluster: Arc<dyn ClusterClient> = match &config.cluster {
            Some(cluster) => Arc::new(ClusterRestClient::new(cluster.clone())),
            None => Arc::new(Unconfigured("cluster")),
        };
        let staging: Arc<dyn ObjectStaging> = match &config.staging {
            Some(staging) => Arc::new(S3Staging::create(staging.clone())?),
            None => Arc::new(Unconfigured("staging")),
        };
        let mailer: Arc<dyn Mailer> = match &config.mail {
            Some(mail) => Arc::new(SendGridMailer::new(mail.clone())),
            None => Arc::new(Unconfigured("mail")),
        };

        Ok(Self {
            store: Arc::new(KuboConnector::new(&config.ipfs.api_url)),
            cluster,
            staging,
            names: Arc::new(KuboNamePublisher::new(&config.ipfs.api_url)),
            uploads: db.clone(),
            ipns: db.clone(),
            keys: db.clone(),
            access: db.clone(),
            networks: db.clone(),
            users: db.clone(),
            credits: db,
            mailer,
        })
    }
}

/// Stand-in for a collaborator whose config section is absent.
struct Unconfigured(&'static str);

impl Unconfigured {
    fn fail<T>(&self) -> anyhow::Result<T> {
        bail!("no [{}] section in the configuration", self.0)
    }
}

#[async_trait]
impl ClusterClient for Unconfigured {
    async fn pin(&self, _cid: &Cid) -> anyhow::Result<()> {
        self.fail()
    }
}

#[async_trait]
impl ObjectStaging for Unconfigured {
    async fn get_object(&self, _bucket: &str, _object: &str) -> anyhow::Result<Bytes> {
        self.fail()
    }

    async fn delete_object(&self, _bucket: &str, _object: &str) -> anyhow::Result<()> {
        self.fail()
    }
}

#[async_trait]
impl Mailer for Unconfigured {
    async fn send(&self, _email: &Email) -> anyhow::Result<()> {
        self.fail()
    }
}
