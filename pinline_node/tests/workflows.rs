mod common;

use std::time::Duration;

use anyhow::Result;
use chrono::{TimeDelta, Utc};
use common::Harness;
use pinline_core::jobs::{
    ClusterPinJob, EmailSend, FileJob, IpnsPublishJob, KeyCreationJob, PinJob, PinRemovalJob,
};
use pinline_core::upload::gc_date;
use pinline_core::{IpnsLedger, KeySpec, Network, PrivateKey, UploadKind, UploadLedger};
use pinline_node::consumers::{
    ClusterPinConsumer, FileConsumer, IpnsConsumer, KeyCreationConsumer, MailConsumer,
    PinConsumer, PinRemovalConsumer,
};
use pinline_node::notify::{
    INITIALIZATION_FAILED_SUBJECT, PIN_REMOVAL_FAILED_SUBJECT, UNAUTHORIZED_SUBJECT,
};
use pinline_node::FailurePolicy;
use pinline_queue::{PIN_EXCHANGE, QueueSpec};

const CID: &str = "QmPZ9gcCEpqKTo6aq61g2nXGUhM4iCL3ewB6LDXZCtioEB";

fn pin_job(cid: &str, network: &str, username: &str, months: i64) -> Result<PinJob> {
    Ok(PinJob {
        cid: cid.into(),
        network_name: network.parse()?,
        username: username.into(),
        hold_time_in_months: months,
        credit_cost: 10.0,
    })
}

fn assert_close(actual: chrono::DateTime<Utc>, expected: chrono::DateTime<Utc>) {
    let drift = (actual - expected).abs();
    assert!(drift < TimeDelta::minutes(1), "{actual} is not close to {expected}");
}

#[tokio::test]
async fn workflow_pin_replicates_and_records() -> Result<()> {
    let h = Harness::new();
    let pool = h
        .pipeline(FailurePolicy::Drop)
        .spawn_consumer(PinConsumer::new(&h.services), 2)
        .await?;

    h.send(&QueueSpec::PIN, &pin_job("Qm123", "public", "alice", 3)?)
        .await?;
    h.acked(&QueueSpec::PIN, 1).await?;
    pool.shutdown().await;

    assert_eq!(h.node.pins(pinline_backend_memory::DEFAULT_ENDPOINT), vec!["Qm123"]);

    let replicate: Vec<ClusterPinJob> = h.broker.published_json(&QueueSpec::CLUSTER_PIN.name);
    assert_eq!(replicate.len(), 1);
    assert_eq!(replicate[0].cid, "Qm123");
    assert_eq!(replicate[0].network_name, Network::Public);
    // the charge stays with the local pin
    assert_eq!(replicate[0].credit_cost, 0.0);

    let record = h
        .ledger
        .get("Qm123", &Network::Public)
        .await?
        .expect("upload recorded");
    assert_eq!(record.kind, UploadKind::Pin);
    assert!(record.uploaders.contains("alice"));
    assert_close(record.gc_date, gc_date(Utc::now(), 3));
    assert!(h.accounts.refunds("alice").is_empty());
    Ok(())
}

#[tokio::test]
async fn workflow_gc_date_takes_the_longest_hold() -> Result<()> {
    let h = Harness::new();
    let pool = h
        .pipeline(FailurePolicy::Drop)
        .spawn_consumer(PinConsumer::new(&h.services), 1)
        .await?;

    // one worker keeps the order of each pair
    h.send(&QueueSpec::PIN, &pin_job("QmShortFirst", "public", "alice", 2)?)
        .await?;
    h.send(&QueueSpec::PIN, &pin_job("QmShortFirst", "public", "bob", 6)?)
        .await?;
    h.send(&QueueSpec::PIN, &pin_job("QmLongFirst", "public", "alice", 6)?)
        .await?;
    h.send(&QueueSpec::PIN, &pin_job("QmLongFirst", "public", "bob", 2)?)
        .await?;
    h.acked(&QueueSpec::PIN, 4).await?;
    pool.shutdown().await;

    for cid in ["QmShortFirst", "QmLongFirst"] {
        let record = h
            .ledger
            .get(cid, &Network::Public)
            .await?
            .expect("upload recorded");
        assert_close(record.gc_date, gc_date(Utc::now(), 6));
        assert_eq!(record.hold_time_in_months, 6, "{cid}");
        assert_eq!(record.uploaders.len(), 2, "{cid}");
    }
    Ok(())
}

#[tokio::test]
async fn workflow_denied_private_pin_never_reaches_store() -> Result<()> {
    let h = Harness::new();
    h.accounts.add_user("mallory", "mallory@example.com");
    h.accounts.add_network("lab", "http://lab:5001", &["alice"]);
    let pool = h
        .pipeline(FailurePolicy::Drop)
        .spawn_consumer(PinConsumer::new(&h.services), 1)
        .await?;

    h.send(&QueueSpec::PIN, &pin_job(CID, "lab", "mallory", 1)?)
        .await?;
    h.acked(&QueueSpec::PIN, 1).await?;
    pool.shutdown().await;

    assert_eq!(h.node.total_pin_calls(), 0);
    assert_eq!(h.broker.nacked(&QueueSpec::PIN.name), 0);
    assert!(h.broker.published(&QueueSpec::CLUSTER_PIN.name).is_empty());
    // pre-billed pins are refunded when the gate refuses them
    assert_eq!(h.accounts.refunds("mallory"), vec![10.0]);

    let notices: Vec<EmailSend> = h.broker.published_json(&QueueSpec::EMAIL_SEND.name);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].subject, UNAUTHORIZED_SUBJECT);
    assert_eq!(notices[0].emails, vec!["mallory@example.com"]);
    assert_eq!(notices[0].usernames, vec!["mallory"]);
    Ok(())
}

#[tokio::test]
async fn workflow_access_check_error_notifies() -> Result<()> {
    let h = Harness::new();
    h.accounts.add_user("alice", "alice@example.com");
    h.accounts.add_network("lab", "http://lab:5001", &["alice"]);
    h.accounts.set_access_check_down(true);
    let pool = h
        .pipeline(FailurePolicy::Drop)
        .spawn_consumer(PinConsumer::new(&h.services), 1)
        .await?;

    h.send(&QueueSpec::PIN, &pin_job(CID, "lab", "alice", 1)?)
        .await?;
    h.acked(&QueueSpec::PIN, 1).await?;
    pool.shutdown().await;

    assert_eq!(h.node.total_pin_calls(), 0);
    assert_eq!(h.accounts.refunds("alice"), vec![10.0]);
    let notices: Vec<EmailSend> = h.broker.published_json(&QueueSpec::EMAIL_SEND.name);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].subject, INITIALIZATION_FAILED_SUBJECT);
    assert_eq!(notices[0].emails, vec!["alice@example.com"]);
    Ok(())
}

#[tokio::test]
async fn workflow_member_pins_on_private_node() -> Result<()> {
    let h = Harness::new();
    h.accounts.add_network("lab", "http://lab:5001", &["alice"]);
    let pool = h
        .pipeline(FailurePolicy::Drop)
        .spawn_consumer(PinConsumer::new(&h.services), 1)
        .await?;

    h.send(&QueueSpec::PIN, &pin_job(CID, "lab", "alice", 1)?)
        .await?;
    h.acked(&QueueSpec::PIN, 1).await?;
    pool.shutdown().await;

    assert_eq!(h.node.pins("lab"), vec![CID]);
    assert!(h.node.pins(pinline_backend_memory::DEFAULT_ENDPOINT).is_empty());
    let record = h.ledger.get(CID, &"lab".parse()?).await?;
    assert!(record.is_some());
    assert!(h.ledger.get(CID, &Network::Public).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn workflow_private_pin_hand_off_is_not_refunded() -> Result<()> {
    let h = Harness::new();
    h.accounts.add_network("lab", "http://lab:5001", &["alice"]);
    let pipeline = h.pipeline(FailurePolicy::Drop);
    let pins = pipeline
        .spawn_consumer(PinConsumer::new(&h.services), 1)
        .await?;
    let cluster = pipeline
        .spawn_consumer(ClusterPinConsumer::new(&h.services), 1)
        .await?;

    h.send(&QueueSpec::PIN, &pin_job(CID, "lab", "alice", 1)?)
        .await?;
    h.acked(&QueueSpec::PIN, 1).await?;
    h.acked(&QueueSpec::CLUSTER_PIN, 1).await?;
    pins.shutdown().await;
    cluster.shutdown().await;

    assert_eq!(h.node.pins("lab"), vec![CID]);
    // replication is public only, but the pin itself went through
    assert_eq!(h.cluster.total_pin_calls(), 0);
    assert!(h.accounts.refunds("alice").is_empty());
    Ok(())
}

#[tokio::test]
async fn workflow_cluster_failure_keeps_pin_charge() -> Result<()> {
    let h = Harness::new();
    h.cluster.set_failing(true);
    let pipeline = h.pipeline(FailurePolicy::Drop);
    let pins = pipeline
        .spawn_consumer(PinConsumer::new(&h.services), 1)
        .await?;
    let cluster = pipeline
        .spawn_consumer(ClusterPinConsumer::new(&h.services), 1)
        .await?;

    h.send(&QueueSpec::PIN, &pin_job(CID, "public", "alice", 1)?)
        .await?;
    h.acked(&QueueSpec::PIN, 1).await?;
    h.acked(&QueueSpec::CLUSTER_PIN, 1).await?;
    pins.shutdown().await;
    cluster.shutdown().await;

    assert_eq!(h.node.pins(pinline_backend_memory::DEFAULT_ENDPOINT), vec![CID]);
    assert!(h.accounts.refunds("alice").is_empty());
    Ok(())
}

#[tokio::test]
async fn workflow_failed_pin_is_not_refunded() -> Result<()> {
    let h = Harness::new();
    h.accounts.add_user("alice", "alice@example.com");
    h.node.set_fail_pins(true);
    let pool = h
        .pipeline(FailurePolicy::Drop)
        .spawn_consumer(PinConsumer::new(&h.services), 1)
        .await?;

    h.send(&QueueSpec::PIN, &pin_job(CID, "public", "alice", 1)?)
        .await?;
    h.acked(&QueueSpec::PIN, 1).await?;
    pool.shutdown().await;

    assert!(h.accounts.refunds("alice").is_empty());
    assert!(h.ledger.get(CID, &Network::Public).await?.is_none());
    assert_eq!(h.broker.published(&QueueSpec::EMAIL_SEND.name).len(), 1);
    Ok(())
}

#[tokio::test]
async fn workflow_file_add_survives_cleanup_failure() -> Result<()> {
    let h = Harness::new();
    h.staging.put("uploads", "report.pdf", b"quarterly numbers".to_vec());
    h.staging.set_fail_deletes(true);

    let files = h
        .pipeline(FailurePolicy::Drop)
        .spawn_consumer(FileConsumer::new(&h.services), 1)
        .await?;

    let job = FileJob {
        bucket_name: "uploads".into(),
        object_name: "report.pdf".into(),
        network_name: Network::Public,
        username: "alice".into(),
        hold_time_in_months: "not a number".into(),
    };
    h.send(&QueueSpec::FILE, &job).await?;
    h.acked(&QueueSpec::FILE, 1).await?;
    files.shutdown().await;

    let added: Vec<PinJob> = h.broker.published_json(PIN_EXCHANGE);
    assert_eq!(added.len(), 1);
    let hash = &added[0].cid;
    assert_eq!(added[0].hold_time_in_months, 1);
    assert_eq!(
        h.node.blob(hash).as_deref(),
        Some(b"quarterly numbers".as_slice())
    );

    let record = h
        .ledger
        .get(hash, &Network::Public)
        .await?
        .expect("file upload recorded");
    assert_eq!(record.kind, UploadKind::File);
    assert_eq!(h.ledger.upload_count(), 1);
    assert!(h.staging.contains("uploads", "report.pdf"));
    Ok(())
}

#[tokio::test]
async fn workflow_cluster_pin_rejects_private_networks() -> Result<()> {
    let h = Harness::new();
    let pool = h
        .pipeline(FailurePolicy::Drop)
        .spawn_consumer(ClusterPinConsumer::new(&h.services), 1)
        .await?;

    let job = ClusterPinJob {
        cid: CID.into(),
        network_name: "lab".parse()?,
        username: "alice".into(),
        hold_time_in_months: 1,
        credit_cost: 4.5,
    };
    h.send(&QueueSpec::CLUSTER_PIN, &job).await?;
    h.acked(&QueueSpec::CLUSTER_PIN, 1).await?;
    pool.shutdown().await;

    assert_eq!(h.accounts.refunds("alice"), vec![4.5]);
    assert_eq!(h.cluster.total_pin_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn workflow_cluster_pin_records_replication() -> Result<()> {
    let h = Harness::new();
    let pool = h
        .pipeline(FailurePolicy::Drop)
        .spawn_consumer(ClusterPinConsumer::new(&h.services), 1)
        .await?;

    let bad = ClusterPinJob {
        cid: "not-a-cid".into(),
        network_name: Network::Public,
        username: "bob".into(),
        hold_time_in_months: 1,
        credit_cost: 2.0,
    };
    let good = ClusterPinJob {
        cid: CID.into(),
        username: "alice".into(),
        ..bad.clone()
    };
    h.send(&QueueSpec::CLUSTER_PIN, &bad).await?;
    h.send(&QueueSpec::CLUSTER_PIN, &good).await?;
    h.acked(&QueueSpec::CLUSTER_PIN, 2).await?;
    pool.shutdown().await;

    assert_eq!(h.cluster.pin_calls(CID), 1);
    assert_eq!(h.accounts.refunds("bob"), vec![2.0]);
    assert!(h.accounts.refunds("alice").is_empty());
    let record = h
        .ledger
        .get(CID, &Network::Public)
        .await?
        .expect("replication recorded");
    assert_eq!(record.kind, UploadKind::PinCluster);
    Ok(())
}

#[tokio::test]
async fn workflow_ipns_republish_updates_record() -> Result<()> {
    let h = Harness::new();
    let key = PrivateKey::generate(KeySpec::ED25519)?;
    let peer_id = key.peer_id();
    h.keys.insert("alice-site", key);

    let pool = h
        .pipeline(FailurePolicy::Drop)
        .spawn_consumer(IpnsConsumer::new(&h.services)?, 1)
        .await?;

    let first = IpnsPublishJob {
        key: "alice-site".into(),
        cid: "QmFirst".into(),
        network_name: Network::Public,
        username: "alice".into(),
        lifetime: Duration::from_secs(24 * 3600),
        ttl: Duration::from_secs(60),
        credit_cost: 1.0,
    };
    h.send(&QueueSpec::IPNS_ENTRY, &first).await?;
    h.acked(&QueueSpec::IPNS_ENTRY, 1).await?;
    let created = h
        .ledger
        .find(&peer_id)
        .await?
        .expect("record inserted")
        .created_at;

    let second = IpnsPublishJob {
        cid: "QmSecond".into(),
        lifetime: Duration::from_secs(48 * 3600),
        ..first.clone()
    };
    h.send(&QueueSpec::IPNS_ENTRY, &second).await?;
    h.acked(&QueueSpec::IPNS_ENTRY, 2).await?;
    pool.shutdown().await;

    let record = h.ledger.find(&peer_id).await?.expect("record kept");
    assert_eq!(record.ipfs_hash, "QmSecond");
    assert_eq!(record.lifetime, Duration::from_secs(48 * 3600));
    assert_eq!(record.created_at, created);

    let published = h.names.published().await;
    assert_eq!(published.len(), 2);
    assert_eq!(published[1].peer_id, peer_id);
    assert_ne!(published[1].transport_peer_id, peer_id);
    assert_eq!(published[0].transport_peer_id, published[1].transport_peer_id);
    assert_close(published[1].eol, Utc::now() + TimeDelta::hours(48));
    assert!(h.accounts.refunds("alice").is_empty());
    Ok(())
}

#[tokio::test]
async fn workflow_ipns_missing_key_is_refunded() -> Result<()> {
    let h = Harness::new();
    let pool = h
        .pipeline(FailurePolicy::Drop)
        .spawn_consumer(IpnsConsumer::new(&h.services)?, 1)
        .await?;

    let job = IpnsPublishJob {
        key: "nobody-knows".into(),
        cid: "QmFirst".into(),
        network_name: Network::Public,
        username: "alice".into(),
        lifetime: Duration::from_secs(3600),
        ttl: Duration::from_secs(60),
        credit_cost: 3.0,
    };
    h.send(&QueueSpec::IPNS_ENTRY, &job).await?;
    h.acked(&QueueSpec::IPNS_ENTRY, 1).await?;
    pool.shutdown().await;

    assert_eq!(h.accounts.refunds("alice"), vec![3.0]);
    assert!(h.names.published().await.is_empty());
    Ok(())
}

fn key_job(key_type: &str, size: u32, name: &str) -> KeyCreationJob {
    KeyCreationJob {
        key_type: key_type.into(),
        size,
        name: name.into(),
        username: "carol".into(),
        network_name: Network::Public,
    }
}

#[tokio::test]
async fn workflow_key_creation() -> Result<()> {
    let h = Harness::new();
    let pool = h
        .pipeline(FailurePolicy::Drop)
        .spawn_consumer(KeyCreationConsumer::new(&h.services), 1)
        .await?;

    h.send(&QueueSpec::KEY_CREATION, &key_job("rsa", 8192, "huge"))
        .await?;
    h.send(&QueueSpec::KEY_CREATION, &key_job("dsa", 1024, "ancient"))
        .await?;
    h.send(&QueueSpec::KEY_CREATION, &key_job("ed25519", 0, "main"))
        .await?;
    h.acked(&QueueSpec::KEY_CREATION, 3).await?;
    pool.shutdown().await;

    assert!(!h.keys.contains("carol-huge"));
    assert!(!h.keys.contains("carol-ancient"));
    assert!(h.keys.contains("carol-main"));

    let keys = h.accounts.keys("carol");
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].0, "carol-main");
    assert!(keys[0].1.starts_with("12D3KooW"), "{}", keys[0].1);
    Ok(())
}

#[tokio::test]
async fn workflow_mail_send_is_acked_on_every_path() -> Result<()> {
    let h = Harness::new();
    h.mailer.reject("bounce@example.com");
    let pool = h
        .pipeline(FailurePolicy::Drop)
        .spawn_consumer(MailConsumer::new(&h.services), 1)
        .await?;

    let partial = EmailSend {
        subject: "Welcome".into(),
        content: "hello".into(),
        content_type: "text/plain".into(),
        usernames: vec!["bounce".into(), "dave".into()],
        emails: vec!["bounce@example.com".into(), "dave@example.com".into()],
    };
    let all_failed = EmailSend {
        usernames: vec!["bounce".into()],
        emails: vec!["bounce@example.com".into()],
        ..partial.clone()
    };
    h.send(&QueueSpec::EMAIL_SEND, &partial).await?;
    h.send(&QueueSpec::EMAIL_SEND, &all_failed).await?;
    h.acked(&QueueSpec::EMAIL_SEND, 2).await?;
    pool.shutdown().await;

    assert_eq!(h.broker.acked(&QueueSpec::EMAIL_SEND.name), 2);
    assert_eq!(h.broker.nacked(&QueueSpec::EMAIL_SEND.name), 0);
    let sent = h.mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to_address, "dave@example.com");
    assert_eq!(sent[0].to_name, "dave");
    Ok(())
}

#[tokio::test]
async fn workflow_pin_removal_notifies_on_failure() -> Result<()> {
    let h = Harness::new();
    h.accounts.add_user("alice", "alice@example.com");
    let pool = h
        .pipeline(FailurePolicy::Drop)
        .spawn_consumer(PinRemovalConsumer::new(&h.services), 1)
        .await?;

    let job = PinRemovalJob {
        content_hash: CID.into(),
        network_name: Network::Public,
        username: "alice".into(),
    };
    h.send(&QueueSpec::PIN_REMOVAL, &job).await?;
    h.acked(&QueueSpec::PIN_REMOVAL, 1).await?;
    assert_eq!(h.node.unpins(pinline_backend_memory::DEFAULT_ENDPOINT), vec![CID]);

    h.node.set_fail_unpins(true);
    h.send(&QueueSpec::PIN_REMOVAL, &job).await?;
    h.acked(&QueueSpec::PIN_REMOVAL, 2).await?;
    pool.shutdown().await;

    let notices: Vec<EmailSend> = h.broker.published_json(&QueueSpec::EMAIL_SEND.name);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].subject, PIN_REMOVAL_FAILED_SUBJECT);
    Ok(())
}

#[tokio::test]
async fn workflow_malformed_messages_are_dropped() -> Result<()> {
    let h = Harness::new();
    let pool = h
        .pipeline(FailurePolicy::Drop)
        .spawn_consumer(PinConsumer::new(&h.services), 1)
        .await?;

    h.send_raw(&QueueSpec::PIN, b"{not json").await?;
    h.send_raw(&QueueSpec::PIN, br#"{"cid":"Qm1","network_name":""}"#)
        .await?;
    h.acked(&QueueSpec::PIN, 2).await?;
    pool.shutdown().await;

    assert_eq!(h.node.total_pin_calls(), 0);
    assert!(h.broker.published(&QueueSpec::EMAIL_SEND.name).is_empty());
    Ok(())
}
