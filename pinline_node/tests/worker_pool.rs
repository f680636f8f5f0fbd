mod common;

use std::time::Duration;

use anyhow::Result;
use common::Harness;
use pinline_core::Network;
use pinline_core::jobs::{ClusterPinJob, EmailSend, PinJob};
use pinline_node::consumers::{ClusterPinConsumer, MailConsumer, PinConsumer};
use pinline_node::{FailurePolicy, QueueKind};
use pinline_queue::{DeadLetter, QueueSpec};

const CID: &str = "QmPZ9gcCEpqKTo6aq61g2nXGUhM4iCL3ewB6LDXZCtioEB";

fn cluster_job(cost: f64) -> ClusterPinJob {
    ClusterPinJob {
        cid: CID.into(),
        network_name: Network::Public,
        username: "alice".into(),
        hold_time_in_months: 1,
        credit_cost: cost,
    }
}

const RETRY: FailurePolicy = FailurePolicy::Retry {
    max_deliveries: 3,
    backoff_ms: 10,
};

#[tokio::test]
async fn test_retry_then_dead_letter() -> Result<()> {
    let h = Harness::new();
    h.cluster.set_failing(true);
    let pool = h
        .pipeline(RETRY)
        .spawn_consumer(ClusterPinConsumer::new(&h.services), 1)
        .await?;

    h.send(&QueueSpec::CLUSTER_PIN, &cluster_job(5.0)).await?;
    h.acked(&QueueSpec::CLUSTER_PIN, 1).await?;
    pool.shutdown().await;

    assert_eq!(h.cluster.total_pin_calls(), 0);
    assert_eq!(h.broker.nacked(&QueueSpec::CLUSTER_PIN.name), 2);
    assert_eq!(h.broker.acked(&QueueSpec::CLUSTER_PIN.name), 1);
    // compensation runs once, on the final attempt
    assert_eq!(h.accounts.refunds("alice"), vec![5.0]);

    let dead = QueueSpec::CLUSTER_PIN.dead_letter();
    let letters: Vec<DeadLetter> = h.broker.published_json(&dead.name);
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].queue, "ipfs-cluster-pin-queue");
    assert_eq!(letters[0].attempts, 3);
    assert!(letters[0].payload.contains(CID));
    assert!(letters[0].reason.contains("cluster pin"), "{}", letters[0].reason);
    Ok(())
}

#[tokio::test]
async fn test_retry_recovers_without_compensation() -> Result<()> {
    let h = Harness::new();
    h.cluster.set_failing(true);
    let pool = h
        .pipeline(FailurePolicy::Retry {
            max_deliveries: 10,
            backoff_ms: 200,
        })
        .spawn_consumer(ClusterPinConsumer::new(&h.services), 1)
        .await?;

    h.send(&QueueSpec::CLUSTER_PIN, &cluster_job(5.0)).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.cluster.set_failing(false);
    h.acked(&QueueSpec::CLUSTER_PIN, 1).await?;
    pool.shutdown().await;

    assert!(h.broker.nacked(&QueueSpec::CLUSTER_PIN.name) >= 1);
    assert!(h.accounts.refunds("alice").is_empty());
    assert!(
        h.broker
            .published(&QueueSpec::CLUSTER_PIN.dead_letter().name)
            .is_empty()
    );
    Ok(())
}

#[tokio::test]
async fn test_retry_skips_permanent_failures() -> Result<()> {
    let h = Harness::new();
    let pool = h
        .pipeline(RETRY)
        .spawn_consumer(ClusterPinConsumer::new(&h.services), 1)
        .await?;

    let private = ClusterPinJob {
        network_name: "lab".parse()?,
        ..cluster_job(5.0)
    };
    h.send(&QueueSpec::CLUSTER_PIN, &private).await?;
    h.acked(&QueueSpec::CLUSTER_PIN, 1).await?;
    pool.shutdown().await;

    assert_eq!(h.broker.nacked(&QueueSpec::CLUSTER_PIN.name), 0);
    assert_eq!(h.accounts.refunds("alice"), vec![5.0]);
    assert!(
        h.broker
            .published(&QueueSpec::CLUSTER_PIN.dead_letter().name)
            .is_empty()
    );
    Ok(())
}

#[tokio::test]
async fn test_all_failed_mail_is_retried_under_retry_policy() -> Result<()> {
    let h = Harness::new();
    h.mailer.reject("bounce@example.com");
    let pool = h
        .pipeline(RETRY)
        .spawn_consumer(MailConsumer::new(&h.services), 1)
        .await?;

    let job = EmailSend {
        subject: "Welcome".into(),
        content: "hello".into(),
        content_type: "text/plain".into(),
        usernames: vec!["bounce".into()],
        emails: vec!["bounce@example.com".into()],
    };
    h.send(&QueueSpec::EMAIL_SEND, &job).await?;
    h.acked(&QueueSpec::EMAIL_SEND, 1).await?;
    pool.shutdown().await;

    assert_eq!(h.broker.nacked(&QueueSpec::EMAIL_SEND.name), 2);
    assert_eq!(h.broker.acked(&QueueSpec::EMAIL_SEND.name), 1);
    Ok(())
}

#[tokio::test]
async fn test_workers_share_the_queue() -> Result<()> {
    let h = Harness::new();
    let pool = h
        .pipeline(FailurePolicy::Drop)
        .spawn_consumer(PinConsumer::new(&h.services), 3)
        .await?;
    assert_eq!(pool.running(), 3);
    assert_eq!(pool.queue(), "ipfs-pin-queue");

    for n in 0..20 {
        let job = PinJob {
            cid: format!("QmJob{n}"),
            network_name: Network::Public,
            username: "alice".into(),
            hold_time_in_months: 1,
            credit_cost: 0.0,
        };
        h.send(&QueueSpec::PIN, &job).await?;
    }
    h.acked(&QueueSpec::PIN, 20).await?;
    pool.shutdown().await;

    assert_eq!(h.node.total_pin_calls(), 20);
    assert_eq!(h.broker.acked(&QueueSpec::PIN.name), 20);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_stops_consuming() -> Result<()> {
    let h = Harness::new();
    let pool = h
        .pipeline(FailurePolicy::Drop)
        .spawn(QueueKind::Pin, 2)
        .await?;
    pool.shutdown().await;
    assert_eq!(pool.running(), 0);

    let job = PinJob {
        cid: CID.into(),
        network_name: Network::Public,
        username: "alice".into(),
        hold_time_in_months: 1,
        credit_cost: 0.0,
    };
    h.send(&QueueSpec::PIN, &job).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.node.total_pin_calls(), 0);
    assert_eq!(h.broker.acked(&QueueSpec::PIN.name), 0);
    Ok(())
}

#[tokio::test]
async fn test_every_queue_kind_starts() -> Result<()> {
    let h = Harness::new();
    let pipeline = h.pipeline(FailurePolicy::Drop);
    for kind in QueueKind::ALL {
        let pool = pipeline.spawn(kind, 1).await?;
        assert_eq!(pool.queue(), kind.queue().name);
        pool.shutdown().await;
    }
    Ok(())
}
