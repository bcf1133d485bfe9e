use std::sync::Arc;

use repo_updater_core::{OriginName, OverflowPolicy, Repo, SourceFailurePolicy};
use repo_updater_sync::{
    publish, MemoryStore, Reconciler, ReconcilerOptions, SourceRegistry, StaticSource, SyncError,
};
use rstest::rstest;

struct Fixture {
    origin_a: StaticSource,
    origin_b: StaticSource,
    store: MemoryStore,
}

impl Fixture {
    /// Catalog holds {a1@origin-a, b1@origin-b}; origin-a now reports
    /// {a1, a2} and origin-b does not answer.
    fn new() -> Self {
        Self {
            origin_a: StaticSource::new(vec![Repo::new("a1", "origin-a"), Repo::new("a2", "origin-a")]),
            origin_b: StaticSource::failing("connection reset"),
            store: MemoryStore::new()
                .with_repos(vec![Repo::new("a1", "origin-a"), Repo::new("b1", "origin-b")]),
        }
    }

    fn reconciler(&self, policy: SourceFailurePolicy) -> Reconciler {
        let registry = SourceRegistry::new()
            .with("origin-a", Arc::new(self.origin_a.clone()))
            .and_then(|r| r.with("origin-b", Arc::new(self.origin_b.clone())))
            .expect("registry");
        Reconciler::new(registry, Arc::new(self.store.clone())).with_options(ReconcilerOptions {
            on_source_failure: policy,
            ..ReconcilerOptions::default()
        })
    }
}

fn keys(repos: &[Repo]) -> Vec<String> {
    repos.iter().map(|r| r.key().to_string()).collect()
}

#[tokio::test]
async fn failed_origin_is_treated_as_absent_by_default() {
    let fixture = Fixture::new();
    let report = fixture
        .reconciler(SourceFailurePolicy::default())
        .sync()
        .await
        .expect("cycle commits despite the failed source");

    assert_eq!(keys(&report.diff.added), vec!["a2@origin-a"]);
    assert_eq!(keys(&report.diff.unmodified), vec!["a1@origin-a"]);
    assert_eq!(keys(&report.diff.deleted), vec!["b1@origin-b"]);
    assert!(report.diff.modified.is_empty());

    assert_eq!(report.failed_origins(), vec![OriginName::from("origin-b")]);
    assert!(report.source_errors.to_string().contains("origin-b"));

    let stored = fixture.store.repos().await;
    assert_eq!(stored.len(), 3, "writes were committed");
    let b1 = stored.iter().find(|r| r.name.0 == "b1").expect("b1");
    assert!(b1.is_deleted());
}

#[tokio::test]
async fn protect_unknown_keeps_the_failed_origin_out_of_the_cycle() {
    let fixture = Fixture::new();
    let report = fixture
        .reconciler(SourceFailurePolicy::ProtectUnknown)
        .sync()
        .await
        .expect("cycle");

    assert_eq!(keys(&report.diff.added), vec!["a2@origin-a"]);
    assert_eq!(keys(&report.diff.unmodified), vec!["a1@origin-a"]);
    assert!(report.diff.deleted.is_empty());
    assert_eq!(report.failed_origins(), vec![OriginName::from("origin-b")]);

    let stored = fixture.store.repos().await;
    let b1 = stored.iter().find(|r| r.name.0 == "b1").expect("b1");
    assert!(!b1.is_deleted());
}

#[tokio::test]
async fn recovered_origin_is_reconciled_on_the_next_cycle() {
    let fixture = Fixture::new();
    let reconciler = fixture.reconciler(SourceFailurePolicy::ProtectUnknown);
    reconciler.sync().await.expect("degraded cycle");

    fixture.origin_b.set_repos(vec![Repo::new("b2", "origin-b")]);
    let report = reconciler.sync().await.expect("healthy cycle");

    assert!(report.source_errors.is_empty());
    assert_eq!(keys(&report.diff.added), vec!["b2@origin-b"]);
    assert_eq!(keys(&report.diff.deleted), vec!["b1@origin-b"]);
}

#[tokio::test]
async fn every_source_failing_still_commits_under_treat_as_absent() {
    let fixture = Fixture::new();
    fixture.origin_a.fail_with("timeout");
    let report = fixture
        .reconciler(SourceFailurePolicy::TreatAsAbsent)
        .sync()
        .await
        .expect("cycle");

    assert_eq!(report.sourced, 0);
    assert_eq!(report.source_errors.len(), 2);
    assert_eq!(
        keys(&report.diff.deleted),
        vec!["a1@origin-a", "b1@origin-b"]
    );
}

#[rstest]
#[case::block(OverflowPolicy::Block, true)]
#[case::drop_newest(OverflowPolicy::DropNewest, true)]
#[case::reject(OverflowPolicy::Reject, false)]
#[tokio::test]
async fn full_publish_channel_follows_the_overflow_policy(
    #[case] overflow: OverflowPolicy,
    #[case] second_cycle_ok: bool,
) {
    let fixture = Fixture::new();
    let (publisher, mut rx) = publish::channel(1, overflow);
    let reconciler = fixture
        .reconciler(SourceFailurePolicy::default())
        .with_publisher(publisher);

    reconciler.sync().await.expect("first cycle fills the channel");

    if overflow == OverflowPolicy::Block {
        let first = rx.recv().await.expect("first diff");
        assert_eq!(keys(&first.added), vec!["a2@origin-a"]);
    }

    let second = reconciler.sync().await;
    assert_eq!(second.is_ok(), second_cycle_ok);
    if let Err(err) = second {
        assert!(matches!(err, SyncError::Publish(_)));
    }

    // Writes stand in every case: the publish step runs after commit.
    assert_eq!(fixture.store.repos().await.len(), 3);
}
