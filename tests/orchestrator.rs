use acmehost::challenge::{Challenge, ChallengeError};
use acmehost::error::{Error, Outcome};
use acmehost::orchestrator::{CleanUpRequest, Orchestrator, PresentRequest};
use acmehost::provider::{DnsProvider, ProviderError, RecordType, RetryPolicy};
use acmehost::store::{DynStore, Host, InMemoryStore, Principal, Store, SyncStatus, Targets};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every provider call; `set_record` fails with `fail_set` when it is set.
#[derive(Default)]
struct FakeProvider {
    calls: Mutex<Vec<String>>,
    fail_set: Mutex<Option<ProviderError>>,
}

impl FakeProvider {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl DnsProvider for FakeProvider {
    async fn set_record(
        &self,
        fqdn: &str,
        record_type: RecordType,
        target: &str,
    ) -> Result<(), ProviderError> {
        self.record(format!("set {record_type} {fqdn} {target}"));
        match self.fail_set.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn remove_records(&self, fqdn: &str) -> Result<(), ProviderError> {
        self.record(format!("remove {fqdn}"));
        Ok(())
    }

    async fn extract_auth_zone(&self, _fqdn: &str) -> Result<String, ProviderError> {
        Ok("example.com.".to_string())
    }

    async fn refresh(&self, fqdn: &str) -> Result<(), ProviderError> {
        self.record(format!("refresh {fqdn}"));
        Ok(())
    }
}

/// Records challenge calls; presenting fails when `fail` is set and takes `delay` first.
#[derive(Default)]
struct FakeChallenge {
    presented: Mutex<Vec<String>>,
    cleaned: Mutex<Vec<String>>,
    fail: bool,
    delay: Option<Duration>,
}

#[async_trait::async_trait]
impl Challenge for FakeChallenge {
    async fn present(
        &self,
        domain: &str,
        _token: &str,
        _key_auth: &str,
    ) -> Result<(), ChallengeError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.presented.lock().unwrap().push(domain.to_string());
        if self.fail {
            return Err(ChallengeError::EmptyKeyAuthorization);
        }
        Ok(())
    }

    async fn clean_up(
        &self,
        domain: &str,
        _token: &str,
        _key_auth: &str,
    ) -> Result<(), ChallengeError> {
        self.cleaned.lock().unwrap().push(domain.to_string());
        Ok(())
    }
}

struct Fixture {
    store: DynStore,
    provider: Arc<FakeProvider>,
    challenge: Arc<FakeChallenge>,
    orchestrator: Orchestrator,
}

fn fixture(challenge: FakeChallenge) -> Fixture {
    let store: DynStore = Arc::new(InMemoryStore::new());
    let provider = Arc::new(FakeProvider::default());
    let challenge = Arc::new(challenge);
    let orchestrator = Orchestrator::new(store.clone(), provider.clone(), challenge.clone())
        .with_retry(RetryPolicy {
            timeout: Duration::from_secs(1),
            attempts: 2,
            backoff: Duration::from_millis(1),
        });
    Fixture {
        store,
        provider,
        challenge,
        orchestrator,
    }
}

fn principal(name: &str) -> Principal {
    Principal {
        name: name.to_string(),
        secret_hash: String::new(),
        admin: false,
    }
}

fn present_request(domain: &str, a: &str) -> PresentRequest {
    PresentRequest {
        domain: domain.to_string(),
        token: "token".to_string(),
        key_auth: "token.thumbprint".to_string(),
        targets: Targets::from_fields(a, "", ""),
    }
}

async fn seed_host(store: &DynStore, domain: &str, owner: &str, a: &str) {
    let mut tx = store.begin().await.unwrap();
    tx.upsert_host(Host {
        domain: domain.to_string(),
        owner: owner.to_string(),
        targets: Targets::from_fields(a, "", ""),
        sync: SyncStatus::default(),
    })
    .await
    .unwrap();
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn present_claims_host_and_applies_targets() {
    let f = fixture(FakeChallenge::default());
    f.orchestrator
        .present(&principal("p1"), &present_request("WWW.example.com", "192.0.2.1"))
        .await
        .unwrap();

    let host = f.store.host("www.example.com.").await.unwrap().unwrap();
    assert_eq!(host.owner, "p1");
    assert_eq!(host.targets.a.as_deref(), Some("192.0.2.1"));
    assert!(host.sync.last_attempt.is_some());
    assert_eq!(
        f.provider.calls(),
        vec![
            "set A www.example.com. 192.0.2.1".to_string(),
            "refresh www.example.com.".to_string(),
        ]
    );
    assert_eq!(
        *f.challenge.presented.lock().unwrap(),
        vec!["WWW.example.com".to_string()]
    );
}

#[tokio::test]
async fn challenge_failure_leaves_no_host() {
    let f = fixture(FakeChallenge {
        fail: true,
        ..FakeChallenge::default()
    });
    let err = f
        .orchestrator
        .present(&principal("p1"), &present_request("www.example.com", "192.0.2.1"))
        .await
        .unwrap_err();

    assert_eq!(err.outcome(), Some(Outcome::ChallengeError));
    assert!(f.store.host("www.example.com.").await.unwrap().is_none());
    assert!(f.store.hosts().await.unwrap().is_empty());
}

#[tokio::test]
async fn challenge_failure_restores_committed_targets() {
    let f = fixture(FakeChallenge {
        fail: true,
        ..FakeChallenge::default()
    });
    seed_host(&f.store, "www.example.com.", "p1", "192.0.2.1").await;

    f.orchestrator
        .present(&principal("p1"), &present_request("www.example.com", "192.0.2.2"))
        .await
        .unwrap_err();

    let host = f.store.host("www.example.com.").await.unwrap().unwrap();
    assert_eq!(host.targets.a.as_deref(), Some("192.0.2.1"));
    let calls = f.provider.calls();
    assert_eq!(calls.first().unwrap(), "set A www.example.com. 192.0.2.2");
    assert!(calls.contains(&"set A www.example.com. 192.0.2.1".to_string()));
}

#[tokio::test]
async fn foreign_host_is_refused_without_side_effects() {
    let f = fixture(FakeChallenge::default());
    seed_host(&f.store, "www.example.com.", "p1", "192.0.2.1").await;

    let err = f
        .orchestrator
        .present(&principal("p2"), &present_request("www.example.com", "192.0.2.9"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));
    assert_eq!(err.outcome(), Some(Outcome::PermissionDenied));

    let err = f
        .orchestrator
        .clean_up(
            &principal("p2"),
            &CleanUpRequest {
                domain: "www.example.com".to_string(),
                ..CleanUpRequest::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.outcome(), Some(Outcome::PermissionDenied));

    assert!(f.provider.calls().is_empty());
    assert!(f.challenge.presented.lock().unwrap().is_empty());
    assert!(f.challenge.cleaned.lock().unwrap().is_empty());
    let host = f.store.host("www.example.com.").await.unwrap().unwrap();
    assert_eq!(host.targets.a.as_deref(), Some("192.0.2.1"));
}

#[tokio::test]
async fn admin_keeps_existing_owner() {
    let f = fixture(FakeChallenge::default());
    seed_host(&f.store, "www.example.com.", "p1", "192.0.2.1").await;
    let root = Principal {
        admin: true,
        ..principal("root")
    };

    f.orchestrator
        .present(&root, &present_request("www.example.com", "192.0.2.7"))
        .await
        .unwrap();

    let host = f.store.host("www.example.com.").await.unwrap().unwrap();
    assert_eq!(host.owner, "p1");
    assert_eq!(host.targets.a.as_deref(), Some("192.0.2.7"));
}

#[tokio::test]
async fn provider_failure_skips_challenge_and_store() {
    let f = fixture(FakeChallenge::default());
    *f.provider.fail_set.lock().unwrap() = Some(ProviderError::InvalidTarget {
        record_type: RecordType::A,
        target: "192.0.2.1".to_string(),
    });

    let err = f
        .orchestrator
        .present(&principal("p1"), &present_request("www.example.com", "192.0.2.1"))
        .await
        .unwrap_err();

    assert_eq!(err.outcome(), Some(Outcome::ProviderError));
    assert!(f.store.host("www.example.com.").await.unwrap().is_none());
    assert!(f.challenge.presented.lock().unwrap().is_empty());
}

#[tokio::test]
async fn retryable_provider_failures_are_retried() {
    let f = fixture(FakeChallenge::default());
    *f.provider.fail_set.lock().unwrap() = Some(ProviderError::RateLimited);

    f.orchestrator
        .present(&principal("p1"), &present_request("www.example.com", "192.0.2.1"))
        .await
        .unwrap_err();

    let sets = f
        .provider
        .calls()
        .iter()
        .filter(|call| call.starts_with("set A"))
        .count();
    assert_eq!(sets, 2);
}

#[tokio::test]
async fn clean_up_touches_only_the_challenge() {
    let f = fixture(FakeChallenge::default());
    seed_host(&f.store, "www.example.com.", "p1", "192.0.2.1").await;
    let before = f.store.hosts().await.unwrap();

    f.orchestrator
        .clean_up(
            &principal("p1"),
            &CleanUpRequest {
                domain: "www.example.com".to_string(),
                token: "token".to_string(),
                key_auth: "token.thumbprint".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(
        *f.challenge.cleaned.lock().unwrap(),
        vec!["www.example.com".to_string()]
    );
    assert!(f.provider.calls().is_empty());
    assert_eq!(f.store.hosts().await.unwrap(), before);
}

#[tokio::test]
async fn slow_calls_exceed_the_deadline() {
    let challenge = FakeChallenge {
        delay: Some(Duration::from_secs(5)),
        ..FakeChallenge::default()
    };
    let f = fixture(challenge);
    let orchestrator = f.orchestrator.with_deadline(Duration::from_millis(100));

    let err = orchestrator
        .present(&principal("p1"), &present_request("www.example.com", "192.0.2.1"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DeadlineExceeded(_)));
    assert_eq!(err.outcome(), Some(Outcome::ProviderError));
    assert!(f.store.host("www.example.com.").await.unwrap().is_none());

    // The abandoned transaction must not block later calls.
    let mut tx = f.store.begin().await.unwrap();
    assert!(tx.host("www.example.com.").await.unwrap().is_none());
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn concurrent_claims_of_one_domain_admit_a_single_owner() {
    let challenge = FakeChallenge {
        delay: Some(Duration::from_millis(100)),
        ..FakeChallenge::default()
    };
    let f = fixture(challenge);
    let (p1, p2) = (principal("p1"), principal("p2"));
    let (req1, req2) = (
        present_request("www.example.com", "192.0.2.1"),
        present_request("www.example.com", "192.0.2.2"),
    );

    let (first, second) = tokio::join!(
        f.orchestrator.present(&p1, &req1),
        f.orchestrator.present(&p2, &req2),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    let err = results.into_iter().find_map(Result::err).unwrap();
    assert!(matches!(err, Error::PermissionDenied { .. }));
    assert_eq!(err.outcome(), Some(Outcome::PermissionDenied));

    let hosts = f.store.hosts().await.unwrap();
    assert_eq!(hosts.len(), 1);
    let expected_a = if hosts[0].owner == "p1" { "192.0.2.1" } else { "192.0.2.2" };
    assert_eq!(hosts[0].targets.a.as_deref(), Some(expected_a));
    assert_eq!(f.challenge.presented.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn presents_for_different_domains_run_concurrently() {
    let challenge = FakeChallenge {
        delay: Some(Duration::from_millis(300)),
        ..FakeChallenge::default()
    };
    let f = fixture(challenge);
    let orchestrator = f.orchestrator.with_deadline(Duration::from_millis(500));
    let (p1, p2) = (principal("p1"), principal("p2"));
    let (req1, req2) = (
        present_request("a.example.com", "192.0.2.1"),
        present_request("b.example.com", "192.0.2.2"),
    );

    let admin_write = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut tx = f.store.begin().await.unwrap();
        tx.insert_principal(principal("p3")).await.unwrap();
        tokio::time::timeout(Duration::from_millis(100), tx.commit())
            .await
            .expect("principal write waited on in-flight presents")
            .unwrap();
    };
    let (first, second, ()) = tokio::join!(
        orchestrator.present(&p1, &req1),
        orchestrator.present(&p2, &req2),
        admin_write,
    );

    first.unwrap();
    second.unwrap();
    assert_eq!(f.store.hosts().await.unwrap().len(), 2);
    assert!(f.store.principal("p3").await.unwrap().is_some());
}

#[tokio::test]
async fn wildcards_are_owned_with_their_base_name() {
    let f = fixture(FakeChallenge::default());
    f.orchestrator
        .present(&principal("p1"), &present_request("a.example.com", "192.0.2.1"))
        .await
        .unwrap();

    let err = f
        .orchestrator
        .present(&principal("p2"), &present_request("*.a.example.com", "192.0.2.66"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));
    let cleanup = CleanUpRequest {
        domain: "*.a.example.com".to_string(),
        token: "token".to_string(),
        key_auth: "token.thumbprint".to_string(),
    };
    assert!(matches!(
        f.orchestrator.clean_up(&principal("p2"), &cleanup).await,
        Err(Error::PermissionDenied { .. })
    ));
    assert!(f.challenge.cleaned.lock().unwrap().is_empty());

    f.orchestrator
        .present(&principal("p1"), &present_request("*.a.example.com", "192.0.2.2"))
        .await
        .unwrap();
    let hosts = f.store.hosts().await.unwrap();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].domain, "a.example.com.");
    assert_eq!(hosts[0].targets.a.as_deref(), Some("192.0.2.2"));

    let err = f
        .orchestrator
        .present(&principal("p2"), &present_request("_acme-challenge.b.example.com", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));
    assert!(f.store.host("_acme-challenge.b.example.com.").await.unwrap().is_none());
}
