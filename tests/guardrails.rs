//! End-to-end checks through the public API.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use toolguard::safety::{
    HostClass, QuotaTable, RateLimiter, RateQuota, UrlAllowPolicy, ViolationKind, classify,
    default_rules, scan_command, validate_batch, validate_url,
};
use toolguard::sandbox::{AllowlistPolicy, SandboxError, sandbox_validate};
use toolguard::{Action, GuardConfig, GuardrailEngine, ManualClock, Verdict};

#[test]
fn bucket_allows_exactly_max_tokens_per_window() {
    let limiter = RateLimiter::new();
    for max in [1u64, 3, 10] {
        let key = format!("host-{max}");
        for _ in 0..max {
            assert!(limiter.can_consume(&key, max, 1_000, 5_000));
        }
        assert!(!limiter.can_consume(&key, max, 1_000, 5_999));
        assert!(limiter.can_consume(&key, max, 1_000, 6_000));
    }
}

#[test]
fn status_reads_do_not_mutate() {
    let limiter = RateLimiter::new();
    assert_eq!(limiter.get_status("nobody").tokens, 0);
    assert!(limiter.is_empty());

    limiter.can_consume("api", 5, 1_000, 0);
    let first = limiter.get_status("api");
    let second = limiter.get_status("api");
    assert_eq!(first, second);
    assert_eq!(first.tokens, 4);
    assert_eq!(limiter.len(), 1);
}

#[test]
fn host_classification() {
    assert_eq!(classify("127.0.0.1"), HostClass::Loopback);
    assert_eq!(classify("8.8.8.8"), HostClass::Public);
    assert_eq!(classify("10.1.2.3"), HostClass::Private);
    assert_eq!(classify("example.com"), HostClass::Public);
}

#[test]
fn url_validation() {
    let open = UrlAllowPolicy::default();
    let example = UrlAllowPolicy::new(["*.example.com"]);

    assert!(!validate_url("ftp://example.com", &open));
    assert!(!validate_url("http://192.168.1.5/x", &open));
    assert!(validate_url("https://api.example.com", &example));
    assert!(!validate_url("https://evil.com", &example));

    let violations = validate_batch(&["https://ok.example.com", "http://localhost:8080"], &example);
    assert_eq!(violations.len(), 1);
    assert_eq!(
        violations[0].message,
        "URL blocked by SSRF protection: http://localhost:8080"
    );
}

#[test]
fn command_scanning_is_deterministic() {
    let rules = default_rules();

    let first = scan_command("rm -rf /tmp/x", &rules);
    assert_eq!(first.len(), 1);
    assert_eq!(
        first[0].kind,
        ViolationKind::CommandThreat {
            rule_id: "recursive_delete".to_string()
        }
    );
    assert_eq!(scan_command("rm -rf /tmp/x", &rules), first);
    assert!(scan_command("echo hi", &rules).is_empty());
}

#[test]
fn sandbox_examples() {
    let policy = AllowlistPolicy::default();

    match sandbox_validate("import os", &policy) {
        Err(SandboxError::Disallowed(v)) => assert_eq!(v.token(), "os"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(sandbox_validate("print(1+2)", &policy), Ok(()));
    match sandbox_validate("eval('1')", &policy) {
        Err(SandboxError::Disallowed(v)) => assert_eq!(v.token(), "eval"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn batch_with_private_and_rate_limited_urls_blocks_with_both() {
    let clock = Arc::new(ManualClock::new(0));
    let config = GuardConfig {
        quotas: QuotaTable::new(RateQuota::new(1, 60_000)),
        ..GuardConfig::default()
    };
    let engine = GuardrailEngine::new(&config).with_clock(clock);

    let warm_up = Action::NetworkBatch(vec!["https://api.example.com/a".to_string()]);
    assert_eq!(engine.evaluate(&warm_up).verdict, Verdict::Allow);

    let batch = Action::NetworkBatch(vec![
        "http://10.0.0.5".to_string(),
        "https://api.example.com/b".to_string(),
    ]);
    let decision = engine.evaluate(&batch);

    assert_eq!(decision.verdict, Verdict::Block);
    let kinds: Vec<_> = decision.violations.iter().map(|v| v.kind.clone()).collect();
    assert_eq!(kinds, vec![ViolationKind::Ssrf, ViolationKind::RateLimit]);
    assert_ne!(decision.violations[0].message, decision.violations[1].message);
}

#[test]
fn concurrent_callers_never_exceed_quota() {
    let limiter = Arc::new(RateLimiter::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let limiter = limiter.clone();
            std::thread::spawn(move || {
                (0..50)
                    .filter(|_| limiter.can_consume("shared", 100, 60_000, 0))
                    .count()
            })
        })
        .collect();

    let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(granted, 100);
}
