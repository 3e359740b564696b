//! External reality checks
//!
//! Best-effort verification that an email domain resolves or a website
//! answers. Every probe runs under its own timeout and its outcome is cached
//! per target for the lifetime of the checker, so a batch full of addresses
//! at one domain costs one lookup.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cdp_core::normalize::email_domain;
use cdp_core::{CandidateContact, ContactType, ValidationConfig};

/// Maximum cached probe outcomes
const CACHE_CAPACITY: u64 = 10_000;

/// Why a probe did not confirm its target
#[derive(Error, Debug)]
pub enum RealityError {
    #[error("{target} does not resolve: {reason}")]
    Unresolvable { target: String, reason: String },

    #[error("{target} is unreachable: {reason}")]
    Unreachable { target: String, reason: String },

    #[error("{target} answered with HTTP {status}")]
    BadStatus { target: String, status: u16 },
}

/// Result of one probe as reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Failed,
    TimedOut,
}

/// Outcome of one reality check for one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealityOutcome {
    pub check: String,
    pub target: String,
    pub status: CheckStatus,
    #[serde(default)]
    pub detail: Option<String>,
}

impl RealityOutcome {
    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Passed
    }
}

// ============================================================================
// Check Trait
// ============================================================================

/// One kind of external verification
#[async_trait]
pub trait RealityCheck: Send + Sync {
    /// Check name used in findings and cache keys
    fn name(&self) -> &str;

    /// What to probe for a candidate; `None` if the check does not apply
    fn target(&self, candidate: &CandidateContact) -> Option<String>;

    /// Upper bound for one probe
    fn timeout(&self) -> Duration;

    /// Probe the target
    async fn probe(&self, target: &str) -> Result<(), RealityError>;
}

// ============================================================================
// DNS Check
// ============================================================================

/// Email domain resolvability through the runtime's resolver
///
/// Only address records are visible here; a domain that resolves is taken
/// as able to receive mail.
pub struct DnsResolvabilityCheck {
    timeout: Duration,
}

impl DnsResolvabilityCheck {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl RealityCheck for DnsResolvabilityCheck {
    fn name(&self) -> &str {
        "dns"
    }

    fn target(&self, candidate: &CandidateContact) -> Option<String> {
        if candidate.contact_type != ContactType::Email {
            return None;
        }
        email_domain(&candidate.normalized_value).map(str::to_string)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn probe(&self, target: &str) -> Result<(), RealityError> {
        let unresolvable = |reason: String| RealityError::Unresolvable {
            target: target.to_string(),
            reason,
        };

        let mut addrs = tokio::net::lookup_host((target, 25))
            .await
            .map_err(|e| unresolvable(e.to_string()))?;

        match addrs.next() {
            Some(_) => Ok(()),
            None => Err(unresolvable("no addresses".to_string())),
        }
    }
}

// ============================================================================
// HTTP Check
// ============================================================================

/// Website reachability through a HEAD request
pub struct HttpReachabilityCheck {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpReachabilityCheck {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(concat!("cdp/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl RealityCheck for HttpReachabilityCheck {
    fn name(&self) -> &str {
        "http"
    }

    /// Site root of the candidate; one probe per host
    fn target(&self, candidate: &CandidateContact) -> Option<String> {
        if candidate.contact_type != ContactType::Website {
            return None;
        }
        let value = &candidate.normalized_value;
        let full = if value.contains("://") {
            value.clone()
        } else {
            format!("http://{value}")
        };

        let url = url::Url::parse(&full).ok()?;
        let host = url.host_str()?;
        Some(format!("{}://{}/", url.scheme(), host))
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn probe(&self, target: &str) -> Result<(), RealityError> {
        let response = self
            .client
            .head(target)
            .send()
            .await
            .map_err(|e| RealityError::Unreachable {
                target: target.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        // Some servers refuse HEAD but are clearly up
        if status.is_success()
            || status.is_redirection()
            || status == reqwest::StatusCode::METHOD_NOT_ALLOWED
        {
            Ok(())
        } else {
            Err(RealityError::BadStatus {
                target: target.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

// ============================================================================
// Checker
// ============================================================================

/// Runs the configured checks with timeouts and a per-target cache
#[derive(Clone)]
pub struct RealityChecker {
    checks: Vec<Arc<dyn RealityCheck>>,
    cache: Cache<String, RealityOutcome>,
}

impl RealityChecker {
    /// Create a checker without any checks
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            cache: Cache::builder().max_capacity(CACHE_CAPACITY).build(),
        }
    }

    /// Build the checks enabled in a validation configuration
    pub fn from_config(config: &ValidationConfig) -> Self {
        let mut checker = Self::new();

        if config.dns_check_enabled {
            checker.register(DnsResolvabilityCheck::new(Duration::from_millis(
                config.dns_timeout_ms,
            )));
        }

        if config.http_check_enabled {
            match HttpReachabilityCheck::new(Duration::from_millis(config.http_timeout_ms)) {
                Ok(check) => checker.register(check),
                Err(e) => tracing::warn!("HTTP reachability check disabled: {}", e),
            }
        }

        checker
    }

    /// Register a check
    pub fn register<C: RealityCheck + 'static>(&mut self, check: C) {
        self.checks.push(Arc::new(check));
    }

    pub fn with_check<C: RealityCheck + 'static>(mut self, check: C) -> Self {
        self.register(check);
        self
    }

    /// Names of registered checks
    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run every applicable check for a candidate
    pub async fn run(&self, candidate: &CandidateContact) -> Vec<RealityOutcome> {
        let mut outcomes = Vec::new();

        for check in &self.checks {
            let Some(target) = check.target(candidate) else {
                continue;
            };
            outcomes.push(self.run_check(check.as_ref(), target).await);
        }

        outcomes
    }

    async fn run_check(&self, check: &dyn RealityCheck, target: String) -> RealityOutcome {
        let key = format!("{}:{}", check.name(), target);
        if let Some(cached) = self.cache.get(&key).await {
            return cached;
        }

        let timeout = check.timeout();
        let (status, detail) = match tokio::time::timeout(timeout, check.probe(&target)).await {
            Ok(Ok(())) => (CheckStatus::Passed, None),
            Ok(Err(e)) => (CheckStatus::Failed, Some(e.to_string())),
            Err(_) => (
                CheckStatus::TimedOut,
                Some(format!("no answer within {} ms", timeout.as_millis())),
            ),
        };

        let outcome = RealityOutcome {
            check: check.name().to_string(),
            target,
            status,
            detail,
        };
        self.cache.insert(key, outcome.clone()).await;
        outcome
    }
}

impl Default for RealityChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_core::{ExtractionMethod, Normalizer};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Check answering from a script, counting probes
    struct FakeCheck {
        delay: Duration,
        timeout: Duration,
        result: fn(&str) -> Result<(), RealityError>,
        probes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RealityCheck for FakeCheck {
        fn name(&self) -> &str {
            "fake"
        }

        fn target(&self, candidate: &CandidateContact) -> Option<String> {
            email_domain(&candidate.normalized_value).map(str::to_string)
        }

        fn timeout(&self) -> Duration {
            self.timeout
        }

        async fn probe(&self, target: &str) -> Result<(), RealityError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            (self.result)(target)
        }
    }

    fn email(raw: &str) -> CandidateContact {
        let mut c = CandidateContact::new(ContactType::Email, raw, ExtractionMethod::HtmlLink, 0.9, "l-1");
        Normalizer::default().apply(&mut c);
        c
    }

    fn ok(_: &str) -> Result<(), RealityError> {
        Ok(())
    }

    #[tokio::test]
    async fn test_outcomes_are_cached_per_target() {
        let probes = Arc::new(AtomicUsize::new(0));
        let checker = RealityChecker::new().with_check(FakeCheck {
            delay: Duration::ZERO,
            timeout: Duration::from_secs(1),
            result: ok,
            probes: probes.clone(),
        });

        let a = checker.run(&email("anna@example.de")).await;
        let b = checker.run(&email("max@example.de")).await;
        let c = checker.run(&email("max@example.org")).await;

        assert!(a[0].passed() && b[0].passed() && c[0].passed());
        assert_eq!(probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_probe_times_out() {
        let checker = RealityChecker::new().with_check(FakeCheck {
            delay: Duration::from_millis(500),
            timeout: Duration::from_millis(20),
            result: ok,
            probes: Arc::new(AtomicUsize::new(0)),
        });

        let outcomes = checker.run(&email("anna@slow.example")).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, CheckStatus::TimedOut);
        assert_eq!(outcomes[0].target, "slow.example");
    }

    #[tokio::test]
    async fn test_failed_probe_carries_reason() {
        let checker = RealityChecker::new().with_check(FakeCheck {
            delay: Duration::ZERO,
            timeout: Duration::from_secs(1),
            result: |target| {
                Err(RealityError::Unresolvable {
                    target: target.to_string(),
                    reason: "NXDOMAIN".to_string(),
                })
            },
            probes: Arc::new(AtomicUsize::new(0)),
        });

        let outcomes = checker.run(&email("anna@gone.example")).await;
        assert_eq!(outcomes[0].status, CheckStatus::Failed);
        assert!(outcomes[0]
            .detail
            .as_deref()
            .is_some_and(|d| d.contains("NXDOMAIN")));
    }

    #[test]
    fn test_targets() {
        let dns = DnsResolvabilityCheck::new(Duration::from_secs(1));
        assert_eq!(dns.target(&email("Info@Example.DE")), Some("example.de".to_string()));

        let mut site = CandidateContact::new(
            ContactType::Website,
            "https://www.example.de/expose/42",
            ExtractionMethod::FreeText,
            0.6,
            "l-1",
        );
        Normalizer::default().apply(&mut site);
        assert_eq!(dns.target(&site), None);

        let http = HttpReachabilityCheck::new(Duration::from_secs(1)).unwrap();
        assert_eq!(http.target(&site), Some("https://www.example.de/".to_string()));
        assert_eq!(http.target(&email("a@example.de")), None);
    }

    #[test]
    fn test_from_config() {
        let config = ValidationConfig {
            http_check_enabled: false,
            ..Default::default()
        };
        let checker = RealityChecker::from_config(&config);
        assert_eq!(checker.check_names(), vec!["dns"]);
    }

    #[tokio::test]
    async fn test_localhost_resolves() {
        let dns = DnsResolvabilityCheck::new(Duration::from_secs(2));
        assert!(dns.probe("localhost").await.is_ok());
    }
}
