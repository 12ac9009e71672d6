//! Access-control gate: network allow/deny rules plus a per-caller
//! sliding-window request budget.
//!
//! Decision order is fixed. A whitelisted caller is always admitted, even
//! when it also matches a deny rule or has exhausted its budget. An identity
//! that is not a valid IP address is refused as if blacklisted.

pub mod audit;
pub mod rules;
pub mod window;

use crate::config::GateConfig;
use crate::error::{GateDenial, RuleParseError};
use audit::{AuditOutcome, AuditRecord, AuditSink};
use dashmap::DashMap;
use rules::RuleSet;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use window::RateWindow;

/// Outcome of a gate check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    DenyBlacklisted { reason: String },
    DenyRateLimited { count: usize, limit: usize, window_secs: u64 },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }

    /// Convert into the error taxonomy used by the pipeline
    pub fn into_result(self) -> Result<(), GateDenial> {
        match self {
            GateDecision::Allow => Ok(()),
            GateDecision::DenyBlacklisted { reason } => Err(GateDenial::Blacklisted(reason)),
            GateDecision::DenyRateLimited {
                count,
                limit,
                window_secs,
            } => Err(GateDenial::RateLimited {
                count,
                limit,
                window_secs,
            }),
        }
    }
}

/// Request budget per caller
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub requests: usize,
    pub window: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

/// Snapshot of gate state for the stats endpoint
#[derive(Debug, Clone, Serialize)]
pub struct GateStats {
    pub whitelisted_networks: usize,
    pub blacklisted_networks: usize,
    pub active_identities: usize,
    pub tracked_hits: usize,
    pub rate_limit_requests: usize,
    pub rate_limit_window_seconds: u64,
}

pub struct AccessGate {
    whitelist: RuleSet,
    blacklist: RuleSet,
    limit: RateLimit,
    idle_ttl: Duration,
    /// Per-identity windows; the map entry lock serializes check-and-update
    windows: DashMap<IpAddr, RateWindow>,
    audit_log: Arc<dyn AuditSink>,
}

impl AccessGate {
    pub fn new(
        whitelist: RuleSet,
        blacklist: RuleSet,
        limit: RateLimit,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            whitelist,
            blacklist,
            limit,
            idle_ttl: Duration::from_secs(600),
            windows: DashMap::new(),
            audit_log: audit,
        }
    }

    /// Build a gate from configuration, failing on any invalid CIDR
    pub fn from_config(
        config: &GateConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, RuleParseError> {
        let whitelist = RuleSet::parse(&config.whitelist)?;
        let blacklist = RuleSet::parse(&config.blacklist)?;
        let limit = RateLimit {
            requests: config.rate_limit.requests,
            window: Duration::from_secs(config.rate_limit.window_seconds),
        };

        info!(
            whitelisted = whitelist.len(),
            blacklisted = blacklist.len(),
            rate_limit = limit.requests,
            window_secs = limit.window.as_secs(),
            "Access gate configured"
        );

        Ok(Self::new(whitelist, blacklist, limit, audit)
            .with_idle_ttl(Duration::from_secs(config.idle_ttl_seconds)))
    }

    /// Set how long an idle identity keeps its window before `sweep` drops it
    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = ttl;
        self
    }

    /// Decide whether `identity` may submit a scoring request now
    pub fn decide(&self, identity: &str) -> GateDecision {
        self.decide_at(identity, Instant::now())
    }

    /// Same as [`decide`](Self::decide) with an explicit clock reading
    pub fn decide_at(&self, identity: &str, now: Instant) -> GateDecision {
        let ip = match parse_identity(identity) {
            Some(ip) => ip,
            None => {
                warn!(identity = %identity, "Invalid IP address format");
                let decision = GateDecision::DenyBlacklisted {
                    reason: format!("invalid identity '{}'", identity),
                };
                self.audit(identity, AuditOutcome::Blocked, "Invalid IP address format");
                return decision;
            }
        };

        if self.whitelist.matches(&ip) {
            debug!(identity = %identity, "Whitelisted caller admitted");
            self.audit(identity, AuditOutcome::Allowed, "whitelisted");
            return GateDecision::Allow;
        }

        if self.blacklist.matches(&ip) {
            warn!(identity = %identity, "Blocked request: IP is blacklisted");
            self.audit(identity, AuditOutcome::Blocked, "IP is blacklisted");
            return GateDecision::DenyBlacklisted {
                reason: "IP is blacklisted".to_string(),
            };
        }

        let count = {
            let mut window = self
                .windows
                .entry(ip)
                .or_insert_with(|| RateWindow::new(now));
            window.record(now, self.limit.window, self.limit.requests + 1)
        };

        if count > self.limit.requests {
            warn!(
                identity = %identity,
                count = count,
                limit = self.limit.requests,
                "Rate limit exceeded"
            );
            self.audit(
                identity,
                AuditOutcome::Blocked,
                format!("rate limit exceeded ({} requests)", count),
            );
            GateDecision::DenyRateLimited {
                count,
                limit: self.limit.requests,
                window_secs: self.limit.window.as_secs(),
            }
        } else {
            self.audit(identity, AuditOutcome::Allowed, "");
            GateDecision::Allow
        }
    }

    /// Admit a long-lived subscriber. Network rules apply, the request budget does not.
    pub fn admit_subscriber(&self, identity: &str, channel: &str) -> GateDecision {
        let decision = match parse_identity(identity) {
            None => GateDecision::DenyBlacklisted {
                reason: format!("invalid identity '{}'", identity),
            },
            Some(ip) if !self.whitelist.matches(&ip) && self.blacklist.matches(&ip) => {
                GateDecision::DenyBlacklisted {
                    reason: "IP is blacklisted".to_string(),
                }
            }
            Some(_) => GateDecision::Allow,
        };

        match &decision {
            GateDecision::Allow => self.audit(
                identity,
                AuditOutcome::Allowed,
                format!("subscriber {} connected", channel),
            ),
            _ => {
                warn!(identity = %identity, channel = %channel, "Blocked subscriber");
                self.audit(
                    identity,
                    AuditOutcome::Blocked,
                    format!("subscriber {} refused", channel),
                );
            }
        }
        decision
    }

    /// Append a free-form audit entry (disconnects, transport errors)
    pub fn audit(&self, identity: &str, outcome: AuditOutcome, detail: impl Into<String>) {
        let record = AuditRecord::new(identity, outcome, detail);
        if let Err(e) = self.audit_log.record(&record) {
            warn!(identity = %identity, error = %e, "Failed to write audit record");
        }
    }

    /// Drop windows idle for longer than the configured TTL
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        let ttl = self.idle_ttl;
        self.windows.retain(|_, window| window.idle_for(now) <= ttl);
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(removed = removed, "Evicted idle rate windows");
        }
        removed
    }

    pub fn active_identities(&self) -> usize {
        self.windows.len()
    }

    /// Instants held across all rate windows
    pub fn tracked_hits(&self) -> usize {
        self.windows.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            whitelisted_networks: self.whitelist.len(),
            blacklisted_networks: self.blacklist.len(),
            active_identities: self.windows.len(),
            tracked_hits: self.tracked_hits(),
            rate_limit_requests: self.limit.requests,
            rate_limit_window_seconds: self.limit.window.as_secs(),
        }
    }
}

fn parse_identity(identity: &str) -> Option<IpAddr> {
    identity
        .trim()
        .parse::<IpAddr>()
        .ok()
        .map(|ip| ip.to_canonical())
}

/// Periodically evicts idle rate windows
pub struct WindowSweeper {
    gate: Arc<AccessGate>,
    interval_secs: u64,
}

impl WindowSweeper {
    pub fn new(gate: Arc<AccessGate>, interval_secs: u64) -> Self {
        Self {
            gate,
            interval_secs: interval_secs.max(1),
        }
    }

    /// Start the periodic sweep task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        loop {
            interval.tick().await;
            self.gate.sweep();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::audit::MemoryAuditLog;
    use super::*;

    fn gate_with(
        whitelist: &[&str],
        blacklist: &[&str],
        requests: usize,
        window_secs: u64,
    ) -> (AccessGate, Arc<MemoryAuditLog>) {
        let log = Arc::new(MemoryAuditLog::new());
        let gate = AccessGate::new(
            RuleSet::parse(whitelist).unwrap(),
            RuleSet::parse(blacklist).unwrap(),
            RateLimit {
                requests,
                window: Duration::from_secs(window_secs),
            },
            log.clone(),
        );
        (gate, log)
    }

    #[test]
    fn test_budget_allows_then_denies_then_resets() {
        let (gate, _) = gate_with(&[], &[], 3, 60);
        let start = Instant::now();

        for n in 0..3 {
            let at = start + Duration::from_secs(n);
            assert_eq!(gate.decide_at("203.0.113.7", at), GateDecision::Allow);
        }
        assert!(matches!(
            gate.decide_at("203.0.113.7", start + Duration::from_secs(4)),
            GateDecision::DenyRateLimited { count: 4, limit: 3, window_secs: 60 }
        ));

        // other identities have their own budget
        assert!(gate.decide_at("203.0.113.8", start).is_allowed());

        // a full window later every earlier hit has expired
        let later = start + Duration::from_secs(65);
        assert_eq!(gate.decide_at("203.0.113.7", later), GateDecision::Allow);
    }

    #[test]
    fn test_flooding_caller_holds_bounded_state() {
        let (gate, _) = gate_with(&[], &[], 3, 60);
        let now = Instant::now();

        for _ in 0..100_000 {
            gate.decide_at("198.51.100.9", now);
        }
        assert_eq!(gate.active_identities(), 1);
        assert!(gate.tracked_hits() <= 4);

        // still denied while the flood is inside the window
        assert!(matches!(
            gate.decide_at("198.51.100.9", now + Duration::from_secs(30)),
            GateDecision::DenyRateLimited { limit: 3, .. }
        ));
        // and recovers a full window after the last hit
        assert_eq!(
            gate.decide_at("198.51.100.9", now + Duration::from_secs(91)),
            GateDecision::Allow
        );
    }

    #[test]
    fn test_whitelist_overrides_blacklist_and_budget() {
        let (gate, _) = gate_with(&["10.0.0.0/8"], &["10.1.0.0/16"], 1, 60);
        let now = Instant::now();

        for _ in 0..10 {
            assert_eq!(gate.decide_at("10.1.2.3", now), GateDecision::Allow);
        }
        assert_eq!(gate.active_identities(), 0);
    }

    #[test]
    fn test_blacklisted_identity_denied() {
        let (gate, log) = gate_with(&[], &["198.51.100.0/24"], 100, 60);

        let decision = gate.decide("198.51.100.9");
        assert!(matches!(decision, GateDecision::DenyBlacklisted { .. }));
        assert!(matches!(
            decision.into_result(),
            Err(GateDenial::Blacklisted(_))
        ));

        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, AuditOutcome::Blocked);
        assert_eq!(records[0].detail, "IP is blacklisted");
    }

    #[test]
    fn test_malformed_identity_fails_closed() {
        let (gate, log) = gate_with(&["0.0.0.0/0"], &[], 100, 60);

        let decision = gate.decide("not-an-address");
        assert!(matches!(decision, GateDecision::DenyBlacklisted { .. }));
        assert_eq!(log.records()[0].detail, "Invalid IP address format");
    }

    #[test]
    fn test_every_decision_is_audited() {
        let (gate, log) = gate_with(&[], &[], 1, 60);
        let now = Instant::now();

        gate.decide_at("192.0.2.1", now);
        gate.decide_at("192.0.2.1", now);

        let records = log.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].outcome, AuditOutcome::Allowed);
        assert_eq!(records[1].outcome, AuditOutcome::Blocked);
        assert_eq!(records[1].identity, "192.0.2.1");
    }

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn record(&self, _record: &AuditRecord) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("disk full"))
        }
    }

    #[test]
    fn test_audit_failure_does_not_change_decision() {
        let gate = AccessGate::new(
            RuleSet::default(),
            RuleSet::default(),
            RateLimit::default(),
            Arc::new(FailingSink),
        );
        assert_eq!(gate.decide("192.0.2.10"), GateDecision::Allow);
    }

    #[test]
    fn test_concurrent_requests_share_one_budget() {
        let (gate, _) = gate_with(&[], &[], 50, 60);
        let gate = Arc::new(gate);
        let now = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .filter(|_| gate.decide_at("192.0.2.50", now).is_allowed())
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
    }

    #[test]
    fn test_subscriber_admission_ignores_budget() {
        let (gate, log) = gate_with(&[], &["198.51.100.0/24"], 1, 60);

        assert!(gate.admit_subscriber("192.0.2.1", "/ws/all").is_allowed());
        assert!(gate.admit_subscriber("192.0.2.1", "/ws/all").is_allowed());
        assert!(!gate
            .admit_subscriber("198.51.100.3", "/ws/fraud-only")
            .is_allowed());
        assert_eq!(gate.active_identities(), 0);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_sweep_evicts_idle_windows() {
        let (gate, _) = gate_with(&[], &[], 100, 60);
        let gate = gate.with_idle_ttl(Duration::from_secs(300));
        let start = Instant::now();

        gate.decide_at("192.0.2.1", start);
        gate.decide_at("192.0.2.2", start + Duration::from_secs(200));
        assert_eq!(gate.active_identities(), 2);

        let removed = gate.sweep_at(start + Duration::from_secs(400));
        assert_eq!(removed, 1);
        assert_eq!(gate.stats().active_identities, 1);
    }

    #[test]
    fn test_stats() {
        let (gate, _) = gate_with(&["10.0.0.0/8"], &["1.2.3.4", "5.6.7.0/24"], 100, 60);
        let stats = gate.stats();
        assert_eq!(stats.whitelisted_networks, 1);
        assert_eq!(stats.blacklisted_networks, 2);
        assert_eq!(stats.rate_limit_requests, 100);
        assert_eq!(stats.rate_limit_window_seconds, 60);
    }
}
