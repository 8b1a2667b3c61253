use dashmap::DashMap;
use std::time::Duration;

/// Per-domain liveness, shared by the DNS and fetch stages. Failure counts
/// use atomic updates through the map's per-entry locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Unknown,
    Alive,
    Dead,
}

#[derive(Debug)]
struct DomainState {
    failures: u32,
    resolution: Resolution,
}

pub struct DomainTable {
    states: DashMap<String, DomainState>,
    fail_threshold: u32,
}

impl DomainTable {
    pub fn new(fail_threshold: u32) -> Self {
        Self {
            states: DashMap::new(),
            fail_threshold: fail_threshold.max(1),
        }
    }

    pub fn is_dead(&self, domain: &str) -> bool {
        self.states
            .get(domain)
            .map(|s| s.resolution == Resolution::Dead)
            .unwrap_or(false)
    }

    pub fn mark_alive(&self, domain: &str) {
        let mut entry = self.states.entry(domain.to_string()).or_insert(DomainState {
            failures: 0,
            resolution: Resolution::Unknown,
        });
        if entry.resolution == Resolution::Unknown {
            entry.resolution = Resolution::Alive;
        }
    }

    /// Count one failure; past the threshold the domain is dead and every
    /// remaining URL under it is skipped. Returns true when this call
    /// crossed the threshold.
    pub fn record_failure(&self, domain: &str) -> bool {
        let mut entry = self.states.entry(domain.to_string()).or_insert(DomainState {
            failures: 0,
            resolution: Resolution::Unknown,
        });
        entry.failures += 1;
        if entry.failures >= self.fail_threshold && entry.resolution != Resolution::Dead {
            entry.resolution = Resolution::Dead;
            return true;
        }
        false
    }

    /// Kill a domain outright; used by the two-pass probe.
    pub fn mark_dead(&self, domain: &str) {
        let mut entry = self.states.entry(domain.to_string()).or_insert(DomainState {
            failures: 0,
            resolution: Resolution::Unknown,
        });
        entry.failures = entry.failures.max(self.fail_threshold);
        entry.resolution = Resolution::Dead;
    }

    pub fn needs_resolution(&self, domain: &str) -> bool {
        self.states
            .get(domain)
            .map(|s| s.resolution == Resolution::Unknown)
            .unwrap_or(true)
    }

    pub fn dead_count(&self) -> usize {
        self.states
            .iter()
            .filter(|e| e.resolution == Resolution::Dead)
            .count()
    }

    pub fn failures(&self, domain: &str) -> u32 {
        self.states.get(domain).map(|s| s.failures).unwrap_or(0)
    }
}

/// Resolve one domain, updating the table. Repeated failures eventually
/// kill the domain via the shared counter.
pub async fn resolve_domain(table: &DomainTable, domain: &str, timeout: Duration) {
    if !table.needs_resolution(domain) {
        return;
    }

    // Port is irrelevant for resolution; lookup_host requires one.
    let lookup = tokio::net::lookup_host((domain, 443u16));
    match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(mut addrs)) => {
            if addrs.next().is_some() {
                table.mark_alive(domain);
            } else {
                table.record_failure(domain);
            }
        }
        Ok(Err(_)) | Err(_) => {
            table.record_failure(domain);
        }
    }
}
