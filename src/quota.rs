//! Daily AI usage allowance.
//!
//! The counter is consulted only after the scope gate admits a message.
//! When the counter itself fails, [`QuotaFailurePolicy`] decides whether
//! the request proceeds.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaUsage {
    pub used: u32,
    pub limit: u32,
}

impl QuotaUsage {
    pub fn exhausted(&self) -> bool {
        self.used > self.limit
    }
}

#[async_trait]
pub trait UsageQuota: Send + Sync {
    /// Count one request for `user_id` and report usage including it.
    async fn try_consume(&self, user_id: &str) -> Result<QuotaUsage>;
}

/// Per-user counters keyed by UTC day, held in process memory.
pub struct InMemoryDailyQuota {
    limit: u32,
    counts: Mutex<HashMap<(String, NaiveDate), u32>>,
}

impl InMemoryDailyQuota {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            counts: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl UsageQuota for InMemoryDailyQuota {
    async fn try_consume(&self, user_id: &str) -> Result<QuotaUsage> {
        let today = Utc::now().date_naive();
        let mut counts = self
            .counts
            .lock()
            .map_err(|_| anyhow::anyhow!("quota counter lock poisoned"))?;
        counts.retain(|(_, day), _| *day == today);
        let used = counts.entry((user_id.to_string(), today)).or_insert(0);
        if *used <= self.limit {
            *used += 1;
        }
        Ok(QuotaUsage {
            used: *used,
            limit: self.limit,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaFailurePolicy {
    AllowOnInfrastructureFailure,
    DenyOnInfrastructureFailure,
}

impl QuotaFailurePolicy {
    pub fn from_config(value: &str) -> Result<Self> {
        match value {
            "allow" => Ok(Self::AllowOnInfrastructureFailure),
            "deny" => Ok(Self::DenyOnInfrastructureFailure),
            other => bail!("unknown quota failure policy: {}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed(QuotaUsage),
    Exhausted(QuotaUsage),
    /// The counter failed and the policy let the request through.
    AllowedOnFailure,
    /// The counter failed and the policy refused the request.
    DeniedOnFailure,
}

impl QuotaDecision {
    pub fn permits(&self) -> bool {
        matches!(self, Self::Allowed(_) | Self::AllowedOnFailure)
    }
}

pub struct QuotaGate {
    quota: Arc<dyn UsageQuota>,
    policy: QuotaFailurePolicy,
}

impl QuotaGate {
    pub fn new(quota: Arc<dyn UsageQuota>, policy: QuotaFailurePolicy) -> Self {
        Self { quota, policy }
    }

    pub async fn check(&self, user_id: &str) -> QuotaDecision {
        match self.quota.try_consume(user_id).await {
            Ok(usage) if usage.exhausted() => {
                tracing::info!(user_id, used = usage.used, limit = usage.limit, "daily AI quota exhausted");
                QuotaDecision::Exhausted(usage)
            }
            Ok(usage) => QuotaDecision::Allowed(usage),
            Err(e) => match self.policy {
                QuotaFailurePolicy::AllowOnInfrastructureFailure => {
                    tracing::warn!(user_id, error = %e, "quota check failed, allowing request");
                    QuotaDecision::AllowedOnFailure
                }
                QuotaFailurePolicy::DenyOnInfrastructureFailure => {
                    tracing::warn!(user_id, error = %e, "quota check failed, denying request");
                    QuotaDecision::DeniedOnFailure
                }
            },
        }
    }
}
