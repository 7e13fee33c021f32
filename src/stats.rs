//! Status rollups computed from the accounts of a prefix.

use serde::Serialize;
use utoipa::ToSchema;

use crate::db::Account;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct BanSplit {
    pub total: usize,
    pub active: usize,
    pub banned: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DerivedStats {
    pub total: usize,
    /// Derived accounts still being checked (not yet stable) and not banned.
    pub active: usize,
    /// Derived accounts still being checked and banned.
    pub banned: usize,
    pub stable: BanSplit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct PrefixStats {
    /// Number of original accounts.
    pub total: usize,
    pub in_progress: usize,
    pub banned: usize,
    pub processed: usize,
    pub with_errors: usize,
    pub derived: DerivedStats,
}

impl PrefixStats {
    pub fn from_accounts<'a, I>(accounts: I) -> Self
    where
        I: IntoIterator<Item = &'a Account>,
    {
        let mut stats = PrefixStats::default();

        for account in accounts {
            if account.is_derived() {
                stats.derived.total += 1;
                let split_banned = account.is_banned();
                if account.stable {
                    stats.derived.stable.total += 1;
                    if split_banned {
                        stats.derived.stable.banned += 1;
                    } else {
                        stats.derived.stable.active += 1;
                    }
                } else if split_banned {
                    stats.derived.banned += 1;
                } else {
                    stats.derived.active += 1;
                }
                continue;
            }

            stats.total += 1;
            let banned = account.is_banned();
            if banned {
                stats.banned += 1;
            }
            if account.worked_out {
                stats.processed += 1;
            }
            if !banned && account.error.is_some() {
                stats.with_errors += 1;
            }
            if !account.worked_out && !banned && account.error.is_none() {
                stats.in_progress += 1;
            }
        }

        stats
    }

    /// Percentage of original accounts that yielded a stable, unbanned
    /// derived account, rounded to a whole number.
    pub fn stable_rate(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        (self.derived.stable.active as f64 / self.total as f64 * 100.0).round() as u32
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct GlobalStats {
    pub total_initial_accounts: usize,
    pub total_stable_active: usize,
    /// Percent, rounded to two decimals.
    pub success_rate: f64,
}

impl GlobalStats {
    pub fn from_prefix_stats<'a, I>(stats: I) -> Self
    where
        I: IntoIterator<Item = &'a PrefixStats>,
    {
        let (total_initial_accounts, total_stable_active) = stats
            .into_iter()
            .fold((0, 0), |(initial, stable), s| {
                (initial + s.total, stable + s.derived.stable.active)
            });

        let success_rate = if total_initial_accounts > 0 {
            let rate = total_stable_active as f64 / total_initial_accounts as f64 * 100.0;
            (rate * 100.0).round() / 100.0
        } else {
            0.0
        };

        GlobalStats {
            total_initial_accounts,
            total_stable_active,
            success_rate,
        }
    }
}

/// Split a prefix's accounts into originals and derived ones, keeping order.
pub fn split_accounts(accounts: Vec<Account>) -> (Vec<Account>, Vec<Account>) {
    accounts.into_iter().partition(|a| !a.is_derived())
}
