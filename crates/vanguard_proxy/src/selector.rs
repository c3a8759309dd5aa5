use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::NoAvailableUpstream;
use crate::upstream::Upstream;

/// Walks the ring `start, start+1, ..., start+n-1 (mod n)` and returns the
/// first Upstream whose `is_available()` is true. Stateless; shared by
/// RoundRobin, Random, and (as a fallback) WeightedRoundRobin.
fn availability_scan(pool: &[Arc<Upstream>], start: usize) -> Option<Arc<Upstream>> {
    let n = pool.len();
    if n == 0 {
        return None;
    }
    for i in 0..n {
        let idx = (start + i) % n;
        if pool[idx].is_available() {
            return Some(pool[idx].clone());
        }
    }
    None
}

struct WeightedSlot {
    upstream: Arc<Upstream>,
    weight: u32,
}

struct WrrState {
    slot: usize,
    /// Remaining emissions owed to `slot` before advancing. Pre-loaded
    /// with the first slot's weight at construction, so the first call
    /// serves slot 0 without a special-cased "first call" branch.
    credit: u32,
}

/// A per-virtual-host load-balancing policy bound to a fixed, ordered pool
/// of Upstreams. Closed set of five variants, known at compile time.
pub enum Selector {
    RoundRobin {
        pool: Vec<Arc<Upstream>>,
        cursor: AtomicUsize,
    },
    Random {
        pool: Vec<Arc<Upstream>>,
        rng: Mutex<StdRng>,
    },
    LeastConnections {
        pool: Vec<Arc<Upstream>>,
    },
    WeightedRoundRobin {
        slots: Vec<WeightedSlot>,
        state: Mutex<WrrState>,
    },
}

impl Selector {
    pub fn round_robin(pool: Vec<Arc<Upstream>>) -> Self {
        Selector::RoundRobin {
            pool,
            cursor: AtomicUsize::new(0),
        }
    }

    /// `seed`: `None` uses an implementation-default non-deterministic
    /// source; `Some(seed)` is the constructor-supplied seeding callback
    /// the spec calls for, useful for deterministic tests.
    pub fn random(pool: Vec<Arc<Upstream>>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Selector::Random {
            pool,
            rng: Mutex::new(rng),
        }
    }

    pub fn least_connections(pool: Vec<Arc<Upstream>>) -> Self {
        Selector::LeastConnections { pool }
    }

    /// `weights` must be the same length as `pool`, with every entry
    /// `>= 1` (short lists are padded with 1 by the Registry before this
    /// is called; a zero total is rejected there too).
    pub fn weighted_round_robin(pool: Vec<Arc<Upstream>>, weights: Vec<u32>) -> Self {
        assert_eq!(pool.len(), weights.len());
        let first_weight = weights.first().copied().unwrap_or(0);
        let slots = pool
            .into_iter()
            .zip(weights)
            .map(|(upstream, weight)| WeightedSlot { upstream, weight })
            .collect();
        Selector::WeightedRoundRobin {
            slots,
            state: Mutex::new(WrrState {
                slot: 0,
                credit: first_weight,
            }),
        }
    }

    pub fn pool_len(&self) -> usize {
        match self {
            Selector::RoundRobin { pool, .. } => pool.len(),
            Selector::Random { pool, .. } => pool.len(),
            Selector::LeastConnections { pool } => pool.len(),
            Selector::WeightedRoundRobin { slots, .. } => slots.len(),
        }
    }

    /// Returns the next available Upstream, or `NoAvailableUpstream` if the
    /// pool is empty or every candidate is currently unavailable.
    pub fn next(&self, host: &str) -> Result<Arc<Upstream>, NoAvailableUpstream> {
        match self {
            Selector::RoundRobin { pool, cursor } => {
                let c = cursor.fetch_add(1, Ordering::Relaxed);
                if pool.is_empty() {
                    return Err(NoAvailableUpstream { host: host.to_string() });
                }
                let m = c % pool.len();
                availability_scan(pool, m).ok_or_else(|| NoAvailableUpstream {
                    host: host.to_string(),
                })
            }
            Selector::Random { pool, rng } => {
                if pool.is_empty() {
                    return Err(NoAvailableUpstream { host: host.to_string() });
                }
                let m = rng.lock().expect("rng lock poisoned").random_range(0..pool.len());
                availability_scan(pool, m).ok_or_else(|| NoAvailableUpstream {
                    host: host.to_string(),
                })
            }
            Selector::LeastConnections { pool } => {
                let mut best: Option<(usize, u64)> = None;
                for (idx, upstream) in pool.iter().enumerate() {
                    if !upstream.is_available() {
                        continue;
                    }
                    let load = upstream.load();
                    match best {
                        Some((_, best_load)) if load >= best_load => {}
                        _ => best = Some((idx, load)),
                    }
                }
                best.map(|(idx, _)| pool[idx].clone())
                    .ok_or_else(|| NoAvailableUpstream { host: host.to_string() })
            }
            Selector::WeightedRoundRobin { slots, state } => {
                if slots.is_empty() {
                    return Err(NoAvailableUpstream { host: host.to_string() });
                }
                let n = slots.len();
                let mut guard = state.lock().expect("wrr lock poisoned");

                if guard.credit == 0 {
                    guard.slot = (guard.slot + 1) % n;
                    guard.credit = slots[guard.slot].weight;
                }

                let preferred = guard.slot;
                if slots[preferred].upstream.is_available() {
                    guard.credit -= 1;
                    return Ok(slots[preferred].upstream.clone());
                }

                // Preferred slot unavailable: scan forward without
                // touching its credit, so it's still owed next cycle.
                for i in 1..n {
                    let idx = (preferred + i) % n;
                    if slots[idx].upstream.is_available() {
                        return Ok(slots[idx].upstream.clone());
                    }
                }
                Err(NoAvailableUpstream { host: host.to_string() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vanguard_config::{ClientConfig, HealthCheckConfig};

    fn disabled_health() -> HealthCheckConfig {
        HealthCheckConfig {
            enabled: false,
            ..Default::default()
        }
    }

    fn upstream(url: &str) -> Arc<Upstream> {
        let cancel = tokio_util::sync::CancellationToken::new();
        Upstream::new(url, &ClientConfig::default(), &disabled_health(), &cancel).unwrap()
    }

    #[tokio::test]
    async fn round_robin_serial_coverage_s5() {
        let a = upstream("http://a.internal");
        let b = upstream("http://b.internal");
        let c = upstream("http://c.internal");
        let sel = Selector::round_robin(vec![a.clone(), b.clone(), c.clone()]);

        let seq: Vec<_> = (0..4)
            .map(|_| sel.next("h").unwrap().origin().host_str().unwrap().to_string())
            .collect();
        assert_eq!(seq, vec!["a.internal", "b.internal", "c.internal", "a.internal"]);
    }

    #[tokio::test]
    async fn least_connections_picks_minimum_s1() {
        let a = upstream("http://a.internal");
        let b = upstream("http://b.internal");
        let c = upstream("http://c.internal");
        a.set_load(3);
        b.set_load(1);
        c.set_load(2);
        let sel = Selector::least_connections(vec![a, b, c]);
        let picked = sel.next("h").unwrap();
        assert_eq!(picked.origin().host_str().unwrap(), "b.internal");
    }

    #[tokio::test]
    async fn least_connections_skips_unavailable_s2() {
        let a = upstream("http://a.internal");
        let b = upstream("http://b.internal");
        let c = upstream("http://c.internal");
        a.set_available(false);
        b.set_available(false);
        let sel = Selector::least_connections(vec![a, b, c]);
        let picked = sel.next("h").unwrap();
        assert_eq!(picked.origin().host_str().unwrap(), "c.internal");
    }

    #[tokio::test]
    async fn least_connections_ties_break_on_index() {
        let a = upstream("http://a.internal");
        let b = upstream("http://b.internal");
        a.set_load(5);
        b.set_load(5);
        let sel = Selector::least_connections(vec![a, b]);
        let picked = sel.next("h").unwrap();
        assert_eq!(picked.origin().host_str().unwrap(), "a.internal");
    }

    #[tokio::test]
    async fn weighted_round_robin_two_to_one_s3() {
        let a = upstream("http://a.internal");
        let b = upstream("http://b.internal");
        let sel = Selector::weighted_round_robin(vec![a, b], vec![2, 1]);

        let seq: Vec<_> = (0..6)
            .map(|_| sel.next("h").unwrap().origin().host_str().unwrap().to_string())
            .collect();
        assert_eq!(
            seq,
            vec!["a.internal", "a.internal", "b.internal", "a.internal", "a.internal", "b.internal"]
        );
    }

    #[tokio::test]
    async fn weighted_round_robin_three_two_one_s4() {
        let a = upstream("http://a.internal");
        let b = upstream("http://b.internal");
        let c = upstream("http://c.internal");
        let sel = Selector::weighted_round_robin(vec![a, b, c], vec![3, 2, 1]);

        let seq: Vec<_> = (0..12)
            .map(|_| sel.next("h").unwrap().origin().host_str().unwrap().to_string())
            .collect();
        assert_eq!(
            seq,
            vec![
                "a.internal", "a.internal", "a.internal", "b.internal", "b.internal", "c.internal",
                "a.internal", "a.internal", "a.internal", "b.internal", "b.internal", "c.internal",
            ]
        );
    }

    #[tokio::test]
    async fn weighted_round_robin_skips_unavailable_slot_without_spending_credit() {
        let a = upstream("http://a.internal");
        let b = upstream("http://b.internal");
        a.set_available(false);
        let sel = Selector::weighted_round_robin(vec![a.clone(), b.clone()], vec![2, 1]);

        // slot 0 (a) is unavailable for the whole first cycle: every call
        // falls through to b, and a's credit is untouched.
        for _ in 0..3 {
            let picked = sel.next("h").unwrap();
            assert_eq!(picked.origin().host_str().unwrap(), "b.internal");
        }

        a.set_available(true);
        let picked = sel.next("h").unwrap();
        assert_eq!(picked.origin().host_str().unwrap(), "a.internal");
    }

    #[tokio::test]
    async fn empty_pool_fails_at_call_time() {
        let sel = Selector::round_robin(Vec::new());
        assert!(sel.next("h").is_err());
    }

    #[tokio::test]
    async fn all_unavailable_fails() {
        let a = upstream("http://a.internal");
        let b = upstream("http://b.internal");
        a.set_available(false);
        b.set_available(false);
        let sel = Selector::round_robin(vec![a, b]);
        assert!(sel.next("h").is_err());
    }
}
