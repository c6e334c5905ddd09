//! Local store engine: an in-memory key-value map with per-key optional
//! absolute expiration.
//!
//! The engine knows nothing about replication. All mutation reaches it
//! through the state machine adapter's apply path; everything else only
//! reads. Both maps live behind a single read-write lock so a snapshot can
//! never observe a half-applied mutation.

use crate::config::StoreConfig;
use crate::core::snapshot::StoreSnapshot;
use slog::{debug, info, Logger};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{mpsc, watch};

struct Maps {
    mp: HashMap<String, String>,
    expirations: HashMap<String, SystemTime>,
}

/// In-memory key-value store with TTL support and a bounded expiration sweep.
pub struct Store {
    maps: RwLock<Maps>,
    clean_interval: Duration,
    max_clean_duration: Duration,
    logger: Logger,
}

impl Store {
    /// Create a new engine from a validated configuration.
    pub fn new(logger: Logger, config: StoreConfig) -> Result<Self, crate::config::ConfigError> {
        let config = config.normalized()?;
        let logger = logger.new(slog::o!("component" => "core.Store"));

        debug!(logger, "creating store";
            "clean_interval" => ?config.clean_interval,
            "max_clean_duration" => ?config.max_clean_duration,
            "initial_capacity" => config.initial_capacity,
        );

        Ok(Self {
            maps: RwLock::new(Maps {
                mp: HashMap::with_capacity(config.initial_capacity),
                expirations: HashMap::with_capacity(config.initial_capacity),
            }),
            clean_interval: config.clean_interval,
            max_clean_duration: config.max_clean_duration,
            logger,
        })
    }

    /// Look up a key.
    ///
    /// Returns `None` both when the key is absent and when it is logically
    /// expired but not yet swept: a past expiration makes the key invisible
    /// regardless of sweep timing.
    pub fn get(&self, key: &str) -> Option<String> {
        let maps = self.maps.read().unwrap_or_else(|e| e.into_inner());

        let value = maps.mp.get(key)?;
        if let Some(expiration) = maps.expirations.get(key) {
            if *expiration <= SystemTime::now() {
                return None;
            }
        }

        Some(value.clone())
    }

    /// Upsert a key.
    ///
    /// A non-zero `ttl` sets the expiration to `now + ttl`; a zero `ttl`
    /// clears any prior expiration, making the key permanent.
    pub fn put(&self, key: String, value: String, ttl: Duration) {
        let mut maps = self.maps.write().unwrap_or_else(|e| e.into_inner());

        if ttl > Duration::ZERO {
            maps.expirations.insert(key.clone(), SystemTime::now() + ttl);
        } else {
            maps.expirations.remove(&key);
        }
        maps.mp.insert(key, value);
    }

    /// Remove a key and its expiration. Idempotent: deleting an absent key
    /// is not an error.
    pub fn delete(&self, key: &str) {
        let mut maps = self.maps.write().unwrap_or_else(|e| e.into_inner());

        maps.mp.remove(key);
        maps.expirations.remove(key);
    }

    /// Start producing expired keys on a channel.
    ///
    /// A background task wakes every `clean_interval` and performs one
    /// bounded sweep: it scans the expiration map under the read lock and
    /// aborts the scan once `max_clean_duration` has elapsed, deferring the
    /// rest to the next tick. The task stops when the shutdown signal fires
    /// or the returned receiver is dropped.
    ///
    /// The sweep never takes the write lock, so a reported key may already
    /// have been deleted or refreshed by the time the consumer acts on it;
    /// consumers must treat re-deletes and stale deletes as harmless no-ops.
    pub fn expired_keys(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(64);
        let store = Arc::clone(self);

        info!(store.logger, "start producing expired keys");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(store.clean_interval);
            // The first tick of a tokio interval fires immediately; the
            // engine's contract is one sweep per elapsed interval.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!(store.logger, "expired keys producer cancelled");
                        return;
                    }
                    _ = ticker.tick() => {
                        for key in store.sweep() {
                            if tx.send(key).await.is_err() {
                                info!(store.logger, "expired keys consumer gone");
                                return;
                            }
                        }
                    }
                }
            }
        });

        rx
    }

    /// One bounded pass over the expiration map.
    ///
    /// Holds only the read lock; the guard cannot cross an await point, so
    /// expired keys are collected here and sent after release.
    fn sweep(&self) -> Vec<String> {
        self.sweep_until(Instant::now() + self.max_clean_duration)
    }

    fn sweep_until(&self, deadline: Instant) -> Vec<String> {
        let maps = self.maps.read().unwrap_or_else(|e| e.into_inner());
        let now = SystemTime::now();

        debug!(self.logger, "sweep started"; "budget" => ?self.max_clean_duration);

        let mut expired = Vec::new();
        for (key, expiration) in &maps.expirations {
            if Instant::now() >= deadline {
                debug!(self.logger, "sweep budget exhausted"; "collected" => expired.len());
                break;
            }
            if *expiration <= now {
                expired.push(key.clone());
            }
        }

        debug!(self.logger, "sweep finished"; "collected" => expired.len());

        expired
    }

    /// Deep copy of both maps at a point in time.
    pub fn snapshot(&self) -> StoreSnapshot {
        let maps = self.maps.read().unwrap_or_else(|e| e.into_inner());

        StoreSnapshot {
            expirations: maps.expirations.clone(),
            mp: maps.mp.clone(),
        }
    }

    /// Replace both maps in their entirety. Used only for restore from a
    /// snapshot, never for incremental writes.
    pub fn load(&self, snapshot: StoreSnapshot) {
        let mut maps = self.maps.write().unwrap_or_else(|e| e.into_inner());

        maps.mp = snapshot.mp;
        maps.expirations = snapshot.expirations;
    }
}
