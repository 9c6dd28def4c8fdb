// src/core/coordinator/multi.rs

//! The multi-key coordinator: the same per-key state machine, with every
//! Memcached interaction batched. One pass issues at most one `get_multi`,
//! one `gets_multi`, one `cas_multi`, one `add_multi`, and one `set_multi`.

use super::{CacheCoordinator, FetchOptions};
use crate::core::HerdGuardError;
use crate::core::client::{CasEntry, MemcacheClient, SetEntry};
use crate::core::envelope::Envelope;
use crate::core::expiration::normalize_expiration;
use crate::core::wait::{MultiWaitFn, Wait};
use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use tracing::debug;

impl<C: MemcacheClient> CacheCoordinator<C> {
    /// Batched [`get_or_compute`](Self::get_or_compute) over `(key,
    /// expiration)` pairs, with configured defaults.
    ///
    /// Keys this caller failed to resolve (lock held elsewhere through the
    /// retry) are absent from the returned map.
    pub async fn get_or_compute_many<F, Fut>(
        &self,
        keys: &[(Bytes, f64)],
        compute: F,
    ) -> Result<HashMap<Bytes, C::Value>, HerdGuardError>
    where
        F: Fn(Vec<Bytes>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<Vec<C::Value>, HerdGuardError>> + Send,
    {
        self.get_or_compute_many_with(keys, compute, FetchOptions::default())
            .await
    }

    /// [`get_or_compute_many`](Self::get_or_compute_many) with per-call
    /// options.
    ///
    /// The compute callback is invoked at most once per pass, with every key
    /// this caller locked, and must return values positionally matched to
    /// that key list. Because one invocation covers all locked keys, its
    /// duration can exceed the single-key `compute_time`; callers size
    /// `compute_time` to the cumulative cost. Batches are never split.
    pub async fn get_or_compute_many_with<F, Fut>(
        &self,
        keys: &[(Bytes, f64)],
        compute: F,
        options: FetchOptions<MultiWaitFn<C::Value>>,
    ) -> Result<HashMap<Bytes, C::Value>, HerdGuardError>
    where
        F: Fn(Vec<Bytes>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<Vec<C::Value>, HerdGuardError>> + Send,
    {
        let compute_time = self.resolve_compute_time(options.compute_time);
        for (_, expiration) in keys {
            Self::validate_timing(*expiration, compute_time)?;
        }

        // Expirations are copied out of the caller's slice and normalized
        // exactly once; retries reuse the same values.
        let now = self.clock.now();
        let mut pending = Vec::with_capacity(keys.len());
        let mut expirations = HashMap::with_capacity(keys.len());
        for (key, expiration) in keys {
            if expirations
                .insert(key.clone(), normalize_expiration(*expiration, now))
                .is_some()
            {
                return Err(HerdGuardError::InvalidArgument(format!(
                    "duplicate key in batch: {key:?}"
                )));
            }
            pending.push(key.clone());
        }

        let mut output = HashMap::with_capacity(keys.len());
        let mut retries_left = self.config.waiter_retries;
        loop {
            if pending.is_empty() {
                return Ok(output);
            }
            let waiting = self
                .multi_pass(&pending, &expirations, compute_time, &compute, &mut output)
                .await?;
            if waiting.is_empty() {
                return Ok(output);
            }
            match &options.wait {
                Wait::Callback(callback) => {
                    let resolved = callback(waiting).await?;
                    output.extend(resolved);
                    return Ok(output);
                }
                Wait::Sleep(seconds) => {
                    if retries_left == 0 {
                        debug!(
                            unresolved = waiting.len(),
                            "locks still held after retry, giving up"
                        );
                        return Ok(output);
                    }
                    retries_left -= 1;
                    let pause = self.resolve_wait_seconds(*seconds, compute_time);
                    self.clock.sleep(pause).await;
                    pending = waiting;
                }
            }
        }
    }

    /// One phased pass over `pending`. Resolved values land in `output`; the
    /// returned keys are the ones still waiting on someone else's lock.
    async fn multi_pass<F, Fut>(
        &self,
        pending: &[Bytes],
        expirations: &HashMap<Bytes, f64>,
        compute_time: f64,
        compute: &F,
        output: &mut HashMap<Bytes, C::Value>,
    ) -> Result<Vec<Bytes>, HerdGuardError>
    where
        F: Fn(Vec<Bytes>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<Vec<C::Value>, HerdGuardError>> + Send,
    {
        let mut wait_keys = Vec::new();
        let mut cas_keys = Vec::new();
        let mut add_keys = Vec::new();
        let mut compute_keys = Vec::new();

        // Phase 1: classify every key from a single batched read.
        let found = self.client.get_multi(pending).await?;
        let now = self.clock.now();
        for key in pending {
            match found.get(key) {
                None => add_keys.push(key.clone()),
                Some(envelope) if !envelope.is_expired(now) => {
                    if let Some(value) = &envelope.value {
                        output.insert(key.clone(), value.clone());
                    } else {
                        wait_keys.push(key.clone());
                    }
                }
                Some(envelope) if envelope.processing => wait_keys.push(key.clone()),
                Some(_) => cas_keys.push(key.clone()),
            }
        }
        debug!(
            hits = output.len(),
            cas = cas_keys.len(),
            add = add_keys.len(),
            wait = wait_keys.len(),
            "classified batch"
        );

        // Phase 2: re-read the stale candidates with tokens and stage the
        // upgrades. Runs before the add phase so an evicted candidate can
        // downgrade into it.
        if !cas_keys.is_empty() {
            let refreshed = self.client.gets_multi(&cas_keys).await?;
            let now = self.clock.now();
            let mut staged = Vec::new();
            for key in cas_keys {
                match refreshed.get(&key) {
                    None => add_keys.push(key),
                    Some((_, envelope)) if envelope.processing => wait_keys.push(key),
                    Some((_, envelope))
                        if !envelope.is_expired(now) && envelope.has_value() =>
                    {
                        // Someone else already produced a fresh value.
                        if let Some(value) = &envelope.value {
                            output.insert(key, value.clone());
                        }
                    }
                    Some((token, _)) => staged.push(CasEntry {
                        key,
                        token: *token,
                        envelope: Envelope::placeholder(),
                        ttl: Self::placeholder_ttl(compute_time),
                    }),
                }
            }
            if !staged.is_empty() {
                let results = self.client.cas_multi(&staged).await?;
                for entry in staged {
                    if results.get(&entry.key).copied().unwrap_or(false) {
                        compute_keys.push(entry.key);
                    } else {
                        wait_keys.push(entry.key);
                    }
                }
            }
        }

        // Phase 3: claim the absent keys.
        if !add_keys.is_empty() {
            let entries: Vec<(Bytes, Envelope<C::Value>)> = add_keys
                .into_iter()
                .map(|key| (key, Envelope::placeholder()))
                .collect();
            let results = self
                .client
                .add_multi(&entries, Self::placeholder_ttl(compute_time))
                .await?;
            for (key, _) in entries {
                if results.get(&key).copied().unwrap_or(false) {
                    compute_keys.push(key);
                } else {
                    wait_keys.push(key);
                }
            }
        }

        // Phase 4: one compute invocation for every locked key, then one
        // batched write. Runs before the waiter so a retrying waiter sees
        // the fresh envelopes.
        if !compute_keys.is_empty() {
            let values = compute(compute_keys.clone()).await?;
            if values.len() != compute_keys.len() {
                return Err(HerdGuardError::InvalidArgument(format!(
                    "compute callback returned {} values for {} keys",
                    values.len(),
                    compute_keys.len()
                )));
            }
            let now = self.clock.now();
            let mut entries = Vec::with_capacity(compute_keys.len());
            for (key, value) in compute_keys.iter().zip(&values) {
                let expiration = expirations.get(key).copied().ok_or_else(|| {
                    HerdGuardError::Internal(format!("no expiration recorded for {key:?}"))
                })?;
                entries.push(SetEntry {
                    key: key.clone(),
                    envelope: Envelope::fresh(now + expiration, value.clone()),
                    ttl: Self::value_ttl(expiration, compute_time),
                });
            }
            self.client.set_multi(&entries).await?;
            for (key, value) in compute_keys.into_iter().zip(values) {
                output.insert(key, value);
            }
        }

        Ok(wait_keys)
    }
}
