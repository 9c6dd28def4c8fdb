// src/core/coordinator/single.rs

//! The single-key coordinator: a per-key state machine over the observed
//! envelope, with one `add`/`gets`+`cas` lock dance per pass.

use super::{CacheCoordinator, FetchOptions};
use crate::core::HerdGuardError;
use crate::core::client::MemcacheClient;
use crate::core::envelope::Envelope;
use crate::core::expiration::normalize_expiration;
use crate::core::wait::{SingleWaitFn, Wait};
use bytes::Bytes;
use std::future::Future;
use tracing::debug;

/// Outcome of one pass of the state machine.
enum PassOutcome<V> {
    Value(V),
    Wait,
}

impl<C: MemcacheClient> CacheCoordinator<C> {
    /// Returns a value for `key` that is a fresh hit, a marginally stale
    /// value, or a freshly computed one, with configured defaults for the
    /// compute-time bound and the waiter.
    ///
    /// `Ok(None)` means this caller lost the lock race and the default
    /// waiter gave up after its single retry.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: impl Into<Bytes>,
        expiration: f64,
        compute: F,
    ) -> Result<Option<C::Value>, HerdGuardError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<C::Value, HerdGuardError>> + Send,
    {
        self.get_or_compute_with(key, expiration, compute, FetchOptions::default())
            .await
    }

    /// [`get_or_compute`](Self::get_or_compute) with per-call options.
    ///
    /// `expiration` follows Memcached's convention: values above 30 days are
    /// absolute unix timestamps, anything else is relative seconds. The
    /// compute callback runs only if this caller wins the lock; its error
    /// propagates with nothing written, so the placeholder TTL alone governs
    /// recovery.
    pub async fn get_or_compute_with<F, Fut>(
        &self,
        key: impl Into<Bytes>,
        expiration: f64,
        compute: F,
        options: FetchOptions<SingleWaitFn<C::Value>>,
    ) -> Result<Option<C::Value>, HerdGuardError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<C::Value, HerdGuardError>> + Send,
    {
        let key = key.into();
        let compute_time = self.resolve_compute_time(options.compute_time);
        Self::validate_timing(expiration, compute_time)?;

        // Normalized exactly once per call; retries reuse the same value.
        let expiration = normalize_expiration(expiration, self.clock.now());

        let mut retries_left = self.config.waiter_retries;
        loop {
            match self
                .single_pass(&key, expiration, compute_time, &compute)
                .await?
            {
                PassOutcome::Value(value) => return Ok(Some(value)),
                PassOutcome::Wait => match &options.wait {
                    Wait::Callback(callback) => return callback().await,
                    Wait::Sleep(seconds) => {
                        if retries_left == 0 {
                            debug!(key = ?key, "lock still held after retry, giving up");
                            return Ok(None);
                        }
                        retries_left -= 1;
                        let pause = self.resolve_wait_seconds(*seconds, compute_time);
                        self.clock.sleep(pause).await;
                    }
                },
            }
        }
    }

    /// One full classify-and-drive pass over the key.
    async fn single_pass<F, Fut>(
        &self,
        key: &Bytes,
        expiration: f64,
        compute_time: f64,
        compute: &F,
    ) -> Result<PassOutcome<C::Value>, HerdGuardError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<C::Value, HerdGuardError>> + Send,
    {
        let Some(envelope) = self.client.get(key).await? else {
            return self.try_add(key, expiration, compute_time, compute).await;
        };
        let now = self.clock.now();

        if !envelope.is_expired(now) {
            if let Some(value) = envelope.value {
                return Ok(PassOutcome::Value(value));
            }
            // A live lock placeholder; someone else is computing.
            debug!(key = ?key, "placeholder still live, waiting");
            return Ok(PassOutcome::Wait);
        }

        if envelope.processing {
            debug!(key = ?key, "stale entry locked by another caller, waiting");
            return Ok(PassOutcome::Wait);
        }

        self.cas_upgrade(key, expiration, compute_time, compute)
            .await
    }

    /// Cold path: claim an absent key with an atomic `add` of a placeholder.
    async fn try_add<F, Fut>(
        &self,
        key: &Bytes,
        expiration: f64,
        compute_time: f64,
        compute: &F,
    ) -> Result<PassOutcome<C::Value>, HerdGuardError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<C::Value, HerdGuardError>> + Send,
    {
        let won = self
            .client
            .add(
                key,
                &Envelope::placeholder(),
                Self::placeholder_ttl(compute_time),
            )
            .await?;
        if !won {
            debug!(key = ?key, "lost the add race, waiting");
            return Ok(PassOutcome::Wait);
        }
        self.compute_and_store(key, expiration, compute_time, compute)
            .await
            .map(PassOutcome::Value)
    }

    /// Warm path: re-lock a soft-expired entry with `gets` + `cas`. The CAS
    /// token anchors the decision against the first `get`'s stale-by-race
    /// view.
    async fn cas_upgrade<F, Fut>(
        &self,
        key: &Bytes,
        expiration: f64,
        compute_time: f64,
        compute: &F,
    ) -> Result<PassOutcome<C::Value>, HerdGuardError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<C::Value, HerdGuardError>> + Send,
    {
        let Some((token, refreshed)) = self.client.gets(key).await? else {
            // Evicted between the get and the gets.
            return self.try_add(key, expiration, compute_time, compute).await;
        };

        if refreshed.processing {
            debug!(key = ?key, "entry was re-locked concurrently, waiting");
            return Ok(PassOutcome::Wait);
        }

        let won = self
            .client
            .cas(
                key,
                token,
                &Envelope::placeholder(),
                Self::placeholder_ttl(compute_time),
            )
            .await?;
        if !won {
            debug!(key = ?key, "lost the cas race, waiting");
            return Ok(PassOutcome::Wait);
        }
        self.compute_and_store(key, expiration, compute_time, compute)
            .await
            .map(PassOutcome::Value)
    }

    /// Runs the compute callback under the held lock and writes the fresh
    /// envelope.
    async fn compute_and_store<F, Fut>(
        &self,
        key: &Bytes,
        expiration: f64,
        compute_time: f64,
        compute: &F,
    ) -> Result<C::Value, HerdGuardError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<C::Value, HerdGuardError>> + Send,
    {
        let value = compute().await?;
        let now = self.clock.now();
        let envelope = Envelope::fresh(now + expiration, value.clone());
        self.client
            .set(key, &envelope, Self::value_ttl(expiration, compute_time))
            .await?;
        debug!(key = ?key, soft_expiry = envelope.soft_expiry, "stored fresh envelope");
        Ok(value)
    }
}
