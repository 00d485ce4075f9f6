//! The load-balanced dispatcher: picks an endpoint, runs the call, and
//! applies the retry policy of the call shape.
//!
//! | shape              | on failure                                         |
//! |--------------------|----------------------------------------------------|
//! | [`invoke_method`]  | retry after the error delay; with a zero delay, recognised errors are returned |
//! | [`invoke_client`]  | returned as-is, never retried                      |
//! | [`invoke_contract`]| retry after the error delay, whatever the error    |
//!
//! Retries are unbounded unless [`InvokeOptions::max_attempts`] is set, so a
//! call against a persistently failing upstream can wait forever.
//!
//! [`invoke_method`]: Dispatcher::invoke_method
//! [`invoke_client`]: Dispatcher::invoke_client
//! [`invoke_contract`]: Dispatcher::invoke_contract

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::config::DispatcherConfig;
use crate::endpoint::{ContractInterface, EndpointHandle, PreparedCall};
use crate::error::TransportError;
use crate::policy::{RateState, RateTracker, RetryPolicy};
use crate::scheduler::Scheduler;

/// Per-call overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvokeOptions {
    /// Poll interval while waiting for admission. `None` or zero falls back to
    /// the dispatcher default.
    pub retry_interval: Option<Duration>,
    /// Give up after this many attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl InvokeOptions {
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(interval);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }
}

/// Round-robin, rate-window aware dispatcher over a fixed endpoint pool.
pub struct Dispatcher<C, K> {
    endpoints: Vec<EndpointHandle<C, K>>,
    scheduler: Scheduler,
    poll_interval: Duration,
    error_delay: Duration,
}

impl<C, K> Dispatcher<C, K>
where
    C: Clone + Send + Sync,
    K: Clone + Send + Sync,
{
    /// Build a dispatcher using the system clock.
    pub fn new(
        endpoints: Vec<EndpointHandle<C, K>>,
        config: DispatcherConfig,
    ) -> Result<Self, TransportError> {
        Self::with_clock(endpoints, config, Arc::new(SystemClock))
    }

    /// Build a dispatcher reading window times from `clock`.
    pub fn with_clock(
        endpoints: Vec<EndpointHandle<C, K>>,
        config: DispatcherConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TransportError> {
        config.validate()?;
        if endpoints.is_empty() {
            return Err(TransportError::Config("endpoint pool is empty".into()));
        }

        let rates = RateTracker::new(
            config.effective_window(),
            endpoints.len(),
            config.initial_services_stats.as_deref(),
            clock.now_millis(),
        );
        let scheduler = Scheduler::new(
            endpoints.len(),
            config.initial_service_index,
            rates,
            clock,
        );

        tracing::info!(
            endpoints = endpoints.len(),
            cursor = scheduler.cursor(),
            "dispatcher ready"
        );

        Ok(Self {
            endpoints,
            scheduler,
            poll_interval: config.rate_limit_poll_interval(),
            error_delay: config.error_retry_delay(),
        })
    }

    /// Index of the endpoint the next call will be offered to.
    pub fn current_cursor(&self) -> usize {
        self.scheduler.cursor()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoint_ids(&self) -> Vec<&str> {
        self.endpoints.iter().map(|e| e.id.as_str()).collect()
    }

    /// Current counters of every endpoint, in pool order. Suitable as
    /// `initial_services_stats` for a later dispatcher over the same pool.
    pub fn stats_snapshot(&self) -> Vec<RateState> {
        self.scheduler.snapshot()
    }

    /// Call `method_name` on the contract registered as `contract_name`.
    ///
    /// Resolves to `Ok(None)` when the contract has no such method. Arguments
    /// the method rejects are returned as an error straight away. Failed
    /// calls are retried on the next admissible endpoint after the configured
    /// error delay; when that delay is zero, recognised errors are returned
    /// instead.
    pub async fn invoke_method(
        &self,
        contract_name: &str,
        method_name: &str,
        method_args: Option<&[Value]>,
        call_args: Option<&Value>,
        opts: InvokeOptions,
    ) -> Result<Option<Value>, TransportError>
    where
        K: ContractInterface,
    {
        let policy = RetryPolicy::new(self.error_delay, opts.max_attempts);
        let poll = self.poll_interval_for(&opts);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let endpoint = self.acquire(poll).await;
            let contract = endpoint.contract(contract_name).ok_or_else(|| {
                TransportError::UnknownContract {
                    name: contract_name.to_string(),
                }
            })?;

            let Some(call) = contract.method(method_name, method_args.unwrap_or(&[]))? else {
                return Ok(None);
            };

            let err = match call.execute(call_args).await {
                Ok(value) => return Ok(Some(value)),
                Err(err) => err,
            };

            if policy.is_disabled() && err.is_recognized() {
                return Err(err);
            }
            let Some(delay) = policy.next_delay(attempt) else {
                return Err(err);
            };
            tracing::debug!(
                attempt,
                endpoint = %endpoint.id,
                contract = contract_name,
                method = method_name,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "method call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Run `callback` against the raw client of the next admissible endpoint.
    ///
    /// The callback's result is returned unchanged; failures are not retried.
    pub async fn invoke_client<F, Fut, T, E>(
        &self,
        callback: F,
        opts: InvokeOptions,
    ) -> Result<T, E>
    where
        F: FnOnce(C) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let endpoint = self.acquire(self.poll_interval_for(&opts)).await;
        callback(endpoint.client.clone()).await
    }

    /// Run `callback` against the contract registered as `contract_name`.
    ///
    /// Any failure is retried after the configured error delay, on whichever
    /// endpoint the rotation offers next.
    pub async fn invoke_contract<F, Fut, T, E>(
        &self,
        contract_name: &str,
        mut callback: F,
        opts: InvokeOptions,
    ) -> Result<T, E>
    where
        F: FnMut(K) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TransportError>,
    {
        let policy = RetryPolicy::new(self.error_delay, opts.max_attempts);
        let poll = self.poll_interval_for(&opts);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let endpoint = self.acquire(poll).await;
            let Some(contract) = endpoint.contract(contract_name) else {
                return Err(E::from(TransportError::UnknownContract {
                    name: contract_name.to_string(),
                }));
            };

            let err = match callback(contract.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let Some(delay) = policy.next_delay(attempt) else {
                return Err(err);
            };
            tracing::debug!(
                attempt,
                endpoint = %endpoint.id,
                contract = contract_name,
                delay_ms = delay.as_millis() as u64,
                "contract callback failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn acquire(&self, poll: Duration) -> &EndpointHandle<C, K> {
        let index = self.scheduler.acquire(poll).await;
        &self.endpoints[index]
    }

    fn poll_interval_for(&self, opts: &InvokeOptions) -> Duration {
        opts.retry_interval
            .filter(|d| !d.is_zero())
            .unwrap_or(self.poll_interval)
    }
}

impl<C, K> std::fmt::Debug for Dispatcher<C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("endpoints", &self.endpoints.iter().map(|e| &e.id).collect::<Vec<_>>())
            .field("scheduler", &self.scheduler)
            .field("poll_interval", &self.poll_interval)
            .field("error_delay", &self.error_delay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    const T0: u64 = 1_700_000_000_000;

    /// Contract stub exposing `balanceOf` (echoes its first argument) and
    /// `flaky` (fails `failures` times, then returns the attempt count).
    #[derive(Clone, Default)]
    struct StubContract {
        calls: Arc<AtomicU32>,
        failures: u32,
        opaque: bool,
    }

    struct StubCall {
        contract: StubContract,
        method: &'static str,
        arg: Value,
    }

    impl ContractInterface for StubContract {
        type Call = StubCall;

        fn method(&self, name: &str, args: &[Value]) -> Result<Option<StubCall>, TransportError> {
            let method = match name {
                "balanceOf" => "balanceOf",
                "flaky" => "flaky",
                "strict" if args.is_empty() => {
                    return Err(TransportError::Abi("strict takes one argument".into()))
                }
                _ => return Ok(None),
            };
            Ok(Some(StubCall {
                contract: self.clone(),
                method,
                arg: args.first().cloned().unwrap_or(Value::Null),
            }))
        }
    }

    #[async_trait]
    impl PreparedCall for StubCall {
        async fn execute(self, call_args: Option<&Value>) -> Result<Value, TransportError> {
            let n = self.contract.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.method {
                "balanceOf" => Ok(serde_json::json!({
                    "arg": self.arg,
                    "from": call_args.and_then(|c| c.get("from")).cloned(),
                })),
                _ if n <= self.contract.failures => Err(if self.contract.opaque {
                    TransportError::Opaque("bad gateway".into())
                } else {
                    TransportError::Http("connection reset".into())
                }),
                _ => Ok(Value::from(n)),
            }
        }
    }

    fn pool(n: usize, contract: StubContract) -> Vec<EndpointHandle<usize, StubContract>> {
        (0..n)
            .map(|i| {
                EndpointHandle::new(format!("https://node-{i}.example"), i)
                    .with_contract("token", contract.clone())
            })
            .collect()
    }

    fn dispatcher(
        n: usize,
        contract: StubContract,
        config: DispatcherConfig,
    ) -> Dispatcher<usize, StubContract> {
        Dispatcher::with_clock(pool(n, contract), config, Arc::new(ManualClock::new(T0))).unwrap()
    }

    #[test]
    fn empty_pool_is_rejected() {
        let err = Dispatcher::<usize, StubContract>::new(vec![], DispatcherConfig::default())
            .unwrap_err();
        assert!(matches!(err, TransportError::Config(_)));
    }

    #[tokio::test]
    async fn method_call_passes_args_through() {
        let d = dispatcher(2, StubContract::default(), DispatcherConfig::default());
        let out = d
            .invoke_method(
                "token",
                "balanceOf",
                Some(&[Value::from("0xabc")]),
                Some(&serde_json::json!({"from": "0x0"})),
                InvokeOptions::default(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out["arg"], "0xabc");
        assert_eq!(out["from"], "0x0");
    }

    #[tokio::test]
    async fn unknown_method_resolves_to_none() {
        let contract = StubContract::default();
        let d = dispatcher(1, contract.clone(), DispatcherConfig::default());
        let out = d
            .invoke_method("token", "doesNotExist", None, None, InvokeOptions::default())
            .await
            .unwrap();
        assert!(out.is_none());
        assert_eq!(contract.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_arguments_are_returned_without_retry() {
        let contract = StubContract::default();
        let d = dispatcher(2, contract.clone(), DispatcherConfig::default());
        let err = d
            .invoke_method("token", "strict", None, None, InvokeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Abi(_)));
        assert_eq!(d.current_cursor(), 1);
    }

    #[tokio::test]
    async fn unknown_contract_is_an_error() {
        let d = dispatcher(1, StubContract::default(), DispatcherConfig::default());
        let err = d
            .invoke_method("vault", "balanceOf", None, None, InvokeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::UnknownContract { name } if name == "vault"));
    }

    #[tokio::test(start_paused = true)]
    async fn method_failures_retry_with_fixed_delay() {
        let contract = StubContract { failures: 2, ..Default::default() };
        let d = dispatcher(3, contract.clone(), DispatcherConfig::default());
        let start = Instant::now();
        let out = d
            .invoke_method("token", "flaky", None, None, InvokeOptions::default())
            .await
            .unwrap();
        assert_eq!(out, Some(Value::from(3)));
        assert_eq!(start.elapsed().as_millis() / 100, 20);
        // each attempt takes the next endpoint
        assert_eq!(d.current_cursor(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_surfaces_recognised_errors() {
        let contract = StubContract { failures: 5, ..Default::default() };
        let config = DispatcherConfig::default().with_retry_on_error_delay(Duration::ZERO);
        let d = dispatcher(2, contract.clone(), config);
        let err = d
            .invoke_method("token", "flaky", None, None, InvokeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Http(_)));
        assert_eq!(contract.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_still_retries_opaque_errors() {
        let contract = StubContract { failures: 3, opaque: true, ..Default::default() };
        let config = DispatcherConfig::default().with_retry_on_error_delay(Duration::ZERO);
        let d = dispatcher(2, contract.clone(), config);
        let out = d
            .invoke_method("token", "flaky", None, None, InvokeOptions::default())
            .await
            .unwrap();
        assert_eq!(out, Some(Value::from(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn max_attempts_bounds_method_retries() {
        let contract = StubContract { failures: 10, ..Default::default() };
        let d = dispatcher(2, contract.clone(), DispatcherConfig::default());
        let err = d
            .invoke_method(
                "token",
                "flaky",
                None,
                None,
                InvokeOptions::default().with_max_attempts(3),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Http(_)));
        assert_eq!(contract.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_callback_failure_is_not_retried() {
        let d = dispatcher(2, StubContract::default(), DispatcherConfig::default());
        let calls = AtomicU32::new(0);
        let result: Result<(), TransportError> = d
            .invoke_client(
                |_client| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(TransportError::Http("boom".into())) }
                },
                InvokeOptions::default(),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn client_callback_sees_round_robin_clients() {
        let config = DispatcherConfig::default().with_initial_service_index(2);
        let d = dispatcher(3, StubContract::default(), config);
        let mut seen = Vec::new();
        for _ in 0..4 {
            let id = d
                .invoke_client(|c| async move { Ok::<_, TransportError>(c) }, InvokeOptions::default())
                .await
                .unwrap();
            seen.push(id);
        }
        assert_eq!(seen, vec![2, 0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn contract_callback_retries_any_error() {
        let d = dispatcher(2, StubContract::default(), DispatcherConfig::default());
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let out: Result<u32, TransportError> = d
            .invoke_contract(
                "token",
                |_contract| {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if n < 3 {
                            Err(TransportError::Rpc(crate::error::JsonRpcError {
                                code: 3,
                                message: "execution reverted".into(),
                                data: None,
                            }))
                        } else {
                            Ok(n)
                        }
                    }
                },
                InvokeOptions::default(),
            )
            .await;
        assert_eq!(out.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed().as_millis() / 100, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_contract_callback_still_retries_recognised_errors() {
        let config = DispatcherConfig::default().with_retry_on_error_delay(Duration::ZERO);
        let d = dispatcher(2, StubContract::default(), config);
        let calls = AtomicU32::new(0);
        let out: Result<u32, TransportError> = d
            .invoke_contract(
                "token",
                |_contract| {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if n < 3 {
                            Err(TransportError::Http("connection reset".into()))
                        } else {
                            Ok(n)
                        }
                    }
                },
                InvokeOptions::default(),
            )
            .await;
        assert_eq!(out.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // the same error from a named method is surfaced on the first attempt
        let contract = StubContract { failures: 1, ..Default::default() };
        let config = DispatcherConfig::default().with_retry_on_error_delay(Duration::ZERO);
        let d = dispatcher(2, contract.clone(), config);
        let err = d
            .invoke_method("token", "flaky", None, None, InvokeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Http(_)));
        assert_eq!(contract.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn contract_callback_unknown_contract() {
        let d = dispatcher(1, StubContract::default(), DispatcherConfig::default());
        let out: Result<(), TransportError> = d
            .invoke_contract("vault", |_c| async { Ok(()) }, InvokeOptions::default())
            .await;
        assert!(matches!(out, Err(TransportError::UnknownContract { .. })));
    }

    #[tokio::test]
    async fn snapshot_counts_admissions() {
        let d = dispatcher(2, StubContract::default(), DispatcherConfig::default());
        for _ in 0..3 {
            d.invoke_client(|_| async { Ok::<_, TransportError>(()) }, InvokeOptions::default())
                .await
                .unwrap();
        }
        let snap = d.stats_snapshot();
        assert_eq!(snap[0].access_count, 2);
        assert_eq!(snap[1].access_count, 1);
        assert_eq!(snap[0].window_start_millis, T0);
    }
}
