// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The log request handler: ingress, the dispatch worker, and per-item
//! authorization.
//!
//! # One dispatcher, deliberately
//!
//! There is exactly one dispatch task. Raising that number buys nothing:
//! every consumer would serialize on the frozen-buffer lock anyway, client
//! acknowledgements are already decoupled from dispatch, and throughput is
//! dominated by the sink. Anyone revisiting this must also move the
//! frozen-buffer locking to wrap the whole drain loop rather than each
//! `pull`.
//!
//! # Bulk amortization
//!
//! Within a bulk, client resolution and the token check run once and are
//! reused for subsequent items, unless an item fails or the client
//! integrity sweep has run since the last validation; in either case the
//! cached handle is dropped and the client re-resolved by id.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use loghub_proto::StatusCode;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock;
use crate::config::{Configuration, Flag, LoggerFlag};
use crate::crypto::PayloadCipher;
use crate::ingest::{LogRequest, RawRequest, RequestDecoder, Session, SwappingQueue};
use crate::registry::{Client, Registry};
use crate::sink::{FormatInjector, LogSink, SinkRecord};
use crate::SERVER_LOGGER_ID;

/// Pause between drain cycles.
const CYCLE_INTERVAL: Duration = Duration::from_millis(100);

pub struct LogRequestHandler {
    registry: Arc<Registry>,
    sink: Arc<dyn LogSink>,
    decoder: RequestDecoder,
    queue: SwappingQueue<RawRequest>,
    cancel_token: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LogRequestHandler {
    pub fn new(
        registry: Arc<Registry>,
        sink: Arc<dyn LogSink>,
        cipher: Arc<dyn PayloadCipher>,
    ) -> Self {
        let decoder = RequestDecoder::new(Arc::clone(&registry), cipher);
        Self {
            registry,
            sink,
            decoder,
            queue: SwappingQueue::new(),
            cancel_token: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    /// Spawns the dispatch worker. Idempotent: a second call while the
    /// worker is alive is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut worker = match self.worker.lock() {
            Ok(worker) => worker,
            Err(poisoned) => poisoned.into_inner(),
        };
        if worker.as_ref().map(|w| !w.is_finished()).unwrap_or(false) {
            return;
        }
        let handler = Arc::clone(self);
        *worker = Some(tokio::spawn(async move { handler.run().await }));
    }

    /// Signals the worker and waits for it to finish its current cycle and
    /// drain.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let worker = {
            let mut slot = match self.worker.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot.take()
        };
        if let Some(worker) = worker {
            if let Err(error) = worker.await {
                error!(%error, "dispatch worker terminated abnormally");
            }
        }
    }

    /// Ingress: acknowledge, stamp, enqueue.
    ///
    /// The ack goes out before the push so a slow dispatch can never hold
    /// up session responses; persistence is best-effort after the ack.
    pub async fn handle(&self, mut raw: RawRequest, session: &dyn Session) {
        if raw.date_received == 0 {
            raw.date_received = clock::now();
        }
        if let Err(error) = session.write_status(StatusCode::StatusOk).await {
            debug!(%error, ip_addr = %raw.ip_addr, "failed to acknowledge request");
        }
        self.queue.push(raw);
    }

    /// Observability: (frozen, active) queue lengths.
    pub fn queue_depths(&self) -> (usize, usize) {
        (self.queue.len(), self.queue.backlog_size())
    }

    async fn run(&self) {
        debug!("log dispatcher started");
        loop {
            self.process_queue_cycle().await;
            tokio::select! {
                () = tokio::time::sleep(CYCLE_INTERVAL) => {}
                () = self.cancel_token.cancelled() => break,
            }
        }

        // Drain both epochs before exiting; anything racing in after that
        // is counted, not silently lost.
        self.process_queue_cycle().await;
        self.process_queue_cycle().await;
        let remaining = self.queue.len() + self.queue.backlog_size();
        if remaining > 0 {
            warn!(dropped = remaining, "shutting down with undispatched requests");
        }
        debug!("log dispatcher stopped");
    }

    /// One drain cycle: process what the frozen buffer held at entry, then
    /// swap. The bound is the snapshot length, not "until empty": items
    /// pushed while draining wait for the next cycle, which keeps both
    /// producers and the swap making progress.
    async fn process_queue_cycle(&self) {
        let configuration = Arc::clone(self.registry.configuration());
        let total = self.queue.len();
        for _ in 0..total {
            if configuration.dispatch_delay() > 0 {
                tokio::time::sleep(Duration::from_millis(configuration.dispatch_delay())).await;
            }

            let Some(raw) = self.queue.pull() else { break };
            let mut request = self.decoder.decode(&raw);

            if (!request.is_valid() && !request.is_bulk())
                || request.status() != StatusCode::Continue
            {
                warn!(
                    ip_addr = %request.ip_addr(),
                    "dropping queued request that failed to decode"
                );
                continue;
            }

            if request.is_bulk() {
                if configuration.has_flag(Flag::AllowBulkLogRequest) {
                    self.process_bulk(&request, &configuration);
                } else {
                    error!(ip_addr = %request.ip_addr(), "bulk requests are not allowed");
                }
            } else {
                if let Some(client) = request.client() {
                    let client_id = client.id().to_string();
                    request.set_client_id(&client_id);
                }
                self.process_request(&mut request, None, true);
            }
        }
        self.queue.switch_context();
    }

    /// Unpacks a bulk wrapper and processes its items with amortized
    /// client validation.
    fn process_bulk(&self, wrapper: &LogRequest, configuration: &Configuration) {
        let integrity_task = self.registry.client_integrity_task();
        let max_items = configuration.max_items_in_bulk();

        let mut force_client_validation = true;
        let mut current_client: Option<Arc<Client>> = wrapper.client().cloned();
        let mut last_known_client_id = wrapper.client_id().to_string();
        let mut last_client_validation = clock::now();
        let mut item_count: u32 = 0;

        let items = wrapper.bulk_items();
        for (index, item) in items.iter().enumerate() {
            if item_count == max_items {
                error!(
                    dropped = items.len() - index,
                    "maximum number of bulk items reached, ignoring the rest of the bulk"
                );
                break;
            }

            let mut item_request = LogRequest::from_value(
                item,
                wrapper.ip_addr().to_string(),
                wrapper.date_received(),
            );
            if !item_request.is_valid() {
                error!(index, "invalid request in bulk");
                continue;
            }

            if !force_client_validation {
                if let Some(task) = integrity_task.as_deref() {
                    if last_client_validation <= task.last_execution() {
                        // A sweep ran since the cached handle was validated;
                        // it may name an evicted client. Re-resolve by id.
                        info!("re-forcing client validation after integrity sweep");
                        force_client_validation = true;
                        current_client = None;
                        item_request.set_client(None);
                        item_request.set_client_id(&last_known_client_id);
                        last_client_validation = clock::now();
                    }
                }
            }

            if self.process_request(
                &mut item_request,
                Some(&mut current_client),
                force_client_validation,
            ) {
                last_known_client_id = current_client
                    .as_ref()
                    .map(|client| client.id().to_string())
                    .unwrap_or_default();
                force_client_validation = false;
            } else {
                // Failed item: drop the handle so nothing can observe it
                // stale, and make the next item validate from scratch.
                force_client_validation = true;
                current_client = None;
            }
            item_count += 1;
        }
    }

    /// Authorizes one request and dispatches it on success.
    ///
    /// `client_ref` carries a cached client across items of the same bulk;
    /// `force_check` defeats the fast path. With a cached client and no
    /// forced check, liveness/token/policy gates are bypassed: they were
    /// established when the cache was populated.
    fn process_request(
        &self,
        request: &mut LogRequest,
        mut client_ref: Option<&mut Option<Arc<Client>>>,
        force_check: bool,
    ) -> bool {
        let configuration = self.registry.configuration();

        let cached: Option<Arc<Client>> =
            client_ref.as_deref().and_then(|slot| slot.as_ref().cloned());
        let bypass_checks = !force_check && cached.is_some();

        let mut client = cached.or_else(|| request.client().cloned());

        if client.is_none() {
            let logger_accepts_plain = configuration
                .has_logger_flag(request.logger_id(), LoggerFlag::AllowPlainLogRequest)
                || (!configuration.is_known_logger(request.logger_id())
                    && configuration.has_flag(Flag::AllowUnknownLoggers));
            if configuration.has_flag(Flag::AllowPlainLogRequest)
                && logger_accepts_plain
                && !request.client_id().is_empty()
            {
                client = self.registry.find_client(request.client_id());
            } else if request.client_id().is_empty() {
                warn!("invalid request, no client id found");
            }
        }

        if let Some(slot) = client_ref.as_deref_mut() {
            *slot = client.clone();
        }

        let Some(client) = client else {
            warn!(client_id = %request.client_id(), "no client found for request");
            return false;
        };

        if !bypass_checks && !client.is_alive(request.date_received()) {
            error!(client_id = %client.id(), "client expired");
            debug!(
                date_received = request.date_received(),
                date_created = client.date_created(),
                age = client.age(),
                "client liveness window"
            );
            return false;
        }

        request.set_client_id(client.id());
        request.set_client(Some(Arc::clone(&client)));

        // Known clients are the only trustworthy source for learning who
        // owns a hitherto-unknown logger.
        if !bypass_checks
            && client.is_known()
            && configuration.has_flag(Flag::AllowUnknownLoggers)
            && !configuration.is_known_logger(request.logger_id())
        {
            configuration.update_unknown_logger_user_from_request(request.logger_id(), request);
        }

        if request.is_valid() {
            if !bypass_checks && !self.is_request_allowed(request) {
                warn!(
                    logger_id = %request.logger_id(),
                    "ignoring log from unauthorized logger"
                );
                return false;
            }
            self.dispatch(request);
            return true;
        }
        false
    }

    fn is_request_allowed(&self, request: &LogRequest) -> bool {
        let configuration = self.registry.configuration();
        let Some(client) = request.client() else {
            debug!("client may have expired");
            return false;
        };

        let mut allowed = configuration.has_flag(Flag::AllowUnknownLoggers)
            || configuration.is_known_logger(request.logger_id());
        if allowed {
            // The server's own logger is never writable by clients.
            allowed = request.logger_id() != SERVER_LOGGER_ID;
        }
        if allowed {
            allowed = !configuration.is_blacklisted(request.logger_id());
        }
        if allowed {
            allowed = client.is_valid_token(
                request.logger_id(),
                request.token(),
                configuration,
                request.date_received(),
            );
            if !allowed {
                warn!(
                    logger_id = %request.logger_id(),
                    client_id = %client.id(),
                    "token expired"
                );
            }
        }
        allowed
    }

    /// Writes one record with the request's `%client_id` / `%ip`
    /// specifiers installed; the guard uninstalls them on every exit path.
    fn dispatch(&self, request: &LogRequest) {
        let Some(level) = request.level() else {
            // Valid requests always carry a level.
            return;
        };
        let _guard =
            FormatInjector::install(self.sink.as_ref(), request.client_id(), request.ip_addr());
        let record = SinkRecord {
            logger_id: request.logger_id(),
            level,
            verbose_level: request.verbose_level(),
            file: request.file(),
            line: request.line(),
            func: request.func(),
            msg: request.msg(),
        };
        if let Err(error) = self.sink.write(&record) {
            error!(%error, logger_id = %request.logger_id(), "sink write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::NullCipher;
    use crate::registry::{ClientIntegrityTask, Token};
    use crate::sink::{FormatterFn, SinkError, CLIENT_ID_SPECIFIER, IP_SPECIFIER};
    use std::collections::HashMap;

    type WriteHook = Box<dyn FnMut(usize) + Send>;

    /// Sink that records every write with the specifier values that were
    /// installed at write time, and can run a hook after each write.
    #[derive(Default)]
    struct RecordingSink {
        writes: Mutex<Vec<RecordedWrite>>,
        formatters: Mutex<HashMap<String, FormatterFn>>,
        after_write: Mutex<Option<WriteHook>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct RecordedWrite {
        logger_id: String,
        msg: String,
        client_id: Option<String>,
        ip: Option<String>,
    }

    impl RecordingSink {
        fn writes(&self) -> Vec<RecordedWrite> {
            self.writes.lock().unwrap().clone()
        }

        fn set_after_write(&self, hook: impl FnMut(usize) + Send + 'static) {
            *self.after_write.lock().unwrap() = Some(Box::new(hook));
        }
    }

    impl LogSink for RecordingSink {
        fn write(&self, record: &SinkRecord<'_>) -> Result<(), SinkError> {
            let resolve = |name: &str| {
                self.formatters
                    .lock()
                    .unwrap()
                    .get(name)
                    .map(|formatter| formatter())
            };
            let write = RecordedWrite {
                logger_id: record.logger_id.to_string(),
                msg: record.msg.to_string(),
                client_id: resolve(CLIENT_ID_SPECIFIER),
                ip: resolve(IP_SPECIFIER),
            };
            let count = {
                let mut writes = self.writes.lock().unwrap();
                writes.push(write);
                writes.len()
            };
            if let Some(hook) = self.after_write.lock().unwrap().as_mut() {
                hook(count);
            }
            Ok(())
        }

        fn install_formatter(&self, name: &'static str, formatter: FormatterFn) {
            self.formatters
                .lock()
                .unwrap()
                .insert(name.to_string(), formatter);
        }

        fn uninstall_formatter(&self, name: &str) {
            self.formatters.lock().unwrap().remove(name);
        }

        fn has_formatter(&self, name: &str) -> bool {
            self.formatters.lock().unwrap().contains_key(name)
        }
    }

    struct TestHarness {
        registry: Arc<Registry>,
        sink: Arc<RecordingSink>,
        handler: Arc<LogRequestHandler>,
    }

    fn create_test_harness(config_json: &str) -> TestHarness {
        let configuration = Arc::new(Configuration::from_json(config_json).unwrap());
        let registry = Arc::new(Registry::new(configuration));
        let sink = Arc::new(RecordingSink::default());
        let handler = Arc::new(LogRequestHandler::new(
            Arc::clone(&registry),
            Arc::clone(&sink) as Arc<dyn LogSink>,
            Arc::new(NullCipher),
        ));
        TestHarness {
            registry,
            sink,
            handler,
        }
    }

    /// Known-logger config: `app` is declared, tokens required.
    const TOKENED: &str = r#"{ "known_loggers": [ { "logger_id": "app" } ] }"#;

    fn register_client_with_token(harness: &TestHarness, expiry: u64) -> Arc<Client> {
        let client = harness
            .registry
            .register_client(Client::new("c1", vec![], 0, true))
            .unwrap();
        client.add_token("app", Token::new("T1", expiry));
        client
    }

    fn scalar_request(harness: &TestHarness, logger_id: &str, token: &str) -> LogRequest {
        let payload = loghub_proto::LogPayload {
            logger_id: logger_id.to_string(),
            msg: Some("hello".to_string()),
            level: Some(128),
            token: token.to_string(),
            ..loghub_proto::LogPayload::default()
        };
        let mut request = LogRequest::from_payload(payload, "10.0.0.1".to_string(), clock::now());
        request.set_client(harness.registry.find_client("c1"));
        if let Some(client) = harness.registry.find_client("c1") {
            request.set_client_id(client.id());
        }
        request
    }

    fn bulk_wrapper(harness: &TestHarness, item_count: usize) -> LogRequest {
        let items: Vec<serde_json::Value> = (0..item_count)
            .map(|i| {
                serde_json::json!({
                    "logger_id": "app", "msg": format!("m{i}"),
                    "level": 128, "token": "T1"
                })
            })
            .collect();
        LogRequest::bulk_wrapper(
            items,
            harness.registry.find_client("c1"),
            "10.0.0.1".to_string(),
            clock::now(),
        )
    }

    #[test]
    fn test_valid_request_dispatches_with_specifiers() {
        let harness = create_test_harness(TOKENED);
        register_client_with_token(&harness, 0);

        let mut request = scalar_request(&harness, "app", "T1");
        assert!(harness.handler.process_request(&mut request, None, true));

        let writes = harness.sink.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].logger_id, "app");
        assert_eq!(writes[0].msg, "hello");
        assert_eq!(writes[0].client_id.as_deref(), Some("c1"));
        assert_eq!(writes[0].ip.as_deref(), Some("10.0.0.1"));

        // Specifiers never outlive the dispatch.
        assert!(!harness.sink.has_formatter(CLIENT_ID_SPECIFIER));
        assert!(!harness.sink.has_formatter(IP_SPECIFIER));
    }

    #[test]
    fn test_reserved_logger_is_rejected() {
        let harness = create_test_harness(r#"{ "allow_unknown_loggers": true }"#);
        register_client_with_token(&harness, 0);

        let mut request = scalar_request(&harness, SERVER_LOGGER_ID, "T1");
        assert!(!harness.handler.process_request(&mut request, None, true));
        assert!(harness.sink.writes().is_empty());
    }

    #[test]
    fn test_blacklisted_logger_is_rejected() {
        let harness = create_test_harness(
            r#"{ "allow_unknown_loggers": true, "blacklist": ["secret"] }"#,
        );
        register_client_with_token(&harness, 0);

        let mut request = scalar_request(&harness, "secret", "T1");
        assert!(!harness.handler.process_request(&mut request, None, true));
        assert!(harness.sink.writes().is_empty());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let harness = create_test_harness(TOKENED);
        register_client_with_token(&harness, 1);

        let mut request = scalar_request(&harness, "app", "T1");
        assert!(!harness.handler.process_request(&mut request, None, true));
        assert!(harness.sink.writes().is_empty());
    }

    #[test]
    fn test_dead_client_is_rejected() {
        let harness = create_test_harness(TOKENED);
        let client = harness
            .registry
            .register_client(Client::new("c1", vec![], 10, true).with_date_created(1))
            .unwrap();
        client.add_token("app", Token::new("T1", 0));

        let mut request = scalar_request(&harness, "app", "T1");
        assert!(!harness.handler.process_request(&mut request, None, true));
        assert!(harness.sink.writes().is_empty());
    }

    #[test]
    fn test_unknown_logger_without_allowance_is_rejected() {
        let harness = create_test_harness(TOKENED);
        register_client_with_token(&harness, 0);

        let mut request = scalar_request(&harness, "other", "T1");
        assert!(!harness.handler.process_request(&mut request, None, true));
        assert!(harness.sink.writes().is_empty());
    }

    #[test]
    fn test_request_without_client_is_rejected() {
        let harness = create_test_harness(TOKENED);

        let payload = loghub_proto::LogPayload {
            logger_id: "app".to_string(),
            msg: Some("hello".to_string()),
            level: Some(128),
            ..loghub_proto::LogPayload::default()
        };
        let mut request = LogRequest::from_payload(payload, "10.0.0.1".to_string(), clock::now());
        assert!(!harness.handler.process_request(&mut request, None, true));
        assert!(harness.sink.writes().is_empty());
    }

    #[test]
    fn test_unknown_logger_learning_records_client() {
        let harness = create_test_harness(r#"{ "allow_unknown_loggers": true }"#);
        let client = register_client_with_token(&harness, 0);
        client.add_token("adhoc", Token::new("T2", 0));

        let mut request = scalar_request(&harness, "adhoc", "T2");
        assert!(harness.handler.process_request(&mut request, None, true));
        assert_eq!(
            harness
                .registry
                .configuration()
                .unknown_logger_user("adhoc"),
            Some("c1".to_string())
        );
    }

    #[test]
    fn test_bulk_amortizes_client_resolution() {
        let harness = create_test_harness(TOKENED);
        register_client_with_token(&harness, 0);
        let wrapper = bulk_wrapper(&harness, 3);

        // Remove the registry entry after the first write: items 2 and 3
        // can only succeed through the cached handle.
        let registry = Arc::clone(&harness.registry);
        harness.sink.set_after_write(move |count| {
            if count == 1 {
                registry.remove_client("c1");
            }
        });

        let configuration = Arc::clone(harness.registry.configuration());
        harness.handler.process_bulk(&wrapper, &configuration);
        assert_eq!(harness.sink.writes().len(), 3);
    }

    #[test]
    fn test_bulk_respects_item_cap() {
        let harness = create_test_harness(
            r#"{ "max_items_in_bulk": 3,
                 "known_loggers": [ { "logger_id": "app" } ] }"#,
        );
        register_client_with_token(&harness, 0);
        let wrapper = bulk_wrapper(&harness, 5);

        let configuration = Arc::clone(harness.registry.configuration());
        harness.handler.process_bulk(&wrapper, &configuration);

        let writes = harness.sink.writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0].msg, "m0");
        assert_eq!(writes[2].msg, "m2");
    }

    #[test]
    fn test_bulk_skips_invalid_items_without_counting_them() {
        let harness = create_test_harness(
            r#"{ "max_items_in_bulk": 2,
                 "known_loggers": [ { "logger_id": "app" } ] }"#,
        );
        register_client_with_token(&harness, 0);

        let items = vec![
            serde_json::json!({"logger_id": "app", "msg": "ok1", "level": 128, "token": "T1"}),
            serde_json::json!("garbage"),
            serde_json::json!({"logger_id": "app", "msg": "ok2", "level": 128, "token": "T1"}),
        ];
        let wrapper = LogRequest::bulk_wrapper(
            items,
            harness.registry.find_client("c1"),
            "10.0.0.1".to_string(),
            clock::now(),
        );

        let configuration = Arc::clone(harness.registry.configuration());
        harness.handler.process_bulk(&wrapper, &configuration);

        let writes = harness.sink.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].msg, "ok1");
        assert_eq!(writes[1].msg, "ok2");
    }

    #[test]
    fn test_bulk_revalidates_after_integrity_sweep() {
        // Config allows re-resolution by id (plain gate open for `app`).
        let harness = create_test_harness(
            r#"{ "allow_plain_log_request": true,
                 "known_loggers": [
                   { "logger_id": "app", "allow_plain_log_request": true } ] }"#,
        );
        register_client_with_token(&harness, 0);

        let integrity = Arc::new(ClientIntegrityTask::new(
            Arc::downgrade(&harness.registry),
            300,
        ));
        harness
            .registry
            .set_client_integrity_task(Arc::clone(&integrity));

        // Run the sweep after the second write; items 3 and 4 must then
        // re-resolve by id, which still succeeds: the client is alive.
        let sweep = Arc::clone(&integrity);
        harness.sink.set_after_write(move |count| {
            if count == 2 {
                sweep.execute();
            }
        });

        let wrapper = bulk_wrapper(&harness, 4);
        let configuration = Arc::clone(harness.registry.configuration());
        harness.handler.process_bulk(&wrapper, &configuration);
        assert_eq!(harness.sink.writes().len(), 4);
    }

    #[test]
    fn test_bulk_sweep_eviction_stops_cached_dispatch() {
        // Same as above, but the sweep also evicts the client: the cached
        // handle must not be used, so the remaining items fail.
        let harness = create_test_harness(
            r#"{ "allow_plain_log_request": true,
                 "known_loggers": [
                   { "logger_id": "app", "allow_plain_log_request": true } ] }"#,
        );
        register_client_with_token(&harness, 0);

        let integrity = Arc::new(ClientIntegrityTask::new(
            Arc::downgrade(&harness.registry),
            300,
        ));
        harness
            .registry
            .set_client_integrity_task(Arc::clone(&integrity));

        let registry = Arc::clone(&harness.registry);
        let sweep = Arc::clone(&integrity);
        harness.sink.set_after_write(move |count| {
            if count == 2 {
                registry.remove_client("c1");
                sweep.execute();
            }
        });

        let wrapper = bulk_wrapper(&harness, 4);
        let configuration = Arc::clone(harness.registry.configuration());
        harness.handler.process_bulk(&wrapper, &configuration);
        assert_eq!(harness.sink.writes().len(), 2);
    }

    #[tokio::test]
    async fn test_worker_drains_queue_end_to_end() {
        let harness = create_test_harness(
            r#"{ "allow_plain_log_request": true,
                 "dispatch_delay": 0,
                 "known_loggers": [
                   { "logger_id": "app", "allow_plain_log_request": true } ] }"#,
        );
        register_client_with_token(&harness, 0);

        struct NoopSession;

        #[async_trait::async_trait]
        impl Session for NoopSession {
            async fn write_status(&self, _status: StatusCode) -> std::io::Result<()> {
                Ok(())
            }
        }

        harness.handler.start();
        let raw = RawRequest::new(
            br#"{"logger_id":"app","msg":"via worker","level":128,"client_id":"c1"}"#.to_vec(),
            "10.0.0.1",
        );
        harness.handler.handle(raw, &NoopSession).await;

        // Two cycle intervals cover push epoch + drain epoch.
        tokio::time::sleep(Duration::from_millis(350)).await;
        harness.handler.shutdown().await;

        let writes = harness.sink.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].msg, "via worker");
    }

    #[tokio::test]
    async fn test_shutdown_drains_pending_requests() {
        let harness = create_test_harness(
            r#"{ "allow_plain_log_request": true,
                 "dispatch_delay": 0,
                 "known_loggers": [
                   { "logger_id": "app", "allow_plain_log_request": true } ] }"#,
        );
        register_client_with_token(&harness, 0);

        struct NoopSession;

        #[async_trait::async_trait]
        impl Session for NoopSession {
            async fn write_status(&self, _status: StatusCode) -> std::io::Result<()> {
                Ok(())
            }
        }

        harness.handler.start();
        for i in 0..5 {
            let raw = RawRequest::new(
                format!(
                    r#"{{"logger_id":"app","msg":"m{i}","level":128,"client_id":"c1"}}"#
                )
                .into_bytes(),
                "10.0.0.1",
            );
            harness.handler.handle(raw, &NoopSession).await;
        }
        harness.handler.shutdown().await;

        assert_eq!(harness.sink.writes().len(), 5);
        let (frozen, active) = harness.handler.queue_depths();
        assert_eq!((frozen, active), (0, 0));
    }
}
