use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::app::ports::NotifierPort;
use crate::config::DispatchConfig;
use crate::domain::{ContactResult, Phone};
use crate::error::TransportError;
use crate::observability::metrics;

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub concurrency: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
    pub min_interval: Duration,
    pub max_failures: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for DispatchOptions {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            timeout: config.timeout(),
            max_retries: config.max_retries,
            backoff: config.backoff(),
            min_interval: config.min_interval(),
            max_failures: config.max_failures.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchFailure {
    pub phone: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    /// Contacts never handed to the notifier: no canonical phone, or
    /// abandoned after the batch was cancelled.
    pub skipped: usize,
    pub failures: Vec<DispatchFailure>,
    /// True when the failure limit stopped the batch early.
    pub cancelled: bool,
}

/// Fill `{name}`, `{farmer}` and `{count}` in a message template.
pub fn render_message(template: &str, farmer: &str, contact: &ContactResult) -> String {
    template
        .replace("{name}", &contact.display_name)
        .replace("{farmer}", farmer)
        .replace("{count}", &contact.count.to_string())
}

/// Sends one rendered message per contact through a `NotifierPort`.
///
/// At most `concurrency` sends are in flight, and consecutive send starts are
/// at least `min_interval` apart across the batch. Transient failures are retried
/// with exponential backoff; permanent ones are not. Once `max_failures`
/// contacts have failed, sends that have not started are abandoned.
pub struct DispatchUseCase {
    notifier: Arc<dyn NotifierPort>,
    options: DispatchOptions,
}

impl DispatchUseCase {
    pub fn new(notifier: Arc<dyn NotifierPort>, options: DispatchOptions) -> Self {
        Self { notifier, options }
    }

    #[instrument(skip_all, fields(contacts = contacts.len(), farmer = %farmer))]
    pub async fn dispatch(
        &self,
        contacts: &[ContactResult],
        farmer: &str,
        template: &str,
    ) -> DispatchReport {
        let started = Instant::now();
        let mut report = DispatchReport::default();

        let targets: Vec<(String, String)> = contacts
            .iter()
            .filter_map(|contact| match &contact.phone {
                Phone::Canonical(phone) => {
                    Some((phone.clone(), render_message(template, farmer, contact)))
                }
                _ => None,
            })
            .collect();
        report.skipped = contacts.len() - targets.len();
        if report.skipped > 0 {
            info!("skipping {} contacts without a verified phone", report.skipped);
            metrics::dispatch::skipped(report.skipped);
        }

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency));
        let failures = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicBool::new(false));
        let pacer = Arc::new(Pacer::new(self.options.min_interval));
        let mut tasks = JoinSet::new();

        for (phone, text) in targets {
            let notifier = Arc::clone(&self.notifier);
            let options = self.options.clone();
            let semaphore = Arc::clone(&semaphore);
            let failures = Arc::clone(&failures);
            let cancelled = Arc::clone(&cancelled);
            let pacer = Arc::clone(&pacer);

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return SendOutcome::Abandoned;
                };
                if cancelled.load(Ordering::SeqCst) {
                    return SendOutcome::Abandoned;
                }
                pacer.wait().await;

                match send_with_retry(notifier.as_ref(), &phone, &text, &options).await {
                    Ok(()) => SendOutcome::Sent,
                    Err(error) => {
                        let failed = failures.fetch_add(1, Ordering::SeqCst) + 1;
                        if failed >= options.max_failures && !cancelled.swap(true, Ordering::SeqCst) {
                            warn!("{} sends failed; cancelling the rest of the batch", failed);
                        }
                        SendOutcome::Failed(DispatchFailure {
                            phone,
                            error: error.to_string(),
                        })
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(SendOutcome::Sent) => report.sent += 1,
                Ok(SendOutcome::Failed(failure)) => {
                    report.failed += 1;
                    report.failures.push(failure);
                }
                Ok(SendOutcome::Abandoned) => report.skipped += 1,
                Err(e) => {
                    warn!("dispatch task did not complete: {}", e);
                    report.failed += 1;
                }
            }
        }

        report.cancelled = cancelled.load(Ordering::SeqCst);
        metrics::dispatch::batch_duration(started.elapsed().as_secs_f64());
        info!(
            "dispatch finished: {} sent, {} failed, {} skipped{}",
            report.sent,
            report.failed,
            report.skipped,
            if report.cancelled { " (cancelled)" } else { "" }
        );
        report
    }
}

/// Spaces send starts `interval` apart across every task of a batch.
struct Pacer {
    interval: Duration,
    last_start: Mutex<Option<tokio::time::Instant>>,
}

impl Pacer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_start: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }
        // Held across the sleep so starts are granted one at a time.
        let mut last_start = self.last_start.lock().await;
        if let Some(previous) = *last_start {
            tokio::time::sleep_until(previous + self.interval).await;
        }
        *last_start = Some(tokio::time::Instant::now());
    }
}

enum SendOutcome {
    Sent,
    Failed(DispatchFailure),
    Abandoned,
}

async fn send_with_retry(
    notifier: &dyn NotifierPort,
    to: &str,
    text: &str,
    options: &DispatchOptions,
) -> Result<(), TransportError> {
    let mut attempt: u32 = 0;
    loop {
        let outcome = match tokio::time::timeout(options.timeout, notifier.send(to, text)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Transient(format!(
                "no response within {:?}",
                options.timeout
            ))),
        };

        match outcome {
            Ok(receipt) => {
                debug!("sent to {} ({:?})", to, receipt.message_id);
                metrics::dispatch::sent();
                return Ok(());
            }
            Err(error) if error.is_transient() && attempt < options.max_retries => {
                let delay = options
                    .backoff
                    .saturating_mul(2u32.saturating_pow(attempt));
                debug!("retrying {} in {:?} after: {}", to, delay, error);
                metrics::dispatch::retried();
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                warn!("send to {} failed after {} attempts: {}", to, attempt + 1, error);
                metrics::dispatch::failed(error.is_transient());
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::SendReceipt;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Replays a scripted sequence of results per recipient, then succeeds.
    #[derive(Default)]
    struct ScriptedNotifier {
        scripts: Mutex<HashMap<String, Vec<Result<(), TransportError>>>>,
        calls: Mutex<Vec<(String, String)>>,
        delay: Duration,
    }

    impl ScriptedNotifier {
        fn script(self, to: &str, results: Vec<Result<(), TransportError>>) -> Self {
            self.scripts.lock().unwrap().insert(to.to_string(), results);
            self
        }

        fn calls_to(&self, to: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|(t, _)| t == to).count()
        }
    }

    #[async_trait]
    impl NotifierPort for ScriptedNotifier {
        async fn send(&self, to: &str, text: &str) -> Result<SendReceipt, TransportError> {
            self.calls.lock().unwrap().push((to.to_string(), text.to_string()));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = {
                let mut scripts = self.scripts.lock().unwrap();
                scripts
                    .get_mut(to)
                    .filter(|s| !s.is_empty())
                    .map(|s| s.remove(0))
            };
            next.unwrap_or(Ok(())).map(|()| SendReceipt {
                message_id: Some(format!("msg-{}", to)),
                diagnostic: "ok".into(),
            })
        }
    }

    fn contact(name: &str, phone: Phone, count: u32) -> ContactResult {
        ContactResult {
            display_name: name.into(),
            phone,
            count,
        }
    }

    fn fast_options() -> DispatchOptions {
        DispatchOptions {
            concurrency: 2,
            timeout: Duration::from_millis(200),
            max_retries: 2,
            backoff: Duration::from_millis(1),
            min_interval: Duration::ZERO,
            max_failures: 10,
        }
    }

    #[test]
    fn test_render_message() {
        let c = contact("Kim", Phone::Canonical("010-1111-2222".into()), 3);
        assert_eq!(
            render_message("{name}님, {farmer} 상품을 {count}번 구매하셨습니다", "FarmA", &c),
            "Kim님, FarmA 상품을 3번 구매하셨습니다"
        );
    }

    #[tokio::test]
    async fn test_skips_unverified_contacts() {
        let notifier = Arc::new(ScriptedNotifier::default());
        let use_case = DispatchUseCase::new(notifier.clone(), fast_options());
        let contacts = vec![
            contact("Kim", Phone::Canonical("010-1111-2222".into()), 2),
            contact("Ghost", Phone::Sentinel, 1),
            contact("Odd", Phone::Suspect("12345".into()), 1),
        ];

        let report = use_case.dispatch(&contacts, "FarmA", "hi {name}").await;

        assert_eq!(report.sent, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.failed, 0);
        let calls = notifier.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("010-1111-2222".to_string(), "hi Kim".to_string())]);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let notifier = Arc::new(ScriptedNotifier::default().script(
            "010-1111-2222",
            vec![
                Err(TransportError::Transient("503".into())),
                Err(TransportError::Transient("429".into())),
            ],
        ));
        let use_case = DispatchUseCase::new(notifier.clone(), fast_options());
        let contacts = vec![contact("Kim", Phone::Canonical("010-1111-2222".into()), 1)];

        let report = use_case.dispatch(&contacts, "FarmA", "hi").await;

        assert_eq!(report.sent, 1);
        assert_eq!(notifier.calls_to("010-1111-2222"), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let notifier = Arc::new(ScriptedNotifier::default().script(
            "010-1111-2222",
            vec![Err(TransportError::Permanent("invalid number".into()))],
        ));
        let use_case = DispatchUseCase::new(notifier.clone(), fast_options());
        let contacts = vec![
            contact("Kim", Phone::Canonical("010-1111-2222".into()), 1),
            contact("Park", Phone::Canonical("010-123-4567".into()), 1),
        ];

        let report = use_case.dispatch(&contacts, "FarmA", "hi").await;

        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].phone, "010-1111-2222");
        assert_eq!(notifier.calls_to("010-1111-2222"), 1);
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_slow_notifier_times_out() {
        let notifier = Arc::new(ScriptedNotifier {
            delay: Duration::from_millis(100),
            ..Default::default()
        });
        let options = DispatchOptions {
            timeout: Duration::from_millis(10),
            max_retries: 1,
            ..fast_options()
        };
        let use_case = DispatchUseCase::new(notifier.clone(), options);
        let contacts = vec![contact("Kim", Phone::Canonical("010-1111-2222".into()), 1)];

        let report = use_case.dispatch(&contacts, "FarmA", "hi").await;

        assert_eq!(report.failed, 1);
        assert!(report.failures[0].error.contains("transient"));
        assert_eq!(notifier.calls_to("010-1111-2222"), 2);
    }

    #[tokio::test]
    async fn test_min_interval_spaces_sends_across_slots() {
        let notifier = Arc::new(ScriptedNotifier::default());
        let options = DispatchOptions {
            concurrency: 4,
            min_interval: Duration::from_millis(30),
            ..fast_options()
        };
        let use_case = DispatchUseCase::new(notifier.clone(), options);
        let contacts: Vec<ContactResult> = (0..4)
            .map(|i| contact("X", Phone::Canonical(format!("010-0000-000{}", i)), 1))
            .collect();

        let started = Instant::now();
        let report = use_case.dispatch(&contacts, "FarmA", "hi").await;

        assert_eq!(report.sent, 4);
        // Four free slots still start one send per interval.
        assert!(started.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_failure_limit_cancels_batch() {
        let phones: Vec<String> = (0..6).map(|i| format!("010-0000-000{}", i)).collect();
        let mut notifier = ScriptedNotifier::default();
        for phone in &phones {
            notifier = notifier.script(phone, vec![Err(TransportError::Permanent("rejected".into()))]);
        }
        let notifier = Arc::new(notifier);
        let options = DispatchOptions {
            concurrency: 1,
            max_failures: 2,
            ..fast_options()
        };
        let use_case = DispatchUseCase::new(notifier.clone(), options);
        let contacts: Vec<ContactResult> = phones
            .iter()
            .map(|p| contact("X", Phone::Canonical(p.clone()), 1))
            .collect();

        let report = use_case.dispatch(&contacts, "FarmA", "hi").await;

        assert!(report.cancelled);
        assert_eq!(report.failed, 2);
        assert_eq!(report.sent, 0);
        assert_eq!(report.skipped, 4);
        assert_eq!(notifier.calls.lock().unwrap().len(), 2);
    }
}
