use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use courier_core::TenantConfig;
use courier_transport::{Address, TransportHandle};

use crate::template;

/// Upper bound on dispatch workers regardless of tenant configuration.
pub const WORKER_HARD_CAP: usize = 10;

/// One entry of a bulk-send request.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BulkItem {
    pub recipient: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchErrorKind {
    InvalidRecipient,
    InvalidMessage,
    SendFailed,
}

/// Outcome for one item, in submission order.
#[derive(Clone, Debug, Serialize)]
pub struct BulkResult {
    pub recipient: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DispatchErrorKind>,
}

impl BulkResult {
    fn ok(recipient: String) -> Self {
        Self {
            recipient,
            ok: true,
            error: None,
        }
    }

    fn failed(recipient: String, kind: DispatchErrorKind) -> Self {
        Self {
            recipient,
            ok: false,
            error: Some(kind),
        }
    }
}

/// Aggregated result of one batch.
#[derive(Clone, Debug, Serialize)]
pub struct DispatchOutcome {
    pub sent: usize,
    pub total: usize,
    pub results: Vec<BulkResult>,
}

#[derive(Clone, Debug, Default)]
pub struct DispatchOptions {
    /// Upper bound on total dispatch wall time. Items still unsent when it
    /// elapses are recorded as `SendFailed`. `None` runs to completion.
    pub max_duration: Option<Duration>,
}

/// An item that survived validation and is ready to send.
struct ReadyItem {
    index: usize,
    recipient: String,
    to: Address,
    text: String,
}

/// Fan a batch of sends across a bounded worker pool.
///
/// The batch is truncated to `config.max_batch_size`; each surviving item is
/// validated and rendered up front (invalid items fail fast without touching
/// a worker), then `min(config.concurrency, WORKER_HARD_CAP)` workers pull
/// ready items off a shared cursor, throttling each send by
/// `config.inter_send_delay`. A failed send marks its own slot and nothing
/// else. Results come back in submission order, one per validated item.
pub async fn dispatch(
    items: Vec<BulkItem>,
    handle: Arc<dyn TransportHandle>,
    config: &TenantConfig,
) -> DispatchOutcome {
    dispatch_with(items, handle, config, DispatchOptions::default()).await
}

pub async fn dispatch_with(
    mut items: Vec<BulkItem>,
    handle: Arc<dyn TransportHandle>,
    config: &TenantConfig,
    options: DispatchOptions,
) -> DispatchOutcome {
    let batch_id = Uuid::now_v7();
    if items.len() > config.max_batch_size {
        warn!(
            batch_id = %batch_id,
            dropped = items.len() - config.max_batch_size,
            "batch exceeds max_batch_size, truncating"
        );
        items.truncate(config.max_batch_size);
    }
    let total = items.len();

    let mut slots: Vec<Option<BulkResult>> = Vec::with_capacity(total);
    slots.resize_with(total, || None);
    let mut ready = Vec::new();
    for (index, item) in items.iter().enumerate() {
        match prepare(item, handle.as_ref(), config) {
            Ok((to, text)) => ready.push(ReadyItem {
                index,
                recipient: item.recipient.clone(),
                to,
                text,
            }),
            Err(kind) => slots[index] = Some(BulkResult::failed(item.recipient.clone(), kind)),
        }
    }

    info!(
        batch_id = %batch_id,
        total,
        ready = ready.len(),
        "dispatching batch"
    );

    if !ready.is_empty() {
        let cancel = CancellationToken::new();
        if let Some(max) = options.max_duration {
            let deadline = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(max).await;
                deadline.cancel();
            });
        }

        let workers = effective_workers(config.concurrency, ready.len());
        let ready = Arc::new(ready);
        let cursor = Arc::new(AtomicUsize::new(0));
        let mut pool = Vec::with_capacity(workers);
        for _ in 0..workers {
            pool.push(tokio::spawn(run_worker(
                Arc::clone(&ready),
                Arc::clone(&cursor),
                Arc::clone(&handle),
                config.inter_send_delay,
                cancel.clone(),
            )));
        }
        for worker in pool {
            match worker.await {
                Ok(finished) => {
                    for (index, result) in finished {
                        slots[index] = Some(result);
                    }
                }
                Err(e) => error!(batch_id = %batch_id, error = %e, "dispatch worker panicked"),
            }
        }
    }

    let results: Vec<BulkResult> = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| {
                BulkResult::failed(items[index].recipient.clone(), DispatchErrorKind::SendFailed)
            })
        })
        .collect();
    let sent = results.iter().filter(|r| r.ok).count();

    info!(batch_id = %batch_id, total, sent, failed = total - sent, "batch complete");
    DispatchOutcome {
        sent,
        total,
        results,
    }
}

/// Worker loop: claim the next unprocessed ready item off the shared cursor.
/// `fetch_add` hands each index to exactly one worker, so no item is sent
/// twice and none is skipped.
async fn run_worker(
    ready: Arc<Vec<ReadyItem>>,
    cursor: Arc<AtomicUsize>,
    handle: Arc<dyn TransportHandle>,
    delay: Duration,
    cancel: CancellationToken,
) -> Vec<(usize, BulkResult)> {
    let mut finished = Vec::new();
    loop {
        let slot = cursor.fetch_add(1, Ordering::SeqCst);
        let Some(item) = ready.get(slot) else {
            break;
        };

        if !delay.is_zero() && !cancel.is_cancelled() {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if cancel.is_cancelled() {
            finished.push((
                item.index,
                BulkResult::failed(item.recipient.clone(), DispatchErrorKind::SendFailed),
            ));
            continue;
        }

        match handle.send_text(&item.to, &item.text).await {
            Ok(()) => finished.push((item.index, BulkResult::ok(item.recipient.clone()))),
            Err(e) => {
                warn!(recipient = %item.to, error = %e, "send failed");
                finished.push((
                    item.index,
                    BulkResult::failed(item.recipient.clone(), DispatchErrorKind::SendFailed),
                ));
            }
        }
    }
    finished
}

fn effective_workers(concurrency: usize, ready: usize) -> usize {
    concurrency.clamp(1, WORKER_HARD_CAP).min(ready)
}

/// Validate one item and resolve its final text.
fn prepare(
    item: &BulkItem,
    handle: &dyn TransportHandle,
    config: &TenantConfig,
) -> Result<(Address, String), DispatchErrorKind> {
    let to = handle
        .normalize_recipient(&item.recipient)
        .ok_or(DispatchErrorKind::InvalidRecipient)?;

    let text = resolve_text(item);
    if text.trim().is_empty() {
        return Err(DispatchErrorKind::InvalidMessage);
    }
    if text.chars().count() > config.max_message_chars {
        return Err(DispatchErrorKind::InvalidMessage);
    }
    Ok((to, text))
}

/// A non-empty literal message that carries no placeholder is pre-rendered
/// text; anything else goes through the renderer.
fn resolve_text(item: &BulkItem) -> String {
    if let Some(message) = item.message.as_deref() {
        if !message.trim().is_empty() {
            return if template::has_placeholder(message) {
                template::render(message, &item.variables)
            } else {
                message.to_owned()
            };
        }
    }
    match item.template.as_deref() {
        Some(tpl) => template::render(tpl, &item.variables),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_transport::memory::MemoryHandle;

    fn item(recipient: &str, message: &str) -> BulkItem {
        BulkItem {
            recipient: recipient.into(),
            message: Some(message.into()),
            ..BulkItem::default()
        }
    }

    fn config() -> TenantConfig {
        TenantConfig {
            inter_send_delay: Duration::ZERO,
            ..TenantConfig::default()
        }
    }

    #[tokio::test]
    async fn invalid_recipient_fails_fast_in_order() {
        let handle = MemoryHandle::new();
        let items = vec![
            item("111", "first"),
            item("not-a-recipient", "second"),
            item("333", "third"),
        ];
        let outcome = dispatch(
            items,
            handle.clone() as Arc<dyn TransportHandle>,
            &TenantConfig {
                concurrency: 2,
                ..config()
            },
        )
        .await;

        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.sent, 2);
        assert!(outcome.results[0].ok);
        assert!(!outcome.results[1].ok);
        assert_eq!(
            outcome.results[1].error,
            Some(DispatchErrorKind::InvalidRecipient)
        );
        assert!(outcome.results[2].ok);
        assert_eq!(handle.sent_count(), 2);
    }

    #[tokio::test]
    async fn every_item_processed_exactly_once_across_workers() {
        let handle = MemoryHandle::new();
        let items: Vec<BulkItem> = (0..50)
            .map(|n| item(&format!("55{n:04}"), "ping"))
            .collect();
        let outcome = dispatch(
            items,
            handle.clone() as Arc<dyn TransportHandle>,
            &TenantConfig {
                concurrency: 50,
                ..config()
            },
        )
        .await;

        assert_eq!(outcome.total, 50);
        assert_eq!(outcome.sent, 50);
        assert!(outcome.results.iter().all(|r| r.ok));

        let sent = handle.sent();
        assert_eq!(sent.len(), 50);
        let unique: std::collections::HashSet<&str> =
            sent.iter().map(|m| m.to.as_str()).collect();
        assert_eq!(unique.len(), 50);
    }

    #[tokio::test]
    async fn oversized_batch_truncates_silently() {
        let handle = MemoryHandle::new();
        let items = vec![
            item("1", "a"),
            item("2", "b"),
            item("3", "c"),
            item("4", "d"),
        ];
        let outcome = dispatch(
            items,
            handle.clone() as Arc<dyn TransportHandle>,
            &TenantConfig {
                max_batch_size: 2,
                ..config()
            },
        )
        .await;

        assert_eq!(outcome.total, 2);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(handle.sent_count(), 2);
    }

    #[tokio::test]
    async fn one_failed_send_does_not_abort_the_batch() {
        let handle = MemoryHandle::new();
        handle.fail_sends_to("222@mem.chat");
        let items = vec![item("111", "a"), item("222", "b"), item("333", "c")];
        let outcome = dispatch(items, handle.clone() as Arc<dyn TransportHandle>, &config()).await;

        assert_eq!(outcome.sent, 2);
        assert_eq!(
            outcome.results[1].error,
            Some(DispatchErrorKind::SendFailed)
        );
        assert!(outcome.results[0].ok && outcome.results[2].ok);
    }

    #[tokio::test]
    async fn resolves_literal_template_and_variables() {
        let handle = MemoryHandle::new();
        let items = vec![
            item("111", "plain text"),
            BulkItem {
                recipient: "222".into(),
                message: Some("Hello ${name}".into()),
                variables: [("name".to_string(), "Ana".to_string())].into(),
                ..BulkItem::default()
            },
            BulkItem {
                recipient: "333".into(),
                template: Some("Hi {{name}}, order {{id}}".into()),
                variables: [
                    ("name".to_string(), "Bo".to_string()),
                    ("id".to_string(), "7".to_string()),
                ]
                .into(),
                ..BulkItem::default()
            },
        ];
        let outcome = dispatch(items, handle.clone() as Arc<dyn TransportHandle>, &config()).await;

        assert_eq!(outcome.sent, 3);
        let texts: Vec<String> = handle.sent().into_iter().map(|m| m.text).collect();
        assert!(texts.contains(&"plain text".to_string()));
        assert!(texts.contains(&"Hello Ana".to_string()));
        assert!(texts.contains(&"Hi Bo, order 7".to_string()));
    }

    #[tokio::test]
    async fn empty_and_oversized_texts_are_invalid() {
        let handle = MemoryHandle::new();
        let items = vec![
            BulkItem {
                recipient: "111".into(),
                ..BulkItem::default()
            },
            BulkItem {
                recipient: "222".into(),
                template: Some("${missing}".into()),
                ..BulkItem::default()
            },
            item("333", &"x".repeat(20)),
        ];
        let outcome = dispatch(
            items,
            handle.clone() as Arc<dyn TransportHandle>,
            &TenantConfig {
                max_message_chars: 10,
                ..config()
            },
        )
        .await;

        assert_eq!(outcome.sent, 0);
        assert!(outcome
            .results
            .iter()
            .all(|r| r.error == Some(DispatchErrorKind::InvalidMessage)));
        assert_eq!(handle.sent_count(), 0);
    }

    #[tokio::test]
    async fn deadline_marks_unsent_items_failed() {
        let handle = MemoryHandle::new();
        let items = vec![item("1", "a"), item("2", "b"), item("3", "c")];
        let outcome = dispatch_with(
            items,
            handle.clone() as Arc<dyn TransportHandle>,
            &TenantConfig {
                concurrency: 1,
                inter_send_delay: Duration::from_millis(50),
                ..TenantConfig::default()
            },
            DispatchOptions {
                max_duration: Some(Duration::from_millis(10)),
            },
        )
        .await;

        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.sent, 0);
        assert!(outcome
            .results
            .iter()
            .all(|r| r.error == Some(DispatchErrorKind::SendFailed)));
    }

    #[test]
    fn worker_count_is_capped() {
        assert_eq!(effective_workers(3, 100), 3);
        assert_eq!(effective_workers(50, 100), WORKER_HARD_CAP);
        assert_eq!(effective_workers(0, 100), 1);
        assert_eq!(effective_workers(5, 2), 2);
    }

    #[test]
    fn bulk_item_deserializes_with_defaults() {
        let parsed: BulkItem =
            serde_json::from_str(r#"{"recipient":"123","message":"hi"}"#).unwrap();
        assert_eq!(parsed.recipient, "123");
        assert_eq!(parsed.message.as_deref(), Some("hi"));
        assert!(parsed.template.is_none());
        assert!(parsed.variables.is_empty());
    }
}
