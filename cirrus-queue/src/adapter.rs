use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cirrus_blob::{unique_blob_name, BlobAdapter};
use cirrus_core::{Clock, DataSerializer, JsonSerializer, RemoteErrorKind, RetryPolicies, SystemClock};
use futures_util::TryStreamExt;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, instrument, warn};
use ulid::Ulid;

use crate::backend::{MessageHandle, QueueBackend, RawMessage};
use crate::checkout::{CheckoutTable, Delivery};
use crate::types::{Envelope, MessageKey, MessageWrapper, PersistedEntry, PersistedMessage, ENVELOPE_OVERHEAD};
use crate::{QueueConfig, QueueError, QueueResult};

/// Queue message lifecycle manager.
///
/// Callers put and get plain values. Payloads too large for the queue are
/// parked in blob storage behind a small wrapper; messages delivered too many
/// times are quarantined; every delivery is remembered so the caller can
/// dispose of it by handing back the value (`delete`, `abandon`, `persist`).
///
/// Checked-out messages are abandoned on [`shutdown`](Self::shutdown), or
/// in the background when the adapter is dropped inside a tokio runtime.
pub struct QueueAdapter<S: DataSerializer = JsonSerializer> {
    backend: Arc<dyn QueueBackend>,
    blobs: BlobAdapter<S>,
    serializer: S,
    config: QueueConfig,
    clock: Arc<dyn Clock>,
    checkout: CheckoutTable,
}

impl<S: DataSerializer> QueueAdapter<S> {
    /// Create a queue adapter storing overflow and persisted messages through
    /// `blobs`, whose serializer is used for message values too.
    pub fn new(backend: Arc<dyn QueueBackend>, blobs: BlobAdapter<S>) -> Self {
        let serializer = blobs.serializer().clone();
        Self {
            backend,
            blobs,
            serializer,
            config: QueueConfig::default(),
            clock: Arc::new(SystemClock),
            checkout: CheckoutTable::new(),
        }
    }

    pub fn with_config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Time source for persisted message timestamps and latency.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn blobs(&self) -> &BlobAdapter<S> {
        &self.blobs
    }

    /// Number of distinct values currently checked out.
    pub fn checked_out(&self) -> usize {
        self.checkout.len()
    }

    /// Number of outstanding delivery handles.
    pub fn in_flight_handles(&self) -> usize {
        self.checkout.handle_count()
    }

    fn retry(&self) -> &RetryPolicies {
        &self.config.retry
    }

    // ----- queues -----

    /// Create a queue. Returns `false` if it already existed.
    #[instrument(skip(self))]
    pub async fn create_queue(&self, queue: &str) -> QueueResult<bool> {
        let result = self
            .retry()
            .slow_instantiation("queue.create", || self.backend.create_queue(queue))
            .await;
        match result {
            Ok(()) => {
                info!("Created queue {}", queue);
                Ok(true)
            }
            Err(err) if err.is_conflict() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Delete a queue and its overflow blobs. Returns `false` if the queue did not exist.
    #[instrument(skip(self))]
    pub async fn delete_queue(&self, queue: &str) -> QueueResult<bool> {
        let result = self
            .retry()
            .transient("queue.delete", || self.backend.delete_queue(queue))
            .await;
        let deleted = match result {
            Ok(()) => true,
            Err(err) if err.is_not_found() => false,
            Err(err) => return Err(err.into()),
        };

        self.checkout.forget_queue(queue);
        let removed = self.remove_overflow_blobs(queue).await?;
        info!(queue, overflow_blobs = removed, deleted, "Deleted queue");
        Ok(deleted)
    }

    /// Remove every message from `queue`, along with its overflow blobs.
    #[instrument(skip(self))]
    pub async fn clear(&self, queue: &str) -> QueueResult<()> {
        let result = self
            .retry()
            .transient("queue.clear", || self.backend.clear(queue))
            .await;
        match result {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }

        self.checkout.forget_queue(queue);
        let removed = self.remove_overflow_blobs(queue).await?;
        info!(queue, overflow_blobs = removed, "Cleared queue");
        Ok(())
    }

    /// Queue names starting with `prefix`.
    pub async fn list(&self, prefix: &str) -> QueueResult<Vec<String>> {
        Ok(self
            .retry()
            .transient("queue.list", || self.backend.list_queues(prefix))
            .await?)
    }

    /// Messages in the queue, visible or not. Missing queues count as empty.
    pub async fn approximate_count(&self, queue: &str) -> QueueResult<usize> {
        let result = self
            .retry()
            .transient("queue.count", || self.backend.approximate_count(queue))
            .await;
        match result {
            Ok(count) => Ok(count),
            Err(err) if err.is_not_found() => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    /// Age of the oldest visible message, `None` when nothing is waiting.
    pub async fn approximate_latency(&self, queue: &str) -> QueueResult<Option<chrono::Duration>> {
        let result = self
            .retry()
            .transient("queue.peek", || self.backend.peek_oldest(queue))
            .await;
        match result {
            Ok(Some(inserted_at)) => {
                let age = self.clock.now() - inserted_at;
                Ok(Some(age.max(chrono::Duration::zero())))
            }
            Ok(None) => Ok(None),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    // ----- put -----

    /// Enqueue a value, creating the queue if needed.
    #[instrument(skip(self, value))]
    pub async fn put<T>(&self, queue: &str, value: &T) -> QueueResult<()>
    where
        T: Serialize + ?Sized + Sync,
    {
        let payload = self.serializer.serialize(value)?;
        self.put_payload(queue, Bytes::from(payload)).await
    }

    pub async fn put_range<T>(&self, queue: &str, values: &[T]) -> QueueResult<()>
    where
        T: Serialize + Sync,
    {
        for value in values {
            self.put(queue, value).await?;
        }
        Ok(())
    }

    async fn put_payload(&self, queue: &str, payload: Bytes) -> QueueResult<()> {
        let max = self.config.max_message_bytes;
        if ENVELOPE_OVERHEAD + payload.len() <= max {
            return self.enqueue_raw(queue, Envelope::encode_inline(&payload)).await;
        }

        let wrapper = MessageWrapper {
            container_name: self.config.overflow_container.clone(),
            blob_name: unique_blob_name(queue),
        };
        let raw = Envelope::encode_overflow(&wrapper)?;
        if raw.len() > max {
            return Err(QueueError::PayloadTooLarge {
                size: raw.len(),
                max,
            });
        }

        self.blobs
            .put_bytes(&wrapper.container_name, &wrapper.blob_name, payload.clone(), true)
            .await?;
        debug!(
            queue,
            blob = %wrapper.blob_name,
            size = payload.len(),
            "Message overflowed to blob storage"
        );

        if let Err(err) = self.enqueue_raw(queue, raw).await {
            self.delete_overflow(&wrapper).await;
            return Err(err);
        }
        Ok(())
    }

    async fn enqueue_raw(&self, queue: &str, raw: Bytes) -> QueueResult<()> {
        let result = self
            .retry()
            .transient("queue.put", || self.backend.put_message(queue, raw.clone()))
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.kind == RemoteErrorKind::QueueNotFound => {
                debug!("Queue {} missing on put, creating it", queue);
                self.create_queue(queue).await?;
                self.retry()
                    .transient("queue.put", || self.backend.put_message(queue, raw.clone()))
                    .await?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    // ----- get -----

    /// Receive up to `count` values, hiding them for `visibility_timeout`.
    ///
    /// Messages delivered more than `max_dequeue_trials` times are moved to
    /// the poison store instead of being returned. A missing queue yields an
    /// empty batch. Deliveries are checked out under the serialized form of
    /// the returned value, which is what the dispositions look up.
    ///
    /// Nothing is checked out when the call fails: messages of the batch that
    /// were not quarantined or dropped are abandoned before the error is
    /// returned.
    #[instrument(skip(self))]
    pub async fn get<T>(
        &self,
        queue: &str,
        count: usize,
        visibility_timeout: Duration,
        max_dequeue_trials: u32,
    ) -> QueueResult<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        if count == 0 {
            return Ok(Vec::new());
        }

        let result = self
            .retry()
            .transient("queue.get", || {
                self.backend.get_messages(queue, count, visibility_timeout)
            })
            .await;
        let messages = match result {
            Ok(messages) => messages,
            Err(err) if err.is_not_found() => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let handles: Vec<MessageHandle> = messages.iter().map(|m| m.handle.clone()).collect();
        let mut ready = Vec::with_capacity(messages.len());
        let mut settled = HashSet::new();
        if let Err(err) = self
            .resolve_batch(queue, messages, max_dequeue_trials, &mut ready, &mut settled)
            .await
        {
            self.release_unsettled(queue, &handles, &settled).await;
            return Err(err);
        }

        let mut values = Vec::with_capacity(ready.len());
        for (key, delivery, value) in ready {
            self.checkout.register(key, delivery);
            values.push(value);
        }
        Ok(values)
    }

    /// Sort a received batch into values for the caller, quarantining or
    /// dropping the rest. Ids of quarantined and dropped messages go to
    /// `settled`.
    async fn resolve_batch<T>(
        &self,
        queue: &str,
        messages: Vec<RawMessage>,
        max_dequeue_trials: u32,
        ready: &mut Vec<(MessageKey, Delivery, T)>,
        settled: &mut HashSet<String>,
    ) -> QueueResult<()>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut deferred = Vec::new();

        for message in messages {
            let id = message.handle.message_id.clone();
            if message.dequeue_count > max_dequeue_trials {
                let reason = format!(
                    "dequeued {} times, more than the {} allowed",
                    message.dequeue_count, max_dequeue_trials
                );
                self.quarantine(queue, message, reason).await?;
                settled.insert(id);
                continue;
            }

            let envelope = match Envelope::decode(&message.payload) {
                Ok(envelope) => envelope,
                Err(err) => {
                    self.quarantine(queue, message, err.to_string()).await?;
                    settled.insert(id);
                    continue;
                }
            };

            match envelope {
                Envelope::Inline(payload) => match self.serializer.deserialize::<T>(&payload) {
                    Ok(value) => {
                        let key = MessageKey::of(&self.serializer, &value)?;
                        ready.push((key, Self::delivery(queue, &message, None), value));
                    }
                    Err(err) => {
                        let reason = format!("payload does not deserialize: {}", err);
                        self.quarantine(queue, message, reason).await?;
                        settled.insert(id);
                    }
                },
                Envelope::Overflow(wrapper) => deferred.push((message, wrapper)),
            }
        }

        for (message, wrapper) in deferred {
            let id = message.handle.message_id.clone();
            let blob = self
                .blobs
                .get_bytes(&wrapper.container_name, &wrapper.blob_name)
                .await?;
            let payload = match blob {
                Some(blob) => blob.value,
                None => {
                    warn!(
                        queue,
                        blob = %wrapper.blob_name,
                        "Overflow blob is missing, dropping message"
                    );
                    self.delete_raw(queue, &message.handle).await?;
                    settled.insert(id);
                    continue;
                }
            };

            match self.serializer.deserialize::<T>(&payload) {
                Ok(value) => {
                    let key = MessageKey::of(&self.serializer, &value)?;
                    ready.push((key, Self::delivery(queue, &message, Some(wrapper)), value));
                }
                Err(err) => {
                    let reason = format!("payload does not deserialize: {}", err);
                    self.quarantine(queue, message, reason).await?;
                    settled.insert(id);
                }
            }
        }

        Ok(())
    }

    /// Failures are logged; those messages reappear after their visibility
    /// timeout instead.
    async fn release_unsettled(&self, queue: &str, handles: &[MessageHandle], settled: &HashSet<String>) {
        for handle in handles.iter().filter(|h| !settled.contains(&h.message_id)) {
            if let Err(err) = self.abandon_handle(queue, handle).await {
                warn!(queue, message_id = %handle.message_id, "Failed to hand back message: {}", err);
            }
        }
    }

    fn delivery(queue: &str, message: &RawMessage, overflow: Option<MessageWrapper>) -> Delivery {
        Delivery {
            queue: queue.to_string(),
            handle: message.handle.clone(),
            overflow,
            dequeue_count: message.dequeue_count,
            inserted_at: message.inserted_at,
        }
    }

    // ----- dispositions -----

    /// Delete a checked-out value from its queue. Returns `false` when the
    /// value is not checked out or its handle went stale.
    #[instrument(skip(self, value))]
    pub async fn delete<T>(&self, value: &T) -> QueueResult<bool>
    where
        T: Serialize + ?Sized + Sync,
    {
        let key = MessageKey::of(&self.serializer, value)?;
        let delivery = match self.checkout.take(&key) {
            Some(delivery) => delivery,
            None => {
                debug!("Delete of a value that is not checked out, ignoring");
                return Ok(false);
            }
        };

        let deleted = self.delete_raw(&delivery.queue, &delivery.handle).await?;
        if deleted {
            if let Some(wrapper) = &delivery.overflow {
                self.delete_overflow(wrapper).await;
            }
        } else {
            warn!(queue = %delivery.queue, "Delete with a stale handle, message will be redelivered");
        }
        Ok(deleted)
    }

    pub async fn delete_range<T>(&self, values: &[T]) -> QueueResult<usize>
    where
        T: Serialize + Sync,
    {
        let mut deleted = 0;
        for value in values {
            if self.delete(value).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Make a checked-out value visible again right away. Its overflow blob
    /// is kept for the next delivery.
    #[instrument(skip(self, value))]
    pub async fn abandon<T>(&self, value: &T) -> QueueResult<bool>
    where
        T: Serialize + ?Sized + Sync,
    {
        let key = MessageKey::of(&self.serializer, value)?;
        match self.checkout.take(&key) {
            Some(delivery) => self.abandon_delivery(&delivery).await,
            None => {
                debug!("Abandon of a value that is not checked out, ignoring");
                Ok(false)
            }
        }
    }

    pub async fn abandon_range<T>(&self, values: &[T]) -> QueueResult<usize>
    where
        T: Serialize + Sync,
    {
        let mut abandoned = 0;
        for value in values {
            if self.abandon(value).await? {
                abandoned += 1;
            }
        }
        Ok(abandoned)
    }

    /// Abandon every checked-out message. Failures are logged and skipped;
    /// those messages reappear once their visibility timeout lapses.
    pub async fn abandon_all(&self) -> QueueResult<usize> {
        let deliveries = self.checkout.drain();
        let mut abandoned = 0;
        for delivery in &deliveries {
            match self.abandon_delivery(delivery).await {
                Ok(true) => abandoned += 1,
                Ok(false) => {}
                Err(err) => warn!(queue = %delivery.queue, "Failed to abandon message: {}", err),
            }
        }
        if !deliveries.is_empty() {
            info!(abandoned, total = deliveries.len(), "Abandoned checked-out messages");
        }
        Ok(abandoned)
    }

    async fn abandon_delivery(&self, delivery: &Delivery) -> QueueResult<bool> {
        self.abandon_handle(&delivery.queue, &delivery.handle).await
    }

    async fn abandon_handle(&self, queue: &str, handle: &MessageHandle) -> QueueResult<bool> {
        let result = self
            .retry()
            .transient("queue.abandon", || {
                self.backend.update_visibility(queue, handle, Duration::ZERO)
            })
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => {
                warn!(queue, "Abandon with a stale handle");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Push back the reappearance of a checked-out value by `extension`.
    pub async fn keep_alive<T>(&self, value: &T, extension: Duration) -> QueueResult<bool>
    where
        T: Serialize + ?Sized + Sync,
    {
        let key = MessageKey::of(&self.serializer, value)?;
        let delivery = match self.checkout.latest(&key) {
            Some(delivery) => delivery,
            None => return Ok(false),
        };

        let result = self
            .retry()
            .transient("queue.keep_alive", || {
                self.backend
                    .update_visibility(&delivery.queue, &delivery.handle, extension)
            })
            .await;
        match result {
            Ok(handle) => Ok(self.checkout.replace_handle(&key, &delivery.handle, handle)),
            Err(err) if err.is_not_found() => {
                warn!(queue = %delivery.queue, "Keep-alive with a stale handle, forgetting it");
                self.checkout.take_exact(&key, &delivery.handle);
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Move a checked-out value out of its queue into the persisted `store`.
    #[instrument(skip(self, value))]
    pub async fn persist<T>(&self, value: &T, store: &str, reason: &str) -> QueueResult<bool>
    where
        T: Serialize + ?Sized + Sync,
    {
        let key = MessageKey::of(&self.serializer, value)?;
        let delivery = match self.checkout.take(&key) {
            Some(delivery) => delivery,
            None => {
                debug!("Persist of a value that is not checked out, ignoring");
                return Ok(false);
            }
        };

        let persisted = PersistedMessage {
            queue_name: delivery.queue.clone(),
            inserted_at: delivery.inserted_at,
            persisted_at: self.clock.now(),
            dequeue_count: delivery.dequeue_count,
            reason: reason.to_string(),
            payload: key.as_bytes().to_vec(),
        };
        let persisted_key = self.store_persisted(store, &persisted).await?;

        if !self.delete_raw(&delivery.queue, &delivery.handle).await? {
            // the message stays on the queue, so the stored copy must not
            self.blobs
                .delete_blob(
                    &self.config.persisted_container,
                    &Self::persisted_name(store, &persisted_key),
                )
                .await?;
            warn!(queue = %delivery.queue, "Persist with a stale handle, message will be redelivered");
            return Ok(false);
        }
        if let Some(wrapper) = &delivery.overflow {
            self.delete_overflow(wrapper).await;
        }

        info!(queue = %delivery.queue, store, key = %persisted_key, "Persisted message");
        Ok(true)
    }

    pub async fn persist_range<T>(&self, values: &[T], store: &str, reason: &str) -> QueueResult<usize>
    where
        T: Serialize + Sync,
    {
        let mut persisted = 0;
        for value in values {
            if self.persist(value, store, reason).await? {
                persisted += 1;
            }
        }
        Ok(persisted)
    }

    // ----- persisted stores -----

    /// Keys of the messages held in the persisted `store`.
    pub async fn list_persisted(&self, store: &str) -> QueueResult<Vec<String>> {
        let prefix = format!("{}/", store);
        let names: Vec<String> = self
            .blobs
            .list_blob_names(&self.config.persisted_container, &prefix)
            .map_ok(|name| name[prefix.len()..].to_string())
            .try_collect()
            .await?;
        Ok(names)
    }

    pub async fn get_persisted(&self, store: &str, key: &str) -> QueueResult<Option<PersistedEntry>> {
        let name = Self::persisted_name(store, key);
        match self
            .blobs
            .get_bytes(&self.config.persisted_container, &name)
            .await?
        {
            Some(blob) => Ok(Some(PersistedEntry {
                store: store.to_string(),
                key: key.to_string(),
                message: PersistedMessage::from_record(&blob.value)?,
            })),
            None => Ok(None),
        }
    }

    pub async fn delete_persisted(&self, store: &str, key: &str) -> QueueResult<bool> {
        let name = Self::persisted_name(store, key);
        Ok(self
            .blobs
            .delete_blob(&self.config.persisted_container, &name)
            .await?)
    }

    /// Put a persisted message back on its original queue, then drop it from
    /// the store. Returns `false` if there was no such message.
    #[instrument(skip(self))]
    pub async fn restore_persisted(&self, store: &str, key: &str) -> QueueResult<bool> {
        let entry = match self.get_persisted(store, key).await? {
            Some(entry) => entry,
            None => return Ok(false),
        };

        let queue = entry.message.queue_name;
        self.put_payload(&queue, Bytes::from(entry.message.payload))
            .await?;
        self.delete_persisted(store, key).await?;
        info!(queue = %queue, store, key, "Restored persisted message");
        Ok(true)
    }

    /// Decode a persisted message's value with this adapter's serializer.
    pub fn persisted_value<T: DeserializeOwned>(&self, message: &PersistedMessage) -> QueueResult<T> {
        message.value(&self.serializer)
    }

    // ----- lifecycle -----

    /// Abandon everything still checked out. Call before letting go of the
    /// adapter to hand messages back without waiting for their timeouts.
    pub async fn shutdown(&self) -> QueueResult<usize> {
        self.abandon_all().await
    }

    // ----- internals -----

    async fn quarantine(&self, queue: &str, message: RawMessage, reason: String) -> QueueResult<()> {
        let (payload, overflow) = match Envelope::decode(&message.payload) {
            Ok(Envelope::Inline(payload)) => (payload, None),
            Ok(Envelope::Overflow(wrapper)) => {
                match self
                    .blobs
                    .get_bytes(&wrapper.container_name, &wrapper.blob_name)
                    .await?
                {
                    Some(blob) => (blob.value, Some(wrapper)),
                    None => (message.payload.clone(), None),
                }
            }
            Err(_) => (message.payload.clone(), None),
        };

        let store = self.config.poison_store.clone();
        let persisted = PersistedMessage {
            queue_name: queue.to_string(),
            inserted_at: message.inserted_at,
            persisted_at: self.clock.now(),
            dequeue_count: message.dequeue_count,
            reason,
            payload: payload.to_vec(),
        };
        let key = self.store_persisted(&store, &persisted).await?;

        if self.delete_raw(queue, &message.handle).await? {
            if let Some(wrapper) = &overflow {
                self.delete_overflow(wrapper).await;
            }
        }

        warn!(
            queue,
            store = %store,
            key = %key,
            dequeue_count = message.dequeue_count,
            "Quarantined poison message: {}",
            persisted.reason
        );
        Ok(())
    }

    async fn store_persisted(&self, store: &str, message: &PersistedMessage) -> QueueResult<String> {
        let key = Ulid::new().to_string();
        let name = Self::persisted_name(store, &key);
        self.blobs
            .put_bytes(
                &self.config.persisted_container,
                &name,
                Bytes::from(message.to_record()?),
                true,
            )
            .await?;
        Ok(key)
    }

    fn persisted_name(store: &str, key: &str) -> String {
        format!("{}/{}", store, key)
    }

    /// Returns `false` when the handle is stale or the queue is gone.
    async fn delete_raw(&self, queue: &str, handle: &MessageHandle) -> QueueResult<bool> {
        let result = self
            .retry()
            .transient("queue.delete_message", || self.backend.delete_message(queue, handle))
            .await;
        match result {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Best effort: an orphaned overflow blob only costs storage.
    async fn delete_overflow(&self, wrapper: &MessageWrapper) {
        if let Err(err) = self
            .blobs
            .delete_blob(&wrapper.container_name, &wrapper.blob_name)
            .await
        {
            warn!(blob = %wrapper.blob_name, "Failed to delete overflow blob: {}", err);
        }
    }

    async fn remove_overflow_blobs(&self, queue: &str) -> QueueResult<usize> {
        let container = &self.config.overflow_container;
        let names = self
            .blobs
            .list_blob_names_all(container, &format!("{}/", queue))
            .await?;
        let mut removed = 0;
        for name in names {
            if self.blobs.delete_blob(container, &name).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl<S: DataSerializer> Drop for QueueAdapter<S> {
    fn drop(&mut self) {
        if self.checkout.is_empty() {
            return;
        }
        let deliveries = self.checkout.drain();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(
                    count = deliveries.len(),
                    "Queue adapter dropped with checked-out messages, abandoning them"
                );
                let backend = Arc::clone(&self.backend);
                let retry = self.config.retry.clone();
                runtime.spawn(async move {
                    for delivery in deliveries {
                        let result = retry
                            .transient("queue.abandon", || {
                                backend.update_visibility(
                                    &delivery.queue,
                                    &delivery.handle,
                                    Duration::ZERO,
                                )
                            })
                            .await;
                        if let Err(err) = result {
                            debug!(queue = %delivery.queue, "Abandon on drop failed: {}", err);
                        }
                    }
                });
            }
            Err(_) => warn!(
                count = deliveries.len(),
                "Queue adapter dropped outside a runtime; checked-out messages reappear after their visibility timeout"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryQueueBackend;
    use cirrus_blob::{BlobConfig, MemoryBlobStore};
    use cirrus_core::ManualClock;
    use tracing_test::traced_test;

    fn adapter() -> (ManualClock, Arc<MemoryQueueBackend>, QueueAdapter) {
        let clock = ManualClock::starting_now();
        let backend = Arc::new(MemoryQueueBackend::new().with_clock(Arc::new(clock.clone())));
        let blobs = BlobAdapter::new(MemoryBlobStore::new())
            .with_config(BlobConfig::new().with_retry(RetryPolicies::immediate()));
        let queues = QueueAdapter::new(backend.clone(), blobs)
            .with_config(QueueConfig::new().with_retry(RetryPolicies::immediate()))
            .with_clock(Arc::new(clock.clone()));
        (clock, backend, queues)
    }

    #[tokio::test]
    #[traced_test]
    async fn poison_quarantine_is_logged() {
        let (clock, _, queues) = adapter();
        queues.put("jobs", "boom").await.unwrap();

        let first: Vec<String> = queues.get("jobs", 1, Duration::from_secs(1), 1).await.unwrap();
        assert_eq!(first.len(), 1);
        clock.advance(chrono::Duration::seconds(2));

        let second: Vec<String> = queues.get("jobs", 1, Duration::from_secs(1), 1).await.unwrap();
        assert!(second.is_empty());
        assert!(logs_contain("Quarantined poison message"));
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_overflow_blob_is_logged() {
        let (_, _, queues) = adapter();
        queues.put("jobs", &"p".repeat(7_000)).await.unwrap();
        let container = queues.config().overflow_container.clone();
        for name in queues.blobs().list_blob_names_all(&container, "jobs/").await.unwrap() {
            queues.blobs().delete_blob(&container, &name).await.unwrap();
        }

        let got: Vec<String> = queues.get("jobs", 1, Duration::from_secs(30), 5).await.unwrap();
        assert!(got.is_empty());
        assert!(logs_contain("Overflow blob is missing"));
    }

    #[tokio::test]
    async fn undecodable_messages_are_quarantined() {
        let (_, backend, queues) = adapter();
        backend.create_queue("jobs").await.unwrap();
        backend
            .put_message("jobs", Bytes::from_static(&[0x42, 0x42]))
            .await
            .unwrap();

        let got: Vec<String> = queues.get("jobs", 1, Duration::from_secs(30), 5).await.unwrap();
        assert!(got.is_empty());
        assert_eq!(backend.message_count("jobs"), 0);
        assert_eq!(queues.list_persisted("failing-messages").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn oversized_wrapper_is_rejected_before_any_write() {
        let (_, backend, queues) = adapter();
        let queues = queues.with_config(
            QueueConfig::new()
                .with_max_message_bytes(8)
                .with_retry(RetryPolicies::immediate()),
        );

        let err = queues.put("jobs", "far too long for eight bytes").await.unwrap_err();
        assert!(matches!(err, QueueError::PayloadTooLarge { .. }));
        assert_eq!(backend.message_count("jobs"), 0);
        assert!(queues
            .blobs()
            .list_containers("")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn overflow_delivery_is_keyed_by_value() {
        let (_, _, queues) = adapter();
        let big = "r".repeat(7_000);
        queues.put("jobs", &big).await.unwrap();

        let _: Vec<String> = queues.get("jobs", 1, Duration::from_secs(30), 5).await.unwrap();
        let key = MessageKey::of(&JsonSerializer, &big).unwrap();
        let delivery = queues.checkout.latest(&key).unwrap();
        assert!(delivery.overflow.is_some());
        assert_eq!(queues.checked_out(), 1);
    }
}
