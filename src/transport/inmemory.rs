use std::{
    collections::VecDeque,
    convert::Infallible,
    hash::{Hash, Hasher},
    sync::Arc,
};

use ahash::AHasher;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::{
    PayloadKind,
    transport::{Record, Sender},
};

const DEFAULT_PARTITIONS: usize = 4;

/// A record as stored in a partition of the in-memory log.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub partition: usize,
    pub offset: u64,
    pub key: String,
    pub kind: PayloadKind,
    pub payload: Vec<u8>,
}

impl StoredRecord {
    pub fn position(&self) -> InMemoryPosition {
        InMemoryPosition {
            partition: self.partition,
            offset: self.offset,
        }
    }
}

/// Where a delivered record lives in the in-memory log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InMemoryPosition {
    pub partition: usize,
    pub offset: u64,
}

#[derive(Debug, Default)]
struct Partition {
    records: VecDeque<StoredRecord>,
    next_offset: u64,
    committed: u64,
}

#[derive(Debug)]
struct Log {
    partitions: Vec<Partition>,
    cursor: usize,
}

/// Partitioned in-process log.
///
/// Records are routed to a partition by hashing their key, so everything
/// sent under one key is read back in send order. Reads rotate across
/// partitions. Clones share the same log.
#[derive(Clone)]
pub struct InMemory {
    log: Arc<Mutex<Log>>,
    notify: Arc<Notify>,
}

impl Default for InMemory {
    fn default() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }
}

impl InMemory {
    /// Create a log with `partitions` partitions (at least one).
    pub fn with_partitions(partitions: usize) -> Self {
        let partitions = (0..partitions.max(1)).map(|_| Partition::default()).collect();
        Self {
            log: Arc::new(Mutex::new(Log {
                partitions,
                cursor: 0,
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn partitions(&self) -> usize {
        self.log.lock().partitions.len()
    }

    /// Partition every record sent under `key` ends up in.
    pub fn partition_for(&self, key: &str) -> usize {
        partition_index(key, self.partitions())
    }

    /// Take the next record without waiting.
    pub fn pop(&self) -> Option<StoredRecord> {
        let mut log = self.log.lock();
        let count = log.partitions.len();
        for step in 0..count {
            let index = (log.cursor + step) % count;
            if let Some(record) = log.partitions[index].records.pop_front() {
                log.cursor = (index + 1) % count;
                return Some(record);
            }
        }
        None
    }

    /// Wait for the next record, or `None` once `cancel` fires.
    pub async fn next(&self, cancel: &CancellationToken) -> Option<StoredRecord> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(record) = self.pop() {
                return Some(record);
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = &mut notified => {}
            }
        }
    }

    /// Mark everything up to and including `position` as processed.
    ///
    /// Returns `false` for a position this log never handed out.
    pub fn commit(&self, position: InMemoryPosition) -> bool {
        let mut log = self.log.lock();
        let Some(partition) = log.partitions.get_mut(position.partition) else {
            return false;
        };
        if position.offset >= partition.next_offset {
            return false;
        }
        partition.committed = partition.committed.max(position.offset + 1);
        true
    }

    /// Offset of the next uncommitted record, per partition.
    pub fn committed(&self) -> Vec<u64> {
        self.log
            .lock()
            .partitions
            .iter()
            .map(|p| p.committed)
            .collect()
    }

    /// Records waiting to be read, per partition.
    pub fn backlog(&self) -> Vec<usize> {
        self.log
            .lock()
            .partitions
            .iter()
            .map(|p| p.records.len())
            .collect()
    }

    fn append(&self, records: Vec<Record>) {
        let mut log = self.log.lock();
        let count = log.partitions.len();
        for record in records {
            let index = partition_index(&record.key, count);

            let partition = &mut log.partitions[index];
            let offset = partition.next_offset;
            partition.next_offset += 1;
            partition.records.push_back(StoredRecord {
                partition: index,
                offset,
                key: record.key,
                kind: record.kind,
                payload: record.payload,
            });
        }
    }
}

fn partition_index(key: &str, partitions: usize) -> usize {
    let mut hasher = AHasher::default();
    key.hash(&mut hasher);
    (hasher.finish() % partitions as u64) as usize
}

#[async_trait::async_trait]
impl Sender for InMemory {
    type Error = Infallible;

    #[tracing::instrument(skip_all, fields(records = records.len()))]
    async fn send(&mut self, records: Vec<Record>) -> Result<(), Self::Error> {
        self.append(records);
        self.notify.notify_waiters();
        tracing::trace!("Records appended to in-memory log");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn record(key: &str, n: u8) -> Record {
        Record {
            key: key.into(),
            kind: PayloadKind::SessionDataSync,
            payload: vec![n],
        }
    }

    #[tokio::test]
    async fn same_key_keeps_send_order() {
        let mut log = InMemory::with_partitions(3);
        log.send((0..5).map(|n| record("a", n)).collect())
            .await
            .unwrap();
        log.send(vec![record("b", 9)]).await.unwrap();
        log.send((5..8).map(|n| record("a", n)).collect())
            .await
            .unwrap();

        let mut seen = Vec::new();
        while let Some(stored) = log.pop() {
            if stored.key == "a" {
                assert_eq!(stored.partition, log.partition_for("a"));
                seen.push(stored.payload[0]);
            }
        }
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn offsets_are_dense_per_partition() {
        let mut log = InMemory::with_partitions(1);
        log.send(vec![record("a", 0), record("b", 1)]).await.unwrap();

        assert_eq!(log.pop().unwrap().offset, 0);
        assert_eq!(log.pop().unwrap().offset, 1);
    }

    #[tokio::test]
    async fn commit_only_moves_forward() {
        let mut log = InMemory::with_partitions(1);
        log.send(vec![record("a", 0), record("a", 1)]).await.unwrap();
        let first = log.pop().unwrap();
        let second = log.pop().unwrap();

        assert!(log.commit(second.position()));
        assert!(log.commit(first.position()));
        assert_eq!(log.committed(), vec![2]);

        assert!(!log.commit(InMemoryPosition {
            partition: 0,
            offset: 10
        }));
        assert!(!log.commit(InMemoryPosition {
            partition: 5,
            offset: 0
        }));
    }

    #[tokio::test]
    async fn next_wakes_on_send() {
        let log = InMemory::default();
        let cancel = CancellationToken::new();

        let mut writer = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.send(vec![record("k", 1)]).await.unwrap();
        });

        let stored = tokio::time::timeout(Duration::from_secs(5), log.next(&cancel))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.payload, vec![1]);
    }

    #[tokio::test]
    async fn next_returns_none_when_cancelled() {
        let log = InMemory::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(log.next(&cancel).await.is_none());
    }
}
