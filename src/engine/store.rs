use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::model::*;
use crate::wal::Wal;

use super::StoreError;

/// Order in which the reference column is scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    /// First match wins.
    TopDown,
    /// Last match wins.
    BottomUp,
}

/// The ordered booking table as seen by the engine.
///
/// Implementations keep each call internally consistent but promise nothing
/// across calls; the engine's exclusion lock supplies that.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn append_record(&self, record: BookingRecord) -> Result<(), StoreError>;

    async fn read_all_records(&self) -> Result<Vec<BookingRecord>, StoreError>;

    async fn read_row(&self, index: usize) -> Result<Option<BookingRecord>, StoreError>;

    async fn overwrite_field(&self, index: usize, update: FieldUpdate) -> Result<(), StoreError>;

    async fn delete_row_at_index(&self, index: usize) -> Result<(), StoreError>;

    async fn find_row_index_by_reference(
        &self,
        reference: &str,
        direction: ScanDirection,
    ) -> Result<Option<usize>, StoreError> {
        let rows = self.read_all_records().await?;
        let matches = |r: &BookingRecord| r.reference == reference;
        Ok(match direction {
            ScanDirection::TopDown => rows.iter().position(matches),
            ScanDirection::BottomUp => rows.iter().rposition(matches),
        })
    }
}

fn check_index(rows: &[BookingRecord], index: usize) -> Result<(), StoreError> {
    if index >= rows.len() {
        return Err(StoreError::RowOutOfRange {
            index,
            len: rows.len(),
        });
    }
    Ok(())
}

/// Apply a row event to the table. The caller has already range-checked it.
fn apply_event(rows: &mut Vec<BookingRecord>, event: RowEvent) {
    match event {
        RowEvent::RowAppended { record } => rows.push(record),
        RowEvent::FieldOverwritten { index, update } => {
            if let Some(row) = rows.get_mut(index) {
                row.apply(update);
            }
        }
        RowEvent::RowDeleted { index } => {
            if index < rows.len() {
                rows.remove(index);
            }
        }
    }
}

// ── In-memory ────────────────────────────────────────────

/// Volatile table, for tests and `TABLEBOOK_IN_MEMORY` deployments.
#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<Vec<BookingRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<BookingRecord>) -> Self {
        Self {
            rows: RwLock::new(rows),
        }
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn append_record(&self, record: BookingRecord) -> Result<(), StoreError> {
        self.rows.write().await.push(record);
        Ok(())
    }

    async fn read_all_records(&self) -> Result<Vec<BookingRecord>, StoreError> {
        Ok(self.rows.read().await.clone())
    }

    async fn read_row(&self, index: usize) -> Result<Option<BookingRecord>, StoreError> {
        Ok(self.rows.read().await.get(index).cloned())
    }

    async fn overwrite_field(&self, index: usize, update: FieldUpdate) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        check_index(&rows, index)?;
        apply_event(&mut rows, RowEvent::FieldOverwritten { index, update });
        Ok(())
    }

    async fn delete_row_at_index(&self, index: usize) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        check_index(&rows, index)?;
        apply_event(&mut rows, RowEvent::RowDeleted { index });
        Ok(())
    }
}

// ── WAL-backed ───────────────────────────────────────────

/// Commands for the background writer that owns the WAL.
enum WalCommand {
    Append {
        event: RowEvent,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<RowEvent>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                    .record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                respond_batch(batch, &result);

                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(RowEvent, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even after an append error, so partially buffered bytes
    // don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: Vec<(RowEvent, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let result = wal.append_buffered(&event).and_then(|()| wal.flush_sync());
            let _ = response.send(result);
        }
    }
}

/// Durable table: the in-memory rows plus a write-ahead log of row events.
///
/// Every mutation is logged before it is applied, so a restart replays to
/// the last acknowledged state. The rows are only read from disk at open,
/// so a log has exactly one owner: an exclusive advisory lock on a sibling
/// `.lock` file, held until the store is dropped.
pub struct WalStore {
    rows: RwLock<Vec<BookingRecord>>,
    wal_tx: mpsc::Sender<WalCommand>,
    path: PathBuf,
    _owner: File,
}

/// Take the owner lock for the log at `path`, without waiting.
fn claim_owner(path: &Path) -> Result<File, StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path.with_extension("lock"))?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            Err(StoreError::AlreadyOwned(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

impl WalStore {
    /// Claim the log, replay it (if present) and start the writer task.
    /// Needs a tokio runtime. Fails with `AlreadyOwned` while another
    /// store, in this process or another, has the same log open.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let owner = claim_owner(path)?;
        let events = Wal::replay(path)?;
        let mut rows = Vec::new();
        for event in events {
            apply_event(&mut rows, event);
        }
        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        tracing::info!(path = %path.display(), rows = rows.len(), "booking table loaded");
        Ok(Self {
            rows: RwLock::new(rows),
            wal_tx,
            path: path.to_path_buf(),
            _owner: owner,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn wal_append(&self, event: &RowEvent) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::WriterClosed)?;
        rx.await.map_err(|_| StoreError::WriterClosed)??;
        Ok(())
    }

    /// Log then apply, under the row write lock so log order matches table order.
    async fn persist_and_apply(&self, event: RowEvent) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        match &event {
            RowEvent::FieldOverwritten { index, .. } | RowEvent::RowDeleted { index } => {
                check_index(&rows, *index)?;
            }
            RowEvent::RowAppended { .. } => {}
        }
        self.wal_append(&event).await?;
        apply_event(&mut rows, event);
        Ok(())
    }

    /// Rewrite the WAL as one append per live row.
    pub async fn compact(&self) -> Result<(), StoreError> {
        // Holding the write lock keeps mutations out until the swap is done.
        let rows = self.rows.write().await;
        let events: Vec<RowEvent> = rows
            .iter()
            .map(|r| RowEvent::RowAppended { record: r.clone() })
            .collect();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::WriterClosed)?;
        rx.await.map_err(|_| StoreError::WriterClosed)??;
        drop(rows);
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl BookingStore for WalStore {
    async fn append_record(&self, record: BookingRecord) -> Result<(), StoreError> {
        self.persist_and_apply(RowEvent::RowAppended { record }).await
    }

    async fn read_all_records(&self) -> Result<Vec<BookingRecord>, StoreError> {
        Ok(self.rows.read().await.clone())
    }

    async fn read_row(&self, index: usize) -> Result<Option<BookingRecord>, StoreError> {
        Ok(self.rows.read().await.get(index).cloned())
    }

    async fn overwrite_field(&self, index: usize, update: FieldUpdate) -> Result<(), StoreError> {
        self.persist_and_apply(RowEvent::FieldOverwritten { index, update })
            .await
    }

    async fn delete_row_at_index(&self, index: usize) -> Result<(), StoreError> {
        self.persist_and_apply(RowEvent::RowDeleted { index }).await
    }
}
