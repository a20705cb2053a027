//! # Ledger Journal
//!
//! **Crash-Safe Log of Committed Ledger Mutations**
//!
//! Every administrative change and every batch is written as one journal
//! transaction. On open, committed transactions are replayed to rebuild the
//! registry and the inventory:
//! - Committed transactions: replayed
//! - Rolled back or unterminated transactions: ignored, and an unterminated
//!   tail is cut off the file
//!
//! ## Format
//!
//! ```text
//! [4 bytes: magic "CHJL"]
//! [4 bytes: version]
//! [8 bytes: LSN at last checkpoint]
//!
//! Entry format:
//! [8 bytes: LSN (Log Sequence Number)]
//! [1 byte: record type (BEGIN/OP/COMMIT/ROLLBACK)]
//! [4 bytes: payload length]
//! [N bytes: payload (encoded operation)]
//! [4 bytes: CRC32 of above]
//! ```
//!
//! A checkpoint rewrites the file as a single transaction holding the two
//! tables: whitelist rows followed by holding rows.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{Address, U256};
use chest_shared::{AssetId, AssetKind, ItemId, Quantity};
use parking_lot::Mutex;

use crate::error::{LedgerError, LedgerResult};

/// Magic bytes identifying a journal file.
const JOURNAL_MAGIC: &[u8; 4] = b"CHJL";

/// Current journal format version.
const JOURNAL_VERSION: u32 = 1;

/// Size of the file header.
const HEADER_LEN: u64 = 16;

/// Largest payload any record carries (a `Credit` operation).
const MAX_PAYLOAD_LEN: usize = 86;

/// Journal record types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Begin a new transaction.
    Begin = 1,
    /// An operation within a transaction.
    Operation = 2,
    /// Commit the transaction (durable).
    Commit = 3,
    /// Rollback the transaction.
    Rollback = 4,
}

impl RecordType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Begin),
            2 => Some(Self::Operation),
            3 => Some(Self::Commit),
            4 => Some(Self::Rollback),
            _ => None,
        }
    }
}

/// A ledger mutation as stored in the journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JournalOp {
    /// Asset added to the whitelist.
    Whitelist {
        /// Asset contract.
        asset: AssetId,
        /// Its kind.
        kind: AssetKind,
    },
    /// Asset removed from the whitelist.
    Unwhitelist {
        /// Asset contract.
        asset: AssetId,
    },
    /// Quantity credited to a holding.
    Credit {
        /// Asset contract.
        asset: AssetId,
        /// Item.
        item: ItemId,
        /// Amount credited.
        quantity: Quantity,
        /// Kind recorded on the holding.
        kind: AssetKind,
    },
    /// Quantity debited from a holding.
    Debit {
        /// Asset contract.
        asset: AssetId,
        /// Item.
        item: ItemId,
        /// Amount debited.
        quantity: Quantity,
    },
}

impl JournalOp {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MAX_PAYLOAD_LEN);

        match self {
            Self::Whitelist { asset, kind } => {
                buf.push(1); // Type tag
                buf.extend_from_slice(asset.as_slice());
                buf.push(kind.tag());
            }
            Self::Unwhitelist { asset } => {
                buf.push(2);
                buf.extend_from_slice(asset.as_slice());
            }
            Self::Credit {
                asset,
                item,
                quantity,
                kind,
            } => {
                buf.push(3);
                buf.extend_from_slice(asset.as_slice());
                buf.extend_from_slice(&item.to_be_bytes::<32>());
                buf.extend_from_slice(&quantity.to_be_bytes::<32>());
                buf.push(kind.tag());
            }
            Self::Debit {
                asset,
                item,
                quantity,
            } => {
                buf.push(4);
                buf.extend_from_slice(asset.as_slice());
                buf.extend_from_slice(&item.to_be_bytes::<32>());
                buf.extend_from_slice(&quantity.to_be_bytes::<32>());
            }
        }

        buf
    }

    fn decode(data: &[u8]) -> Option<Self> {
        let (&tag, rest) = data.split_first()?;

        match (tag, rest.len()) {
            (1, 21) => Some(Self::Whitelist {
                asset: read_address(&rest[..20])?,
                kind: AssetKind::from_tag(rest[20])?,
            }),
            (2, 20) => Some(Self::Unwhitelist {
                asset: read_address(rest)?,
            }),
            (3, 85) => Some(Self::Credit {
                asset: read_address(&rest[..20])?,
                item: read_u256(&rest[20..52])?,
                quantity: read_u256(&rest[52..84])?,
                kind: AssetKind::from_tag(rest[84])?,
            }),
            (4, 84) => Some(Self::Debit {
                asset: read_address(&rest[..20])?,
                item: read_u256(&rest[20..52])?,
                quantity: read_u256(&rest[52..84])?,
            }),
            _ => None,
        }
    }
}

fn read_address(bytes: &[u8]) -> Option<Address> {
    <[u8; 20]>::try_from(bytes).ok().map(Address::from)
}

fn read_u256(bytes: &[u8]) -> Option<U256> {
    <[u8; 32]>::try_from(bytes).ok().map(U256::from_be_bytes)
}

fn io_error(context: &str) -> impl FnOnce(std::io::Error) -> LedgerError + '_ {
    move |e| LedgerError::Journal(format!("{context}: {e}"))
}

/// A journal record on disk.
#[derive(Clone, Debug)]
pub struct JournalRecord {
    /// Log Sequence Number (unique, monotonic).
    pub lsn: u64,
    /// Record type.
    pub record_type: RecordType,
    /// Payload data.
    pub payload: Vec<u8>,
}

impl JournalRecord {
    fn encode(lsn: u64, record_type: RecordType, payload: &[u8]) -> LedgerResult<Vec<u8>> {
        let payload_len = u32::try_from(payload.len())
            .map_err(|_| LedgerError::Journal("payload too large".to_string()))?;

        let mut buf = Vec::with_capacity(8 + 1 + 4 + payload.len() + 4);
        buf.extend_from_slice(&lsn.to_le_bytes());
        buf.push(record_type as u8);
        buf.extend_from_slice(&payload_len.to_le_bytes());
        buf.extend_from_slice(payload);

        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Size of this record on disk.
    fn encoded_len(&self) -> u64 {
        (8 + 1 + 4 + self.payload.len() + 4) as u64
    }
}

/// Transaction handle for grouping operations.
pub struct Transaction<'a> {
    /// Reference to the journal.
    journal: &'a Journal,
    /// Transaction ID (LSN of BEGIN record).
    pub txn_id: u64,
    /// Operations in this transaction.
    operations: Vec<JournalOp>,
    /// Whether this transaction has been finalized.
    finalized: bool,
}

impl Transaction<'_> {
    /// Adds an operation to the transaction.
    ///
    /// # Errors
    ///
    /// Returns `Journal` if the transaction is finalized or the write fails.
    pub fn add_operation(&mut self, op: JournalOp) -> LedgerResult<()> {
        if self.finalized {
            return Err(LedgerError::Journal(
                "transaction already finalized".to_string(),
            ));
        }

        self.journal.write_record(RecordType::Operation, &op.encode())?;
        self.operations.push(op);

        Ok(())
    }

    /// Commits the transaction (durable).
    ///
    /// After this returns, the data is guaranteed to be on disk.
    ///
    /// # Errors
    ///
    /// Returns `Journal` if the write or sync fails.
    pub fn commit(mut self) -> LedgerResult<Vec<JournalOp>> {
        if self.finalized {
            return Err(LedgerError::Journal(
                "transaction already finalized".to_string(),
            ));
        }

        self.journal.write_record(RecordType::Commit, &[])?;
        self.journal.sync()?;
        self.finalized = true;

        Ok(std::mem::take(&mut self.operations))
    }

    /// Rolls back the transaction.
    ///
    /// # Errors
    ///
    /// Returns `Journal` if the rollback marker cannot be written.
    pub fn rollback(mut self) -> LedgerResult<()> {
        if self.finalized {
            return Ok(());
        }

        self.finalized = true;
        self.journal.write_record(RecordType::Rollback, &[])?;

        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        // Not committed: mark as rolled back
        if !self.finalized {
            let _ = self.journal.write_record(RecordType::Rollback, &[]);
        }
    }
}

/// Destination for committed batches.
pub trait JournalSink {
    /// Writes `ops` as one committed transaction. Returns its id.
    ///
    /// # Errors
    ///
    /// Returns `Journal` if the transaction could not be made durable.
    fn record(&self, ops: &[JournalOp]) -> LedgerResult<u64>;
}

/// Append-only journal of ledger mutations.
pub struct Journal {
    /// Path to the journal file.
    path: PathBuf,
    /// Next Log Sequence Number.
    current_lsn: AtomicU64,
    /// File handle (protected by mutex for writes).
    file: Mutex<BufWriter<File>>,
}

impl Journal {
    /// Opens or creates a journal.
    ///
    /// Returns the journal together with the committed operations, in
    /// commit order, that rebuild the ledger. An unterminated trailing
    /// transaction is cut off the file.
    ///
    /// # Errors
    ///
    /// Returns `Journal` if the file cannot be opened or its header is
    /// invalid.
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<(Self, Vec<JournalOp>)> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(io_error("failed to open journal"))?;

        let len = file
            .metadata()
            .map_err(io_error("failed to read journal metadata"))?
            .len();

        let mut writer = BufWriter::new(file);
        if len == 0 {
            write_header(&mut writer, 0)?;
            writer.flush().map_err(io_error("failed to flush header"))?;
        }

        let recovered = Self::recover(&path)?;

        if recovered.valid_len < len.max(HEADER_LEN) {
            tracing::warn!(
                "Journal recovery: discarding {} bytes of unterminated tail",
                len - recovered.valid_len
            );
            writer
                .get_ref()
                .set_len(recovered.valid_len)
                .map_err(io_error("failed to truncate journal"))?;
        }

        if recovered.discarded > 0 {
            tracing::warn!(
                "Journal recovery: {} uncommitted transactions rolled back",
                recovered.discarded
            );
        }

        tracing::debug!(
            "Journal opened: {} committed operations, next lsn {}",
            recovered.ops.len(),
            recovered.next_lsn
        );

        let journal = Self {
            path,
            current_lsn: AtomicU64::new(recovered.next_lsn),
            file: Mutex::new(writer),
        };

        Ok((journal, recovered.ops))
    }

    /// Begins a new transaction.
    ///
    /// # Errors
    ///
    /// Returns `Journal` if the begin marker cannot be written.
    pub fn begin_transaction(&self) -> LedgerResult<Transaction<'_>> {
        let lsn = self.write_record(RecordType::Begin, &[])?;

        Ok(Transaction {
            journal: self,
            txn_id: lsn,
            operations: Vec::new(),
            finalized: false,
        })
    }

    /// Writes `ops` as one committed transaction. Returns its id.
    ///
    /// # Errors
    ///
    /// Returns `Journal` if any write fails; the transaction is then rolled
    /// back.
    pub fn record(&self, ops: &[JournalOp]) -> LedgerResult<u64> {
        let mut txn = self.begin_transaction()?;
        let txn_id = txn.txn_id;
        for op in ops {
            txn.add_operation(*op)?;
        }
        txn.commit()?;
        Ok(txn_id)
    }

    /// Rewrites the journal as a single transaction of `ops`.
    ///
    /// Call this with the current tables to compact the log.
    ///
    /// # Errors
    ///
    /// Returns `Journal` if the compacted file cannot be written. The old
    /// file is left in place in that case.
    pub fn compact(&self, ops: &[JournalOp]) -> LedgerResult<()> {
        let mut file = self.file.lock();
        file.flush().map_err(io_error("failed to flush journal"))?;

        let compact_path = self.path.with_extension("compact");
        {
            let mut writer = BufWriter::new(
                File::create(&compact_path).map_err(io_error("failed to create compacted journal"))?,
            );

            let base = self.current_lsn.load(Ordering::SeqCst);
            write_header(&mut writer, base)?;

            let mut lsn = base;
            let mut put = |record_type: RecordType, payload: &[u8]| -> LedgerResult<()> {
                let bytes = JournalRecord::encode(lsn, record_type, payload)?;
                lsn += 1;
                writer
                    .write_all(&bytes)
                    .map_err(io_error("compacted journal write failed"))
            };

            put(RecordType::Begin, &[])?;
            for op in ops {
                put(RecordType::Operation, &op.encode())?;
            }
            put(RecordType::Commit, &[])?;

            self.current_lsn.store(lsn, Ordering::SeqCst);

            writer.flush().map_err(io_error("failed to flush compacted journal"))?;
            writer
                .get_ref()
                .sync_all()
                .map_err(io_error("failed to sync compacted journal"))?;
        }

        fs::rename(&compact_path, &self.path).map_err(io_error("failed to replace journal"))?;

        let reopened = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(io_error("failed to reopen journal"))?;
        *file = BufWriter::new(reopened);

        tracing::info!("Journal compacted: {} table rows", ops.len());
        Ok(())
    }

    /// Writes a record to the journal.
    fn write_record(&self, record_type: RecordType, payload: &[u8]) -> LedgerResult<u64> {
        let lsn = self.current_lsn.fetch_add(1, Ordering::SeqCst);
        let bytes = JournalRecord::encode(lsn, record_type, payload)?;

        let mut file = self.file.lock();
        file.write_all(&bytes)
            .map_err(io_error("journal write failed"))?;

        Ok(lsn)
    }

    /// Syncs the journal to disk.
    fn sync(&self) -> LedgerResult<()> {
        let mut file = self.file.lock();
        file.flush().map_err(io_error("journal sync failed"))?;
        file.get_ref()
            .sync_all()
            .map_err(io_error("journal sync failed"))?;
        Ok(())
    }

    /// Reads the journal and collects committed operations.
    fn recover(path: &Path) -> LedgerResult<Recovered> {
        let file = File::open(path).map_err(io_error("failed to open journal for recovery"))?;
        let mut reader = BufReader::new(file);

        // Read and verify header
        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(io_error("failed to read journal magic"))?;
        if &magic != JOURNAL_MAGIC {
            return Err(LedgerError::Journal("invalid journal magic".to_string()));
        }

        let mut version_bytes = [0u8; 4];
        reader
            .read_exact(&mut version_bytes)
            .map_err(io_error("failed to read journal version"))?;
        let version = u32::from_le_bytes(version_bytes);
        if version != JOURNAL_VERSION {
            return Err(LedgerError::Journal(format!(
                "unsupported journal version: {version}"
            )));
        }

        let mut lsn_bytes = [0u8; 8];
        reader
            .read_exact(&mut lsn_bytes)
            .map_err(io_error("failed to read journal lsn"))?;
        let checkpoint_lsn = u64::from_le_bytes(lsn_bytes);

        let mut recovered = Recovered {
            ops: Vec::new(),
            next_lsn: checkpoint_lsn,
            valid_len: HEADER_LEN,
            discarded: 0,
        };

        // Transactions are serialized: at most one is open at a time
        let mut open: Option<Vec<JournalOp>> = None;
        let mut offset = HEADER_LEN;

        while let Some(record) = Self::read_record(&mut reader) {
            offset += record.encoded_len();
            recovered.next_lsn = recovered.next_lsn.max(record.lsn + 1);

            match record.record_type {
                RecordType::Begin => {
                    if open.replace(Vec::new()).is_some() {
                        recovered.discarded += 1;
                    }
                }
                RecordType::Operation => {
                    let op = JournalOp::decode(&record.payload).ok_or_else(|| {
                        LedgerError::Journal(format!("undecodable operation at lsn {}", record.lsn))
                    })?;
                    match open.as_mut() {
                        Some(ops) => ops.push(op),
                        None => {
                            return Err(LedgerError::Journal(format!(
                                "operation outside transaction at lsn {}",
                                record.lsn
                            )));
                        }
                    }
                }
                RecordType::Commit => {
                    if let Some(ops) = open.take() {
                        recovered.ops.extend(ops);
                    }
                    recovered.valid_len = offset;
                }
                RecordType::Rollback => {
                    open = None;
                    recovered.valid_len = offset;
                }
            }
        }

        if open.is_some() {
            recovered.discarded += 1;
        }

        Ok(recovered)
    }

    /// Reads a single record. `None` at end of file or on a damaged record.
    fn read_record(reader: &mut BufReader<File>) -> Option<JournalRecord> {
        let mut head = [0u8; 13];
        reader.read_exact(&mut head).ok()?;

        let lsn = u64::from_le_bytes(head[0..8].try_into().ok()?);
        let record_type = RecordType::from_u8(head[8])?;
        let payload_len = u32::from_le_bytes(head[9..13].try_into().ok()?) as usize;
        if payload_len > MAX_PAYLOAD_LEN {
            tracing::warn!(
                "Journal recovery: payload of {} bytes at lsn {}",
                payload_len,
                lsn
            );
            return None;
        }

        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload).ok()?;

        let mut crc_bytes = [0u8; 4];
        reader.read_exact(&mut crc_bytes).ok()?;
        let stored_crc = u32::from_le_bytes(crc_bytes);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&head);
        hasher.update(&payload);
        if hasher.finalize() != stored_crc {
            tracing::warn!("Journal recovery: CRC mismatch at lsn {}", lsn);
            return None;
        }

        Some(JournalRecord {
            lsn,
            record_type,
            payload,
        })
    }
}

impl JournalSink for Journal {
    fn record(&self, ops: &[JournalOp]) -> LedgerResult<u64> {
        Journal::record(self, ops)
    }
}

/// Outcome of reading a journal file.
struct Recovered {
    /// Committed operations in order.
    ops: Vec<JournalOp>,
    /// Next LSN to hand out.
    next_lsn: u64,
    /// Byte length of the file up to the last finished transaction.
    valid_len: u64,
    /// Transactions that never finished.
    discarded: usize,
}

fn write_header(writer: &mut impl Write, lsn: u64) -> LedgerResult<()> {
    writer
        .write_all(JOURNAL_MAGIC)
        .map_err(io_error("failed to write magic"))?;
    writer
        .write_all(&JOURNAL_VERSION.to_le_bytes())
        .map_err(io_error("failed to write version"))?;
    writer
        .write_all(&lsn.to_le_bytes())
        .map_err(io_error("failed to write lsn"))?;
    Ok(())
}
