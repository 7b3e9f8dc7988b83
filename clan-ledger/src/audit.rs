//! Per-clan hash chain over ledger entries
//!
//! Every entry commits to its own contents and to the hash of the clan's
//! previous entry. Reconciliation walks the chain to detect edited or
//! missing history.

use sha2::{Digest, Sha256};

use crate::types::PointsLedgerEntry;

/// Chain head before the first entry
pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// SHA-256 over the entry contents and `prev_hash` (not `entry_hash`)
pub fn entry_digest(entry: &PointsLedgerEntry) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(entry.entry_id.as_bytes());
    hasher.update(entry.clan_id.to_key());
    hasher.update(entry.sequence.to_be_bytes());
    hasher.update((entry.war_id.as_str().len() as u64).to_be_bytes());
    hasher.update(entry.war_id.as_str().as_bytes());
    match entry.opponent_clan_id {
        Some(opponent) => {
            hasher.update([1u8]);
            hasher.update(opponent.to_key());
        }
        None => hasher.update([0u8]),
    }
    hasher.update(entry.points_change.to_be_bytes());
    hasher.update(entry.points_before.to_be_bytes());
    hasher.update(entry.points_after.to_be_bytes());
    hasher.update([entry.reason as u8]);
    match &entry.note {
        Some(note) => {
            hasher.update([1u8]);
            hasher.update((note.len() as u64).to_be_bytes());
            hasher.update(note.as_bytes());
        }
        None => hasher.update([0u8]),
    }
    hasher.update(entry.created_at.timestamp_micros().to_be_bytes());
    hasher.update(entry.prev_hash);

    hasher.finalize().into()
}

/// Link an entry to `prev_hash` and fill in its own hash
pub fn seal(entry: &mut PointsLedgerEntry, prev_hash: [u8; 32]) {
    entry.prev_hash = prev_hash;
    entry.entry_hash = entry_digest(entry);
}

/// Check a clan's history, oldest first, from genesis to the end
pub fn verify_chain(entries: &[PointsLedgerEntry]) -> bool {
    let mut expected_prev = GENESIS_HASH;
    for (index, entry) in entries.iter().enumerate() {
        if entry.sequence != index as u64 + 1
            || entry.prev_hash != expected_prev
            || entry.entry_hash != entry_digest(entry)
        {
            tracing::warn!(
                clan_id = %entry.clan_id,
                sequence = entry.sequence,
                entry_hash = %hex::encode(entry.entry_hash),
                "Ledger chain broken"
            );
            return false;
        }
        expected_prev = entry.entry_hash;
    }
    true
}
