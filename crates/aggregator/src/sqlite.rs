use std::str::FromStr;

use async_trait::async_trait;
use num_bigint::BigUint;
use stakepool_core::numeric::parse_decimal;
use stakepool_core::{Outcome, Participant, PoolKey, PoolKind};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::store::{ClaimRecord, ParticipantStore, ParticipantUpdate, StorageError};

/// SQLite-backed participant store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Constructs a [SqliteStore] from an existing [SqlitePool]
    ///
    /// This method applies database migrations
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Connect to `sqlite:path` or `sqlite::memory:`, creating the file if needed.
    pub async fn new(conn_str: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(conn_str)?.create_if_missing(true);
        // An in-memory database exists per connection.
        let max_connections = if conn_str.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Seed a participant row. Used by fixtures and imports.
    pub async fn insert_participant(
        &self,
        kind: PoolKind,
        key: &PoolKey,
        participant: &Participant,
    ) -> Result<(), StorageError> {
        let (penalty_level, completed, duration, session_id) = match &participant.outcome {
            Outcome::Penalty { level } => (Some(*level as i64), None, None, None),
            Outcome::Session {
                completed,
                duration,
                session_id,
            } => (None, Some(*completed), Some(*duration as i64), Some(session_id.clone())),
        };

        sqlx::query(
            "INSERT INTO participants (record_id, kind, day, period, address, stake, penalty_level, completed, duration, session_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&participant.record_id)
        .bind(kind.name())
        .bind(key.day as i64)
        .bind(key.period as i64)
        .bind(&participant.address)
        .bind(participant.stake.to_string())
        .bind(penalty_level)
        .bind(completed)
        .bind(duration)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fetch_claim_records(&self, key: &PoolKey) -> Result<Vec<ClaimRecord>, StorageError> {
        let rows = sqlx::query("SELECT * FROM claims WHERE day = $1 AND period = $2 ORDER BY record_id")
            .bind(key.day as i64)
            .bind(key.period as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_claim).collect()
    }

    /// `(reward, finalized)` for a participant row.
    pub async fn participant_state(&self, record_id: &str) -> Result<Option<(Option<BigUint>, bool)>, StorageError> {
        let res = sqlx::query("SELECT reward, finalized FROM participants WHERE record_id = $1")
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = res else {
            return Ok(None);
        };
        let reward: Option<String> = row.try_get("reward")?;
        let finalized: bool = row.try_get("finalized")?;
        let reward = reward
            .map(|r| decimal(record_id, "reward", &r))
            .transpose()?;
        Ok(Some((reward, finalized)))
    }
}

fn decode_error(record_id: &str, reason: impl Into<String>) -> StorageError {
    StorageError::Decode {
        record_id: record_id.to_string(),
        reason: reason.into(),
    }
}

fn decimal(record_id: &str, field: &str, value: &str) -> Result<BigUint, StorageError> {
    parse_decimal(value).map_err(|_| decode_error(record_id, format!("{field} {value:?} is not a decimal integer")))
}

fn non_negative(record_id: &str, field: &str, value: i64) -> Result<u64, StorageError> {
    u64::try_from(value).map_err(|_| decode_error(record_id, format!("{field} {value} is negative")))
}

fn decode_participant(kind: PoolKind, row: &SqliteRow) -> Result<Participant, StorageError> {
    let record_id: String = row.try_get("record_id")?;
    let address: String = row.try_get("address")?;
    let stake: String = row.try_get("stake")?;
    let stake = decimal(&record_id, "stake", &stake)?;

    let outcome = match kind {
        PoolKind::Penalty => {
            let level: Option<i64> = row.try_get("penalty_level")?;
            let level = level.ok_or_else(|| decode_error(&record_id, "missing penalty level"))?;
            let level = u32::try_from(level)
                .map_err(|_| decode_error(&record_id, format!("penalty level {level} out of range")))?;
            Outcome::Penalty { level }
        }
        PoolKind::Session => {
            let completed: Option<bool> = row.try_get("completed")?;
            let duration: Option<i64> = row.try_get("duration")?;
            let session_id: Option<String> = row.try_get("session_id")?;
            let completed = completed.ok_or_else(|| decode_error(&record_id, "missing completion flag"))?;
            let duration = duration.ok_or_else(|| decode_error(&record_id, "missing duration"))?;
            Outcome::Session {
                completed,
                duration: non_negative(&record_id, "duration", duration)?,
                session_id: session_id.ok_or_else(|| decode_error(&record_id, "missing session id"))?,
            }
        }
    };

    Ok(Participant {
        record_id,
        address,
        stake,
        outcome,
    })
}

fn decode_claim(row: &SqliteRow) -> Result<ClaimRecord, StorageError> {
    let record_id: String = row.try_get("record_id")?;
    let kind: String = row.try_get("kind")?;
    let kind = kind
        .parse::<PoolKind>()
        .map_err(|_| decode_error(&record_id, format!("unknown pool kind {kind:?}")))?;
    let day: i64 = row.try_get("day")?;
    let period: i64 = row.try_get("period")?;
    let period = u8::try_from(period).map_err(|_| decode_error(&record_id, "period out of range"))?;
    let pool_key = PoolKey::new(non_negative(&record_id, "day", day)?, period)
        .map_err(|e| decode_error(&record_id, e.to_string()))?;
    let reward: String = row.try_get("reward")?;
    let proof: String = row.try_get("proof")?;
    let proof: Vec<String> = serde_json::from_str(&proof).map_err(|e| decode_error(&record_id, e.to_string()))?;
    let expiry: i64 = row.try_get("expiry")?;
    let processed_at: i64 = row.try_get("processed_at")?;

    Ok(ClaimRecord {
        kind,
        pool_key,
        identity_key: row.try_get("identity_key")?,
        address: row.try_get("address")?,
        session_id: row.try_get("session_id")?,
        reward: decimal(&record_id, "reward", &reward)?,
        message_hash: row.try_get("message_hash")?,
        signature_r: row.try_get("signature_r")?,
        signature_s: row.try_get("signature_s")?,
        public_key: row.try_get("public_key")?,
        proof,
        expiry: non_negative(&record_id, "expiry", expiry)?,
        processed_at: non_negative(&record_id, "processed_at", processed_at)?,
        record_id,
    })
}

#[async_trait]
impl ParticipantStore for SqliteStore {
    async fn fetch_participants(&self, kind: PoolKind, key: &PoolKey) -> Result<Vec<Participant>, StorageError> {
        tracing::trace!(%kind, %key, "fetching participants");
        let rows = sqlx::query(
            "SELECT * FROM participants WHERE kind = $1 AND day = $2 AND period = $3 ORDER BY record_id",
        )
        .bind(kind.name())
        .bind(key.day as i64)
        .bind(key.period as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| decode_participant(kind, row)).collect()
    }

    async fn fetch_unfinalized_pool_keys(&self, kind: PoolKind) -> Result<Vec<PoolKey>, StorageError> {
        let rows = sqlx::query(
            "SELECT DISTINCT day, period FROM participants WHERE kind = $1 AND finalized = 0 ORDER BY day, period",
        )
        .bind(kind.name())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let day: i64 = row.try_get("day")?;
                let period: i64 = row.try_get("period")?;
                let key = u64::try_from(day)
                    .ok()
                    .zip(u8::try_from(period).ok())
                    .and_then(|(day, period)| PoolKey::new(day, period).ok());
                key.ok_or_else(|| decode_error(&format!("{day}:{period}"), "invalid pool key"))
            })
            .collect()
    }

    async fn update_participant(&self, record_id: &str, update: &ParticipantUpdate) -> Result<(), StorageError> {
        tracing::trace!(record_id, "updating participant");
        let res = sqlx::query("UPDATE participants SET reward = $1, finalized = $2 WHERE record_id = $3")
            .bind(update.reward.to_string())
            .bind(update.finalized)
            .bind(record_id)
            .execute(&self.pool)
            .await?;

        if res.rows_affected() == 0 {
            return Err(StorageError::UnknownRecord(record_id.to_string()));
        }
        Ok(())
    }

    async fn insert_claim_records(&self, records: &[ClaimRecord]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            let proof = serde_json::to_string(&record.proof)
                .map_err(|e| decode_error(&record.record_id, e.to_string()))?;
            sqlx::query(
                "INSERT INTO claims (record_id, day, period, kind, identity_key, address, session_id, reward, \
                 message_hash, signature_r, signature_s, public_key, proof, expiry, processed_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
                 ON CONFLICT (record_id, day, period) DO UPDATE SET \
                 reward = excluded.reward, message_hash = excluded.message_hash, \
                 signature_r = excluded.signature_r, signature_s = excluded.signature_s, \
                 public_key = excluded.public_key, proof = excluded.proof, \
                 expiry = excluded.expiry, processed_at = excluded.processed_at",
            )
            .bind(&record.record_id)
            .bind(record.pool_key.day as i64)
            .bind(record.pool_key.period as i64)
            .bind(record.kind.name())
            .bind(&record.identity_key)
            .bind(&record.address)
            .bind(&record.session_id)
            .bind(record.reward.to_string())
            .bind(&record.message_hash)
            .bind(&record.signature_r)
            .bind(&record.signature_s)
            .bind(&record.public_key)
            .bind(proof)
            .bind(record.expiry as i64)
            .bind(record.processed_at as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
