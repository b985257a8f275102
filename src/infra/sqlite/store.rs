//! SQLite implementation of the tenant, identity, and ledger stores.
//!
//! All invariants with teeth live in SQL, not in process memory:
//! - ledger get-or-create is an `INSERT .. ON CONFLICT DO NOTHING` followed
//!   by a read-back, so the loser of a concurrent first-submission race
//!   observes the winner's row
//! - fraud flags and verdicts are written with `WHERE .. IS NULL` guards,
//!   making both write-once under concurrent verification attempts

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{
    Company, CompanyId, FraudFlag, Game, GameId, Identity, IdentityId, Submission, Transaction,
    TransactionId, Verdict,
};
use crate::infra::{IdentityStore, Result, TenantStore, TransactionLedger, VerifyError};

/// SQLite-backed durable store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a store over an existing connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a database by its sqlite URL, e.g. `sqlite://app.db?mode=rwc`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(url).await?;
        Ok(Self { pool })
    }

    /// In-memory store for tests. Pinned to a single connection so every
    /// query sees the same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await?;
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Run embedded migrations.
    pub async fn initialize(&self) -> Result<()> {
        crate::migrations::run_sqlite(&self.pool)
            .await
            .map_err(|e| VerifyError::Internal(e.to_string()))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl TenantStore for SqliteStore {
    async fn game_by_secret(&self, game_secret: &str) -> Result<Option<Game>> {
        let row = sqlx::query_as::<_, GameRow>(
            "SELECT id, company_id, name, game_secret, created_at FROM games WHERE game_secret = ?",
        )
        .bind(game_secret)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Game::try_from).transpose()
    }

    async fn create_company(&self, name: &str) -> Result<Company> {
        let company = Company {
            id: CompanyId::new(),
            name: name.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO companies (id, name, created_at) VALUES (?, ?, ?)")
            .bind(company.id.0.to_string())
            .bind(&company.name)
            .bind(company.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(company)
    }

    async fn create_game(
        &self,
        company_id: CompanyId,
        name: &str,
        game_secret: &str,
    ) -> Result<Game> {
        let game = Game {
            id: GameId::new(),
            company_id,
            name: name.to_string(),
            game_secret: game_secret.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO games (id, company_id, name, game_secret, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(game.id.0.to_string())
        .bind(game.company_id.0.to_string())
        .bind(&game.name)
        .bind(&game.game_secret)
        .bind(game.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(game)
    }
}

#[async_trait]
impl IdentityStore for SqliteStore {
    async fn resolve_or_create(
        &self,
        game: &Game,
        device_id_a: &str,
        device_id_b: &str,
    ) -> Result<Identity> {
        // Lookup by device_id_b first; a differing device_id_a means the
        // device reset that identifier, so record the new value.
        if let Some(row) = self.identity_by(game.id, "device_id_b", device_id_b).await? {
            let mut identity = Identity::try_from(row)?;
            if identity.device_id_a != device_id_a {
                sqlx::query("UPDATE identities SET device_id_a = ? WHERE id = ?")
                    .bind(device_id_a)
                    .bind(identity.id.0.to_string())
                    .execute(&self.pool)
                    .await?;
                identity.device_id_a = device_id_a.to_string();
            }
            return Ok(identity);
        }

        // Fallback lookup by device_id_a, reconciling device_id_b.
        if let Some(row) = self.identity_by(game.id, "device_id_a", device_id_a).await? {
            let mut identity = Identity::try_from(row)?;
            if identity.device_id_b != device_id_b {
                sqlx::query("UPDATE identities SET device_id_b = ? WHERE id = ?")
                    .bind(device_id_b)
                    .bind(identity.id.0.to_string())
                    .execute(&self.pool)
                    .await?;
                identity.device_id_b = device_id_b.to_string();
            }
            return Ok(identity);
        }

        let identity = Identity {
            id: IdentityId::new(),
            game_id: game.id,
            company_id: game.company_id,
            device_id_a: device_id_a.to_string(),
            device_id_b: device_id_b.to_string(),
            created_at: Utc::now(),
            cheat: None,
        };

        sqlx::query(
            r#"
            INSERT INTO identities (id, game_id, company_id, device_id_a, device_id_b, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(identity.id.0.to_string())
        .bind(identity.game_id.0.to_string())
        .bind(identity.company_id.0.to_string())
        .bind(&identity.device_id_a)
        .bind(&identity.device_id_b)
        .bind(identity.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(identity)
    }

    async fn get(&self, id: IdentityId) -> Result<Option<Identity>> {
        let row = sqlx::query_as::<_, IdentityRow>(
            r#"
            SELECT id, game_id, company_id, device_id_a, device_id_b, created_at,
                   cheat_kind, cheat_at
            FROM identities WHERE id = ?
            "#,
        )
        .bind(id.0.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Identity::try_from).transpose()
    }

    async fn arm_fraud_flag(&self, id: IdentityId, flag: FraudFlag) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE identities SET cheat_kind = ?, cheat_at = ? WHERE id = ? AND cheat_kind IS NULL",
        )
        .bind(flag.kind.code())
        .bind(flag.at.to_rfc3339())
        .bind(id.0.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl SqliteStore {
    async fn identity_by(
        &self,
        game_id: GameId,
        column: &str,
        value: &str,
    ) -> Result<Option<IdentityRow>> {
        // `column` is one of two literals chosen by the caller, never input.
        let query = format!(
            r#"
            SELECT id, game_id, company_id, device_id_a, device_id_b, created_at,
                   cheat_kind, cheat_at
            FROM identities WHERE game_id = ? AND {column} = ?
            "#
        );

        Ok(sqlx::query_as::<_, IdentityRow>(&query)
            .bind(game_id.0.to_string())
            .bind(value)
            .fetch_optional(&self.pool)
            .await?)
    }
}

#[async_trait]
impl TransactionLedger for SqliteStore {
    async fn get_or_create(
        &self,
        game: &Game,
        identity: &Identity,
        submission: &Submission,
    ) -> Result<Transaction> {
        let payload = serde_json::to_string(&submission.raw)
            .map_err(|e| VerifyError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, company_id, game_id, identity_id,
                xact_id, submission_uuid, created_at, client_payload
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(game_id, xact_id, submission_uuid) DO NOTHING
            "#,
        )
        .bind(TransactionId::new().0.to_string())
        .bind(game.company_id.0.to_string())
        .bind(game.id.0.to_string())
        .bind(identity.id.0.to_string())
        .bind(&submission.xact_id)
        .bind(&submission.submission_uuid)
        .bind(Utc::now().to_rfc3339())
        .bind(&payload)
        .execute(&self.pool)
        .await?;

        // Set-once backfill for a pre-existing row that was created without
        // an owner or payload. Populated fields are never overwritten.
        sqlx::query(
            r#"
            UPDATE transactions
            SET identity_id = COALESCE(identity_id, ?),
                client_payload = COALESCE(client_payload, ?)
            WHERE game_id = ? AND xact_id = ? AND submission_uuid = ?
            "#,
        )
        .bind(identity.id.0.to_string())
        .bind(&payload)
        .bind(game.id.0.to_string())
        .bind(&submission.xact_id)
        .bind(&submission.submission_uuid)
        .execute(&self.pool)
        .await?;

        self.get_by_submission(game.id, &submission.xact_id, &submission.submission_uuid)
            .await?
            .ok_or_else(|| {
                VerifyError::Internal(format!(
                    "ledger row vanished after upsert: {}",
                    submission.xact_id
                ))
            })
    }

    async fn read_by_id(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "{SELECT_TRANSACTION} WHERE id = ?"
        ))
        .bind(id.0.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Transaction::try_from).transpose()
    }

    async fn get_by_submission(
        &self,
        game_id: GameId,
        xact_id: &str,
        submission_uuid: &str,
    ) -> Result<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "{SELECT_TRANSACTION} WHERE game_id = ? AND xact_id = ? AND submission_uuid = ?"
        ))
        .bind(game_id.0.to_string())
        .bind(xact_id)
        .bind(submission_uuid)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Transaction::try_from).transpose()
    }

    async fn sibling_with_response(
        &self,
        game_id: GameId,
        xact_id: &str,
        submission_uuid: &str,
    ) -> Result<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"{SELECT_TRANSACTION}
            WHERE game_id = ? AND xact_id = ? AND submission_uuid != ?
              AND platform_response IS NOT NULL
            ORDER BY created_at ASC
            LIMIT 1"#
        ))
        .bind(game_id.0.to_string())
        .bind(xact_id)
        .bind(submission_uuid)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Transaction::try_from).transpose()
    }

    async fn record_platform_answer(
        &self,
        id: TransactionId,
        status: i64,
        response: &serde_json::Value,
    ) -> Result<()> {
        let body = serde_json::to_string(response)
            .map_err(|e| VerifyError::Internal(e.to_string()))?;

        sqlx::query(
            "UPDATE transactions SET platform_status = ?, platform_response = ? WHERE id = ?",
        )
        .bind(status)
        .bind(&body)
        .bind(id.0.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_verdict(&self, id: TransactionId, verdict: Verdict) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE transactions SET local_status = ? WHERE id = ? AND local_status IS NULL",
        )
        .bind(verdict.code())
        .bind(id.0.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_undecided(&self, limit: u32) -> Result<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "{SELECT_TRANSACTION} WHERE local_status IS NULL ORDER BY created_at ASC LIMIT ?"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Transaction::try_from).collect()
    }

    async fn undecided_count(&self) -> Result<u64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM transactions WHERE local_status IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0 as u64)
    }
}

const SELECT_TRANSACTION: &str = r#"
    SELECT id, company_id, game_id, identity_id, xact_id, submission_uuid,
           created_at, client_payload, platform_response, platform_status, local_status
    FROM transactions
"#;

#[derive(Debug, FromRow)]
struct GameRow {
    id: String,
    company_id: String,
    name: String,
    game_secret: String,
    created_at: String,
}

impl TryFrom<GameRow> for Game {
    type Error = VerifyError;

    fn try_from(row: GameRow) -> Result<Self> {
        Ok(Game {
            id: GameId::from_uuid(parse_uuid(&row.id, "games.id")?),
            company_id: CompanyId::from_uuid(parse_uuid(&row.company_id, "games.company_id")?),
            name: row.name,
            game_secret: row.game_secret,
            created_at: parse_ts(&row.created_at, "games.created_at")?,
        })
    }
}

#[derive(Debug, FromRow)]
struct IdentityRow {
    id: String,
    game_id: String,
    company_id: String,
    device_id_a: String,
    device_id_b: String,
    created_at: String,
    cheat_kind: Option<i64>,
    cheat_at: Option<String>,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = VerifyError;

    fn try_from(row: IdentityRow) -> Result<Self> {
        let cheat = match (row.cheat_kind, row.cheat_at) {
            (Some(kind), Some(at)) => Some(FraudFlag {
                kind: Verdict::from_code(kind).ok_or_else(|| {
                    VerifyError::Internal(format!("unknown cheat_kind code: {kind}"))
                })?,
                at: parse_ts(&at, "identities.cheat_at")?,
            }),
            _ => None,
        };

        Ok(Identity {
            id: IdentityId::from_uuid(parse_uuid(&row.id, "identities.id")?),
            game_id: GameId::from_uuid(parse_uuid(&row.game_id, "identities.game_id")?),
            company_id: CompanyId::from_uuid(parse_uuid(&row.company_id, "identities.company_id")?),
            device_id_a: row.device_id_a,
            device_id_b: row.device_id_b,
            created_at: parse_ts(&row.created_at, "identities.created_at")?,
            cheat,
        })
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: String,
    company_id: String,
    game_id: String,
    identity_id: Option<String>,
    xact_id: String,
    submission_uuid: String,
    created_at: String,
    client_payload: Option<String>,
    platform_response: Option<String>,
    platform_status: Option<i64>,
    local_status: Option<i64>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = VerifyError;

    fn try_from(row: TransactionRow) -> Result<Self> {
        let verdict = row
            .local_status
            .map(|code| {
                Verdict::from_code(code).ok_or_else(|| {
                    VerifyError::Internal(format!("unknown local_status code: {code}"))
                })
            })
            .transpose()?;

        Ok(Transaction {
            id: TransactionId::from_uuid(parse_uuid(&row.id, "transactions.id")?),
            company_id: CompanyId::from_uuid(parse_uuid(
                &row.company_id,
                "transactions.company_id",
            )?),
            game_id: GameId::from_uuid(parse_uuid(&row.game_id, "transactions.game_id")?),
            identity_id: row
                .identity_id
                .map(|s| parse_uuid(&s, "transactions.identity_id").map(IdentityId::from_uuid))
                .transpose()?,
            xact_id: row.xact_id,
            submission_uuid: row.submission_uuid,
            created_at: parse_ts(&row.created_at, "transactions.created_at")?,
            client_payload: parse_json(row.client_payload, "transactions.client_payload")?,
            platform_response: parse_json(row.platform_response, "transactions.platform_response")?,
            platform_status: row.platform_status,
            verdict,
        })
    }
}

fn parse_uuid(s: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| VerifyError::Internal(format!("invalid {field}: {e}")))
}

fn parse_ts(s: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| VerifyError::Internal(format!("invalid {field}: {e}")))
}

fn parse_json(s: Option<String>, field: &str) -> Result<Option<serde_json::Value>> {
    s.map(|s| {
        serde_json::from_str(&s).map_err(|e| VerifyError::Internal(format!("invalid {field}: {e}")))
    })
    .transpose()
}
