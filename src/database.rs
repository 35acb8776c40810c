use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::crypto::LedgerSigner;
use crate::error::{ClaimError, LedgerError, RepaymentError};
use crate::loans::{Loan, LoanStatus};
use crate::offer::{ClaimReceipt, LoanOffer, LoanStore, OfferStatus};

/// Pseudo-account that minted credits come from.
pub const SYSTEM_ACCOUNT: &str = "SYSTEM";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub from_user: String,
    pub to_user: String,
    pub amount: i64,
    pub transaction_type: String,
    pub message: Option<String>,
    pub reference_id: Option<String>,
    pub signature: String,
    pub timestamp_unix: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepaymentSummary {
    pub loan_id: String,
    pub borrower_id: String,
    pub lender_id: String,
    pub principal: i64,
    pub interest: i64,
}

impl RepaymentSummary {
    pub fn total(&self) -> i64 {
        self.principal + self.interest
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub transactions_checked: usize,
    pub invalid_signatures: Vec<String>,
    pub balances_corrected: usize,
    /// Accounts touched by a forged entry; their stored balance is left as is.
    pub accounts_skipped: Vec<String>,
}

pub struct Database {
    pool: SqlitePool,
    signer: LedgerSigner,
}

impl Database {
    pub async fn new(database_url: &str, signer: LedgerSigner) -> Result<Self, sqlx::Error> {
        let in_memory = database_url.contains(":memory:");

        // Ensure the database directory exists
        if !in_memory {
            let file = database_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            let file = file.split('?').next().unwrap_or(file);
            if let Some(parent) = Path::new(file).parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Every connection to `:memory:` is its own database, so tests get one.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;

        // Create tables if they don't exist
        Self::create_tables(&pool).await?;

        info!("Database connected and migrations applied");

        Ok(Database { pool, signer })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS balances (
                discord_id TEXT PRIMARY KEY,
                balance INTEGER NOT NULL DEFAULT 0,
                last_updated DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                from_user TEXT NOT NULL,
                to_user TEXT NOT NULL,
                amount INTEGER NOT NULL,
                transaction_type TEXT NOT NULL,
                message TEXT,
                reference_id TEXT,
                signature TEXT NOT NULL,
                timestamp_unix INTEGER NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS loan_offers (
                id TEXT PRIMARY KEY,
                issuer_id TEXT NOT NULL,
                amount INTEGER NOT NULL,
                channel_id TEXT NOT NULL,
                message_id TEXT,
                status TEXT NOT NULL DEFAULT 'open',
                claimed_by TEXT,
                created_at_unix INTEGER NOT NULL,
                expires_at_unix INTEGER NOT NULL,
                claimed_at_unix INTEGER
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS loans (
                id TEXT PRIMARY KEY,
                offer_id TEXT UNIQUE,
                borrower_id TEXT NOT NULL,
                lender_id TEXT NOT NULL,
                amount INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at_unix INTEGER NOT NULL,
                settled_at_unix INTEGER
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_from_user ON transactions(from_user)")
            .execute(pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_to_user ON transactions(to_user)")
            .execute(pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_loans_borrower_status ON loans(borrower_id, status)")
            .execute(pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_loan_offers_status ON loan_offers(status)")
            .execute(pool)
            .await?;

        info!("Database tables created successfully");
        Ok(())
    }

    // Balance management
    pub async fn get_balance(&self, discord_id: &str) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT balance FROM balances WHERE discord_id = ?")
            .bind(discord_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("balance")).unwrap_or(0))
    }

    #[cfg(test)]
    pub async fn update_balance(&self, discord_id: &str, new_balance: i64) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        set_balance(&mut conn, discord_id, new_balance).await
    }

    pub async fn get_all_balances(&self, limit: Option<u32>) -> Result<Vec<(String, i64)>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT discord_id, balance
            FROM balances
            ORDER BY balance DESC
            LIMIT ?
            "#,
        )
        .bind(limit.map(i64::from).unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("discord_id"), row.get("balance")))
            .collect())
    }

    /// Credits `amount` out of thin air, as an admin grant.
    pub async fn mint(&self, to_user: &str, amount: i64, message: &str, granted_by: &str) -> Result<i64, LedgerError> {
        let mut tx = self.pool.begin().await?;

        credit(&mut tx, to_user, amount).await?;
        let transaction = self.signed_transaction(
            SYSTEM_ACCOUNT,
            to_user,
            amount,
            "mint",
            Some(format!("{} (by {})", message, granted_by)),
            None,
        )?;
        insert_transaction(&mut tx, &transaction).await?;

        let balance = balance_in(&mut tx, to_user).await?;
        tx.commit().await?;

        Ok(balance)
    }

    // Transaction management
    fn signed_transaction(
        &self,
        from_user: &str,
        to_user: &str,
        amount: i64,
        transaction_type: &str,
        message: Option<String>,
        reference_id: Option<String>,
    ) -> Result<Transaction, crate::crypto::CryptoError> {
        let now = Utc::now();
        let mut transaction = Transaction {
            id: Uuid::new_v4().to_string(),
            from_user: from_user.to_string(),
            to_user: to_user.to_string(),
            amount,
            transaction_type: transaction_type.to_string(),
            message,
            reference_id,
            signature: String::new(),
            timestamp_unix: now.timestamp(),
            created_at: now,
        };
        transaction.signature = self.signer.sign_transaction(&transaction)?;
        Ok(transaction)
    }

    #[cfg(test)]
    pub async fn get_all_transactions(&self) -> Result<Vec<Transaction>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions ORDER BY timestamp_unix ASC",
            TRANSACTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(transaction_from_row).collect())
    }

    /// Checks every ledger signature and rebuilds balances from the signed
    /// entries. Forged entries never reach a balance.
    pub async fn audit_ledger(&self) -> Result<AuditReport, sqlx::Error> {
        info!("Auditing ledger signatures and balances");

        let mut tx = self.pool.begin().await?;

        // Take the write lock first so no transfer commits mid-rebuild.
        sqlx::query("UPDATE balances SET balance = balance WHERE discord_id = ?")
            .bind(SYSTEM_ACCOUNT)
            .execute(&mut *tx)
            .await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions ORDER BY timestamp_unix ASC",
            TRANSACTION_COLUMNS
        ))
        .fetch_all(&mut *tx)
        .await?;
        let transactions: Vec<Transaction> = rows.iter().map(transaction_from_row).collect();

        let mut ledger: HashMap<String, i64> = HashMap::new();
        let mut untrusted: BTreeSet<String> = BTreeSet::new();
        let mut invalid_signatures = Vec::new();

        for entry in &transactions {
            if !self.signer.verify_transaction(entry) {
                warn!("Ledger transaction {} has an invalid signature", entry.id);
                invalid_signatures.push(entry.id.clone());
                untrusted.insert(entry.from_user.clone());
                untrusted.insert(entry.to_user.clone());
                continue;
            }
            *ledger.entry(entry.to_user.clone()).or_insert(0) += entry.amount;
            *ledger.entry(entry.from_user.clone()).or_insert(0) -= entry.amount;
        }
        ledger.remove(SYSTEM_ACCOUNT);
        untrusted.remove(SYSTEM_ACCOUNT);

        let stored: HashMap<String, i64> = sqlx::query("SELECT discord_id, balance FROM balances")
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(|row| (row.get("discord_id"), row.get("balance")))
            .collect();

        let accounts: BTreeSet<&String> = stored.keys().chain(ledger.keys()).collect();
        let mut balances_corrected = 0;
        for account in accounts {
            if untrusted.contains(account) {
                continue;
            }
            let recorded = stored.get(account).copied().unwrap_or(0);
            let calculated = ledger.get(account).copied().unwrap_or(0);
            if recorded != calculated {
                warn!(
                    "Balance of {} was {} but the ledger says {}",
                    account, recorded, calculated
                );
                set_balance(&mut tx, account, calculated).await?;
                balances_corrected += 1;
            }
        }

        tx.commit().await?;

        info!("Ledger audit complete");
        Ok(AuditReport {
            transactions_checked: transactions.len(),
            invalid_signatures,
            balances_corrected,
            accounts_skipped: untrusted.into_iter().collect(),
        })
    }

    // Offer management
    pub async fn get_offer(&self, offer_id: &str) -> Result<Option<LoanOffer>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_offer(&mut conn, offer_id).await
    }

    pub async fn claim_offer(&self, offer_id: &str, claimant_id: &str, now_unix: i64) -> Result<ClaimReceipt, ClaimError> {
        let mut tx = self.pool.begin().await?;

        // The conditional update goes first so the write lock is held before
        // anything is read; only one concurrent claim can match `open`.
        let claimed = sqlx::query(
            r#"
            UPDATE loan_offers
            SET status = 'claimed', claimed_by = ?, claimed_at_unix = ?
            WHERE id = ? AND status = 'open' AND expires_at_unix > ? AND issuer_id <> ?
            "#,
        )
        .bind(claimant_id)
        .bind(now_unix)
        .bind(offer_id)
        .bind(now_unix)
        .bind(claimant_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let offer = fetch_offer(&mut tx, offer_id).await?.ok_or(ClaimError::NotFound)?;

        if claimed == 0 {
            offer.check_claim(claimant_id, now_unix)?;
            return Err(ClaimError::AlreadyClaimed);
        }

        if has_pending_loan(&mut tx, claimant_id).await? {
            return Err(ClaimError::OutstandingLoan);
        }

        if offer.amount > 0 {
            if !debit(&mut tx, &offer.issuer_id, offer.amount).await? {
                return Err(ClaimError::IssuerInsufficientFunds);
            }
            credit(&mut tx, claimant_id, offer.amount).await?;
        }

        let loan = Loan {
            id: Uuid::new_v4().to_string(),
            offer_id: Some(offer.id.clone()),
            borrower_id: claimant_id.to_string(),
            lender_id: offer.issuer_id.clone(),
            amount: offer.amount,
            status: LoanStatus::Pending,
            created_at_unix: now_unix,
            settled_at_unix: None,
        };
        insert_loan(&mut tx, &loan).await?;

        let transaction = self.signed_transaction(
            &offer.issuer_id,
            claimant_id,
            offer.amount,
            "loan",
            Some("First-click loan".to_string()),
            Some(offer.id.clone()),
        )?;
        insert_transaction(&mut tx, &transaction).await?;

        tx.commit().await?;

        Ok(ClaimReceipt { offer, loan })
    }

    // Loan management
    pub async fn get_pending_loans(&self) -> Result<Vec<Loan>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM loans WHERE status = 'pending' ORDER BY created_at_unix ASC",
            LOAN_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(loan_from_row).collect()
    }

    pub async fn get_user_loans(&self, discord_id: &str) -> Result<Vec<Loan>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM loans WHERE borrower_id = ? ORDER BY created_at_unix DESC",
            LOAN_COLUMNS
        ))
        .bind(discord_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(loan_from_row).collect()
    }

    pub async fn get_all_loans(&self) -> Result<Vec<Loan>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM loans ORDER BY created_at_unix ASC",
            LOAN_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(loan_from_row).collect()
    }

    pub async fn has_pending_loan(&self, discord_id: &str) -> Result<bool, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        has_pending_loan(&mut conn, discord_id).await
    }

    /// Marks every pending loan of `borrower_id` as cleared. Returns the
    /// forgiven principal, or `None` if there was nothing to clear.
    pub async fn clear_debts(&self, borrower_id: &str, now_unix: i64) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT COUNT(*) AS loans, COALESCE(SUM(amount), 0) AS principal FROM loans WHERE borrower_id = ? AND status = 'pending'",
        )
        .bind(borrower_id)
        .fetch_one(&mut *tx)
        .await?;
        let count: i64 = row.get("loans");
        let principal: i64 = row.get("principal");

        if count == 0 {
            return Ok(None);
        }

        sqlx::query(
            "UPDATE loans SET status = 'cleared', settled_at_unix = ? WHERE borrower_id = ? AND status = 'pending'",
        )
        .bind(now_unix)
        .bind(borrower_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(principal))
    }

    /// Pays loan `loan_id` back to its lender with interest, out of the
    /// borrower's balance. Nothing changes unless the whole amount is paid.
    pub async fn repay_loan(
        &self,
        loan_id: &str,
        now_unix: i64,
        rate_per_hour: f64,
    ) -> Result<RepaymentSummary, RepaymentError> {
        let mut tx = self.pool.begin().await?;

        // Take the write lock first, then read.
        let settling = sqlx::query("UPDATE loans SET settled_at_unix = ? WHERE id = ? AND status = 'pending'")
            .bind(now_unix)
            .bind(loan_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if settling == 0 {
            return Err(RepaymentError::NothingOutstanding);
        }

        let row = sqlx::query(&format!("SELECT {} FROM loans WHERE id = ?", LOAN_COLUMNS))
            .bind(loan_id)
            .fetch_one(&mut *tx)
            .await?;
        let loan = loan_from_row(&row)?;

        let summary = RepaymentSummary {
            loan_id: loan.id.clone(),
            borrower_id: loan.borrower_id.clone(),
            lender_id: loan.lender_id.clone(),
            principal: loan.amount,
            interest: loan.interest_at(now_unix, rate_per_hour),
        };

        let total = summary.total();
        if total > 0 {
            if !debit(&mut tx, &loan.borrower_id, total).await? {
                let available = balance_in(&mut tx, &loan.borrower_id).await?;
                return Err(RepaymentError::InsufficientFunds { needed: total, available });
            }
            credit(&mut tx, &loan.lender_id, total).await?;
        }

        let transaction = self.signed_transaction(
            &loan.borrower_id,
            &loan.lender_id,
            total,
            "repayment",
            Some(format!("Repayment of {} + interest {}", summary.principal, summary.interest)),
            Some(loan.id.clone()),
        )?;
        insert_transaction(&mut tx, &transaction).await?;

        sqlx::query("UPDATE loans SET status = 'completed' WHERE id = ?")
            .bind(&loan.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(summary)
    }
}

#[async_trait]
impl LoanStore for Database {
    async fn balance_of(&self, user_id: &str) -> Result<i64, sqlx::Error> {
        self.get_balance(user_id).await
    }

    async fn insert_offer(&self, offer: &LoanOffer) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO loan_offers
            (id, issuer_id, amount, channel_id, message_id, status, claimed_by, created_at_unix, expires_at_unix, claimed_at_unix)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&offer.id)
        .bind(&offer.issuer_id)
        .bind(offer.amount)
        .bind(&offer.channel_id)
        .bind(&offer.message_id)
        .bind(offer.status.as_str())
        .bind(&offer.claimed_by)
        .bind(offer.created_at_unix)
        .bind(offer.expires_at_unix)
        .bind(offer.claimed_at_unix)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_offer_message(&self, offer_id: &str, message_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE loan_offers SET message_id = ? WHERE id = ?")
            .bind(message_id)
            .bind(offer_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_offer(&self, offer_id: &str) -> Result<Option<LoanOffer>, sqlx::Error> {
        self.get_offer(offer_id).await
    }

    async fn claim_offer(&self, offer_id: &str, claimant_id: &str, now_unix: i64) -> Result<ClaimReceipt, ClaimError> {
        Database::claim_offer(self, offer_id, claimant_id, now_unix).await
    }

    async fn expire_offer(&self, offer_id: &str) -> Result<Option<LoanOffer>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let changed = sqlx::query("UPDATE loan_offers SET status = 'expired' WHERE id = ? AND status = 'open'")
            .bind(offer_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let offer = if changed == 1 {
            fetch_offer(&mut tx, offer_id).await?
        } else {
            None
        };

        tx.commit().await?;
        Ok(offer)
    }

    async fn expire_stale_offers(&self, now_unix: i64) -> Result<Vec<LoanOffer>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(&format!(
            "UPDATE loan_offers SET status = 'expired' WHERE status = 'open' AND expires_at_unix <= ? RETURNING {}",
            OFFER_COLUMNS
        ))
        .bind(now_unix)
        .fetch_all(&mut *tx)
        .await?;
        let offers = rows.iter().map(offer_from_row).collect::<Result<Vec<_>, _>>()?;

        tx.commit().await?;
        Ok(offers)
    }

    async fn open_offers(&self) -> Result<Vec<LoanOffer>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM loan_offers WHERE status = 'open' ORDER BY expires_at_unix ASC",
            OFFER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(offer_from_row).collect()
    }
}

const OFFER_COLUMNS: &str = "id, issuer_id, amount, channel_id, message_id, status, claimed_by, created_at_unix, expires_at_unix, claimed_at_unix";
const TRANSACTION_COLUMNS: &str = "id, from_user, to_user, amount, transaction_type, message, reference_id, signature, timestamp_unix, created_at";
const LOAN_COLUMNS: &str = "id, offer_id, borrower_id, lender_id, amount, status, created_at_unix, settled_at_unix";

fn offer_from_row(row: &SqliteRow) -> Result<LoanOffer, sqlx::Error> {
    let status: String = row.get("status");
    let status = OfferStatus::parse(&status)
        .ok_or_else(|| sqlx::Error::Protocol(format!("unknown offer status {:?}", status)))?;

    Ok(LoanOffer {
        id: row.get("id"),
        issuer_id: row.get("issuer_id"),
        amount: row.get("amount"),
        channel_id: row.get("channel_id"),
        message_id: row.get("message_id"),
        status,
        claimed_by: row.get("claimed_by"),
        created_at_unix: row.get("created_at_unix"),
        expires_at_unix: row.get("expires_at_unix"),
        claimed_at_unix: row.get("claimed_at_unix"),
    })
}

fn loan_from_row(row: &SqliteRow) -> Result<Loan, sqlx::Error> {
    let status: String = row.get("status");
    let status = LoanStatus::parse(&status)
        .ok_or_else(|| sqlx::Error::Protocol(format!("unknown loan status {:?}", status)))?;

    Ok(Loan {
        id: row.get("id"),
        offer_id: row.get("offer_id"),
        borrower_id: row.get("borrower_id"),
        lender_id: row.get("lender_id"),
        amount: row.get("amount"),
        status,
        created_at_unix: row.get("created_at_unix"),
        settled_at_unix: row.get("settled_at_unix"),
    })
}

fn transaction_from_row(row: &SqliteRow) -> Transaction {
    Transaction {
        id: row.get("id"),
        from_user: row.get("from_user"),
        to_user: row.get("to_user"),
        amount: row.get("amount"),
        transaction_type: row.get("transaction_type"),
        message: row.get("message"),
        reference_id: row.get("reference_id"),
        signature: row.get("signature"),
        timestamp_unix: row.get("timestamp_unix"),
        created_at: row.get("created_at"),
    }
}

async fn fetch_offer(conn: &mut SqliteConnection, offer_id: &str) -> Result<Option<LoanOffer>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {} FROM loan_offers WHERE id = ?", OFFER_COLUMNS))
        .bind(offer_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(offer_from_row).transpose()
}

async fn has_pending_loan(conn: &mut SqliteConnection, discord_id: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT 1 FROM loans WHERE borrower_id = ? AND status = 'pending' LIMIT 1")
        .bind(discord_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.is_some())
}

async fn balance_in(conn: &mut SqliteConnection, discord_id: &str) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT balance FROM balances WHERE discord_id = ?")
        .bind(discord_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(|r| r.get("balance")).unwrap_or(0))
}

async fn set_balance(conn: &mut SqliteConnection, discord_id: &str, balance: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO balances (discord_id, balance)
        VALUES (?, ?)
        ON CONFLICT(discord_id)
        DO UPDATE SET balance = excluded.balance, last_updated = CURRENT_TIMESTAMP
        "#,
    )
    .bind(discord_id)
    .bind(balance)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Takes `amount` from `discord_id` if the balance covers it.
async fn debit(conn: &mut SqliteConnection, discord_id: &str, amount: i64) -> Result<bool, sqlx::Error> {
    let affected = sqlx::query(
        r#"
        UPDATE balances
        SET balance = balance - ?, last_updated = CURRENT_TIMESTAMP
        WHERE discord_id = ? AND balance >= ?
        "#,
    )
    .bind(amount)
    .bind(discord_id)
    .bind(amount)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(affected == 1)
}

async fn credit(conn: &mut SqliteConnection, discord_id: &str, amount: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO balances (discord_id, balance)
        VALUES (?, ?)
        ON CONFLICT(discord_id)
        DO UPDATE SET balance = balance + excluded.balance, last_updated = CURRENT_TIMESTAMP
        "#,
    )
    .bind(discord_id)
    .bind(amount)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_loan(conn: &mut SqliteConnection, loan: &Loan) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO loans (id, offer_id, borrower_id, lender_id, amount, status, created_at_unix, settled_at_unix)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&loan.id)
    .bind(&loan.offer_id)
    .bind(&loan.borrower_id)
    .bind(&loan.lender_id)
    .bind(loan.amount)
    .bind(loan.status.as_str())
    .bind(loan.created_at_unix)
    .bind(loan.settled_at_unix)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_transaction(conn: &mut SqliteConnection, transaction: &Transaction) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO transactions
        (id, from_user, to_user, amount, transaction_type, message, reference_id, signature, timestamp_unix, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&transaction.id)
    .bind(&transaction.from_user)
    .bind(&transaction.to_user)
    .bind(transaction.amount)
    .bind(&transaction.transaction_type)
    .bind(&transaction.message)
    .bind(&transaction.reference_id)
    .bind(&transaction.signature)
    .bind(transaction.timestamp_unix)
    .bind(transaction.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
