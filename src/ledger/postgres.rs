//! Postgres-backed ledger
//!
//! Balance legs lock their account rows with `SELECT ... FOR UPDATE` in
//! account-number order, so concurrent entries touching the same accounts
//! serialize instead of losing updates.

use super::{
    account_number_for, apply_leg, card_matches, merge_record, AppliedEntry, LedgerEntry,
    LedgerStore,
};
use crate::error::BankingError;
use crate::models::{
    generate_reference, Account, AccountStatus, AccountType, Card, CardAction, CardStatus,
    CardTier, Loan, LoanStatus, NewAccount, Transaction, TransactionStatus, TransactionType,
};
use crate::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
      account_id UUID PRIMARY KEY,
      owner_id UUID NOT NULL,
      account_number TEXT NOT NULL UNIQUE,
      holder_name TEXT NOT NULL,
      account_type TEXT NOT NULL,
      balance NUMERIC(20, 2) NOT NULL CHECK (balance >= 0),
      currency TEXT NOT NULL,
      status TEXT NOT NULL,
      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
      reference TEXT PRIMARY KEY,
      from_account TEXT NOT NULL,
      to_account TEXT NOT NULL,
      amount NUMERIC(20, 2) NOT NULL CHECK (amount > 0),
      transaction_type TEXT NOT NULL,
      status TEXT NOT NULL,
      description TEXT NOT NULL DEFAULT '',
      delivery_offset BIGINT,
      notification_sent BOOLEAN NOT NULL DEFAULT FALSE,
      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_transactions_accounts_time
    ON transactions (from_account, to_account, created_at);
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cards (
      card_id UUID PRIMARY KEY,
      owner_id UUID NOT NULL,
      account_number TEXT NOT NULL,
      card_number TEXT NOT NULL UNIQUE,
      cvv TEXT NOT NULL,
      expiry TEXT NOT NULL,
      tier TEXT NOT NULL,
      credit_limit NUMERIC(20, 2) NOT NULL,
      used_credit NUMERIC(20, 2) NOT NULL DEFAULT 0,
      status TEXT NOT NULL,
      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS uniq_live_card_per_tier
    ON cards (owner_id, tier) WHERE status <> 'cancelled';
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS loans (
      loan_id UUID PRIMARY KEY,
      owner_id UUID NOT NULL,
      account_number TEXT NOT NULL,
      principal NUMERIC(20, 2) NOT NULL,
      interest_rate NUMERIC(6, 2) NOT NULL,
      tenure_months INTEGER NOT NULL,
      emi NUMERIC(20, 2) NOT NULL,
      total_repayment NUMERIC(20, 2) NOT NULL,
      purpose TEXT NOT NULL,
      status TEXT NOT NULL,
      credit_score INTEGER NOT NULL,
      remaining_balance NUMERIC(20, 2) NOT NULL,
      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    "#,
];

pub struct PostgresLedger {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresLedger {
    pub fn connect_lazy(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(10).connect_lazy(url)?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                for statement in SCHEMA {
                    sqlx::query(statement).execute(&self.pool).await?;
                }
                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                BankingError::DatabaseError(format!("Failed to initialize ledger schema: {}", e))
            })?;
        Ok(())
    }
}

//
// ================= Row mapping =================
//

fn account_type_to_db(value: AccountType) -> &'static str {
    match value {
        AccountType::Savings => "savings",
        AccountType::Checking => "checking",
    }
}

fn account_type_from_db(value: &str) -> AccountType {
    match value {
        "checking" => AccountType::Checking,
        _ => AccountType::Savings,
    }
}

fn account_status_to_db(value: AccountStatus) -> &'static str {
    match value {
        AccountStatus::Active => "active",
        AccountStatus::Frozen => "frozen",
        AccountStatus::Closed => "closed",
    }
}

fn account_status_from_db(value: &str) -> AccountStatus {
    match value {
        "active" => AccountStatus::Active,
        "frozen" => AccountStatus::Frozen,
        _ => AccountStatus::Closed,
    }
}

fn tx_type_to_db(value: TransactionType) -> &'static str {
    match value {
        TransactionType::Transfer => "transfer",
        TransactionType::Deposit => "deposit",
        TransactionType::Withdrawal => "withdrawal",
        TransactionType::Bonus => "bonus",
    }
}

fn tx_type_from_db(value: &str) -> TransactionType {
    match value {
        "deposit" => TransactionType::Deposit,
        "withdrawal" => TransactionType::Withdrawal,
        "bonus" => TransactionType::Bonus,
        _ => TransactionType::Transfer,
    }
}

fn tx_status_to_db(value: TransactionStatus) -> &'static str {
    match value {
        TransactionStatus::Pending => "pending",
        TransactionStatus::Completed => "completed",
        TransactionStatus::Failed => "failed",
    }
}

fn tx_status_from_db(value: &str) -> TransactionStatus {
    match value {
        "completed" => TransactionStatus::Completed,
        "failed" => TransactionStatus::Failed,
        _ => TransactionStatus::Pending,
    }
}

fn row_to_account(row: &PgRow) -> Result<Account> {
    Ok(Account {
        account_id: row.try_get("account_id")?,
        owner_id: row.try_get("owner_id")?,
        account_number: row.try_get("account_number")?,
        holder_name: row.try_get("holder_name")?,
        account_type: account_type_from_db(row.try_get("account_type")?),
        balance: row.try_get("balance")?,
        currency: row.try_get("currency")?,
        status: account_status_from_db(row.try_get("status")?),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_transaction(row: &PgRow) -> Result<Transaction> {
    Ok(Transaction {
        reference: row.try_get("reference")?,
        from_account: row.try_get("from_account")?,
        to_account: row.try_get("to_account")?,
        amount: row.try_get("amount")?,
        transaction_type: tx_type_from_db(row.try_get("transaction_type")?),
        status: tx_status_from_db(row.try_get("status")?),
        description: row.try_get("description")?,
        delivery_offset: row.try_get("delivery_offset")?,
        notification_sent: row.try_get("notification_sent")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_card(row: &PgRow) -> Result<Card> {
    let tier: String = row.try_get("tier")?;
    let status: String = row.try_get("status")?;
    Ok(Card {
        card_id: row.try_get("card_id")?,
        owner_id: row.try_get("owner_id")?,
        account_number: row.try_get("account_number")?,
        card_number: row.try_get("card_number")?,
        cvv: row.try_get("cvv")?,
        expiry: row.try_get("expiry")?,
        tier: tier.parse::<CardTier>()?,
        credit_limit: row.try_get("credit_limit")?,
        used_credit: row.try_get("used_credit")?,
        status: status.parse::<CardStatus>()?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_loan(row: &PgRow) -> Result<Loan> {
    let status: String = row.try_get("status")?;
    let tenure: i32 = row.try_get("tenure_months")?;
    let score: i32 = row.try_get("credit_score")?;
    Ok(Loan {
        loan_id: row.try_get("loan_id")?,
        owner_id: row.try_get("owner_id")?,
        account_number: row.try_get("account_number")?,
        principal: row.try_get("principal")?,
        interest_rate: row.try_get("interest_rate")?,
        tenure_months: tenure.max(0) as u32,
        emi: row.try_get("emi")?,
        total_repayment: row.try_get("total_repayment")?,
        purpose: row.try_get("purpose")?,
        status: status.parse::<LoanStatus>()?,
        credit_score: score.max(0) as u32,
        remaining_balance: row.try_get("remaining_balance")?,
        created_at: row.try_get("created_at")?,
    })
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

async fn insert_transaction(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    record: &Transaction,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO transactions
          (reference, from_account, to_account, amount, transaction_type, status, description,
           delivery_offset, notification_sent, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (reference) DO UPDATE SET
          from_account = EXCLUDED.from_account,
          to_account = EXCLUDED.to_account,
          amount = EXCLUDED.amount,
          transaction_type = EXCLUDED.transaction_type,
          status = EXCLUDED.status,
          description = EXCLUDED.description,
          updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&record.reference)
    .bind(&record.from_account)
    .bind(&record.to_account)
    .bind(record.amount)
    .bind(tx_type_to_db(record.transaction_type))
    .bind(tx_status_to_db(record.status))
    .bind(&record.description)
    .bind(record.delivery_offset)
    .bind(record.notification_sent)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait::async_trait]
impl LedgerStore for PostgresLedger {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn open_account(&self, request: NewAccount) -> Result<Account> {
        self.ensure_schema().await?;
        let mut tx = self.pool.begin().await?;

        // Serializes number assignment across concurrent openings.
        sqlx::query("LOCK TABLE accounts IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;
        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(&mut *tx)
            .await?;

        let account = Account {
            account_id: Uuid::new_v4(),
            owner_id: request.owner_id,
            account_number: account_number_for(&request, existing.max(0) as usize),
            holder_name: request.holder_name.clone(),
            account_type: request.account_type,
            balance: request.opening_bonus,
            currency: request.currency.clone(),
            status: AccountStatus::Active,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO accounts
              (account_id, owner_id, account_number, holder_name, account_type, balance, currency, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(account.account_id)
        .bind(account.owner_id)
        .bind(&account.account_number)
        .bind(&account.holder_name)
        .bind(account_type_to_db(account.account_type))
        .bind(account.balance)
        .bind(&account.currency)
        .bind(account_status_to_db(account.status))
        .bind(account.created_at)
        .execute(&mut *tx)
        .await?;

        if request.opening_bonus > Decimal::ZERO {
            let bonus = Transaction::new(
                generate_reference(),
                "SYSTEM",
                account.account_number.clone(),
                request.opening_bonus,
                TransactionType::Bonus,
                TransactionStatus::Completed,
                "Welcome bonus",
            );
            insert_transaction(&mut tx, &bonus).await?;
        }

        tx.commit().await?;
        Ok(account)
    }

    async fn find_account(&self, account_number: &str) -> Result<Option<Account>> {
        self.ensure_schema().await?;
        let row = sqlx::query("SELECT * FROM accounts WHERE account_number = $1")
            .bind(account_number)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_account).transpose()
    }

    async fn find_account_by_owner(&self, owner_id: Uuid) -> Result<Option<Account>> {
        self.ensure_schema().await?;
        let row = sqlx::query(
            "SELECT * FROM accounts WHERE owner_id = $1 ORDER BY created_at ASC LIMIT 1",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_account).transpose()
    }

    async fn set_account_status(
        &self,
        account_number: &str,
        status: AccountStatus,
    ) -> Result<Account> {
        self.ensure_schema().await?;
        let row = sqlx::query("UPDATE accounts SET status = $2 WHERE account_number = $1 RETURNING *")
            .bind(account_number)
            .bind(account_status_to_db(status))
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| BankingError::AccountNotFound(account_number.to_string()))?;
        row_to_account(&row)
    }

    async fn apply(&self, entry: LedgerEntry) -> Result<AppliedEntry> {
        self.ensure_schema().await?;
        let mut tx = self.pool.begin().await?;

        let mut lock_order: Vec<&str> = entry
            .legs
            .iter()
            .map(|leg| leg.account_number.as_str())
            .collect();
        lock_order.sort_unstable();
        lock_order.dedup();

        for number in &lock_order {
            sqlx::query("SELECT account_number FROM accounts WHERE account_number = $1 FOR UPDATE")
                .bind(number)
                .fetch_optional(&mut *tx)
                .await?;
        }

        let mut balances = Vec::with_capacity(entry.legs.len());
        for leg in &entry.legs {
            let row = sqlx::query("SELECT * FROM accounts WHERE account_number = $1")
                .bind(&leg.account_number)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| BankingError::AccountNotFound(leg.account_number.clone()))?;
            let account = row_to_account(&row)?;
            let balance = apply_leg(&account, leg.delta)?;

            sqlx::query("UPDATE accounts SET balance = $2 WHERE account_number = $1")
                .bind(&leg.account_number)
                .bind(balance)
                .execute(&mut *tx)
                .await?;
            balances.push((leg.account_number.clone(), balance));
        }

        let existing = sqlx::query("SELECT * FROM transactions WHERE reference = $1 FOR UPDATE")
            .bind(&entry.record.reference)
            .fetch_optional(&mut *tx)
            .await?
            .as_ref()
            .map(row_to_transaction)
            .transpose()?;
        let record = merge_record(existing.as_ref(), entry.record)?;
        insert_transaction(&mut tx, &record).await?;

        if let Some(loan_id) = entry.disburse_loan {
            let updated = sqlx::query(
                "UPDATE loans SET status = 'disbursed' WHERE loan_id = $1 AND status = 'approved'",
            )
            .bind(loan_id)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() != 1 {
                return Err(BankingError::AtomicityViolation(format!(
                    "loan {} is not approved and cannot be disbursed",
                    loan_id
                )));
            }
        }

        tx.commit().await?;
        debug!(reference = %record.reference, "Ledger entry committed");

        Ok(AppliedEntry {
            reference: record.reference,
            balances,
        })
    }

    async fn record_failure(&self, record: Transaction) -> Result<()> {
        self.ensure_schema().await?;
        sqlx::query(
            r#"
            INSERT INTO transactions
              (reference, from_account, to_account, amount, transaction_type, status, description,
               notification_sent, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'failed', $6, FALSE, $7, $7)
            ON CONFLICT (reference) DO UPDATE SET status = 'failed', updated_at = NOW()
            WHERE transactions.status = 'pending'
            "#,
        )
        .bind(&record.reference)
        .bind(&record.from_account)
        .bind(&record.to_account)
        .bind(record.amount)
        .bind(tx_type_to_db(record.transaction_type))
        .bind(&record.description)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_transaction(&self, reference: &str) -> Result<Option<Transaction>> {
        self.ensure_schema().await?;
        let row = sqlx::query("SELECT * FROM transactions WHERE reference = $1")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_transaction).transpose()
    }

    async fn list_transactions(
        &self,
        account_number: &str,
        limit: usize,
    ) -> Result<Vec<Transaction>> {
        self.ensure_schema().await?;
        let rows = sqlx::query(
            r#"
            SELECT * FROM transactions
            WHERE from_account = $1 OR to_account = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(account_number)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_transaction).collect()
    }

    async fn insert_pending_if_absent(&self, record: Transaction) -> Result<bool> {
        self.ensure_schema().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO transactions
              (reference, from_account, to_account, amount, transaction_type, status, description,
               notification_sent, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, FALSE, $7, $7)
            ON CONFLICT (reference) DO NOTHING
            "#,
        )
        .bind(&record.reference)
        .bind(&record.from_account)
        .bind(&record.to_account)
        .bind(record.amount)
        .bind(tx_type_to_db(record.transaction_type))
        .bind(&record.description)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn stamp_delivery(&self, reference: &str, offset: i64) -> Result<bool> {
        self.ensure_schema().await?;
        let result = sqlx::query(
            r#"
            UPDATE transactions SET
              delivery_offset = COALESCE(delivery_offset, $2),
              notification_sent = TRUE,
              status = CASE WHEN status = 'pending' THEN 'completed' ELSE status END,
              updated_at = NOW()
            WHERE reference = $1
              AND (delivery_offset IS NULL OR status = 'pending')
            "#,
        )
        .bind(reference)
        .bind(offset)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_failed(&self, reference: &str) -> Result<bool> {
        self.ensure_schema().await?;
        let result = sqlx::query(
            "UPDATE transactions SET status = 'failed', updated_at = NOW() WHERE reference = $1 AND status = 'pending'",
        )
        .bind(reference)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn issue_card(&self, card: Card) -> Result<Card> {
        self.ensure_schema().await?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO cards
              (card_id, owner_id, account_number, card_number, cvv, expiry, tier, credit_limit, used_credit, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(card.card_id)
        .bind(card.owner_id)
        .bind(&card.account_number)
        .bind(&card.card_number)
        .bind(&card.cvv)
        .bind(&card.expiry)
        .bind(card.tier.as_str())
        .bind(card.credit_limit)
        .bind(card.used_credit)
        .bind(card.status.as_str())
        .bind(card.created_at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(card),
            Err(e) if is_unique_violation(&e) => {
                Err(BankingError::DuplicateCardTier(card.tier.display_name().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_cards(&self, owner_id: Uuid) -> Result<Vec<Card>> {
        self.ensure_schema().await?;
        let rows = sqlx::query("SELECT * FROM cards WHERE owner_id = $1 ORDER BY created_at ASC")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_card).collect()
    }

    async fn set_card_status(
        &self,
        owner_id: Uuid,
        card_ref: &str,
        action: CardAction,
    ) -> Result<Card> {
        self.ensure_schema().await?;
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            "SELECT * FROM cards WHERE owner_id = $1 ORDER BY (status = 'cancelled') ASC, created_at DESC FOR UPDATE",
        )
        .bind(owner_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut target = None;
        for row in &rows {
            let card = row_to_card(row)?;
            if card_matches(&card, card_ref) {
                target = Some(card);
                break;
            }
        }
        let mut card = target.ok_or_else(|| BankingError::CardNotFound(card_ref.to_string()))?;
        card.status = card.status.apply(action)?;

        sqlx::query("UPDATE cards SET status = $2 WHERE card_id = $1")
            .bind(card.card_id)
            .bind(card.status.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(card)
    }

    async fn create_loan(&self, loan: Loan) -> Result<Loan> {
        self.ensure_schema().await?;
        sqlx::query(
            r#"
            INSERT INTO loans
              (loan_id, owner_id, account_number, principal, interest_rate, tenure_months, emi,
               total_repayment, purpose, status, credit_score, remaining_balance, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(loan.loan_id)
        .bind(loan.owner_id)
        .bind(&loan.account_number)
        .bind(loan.principal)
        .bind(loan.interest_rate)
        .bind(loan.tenure_months as i32)
        .bind(loan.emi)
        .bind(loan.total_repayment)
        .bind(&loan.purpose)
        .bind(loan.status.as_str())
        .bind(loan.credit_score as i32)
        .bind(loan.remaining_balance)
        .bind(loan.created_at)
        .execute(&self.pool)
        .await?;
        Ok(loan)
    }

    async fn set_loan_status(&self, loan_id: Uuid, status: LoanStatus) -> Result<Loan> {
        self.ensure_schema().await?;
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM loans WHERE loan_id = $1 FOR UPDATE")
            .bind(loan_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| BankingError::LoanNotFound(loan_id.to_string()))?;
        let mut loan = row_to_loan(&row)?;

        if !loan.status.can_transition_to(status) {
            return Err(BankingError::AtomicityViolation(format!(
                "loan {} cannot move from {} to {}",
                loan_id,
                loan.status.as_str(),
                status.as_str()
            )));
        }

        sqlx::query("UPDATE loans SET status = $2 WHERE loan_id = $1")
            .bind(loan_id)
            .bind(status.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        loan.status = status;
        Ok(loan)
    }

    async fn latest_loan(&self, account_number: &str) -> Result<Option<Loan>> {
        self.ensure_schema().await?;
        let row = sqlx::query(
            "SELECT * FROM loans WHERE account_number = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_loan).transpose()
    }

    async fn list_loans(&self, owner_id: Uuid) -> Result<Vec<Loan>> {
        self.ensure_schema().await?;
        let rows = sqlx::query("SELECT * FROM loans WHERE owner_id = $1 ORDER BY created_at DESC")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_loan).collect()
    }
}
