//! PostgreSQL schema
//!
//! Created idempotently at startup. The constraints here hold even if the
//! engine is bypassed: positive amounts, non-negative balances, a closed set
//! of statuses, no self-transfers, and transfer rows that only ever move out
//! of `pending`.

pub const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id          UUID PRIMARY KEY,
    balance     NUMERIC(20, 8) NOT NULL DEFAULT 0 CHECK (balance >= 0),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

pub const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id                      UUID PRIMARY KEY,
    source_account_id       UUID REFERENCES accounts(id),
    destination_account_id  UUID NOT NULL REFERENCES accounts(id),
    amount                  NUMERIC(20, 8) NOT NULL CHECK (amount > 0),
    reference               VARCHAR(255),
    status                  VARCHAR(20) NOT NULL DEFAULT 'pending'
                            CHECK (status IN ('pending', 'completed', 'failed')),
    created_at              TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    completed_at            TIMESTAMPTZ,
    CONSTRAINT different_accounts CHECK (
        source_account_id IS NULL OR source_account_id <> destination_account_id
    )
);

CREATE INDEX IF NOT EXISTS idx_transactions_source
    ON transactions (source_account_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_transactions_destination
    ON transactions (destination_account_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_transactions_reference
    ON transactions (reference) WHERE reference IS NOT NULL;
"#;

/// Transfer rows are append-only: no deletes, and the only permitted update
/// is `pending -> completed|failed` together with `completed_at`.
pub const CREATE_APPEND_ONLY_TRIGGER: &str = r#"
CREATE OR REPLACE FUNCTION transactions_append_only() RETURNS trigger AS $$
BEGIN
    IF TG_OP = 'DELETE' THEN
        RAISE EXCEPTION 'transactions are append-only' USING ERRCODE = '23514';
    END IF;
    IF OLD.status <> 'pending'
       OR NEW.id IS DISTINCT FROM OLD.id
       OR NEW.source_account_id IS DISTINCT FROM OLD.source_account_id
       OR NEW.destination_account_id IS DISTINCT FROM OLD.destination_account_id
       OR NEW.amount IS DISTINCT FROM OLD.amount
       OR NEW.reference IS DISTINCT FROM OLD.reference
       OR NEW.created_at IS DISTINCT FROM OLD.created_at THEN
        RAISE EXCEPTION 'transactions are append-only' USING ERRCODE = '23514';
    END IF;
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS trg_transactions_append_only ON transactions;
CREATE TRIGGER trg_transactions_append_only
    BEFORE UPDATE OR DELETE ON transactions
    FOR EACH ROW EXECUTE FUNCTION transactions_append_only();
"#;

pub const CREATE_IDEMPOTENCY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS idempotency_keys (
    key_hash         VARCHAR(64) PRIMARY KEY,
    request_body     TEXT NOT NULL,
    response_body    TEXT,
    response_status  INTEGER,
    created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    expires_at       TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_idempotency_expires ON idempotency_keys (expires_at);
"#;

/// Statements in execution order
pub const ALL: &[(&str, &str)] = &[
    ("accounts", CREATE_ACCOUNTS_TABLE),
    ("transactions", CREATE_TRANSACTIONS_TABLE),
    ("append-only trigger", CREATE_APPEND_ONLY_TRIGGER),
    ("idempotency_keys", CREATE_IDEMPOTENCY_TABLE),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent_ddl() {
        for (name, sql) in ALL {
            for line in sql.lines().map(str::trim) {
                if line.starts_with("CREATE TABLE") || line.starts_with("CREATE INDEX") {
                    assert!(line.contains("IF NOT EXISTS"), "{name}: {line}");
                }
            }
        }
    }

    #[test]
    fn test_invariants_present() {
        assert!(CREATE_ACCOUNTS_TABLE.contains("CHECK (balance >= 0)"));
        assert!(CREATE_TRANSACTIONS_TABLE.contains("CHECK (amount > 0)"));
        assert!(CREATE_TRANSACTIONS_TABLE.contains("source_account_id <> destination_account_id"));
    }
}
