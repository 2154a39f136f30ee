use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

/// Idempotent schema statements applied at startup, in order.
const SCHEMA: &[(&str, &str)] = &[
    (
        "messages",
        "CREATE TABLE IF NOT EXISTS messages (
            id UUID PRIMARY KEY,
            conversation_id UUID NOT NULL,
            sender_id UUID NOT NULL,
            sender_name TEXT,
            sender_role TEXT,
            content TEXT NOT NULL,
            edited BOOLEAN NOT NULL DEFAULT FALSE,
            read BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    ),
    (
        "messages_conversation_order_idx",
        "CREATE INDEX IF NOT EXISTS messages_conversation_order_idx \
         ON messages (conversation_id, created_at, id)",
    ),
];

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database error applying '{step}': {source}")]
    Sql {
        step: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// Create the message schema if it does not exist yet.
pub async fn run(pool: &PgPool) -> Result<(), BootstrapError> {
    let mut transaction = pool.begin().await.map_err(|source| BootstrapError::Sql {
        step: "begin",
        source,
    })?;

    for (step, statement) in SCHEMA {
        info!(step, "applying schema step");
        sqlx::query(statement)
            .execute(&mut *transaction)
            .await
            .map_err(|source| BootstrapError::Sql { step, source })?;
    }

    transaction
        .commit()
        .await
        .map_err(|source| BootstrapError::Sql {
            step: "commit",
            source,
        })
}

/// Simple liveness check used during startup and by `/readyz`.
pub async fn ensure_liveness(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}
