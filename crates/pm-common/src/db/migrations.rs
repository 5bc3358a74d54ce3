use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::{info, instrument};

use crate::db::PgPool;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("failed to run migration: {0}")]
    Postgres(#[from] PgError),
}

struct Migration {
    id: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        description: "quiz catalog: questions and choices with vector slots",
        sql: r#"
CREATE TABLE IF NOT EXISTS pm.questions (
    id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
    position INTEGER NOT NULL,
    modality TEXT NOT NULL CHECK (modality IN ('text_choice', 'image_choice')),
    weight_style REAL NOT NULL DEFAULT 0 CHECK (weight_style >= 0),
    weight_communication REAL NOT NULL DEFAULT 0 CHECK (weight_communication >= 0),
    weight_purpose REAL NOT NULL DEFAULT 0 CHECK (weight_purpose >= 0),
    weight_companion REAL NOT NULL DEFAULT 0 CHECK (weight_companion >= 0),
    published BOOLEAN NOT NULL DEFAULT FALSE,
    UNIQUE (position)
);

CREATE TABLE IF NOT EXISTS pm.choices (
    id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
    question_id BIGINT NOT NULL REFERENCES pm.questions(id),
    ordinal INTEGER NOT NULL,
    label TEXT,
    image_ref TEXT,
    vector REAL[],
    vector_generated_at TIMESTAMPTZ,
    UNIQUE (question_id, ordinal),
    CHECK (label IS NOT NULL OR image_ref IS NOT NULL),
    CHECK ((vector IS NULL) = (vector_generated_at IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_choices_pending
    ON pm.choices(id)
    WHERE vector IS NULL;
"#,
    },
    Migration {
        id: 2,
        description: "candidate profiles with per-dimension vectors",
        sql: r#"
CREATE TABLE IF NOT EXISTS pm.candidate_profiles (
    id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
    profile_complete BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS pm.candidate_dimensions (
    id BIGINT GENERATED ALWAYS AS IDENTITY UNIQUE,
    candidate_id BIGINT NOT NULL REFERENCES pm.candidate_profiles(id),
    dimension TEXT NOT NULL CHECK (dimension IN ('style', 'communication', 'purpose', 'companion')),
    description TEXT NOT NULL,
    vector REAL[],
    vector_generated_at TIMESTAMPTZ,
    PRIMARY KEY (candidate_id, dimension),
    CHECK ((vector IS NULL) = (vector_generated_at IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_candidate_dimensions_pending
    ON pm.candidate_dimensions(candidate_id)
    WHERE vector IS NULL;
"#,
    },
    Migration {
        id: 3,
        description: "sessions, answers, aggregates, ranked match results",
        sql: r#"
CREATE TABLE IF NOT EXISTS pm.sessions (
    id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
    state TEXT NOT NULL DEFAULT 'started'
        CHECK (state IN ('started', 'answering', 'ready', 'scored')),
    completed_at TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS pm.session_answers (
    session_id BIGINT NOT NULL REFERENCES pm.sessions(id),
    question_id BIGINT NOT NULL REFERENCES pm.questions(id),
    choice_id BIGINT NOT NULL REFERENCES pm.choices(id),
    answered_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (session_id, question_id)
);

CREATE TABLE IF NOT EXISTS pm.session_aggregates (
    session_id BIGINT NOT NULL REFERENCES pm.sessions(id),
    dimension TEXT NOT NULL CHECK (dimension IN ('style', 'communication', 'purpose', 'companion')),
    vector REAL[] NOT NULL,
    degraded BOOLEAN NOT NULL DEFAULT FALSE,
    computed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (session_id, dimension)
);

CREATE TABLE IF NOT EXISTS pm.match_results (
    session_id BIGINT NOT NULL REFERENCES pm.sessions(id),
    candidate_id BIGINT NOT NULL REFERENCES pm.candidate_profiles(id),
    rank INTEGER NOT NULL CHECK (rank >= 1),
    overall DOUBLE PRECISION NOT NULL CHECK (overall >= -1.0 AND overall <= 1.0),
    score_style DOUBLE PRECISION NOT NULL,
    score_communication DOUBLE PRECISION NOT NULL,
    score_purpose DOUBLE PRECISION NOT NULL,
    score_companion DOUBLE PRECISION NOT NULL,
    run_id TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (session_id, rank),
    UNIQUE (session_id, candidate_id)
);
"#,
    },
];

/// Apply pending migrations in order. Each migration runs in its own
/// transaction together with its bookkeeping row.
#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrationError> {
    let mut client = pool.get().await?;
    client
        .batch_execute(
            "CREATE SCHEMA IF NOT EXISTS pm;
             CREATE TABLE IF NOT EXISTS pm.schema_migrations (
                id INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             );",
        )
        .await?;

    for migration in MIGRATIONS {
        let already_applied: bool = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pm.schema_migrations WHERE id = $1)",
                &[&migration.id],
            )
            .await?
            .get(0);

        if already_applied {
            continue;
        }

        let tx = client.transaction().await?;
        tx.batch_execute(migration.sql).await?;
        tx.execute(
            "INSERT INTO pm.schema_migrations (id, description) VALUES ($1, $2)",
            &[&migration.id, &migration.description],
        )
        .await?;
        tx.commit().await?;

        info!(
            id = migration.id,
            description = migration.description,
            "applied migration"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_ids_are_unique_and_ordered() {
        let mut last = 0;
        for migration in MIGRATIONS {
            assert!(migration.id > last, "ids must strictly increase");
            last = migration.id;
        }
    }
}
