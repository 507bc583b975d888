//! Schema migrations
//!
//! Idempotent `CREATE TABLE IF NOT EXISTS` statements applied in one
//! transaction at startup. Requires PostgreSQL 13+ for the built-in
//! `gen_random_uuid()`.

use sqlx::PgPool;

use super::DbError;
use crate::models::kinds::sql_values;
use crate::models::{ActorKind, EventStatus, ScholarStatus, UserRole, VerificationStatus};

/// Tables in creation order. Dependents come after what they reference.
pub const TABLES: &[&str] = &[
    "users",
    "staff_users",
    "admin_users",
    "events",
    "event_participants",
    "event_feedback",
    "scholars",
    "scholar_donations",
    "forum_posts",
    "forum_comments",
    "forum_post_likes",
    "forum_polls",
    "forum_poll_options",
    "forum_poll_votes",
    "notifications",
    "report_cards",
    "report_card_history",
];

/// Build the DDL statements, filling CHECK lists from the Rust enums so the
/// two cannot drift.
pub fn statements() -> Vec<String> {
    let roles = sql_values(UserRole::ALL, UserRole::as_str);
    let actors = sql_values(ActorKind::ALL, ActorKind::as_str);
    let event_statuses = sql_values(EventStatus::ALL, EventStatus::as_str);
    let scholar_statuses = sql_values(ScholarStatus::ALL, ScholarStatus::as_str);
    let verification = sql_values(VerificationStatus::ALL, VerificationStatus::as_str);

    vec![
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                username VARCHAR(32) NOT NULL,
                email VARCHAR(254) NOT NULL,
                password_hash TEXT NOT NULL,
                full_name VARCHAR(128) NOT NULL,
                phone VARCHAR(32),
                address VARCHAR(255),
                role TEXT NOT NULL CHECK (role IN ({roles})),
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                face_descriptor REAL[],
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT users_email_key UNIQUE (email)
            )
            "#
        ),
        r#"
        CREATE TABLE IF NOT EXISTS staff_users (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            username VARCHAR(32) NOT NULL,
            email VARCHAR(254) NOT NULL,
            password_hash TEXT NOT NULL,
            full_name VARCHAR(128) NOT NULL,
            position VARCHAR(128),
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT staff_users_email_key UNIQUE (email)
        )
        "#
        .to_owned(),
        r#"
        CREATE TABLE IF NOT EXISTS admin_users (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            username VARCHAR(32) NOT NULL,
            email VARCHAR(254) NOT NULL,
            password_hash TEXT NOT NULL,
            mpin_hash TEXT NOT NULL,
            full_name VARCHAR(128) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT admin_users_email_key UNIQUE (email)
        )
        "#
        .to_owned(),
        // Usernames are unique regardless of case; login compares LOWER(username).
        "CREATE UNIQUE INDEX IF NOT EXISTS users_username_key ON users (LOWER(username))"
            .to_owned(),
        "CREATE UNIQUE INDEX IF NOT EXISTS staff_users_username_key \
         ON staff_users (LOWER(username))"
            .to_owned(),
        "CREATE UNIQUE INDEX IF NOT EXISTS admin_users_username_key \
         ON admin_users (LOWER(username))"
            .to_owned(),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                title VARCHAR(200) NOT NULL,
                description TEXT,
                location VARCHAR(255),
                latitude DOUBLE PRECISION,
                longitude DOUBLE PRECISION,
                starts_at TIMESTAMPTZ NOT NULL,
                ends_at TIMESTAMPTZ,
                total_volunteers INTEGER NOT NULL CHECK (total_volunteers > 0),
                current_volunteers INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ({event_statuses})),
                created_by UUID,
                created_by_type TEXT CHECK (created_by_type IN ({actors})),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT events_capacity_check
                    CHECK (current_volunteers >= 0 AND current_volunteers <= total_volunteers),
                CONSTRAINT events_schedule_check
                    CHECK (ends_at IS NULL OR ends_at > starts_at)
            )
            "#
        ),
        r#"
        CREATE TABLE IF NOT EXISTS event_participants (
            event_id UUID NOT NULL REFERENCES events(id),
            user_id UUID NOT NULL REFERENCES users(id),
            joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (event_id, user_id)
        )
        "#
        .to_owned(),
        r#"
        CREATE TABLE IF NOT EXISTS event_feedback (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            event_id UUID NOT NULL REFERENCES events(id),
            user_id UUID NOT NULL REFERENCES users(id),
            rating SMALLINT NOT NULL CHECK (rating BETWEEN 1 AND 5),
            comment TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT event_feedback_event_user_key UNIQUE (event_id, user_id)
        )
        "#
        .to_owned(),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS scholars (
                user_id UUID PRIMARY KEY REFERENCES users(id),
                school VARCHAR(200) NOT NULL,
                course VARCHAR(200),
                year_level VARCHAR(50),
                sponsor_id UUID REFERENCES users(id),
                amount_needed_cents BIGINT NOT NULL DEFAULT 0 CHECK (amount_needed_cents >= 0),
                amount_received_cents BIGINT NOT NULL DEFAULT 0 CHECK (amount_received_cents >= 0),
                status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ({scholar_statuses})),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS scholar_donations (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                sponsor_id UUID NOT NULL REFERENCES users(id),
                scholar_id UUID NOT NULL REFERENCES scholars(user_id),
                amount_cents BIGINT NOT NULL CHECK (amount_cents > 0),
                reference VARCHAR(100),
                proof_url TEXT,
                message TEXT,
                verification_status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (verification_status IN ({verification})),
                verified_by UUID REFERENCES admin_users(id),
                verified_at TIMESTAMPTZ,
                rejection_reason TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS forum_posts (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                author_id UUID NOT NULL,
                author_type TEXT NOT NULL CHECK (author_type IN ({actors})),
                title VARCHAR(200) NOT NULL,
                content TEXT NOT NULL,
                category VARCHAR(64),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS forum_comments (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                post_id UUID NOT NULL REFERENCES forum_posts(id),
                author_id UUID NOT NULL,
                author_type TEXT NOT NULL CHECK (author_type IN ({actors})),
                content TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS forum_post_likes (
                post_id UUID NOT NULL REFERENCES forum_posts(id),
                liker_id UUID NOT NULL,
                liker_type TEXT NOT NULL CHECK (liker_type IN ({actors})),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (post_id, liker_id, liker_type)
            )
            "#
        ),
        r#"
        CREATE TABLE IF NOT EXISTS forum_polls (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            post_id UUID NOT NULL REFERENCES forum_posts(id),
            question VARCHAR(200) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT forum_polls_post_id_key UNIQUE (post_id)
        )
        "#
        .to_owned(),
        r#"
        CREATE TABLE IF NOT EXISTS forum_poll_options (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            poll_id UUID NOT NULL REFERENCES forum_polls(id),
            label VARCHAR(200) NOT NULL,
            position SMALLINT NOT NULL
        )
        "#
        .to_owned(),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS forum_poll_votes (
                poll_id UUID NOT NULL REFERENCES forum_polls(id),
                voter_id UUID NOT NULL,
                voter_type TEXT NOT NULL CHECK (voter_type IN ({actors})),
                option_id UUID NOT NULL REFERENCES forum_poll_options(id),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (poll_id, voter_id, voter_type)
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                recipient_id UUID NOT NULL,
                recipient_type TEXT NOT NULL CHECK (recipient_type IN ({actors})),
                title VARCHAR(200) NOT NULL,
                message TEXT NOT NULL,
                kind VARCHAR(64) NOT NULL DEFAULT 'general',
                is_read BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS report_cards (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                scholar_id UUID NOT NULL REFERENCES scholars(user_id),
                academic_year VARCHAR(20) NOT NULL,
                term VARCHAR(50) NOT NULL,
                file_url TEXT NOT NULL,
                gpa DOUBLE PRECISION,
                remarks TEXT,
                verification_status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (verification_status IN ({verification})),
                verified_by UUID REFERENCES admin_users(id),
                verified_at TIMESTAMPTZ,
                rejection_reason TEXT,
                submitted_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT report_cards_scholar_id_key UNIQUE (scholar_id)
            )
            "#
        ),
        r#"
        CREATE TABLE IF NOT EXISTS report_card_history (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            original_id UUID NOT NULL,
            scholar_id UUID NOT NULL REFERENCES scholars(user_id),
            academic_year VARCHAR(20) NOT NULL,
            term VARCHAR(50) NOT NULL,
            file_url TEXT NOT NULL,
            gpa DOUBLE PRECISION,
            remarks TEXT,
            verification_status TEXT NOT NULL,
            rejection_reason TEXT,
            submitted_at TIMESTAMPTZ NOT NULL,
            archived_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#
        .to_owned(),
        "CREATE INDEX IF NOT EXISTS idx_users_role ON users(role)".to_owned(),
        "CREATE INDEX IF NOT EXISTS idx_events_starts_at ON events(starts_at)".to_owned(),
        "CREATE INDEX IF NOT EXISTS idx_participants_user ON event_participants(user_id)"
            .to_owned(),
        "CREATE INDEX IF NOT EXISTS idx_donations_scholar ON scholar_donations(scholar_id)"
            .to_owned(),
        "CREATE INDEX IF NOT EXISTS idx_donations_sponsor ON scholar_donations(sponsor_id)"
            .to_owned(),
        "CREATE INDEX IF NOT EXISTS idx_comments_post ON forum_comments(post_id)".to_owned(),
        "CREATE INDEX IF NOT EXISTS idx_notifications_recipient \
         ON notifications(recipient_id, recipient_type, is_read)"
            .to_owned(),
    ]
}

/// Apply all migrations.
pub async fn run(pool: &PgPool) -> Result<(), DbError> {
    tracing::info!("Running schema migrations...");

    let mut tx = pool.begin().await?;
    for statement in statements() {
        sqlx::query(&statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    tracing::info!(tables = TABLES.len(), "Schema up to date");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_has_a_create_statement() {
        let ddl = statements().join("\n");
        for table in TABLES {
            assert!(
                ddl.contains(&format!("CREATE TABLE IF NOT EXISTS {} (", table)),
                "missing DDL for {}",
                table
            );
        }
    }

    #[test]
    fn check_lists_come_from_enums() {
        let ddl = statements().join("\n");
        assert!(ddl.contains("role IN ('volunteer','scholar','sponsor')"));
        assert!(ddl.contains("status IN ('open','closed','cancelled','completed')"));
        assert!(ddl.contains("verification_status IN ('pending','verified','rejected')"));
    }

    #[test]
    fn unique_constraints_are_named_for_field_mapping() {
        let ddl = statements().join("\n");
        for name in [
            "users_username_key",
            "users_email_key",
            "staff_users_username_key",
            "staff_users_email_key",
            "admin_users_username_key",
            "admin_users_email_key",
        ] {
            assert!(ddl.contains(name), "missing constraint {}", name);
        }
    }

    #[test]
    fn usernames_are_unique_ignoring_case() {
        let ddl = statements().join("\n");
        for table in ["users", "staff_users", "admin_users"] {
            let index = format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {}_username_key",
                table
            );
            assert!(ddl.contains(&index), "missing {}", index);
            assert!(!ddl.contains(&format!("{}_username_key UNIQUE (username)", table)));
        }
        assert!(ddl.contains("(LOWER(username))"));
    }

    #[test]
    fn events_cannot_end_before_they_start() {
        let ddl = statements().join("\n");
        assert!(ddl.contains("events_schedule_check"));
        assert!(ddl.contains("CHECK (ends_at IS NULL OR ends_at > starts_at)"));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn migrations_are_idempotent() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.expect("pool");
        run(&pool).await.expect("first run");
        run(&pool).await.expect("second run");
    }
}
