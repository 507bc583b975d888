//! Forum repository - posts, comments, likes and polls
//!
//! Authors can be users, staff or admins. Rows store `(author_id,
//! author_type)` and display names are resolved through a UNION over the
//! three account tables, so one query lists a mixed thread.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::notifications::{self, NewNotification, Recipient};
use super::{paginate, DbError};
use crate::db::Patch;
use crate::models::{ActorKind, Paginated, Pagination, Title, ValidationError};

/// Display name and role for any account kind
const AUTHORS_CTE: &str = r#"
    WITH authors AS (
        SELECT id, 'user'::TEXT AS kind, full_name AS name, role FROM users
        UNION ALL
        SELECT id, 'staff'::TEXT, full_name, 'staff'::TEXT FROM staff_users
        UNION ALL
        SELECT id, 'admin'::TEXT, full_name, 'admin'::TEXT FROM admin_users
    )
"#;

pub const MIN_POLL_OPTIONS: usize = 2;
pub const MAX_POLL_OPTIONS: usize = 10;

/// Identity of whoever writes, likes or votes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorRef {
    pub id: Uuid,
    pub kind: ActorKind,
}

impl From<AuthorRef> for Recipient {
    fn from(author: AuthorRef) -> Self {
        Recipient {
            id: author.id,
            kind: author.kind,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_type: String,
    /// `None` when the author account no longer exists
    pub author_name: Option<String>,
    pub author_role: Option<String>,
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub has_poll: bool,
    pub liked_by_me: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub author_type: String,
    pub author_name: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PollOption {
    pub id: Uuid,
    pub label: String,
    pub position: i16,
    pub votes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Poll {
    pub id: Uuid,
    pub post_id: Uuid,
    pub question: String,
    pub options: Vec<PollOption>,
    pub total_votes: i64,
    /// Option chosen by the viewer, if they voted
    pub my_vote: Option<Uuid>,
}

/// A post with its thread and poll
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub comments: Vec<Comment>,
    pub poll: Option<Poll>,
}

#[derive(Debug, Clone)]
pub struct NewPoll {
    pub question: String,
    pub options: Vec<String>,
}

impl NewPoll {
    /// Validate a poll: a question and 2..=10 distinct, non-blank options.
    pub fn new(question: &str, options: &[String]) -> Result<Self, ValidationError> {
        let question = Title::for_field("question", question)?.into_string();

        let mut labels: Vec<String> = Vec::with_capacity(options.len());
        for option in options {
            let label = Title::for_field("options", option)?.into_string();
            if labels.iter().any(|l| l.eq_ignore_ascii_case(&label)) {
                return Err(ValidationError::InvalidFormat {
                    field: "options",
                    reason: "poll options must be distinct",
                });
            }
            labels.push(label);
        }

        if !(MIN_POLL_OPTIONS..=MAX_POLL_OPTIONS).contains(&labels.len()) {
            return Err(ValidationError::OutOfRange {
                field: "options",
                min: MIN_POLL_OPTIONS as i64,
                max: MAX_POLL_OPTIONS as i64,
            });
        }

        Ok(Self {
            question,
            options: labels,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author: AuthorRef,
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub poll: Option<NewPoll>,
}

/// Result of toggling a like
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LikeState {
    pub liked: bool,
    pub like_count: i64,
}

/// Start a post query: CTE plus the select list, viewer-dependent columns
/// bound. Callers append the WHERE clause.
fn post_query(viewer: AuthorRef, with_total: bool) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(AUTHORS_CTE);
    qb.push(
        r#"
        SELECT p.id, p.author_id, p.author_type, a.name AS author_name, a.role AS author_role,
               p.title, p.content, p.category,
               (SELECT COUNT(*) FROM forum_post_likes l WHERE l.post_id = p.id) AS like_count,
               (SELECT COUNT(*) FROM forum_comments c WHERE c.post_id = p.id) AS comment_count,
               EXISTS (SELECT 1 FROM forum_polls pl WHERE pl.post_id = p.id) AS has_poll,
               EXISTS (
                   SELECT 1 FROM forum_post_likes l
                   WHERE l.post_id = p.id AND l.liker_id = "#,
    );
    qb.push_bind(viewer.id)
        .push(" AND l.liker_type = ")
        .push_bind(viewer.kind.as_str())
        .push(") AS liked_by_me, p.created_at, p.updated_at");
    if with_total {
        qb.push(", COUNT(*) OVER() AS total");
    }
    qb.push(
        r#"
        FROM forum_posts p
        LEFT JOIN authors a ON a.id = p.author_id AND a.kind = p.author_type
        WHERE TRUE"#,
    );
    qb
}

pub struct ForumRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> ForumRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a post and, optionally, its poll.
    pub async fn create_post(&self, new: NewPost) -> Result<PostDetail, DbError> {
        let mut tx = self.pool.begin().await?;

        let (post_id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO forum_posts (author_id, author_type, title, content, category)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(new.author.id)
        .bind(new.author.kind.as_str())
        .bind(&new.title)
        .bind(&new.content)
        .bind(new.category.as_deref())
        .fetch_one(&mut *tx)
        .await?;

        if let Some(poll) = &new.poll {
            let (poll_id,): (Uuid,) = sqlx::query_as(
                "INSERT INTO forum_polls (post_id, question) VALUES ($1, $2) RETURNING id",
            )
            .bind(post_id)
            .bind(&poll.question)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO forum_poll_options (poll_id, label, position)
                SELECT $1, label, ordinality::SMALLINT
                FROM UNNEST($2::TEXT[]) WITH ORDINALITY AS o(label, ordinality)
                "#,
            )
            .bind(poll_id)
            .bind(&poll.options)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(
            %post_id,
            author_type = %new.author.kind,
            with_poll = new.poll.is_some(),
            "forum post created"
        );
        self.get_post(post_id, new.author).await
    }

    /// Posts newest first, optionally filtered by category or text.
    pub async fn list_posts(
        &self,
        viewer: AuthorRef,
        category: Option<&str>,
        search: Option<&str>,
        page: Pagination,
    ) -> Result<Paginated<Post>, DbError> {
        let mut qb = post_query(viewer, true);
        if let Some(category) = category.map(str::trim).filter(|c| !c.is_empty()) {
            qb.push(" AND p.category = ").push_bind(category.to_owned());
        }
        if let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            qb.push(" AND (p.title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR p.content ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY p.created_at DESC LIMIT ")
            .push_bind(page.limit() as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let rows = qb.build().fetch_all(self.pool).await?;
        paginate(rows, page)
    }

    async fn post(&self, id: Uuid, viewer: AuthorRef) -> Result<Post, DbError> {
        let mut qb = post_query(viewer, false);
        qb.push(" AND p.id = ").push_bind(id);
        qb.build_query_as::<Post>()
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("post", id))
    }

    /// A post with comments (oldest first) and poll results.
    pub async fn get_post(&self, id: Uuid, viewer: AuthorRef) -> Result<PostDetail, DbError> {
        let post = self.post(id, viewer).await?;

        let comments = sqlx::query_as(&format!(
            r#"
            {AUTHORS_CTE}
            SELECT c.id, c.post_id, c.author_id, c.author_type, a.name AS author_name,
                   c.content, c.created_at
            FROM forum_comments c
            LEFT JOIN authors a ON a.id = c.author_id AND a.kind = c.author_type
            WHERE c.post_id = $1
            ORDER BY c.created_at ASC
            "#
        ))
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        let poll_id: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM forum_polls WHERE post_id = $1")
                .bind(id)
                .fetch_optional(self.pool)
                .await?;
        let poll = match poll_id {
            Some((poll_id,)) => Some(self.poll(poll_id, viewer).await?),
            None => None,
        };

        Ok(PostDetail {
            post,
            comments,
            poll,
        })
    }

    /// Check that `actor` wrote the post, unless they moderate.
    async fn ensure_post_owner(
        &self,
        id: Uuid,
        actor: AuthorRef,
        moderator: bool,
    ) -> Result<(), DbError> {
        let owner: Option<(Uuid, String)> =
            sqlx::query_as("SELECT author_id, author_type FROM forum_posts WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool)
                .await?;
        let (author_id, author_type) = owner.ok_or_else(|| DbError::not_found("post", id))?;
        if !moderator && (author_id != actor.id || author_type != actor.kind.as_str()) {
            return Err(DbError::forbidden("only the author can change this post"));
        }
        Ok(())
    }

    pub async fn update_post(
        &self,
        id: Uuid,
        actor: AuthorRef,
        moderator: bool,
        patch: Patch,
    ) -> Result<PostDetail, DbError> {
        self.ensure_post_owner(id, actor, moderator).await?;

        let mut qb = patch
            .into_builder(id, "id")
            .map_err(|e| DbError::InvalidInput {
                message: e.to_string(),
            })?;
        qb.build_query_as::<(Uuid,)>()
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("post", id))?;

        self.get_post(id, actor).await
    }

    pub async fn delete_post(
        &self,
        id: Uuid,
        actor: AuthorRef,
        moderator: bool,
    ) -> Result<(), DbError> {
        self.ensure_post_owner(id, actor, moderator).await?;

        let mut tx = self.pool.begin().await?;
        let deleted = purge_posts(&mut *tx, &[id]).await?;
        if deleted == 0 {
            return Err(DbError::not_found("post", id));
        }
        tx.commit().await?;

        tracing::info!(post_id = %id, by = %actor.id, moderator, "forum post deleted");
        Ok(())
    }

    /// Add a comment and notify the post's author (unless they commented on
    /// their own post).
    pub async fn add_comment(
        &self,
        post_id: Uuid,
        author: AuthorRef,
        content: &str,
    ) -> Result<Comment, DbError> {
        let mut tx = self.pool.begin().await?;

        let owner: Option<(Uuid, String, String)> = sqlx::query_as(
            "SELECT author_id, author_type, title FROM forum_posts WHERE id = $1 FOR SHARE",
        )
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await?;
        let (owner_id, owner_type, title) =
            owner.ok_or_else(|| DbError::not_found("post", post_id))?;

        let comment: Comment = sqlx::query_as(&format!(
            r#"
            {AUTHORS_CTE},
            inserted AS (
                INSERT INTO forum_comments (post_id, author_id, author_type, content)
                VALUES ($1, $2, $3, $4)
                RETURNING id, post_id, author_id, author_type, content, created_at
            )
            SELECT i.id, i.post_id, i.author_id, i.author_type, a.name AS author_name,
                   i.content, i.created_at
            FROM inserted i
            LEFT JOIN authors a ON a.id = i.author_id AND a.kind = i.author_type
            "#
        ))
        .bind(post_id)
        .bind(author.id)
        .bind(author.kind.as_str())
        .bind(content)
        .fetch_one(&mut *tx)
        .await?;

        let owner_kind: Option<ActorKind> = owner_type.parse().ok();
        if let Some(owner_kind) = owner_kind {
            if owner_id != author.id || owner_kind != author.kind {
                notifications::insert(
                    &mut *tx,
                    &NewNotification {
                        recipient: Recipient {
                            id: owner_id,
                            kind: owner_kind,
                        },
                        title: "New comment".to_owned(),
                        message: format!("Someone commented on your post \"{}\".", title),
                        kind: "forum".to_owned(),
                    },
                )
                .await?;
            }
        }

        tx.commit().await?;
        Ok(comment)
    }

    pub async fn delete_comment(
        &self,
        id: Uuid,
        actor: AuthorRef,
        moderator: bool,
    ) -> Result<(), DbError> {
        let owner: Option<(Uuid, String)> =
            sqlx::query_as("SELECT author_id, author_type FROM forum_comments WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool)
                .await?;
        let (author_id, author_type) = owner.ok_or_else(|| DbError::not_found("comment", id))?;
        if !moderator && (author_id != actor.id || author_type != actor.kind.as_str()) {
            return Err(DbError::forbidden("only the author can delete this comment"));
        }

        sqlx::query("DELETE FROM forum_comments WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Like the post, or remove an existing like.
    pub async fn toggle_like(&self, post_id: Uuid, liker: AuthorRef) -> Result<LikeState, DbError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM forum_posts WHERE id = $1 FOR SHARE")
                .bind(post_id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(DbError::not_found("post", post_id));
        }

        let removed = sqlx::query(
            "DELETE FROM forum_post_likes WHERE post_id = $1 AND liker_id = $2 AND liker_type = $3",
        )
        .bind(post_id)
        .bind(liker.id)
        .bind(liker.kind.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed == 0 {
            sqlx::query(
                r#"
                INSERT INTO forum_post_likes (post_id, liker_id, liker_type)
                VALUES ($1, $2, $3)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(post_id)
            .bind(liker.id)
            .bind(liker.kind.as_str())
            .execute(&mut *tx)
            .await?;
        }

        let (like_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM forum_post_likes WHERE post_id = $1")
                .bind(post_id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(LikeState {
            liked: removed == 0,
            like_count,
        })
    }

    /// Poll with per-option vote counts.
    pub async fn poll(&self, poll_id: Uuid, viewer: AuthorRef) -> Result<Poll, DbError> {
        let head: Option<(Uuid, String)> =
            sqlx::query_as("SELECT post_id, question FROM forum_polls WHERE id = $1")
                .bind(poll_id)
                .fetch_optional(self.pool)
                .await?;
        let (post_id, question) = head.ok_or_else(|| DbError::not_found("poll", poll_id))?;

        let options: Vec<PollOption> = sqlx::query_as(
            r#"
            SELECT o.id, o.label, o.position, COUNT(v.option_id) AS votes
            FROM forum_poll_options o
            LEFT JOIN forum_poll_votes v ON v.option_id = o.id
            WHERE o.poll_id = $1
            GROUP BY o.id, o.label, o.position
            ORDER BY o.position ASC
            "#,
        )
        .bind(poll_id)
        .fetch_all(self.pool)
        .await?;

        let my_vote: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT option_id FROM forum_poll_votes
            WHERE poll_id = $1 AND voter_id = $2 AND voter_type = $3
            "#,
        )
        .bind(poll_id)
        .bind(viewer.id)
        .bind(viewer.kind.as_str())
        .fetch_optional(self.pool)
        .await?;

        let total_votes = options.iter().map(|o| o.votes).sum();
        Ok(Poll {
            id: poll_id,
            post_id,
            question,
            options,
            total_votes,
            my_vote: my_vote.map(|(id,)| id),
        })
    }

    /// Cast a vote. Each voter votes once per poll.
    pub async fn vote(
        &self,
        poll_id: Uuid,
        voter: AuthorRef,
        option_id: Uuid,
    ) -> Result<Poll, DbError> {
        let owner: Option<(Uuid,)> =
            sqlx::query_as("SELECT poll_id FROM forum_poll_options WHERE id = $1")
                .bind(option_id)
                .fetch_optional(self.pool)
                .await?;
        match owner {
            Some((owner,)) if owner == poll_id => {}
            _ => {
                let poll: Option<(Uuid,)> =
                    sqlx::query_as("SELECT id FROM forum_polls WHERE id = $1")
                        .bind(poll_id)
                        .fetch_optional(self.pool)
                        .await?;
                if poll.is_none() {
                    return Err(DbError::not_found("poll", poll_id));
                }
                return Err(DbError::InvalidInput {
                    message: "option does not belong to this poll".to_owned(),
                });
            }
        }

        sqlx::query(
            r#"
            INSERT INTO forum_poll_votes (poll_id, voter_id, voter_type, option_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(poll_id)
        .bind(voter.id)
        .bind(voter.kind.as_str())
        .bind(option_id)
        .execute(self.pool)
        .await
        .map_err(|e| DbError::from(e).on_conflict("already voted in this poll"))?;

        self.poll(poll_id, voter).await
    }
}

/// Delete posts and everything hanging off them. Returns posts removed.
pub(crate) async fn purge_posts(conn: &mut PgConnection, ids: &[Uuid]) -> Result<u64, DbError> {
    if ids.is_empty() {
        return Ok(0);
    }

    sqlx::query(
        r#"
        DELETE FROM forum_poll_votes
        WHERE poll_id IN (SELECT id FROM forum_polls WHERE post_id = ANY($1))
        "#,
    )
    .bind(ids)
    .execute(&mut *conn)
    .await?;
    sqlx::query(
        r#"
        DELETE FROM forum_poll_options
        WHERE poll_id IN (SELECT id FROM forum_polls WHERE post_id = ANY($1))
        "#,
    )
    .bind(ids)
    .execute(&mut *conn)
    .await?;
    for table in ["forum_polls", "forum_post_likes", "forum_comments"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE post_id = ANY($1)"))
            .bind(ids)
            .execute(&mut *conn)
            .await?;
    }

    let deleted = sqlx::query("DELETE FROM forum_posts WHERE id = ANY($1)")
        .bind(ids)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    Ok(deleted)
}

/// Remove an account's forum footprint: their posts (with threads), their
/// comments elsewhere, likes and votes. Returns `(posts, comments)` removed.
pub(crate) async fn purge_author(
    conn: &mut PgConnection,
    author_id: Uuid,
    kind: &str,
) -> Result<(u64, u64), DbError> {
    let post_ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT id FROM forum_posts WHERE author_id = $1 AND author_type = $2")
            .bind(author_id)
            .bind(kind)
            .fetch_all(&mut *conn)
            .await?;
    let posts = purge_posts(&mut *conn, &post_ids).await?;

    let comments =
        sqlx::query("DELETE FROM forum_comments WHERE author_id = $1 AND author_type = $2")
            .bind(author_id)
            .bind(kind)
            .execute(&mut *conn)
            .await?
            .rows_affected();

    sqlx::query("DELETE FROM forum_post_likes WHERE liker_id = $1 AND liker_type = $2")
        .bind(author_id)
        .bind(kind)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM forum_poll_votes WHERE voter_id = $1 AND voter_type = $2")
        .bind(author_id)
        .bind(kind)
        .execute(&mut *conn)
        .await?;

    Ok((posts, comments))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn poll_needs_two_to_ten_options() {
        assert!(NewPoll::new("Best day?", &options(&["Sat", "Sun"])).is_ok());

        let err = NewPoll::new("Best day?", &options(&["Sat"])).unwrap_err();
        assert_eq!(err.field(), Some("options"));

        let many: Vec<String> = (0..11).map(|i| format!("Option {}", i)).collect();
        assert!(matches!(
            NewPoll::new("Pick", &many),
            Err(ValidationError::OutOfRange { min: 2, max: 10, .. })
        ));
    }

    #[test]
    fn poll_options_are_trimmed_and_distinct() {
        let poll = NewPoll::new("  Venue? ", &options(&[" Park ", "Beach"])).unwrap();
        assert_eq!(poll.question, "Venue?");
        assert_eq!(poll.options, vec!["Park", "Beach"]);

        assert!(NewPoll::new("Venue?", &options(&["Park", "park"])).is_err());
        assert!(NewPoll::new("Venue?", &options(&["Park", "  "])).is_err());
    }

    #[test]
    fn post_query_binds_viewer() {
        let viewer = AuthorRef {
            id: Uuid::nil(),
            kind: ActorKind::Staff,
        };
        let qb = post_query(viewer, true);
        let sql = qb.sql();
        assert!(sql.contains("l.liker_id = $1 AND l.liker_type = $2"));
        assert!(sql.contains("COUNT(*) OVER() AS total"));
        assert!(sql.contains("LEFT JOIN authors a"));
    }
}
