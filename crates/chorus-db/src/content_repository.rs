use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};

use chorus_core::error::AppError;
use chorus_core::record::{BoardPost, Comment, ContentStore, Post};

/// Repository for crawled content in PostgreSQL.
///
/// All writes are keyed upserts on the source's natural id, so
/// re-crawling the same content is a no-op apart from refreshed
/// counters and enrichment.
#[derive(Clone)]
pub struct ContentRepository {
    pool: Pool<Postgres>,
}

impl ContentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Most recent posts, newest first, optionally for one subreddit.
    pub async fn recent_posts(
        &self,
        subreddit: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Post>, AppError> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT subreddit, post_id, title, author, created_utc, content,
                   comments_count, score, url, sentiment, is_toxic
            FROM posts
            WHERE ($1::text IS NULL OR subreddit = $1)
            ORDER BY created_utc DESC
            LIMIT $2
            "#,
        )
        .bind(subreddit)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Comments of one post, newest first.
    pub async fn comments_for_post(&self, post_id: &str) -> Result<Vec<Comment>, AppError> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT subreddit, post_id, comment_id, author, created_utc, body,
                   score, sentiment, is_toxic
            FROM comments
            WHERE post_id = $1
            ORDER BY created_utc DESC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Most recent board posts, newest first, optionally for one board.
    pub async fn recent_board_posts(
        &self,
        board: Option<&str>,
        limit: usize,
    ) -> Result<Vec<BoardPost>, AppError> {
        let rows = sqlx::query_as::<_, BoardPostRow>(
            r#"
            SELECT board, thread_no, post_no, created_at, name, comment,
                   replies, images, sentiment, is_toxic
            FROM board_posts
            WHERE ($1::text IS NULL OR board = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(board)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Per-table row counts, for the status command.
    pub async fn content_counts(&self) -> Result<(i64, i64, i64), AppError> {
        let (posts,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        let (comments,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM comments")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        let (board_posts,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM board_posts")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok((posts, comments, board_posts))
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}

// -- Internal row types for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct PostRow {
    subreddit: String,
    post_id: String,
    title: String,
    author: String,
    created_utc: DateTime<Utc>,
    content: String,
    comments_count: i64,
    score: i64,
    url: String,
    sentiment: Option<f64>,
    is_toxic: bool,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            subreddit: row.subreddit,
            post_id: row.post_id,
            title: row.title,
            author: row.author,
            created_utc: row.created_utc,
            content: row.content,
            comments_count: row.comments_count,
            score: row.score,
            url: row.url,
            sentiment: row.sentiment,
            is_toxic: row.is_toxic,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    subreddit: String,
    post_id: String,
    comment_id: String,
    author: String,
    created_utc: DateTime<Utc>,
    body: String,
    score: i64,
    sentiment: Option<f64>,
    is_toxic: bool,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            subreddit: row.subreddit,
            post_id: row.post_id,
            comment_id: row.comment_id,
            author: row.author,
            created_utc: row.created_utc,
            body: row.body,
            score: row.score,
            sentiment: row.sentiment,
            is_toxic: row.is_toxic,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BoardPostRow {
    board: String,
    thread_no: i64,
    post_no: i64,
    created_at: DateTime<Utc>,
    name: String,
    comment: String,
    replies: i64,
    images: i64,
    sentiment: Option<f64>,
    is_toxic: bool,
}

impl From<BoardPostRow> for BoardPost {
    fn from(row: BoardPostRow) -> Self {
        BoardPost {
            board: row.board,
            thread_no: row.thread_no,
            post_no: row.post_no,
            created_at: row.created_at,
            name: row.name,
            comment: row.comment,
            replies: row.replies,
            images: row.images,
            sentiment: row.sentiment,
            is_toxic: row.is_toxic,
        }
    }
}

// -- Trait implementation --

impl ContentStore for ContentRepository {
    async fn upsert_post(&self, post: &Post) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO posts (subreddit, post_id, title, author, created_utc, content,
                               comments_count, score, url, sentiment, is_toxic)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (post_id) DO UPDATE SET
                title = EXCLUDED.title,
                author = EXCLUDED.author,
                content = EXCLUDED.content,
                comments_count = EXCLUDED.comments_count,
                score = EXCLUDED.score,
                url = EXCLUDED.url,
                sentiment = EXCLUDED.sentiment,
                is_toxic = EXCLUDED.is_toxic,
                updated_at = NOW()
            "#,
        )
        .bind(&post.subreddit)
        .bind(&post.post_id)
        .bind(&post.title)
        .bind(&post.author)
        .bind(post.created_utc)
        .bind(&post.content)
        .bind(post.comments_count)
        .bind(post.score)
        .bind(&post.url)
        .bind(post.sentiment)
        .bind(post.is_toxic)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn upsert_comment(&self, comment: &Comment) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO comments (subreddit, post_id, comment_id, author, created_utc,
                                  body, score, sentiment, is_toxic)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (comment_id) DO UPDATE SET
                body = EXCLUDED.body,
                score = EXCLUDED.score,
                sentiment = EXCLUDED.sentiment,
                is_toxic = EXCLUDED.is_toxic,
                updated_at = NOW()
            "#,
        )
        .bind(&comment.subreddit)
        .bind(&comment.post_id)
        .bind(&comment.comment_id)
        .bind(&comment.author)
        .bind(comment.created_utc)
        .bind(&comment.body)
        .bind(comment.score)
        .bind(comment.sentiment)
        .bind(comment.is_toxic)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn upsert_board_post(&self, post: &BoardPost) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO board_posts (board, thread_no, post_no, created_at, name,
                                     comment, replies, images, sentiment, is_toxic)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (board, post_no) DO UPDATE SET
                comment = EXCLUDED.comment,
                replies = EXCLUDED.replies,
                images = EXCLUDED.images,
                sentiment = EXCLUDED.sentiment,
                is_toxic = EXCLUDED.is_toxic,
                updated_at = NOW()
            "#,
        )
        .bind(&post.board)
        .bind(post.thread_no)
        .bind(post.post_no)
        .bind(post.created_at)
        .bind(&post.name)
        .bind(&post.comment)
        .bind(post.replies)
        .bind(post.images)
        .bind(post.sentiment)
        .bind(post.is_toxic)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}
