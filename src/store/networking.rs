//! Networking feed between artists: posts with embedded likes and comments.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

use super::{Database, StoreError, clean, json_column, new_id, now, required};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkingPost {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    pub image_url: Option<String>,
    /// User ids, each at most once.
    pub likes: Vec<String>,
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostInput {
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentInput {
    pub author_id: String,
    pub author_name: String,
    pub text: String,
}

const POST_COLUMNS: &str = "id, author_id, author_name, content, image_url, likes, comments, created_at";

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<NetworkingPost> {
    Ok(NetworkingPost {
        id: row.get(0)?,
        author_id: row.get(1)?,
        author_name: row.get(2)?,
        content: row.get(3)?,
        image_url: row.get(4)?,
        likes: json_column(row, 5)?,
        comments: json_column(row, 6)?,
        created_at: row.get(7)?,
    })
}

impl Database {
    pub fn create_post(&self, input: PostInput) -> Result<NetworkingPost, StoreError> {
        let post = NetworkingPost {
            id: new_id(),
            author_id: required(&input.author_id, "author_id")?,
            author_name: required(&input.author_name, "author_name")?,
            content: required(&input.content, "content")?,
            image_url: clean(input.image_url),
            likes: Vec::new(),
            comments: Vec::new(),
            created_at: now(),
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO networking_posts (id, author_id, author_name, content, image_url, likes, comments, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, '[]', '[]', ?6)",
            params![post.id, post.author_id, post.author_name, post.content, post.image_url, post.created_at],
        )?;
        Ok(post)
    }

    pub fn get_post(&self, id: &str) -> Result<NetworkingPost, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {POST_COLUMNS} FROM networking_posts WHERE id = ?1"),
            params![id],
            post_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("post", id))
    }

    /// Newest posts first.
    pub fn list_posts(&self, limit: usize) -> Result<Vec<NetworkingPost>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS} FROM networking_posts ORDER BY created_at DESC, rowid DESC LIMIT ?1"
        ))?;
        let posts = stmt
            .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    /// Only the author may delete a post.
    pub fn delete_post(&self, id: &str, user_id: &str) -> Result<(), StoreError> {
        let post = self.get_post(id)?;
        if post.author_id != user_id {
            return Err(StoreError::Forbidden("only the author can delete this post".into()));
        }
        let conn = self.conn()?;
        conn.execute("DELETE FROM networking_posts WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Like the post, or remove the like if the user already liked it.
    /// Returns the updated post and whether it is now liked.
    pub fn toggle_like(&self, post_id: &str, user_id: &str) -> Result<(NetworkingPost, bool), StoreError> {
        let user_id = required(user_id, "user_id")?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut post = tx
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM networking_posts WHERE id = ?1"),
                params![post_id],
                post_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("post", post_id))?;

        let liked = if let Some(pos) = post.likes.iter().position(|u| *u == user_id) {
            post.likes.remove(pos);
            false
        } else {
            post.likes.push(user_id);
            true
        };
        tx.execute(
            "UPDATE networking_posts SET likes = ?2 WHERE id = ?1",
            params![post_id, serde_json::to_string(&post.likes)?],
        )?;
        tx.commit()?;
        Ok((post, liked))
    }

    pub fn add_comment(&self, post_id: &str, input: CommentInput) -> Result<Comment, StoreError> {
        let comment = Comment {
            id: new_id(),
            author_id: required(&input.author_id, "author_id")?,
            author_name: required(&input.author_name, "author_name")?,
            text: required(&input.text, "text")?,
            created_at: now(),
        };
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut comments: Vec<Comment> = tx
            .query_row(
                "SELECT comments FROM networking_posts WHERE id = ?1",
                params![post_id],
                |row| json_column(row, 0),
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("post", post_id))?;
        comments.push(comment.clone());
        tx.execute(
            "UPDATE networking_posts SET comments = ?2 WHERE id = ?1",
            params![post_id, serde_json::to_string(&comments)?],
        )?;
        tx.commit()?;
        Ok(comment)
    }

    /// Only the comment's author may delete it.
    pub fn delete_comment(&self, post_id: &str, comment_id: &str, user_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut comments: Vec<Comment> = tx
            .query_row(
                "SELECT comments FROM networking_posts WHERE id = ?1",
                params![post_id],
                |row| json_column(row, 0),
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("post", post_id))?;
        let pos = comments
            .iter()
            .position(|c| c.id == comment_id)
            .ok_or_else(|| StoreError::not_found("comment", comment_id))?;
        if comments[pos].author_id != user_id {
            return Err(StoreError::Forbidden("only the author can delete this comment".into()));
        }
        comments.remove(pos);
        tx.execute(
            "UPDATE networking_posts SET comments = ?2 WHERE id = ?1",
            params![post_id, serde_json::to_string(&comments)?],
        )?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_by(author: &str, content: &str) -> PostInput {
        PostInput {
            author_id: author.to_string(),
            author_name: format!("Artista {author}"),
            content: content.to_string(),
            image_url: None,
        }
    }

    fn comment_by(author: &str, text: &str) -> CommentInput {
        CommentInput {
            author_id: author.to_string(),
            author_name: format!("Artista {author}"),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_feed_is_newest_first() {
        let db = Database::new().unwrap();
        db.create_post(post_by("u1", "primeiro")).unwrap();
        db.create_post(post_by("u2", "segundo")).unwrap();
        let feed = db.list_posts(10).unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].content, "segundo");
        assert_eq!(db.list_posts(1).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_content_rejected() {
        let db = Database::new().unwrap();
        assert!(matches!(db.create_post(post_by("u1", "  ")).unwrap_err(), StoreError::Invalid(_)));
    }

    #[test]
    fn test_like_toggles() {
        let db = Database::new().unwrap();
        let post = db.create_post(post_by("u1", "flash day sábado")).unwrap();

        let (liked_post, liked) = db.toggle_like(&post.id, "u2").unwrap();
        assert!(liked);
        assert_eq!(liked_post.likes, vec!["u2".to_string()]);

        let (unliked_post, liked) = db.toggle_like(&post.id, "u2").unwrap();
        assert!(!liked);
        assert!(unliked_post.likes.is_empty());
        assert!(db.get_post(&post.id).unwrap().likes.is_empty());
    }

    #[test]
    fn test_comments_and_author_rules() {
        let db = Database::new().unwrap();
        let post = db.create_post(post_by("u1", "alguém tem agulha 5RL?")).unwrap();
        let comment = db.add_comment(&post.id, comment_by("u2", "tenho sim")).unwrap();
        assert_eq!(db.get_post(&post.id).unwrap().comments.len(), 1);

        let err = db.delete_comment(&post.id, &comment.id, "u1").unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));
        db.delete_comment(&post.id, &comment.id, "u2").unwrap();
        assert!(db.get_post(&post.id).unwrap().comments.is_empty());

        assert!(matches!(db.delete_post(&post.id, "u2").unwrap_err(), StoreError::Forbidden(_)));
        db.delete_post(&post.id, "u1").unwrap();
        assert!(matches!(db.get_post(&post.id).unwrap_err(), StoreError::NotFound { .. }));
    }

    #[test]
    fn test_comment_on_missing_post() {
        let db = Database::new().unwrap();
        let err = db.add_comment("nope", comment_by("u1", "oi")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "post", .. }));
    }
}
