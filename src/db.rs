use std::str::FromStr;

use anyhow::Context;
use serde::Serialize;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::chat::{ConversationId, Message, Participant, ParticipantId, Persistence, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub creator_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

type ConversationRow = (i64, String, i64, OffsetDateTime);

impl From<ConversationRow> for Conversation {
    fn from((id, title, creator_id, created_at): ConversationRow) -> Self {
        Self { id, title, creator_id, created_at }
    }
}

/// Sqlite-backed store for conversations, participants and messages.
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid DATABASE_URL {database_url}"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }

    pub async fn create_conversation(&self, title: &str, creator_id: UserId) -> anyhow::Result<Conversation> {
        let created_at = OffsetDateTime::now_utc();
        let id = sqlx::query("INSERT INTO conversations (title,creator_id,created_at) VALUES (?,?,?)")
            .bind(title)
            .bind(creator_id)
            .bind(created_at)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        Ok(Conversation {
            id,
            title: title.to_owned(),
            creator_id,
            created_at,
        })
    }

    pub async fn conversation(&self, id: ConversationId) -> anyhow::Result<Option<Conversation>> {
        let row: Option<ConversationRow> =
            sqlx::query_as("SELECT id,title,creator_id,created_at FROM conversations WHERE id=?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(Conversation::from))
    }

    /// Conversations the user created or has ever joined.
    pub async fn conversations_for_user(&self, user_id: UserId) -> anyhow::Result<Vec<Conversation>> {
        let rows: Vec<ConversationRow> = sqlx::query_as(
            "SELECT DISTINCT c.id,c.title,c.creator_id,c.created_at FROM conversations c
             LEFT JOIN participants p ON p.conversation_id=c.id
             WHERE c.creator_id=? OR p.user_id=? ORDER BY c.id",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Conversation::from).collect())
    }

    /// Returns false if there was nothing to delete.
    pub async fn delete_conversation(&self, id: ConversationId) -> anyhow::Result<bool> {
        let deleted = sqlx::query("DELETE FROM conversations WHERE id=?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted > 0)
    }

    /// Message history, oldest first. Message ids are time-ordered.
    pub async fn messages(&self, conversation_id: ConversationId) -> anyhow::Result<Vec<Message>> {
        let rows: Vec<(String, i64, String, i64, String, OffsetDateTime)> = sqlx::query_as(
            "SELECT id,conversation_id,participant_id,sender_id,content,created_at
             FROM messages WHERE conversation_id=? ORDER BY id",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, conversation_id, participant_id, sender_id, text, created_at)| {
                Ok::<_, anyhow::Error>(Message {
                    id: Uuid::parse_str(&id)?,
                    conversation_id,
                    participant_id: Uuid::parse_str(&participant_id)?,
                    sender_id,
                    text,
                    created_at,
                })
            })
            .collect()
    }

    /// Looks up a participant, including one whose connection already closed.
    pub async fn participant(&self, id: ParticipantId) -> anyhow::Result<Option<Participant>> {
        let row: Option<(String, i64, i64, OffsetDateTime)> =
            sqlx::query_as("SELECT id,conversation_id,user_id,created_at FROM participants WHERE id=?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(id, conversation_id, user_id, created_at)| {
            Ok::<_, anyhow::Error>(Participant {
                id: Uuid::parse_str(&id)?,
                conversation_id,
                user_id,
                created_at,
            })
        })
        .transpose()
    }

    /// Participants whose connection has not been closed yet.
    pub async fn active_participants(&self, conversation_id: ConversationId) -> anyhow::Result<Vec<Participant>> {
        let rows: Vec<(String, i64, i64, OffsetDateTime)> = sqlx::query_as(
            "SELECT id,conversation_id,user_id,created_at FROM participants
             WHERE conversation_id=? AND deleted_at IS NULL ORDER BY id",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, conversation_id, user_id, created_at)| {
                Ok::<_, anyhow::Error>(Participant {
                    id: Uuid::parse_str(&id)?,
                    conversation_id,
                    user_id,
                    created_at,
                })
            })
            .collect()
    }
}

impl Persistence for Db {
    async fn create_participant(&self, participant: &Participant) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO participants (id,conversation_id,user_id,created_at) VALUES (?,?,?,?)")
            .bind(participant.id.to_string())
            .bind(participant.conversation_id)
            .bind(participant.user_id)
            .bind(participant.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_message(&self, message: &Message) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO messages (id,conversation_id,participant_id,sender_id,content,created_at)
             VALUES (?,?,?,?,?,?)",
        )
        .bind(message.id.to_string())
        .bind(message.conversation_id)
        .bind(message.participant_id.to_string())
        .bind(message.sender_id)
        .bind(&message.text)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_participant(&self, participant_id: ParticipantId) -> anyhow::Result<()> {
        sqlx::query("UPDATE participants SET deleted_at=? WHERE id=? AND deleted_at IS NULL")
            .bind(OffsetDateTime::now_utc())
            .bind(participant_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
