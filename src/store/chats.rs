//! One-to-one private chats between users.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

use super::{Database, StoreError, json_column, new_id, now, required};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateMessage {
    pub id: String,
    pub sender_id: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateChat {
    pub id: String,
    pub participants: [String; 2],
    pub messages: Vec<PrivateMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Joins the two participant ids in a chat id. User ids may not contain it.
pub const CHAT_ID_SEPARATOR: &str = "__";

/// A required user id that can take part in a chat id.
fn participant_id(value: &str, field: &str) -> Result<String, StoreError> {
    let id = required(value, field)?;
    if id.contains(CHAT_ID_SEPARATOR) {
        return Err(StoreError::Invalid(format!("{field} can't contain '{CHAT_ID_SEPARATOR}'")));
    }
    Ok(id)
}

impl PrivateChat {
    /// Deterministic chat id for a pair of users, independent of order.
    pub fn chat_id(a: &str, b: &str) -> String {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        format!("{first}{CHAT_ID_SEPARATOR}{second}")
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    pub fn other_participant(&self, user_id: &str) -> &str {
        if self.participants[0] == user_id { &self.participants[1] } else { &self.participants[0] }
    }

    pub fn unread_for(&self, user_id: &str) -> usize {
        self.messages.iter().filter(|m| !m.read && m.sender_id != user_id).count()
    }
}

/// Result of sending a message. `first_message` is set when the message
/// opened a new conversation.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub chat: PrivateChat,
    pub message: PrivateMessage,
    pub first_message: bool,
}

/// One line in a user's chat list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatOverview {
    pub id: String,
    pub other_user: String,
    pub last_message: Option<PrivateMessage>,
    pub unread: usize,
    pub updated_at: DateTime<Utc>,
}

const CHAT_COLUMNS: &str = "id, participant_a, participant_b, messages, created_at, updated_at";

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<PrivateChat> {
    Ok(PrivateChat {
        id: row.get(0)?,
        participants: [row.get(1)?, row.get(2)?],
        messages: json_column(row, 3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn load_chat(conn: &Connection, id: &str) -> Result<Option<PrivateChat>, StoreError> {
    let chat = conn
        .query_row(
            &format!("SELECT {CHAT_COLUMNS} FROM private_chats WHERE id = ?1"),
            params![id],
            chat_from_row,
        )
        .optional()?;
    Ok(chat)
}

impl Database {
    pub fn send_private_message(&self, sender_id: &str, recipient_id: &str, text: &str) -> Result<SentMessage, StoreError> {
        let sender_id = participant_id(sender_id, "sender_id")?;
        let recipient_id = participant_id(recipient_id, "recipient_id")?;
        let text = required(text, "text")?;
        if sender_id == recipient_id {
            return Err(StoreError::Invalid("can't send a message to yourself".into()));
        }

        let id = PrivateChat::chat_id(&sender_id, &recipient_id);
        let ts = now();
        let message = PrivateMessage { id: new_id(), sender_id: sender_id.clone(), text, sent_at: ts, read: false };

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let (chat, first_message) = match load_chat(&tx, &id)? {
            Some(mut chat) => {
                if !(chat.has_participant(&sender_id) && chat.has_participant(&recipient_id)) {
                    return Err(StoreError::Conflict(format!("chat '{id}' belongs to other users")));
                }
                let first = chat.messages.is_empty();
                chat.messages.push(message.clone());
                chat.updated_at = ts;
                tx.execute(
                    "UPDATE private_chats SET messages = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, serde_json::to_string(&chat.messages)?, ts],
                )?;
                (chat, first)
            }
            None => {
                let mut participants = [sender_id, recipient_id];
                participants.sort();
                let chat = PrivateChat {
                    id: id.clone(),
                    participants,
                    messages: vec![message.clone()],
                    created_at: ts,
                    updated_at: ts,
                };
                tx.execute(
                    "INSERT INTO private_chats (id, participant_a, participant_b, messages, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                    params![
                        chat.id,
                        chat.participants[0],
                        chat.participants[1],
                        serde_json::to_string(&chat.messages)?,
                        ts
                    ],
                )?;
                (chat, true)
            }
        };
        tx.commit()?;
        Ok(SentMessage { chat, message, first_message })
    }

    pub fn get_chat(&self, id: &str) -> Result<PrivateChat, StoreError> {
        let conn = self.conn()?;
        load_chat(&conn, id)?.ok_or_else(|| StoreError::not_found("chat", id))
    }

    /// The user's chats, most recently active first.
    pub fn chats_for_user(&self, user_id: &str) -> Result<Vec<ChatOverview>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CHAT_COLUMNS} FROM private_chats
             WHERE participant_a = ?1 OR participant_b = ?1
             ORDER BY updated_at DESC"
        ))?;
        let chats = stmt
            .query_map(params![user_id], chat_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(chats
            .into_iter()
            .map(|chat| ChatOverview {
                other_user: chat.other_participant(user_id).to_string(),
                last_message: chat.messages.last().cloned(),
                unread: chat.unread_for(user_id),
                updated_at: chat.updated_at,
                id: chat.id,
            })
            .collect())
    }

    /// Mark every message the other participant sent as read.
    /// Returns how many messages changed.
    pub fn mark_chat_read(&self, id: &str, user_id: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut chat = load_chat(&tx, id)?.ok_or_else(|| StoreError::not_found("chat", id))?;
        if !chat.has_participant(user_id) {
            return Err(StoreError::Forbidden("not a participant of this chat".into()));
        }
        let mut changed = 0;
        for message in chat.messages.iter_mut().filter(|m| !m.read && m.sender_id != user_id) {
            message.read = true;
            changed += 1;
        }
        if changed > 0 {
            tx.execute(
                "UPDATE private_chats SET messages = ?2 WHERE id = ?1",
                params![id, serde_json::to_string(&chat.messages)?],
            )?;
            tx.commit()?;
        }
        Ok(changed)
    }
}
