use crate::{
    entities::{
        message, Message, MessageKind, MessageModel, MessagePriority, MessageStatus, User,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Directed user-to-user messaging with lightweight threading.
///
/// A reply inherits its parent's conversation id; a fresh message derives one
/// deterministically (UUIDv5 over the sorted participant pair and the
/// creation instant), so a thread's id never depends on who wrote first.
#[derive(Clone)]
pub struct MessageService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

/// Input for sending a message
#[derive(Debug, Deserialize)]
pub struct SendMessageInput {
    pub recipient_id: Uuid,
    pub subject: Option<String>,
    pub body: String,
    pub parent_id: Option<Uuid>,
    pub priority: Option<MessagePriority>,
}

impl MessageService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input))]
    pub async fn send_message(
        &self,
        sender_id: Uuid,
        input: SendMessageInput,
    ) -> Result<MessageModel, ServiceError> {
        if input.body.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Message body must not be empty".to_string(),
            ));
        }
        if input.recipient_id == sender_id {
            return Err(ServiceError::ValidationError(
                "Cannot send a message to yourself".to_string(),
            ));
        }

        User::find_by_id(input.recipient_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Recipient {} not found", input.recipient_id))
            })?;

        let now = Utc::now();
        let conversation_id = match input.parent_id {
            Some(parent_id) => {
                let parent = Message::find_by_id(parent_id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Message {} not found", parent_id))
                    })?;
                if parent.sender_id != sender_id && parent.recipient_id != sender_id {
                    return Err(ServiceError::Forbidden(
                        "Cannot reply in a conversation you are not part of".to_string(),
                    ));
                }
                parent.conversation_id
            }
            None => derive_conversation_id(sender_id, input.recipient_id, now.timestamp_nanos_opt().unwrap_or_default()),
        };

        self.insert_message(
            sender_id,
            input.recipient_id,
            conversation_id,
            input.parent_id,
            input.subject,
            input.body,
            MessageKind::Direct,
            input.priority.unwrap_or(MessagePriority::Normal),
        )
        .await
    }

    /// System-generated message to a user; ordinary row with
    /// `kind = notification`.
    #[instrument(skip(self, body))]
    pub async fn send_notification(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        subject: Option<String>,
        body: String,
    ) -> Result<MessageModel, ServiceError> {
        let now = Utc::now();
        let conversation_id = derive_conversation_id(
            sender_id,
            recipient_id,
            now.timestamp_nanos_opt().unwrap_or_default(),
        );
        self.insert_message(
            sender_id,
            recipient_id,
            conversation_id,
            None,
            subject,
            body,
            MessageKind::Notification,
            MessagePriority::Normal,
        )
        .await
    }

    /// Chronological page of a conversation the user participates in.
    #[instrument(skip(self))]
    pub async fn list_conversation(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<MessageModel>, u64), ServiceError> {
        let participates = Message::find()
            .filter(message::Column::ConversationId.eq(conversation_id))
            .filter(
                Condition::any()
                    .add(message::Column::SenderId.eq(user_id))
                    .add(message::Column::RecipientId.eq(user_id)),
            )
            .one(&*self.db)
            .await?
            .is_some();
        if !participates {
            return Err(ServiceError::NotFound(format!(
                "Conversation {} not found",
                conversation_id
            )));
        }

        let paginator = Message::find()
            .filter(message::Column::ConversationId.eq(conversation_id))
            .order_by_asc(message::Column::CreatedAt)
            .paginate(&*self.db, page_size);

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((data, total))
    }

    /// Incoming messages, newest first. Archived messages are hidden.
    pub async fn inbox(
        &self,
        user_id: Uuid,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<MessageModel>, u64), ServiceError> {
        let paginator = Message::find()
            .filter(message::Column::RecipientId.eq(user_id))
            .filter(message::Column::Status.eq(MessageStatus::Active))
            .order_by_desc(message::Column::CreatedAt)
            .paginate(&*self.db, page_size);

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((data, total))
    }

    /// Marks a message read. Only the recipient may do this; repeated calls
    /// keep the original `read_at`.
    #[instrument(skip(self))]
    pub async fn mark_read(
        &self,
        user_id: Uuid,
        message_id: Uuid,
    ) -> Result<MessageModel, ServiceError> {
        let msg = self.recipient_message(user_id, message_id).await?;

        if msg.is_read {
            return Ok(msg);
        }

        let now = Utc::now();
        let mut active: message::ActiveModel = msg.into();
        active.is_read = Set(true);
        active.read_at = Set(Some(now));
        active.updated_at = Set(now);
        Ok(active.update(&*self.db).await?)
    }

    /// Soft-archives a message out of the recipient's inbox.
    #[instrument(skip(self))]
    pub async fn archive(
        &self,
        user_id: Uuid,
        message_id: Uuid,
    ) -> Result<MessageModel, ServiceError> {
        let msg = self.recipient_message(user_id, message_id).await?;

        let mut active: message::ActiveModel = msg.into();
        active.status = Set(MessageStatus::Archived);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        Ok(Message::find()
            .filter(message::Column::RecipientId.eq(user_id))
            .filter(message::Column::Status.eq(MessageStatus::Active))
            .filter(message::Column::IsRead.eq(false))
            .count(&*self.db)
            .await?)
    }

    async fn recipient_message(
        &self,
        user_id: Uuid,
        message_id: Uuid,
    ) -> Result<MessageModel, ServiceError> {
        let msg = Message::find_by_id(message_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Message {} not found", message_id)))?;

        if msg.recipient_id != user_id {
            return Err(ServiceError::Forbidden(
                "Message is addressed to another user".to_string(),
            ));
        }
        Ok(msg)
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_message(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        conversation_id: Uuid,
        parent_id: Option<Uuid>,
        subject: Option<String>,
        body: String,
        kind: MessageKind,
        priority: MessagePriority,
    ) -> Result<MessageModel, ServiceError> {
        let now = Utc::now();
        let model = message::ActiveModel {
            id: Set(Uuid::new_v4()),
            sender_id: Set(sender_id),
            recipient_id: Set(recipient_id),
            conversation_id: Set(conversation_id),
            parent_id: Set(parent_id),
            subject: Set(subject),
            body: Set(body),
            kind: Set(kind),
            priority: Set(priority),
            status: Set(MessageStatus::Active),
            is_read: Set(false),
            read_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let created = model.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::MessageSent {
                message_id: created.id,
                conversation_id,
            })
            .await;

        info!(
            "Message {} sent in conversation {}",
            created.id, conversation_id
        );
        Ok(created)
    }
}

/// UUIDv5 over the sorted participant pair and the creation instant. Sorting
/// makes the id independent of who opens the thread.
fn derive_conversation_id(a: Uuid, b: Uuid, timestamp_nanos: i64) -> Uuid {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let name = format!("{}:{}:{}", low, high, timestamp_nanos);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}
