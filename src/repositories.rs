use crate::{
    domain::MessageRepository,
    errors::RepoError,
    models::MessageRecord,
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    types::AttributeValue,
    Client as DynamoDbClient,
};
use std::collections::HashMap;
use tracing::{self, info};

/// Partition key attribute of the messages table.
pub const ID_ATTRIBUTE: &str = "id";

#[derive(Debug, Clone)]
pub struct DynamoDbMessageRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbMessageRepository {
    /// Creates a new repository instance configured for a specific table.
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbMessageRepository");
        Self { client, table_name }
    }
}

#[async_trait]
impl MessageRepository for DynamoDbMessageRepository {
    /// Stores a `MessageRecord` using PutItem.
    async fn put(&self, record: &MessageRecord) -> Result<(), RepoError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(record_to_item(record)))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to put message (id: {})", self.table_name, record.id))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }

    /// Retrieves a `MessageRecord` using a strongly consistent GetItem.
    async fn get(&self, id: &str) -> Result<Option<MessageRecord>, RepoError> {
        let resp = self.client
            .get_item()
            .table_name(&self.table_name)
            .key(ID_ATTRIBUTE, AttributeValue::S(id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get message (id: {})", self.table_name, id))
            .map_err(RepoError::BackendError)?;

        match resp.item {
            Some(item) => match item_to_record(&item) {
                Some(record) => Ok(Some(record)),
                None => {
                    tracing::error!(message_id = %id, table_name = %self.table_name, "DynamoDB: Retrieved item but failed to parse into MessageRecord");
                    Err(RepoError::DataCorruption(format!(
                        "Failed to parse message data retrieved from DynamoDB table '{}' for id {}",
                        self.table_name, id
                    )))
                }
            },
            None => Ok(None), // Item not found is not an error
        }
    }

    /// Deletes an item using DeleteItem.
    async fn delete(&self, id: &str) -> Result<(), RepoError> {
        tracing::debug!(message_id = %id, table_name = %self.table_name, "DynamoDB: Deleting item");

        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key(ID_ATTRIBUTE, AttributeValue::S(id.to_string()))
            // DeleteItem succeeds even if the item is already gone
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to delete message (id: {})", self.table_name, id))
            .map_err(RepoError::BackendError)?;

        Ok(())
    }

    /// Scans for items whose `expiresAt` is not after `now_millis`. Handles pagination.
    async fn list_expired(&self, now_millis: i64) -> Result<Vec<MessageRecord>, RepoError> {
        let mut records = Vec::new();
        let mut last_evaluated_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let mut request_builder = self.client
                .scan()
                .table_name(&self.table_name)
                .filter_expression("expiresAt <= :now")
                .expression_attribute_values(":now", AttributeValue::N(now_millis.to_string()));

            if let Some(lek) = last_evaluated_key {
                request_builder = request_builder.set_exclusive_start_key(Some(lek));
            }

            let resp = request_builder
                .send()
                .await
                .context(format!("DynamoDB: Failed to scan table '{}' for expired messages", self.table_name))
                .map_err(RepoError::BackendError)?;

            for item in resp.items.unwrap_or_default() {
                match item_to_record(&item) {
                    Some(record) => records.push(record),
                    None => {
                        // Skip rather than fail: one bad item must not stall the sweep.
                        let item_id = item.get(ID_ATTRIBUTE).and_then(|v| v.as_s().ok());
                        tracing::error!(item.id = ?item_id, table_name = %self.table_name, "DynamoDB: Failed to parse item from scan into MessageRecord");
                    }
                }
            }

            last_evaluated_key = resp.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
            tracing::debug!("DynamoDB Scan (table: {}): Continuing with LastEvaluatedKey...", self.table_name);
        }

        tracing::debug!(count = records.len(), table_name = %self.table_name, "DynamoDB: Expired scan complete");
        Ok(records)
    }
}

fn record_to_item(record: &MessageRecord) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::from([
        (ID_ATTRIBUTE.to_string(), AttributeValue::S(record.id.clone())),
        ("createdAt".to_string(), AttributeValue::N(record.created_at.to_string())),
        ("displayTime".to_string(), AttributeValue::N(record.display_time.to_string())),
        ("expiresAt".to_string(), AttributeValue::N(record.expires_at().to_string())),
    ]);
    if let Some(message) = &record.message {
        item.insert("message".to_string(), AttributeValue::S(message.clone()));
    }
    if let Some(image_url) = &record.image_url {
        item.insert("imageUrl".to_string(), AttributeValue::S(image_url.clone()));
    }
    if let Some(image_path) = &record.image_path {
        item.insert("imagePath".to_string(), AttributeValue::S(image_path.clone()));
    }
    item
}

fn item_to_record(item: &HashMap<String, AttributeValue>) -> Option<MessageRecord> {
    let id = item.get(ID_ATTRIBUTE)?.as_s().ok()?.to_string();
    let created_at = item.get("createdAt")?.as_n().ok()?.parse().ok()?;
    let display_time = item.get("displayTime")?.as_n().ok()?.parse().ok()?;
    let optional_s = |name: &str| -> Option<String> {
        item.get(name).and_then(|v| v.as_s().ok()).cloned()
    };

    Some(MessageRecord {
        id,
        message: optional_s("message"),
        image_url: optional_s("imageUrl"),
        image_path: optional_s("imagePath"),
        created_at,
        display_time,
    })
}
