//! [`ItemTable`] backed by DynamoDB, reached through a DAX cluster endpoint when configured.

use crate::dax::{CacheItem, ItemTable, ScanPage};
use crate::{CacheError, CacheResult};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType, ReturnValue,
    ScalarAttributeType, TimeToLiveSpecification,
};
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;

const KEY_ATTR: &str = "cache_key";
const VALUE_ATTR: &str = "cache_value";
const CREATED_ATTR: &str = "created_at";
const EXPIRES_ATTR: &str = "expires_at";

fn store_error(e: impl std::error::Error) -> CacheError {
    CacheError::ItemStore(DisplayErrorContext(e).to_string())
}

fn key_map(cache_key: &str) -> HashMap<String, AttributeValue> {
    HashMap::from([(KEY_ATTR.to_owned(), AttributeValue::S(cache_key.to_owned()))])
}

fn number_attr(item: &HashMap<String, AttributeValue>, name: &str) -> Option<i64> {
    item.get(name)?.as_n().ok()?.parse().ok()
}

/// Items missing their value attribute come back with an empty value, which the backend treats
/// as corrupt.
fn item_from_attrs(item: &HashMap<String, AttributeValue>) -> Option<CacheItem> {
    let cache_key = item.get(KEY_ATTR)?.as_s().ok()?.clone();
    let cache_value = item
        .get(VALUE_ATTR)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .unwrap_or_default();
    Some(CacheItem {
        cache_key,
        cache_value,
        created_at: number_attr(item, CREATED_ATTR).unwrap_or_default(),
        expires_at: number_attr(item, EXPIRES_ATTR),
    })
}

#[derive(Debug, Clone)]
pub struct DynamoDbTable {
    client: Client,
    table_name: String,
}

impl DynamoDbTable {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Build a client for `region`, pointed at `endpoint` when it is non-empty.
    pub async fn connect(endpoint: &str, region: &str, table_name: impl Into<String>) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_owned()))
            .load()
            .await;
        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
        if !endpoint.is_empty() {
            builder = builder.endpoint_url(endpoint);
        }
        Self::new(Client::from_conf(builder.build()), table_name)
    }
}

#[async_trait]
impl ItemTable for DynamoDbTable {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn get_item(&self, cache_key: &str) -> CacheResult<Option<CacheItem>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(key_map(cache_key)))
            .send()
            .await
            .map_err(store_error)?;
        Ok(output.item().and_then(item_from_attrs))
    }

    async fn put_item(&self, item: CacheItem) -> CacheResult<()> {
        let mut request = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item(KEY_ATTR, AttributeValue::S(item.cache_key))
            .item(VALUE_ATTR, AttributeValue::S(item.cache_value))
            .item(CREATED_ATTR, AttributeValue::N(item.created_at.to_string()));
        if let Some(expires_at) = item.expires_at {
            request = request.item(EXPIRES_ATTR, AttributeValue::N(expires_at.to_string()));
        }
        request.send().await.map_err(store_error)?;
        Ok(())
    }

    async fn delete_item(&self, cache_key: &str) -> CacheResult<bool> {
        let output = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(key_map(cache_key)))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(store_error)?;
        Ok(output.attributes().is_some())
    }

    async fn scan_prefix(&self, prefix: &str, start: Option<String>) -> CacheResult<ScanPage> {
        let output = self
            .client
            .scan()
            .table_name(&self.table_name)
            .filter_expression("begins_with(cache_key, :prefix)")
            .expression_attribute_values(":prefix", AttributeValue::S(prefix.to_owned()))
            .projection_expression(KEY_ATTR)
            .set_exclusive_start_key(start.as_deref().map(key_map))
            .send()
            .await
            .map_err(store_error)?;

        let keys = output
            .items()
            .iter()
            .filter_map(|item| item.get(KEY_ATTR)?.as_s().ok().cloned())
            .collect();
        let last_evaluated_key = output
            .last_evaluated_key()
            .and_then(|k| k.get(KEY_ATTR)?.as_s().ok().cloned());
        Ok(ScanPage {
            keys,
            last_evaluated_key,
        })
    }

    async fn describe(&self) -> CacheResult<()> {
        self.client
            .describe_table()
            .table_name(&self.table_name)
            .send()
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn create_table(&self) -> CacheResult<bool> {
        match self
            .client
            .describe_table()
            .table_name(&self.table_name)
            .send()
            .await
        {
            Ok(_) => return Ok(false),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception()) => {}
            Err(e) => return Err(store_error(e)),
        }

        let key_schema = KeySchemaElement::builder()
            .attribute_name(KEY_ATTR)
            .key_type(KeyType::Hash)
            .build()
            .map_err(store_error)?;
        let key_definition = AttributeDefinition::builder()
            .attribute_name(KEY_ATTR)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(store_error)?;
        self.client
            .create_table()
            .table_name(&self.table_name)
            .key_schema(key_schema)
            .attribute_definitions(key_definition)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await
            .map_err(store_error)?;

        let ttl_spec = TimeToLiveSpecification::builder()
            .attribute_name(EXPIRES_ATTR)
            .enabled(true)
            .build()
            .map_err(store_error)?;
        if let Err(e) = self
            .client
            .update_time_to_live()
            .table_name(&self.table_name)
            .time_to_live_specification(ttl_spec)
            .send()
            .await
        {
            tracing::warn!(
                "table {} created but TTL could not be enabled: {}",
                self.table_name,
                DisplayErrorContext(e)
            );
        }
        Ok(true)
    }
}
