//! AWS DynamoDB storage implementation.
//!
//! One item per site, keyed by `site_guid`. Reads use `BatchGetItem` and
//! writes use `BatchWriteItem`; both may hand back part of the batch as
//! unprocessed, which is resubmitted through [`drain_batch`]. Loading with
//! no guids scans the whole table.
//!
//! Reads and writes are always separate requests. Conditional writes would
//! be billed even when they change nothing.

use std::collections::{BTreeMap, HashMap, HashSet};

use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{AttributeValue, KeysAndAttributes, PutRequest, WriteRequest};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::error::{AppError, Result};
use crate::models::{ConnectorType, Point, PointState, Site};
use crate::storage::retry::{BatchOutcome, RetryPolicy, drain_batch};
use crate::storage::SiteStore;

/// BatchGetItem accepts at most this many keys.
const MAX_GET_BATCH: usize = 100;
/// BatchWriteItem accepts at most this many requests.
const MAX_WRITE_BATCH: usize = 25;

type Item = HashMap<String, AttributeValue>;

/// Attribute names used in the table.
mod field {
    pub const SITE_GUID: &str = "site_guid";
    pub const NAME: &str = "name";
    pub const ADDRESS: &str = "address";
    pub const TOWN: &str = "town";
    pub const COUNTY: &str = "county";
    pub const POSTCODE: &str = "postcode";
    pub const COUNTRY: &str = "country";
    pub const LATITUDE: &str = "lat";
    pub const LONGITUDE: &str = "lng";
    pub const POINTS: &str = "points";
    pub const LAST_CHECKED: &str = "last_checked";

    pub const POINT_ID: &str = "point_id";
    pub const STATE: &str = "state";
    pub const PRICE: &str = "price";
    pub const MAX_POWER: &str = "max_power";
    pub const CONNECTOR_TYPE: &str = "connector_type";
    pub const IMAGE_URL: &str = "image_url";
}

/// DynamoDB-backed site storage.
#[derive(Clone)]
pub struct DynamoStore {
    client: Client,
    table: String,
    retry: RetryPolicy,
}

impl DynamoStore {
    /// Create a new store for the given table.
    pub fn new(client: Client, table: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            table: table.into(),
            retry,
        }
    }

    /// Create a store using credentials and region from the environment.
    pub async fn from_env(table: &str, retry: RetryPolicy) -> Result<Self> {
        if table.trim().is_empty() {
            return Err(AppError::config("DynamoDB table name is empty"));
        }
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Ok(Self::new(Client::new(&config), table, retry))
    }

    async fn get_chunk(&self, keys: Vec<Item>) -> Result<BatchOutcome<Item, Site>> {
        let request = KeysAndAttributes::builder()
            .set_keys(Some(keys))
            .build()
            .map_err(AppError::remote_store)?;

        let output = self
            .client
            .batch_get_item()
            .request_items(&self.table, request)
            .send()
            .await
            .map_err(|e| AppError::remote_store(e.into_service_error()))?;

        let processed = output
            .responses()
            .and_then(|tables| tables.get(&self.table))
            .map(|items| items.iter().map(item_to_site).collect::<Result<Vec<_>>>())
            .transpose()?
            .unwrap_or_default();

        let unprocessed = output
            .unprocessed_keys()
            .and_then(|tables| tables.get(&self.table))
            .map(|keys| keys.keys().to_vec())
            .unwrap_or_default();

        Ok(BatchOutcome {
            processed,
            unprocessed,
        })
    }

    /// Read every item in the table, following scan pagination.
    async fn scan_all(&self) -> Result<Vec<Site>> {
        let mut sites = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let output = self
                .client
                .scan()
                .table_name(&self.table)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| AppError::remote_store(e.into_service_error()))?;

            for item in output.items() {
                sites.push(item_to_site(item)?);
            }
            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }
        Ok(sites)
    }

    async fn write_chunk(&self, requests: Vec<WriteRequest>) -> Result<BatchOutcome<WriteRequest, ()>> {
        let output = self
            .client
            .batch_write_item()
            .request_items(&self.table, requests)
            .send()
            .await
            .map_err(|e| AppError::remote_store(e.into_service_error()))?;

        let unprocessed = output
            .unprocessed_items()
            .and_then(|tables| tables.get(&self.table))
            .cloned()
            .unwrap_or_default();

        Ok(BatchOutcome {
            processed: Vec::new(),
            unprocessed,
        })
    }
}

#[async_trait]
impl SiteStore for DynamoStore {
    async fn get_sites(&self, guids: &[String]) -> Result<Vec<Site>> {
        if guids.is_empty() {
            return self.scan_all().await;
        }

        // BatchGetItem rejects a request that names the same key twice
        let guids = unique_guids(guids);
        let mut sites = Vec::with_capacity(guids.len());
        for chunk in guids.chunks(MAX_GET_BATCH) {
            let keys = chunk.iter().map(|guid| key_item(guid)).collect();
            let found = drain_batch(&self.retry, keys, |keys| self.get_chunk(keys)).await?;
            sites.extend(found);
        }
        Ok(sites)
    }

    async fn put_sites(&self, sites: &[Site]) -> Result<Vec<Site>> {
        let now = Utc::now().timestamp();
        let latest = latest_by_guid(sites);
        for chunk in latest.chunks(MAX_WRITE_BATCH) {
            let requests = chunk
                .iter()
                .map(|site| {
                    let put = PutRequest::builder()
                        .set_item(Some(site_to_item(site, now)))
                        .build()
                        .map_err(AppError::remote_store)?;
                    Ok(WriteRequest::builder().put_request(put).build())
                })
                .collect::<Result<Vec<_>>>()?;

            drain_batch(&self.retry, requests, |requests| self.write_chunk(requests)).await?;
        }

        log::info!("Wrote {} site(s) to DynamoDB table {}", sites.len(), self.table);
        Ok(sites.to_vec())
    }
}

/// Guids in first-seen order with repeats dropped.
fn unique_guids(guids: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    guids
        .iter()
        .map(String::as_str)
        .filter(|guid| seen.insert(*guid))
        .collect()
}

/// One site per guid, the last occurrence winning, in guid order.
fn latest_by_guid(sites: &[Site]) -> Vec<&Site> {
    sites
        .iter()
        .map(|site| (site.guid.as_str(), site))
        .collect::<BTreeMap<_, _>>()
        .into_values()
        .collect()
}

fn key_item(guid: &str) -> Item {
    HashMap::from([(field::SITE_GUID.to_string(), AttributeValue::S(guid.to_string()))])
}

fn optional_string(value: Option<&String>) -> AttributeValue {
    match value {
        Some(s) => AttributeValue::S(s.clone()),
        None => AttributeValue::Null(true),
    }
}

fn point_to_item(point: &Point) -> Item {
    let mut item = HashMap::from([
        (field::POINT_ID.to_string(), AttributeValue::S(point.point_id.clone())),
        (field::STATE.to_string(), AttributeValue::S(point.state.as_str().to_string())),
        (field::PRICE.to_string(), AttributeValue::S(point.price.to_string())),
        (field::MAX_POWER.to_string(), AttributeValue::N(point.max_power.to_string())),
        (
            field::CONNECTOR_TYPE.to_string(),
            AttributeValue::S(point.connector_type.as_str().to_string()),
        ),
    ]);
    if let Some(url) = &point.image_url {
        item.insert(field::IMAGE_URL.to_string(), AttributeValue::S(url.clone()));
    }
    item
}

/// Convert a site into a table item stamped with `last_checked`.
pub fn site_to_item(site: &Site, last_checked: i64) -> Item {
    let points = site
        .points
        .iter()
        .map(|(guid, point)| (guid.clone(), AttributeValue::M(point_to_item(point))))
        .collect();

    HashMap::from([
        (field::SITE_GUID.to_string(), AttributeValue::S(site.guid.clone())),
        (field::NAME.to_string(), optional_string(site.name.as_ref())),
        (field::ADDRESS.to_string(), optional_string(site.address.as_ref())),
        (field::TOWN.to_string(), optional_string(site.town.as_ref())),
        (field::COUNTY.to_string(), optional_string(site.county.as_ref())),
        (field::POSTCODE.to_string(), optional_string(site.postcode.as_ref())),
        (field::COUNTRY.to_string(), optional_string(site.country.as_ref())),
        (field::LATITUDE.to_string(), optional_string(site.latitude.as_ref())),
        (field::LONGITUDE.to_string(), optional_string(site.longitude.as_ref())),
        (field::POINTS.to_string(), AttributeValue::M(points)),
        (field::LAST_CHECKED.to_string(), AttributeValue::N(last_checked.to_string())),
    ])
}

fn get_string(item: &Item, name: &str) -> Option<String> {
    item.get(name).and_then(|v| v.as_s().ok()).cloned()
}

fn item_to_point(guid: &str, item: &Item) -> Result<Point> {
    let context = format!("DynamoDB point {guid}");

    let point_id = get_string(item, field::POINT_ID)
        .ok_or_else(|| AppError::parse(&context, "missing point_id"))?;
    // Bad state values should not be in the table, but degrade rather than fail
    let state = get_string(item, field::STATE)
        .map(|s| PointState::from_text_lossy(&s))
        .unwrap_or_default();
    let price = match get_string(item, field::PRICE) {
        Some(text) => text.parse::<Decimal>()?,
        None => Decimal::ZERO,
    };
    let max_power = item
        .get(field::MAX_POWER)
        .and_then(|v| v.as_n().ok())
        .map(|n| n.parse::<f64>())
        .transpose()
        .map_err(|e| AppError::parse(&context, e))?
        .unwrap_or_default();
    let connector_type = get_string(item, field::CONNECTOR_TYPE)
        .map(|s| ConnectorType::from_text_lossy(&s))
        .unwrap_or_default();

    Ok(Point {
        guid: guid.to_string(),
        point_id,
        state,
        price,
        max_power,
        connector_type,
        image_url: get_string(item, field::IMAGE_URL),
    })
}

/// Convert a table item back into a site.
pub fn item_to_site(item: &Item) -> Result<Site> {
    let guid = get_string(item, field::SITE_GUID)
        .ok_or_else(|| AppError::parse("DynamoDB item", "missing site_guid"))?;

    let mut points = BTreeMap::new();
    if let Some(Ok(map)) = item.get(field::POINTS).map(AttributeValue::as_m) {
        for (point_guid, value) in map {
            let point_item = value
                .as_m()
                .map_err(|_| AppError::parse(&guid, format!("point {point_guid} is not a map")))?;
            points.insert(point_guid.clone(), item_to_point(point_guid, point_item)?);
        }
    }

    Ok(Site {
        name: get_string(item, field::NAME),
        address: get_string(item, field::ADDRESS),
        town: get_string(item, field::TOWN),
        county: get_string(item, field::COUNTY),
        postcode: get_string(item, field::POSTCODE),
        country: get_string(item, field::COUNTRY),
        latitude: get_string(item, field::LATITUDE),
        longitude: get_string(item, field::LONGITUDE),
        points,
        guid,
    })
}
