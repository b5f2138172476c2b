// src/services/evcharge.rs

//! evcharge.online scraper.
//!
//! Site search goes through the JSON endpoint used by the public map. Point
//! details are only published as HTML: each point row carries an inline
//! `showPointDetails('<point id>', '<guid>', '<kW>', '<price>', ...)` handler
//! which holds the machine-readable values.

use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Value, json};
use url::Url;

use super::Fetcher;
use crate::error::{AppError, Result};
use crate::models::{ConnectorType, FetcherConfig, Point, PointState, Site};
use crate::utils::http::{create_async_client, fetch_page_async};
use crate::utils::{join_path, resolve_url};

/// Quoted positional arguments of an inline JS call; not a general parser.
const JS_ARG_PATTERN: &str = r"\s*'([^']+)'\s*(?:,|\))";

const POINT_CONTAINER: &str = ".charg-list.site-details";
const STATE_BUTTON: &str = "button";
const CONNECTOR_LABEL: &str = ".total-energy-icon + span.chrge-left";
const POINT_IMAGE: &str = ".chrge-site-img img";
const BASE_TAG: &str = "base[href]";

/// Client for the evcharge.online public pages.
pub struct EvChargeClient {
    client: Client,
    config: FetcherConfig,
}

impl EvChargeClient {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
            config: config.clone(),
        })
    }

    fn search_form(&self, key: &str) -> Value {
        json!({
            "CurrentLatitude": self.config.search_latitude,
            "CurrentLongitude": self.config.search_longitude,
            "LocalDateTime": chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            "LocalDateTimeZoneDiff": "0",
            "IsFavourite": "0",
            "ConnectorType": "0",
            "ChargingSpeed": "",
            "PaymentType": "-1",
            "TariffPriceChanged": "0",
            "TariffPriceFrom": "0",
            "TariffPriceTo": "0",
            "PointDistance": "",
            "SearchKey": key,
        })
    }
}

#[async_trait]
impl Fetcher for EvChargeClient {
    async fn search(&self, key: &str) -> Result<Vec<Site>> {
        let url = join_path(&self.config.base_url, "nologinsites")?;
        let body = self
            .client
            .post(url)
            .json(&self.search_form(key))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let sites = parse_search_response(&body)?;
        log::info!("Search for '{key}' matched {} site(s)", sites.len());
        Ok(sites)
    }

    async fn refresh_points(&self, site: &Site) -> Result<BTreeMap<String, Point>> {
        let url = join_path(&self.config.base_url, &format!("nologinpoints/{}", site.guid))?;
        let (html, page_url) = fetch_page_async(&self.client, url).await?;

        let points = parse_points_page(&html, &page_url)?;
        log::debug!("Site {} has {} point(s)", site.guid, points.len());
        Ok(points)
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Strip leading and trailing whitespace from every line of an element's text.
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .lines()
        .map(str::trim)
        .collect()
}

/// Read a JSON field that may be a string, a number or null.
fn text_field(raw: &Value, name: &str) -> Option<String> {
    match raw.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse the `nologinsites` JSON response into sites with no points.
pub fn parse_search_response(body: &str) -> Result<Vec<Site>> {
    let value: Value = serde_json::from_str(body)?;

    let raw_sites = match value.get("objSites") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(sites)) => sites,
        Some(_) => return Err(AppError::parse("search response", "objSites is not a list")),
    };

    raw_sites
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let guid = text_field(raw, "RefGuid").ok_or_else(|| {
                AppError::parse("search response", format!("site #{index} has no RefGuid"))
            })?;
            Ok(Site {
                guid,
                name: text_field(raw, "SiteName"),
                address: text_field(raw, "Address"),
                town: text_field(raw, "Town"),
                county: text_field(raw, "County"),
                postcode: text_field(raw, "Postcode"),
                country: text_field(raw, "Country"),
                latitude: text_field(raw, "Latitude"),
                longitude: text_field(raw, "Longitude"),
                points: BTreeMap::new(),
            })
        })
        .collect()
}

/// Parse a `nologinpoints` page into points keyed by guid.
///
/// `page_url` resolves relative image links when the page has no `<base>`.
pub fn parse_points_page(html: &str, page_url: &Url) -> Result<BTreeMap<String, Point>> {
    let document = Html::parse_document(html);
    let context = page_url.as_str();

    let container_sel = parse_selector(POINT_CONTAINER)?;
    let button_sel = parse_selector(STATE_BUTTON)?;
    let connector_sel = parse_selector(CONNECTOR_LABEL)?;
    let image_sel = parse_selector(POINT_IMAGE)?;
    let base_sel = parse_selector(BASE_TAG)?;
    let js_args = Regex::new(JS_ARG_PATTERN).map_err(|e| AppError::parse(JS_ARG_PATTERN, e))?;

    let base_url = document
        .select(&base_sel)
        .next()
        .and_then(|base| base.value().attr("href"))
        .and_then(|href| page_url.join(href).ok())
        .unwrap_or_else(|| page_url.clone());

    let mut points = BTreeMap::new();

    for container in document.select(&container_sel) {
        let onclick = container
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find_map(|el| el.value().attr("onclick"))
            .ok_or_else(|| AppError::parse(context, "point has no onclick row"))?;

        let args: Vec<&str> = js_args
            .captures_iter(onclick)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .collect();
        let [point_id, guid, power, price, ..] = args.as_slice() else {
            return Err(AppError::parse(
                context,
                format!("expected at least 4 arguments in {onclick:?}"),
            ));
        };

        let max_power = power
            .parse::<f64>()
            .map_err(|e| AppError::parse(context, format!("power {power:?} for {point_id}: {e}")))?;
        if !max_power.is_finite() {
            return Err(AppError::parse(
                context,
                format!("power {power:?} for {point_id} is not a finite number"),
            ));
        }
        let price = Decimal::from_str(price)
            .map_err(|e| AppError::parse(context, format!("price {price:?} for {point_id}: {e}")))?
            .normalize();

        let state = container
            .select(&button_sel)
            .next()
            .map(|button| PointState::from_text_lossy(&element_text(button)))
            .unwrap_or_default();

        let connector_type = container
            .select(&connector_sel)
            .next()
            .map(|label| ConnectorType::from_text_lossy(&element_text(label)))
            .unwrap_or_default();

        let image_url = container
            .select(&image_sel)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(|src| resolve_url(&base_url, src));

        points.insert(
            guid.to_string(),
            Point {
                guid: guid.to_string(),
                point_id: point_id.to_string(),
                state,
                price,
                max_power,
                connector_type,
                image_url,
            },
        );
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const POINTS_PAGE: &str = r#"
        <html>
          <head><base href="https://cdn.evcharge.online/static/"></head>
          <body>
            <div class="point-row" onclick="showPointDetails('UKEV1381', 'G1', '22', '0.1800', '1', 'False' )">
              <div class="charg-list site-details">
                <div class="chrge-site-img"><img src="img/type2.png"></div>
                <span class="total-energy-icon"></span><span class="chrge-left">
                  Type 2
                </span>
                <button>
                  AVAILABLE
                </button>
              </div>
            </div>
            <div class="point-row" onclick="showPointDetails('UKEV1382','G2','7.4','0.2500','1','False')">
              <div class="charg-list site-details">
                <button>Reserved</button>
              </div>
            </div>
          </body>
        </html>
    "#;

    fn page_url() -> Url {
        Url::parse("https://evcharge.online/nologinpoints/S1").unwrap()
    }

    #[test]
    fn test_parse_points_page() {
        let points = parse_points_page(POINTS_PAGE, &page_url()).unwrap();
        assert_eq!(points.len(), 2);

        let first = &points["G1"];
        assert_eq!(first.point_id, "UKEV1381");
        assert_eq!(first.state, PointState::Available);
        assert_eq!(first.price, Decimal::new(18, 2));
        assert_eq!(first.price.to_string(), "0.18");
        assert_eq!(first.max_power, 22.0);
        assert_eq!(first.connector_type, ConnectorType::Type2);
        assert_eq!(
            first.image_url.as_deref(),
            Some("https://cdn.evcharge.online/static/img/type2.png")
        );

        // Unrecognised state and missing optional parts degrade
        let second = &points["G2"];
        assert_eq!(second.state, PointState::Unknown);
        assert_eq!(second.connector_type, ConnectorType::Unknown);
        assert_eq!(second.image_url, None);
        assert_eq!(second.max_power, 7.4);
    }

    #[test]
    fn test_image_resolves_against_page_without_base() {
        let html = r#"
            <div onclick="showPointDetails('A','G1','22','0.10')">
              <div class="charg-list site-details">
                <div class="chrge-site-img"><img src="/img/p.png"></div>
              </div>
            </div>"#;
        let points = parse_points_page(html, &page_url()).unwrap();
        assert_eq!(
            points["G1"].image_url.as_deref(),
            Some("https://evcharge.online/img/p.png")
        );
    }

    #[test]
    fn test_missing_onclick_is_parse_error() {
        let html = r#"<div><div class="charg-list site-details"></div></div>"#;
        let result = parse_points_page(html, &page_url());
        assert!(matches!(result, Err(AppError::Parse { .. })));
    }

    #[test]
    fn test_bad_price_is_parse_error() {
        let html = r#"
            <div onclick="showPointDetails('A','G1','22','free')">
              <div class="charg-list site-details"></div>
            </div>"#;
        assert!(matches!(
            parse_points_page(html, &page_url()),
            Err(AppError::Parse { .. })
        ));
    }

    #[test]
    fn test_non_finite_power_is_parse_error() {
        for power in ["NaN", "inf", "-infinity"] {
            let html = format!(
                r#"<div onclick="showPointDetails('A','G1','{power}','0.10')">
                     <div class="charg-list site-details"></div>
                   </div>"#
            );
            assert!(
                matches!(
                    parse_points_page(&html, &page_url()),
                    Err(AppError::Parse { .. })
                ),
                "power {power} was accepted"
            );
        }
    }

    #[test]
    fn test_too_few_arguments_is_parse_error() {
        let html = r#"
            <div onclick="showPointDetails('A','G1')">
              <div class="charg-list site-details"></div>
            </div>"#;
        assert!(parse_points_page(html, &page_url()).is_err());
    }

    #[test]
    fn test_parse_search_response() {
        let body = r#"{
            "MessagePoint": "S1",
            "objSites": [
                {
                    "RefGuid": "S1",
                    "SiteName": "Village Hall",
                    "Address": "1 High Street",
                    "Town": "Banbury",
                    "County": null,
                    "Postcode": "OX16 1AA",
                    "Country": "United Kingdom",
                    "Latitude": 52.0629,
                    "Longitude": "-1.3397"
                }
            ]
        }"#;

        let sites = parse_search_response(body).unwrap();
        assert_eq!(sites.len(), 1);
        let site = &sites[0];
        assert_eq!(site.guid, "S1");
        assert_eq!(site.name.as_deref(), Some("Village Hall"));
        assert_eq!(site.county, None);
        assert_eq!(site.latitude.as_deref(), Some("52.0629"));
        assert!(site.points.is_empty());
    }

    #[test]
    fn test_search_response_without_sites() {
        assert!(parse_search_response("{}").unwrap().is_empty());
        assert!(parse_search_response(r#"{"objSites": null}"#).unwrap().is_empty());
        assert!(parse_search_response(r#"{"objSites": [{"SiteName": "x"}]}"#).is_err());
    }

    #[tokio::test]
    async fn test_client_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/nologinsites"))
            .and(body_partial_json(json!({ "SearchKey": "banbury", "PaymentType": "-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "objSites": [{ "RefGuid": "S1", "SiteName": "Village Hall" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/nologinpoints/S1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(POINTS_PAGE))
            .mount(&server)
            .await;

        let config = FetcherConfig {
            base_url: server.uri(),
            ..FetcherConfig::default()
        };
        let client = EvChargeClient::new(&config).unwrap();

        let sites = client.search("banbury").await.unwrap();
        assert_eq!(sites.len(), 1);

        let points = client.refresh_points(&sites[0]).await.unwrap();
        assert_eq!(points.keys().collect::<Vec<_>>(), vec!["G1", "G2"]);
    }

    #[tokio::test]
    async fn test_http_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let config = FetcherConfig {
            base_url: server.uri(),
            ..FetcherConfig::default()
        };
        let client = EvChargeClient::new(&config).unwrap();
        let result = client.refresh_points(&Site::new("S1")).await;
        assert!(matches!(result, Err(AppError::Http(_))));
    }
}
