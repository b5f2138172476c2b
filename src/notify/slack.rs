//! Slack notifier.
//!
//! Posts Block Kit messages either to an incoming webhook URL or to the
//! `chat.postMessage` API with a bearer token. Only token mode can choose the
//! channel, icon and username; a webhook is bound to all three.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{Value, json};

use super::Notifier;
use crate::error::{AppError, Result};
use crate::models::{
    ConnectorType, FetcherConfig, PointChangeKind, PointField, PointState, Site, SiteDiff,
    SlackConfig,
};
use crate::utils::http::create_async_client;
use crate::utils::join_path;

const SINK: &str = "slack";

#[derive(Debug, Clone)]
enum Auth {
    Hook(String),
    Token {
        token: String,
        api_url: String,
        channel_id: Option<String>,
        icon_emoji: Option<String>,
        username: Option<String>,
    },
}

/// Which optional lines to add under each point.
#[derive(Debug, Clone, Copy, Default)]
pub struct Details {
    pub price: bool,
    pub connector: bool,
    pub power: bool,
}

impl Details {
    pub const ALL: Details = Details {
        price: true,
        connector: true,
        power: true,
    };
    pub const NONE: Details = Details {
        price: false,
        connector: false,
        power: false,
    };
    pub const PRICE: Details = Details {
        price: true,
        connector: false,
        power: false,
    };
}

/// Sends status and change messages to Slack.
pub struct SlackNotifier {
    client: Client,
    auth: Auth,
    base_url: String,
}

impl SlackNotifier {
    /// Build a notifier, rejecting invalid auth combinations up front.
    pub fn new(config: &SlackConfig, fetcher: &FetcherConfig) -> Result<Self> {
        config.validate()?;

        let auth = match (&config.hook_url, &config.token) {
            (Some(hook_url), None) => Auth::Hook(hook_url.clone()),
            (None, Some(token)) => Auth::Token {
                token: token.clone(),
                api_url: config.api_url.clone(),
                channel_id: config.channel_id.clone(),
                icon_emoji: config.icon_emoji.as_deref().map(normalise_emoji),
                username: config.username.clone(),
            },
            _ => {
                return Err(AppError::config(
                    "Slack needs exactly one of slack.hook_url or slack.token",
                ));
            }
        };

        Ok(Self {
            client: create_async_client(fetcher)?,
            auth,
            base_url: fetcher.base_url.clone(),
        })
    }

    async fn send(&self, mut message: Value) -> Result<()> {
        message["unfurl_links"] = Value::Bool(false);

        let request = match &self.auth {
            Auth::Hook(url) => self.client.post(url),
            Auth::Token {
                token,
                api_url,
                channel_id,
                icon_emoji,
                username,
            } => {
                for (key, value) in [
                    ("channel", channel_id),
                    ("icon_emoji", icon_emoji),
                    ("username", username),
                ] {
                    if let Some(value) = value {
                        message[key] = Value::String(value.clone());
                    }
                }
                self.client
                    .post(api_url)
                    .header(AUTHORIZATION, format!("Bearer {token}"))
            }
        };

        let response = request
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .header(ACCEPT, "application/json")
            .json(&message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::notify(SINK, format!("HTTP {status}: {body}")));
        }

        // The Web API reports failures in the body with a 200 status
        if let Auth::Token { .. } = self.auth {
            let body: Value = response.json().await?;
            if body.get("ok").and_then(Value::as_bool) != Some(true) {
                let error = body
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(AppError::notify(SINK, error));
            }
        }

        Ok(())
    }

    async fn post(&self, site: &Site, heading: &str, details: Details) -> Result<()> {
        let points_url = join_path(&self.base_url, &format!("nologinpoints/{}", site.guid))?;
        let message = build_message(site, heading, details, points_url.as_str());
        log::debug!("Posting to Slack: {heading}");
        self.send(message).await
    }
}

fn normalise_emoji(icon: &str) -> String {
    let name = icon.trim().trim_matches(':');
    format!(":{name}:")
}

fn state_style(state: PointState) -> Option<&'static str> {
    match state {
        PointState::Available => Some("primary"),
        PointState::Charging => Some("danger"),
        PointState::Offline | PointState::Unknown => None,
    }
}

/// Build the Block Kit payload for a site.
pub fn build_message(site: &Site, heading: &str, details: Details, points_url: &str) -> Value {
    let mut blocks = vec![json!({
        "type": "header",
        "text": { "type": "plain_text", "text": heading }
    })];

    for point in site.points.values() {
        let mut text = format!("*{}*", point.point_id);
        if details.connector && point.connector_type != ConnectorType::Unknown {
            text.push_str(&format!(
                "\n:electric_plug: {}",
                point.connector_type.display_name()
            ));
        }
        if details.power {
            text.push_str(&format!("\n:zap: {} kW", point.max_power));
        }
        if details.price {
            text.push_str(&format!("\n:pound: £{}/kWh", point.price));
        }

        let mut accessory = json!({
            "type": "button",
            "text": { "type": "plain_text", "text": point.state.display_name() },
            "url": points_url,
        });
        if let Some(style) = state_style(point.state) {
            accessory["style"] = Value::String(style.to_string());
        }

        blocks.push(json!({ "type": "divider" }));
        blocks.push(json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": text },
            "accessory": accessory,
        }));
    }

    json!({ "blocks": blocks })
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify_state(&self, site: &Site) -> Result<()> {
        let heading = format!("Current status of charge points at {}", site.display_name());
        self.post(site, &heading, Details::ALL).await
    }

    /// Only point changes are posted; site metadata edits are ignored.
    async fn notify_changes(&self, diff: &SiteDiff) -> Result<()> {
        let site = diff.new_site();
        let site_name = site.display_name();

        for (guid, point) in diff.points() {
            let point_id = diff.point_id(guid).unwrap_or(guid);

            match point.kind {
                PointChangeKind::Added => {
                    let heading = format!("New charge point, {point_id} added at {site_name}");
                    self.post(site, &heading, Details::ALL).await?;
                }
                PointChangeKind::Removed => {
                    let heading = format!("Charge point {point_id} removed from {site_name}");
                    self.post(site, &heading, Details::NONE).await?;
                }
                PointChangeKind::Modified => {
                    if point.get(PointField::Price).is_some() {
                        let heading = format!("Price changed for {point_id} at {site_name}");
                        self.post(site, &heading, Details::PRICE).await?;
                    }
                    if let Some(change) = point.get(PointField::State) {
                        let heading = format!(
                            "Point {point_id} went from {} to {}.",
                            change.old, change.new
                        );
                        self.post(site, &heading, Details::NONE).await?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::models::Point;
    use crate::pipeline::compare;

    fn sample_site() -> Site {
        let mut site = Site::new("S1");
        site.name = Some("Village Hall".into());
        site.insert_point(
            Point::new("P1", "UKEV1381", PointState::Available, Decimal::new(18, 2), 22.0)
                .with_connector(ConnectorType::Type2),
        );
        site.insert_point(Point::new(
            "P2",
            "UKEV1382",
            PointState::Offline,
            Decimal::new(25, 2),
            7.0,
        ));
        site
    }

    fn hook_config(url: String) -> SlackConfig {
        SlackConfig {
            hook_url: Some(url),
            ..SlackConfig::default()
        }
    }

    fn token_config(api_url: String) -> SlackConfig {
        SlackConfig {
            token: Some("xoxb-1".into()),
            channel_id: Some("C123".into()),
            icon_emoji: Some("zap".into()),
            username: Some("evcharge".into()),
            api_url,
            ..SlackConfig::default()
        }
    }

    #[test]
    fn test_hook_mode_rejects_bot_fields() {
        let mut config = hook_config("https://hooks.slack.com/services/x".into());
        config.channel_id = Some("C123".into());
        let result = SlackNotifier::new(&config, &FetcherConfig::default());
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_requires_hook_or_token() {
        let result = SlackNotifier::new(&SlackConfig::default(), &FetcherConfig::default());
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_normalise_emoji() {
        assert_eq!(normalise_emoji("zap"), ":zap:");
        assert_eq!(normalise_emoji(":zap:"), ":zap:");
    }

    #[test]
    fn test_build_message_blocks() {
        let message = build_message(
            &sample_site(),
            "Heading",
            Details::ALL,
            "https://evcharge.online/nologinpoints/S1",
        );
        let blocks = message["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 1 + 2 * 2);
        assert_eq!(blocks[0]["text"]["text"], "Heading");
        assert_eq!(blocks[1]["type"], "divider");

        let section = &blocks[2];
        assert_eq!(
            section["text"]["text"],
            "*UKEV1381*\n:electric_plug: Type 2\n:zap: 22 kW\n:pound: £0.18/kWh"
        );
        assert_eq!(section["accessory"]["text"]["text"], "Available");
        assert_eq!(section["accessory"]["style"], "primary");
        assert_eq!(
            section["accessory"]["url"],
            "https://evcharge.online/nologinpoints/S1"
        );

        // Offline points get no style and unknown connectors are omitted
        let offline = &blocks[4];
        assert!(offline["accessory"].get("style").is_none());
        assert!(!offline["text"]["text"].as_str().unwrap().contains("electric_plug"));
    }

    #[tokio::test]
    async fn test_hook_mode_posts_without_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(json!({ "unfurl_links": false })))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = SlackNotifier::new(
            &hook_config(format!("{}/hook", server.uri())),
            &FetcherConfig::default(),
        )
        .unwrap();
        notifier.notify_state(&sample_site()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(!requests[0].headers.contains_key("authorization"));
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            body["blocks"][0]["text"]["text"],
            "Current status of charge points at Village Hall"
        );
        assert!(body.get("channel").is_none());
    }

    #[tokio::test]
    async fn test_token_mode_sets_bot_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat.postMessage"))
            .and(header("authorization", "Bearer xoxb-1"))
            .and(body_partial_json(json!({
                "channel": "C123",
                "icon_emoji": ":zap:",
                "username": "evcharge",
                "unfurl_links": false,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = SlackNotifier::new(
            &token_config(format!("{}/api/chat.postMessage", server.uri())),
            &FetcherConfig::default(),
        )
        .unwrap();
        notifier.notify_state(&sample_site()).await.unwrap();
    }

    #[tokio::test]
    async fn test_token_mode_body_error_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": false, "error": "channel_not_found" })),
            )
            .mount(&server)
            .await;

        let notifier = SlackNotifier::new(
            &token_config(format!("{}/api", server.uri())),
            &FetcherConfig::default(),
        )
        .unwrap();
        let result = notifier.notify_state(&sample_site()).await;

        match result {
            Err(AppError::Notify { message, .. }) => assert_eq!(message, "channel_not_found"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_success_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = SlackNotifier::new(
            &hook_config(format!("{}/hook", server.uri())),
            &FetcherConfig::default(),
        )
        .unwrap();
        let result = notifier.notify_state(&sample_site()).await;
        assert!(matches!(result, Err(AppError::Notify { .. })));
    }

    #[tokio::test]
    async fn test_changes_post_one_message_per_fact() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let notifier = SlackNotifier::new(
            &hook_config(format!("{}/hook", server.uri())),
            &FetcherConfig::default(),
        )
        .unwrap();

        let old = sample_site();
        let mut new = old.clone();
        new.name = Some("Renamed Hall".into());
        if let Some(p) = new.points.get_mut("P1") {
            p.state = PointState::Charging;
            p.price = Decimal::new(20, 2);
        }
        new.points.remove("P2");
        new.insert_point(Point::new("P3", "UKEV1383", PointState::Available, Decimal::ONE, 50.0));

        notifier
            .notify_changes(&compare(&old, &new).unwrap())
            .await
            .unwrap();

        let headings: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| {
                let body: Value = serde_json::from_slice(&r.body).unwrap();
                body["blocks"][0]["text"]["text"].as_str().unwrap().to_string()
            })
            .collect();

        assert_eq!(
            headings,
            vec![
                "Price changed for UKEV1381 at Renamed Hall",
                "Point UKEV1381 went from Available to Charging.",
                "Charge point UKEV1382 removed from Renamed Hall",
                "New charge point, UKEV1383 added at Renamed Hall",
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_diff_posts_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let notifier = SlackNotifier::new(
            &hook_config(format!("{}/hook", server.uri())),
            &FetcherConfig::default(),
        )
        .unwrap();
        let site = sample_site();
        notifier
            .notify_changes(&compare(&site, &site).unwrap())
            .await
            .unwrap();
    }
}
