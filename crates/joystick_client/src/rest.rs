#![forbid(unsafe_code)]

//! REST companion to the gateway: OAuth token exchange and the handful of
//! account endpoints the realtime feed does not cover.

use anyhow::{Context, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::Utc;
use serde::Deserialize;

use crate::SecretString;

/// A minted or refreshed OAuth token pair.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
	pub access_token: String,
	#[serde(default)]
	pub refresh_token: Option<String>,
	#[serde(default)]
	pub expires_in: i64,
}

/// The authenticated user's stream settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSettings {
	#[serde(default)]
	pub username: String,
	#[serde(default)]
	pub stream_title: String,
	#[serde(default)]
	pub chat_welcome_message: String,
	#[serde(default)]
	pub banned_chat_words: Vec<String>,
	#[serde(default)]
	pub device_active: bool,
	#[serde(default)]
	pub photo_url: String,
	#[serde(default)]
	pub live: bool,
	#[serde(default)]
	pub number_of_followers: i64,
	#[serde(default)]
	pub channel_id: String,
}

/// One subscriber row from the subscriptions listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscriber {
	#[serde(default)]
	pub username: String,
	/// Expiry date in `YYYY-MM-DD` form.
	#[serde(default)]
	pub expires_at: String,
}

#[derive(Debug, Deserialize)]
struct SubscriberPage {
	#[serde(default)]
	items: Vec<Subscriber>,
	#[serde(default)]
	pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
	#[serde(default)]
	total_pages: u32,
}

const SUBSCRIBERS_PER_PAGE: u32 = 25;

/// Client for the joystick.tv REST API.
#[derive(Debug, Clone)]
pub struct JoystickApiClient {
	base_url: String,
	basic_key: String,
	client: reqwest::Client,
}

impl JoystickApiClient {
	pub fn new(client_id: impl Into<String>, client_secret: &SecretString) -> Self {
		let basic_key = BASE64_STANDARD.encode(format!("{}:{}", client_id.into(), client_secret.expose()));
		Self {
			base_url: "https://joystick.tv".to_string(),
			basic_key,
			client: reqwest::Client::new(),
		}
	}

	pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = base_url.into();
		self
	}

	/// Exchange an authorization code for a token pair.
	pub async fn exchange_code(&self, code: &str) -> anyhow::Result<AccessToken> {
		self.token_request(&[
			("grant_type", "authorization_code"),
			("code", code),
			("redirect_uri", "unused"),
		])
		.await
	}

	/// Mint a fresh token pair from a refresh token.
	pub async fn refresh_access_token(&self, refresh_token: &str) -> anyhow::Result<AccessToken> {
		self.token_request(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
			.await
	}

	async fn token_request(&self, form: &[(&str, &str)]) -> anyhow::Result<AccessToken> {
		let url = format!("{}/api/oauth/token", self.base_url.trim_end_matches('/'));
		let resp = self
			.client
			.post(url)
			.header("Authorization", format!("Basic {}", self.basic_key))
			.header("Accept", "application/json")
			.form(form)
			.send()
			.await
			.context("joystick oauth token")?;

		if !resp.status().is_success() {
			return Err(anyhow!("joystick oauth token failed: status={}", resp.status()));
		}

		let token: AccessToken = resp.json().await.context("parse oauth token response")?;
		if token.access_token.is_empty() {
			return Err(anyhow!("joystick oauth token response carried no access token"));
		}
		Ok(token)
	}

	/// Fetch the authenticated user's stream settings.
	pub async fn stream_settings(&self, access_token: &SecretString) -> anyhow::Result<StreamSettings> {
		let url = format!("{}/api/users/stream-settings", self.base_url.trim_end_matches('/'));
		let resp = self
			.client
			.get(url)
			.header("Authorization", format!("Bearer {}", access_token.expose()))
			.send()
			.await
			.context("joystick stream settings")?;

		if !resp.status().is_success() {
			return Err(anyhow!("joystick stream settings failed: status={}", resp.status()));
		}

		resp.json().await.context("parse stream settings response")
	}

	/// List subscribers, walking every page. With `active_only` set, rows
	/// whose expiry date is before today (UTC) are dropped.
	pub async fn subscribers(&self, access_token: &SecretString, active_only: bool) -> anyhow::Result<Vec<Subscriber>> {
		let today = Utc::now().format("%Y-%m-%d").to_string();
		let mut out = Vec::new();

		let mut page: u32 = 1;
		let mut total_pages: u32 = 1;
		while page <= total_pages {
			let url = format!("{}/api/users/subscriptions", self.base_url.trim_end_matches('/'));
			let resp = self
				.client
				.get(url)
				.query(&[("per_page", SUBSCRIBERS_PER_PAGE), ("page", page)])
				.header("Authorization", format!("Bearer {}", access_token.expose()))
				.send()
				.await
				.context("joystick subscriptions")?;

			if !resp.status().is_success() {
				return Err(anyhow!("joystick subscriptions failed: status={}", resp.status()));
			}

			let body: SubscriberPage = resp.json().await.context("parse subscriptions response")?;
			total_pages = body.pagination.total_pages;

			for item in body.items {
				// Dates are ISO formatted, so the lexicographic compare is
				// also the chronological one.
				if !active_only || item.expires_at.as_str() >= today.as_str() {
					out.push(item);
				}
			}

			page += 1;
		}

		Ok(out)
	}
}
