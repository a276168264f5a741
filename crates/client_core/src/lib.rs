use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::de::DeserializeOwned;
use shared::{
    domain::{ImageRef, Recipe},
    error::{FetchError, FetchResult},
    protocol::{RandomImagePayload, RecipePayload},
};
use tracing::{debug, info, warn};
use url::Url;

pub mod rotation;
pub use rotation::{
    CarouselSnapshot, ImageWindow, RefreshOutcome, RotationEngine, RotationError, RotationEvent,
    RotationHandle, RotationSchedule, RotationState, RotationStatus,
};

pub const DEFAULT_RECIPE_ENDPOINT: &str = "https://api.sampleapis.com/coffee/iced";
pub const DEFAULT_IMAGE_ENDPOINT: &str = "https://coffee.alexflipnote.dev/random.json";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch_one(&self) -> FetchResult<ImageRef>;
}

#[async_trait]
pub trait RecipeSource: Send + Sync {
    async fn fetch_recipes(&self) -> FetchResult<Vec<Recipe>>;
}

/// Issues `count` independent fetches at once and waits for all of them.
/// Slot `i` of the output holds the outcome of request `i`.
pub async fn fetch_batch(source: &dyn ImageSource, count: usize) -> Vec<FetchResult<ImageRef>> {
    join_all((0..count).map(|_| source.fetch_one())).await
}

pub struct HttpFetchClient {
    http: Client,
    recipe_endpoint: Url,
    image_endpoint: Url,
    timeout: Duration,
}

impl HttpFetchClient {
    pub fn new(recipe_endpoint: &str, image_endpoint: &str, timeout: Duration) -> Result<Self> {
        let recipe_endpoint = Url::parse(recipe_endpoint)
            .with_context(|| format!("invalid recipe endpoint '{recipe_endpoint}'"))?;
        let image_endpoint = Url::parse(image_endpoint)
            .with_context(|| format!("invalid image endpoint '{image_endpoint}'"))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            http,
            recipe_endpoint,
            image_endpoint,
            timeout,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(
            DEFAULT_RECIPE_ENDPOINT,
            DEFAULT_IMAGE_ENDPOINT,
            DEFAULT_FETCH_TIMEOUT,
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &Url) -> FetchResult<T> {
        let response = self
            .http
            .get(endpoint.clone())
            .send()
            .await
            .map_err(|err| self.transport_error(endpoint, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| self.transport_error(endpoint, err))?;

        serde_json::from_slice(&body).map_err(|err| FetchError::Decode {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        })
    }

    fn transport_error(&self, endpoint: &Url, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                endpoint: endpoint.to_string(),
                after: self.timeout,
            }
        } else {
            FetchError::Network {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl ImageSource for HttpFetchClient {
    async fn fetch_one(&self) -> FetchResult<ImageRef> {
        let payload: RandomImagePayload = self.get_json(&self.image_endpoint).await?;
        let is_http = Url::parse(&payload.file)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !is_http {
            return Err(FetchError::InvalidImageUrl {
                endpoint: self.image_endpoint.to_string(),
                value: payload.file,
            });
        }

        debug!(image = %payload.file, "fetch: random image resolved");
        Ok(ImageRef::new(payload.file))
    }
}

#[async_trait]
impl RecipeSource for HttpFetchClient {
    async fn fetch_recipes(&self) -> FetchResult<Vec<Recipe>> {
        let payloads: Vec<RecipePayload> = self.get_json(&self.recipe_endpoint).await?;
        Ok(payloads.into_iter().map(Recipe::from).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeListState {
    Loading,
    Ready(Vec<Recipe>),
    Failed(String),
}

/// Single-shot load of the recipe grid.
pub async fn load_recipe_list(source: &dyn RecipeSource) -> RecipeListState {
    match source.fetch_recipes().await {
        Ok(recipes) => {
            info!(count = recipes.len(), "recipes: loaded recipe list");
            RecipeListState::Ready(recipes)
        }
        Err(err) => {
            warn!(endpoint = err.endpoint(), "recipes: failed to load recipe list: {err}");
            RecipeListState::Failed(err.to_string())
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
