//! Subject image generation
//!
//! Builds a styled prompt for a vehicle or part and asks an external
//! generation endpoint for an image. Callers treat failures as non-fatal and
//! fall back to the curated image table.

use async_trait::async_trait;
use restomod_core::{ImageStyle, Subject};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::ImageConfig;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image API error: {0}")]
    Api(String),

    #[error("Image generation is not configured")]
    NotConfigured,
}

/// Anything that can turn a subject into an image URL.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn generate(&self, subject: &Subject, style: ImageStyle) -> Result<String, ImageError>;
}

/// Prompt text for a subject in the given style.
pub fn build_prompt(subject: &Subject, style: ImageStyle) -> String {
    let mut prompt = match subject {
        Subject::Part {
            part,
            model: Some(model),
        } => format!(
            "A photorealistic image of a {} specifically designed for a {} classic car, detailed product photography with studio lighting",
            part, model
        ),
        Subject::Part { part, model: None } => format!(
            "A photorealistic image of a {} for classic cars, detailed product photography with studio lighting",
            part
        ),
        Subject::Vehicle { model } => format!(
            "A photorealistic image of a {} classic car, restored to pristine condition, professional automotive photography, studio lighting",
            model
        ),
    };

    match style {
        ImageStyle::Realistic => {}
        ImageStyle::Blueprint => {
            prompt.push_str(", technical blueprint style, blue background with white lines, schematic drawing")
        }
        ImageStyle::Vintage => prompt.push_str(
            ", vintage photography style, slightly faded colors, film grain texture, 1960s advertisement aesthetic",
        ),
        ImageStyle::Modern => prompt.push_str(
            ", modern automotive photography, vibrant colors, dramatic lighting, high contrast, showroom quality",
        ),
    }

    prompt.push_str(", 4K, highly detailed, professional photography");
    prompt
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    car: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    part: Option<&'a str>,
    style: ImageStyle,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    image_url: Option<String>,
    success: Option<bool>,
    image_data: Option<String>,
    mime_type: Option<String>,
    error: Option<String>,
}

impl ImageResponse {
    fn into_url(self) -> Result<String, ImageError> {
        if let Some(url) = self.image_url.filter(|u| !u.trim().is_empty()) {
            return Ok(url);
        }
        if self.success == Some(true) {
            if let Some(data) = self.image_data.filter(|d| !d.is_empty()) {
                let mime = self.mime_type.unwrap_or_else(|| "image/png".to_string());
                return Ok(format!("data:{};base64,{}", mime, data));
            }
        }
        Err(ImageError::Api(
            self.error
                .unwrap_or_else(|| "No image data received".to_string()),
        ))
    }
}

/// HTTP client for the image generation endpoint
pub struct ImageClient {
    client: reqwest::Client,
    endpoint: String,
}

impl ImageClient {
    /// Create a client from config.
    ///
    /// # Errors
    /// Returns `ImageError::NotConfigured` without an endpoint, or
    /// `ImageError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ImageConfig) -> Result<Self, ImageError> {
        let endpoint = config
            .endpoint
            .clone()
            .filter(|e| !e.trim().is_empty())
            .ok_or(ImageError::NotConfigured)?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ImageSource for ImageClient {
    async fn generate(&self, subject: &Subject, style: ImageStyle) -> Result<String, ImageError> {
        let request = ImageRequest {
            prompt: build_prompt(subject, style),
            car: subject.vehicle_model(),
            part: subject.part_name(),
            style,
        };
        debug!("Image prompt: {}", request.prompt);

        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageError::Api(format!("HTTP {}: {}", status, body)));
        }

        let body: ImageResponse = response.json().await?;
        body.into_url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn vehicle(model: &str) -> Subject {
        Subject::Vehicle {
            model: model.to_string(),
        }
    }

    #[test]
    fn test_vehicle_prompt() {
        let prompt = build_prompt(&vehicle("1967 Ford Mustang"), ImageStyle::Realistic);
        assert_eq!(
            prompt,
            "A photorealistic image of a 1967 Ford Mustang classic car, restored to pristine condition, \
             professional automotive photography, studio lighting, 4K, highly detailed, professional photography"
        );
    }

    #[test]
    fn test_part_with_vehicle_prompt() {
        let subject = Subject::Part {
            part: "Brakes".to_string(),
            model: Some("1969 Chevrolet Camaro".to_string()),
        };
        let prompt = build_prompt(&subject, ImageStyle::Blueprint);
        assert!(prompt.starts_with(
            "A photorealistic image of a Brakes specifically designed for a 1969 Chevrolet Camaro classic car"
        ));
        assert!(prompt.contains("technical blueprint style"));
        assert!(prompt.ends_with(", 4K, highly detailed, professional photography"));
    }

    #[test]
    fn test_part_alone_prompt() {
        let subject = Subject::Part {
            part: "Wheels".to_string(),
            model: None,
        };
        let prompt = build_prompt(&subject, ImageStyle::Vintage);
        assert!(prompt.starts_with("A photorealistic image of a Wheels for classic cars"));
        assert!(prompt.contains("1960s advertisement aesthetic"));
    }

    #[test]
    fn test_client_requires_endpoint() {
        assert!(matches!(
            ImageClient::new(&ImageConfig::default()),
            Err(ImageError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_generate_returns_url() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/gemini")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "car": "1970 Dodge Charger",
                "style": "modern"
            })))
            .with_status(200)
            .with_body(r#"{"imageUrl": "https://img.example/charger.png"}"#)
            .create_async()
            .await;

        let client = ImageClient::new(&ImageConfig {
            endpoint: Some(format!("{}/api/gemini", server.url())),
            ..ImageConfig::default()
        })
        .unwrap();

        let url = client
            .generate(&vehicle("1970 Dodge Charger"), ImageStyle::Modern)
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(url, "https://img.example/charger.png");
    }

    #[tokio::test]
    async fn test_generate_inline_data() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/gemini")
            .with_status(200)
            .with_body(r#"{"success": true, "imageData": "AAAA", "mimeType": "image/jpeg"}"#)
            .create_async()
            .await;

        let client = ImageClient::new(&ImageConfig {
            endpoint: Some(format!("{}/api/gemini", server.url())),
            ..ImageConfig::default()
        })
        .unwrap();

        let url = client
            .generate(&vehicle("1955 Chevrolet Bel Air"), ImageStyle::Realistic)
            .await
            .unwrap();
        assert_eq!(url, "data:image/jpeg;base64,AAAA");
    }

    #[tokio::test]
    async fn test_generate_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/gemini")
            .with_status(200)
            .with_body(r#"{"success": false, "error": "quota exceeded"}"#)
            .create_async()
            .await;

        let client = ImageClient::new(&ImageConfig {
            endpoint: Some(format!("{}/api/gemini", server.url())),
            ..ImageConfig::default()
        })
        .unwrap();

        let err = client
            .generate(&vehicle("1963 Corvette"), ImageStyle::Realistic)
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::Api(msg) if msg == "quota exceeded"));
    }
}
