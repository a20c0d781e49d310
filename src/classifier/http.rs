use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use std::time::Duration;

use crate::error::ClassifierError;
use crate::settings::ClassifierSettings;

use super::types::{ClassificationResult, DeviceStatus, Probe, Sample, WirePrediction};
use super::Classifier;

#[derive(Serialize)]
struct SensorPayload<'a> {
    sensor_values: &'a [u16],
}

/// Classifier backed by the prediction service's HTTP API.
#[derive(Clone)]
pub struct HttpClassifier {
    client: reqwest::Client,
    base_url: String,
    settings: ClassifierSettings,
    /// Per-request budget for the health and device-status calls.
    probe_timeout: Duration,
}

impl HttpClassifier {
    pub fn new(settings: ClassifierSettings, request_timeout: Duration) -> anyhow::Result<Self> {
        let base_url = settings.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            anyhow::bail!("classifier base URL is empty");
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url,
            settings,
            probe_timeout: request_timeout,
        })
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    async fn read_prediction(
        &self,
        response: reqwest::Response,
    ) -> Result<ClassificationResult, ClassifierError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(ClassifierError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let wire: WirePrediction = serde_json::from_str(&body)
            .map_err(|e| ClassifierError::Malformed(format!("{e}: {body}")))?;
        wire.into_result()
    }

    async fn fetch_device_status(&self, path: &str) -> Option<DeviceStatus> {
        let url = self.url(path);
        match self
            .client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                match response.json::<DeviceStatus>().await {
                    Ok(status) => Some(status),
                    Err(e) => {
                        warn!("Device status at {} was not understood: {}", url, e);
                        None
                    }
                }
            }
            Ok(response) => {
                warn!("Device status at {} returned {}", url, response.status());
                None
            }
            Err(e) => {
                warn!("Device status request to {} failed: {}", url, e);
                None
            }
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn probe(&self) -> Result<Probe, ClassifierError> {
        let url = self.url(&self.settings.health_path);
        debug!("Probing classifier health at {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            warn!("Classifier health check returned {}", response.status());
            return Ok(Probe::unreachable());
        }

        let device = match self.settings.device_status_path.as_deref() {
            Some(path) => self.fetch_device_status(path).await,
            None => None,
        };
        if let Some(status) = &device {
            info!(
                "Device status: model_loaded={} ({} extra fields)",
                status.model_loaded,
                status.extra.len()
            );
        }

        Ok(Probe {
            reachable: true,
            device,
        })
    }

    async fn classify(&self, sample: &Sample) -> Result<ClassificationResult, ClassifierError> {
        let response = match sample {
            Sample::Frame(jpeg) => {
                let part = Part::bytes(jpeg.clone())
                    .file_name("frame.jpg")
                    .mime_str("image/jpeg")
                    .map_err(|e| ClassifierError::Transport(e.to_string()))?;
                let form = Form::new().part("frame", part);
                self.client
                    .post(self.url(&self.settings.frame_path))
                    .multipart(form)
                    .send()
                    .await?
            }
            Sample::Sensor(values) => {
                self.client
                    .post(self.url(&self.settings.sensor_path))
                    .json(&SensorPayload {
                        sensor_values: values,
                    })
                    .send()
                    .await?
            }
            Sample::Pull => return self.fetch_latest().await,
        };

        self.read_prediction(response).await
    }

    async fn fetch_latest(&self) -> Result<ClassificationResult, ClassifierError> {
        let response = self
            .client
            .get(self.url(&self.settings.latest_path))
            .send()
            .await?;
        self.read_prediction(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_join_without_double_slashes() {
        let settings = ClassifierSettings {
            base_url: "http://localhost:5000/".into(),
            ..ClassifierSettings::default()
        };
        let classifier = HttpClassifier::new(settings, Duration::from_secs(1)).unwrap();
        assert_eq!(classifier.url("/health"), "http://localhost:5000/health");
        assert_eq!(classifier.url("esp32/latest"), "http://localhost:5000/esp32/latest");
    }

    #[test]
    fn empty_base_url_is_rejected() {
        let settings = ClassifierSettings {
            base_url: "  ".into(),
            ..ClassifierSettings::default()
        };
        assert!(HttpClassifier::new(settings, Duration::from_secs(1)).is_err());
    }
}
