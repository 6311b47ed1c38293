use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, Response,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use crate::{
    config::ClientConfig,
    error::{DoctorError, Result},
    model::{CureInfo, PredictionResult},
    preview::SelectedFile,
};

const PREDICT_PATH: &str = "predict";
const CURE_PATH: &str = "get_cure";
const FILE_FIELD: &str = "file";

/// The two calls a diagnosis needs.
#[async_trait]
pub trait DiagnosisApi: Send + Sync {
    /// Classifies the image into a disease label.
    async fn predict(&self, file: &SelectedFile) -> Result<PredictionResult>;

    /// Maps a disease label to its cure information.
    async fn lookup_cure(&self, disease: &str) -> Result<CureInfo>;
}

/// `DiagnosisApi` over the Flask-style HTTP service.
#[derive(Debug, Clone)]
pub struct HttpDiagnosisApi {
    client: Client,
    predict_url: Url,
    cure_url: Url,
}

impl HttpDiagnosisApi {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(HttpDiagnosisApi {
            client,
            predict_url: config.resolve(PREDICT_PATH)?,
            cure_url: config.resolve(CURE_PATH)?,
        })
    }
}

#[async_trait]
impl DiagnosisApi for HttpDiagnosisApi {
    async fn predict(&self, file: &SelectedFile) -> Result<PredictionResult> {
        let part = Part::bytes(file.content().to_vec())
            .file_name(file.name().to_string())
            .mime_str(file.mime_type())?;
        let form = Form::new().part(FILE_FIELD, part);

        tracing::debug!(url = %self.predict_url, file = file.name(), "sending prediction request");
        let response = self
            .client
            .post(self.predict_url.clone())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, "prediction endpoint returned failure");
            return Err(DoctorError::PredictionFailed { status });
        }
        let prediction: PredictionResult = read_json(response).await?;
        tracing::debug!(?prediction, "prediction received");
        Ok(prediction)
    }

    async fn lookup_cure(&self, disease: &str) -> Result<CureInfo> {
        tracing::debug!(url = %self.cure_url, disease, "sending cure lookup");
        let response = self
            .client
            .post(self.cure_url.clone())
            .json(&json!({ "disease": disease }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, disease, "cure endpoint returned failure");
            return Err(DoctorError::CureLookupFailed { status });
        }
        let cure_info: CureInfo = read_json(response).await?;
        tracing::debug!(?cure_info, "cure info received");
        Ok(cure_info)
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}
