use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

const PREDICTION_KEY: &str = "prediction";
const CURE_INFO_KEY: &str = "cure_info";

/// Body returned by `/predict`.
///
/// Only the `prediction` key means anything to us; every other field is kept
/// as-is and carried into the merged result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionResult {
    fields: Map<String, Value>,
}

impl PredictionResult {
    pub fn from_label(label: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(PREDICTION_KEY.to_string(), Value::String(label.to_string()));
        PredictionResult { fields }
    }

    /// The predicted disease, if the service gave a usable one.
    ///
    /// Accepts either a plain label (`"prediction": "Potato Late Blight"`) or a
    /// ranked list of `{class, probability}` entries, in which case the first
    /// entry wins. An empty label counts as no prediction.
    pub fn label(&self) -> Option<&str> {
        let label = match self.fields.get(PREDICTION_KEY)? {
            Value::String(label) => label.as_str(),
            Value::Array(ranked) => ranked.first()?.get("class")?.as_str()?,
            _ => return None,
        };
        if label.is_empty() {
            None
        } else {
            Some(label)
        }
    }
}

/// Body returned by `/get_cure`, normalized so that absent or `null` fields
/// become empty values instead of surprising the renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CureInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Steps::is_empty"
    )]
    pub treatment: Steps,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Steps::is_empty"
    )]
    pub prevention: Steps,
    #[serde(
        rename = "Image",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub images: Vec<String>,
}

impl CureInfo {
    pub fn is_empty(&self) -> bool {
        self.reason.is_none()
            && self.treatment.is_empty()
            && self.prevention.is_empty()
            && self.images.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Steps {
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps: Vec<String>,
}

impl Steps {
    pub fn new<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Steps {
            steps: steps.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Prediction fields joined with the cure lookup for that prediction.
///
/// `cure_info` is always present; when no lookup happened it is the empty
/// `CureInfo`, which serializes as `{}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    #[serde(flatten)]
    pub prediction: PredictionResult,
    pub cure_info: CureInfo,
}

impl MergedResult {
    pub fn new(mut prediction: PredictionResult, cure_info: CureInfo) -> Self {
        // cure_info always comes from the lookup, never from the prediction body
        prediction.fields.remove(CURE_INFO_KEY);
        MergedResult {
            prediction,
            cure_info,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.prediction.label()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
