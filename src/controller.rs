//! Upload controller: owns the picked image and drives a diagnosis.
//!
//! A submission runs two calls back to back, `/predict` and then (when a
//! disease label came back) `/get_cure`, and stores the merged answer.
//! Submissions may overlap. Each one gets a generation number and a
//! cancellation token; starting a new submission cancels the previous one,
//! and only the latest generation is allowed to touch shared state when it
//! settles.

use std::{future::Future, path::Path, sync::Arc};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    api::DiagnosisApi,
    error::{DoctorError, Result},
    model::{CureInfo, MergedResult},
    notify::{Notification, Notifier},
    preview::{PreviewStore, PreviewUrl, SelectedFile},
};

/// Point-in-time copy of the controller state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub selected_file: Option<SelectedFile>,
    pub preview_url: Option<PreviewUrl>,
    pub is_loading: bool,
    pub result: Option<MergedResult>,
}

/// How a call to [`UploadController::on_submit`] ended.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// No file was selected, nothing happened.
    NothingSelected,
    Completed(MergedResult),
    Failed(DoctorError),
    /// A newer submission started before this one settled; its answer was dropped.
    Superseded,
}

impl SubmitOutcome {
    pub fn result(&self) -> Option<&MergedResult> {
        match self {
            SubmitOutcome::Completed(result) => Some(result),
            _ => None,
        }
    }
}

#[derive(Default)]
struct ControllerState {
    selected_file: Option<SelectedFile>,
    preview_url: Option<PreviewUrl>,
    is_loading: bool,
    result: Option<MergedResult>,
    generation: u64,
    in_flight: Option<CancellationToken>,
}

pub struct UploadController<A> {
    api: Arc<A>,
    notifier: Notifier,
    previews: PreviewStore,
    state: Mutex<ControllerState>,
    lifetime: CancellationToken,
}

impl<A: DiagnosisApi> UploadController<A> {
    pub fn new(api: A, notifier: Notifier) -> Self {
        Self::with_previews(api, notifier, PreviewStore::new())
    }

    pub fn with_previews(api: A, notifier: Notifier, previews: PreviewStore) -> Self {
        UploadController {
            api: Arc::new(api),
            notifier,
            previews,
            state: Mutex::new(ControllerState::default()),
            lifetime: CancellationToken::new(),
        }
    }

    pub fn previews(&self) -> &PreviewStore {
        &self.previews
    }

    /// Makes `file` the active selection. `None` (an empty pick) is ignored.
    pub async fn on_file_selected(&self, file: Option<SelectedFile>) {
        let Some(file) = file else {
            return;
        };

        let preview = self.previews.create(&file);
        let name = file.name().to_string();
        {
            let mut state = self.state.lock().await;
            if let Some(stale) = state.preview_url.replace(preview) {
                self.previews.revoke(&stale);
            }
            state.selected_file = Some(file);
        }

        tracing::info!(file = %name, "image selected");
        self.notifier.notify(Notification::image_uploaded(&name));
    }

    /// Loads an image from disk and selects it.
    ///
    /// Unreadable or non-image files are reported to the user and leave the
    /// current selection untouched.
    pub async fn select_path(&self, path: impl AsRef<Path>) -> Result<()> {
        match SelectedFile::from_path(path.as_ref()).await {
            Ok(file) => {
                self.on_file_selected(Some(file)).await;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(path = %path.as_ref().display(), error = %err, "image rejected");
                self.notifier.notify(Notification::error(err.to_string()));
                Err(err)
            }
        }
    }

    /// Whether the submit control is enabled.
    pub async fn can_submit(&self) -> bool {
        let state = self.state.lock().await;
        state.selected_file.is_some() && !state.is_loading
    }

    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state.lock().await;
        Snapshot {
            selected_file: state.selected_file.clone(),
            preview_url: state.preview_url.clone(),
            is_loading: state.is_loading,
            result: state.result.clone(),
        }
    }

    pub async fn result(&self) -> Option<MergedResult> {
        self.state.lock().await.result.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.lock().await.is_loading
    }

    /// Runs one diagnosis for the selected file.
    ///
    /// Guarded even though front ends disable submission without a file.
    pub async fn on_submit(&self) -> SubmitOutcome {
        let token = self.lifetime.child_token();
        let (generation, file) = {
            let mut state = self.state.lock().await;
            let Some(file) = state.selected_file.clone() else {
                return SubmitOutcome::NothingSelected;
            };
            state.generation += 1;
            if let Some(previous) = state.in_flight.replace(token.clone()) {
                previous.cancel();
            }
            state.is_loading = true;
            state.result = None;
            (state.generation, file)
        };

        tracing::info!(generation, file = file.name(), "submitting image for diagnosis");
        let outcome = diagnose(self.api.as_ref(), &file, &token).await;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            tracing::debug!(generation, latest = state.generation, "dropping superseded submission");
            return SubmitOutcome::Superseded;
        }
        state.in_flight = None;
        state.is_loading = false;

        match outcome {
            Ok(merged) => {
                state.result = Some(merged.clone());
                drop(state);
                tracing::info!(generation, disease = ?merged.label(), "diagnosis complete");
                self.notifier.notify(Notification::result_ready());
                SubmitOutcome::Completed(merged)
            }
            Err(err) => {
                drop(state);
                tracing::error!(generation, error = %err, "diagnosis failed");
                if !self.lifetime.is_cancelled() {
                    self.notifier.notify(Notification::error(err.to_string()));
                }
                SubmitOutcome::Failed(err)
            }
        }
    }

    /// Cancels every in-flight submission. The controller stays usable for
    /// reading state but new submissions are cancelled immediately.
    pub fn shutdown(&self) {
        self.lifetime.cancel();
    }
}

impl<A> Drop for UploadController<A> {
    fn drop(&mut self) {
        self.lifetime.cancel();
        if let Some(url) = self.state.get_mut().preview_url.take() {
            self.previews.revoke(&url);
        }
    }
}

async fn diagnose<A>(api: &A, file: &SelectedFile, token: &CancellationToken) -> Result<MergedResult>
where
    A: DiagnosisApi + ?Sized,
{
    let prediction = until_cancelled(token, api.predict(file)).await?;

    let cure_info = match prediction.label() {
        Some(disease) => until_cancelled(token, api.lookup_cure(disease)).await?,
        None => {
            tracing::warn!("prediction carried no disease label, skipping cure lookup");
            CureInfo::default()
        }
    };

    Ok(MergedResult::new(prediction, cure_info))
}

async fn until_cancelled<T, F>(token: &CancellationToken, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(DoctorError::Cancelled),
        result = call => result,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::Mutex as StdMutex,
    };

    use async_trait::async_trait;
    use reqwest::StatusCode;
    use serde_json::json;
    use tokio::sync::{mpsc::UnboundedReceiver, Notify};

    use super::*;
    use crate::{
        model::{PredictionResult, Steps},
        notify::Variant,
        preview::tests::{JPEG_MAGIC, PNG_MAGIC},
    };

    struct Scripted<T> {
        gate: Option<Arc<Notify>>,
        reply: Result<T>,
    }

    #[derive(Default)]
    struct FakeApi {
        predictions: StdMutex<VecDeque<Scripted<PredictionResult>>>,
        cures: StdMutex<VecDeque<Scripted<CureInfo>>>,
        predicted_files: StdMutex<Vec<String>>,
        cure_requests: StdMutex<Vec<String>>,
    }

    impl FakeApi {
        fn predicts(self, reply: Result<PredictionResult>) -> Self {
            self.predicts_after(None, reply)
        }

        fn predicts_after(self, gate: Option<Arc<Notify>>, reply: Result<PredictionResult>) -> Self {
            self.predictions.lock().unwrap().push_back(Scripted { gate, reply });
            self
        }

        fn cures(self, reply: Result<CureInfo>) -> Self {
            self.cures.lock().unwrap().push_back(Scripted { gate: None, reply });
            self
        }
    }

    #[async_trait]
    impl DiagnosisApi for FakeApi {
        async fn predict(&self, file: &SelectedFile) -> Result<PredictionResult> {
            self.predicted_files.lock().unwrap().push(file.name().to_string());
            let scripted = self
                .predictions
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected predict call");
            if let Some(gate) = scripted.gate {
                gate.notified().await;
            }
            scripted.reply
        }

        async fn lookup_cure(&self, disease: &str) -> Result<CureInfo> {
            self.cure_requests.lock().unwrap().push(disease.to_string());
            let scripted = self
                .cures
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected cure lookup");
            if let Some(gate) = scripted.gate {
                gate.notified().await;
            }
            scripted.reply
        }
    }

    fn controller(api: FakeApi) -> (UploadController<FakeApi>, UnboundedReceiver<Notification>) {
        let (notifier, rx) = Notifier::channel();
        (UploadController::new(api, notifier), rx)
    }

    fn leaf() -> SelectedFile {
        SelectedFile::new("leaf.jpg", JPEG_MAGIC).unwrap()
    }

    fn blight_cure() -> CureInfo {
        CureInfo {
            reason: Some("fungal infection".into()),
            treatment: Steps::new(["remove affected leaves", "apply fungicide"]),
            prevention: Steps::new(["avoid overhead watering"]),
            images: vec!["img1.jpg".into()],
        }
    }

    fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
        let mut seen = Vec::new();
        while let Ok(notification) = rx.try_recv() {
            seen.push(notification);
        }
        seen
    }

    #[tokio::test]
    async fn selecting_a_file_enables_submission() {
        let (controller, mut rx) = controller(FakeApi::default());
        assert!(!controller.can_submit().await);

        controller.on_file_selected(Some(leaf())).await;

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.selected_file.as_ref().map(SelectedFile::name), Some("leaf.jpg"));
        let preview = snapshot.preview_url.expect("preview is set");
        assert_eq!(controller.previews().resolve(&preview).as_deref(), Some(JPEG_MAGIC));
        assert!(controller.can_submit().await);

        let notes = drain(&mut rx);
        assert_eq!(notes, vec![Notification::image_uploaded("leaf.jpg")]);
        assert_eq!(notes[0].description, "leaf.jpg uploaded successfully");
    }

    #[tokio::test]
    async fn empty_pick_is_a_no_op() {
        let (controller, mut rx) = controller(FakeApi::default());
        controller.on_file_selected(None).await;
        assert_eq!(controller.snapshot().await, Snapshot::default());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn reselecting_drops_every_trace_of_the_first_file() {
        let (controller, _rx) = controller(FakeApi::default());
        controller.on_file_selected(Some(leaf())).await;
        let first_preview = controller.snapshot().await.preview_url.unwrap();

        let second = SelectedFile::new("stem.png", PNG_MAGIC).unwrap();
        controller.on_file_selected(Some(second.clone())).await;

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.selected_file, Some(second));
        assert_ne!(snapshot.preview_url.as_ref(), Some(&first_preview));
        assert_eq!(controller.previews().resolve(&first_preview), None);
        assert_eq!(controller.previews().live_count(), 1);
    }

    #[tokio::test]
    async fn rejected_path_keeps_the_current_selection() {
        let (controller, mut rx) = controller(FakeApi::default());
        controller.on_file_selected(Some(leaf())).await;
        drain(&mut rx);

        let path = std::env::temp_dir().join(format!("plant-doctor-{}.txt", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"just words").await.unwrap();
        let err = controller.select_path(&path).await.unwrap_err();
        tokio::fs::remove_file(&path).await.unwrap();

        assert!(matches!(err, DoctorError::UnsupportedFile(_)));
        assert_eq!(controller.snapshot().await.selected_file, Some(leaf()));
        let notes = drain(&mut rx);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].variant, Variant::Destructive);
    }

    #[tokio::test]
    async fn submit_without_a_file_does_nothing() {
        let (controller, mut rx) = controller(FakeApi::default());
        assert!(matches!(controller.on_submit().await, SubmitOutcome::NothingSelected));
        assert!(!controller.is_loading().await);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn leaf_blight_end_to_end() {
        let api = FakeApi::default()
            .predicts(Ok(PredictionResult::from_label("Leaf Blight")))
            .cures(Ok(blight_cure()));
        let (controller, mut rx) = controller(api);
        controller.on_file_selected(Some(leaf())).await;
        drain(&mut rx);

        let outcome = controller.on_submit().await;

        let result = outcome.result().expect("submission completes").clone();
        assert_eq!(result.label(), Some("Leaf Blight"));
        assert_eq!(result.cure_info, blight_cure());
        assert_eq!(controller.result().await, Some(result));
        assert!(!controller.is_loading().await);
        assert_eq!(*controller.api.cure_requests.lock().unwrap(), vec!["Leaf Blight"]);
        assert_eq!(*controller.api.predicted_files.lock().unwrap(), vec!["leaf.jpg"]);
        assert_eq!(drain(&mut rx), vec![Notification::result_ready()]);
    }

    #[tokio::test]
    async fn prediction_failure_leaves_result_absent() {
        let api = FakeApi::default().predicts(Err(DoctorError::PredictionFailed {
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }));
        let (controller, mut rx) = controller(api);
        controller.on_file_selected(Some(leaf())).await;
        drain(&mut rx);

        let outcome = controller.on_submit().await;

        assert!(matches!(outcome, SubmitOutcome::Failed(DoctorError::PredictionFailed { .. })));
        assert_eq!(controller.result().await, None);
        assert!(!controller.is_loading().await);
        assert!(controller.api.cure_requests.lock().unwrap().is_empty());
        assert_eq!(drain(&mut rx), vec![Notification::error("Prediction failed")]);
    }

    #[tokio::test]
    async fn cure_lookup_failure_leaves_result_absent() {
        let api = FakeApi::default()
            .predicts(Ok(PredictionResult::from_label("Tomato Leaf Mold")))
            .cures(Err(DoctorError::CureLookupFailed {
                status: StatusCode::BAD_REQUEST,
            }));
        let (controller, mut rx) = controller(api);
        controller.on_file_selected(Some(leaf())).await;
        drain(&mut rx);

        let outcome = controller.on_submit().await;

        assert!(matches!(outcome, SubmitOutcome::Failed(DoctorError::CureLookupFailed { .. })));
        assert_eq!(controller.result().await, None);
        assert!(!controller.is_loading().await);
        assert_eq!(drain(&mut rx), vec![Notification::error("Failed to fetch cure info")]);
    }

    #[tokio::test]
    async fn malformed_prediction_surfaces_its_message() {
        let parse = || serde_json::from_str::<PredictionResult>("[]").map_err(DoctorError::from);
        let message = parse().unwrap_err().to_string();
        let api = FakeApi::default().predicts(parse());
        let (controller, mut rx) = controller(api);
        controller.on_file_selected(Some(leaf())).await;
        drain(&mut rx);

        assert!(matches!(controller.on_submit().await, SubmitOutcome::Failed(DoctorError::Decode(_))));
        assert_eq!(drain(&mut rx), vec![Notification::error(message)]);
        assert_eq!(controller.result().await, None);
    }

    #[tokio::test]
    async fn empty_prediction_skips_cure_lookup() {
        let body = serde_json::from_value(json!({"prediction": "", "model": "mobilenetv2"})).unwrap();
        let (controller, _rx) = controller(FakeApi::default().predicts(Ok(body)));
        controller.on_file_selected(Some(leaf())).await;

        let result = controller.on_submit().await.result().cloned().unwrap();

        assert!(controller.api.cure_requests.lock().unwrap().is_empty());
        assert!(result.cure_info.is_empty());
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"prediction": "", "model": "mobilenetv2", "cure_info": {}})
        );
    }

    #[tokio::test]
    async fn loading_flag_covers_the_whole_submission() {
        let gate = Arc::new(Notify::new());
        let api = FakeApi::default()
            .predicts_after(Some(gate.clone()), Ok(PredictionResult::from_label("Leaf Blight")))
            .cures(Ok(blight_cure()));
        let (controller, _rx) = controller(api);
        let controller = Arc::new(controller);
        controller.on_file_selected(Some(leaf())).await;

        let running = tokio::spawn({
            let controller = controller.clone();
            async move { controller.on_submit().await }
        });
        while controller.api.predicted_files.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }

        let snapshot = controller.snapshot().await;
        assert!(snapshot.is_loading);
        assert_eq!(snapshot.result, None);
        assert!(!controller.can_submit().await);

        gate.notify_one();
        assert!(running.await.unwrap().result().is_some());
        assert!(!controller.is_loading().await);
        assert!(controller.can_submit().await);
    }

    #[tokio::test]
    async fn newer_submission_wins_over_a_stale_one() {
        let stale_gate = Arc::new(Notify::new());
        let api = FakeApi::default()
            .predicts_after(
                Some(stale_gate.clone()),
                Ok(PredictionResult::from_label("Potato Late Blight")),
            )
            .predicts(Ok(PredictionResult::from_label("Leaf Blight")))
            .cures(Ok(blight_cure()));
        let (controller, mut rx) = controller(api);
        let controller = Arc::new(controller);
        controller.on_file_selected(Some(leaf())).await;
        drain(&mut rx);

        let stale = tokio::spawn({
            let controller = controller.clone();
            async move { controller.on_submit().await }
        });
        while controller.api.predicted_files.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }

        let fresh = controller.on_submit().await;
        stale_gate.notify_one();
        let stale = stale.await.unwrap();

        assert!(matches!(stale, SubmitOutcome::Superseded));
        assert_eq!(fresh.result().and_then(MergedResult::label), Some("Leaf Blight"));
        assert_eq!(
            controller.result().await.as_ref().and_then(MergedResult::label),
            Some("Leaf Blight")
        );
        assert!(!controller.is_loading().await);
        assert_eq!(*controller.api.cure_requests.lock().unwrap(), vec!["Leaf Blight"]);
        assert_eq!(drain(&mut rx), vec![Notification::result_ready()]);
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_work() {
        let gate = Arc::new(Notify::new());
        let api = FakeApi::default()
            .predicts_after(Some(gate), Ok(PredictionResult::from_label("Leaf Blight")));
        let (controller, mut rx) = controller(api);
        let controller = Arc::new(controller);
        controller.on_file_selected(Some(leaf())).await;
        drain(&mut rx);

        let running = tokio::spawn({
            let controller = controller.clone();
            async move { controller.on_submit().await }
        });
        while controller.api.predicted_files.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }
        controller.shutdown();

        assert!(matches!(
            running.await.unwrap(),
            SubmitOutcome::Failed(DoctorError::Cancelled)
        ));
        assert_eq!(controller.result().await, None);
        assert!(!controller.is_loading().await);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn dropping_the_controller_revokes_its_preview() {
        let previews = PreviewStore::new();
        let controller =
            UploadController::with_previews(FakeApi::default(), Notifier::silent(), previews.clone());
        controller.on_file_selected(Some(leaf())).await;
        assert_eq!(previews.live_count(), 1);

        drop(controller);
        assert_eq!(previews.live_count(), 0);
    }
}
