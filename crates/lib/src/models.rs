//! Model selection state: available models and the active choice.

use crate::api::{ApiError, ChatApi, Model};

/// Read-only model list plus the current selection. Sending is gated on a
/// selection being present (together with an active conversation).
#[derive(Debug, Default)]
pub struct ModelPicker {
    models: Vec<Model>,
    selected: Option<String>,
    loading: bool,
    last_error: Option<String>,
}

impl ModelPicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Display name of the selected model, if it is still in the list.
    pub fn selected_name(&self) -> Option<&str> {
        let id = self.selected.as_deref()?;
        self.models
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.name.as_str())
    }

    pub fn take_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    pub fn clear(&mut self) {
        self.models.clear();
        self.selected = None;
        self.loading = false;
        self.last_error = None;
    }

    /// Select a model by id; ignored when the id is not in the list.
    pub fn select(&mut self, model_id: &str) {
        if self.models.iter().any(|m| m.id == model_id) {
            self.selected = Some(model_id.to_string());
        }
    }

    pub fn begin_refresh(&mut self) {
        self.loading = true;
    }

    /// A non-array or failed response degrades to an empty list plus a notice.
    /// A selection that survives the reload is kept.
    pub fn apply_refresh(&mut self, result: Result<Vec<Model>, ApiError>) {
        self.loading = false;
        match result {
            Ok(models) => {
                self.models = models;
                if let Some(ref id) = self.selected {
                    if !self.models.iter().any(|m| &m.id == id) {
                        self.selected = None;
                    }
                }
            }
            Err(e) => {
                log::warn!("failed to load models: {}", e);
                self.models.clear();
                self.selected = None;
                self.last_error = Some("Failed to load available models".to_string());
            }
        }
    }

    pub async fn refresh(&mut self, api: &dyn ChatApi, token: &str) {
        self.begin_refresh();
        let result = api.list_models(token).await;
        self.apply_refresh(result);
    }

    /// True when the input bar may send: a model and a conversation are both chosen.
    pub fn can_send(&self, chat_selected: bool) -> bool {
        self.selected.is_some() && chat_selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, name: &str) -> Model {
        Model {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn refresh_failure_degrades_to_empty_with_notice() {
        let mut picker = ModelPicker::new();
        picker.apply_refresh(Ok(vec![model("m1", "One")]));
        picker.select("m1");

        picker.begin_refresh();
        picker.apply_refresh(Err(ApiError::Parse("expected array".to_string())));
        assert!(picker.models().is_empty());
        assert!(picker.selected().is_none());
        assert_eq!(
            picker.take_error().as_deref(),
            Some("Failed to load available models")
        );
    }

    #[test]
    fn select_requires_listed_model() {
        let mut picker = ModelPicker::new();
        picker.apply_refresh(Ok(vec![model("m1", "One")]));
        picker.select("unknown");
        assert!(picker.selected().is_none());
        picker.select("m1");
        assert_eq!(picker.selected(), Some("m1"));
        assert_eq!(picker.selected_name(), Some("One"));
    }

    #[test]
    fn send_gating_requires_model_and_chat() {
        let mut picker = ModelPicker::new();
        assert!(!picker.can_send(true));
        picker.apply_refresh(Ok(vec![model("m1", "One")]));
        picker.select("m1");
        assert!(!picker.can_send(false));
        assert!(picker.can_send(true));
    }

    #[test]
    fn surviving_selection_is_kept_on_reload() {
        let mut picker = ModelPicker::new();
        picker.apply_refresh(Ok(vec![model("m1", "One"), model("m2", "Two")]));
        picker.select("m2");
        picker.apply_refresh(Ok(vec![model("m2", "Two")]));
        assert_eq!(picker.selected(), Some("m2"));
        picker.apply_refresh(Ok(vec![model("m3", "Three")]));
        assert!(picker.selected().is_none());
    }
}
