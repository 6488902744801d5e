//! Confirmation prompts shown before downloading and before restarting.

use crate::config::AutoUpdatePreference;
use crate::update::types::UpdateInfo;
use async_trait::async_trait;
use std::sync::Arc;

const DEFAULT_RELEASE_NOTES: &str = "This release contains improvements and bug fixes.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// An update is available; download it now?
    Download,
    /// An update has been downloaded; restart to install it now?
    Install,
}

/// Text of a modal confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePrompt {
    pub kind: PromptKind,
    pub title: String,
    pub message: String,
    pub detail: String,
    pub confirm_label: String,
    pub cancel_label: String,
}

impl UpdatePrompt {
    #[must_use]
    pub fn download(info: &UpdateInfo) -> Self {
        let detail = info
            .release_notes
            .as_deref()
            .filter(|notes| !notes.trim().is_empty())
            .unwrap_or(DEFAULT_RELEASE_NOTES);
        Self {
            kind: PromptKind::Download,
            title: "New version available".to_owned(),
            message: format!("Version {} is available. Download now?", info.version),
            detail: detail.to_owned(),
            confirm_label: "Download now".to_owned(),
            cancel_label: "Later".to_owned(),
        }
    }

    #[must_use]
    pub fn install(info: &UpdateInfo) -> Self {
        Self {
            kind: PromptKind::Install,
            title: "Update downloaded".to_owned(),
            message: format!(
                "Version {} has been downloaded. Restart now to install?",
                info.version
            ),
            detail: "The new version will be installed after restart.".to_owned(),
            confirm_label: "Restart now".to_owned(),
            cancel_label: "Later".to_owned(),
        }
    }
}

/// Asks the user to confirm an update step.
///
/// Implementations may block on a modal for as long as the user takes; the
/// coordinator always calls them off the event relay path.
#[async_trait]
pub trait PromptHandler: Send + Sync + 'static {
    async fn confirm(&self, prompt: &UpdatePrompt) -> bool;
}

/// Answers every prompt the same way without showing anything.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

#[async_trait]
impl PromptHandler for FixedAnswer {
    async fn confirm(&self, prompt: &UpdatePrompt) -> bool {
        tracing::debug!(kind = ?prompt.kind, answer = self.0, "answering update prompt from preference");
        self.0
    }
}

/// Native modal dialog.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeDialogPrompt;

#[async_trait]
impl PromptHandler for NativeDialogPrompt {
    async fn confirm(&self, prompt: &UpdatePrompt) -> bool {
        let result = rfd::AsyncMessageDialog::new()
            .set_level(rfd::MessageLevel::Info)
            .set_title(&prompt.title)
            .set_description(format!("{}\n\n{}", prompt.message, prompt.detail))
            .set_buttons(rfd::MessageButtons::OkCancelCustom(
                prompt.confirm_label.clone(),
                prompt.cancel_label.clone(),
            ))
            .show()
            .await;

        match result {
            rfd::MessageDialogResult::Ok | rfd::MessageDialogResult::Yes => true,
            rfd::MessageDialogResult::Custom(label) => label == prompt.confirm_label,
            _ => false,
        }
    }
}

/// Prompt handler implied by the `auto_download` preference.
#[must_use]
pub fn for_preference(preference: AutoUpdatePreference) -> Arc<dyn PromptHandler> {
    match preference {
        AutoUpdatePreference::Ask => Arc::new(NativeDialogPrompt),
        AutoUpdatePreference::Always => Arc::new(FixedAnswer(true)),
        AutoUpdatePreference::Never => Arc::new(FixedAnswer(false)),
    }
}
