//! Notification settings snapshot and change kinds

use serde::{Deserialize, Serialize};

/// How much of a message an alert may reveal
///
/// Ordered from most to least revealing, so `view > NotifyView::ShowName`
/// means "hide the name".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyView {
    /// Name, photo and message text
    #[default]
    ShowPreview,
    /// Name and photo only
    ShowName,
    /// Neither name nor text
    ShowNothing,
}

/// Screen corner the in-app alerts stack from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenCorner {
    TopLeft,
    TopRight,
    #[default]
    BottomRight,
    BottomLeft,
}

impl ScreenCorner {
    /// New alerts grow downwards from a top corner
    pub fn is_top(&self) -> bool {
        matches!(self, ScreenCorner::TopLeft | ScreenCorner::TopRight)
    }
}

/// Immutable-per-read notification settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Play a sound for non-silent alerts
    #[serde(default = "default_true")]
    pub sound_enabled: bool,

    /// Announce messages from muted conversations (silently)
    #[serde(default)]
    pub include_muted: bool,

    /// Show how many messages an alert stands for
    #[serde(default = "default_true")]
    pub count_messages: bool,

    /// Master switch for desktop alerts
    #[serde(default = "default_true")]
    pub desktop_enabled: bool,

    /// Privacy level of alert contents
    #[serde(default)]
    pub view: NotifyView,

    /// Maximum number of alerts visible at once
    #[serde(default = "default_max_count")]
    pub max_count: usize,

    /// Placement of in-app alerts
    #[serde(default)]
    pub corner: ScreenCorner,

    /// A sample alert is currently being previewed
    #[serde(default)]
    pub demo_shown: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_count() -> usize {
    3
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            include_muted: false,
            count_messages: true,
            desktop_enabled: true,
            view: NotifyView::default(),
            max_count: default_max_count(),
            corner: ScreenCorner::default(),
            demo_shown: false,
        }
    }
}

/// Kind of settings change broadcast on the [`SettingsBus`](crate::SettingsBus)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    SoundEnabled,
    IncludeMuted,
    CountMessages,
    DesktopEnabled,
    ViewParams,
    MaxCount,
    Corner,
    DemoIsShown,
}

impl ChangeType {
    /// All change kinds, in declaration order
    pub const ALL: [ChangeType; 8] = [
        ChangeType::SoundEnabled,
        ChangeType::IncludeMuted,
        ChangeType::CountMessages,
        ChangeType::DesktopEnabled,
        ChangeType::ViewParams,
        ChangeType::MaxCount,
        ChangeType::Corner,
        ChangeType::DemoIsShown,
    ];

    /// Changes that can alter whether a pending message is announced
    pub fn affects_eligibility(&self) -> bool {
        matches!(
            self,
            ChangeType::SoundEnabled | ChangeType::IncludeMuted | ChangeType::DesktopEnabled
        )
    }

    /// Changes that only alter how displayed alerts look
    pub fn affects_rendering(&self) -> bool {
        matches!(
            self,
            ChangeType::CountMessages | ChangeType::ViewParams | ChangeType::Corner
        )
    }
}
