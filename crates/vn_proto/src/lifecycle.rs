//! Disappearing-message lifecycle.
//!
//! A conversation carries one `AutoDeleteMode`. At send time the mode is
//! turned into the persisted `Lifecycle` fields of the new record; after
//! that the record only changes on view events and is finally removed by
//! the cleanup sweep.
//!
//! ```text
//! Sent ──▶ Delivered ──▶ Viewed ──▶ Expiring ──▶ Purged
//!   │                      │            ▲
//!   └──── (absolute) ──────┼────────────┘
//!                          └──▶ ViewOnceBlocked ──▶ Purged
//! ```
//!
//! View-limited content (view-once mode or snapshot media) may be shown
//! once. The second attempt is refused, moves `view_count` to 2 and makes
//! the record an immediate purge candidate. `view_count` never exceeds 2.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;
use crate::message::MediaType;

/// `view_count` at which view-limited content is blocked for good.
pub const VIEW_ONCE_LIMIT: u32 = 2;

// ── Auto-delete mode ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AutoDeleteMode {
    #[default]
    #[serde(rename = "none")]
    None,
    /// Delete as soon as the receiver has seen it.
    #[serde(rename = "view")]
    View,
    #[serde(rename = "1m_view")]
    OneMinuteAfterView,
    #[serde(rename = "1h_view")]
    OneHourAfterView,
    #[serde(rename = "3h_view")]
    ThreeHoursAfterView,
    /// Delete one minute after sending, seen or not.
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "3h")]
    ThreeHours,
}

impl AutoDeleteMode {
    pub const ALL: [AutoDeleteMode; 7] = [
        AutoDeleteMode::None,
        AutoDeleteMode::View,
        AutoDeleteMode::OneMinuteAfterView,
        AutoDeleteMode::OneHourAfterView,
        AutoDeleteMode::ThreeHoursAfterView,
        AutoDeleteMode::OneMinute,
        AutoDeleteMode::ThreeHours,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AutoDeleteMode::None => "none",
            AutoDeleteMode::View => "view",
            AutoDeleteMode::OneMinuteAfterView => "1m_view",
            AutoDeleteMode::OneHourAfterView => "1h_view",
            AutoDeleteMode::ThreeHoursAfterView => "3h_view",
            AutoDeleteMode::OneMinute => "1m",
            AutoDeleteMode::ThreeHours => "3h",
        }
    }

    pub fn is_view_once(&self) -> bool {
        matches!(self, AutoDeleteMode::View)
    }

    pub fn is_disappearing(&self) -> bool {
        self.as_str().ends_with("_view")
    }

    /// Minutes between the view event and expiry, for `_view` modes.
    pub fn minutes_after_view(&self) -> Option<u32> {
        match self {
            AutoDeleteMode::OneMinuteAfterView => Some(1),
            AutoDeleteMode::OneHourAfterView => Some(60),
            AutoDeleteMode::ThreeHoursAfterView => Some(180),
            _ => None,
        }
    }

    /// Minutes between the send event and expiry, for absolute modes.
    pub fn minutes_after_send(&self) -> Option<u32> {
        match self {
            AutoDeleteMode::OneMinute => Some(1),
            AutoDeleteMode::ThreeHours => Some(180),
            _ => None,
        }
    }
}

impl fmt::Display for AutoDeleteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutoDeleteMode {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AutoDeleteMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s.trim())
            .ok_or_else(|| LifecycleError::UnknownMode(s.to_string()))
    }
}

// ── Persisted lifecycle fields ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub is_viewed: bool,
    pub viewed_at: Option<DateTime<Utc>>,
    pub view_count: u32,
    pub is_view_once: bool,
    pub is_disappearing: bool,
    /// Minutes; only set for `_view` modes.
    pub disappearing_duration: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_saved: Option<bool>,
}

impl Lifecycle {
    /// Fields for a record created under `mode` at `sent_at`.
    pub fn at_send(mode: AutoDeleteMode, sent_at: DateTime<Utc>) -> Self {
        Self {
            is_view_once: mode.is_view_once(),
            is_disappearing: mode.is_disappearing(),
            disappearing_duration: mode.minutes_after_view(),
            expires_at: mode
                .minutes_after_send()
                .map(|minutes| sent_at + Duration::minutes(i64::from(minutes))),
            ..Self::default()
        }
    }

    pub fn is_saved(&self) -> bool {
        self.is_saved.unwrap_or(false)
    }

    pub fn is_view_limited(&self, media_type: MediaType) -> bool {
        self.is_view_once || media_type.is_view_once_media()
    }

    pub fn is_blocked(&self) -> bool {
        self.view_count >= VIEW_ONCE_LIMIT
    }

    /// State of a stored record. Delivery is not persisted, so an unviewed
    /// record reads as `Sent`.
    pub fn state(&self) -> LifecycleState {
        if self.is_blocked() {
            LifecycleState::ViewOnceBlocked
        } else if self.expires_at.is_some() {
            LifecycleState::Expiring
        } else if self.is_viewed {
            LifecycleState::Viewed
        } else {
            LifecycleState::Sent
        }
    }

    /// Decide what a view attempt at `now` does to this record.
    pub fn register_view(&self, media_type: MediaType, now: DateTime<Utc>) -> ViewTransition {
        if self.is_view_limited(media_type) {
            return match self.view_count {
                0 => ViewTransition::Display { update: Some(self.first_view(now, 1)) },
                1 => ViewTransition::Blocked {
                    update: Some(ViewUpdate {
                        expected_view_count: 1,
                        expected_viewed: self.is_viewed,
                        is_viewed: true,
                        viewed_at: self.viewed_at.or(Some(now)),
                        view_count: VIEW_ONCE_LIMIT,
                        expires_at: self.expires_at,
                    }),
                },
                _ => ViewTransition::Blocked { update: None },
            };
        }

        if self.is_viewed {
            ViewTransition::Display { update: None }
        } else {
            ViewTransition::Display { update: Some(self.first_view(now, self.view_count)) }
        }
    }

    fn first_view(&self, now: DateTime<Utc>, view_count: u32) -> ViewUpdate {
        let expires_at = match (self.is_disappearing, self.disappearing_duration, self.expires_at) {
            (true, Some(minutes), None) => Some(now + Duration::minutes(i64::from(minutes))),
            (_, _, existing) => existing,
        };
        ViewUpdate {
            expected_view_count: self.view_count,
            expected_viewed: self.is_viewed,
            is_viewed: true,
            viewed_at: Some(now),
            view_count,
            expires_at,
        }
    }
}

// ── View events ───────────────────────────────────────────────────────────────

/// Lifecycle mutation caused by one view event.
///
/// `expected_*` hold the values the update was computed from; stores apply
/// the update only while the row still matches them (compare-and-set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewUpdate {
    pub expected_view_count: u32,
    pub expected_viewed: bool,
    pub is_viewed: bool,
    pub viewed_at: Option<DateTime<Utc>>,
    pub view_count: u32,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ViewUpdate {
    pub fn matches(&self, lifecycle: &Lifecycle) -> bool {
        lifecycle.view_count == self.expected_view_count && lifecycle.is_viewed == self.expected_viewed
    }

    pub fn apply(&self, lifecycle: &mut Lifecycle) {
        lifecycle.is_viewed = self.is_viewed;
        lifecycle.viewed_at = self.viewed_at;
        lifecycle.view_count = self.view_count;
        lifecycle.expires_at = self.expires_at;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewTransition {
    /// Show the content, persisting `update` first when present.
    Display { update: Option<ViewUpdate> },
    /// Refuse to show the content; the record is a purge candidate.
    Blocked { update: Option<ViewUpdate> },
}

impl ViewTransition {
    pub fn update(&self) -> Option<&ViewUpdate> {
        match self {
            ViewTransition::Display { update } | ViewTransition::Blocked { update } => update.as_ref(),
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, ViewTransition::Blocked { .. })
    }
}

// ── State machine ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Sent,
    Delivered,
    Viewed,
    Expiring,
    Purged,
    ViewOnceBlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Deliver,
    View,
    ScheduleExpiry,
    BlockRepeatView,
    Purge,
}

impl LifecycleState {
    pub fn next(self, event: LifecycleEvent) -> Result<LifecycleState, LifecycleError> {
        use LifecycleEvent as E;
        use LifecycleState as S;

        let next = match (self, event) {
            (S::Sent, E::Deliver) => S::Delivered,
            (S::Sent | S::Delivered, E::View) => S::Viewed,
            // Absolute modes schedule expiry before any view.
            (S::Sent | S::Delivered | S::Viewed, E::ScheduleExpiry) => S::Expiring,
            (S::Viewed | S::Expiring, E::BlockRepeatView) => S::ViewOnceBlocked,
            (S::ViewOnceBlocked, E::BlockRepeatView) => S::ViewOnceBlocked,
            (S::Viewed | S::Expiring | S::ViewOnceBlocked, E::Purge) => S::Purged,
            (from, event) => return Err(LifecycleError::InvalidTransition { from, event }),
        };
        Ok(next)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Purged)
    }
}
