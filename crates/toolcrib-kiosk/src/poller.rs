//! Session status polling for the home screen.
//!
//! Two queries run on their own schedules: the card reader status and the
//! "is a session already active" check. Each schedule dispatches once on
//! page load and then every interval, measured from one dispatch to the next
//! regardless of how long the previous round took. A schedule with
//! [`MAX_IN_FLIGHT`] rounds still outstanding skips its dispatches until one
//! of them settles, so a server that never answers cannot pile up workers.
//! The first terminal answer fires the latch; after that nothing is
//! dispatched and nothing navigates, including responses that were already
//! in flight.

use std::time::{Duration, Instant};

use crate::api::{ActiveSession, CardStatus};
use crate::config::PollingConfig;
use crate::error::Failure;
use crate::routes::RouteTemplates;
use crate::text;

/// Outstanding rounds allowed per schedule.
pub const MAX_IN_FLIGHT: u32 = 3;

/// One-shot "already navigated" flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Latch {
    fired: bool,
}

impl Latch {
    pub fn is_fired(&self) -> bool {
        self.fired
    }

    /// Returns true exactly once.
    pub fn fire(&mut self) -> bool {
        !std::mem::replace(&mut self.fired, true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollKind {
    CardStatus,
    ActiveSession,
}

/// A settled poll round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollReport {
    Card(Result<CardStatus, Failure>),
    Active(Result<ActiveSession, Failure>),
}

impl PollReport {
    pub fn kind(&self) -> PollKind {
        match self {
            PollReport::Card(_) => PollKind::CardStatus,
            PollReport::Active(_) => PollKind::ActiveSession,
        }
    }
}

/// What the home screen shows while nobody has been recognized yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Indicator {
    #[default]
    Idle,
    Waiting,
    Unrecognized(String),
}

#[derive(Debug, Clone)]
struct Schedule {
    kind: PollKind,
    every: Duration,
    next_due: Instant,
    pending: u32,
}

#[derive(Debug, Clone)]
pub struct StatusPoller {
    schedules: Vec<Schedule>,
    latch: Latch,
    indicator: Indicator,
    dispatched: u64,
}

impl StatusPoller {
    pub fn new(polling: &PollingConfig, now: Instant) -> Self {
        Self::with_schedules(
            [
                (PollKind::CardStatus, polling.card_status_interval()),
                (PollKind::ActiveSession, polling.active_session_interval()),
            ],
            now,
        )
    }

    pub fn with_schedules(
        schedules: impl IntoIterator<Item = (PollKind, Duration)>,
        now: Instant,
    ) -> Self {
        let schedules = schedules
            .into_iter()
            .map(|(kind, every)| Schedule {
                kind,
                every: every.max(Duration::from_millis(1)),
                next_due: now,
                pending: 0,
            })
            .collect();
        Self {
            schedules,
            latch: Latch::default(),
            indicator: Indicator::Idle,
            dispatched: 0,
        }
    }

    /// Queries to dispatch now. Empty once latched. Every kind returned
    /// counts as outstanding until its report arrives or it is abandoned.
    pub fn due(&mut self, now: Instant) -> Vec<PollKind> {
        if self.latch.is_fired() {
            return Vec::new();
        }
        let mut out = Vec::new();
        for s in &mut self.schedules {
            if now < s.next_due {
                continue;
            }
            s.next_due = now + s.every;
            if s.pending >= MAX_IN_FLIGHT {
                tracing::debug!(kind = ?s.kind, pending = s.pending, "previous rounds outstanding; skipping");
                continue;
            }
            s.pending += 1;
            out.push(s.kind);
        }
        self.dispatched += out.len() as u64;
        out
    }

    /// Earliest instant a query becomes due, if polling is still live.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.latch.is_fired() {
            return None;
        }
        self.schedules.iter().map(|s| s.next_due).min()
    }

    pub fn is_latched(&self) -> bool {
        self.latch.is_fired()
    }

    pub fn indicator(&self) -> &Indicator {
        &self.indicator
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Rounds of `kind` dispatched but not yet settled.
    pub fn pending(&self, kind: PollKind) -> u32 {
        self.schedules
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.pending)
            .sum()
    }

    /// Release a round that never got under way.
    pub fn abandon(&mut self, kind: PollKind) {
        self.settled(kind);
    }

    fn settled(&mut self, kind: PollKind) {
        if let Some(s) = self
            .schedules
            .iter_mut()
            .find(|s| s.kind == kind && s.pending > 0)
        {
            s.pending -= 1;
        }
    }

    /// Fold a settled round in. Returns the location to navigate to when this
    /// round is the one that fires the latch.
    pub fn on_report(&mut self, report: PollReport, routes: &RouteTemplates) -> Option<String> {
        self.settled(report.kind());
        if self.latch.is_fired() {
            tracing::debug!(kind = ?report.kind(), "poll settled after navigation; ignored");
            return None;
        }

        let target = match report {
            PollReport::Card(Ok(status)) => self.card_target(status, routes),
            PollReport::Active(Ok(active)) => active.session.map(|s| routes.panel_for(&s)),
            PollReport::Card(Err(err)) | PollReport::Active(Err(err)) => {
                tracing::warn!(error = %text::for_log(&err.to_string()), "status poll failed; retrying next round");
                None
            }
        }?;

        self.latch.fire();
        tracing::info!(location = %target, "status poll navigates");
        Some(target)
    }

    fn card_target(&mut self, status: CardStatus, routes: &RouteTemplates) -> Option<String> {
        match status {
            CardStatus::Recognized { session: Some(s) } => Some(routes.panel_for(&s)),
            CardStatus::Recognized { session: None } => Some(routes.panel_lobby.clone()),
            CardStatus::Denied => Some(routes.denied.clone()),
            CardStatus::Waiting => {
                self.indicator = Indicator::Waiting;
                None
            }
            CardStatus::Other(tag) => {
                tracing::debug!(status = %text::for_log(&tag), "unrecognized card status");
                self.indicator = Indicator::Unrecognized(text::for_notice(&tag));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card_only(every_ms: u64, now: Instant) -> StatusPoller {
        StatusPoller::with_schedules([(PollKind::CardStatus, Duration::from_millis(every_ms))], now)
    }

    fn recognized(s: &str) -> PollReport {
        PollReport::Card(Ok(CardStatus::Recognized {
            session: Some(s.into()),
        }))
    }

    #[test]
    fn latch_fires_once() {
        let mut l = Latch::default();
        assert!(l.fire());
        assert!(!l.fire());
        assert!(l.is_fired());
    }

    #[test]
    fn dispatches_immediately_then_every_interval() {
        let t0 = Instant::now();
        let mut p = card_only(600, t0);
        assert_eq!(p.due(t0), vec![PollKind::CardStatus]);
        assert!(p.due(t0 + Duration::from_millis(599)).is_empty());
        assert_eq!(
            p.due(t0 + Duration::from_millis(600)),
            vec![PollKind::CardStatus]
        );
        assert_eq!(p.next_deadline(), Some(t0 + Duration::from_millis(1200)));
    }

    #[test]
    fn interval_is_measured_between_dispatches() {
        let t0 = Instant::now();
        let mut p = card_only(600, t0);
        p.due(t0);
        // A late tick pushes the following dispatch out from the late one.
        let late = t0 + Duration::from_millis(900);
        assert_eq!(p.due(late).len(), 1);
        assert!(p.due(t0 + Duration::from_millis(1200)).is_empty());
        assert_eq!(p.due(late + Duration::from_millis(600)).len(), 1);
    }

    #[test]
    fn dispatch_pauses_while_rounds_are_outstanding() {
        let routes = RouteTemplates::default();
        let t0 = Instant::now();
        let every = Duration::from_millis(600);
        let mut p = card_only(600, t0);
        for i in 0..MAX_IN_FLIGHT {
            assert_eq!(p.due(t0 + every * i).len(), 1);
        }
        assert_eq!(p.pending(PollKind::CardStatus), MAX_IN_FLIGHT);

        // The server never answers: rounds keep coming due but none go out.
        for i in MAX_IN_FLIGHT..MAX_IN_FLIGHT + 5 {
            assert!(p.due(t0 + every * i).is_empty());
        }
        assert_eq!(p.dispatched(), u64::from(MAX_IN_FLIGHT));

        let waiting = PollReport::Card(Ok(CardStatus::Waiting));
        assert_eq!(p.on_report(waiting, &routes), None);
        assert_eq!(p.pending(PollKind::CardStatus), MAX_IN_FLIGHT - 1);
        assert_eq!(
            p.due(t0 + every * (MAX_IN_FLIGHT + 5)),
            vec![PollKind::CardStatus]
        );
    }

    #[test]
    fn abandoned_round_frees_its_slot() {
        let t0 = Instant::now();
        let mut p = card_only(600, t0);
        for i in 0..MAX_IN_FLIGHT {
            p.due(t0 + Duration::from_millis(600) * i);
        }
        p.abandon(PollKind::CardStatus);
        assert_eq!(p.pending(PollKind::CardStatus), MAX_IN_FLIGHT - 1);
        assert_eq!(p.due(t0 + Duration::from_secs(60)).len(), 1);

        // Nothing outstanding for the other kind; abandoning it is a no-op.
        p.abandon(PollKind::ActiveSession);
        assert_eq!(p.pending(PollKind::ActiveSession), 0);
    }

    #[test]
    fn recognized_navigates_exactly_once() {
        let routes = RouteTemplates::default();
        let t0 = Instant::now();
        let mut p = card_only(600, t0);
        p.due(t0);
        p.due(t0 + Duration::from_millis(600));

        assert_eq!(
            p.on_report(recognized("S1"), &routes).as_deref(),
            Some("/painel/S1/")
        );
        // The second round was already in flight and lands afterwards.
        assert_eq!(
            p.on_report(PollReport::Card(Ok(CardStatus::Denied)), &routes),
            None
        );
        assert_eq!(p.on_report(recognized("S2"), &routes), None);
        assert!(p.due(t0 + Duration::from_secs(10)).is_empty());
        assert_eq!(p.next_deadline(), None);
    }

    #[test]
    fn denied_goes_to_denial_screen() {
        let routes = RouteTemplates::default();
        let mut p = card_only(600, Instant::now());
        assert_eq!(
            p.on_report(PollReport::Card(Ok(CardStatus::Denied)), &routes)
                .as_deref(),
            Some("/negado")
        );
    }

    #[test]
    fn waiting_updates_indicator_only() {
        let routes = RouteTemplates::default();
        let mut p = card_only(600, Instant::now());
        assert_eq!(
            p.on_report(PollReport::Card(Ok(CardStatus::Waiting)), &routes),
            None
        );
        assert_eq!(p.indicator(), &Indicator::Waiting);
        assert!(!p.is_latched());
    }

    #[test]
    fn failures_are_swallowed_and_polling_continues() {
        let routes = RouteTemplates::default();
        let t0 = Instant::now();
        let mut p = card_only(600, t0);
        p.due(t0);
        let failed = PollReport::Card(Err(Failure::Transport("connection refused".into())));
        assert_eq!(p.on_report(failed, &routes), None);
        let failed = PollReport::Card(Err(Failure::Protocol {
            status: 500,
            detail: "boom".into(),
        }));
        assert_eq!(p.on_report(failed, &routes), None);
        assert!(!p.is_latched());
        assert_eq!(p.due(t0 + Duration::from_millis(600)).len(), 1);
    }

    #[test]
    fn active_session_skips_to_panel() {
        let routes = RouteTemplates::default();
        let mut p = StatusPoller::new(&PollingConfig::default(), Instant::now());
        let none = PollReport::Active(Ok(ActiveSession { session: None }));
        assert_eq!(p.on_report(none, &routes), None);
        let some = PollReport::Active(Ok(ActiveSession {
            session: Some("8".into()),
        }));
        assert_eq!(p.on_report(some, &routes).as_deref(), Some("/painel/8/"));
        assert!(p.is_latched());
    }

    #[test]
    fn both_schedules_start_on_load() {
        let t0 = Instant::now();
        let mut p = StatusPoller::new(&PollingConfig::default(), t0);
        let due = p.due(t0);
        assert!(due.contains(&PollKind::CardStatus));
        assert!(due.contains(&PollKind::ActiveSession));
        assert_eq!(p.dispatched(), 2);
    }
}
