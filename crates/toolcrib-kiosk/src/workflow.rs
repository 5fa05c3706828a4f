//! The kiosk runtime.
//!
//! All state changes happen on the thread that owns [`Kiosk`]. Network calls
//! run on short-lived worker threads and report back through a channel; the
//! owner drains it between input events and timer ticks. Every screen gets a
//! fresh [`PageContext`] tagged with an epoch. Results carrying an older
//! epoch belong to a page that no longer exists and are dropped.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use crate::api::{KioskApi, PageLoad, Reply};
use crate::clock::Heartbeat;
use crate::config::KioskConfig;
use crate::error::Failure;
use crate::page::PageData;
use crate::poller::{Indicator, PollKind, PollReport, StatusPoller};
use crate::resolver::StepContext;
use crate::routes::{Flow, Screen};
use crate::selection::{CardKey, SelectionTracker};
use crate::submitter::{ActionButton, ActionContext, ActionKind, ActionRequest, Press, Settlement};
use crate::text;

/// Something a worker thread finished.
#[derive(Debug)]
pub enum KioskEvent {
    PageLoaded {
        epoch: u64,
        requested: String,
        result: Result<PageLoad, Failure>,
    },
    PollSettled {
        epoch: u64,
        report: PollReport,
    },
    ActionSettled {
        epoch: u64,
        result: Result<Reply, Failure>,
    },
}

impl KioskEvent {
    fn epoch(&self) -> u64 {
        match self {
            KioskEvent::PageLoaded { epoch, .. }
            | KioskEvent::PollSettled { epoch, .. }
            | KioskEvent::ActionSettled { epoch, .. } => *epoch,
        }
    }
}

/// Input, already translated from whatever device produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KioskKey {
    Prev,
    Next,
    Space,
    Enter,
    Escape,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    Loading,
    Ready,
    /// The page itself could not be fetched.
    Unavailable(String),
}

/// A focusable element of the current screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Card(usize),
    Action,
    Link { label: String, location: String },
}

/// Everything that lives exactly as long as one screen.
#[derive(Debug)]
pub struct PageContext {
    pub epoch: u64,
    pub location: String,
    pub screen: Screen,
    pub state: PageState,
    pub data: PageData,
    pub selection: SelectionTracker,
    pub poller: Option<StatusPoller>,
    pub action: Option<ActionButton>,
    pub notice: Option<String>,
    focus: usize,
}

impl PageContext {
    fn loading(epoch: u64, location: String, screen: Screen) -> Self {
        Self {
            epoch,
            location,
            screen,
            state: PageState::Loading,
            data: PageData::default(),
            selection: SelectionTracker::default(),
            poller: None,
            action: None,
            notice: None,
            focus: 0,
        }
    }

    /// Session id: embedded page data first, then the location itself.
    pub fn session(&self) -> Option<&str> {
        self.data.session.as_deref().or_else(|| self.screen.session())
    }

    /// Pending drawer: the location for returns, page data otherwise.
    pub fn drawer(&self) -> Option<&str> {
        match &self.screen {
            Screen::Confirm {
                drawer: Some(d), ..
            } => Some(d),
            _ => self.data.drawer.as_deref(),
        }
    }

    fn flow(&self) -> Option<Flow> {
        match &self.screen {
            Screen::Catalog { flow, .. } | Screen::Confirm { flow, .. } => Some(*flow),
            _ => None,
        }
    }

    pub fn step_context(&self) -> Option<StepContext> {
        Some(StepContext::new(
            self.flow()?,
            self.session().map(str::to_string),
            self.drawer().map(str::to_string),
        ))
    }

    pub fn indicator(&self) -> Indicator {
        self.poller
            .as_ref()
            .map(|p| p.indicator().clone())
            .unwrap_or_default()
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn focused(&self, cfg: &KioskConfig) -> Option<Control> {
        self.controls(cfg).into_iter().nth(self.focus)
    }

    /// Focus order of the screen.
    pub fn controls(&self, cfg: &KioskConfig) -> Vec<Control> {
        let routes = &cfg.routes;
        let link = |label: &str, location: String| Control::Link {
            label: label.to_string(),
            location,
        };
        let home = || link("Home", routes.home.clone());

        if let PageState::Unavailable(_) = self.state {
            return vec![link("Retry", self.location.clone()), home()];
        }
        if self.state == PageState::Loading {
            return Vec::new();
        }

        match &self.screen {
            Screen::Home => Vec::new(),
            Screen::Denied | Screen::Unknown => vec![home()],
            Screen::Panel { .. } => match self.session() {
                Some(s) => vec![
                    link("Withdraw", routes.catalog_for(Flow::Withdrawal, s)),
                    link("Return", routes.catalog_for(Flow::Return, s)),
                    link("Cancel", routes.home.clone()),
                ],
                None => vec![link("Cancel", routes.home.clone())],
            },
            Screen::Catalog { .. } => (0..self.selection.len())
                .map(Control::Card)
                .chain([Control::Action])
                .collect(),
            Screen::Confirm { .. } => vec![Control::Action],
        }
    }

    fn move_focus(&mut self, cfg: &KioskConfig, forward: bool) {
        let n = self.controls(cfg).len();
        if n == 0 {
            self.focus = 0;
            return;
        }
        self.focus = if forward {
            (self.focus + 1) % n
        } else {
            (self.focus + n - 1) % n
        };
    }
}

pub struct Kiosk {
    api: Arc<dyn KioskApi>,
    cfg: KioskConfig,
    tx: Sender<KioskEvent>,
    rx: Receiver<KioskEvent>,
    next_epoch: u64,
    page: PageContext,
    heartbeat: Heartbeat,
}

impl Kiosk {
    pub fn new(api: Arc<dyn KioskApi>, cfg: KioskConfig) -> Self {
        let (tx, rx) = mpsc::channel::<KioskEvent>();
        let now = Instant::now();
        let heartbeat = Heartbeat::new(cfg.polling.clock_interval(), cfg.polling.dots_interval(), now);
        let home = cfg.routes.home.clone();
        let screen = cfg.routes.screen_for(&home);
        Self {
            api,
            cfg,
            tx,
            rx,
            next_epoch: 1,
            page: PageContext::loading(0, home, screen),
            heartbeat,
        }
    }

    pub fn config(&self) -> &KioskConfig {
        &self.cfg
    }

    pub fn page(&self) -> &PageContext {
        &self.page
    }

    pub fn heartbeat(&self) -> &Heartbeat {
        &self.heartbeat
    }

    /// Load the home screen.
    pub fn start(&mut self) {
        let home = self.cfg.routes.home.clone();
        self.navigate(home, None);
    }

    /// Replace the current page. Its context, pollers and in-flight results
    /// are dropped with it.
    pub fn navigate(&mut self, location: String, notice: Option<String>) {
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        let screen = self.cfg.routes.screen_for(&location);
        tracing::info!(%location, ?screen, epoch, "navigating");

        self.page = PageContext::loading(epoch, location.clone(), screen);
        self.page.notice = notice;

        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        let requested = location.clone();
        let spawned = spawn_worker("kiosk-page", move || {
            let result = api.load_page(&location);
            let _ = tx.send(KioskEvent::PageLoaded {
                epoch,
                requested: location,
                result,
            });
        });
        if let Err(err) = spawned {
            self.on_page_loaded(requested, Err(err));
        }
    }

    /// Advance timers. Returns true when something visible changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let changed = self.heartbeat.tick(now);
        let due = match self.page.poller.as_mut() {
            Some(p) => p.due(now),
            None => Vec::new(),
        };
        for kind in due {
            if self.spawn_poll(kind).is_err() {
                if let Some(p) = self.page.poller.as_mut() {
                    p.abandon(kind);
                }
            }
        }
        changed
    }

    /// When the next timer wants attention.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.page.poller.as_ref().and_then(StatusPoller::next_deadline)
    }

    fn spawn_poll(&self, kind: PollKind) -> Result<(), Failure> {
        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        let epoch = self.page.epoch;
        spawn_worker("kiosk-poll", move || {
            let report = match kind {
                PollKind::CardStatus => PollReport::Card(api.card_status()),
                PollKind::ActiveSession => PollReport::Active(api.active_session()),
            };
            let _ = tx.send(KioskEvent::PollSettled { epoch, report });
        })
    }

    fn spawn_action(&mut self, request: ActionRequest) {
        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        let epoch = self.page.epoch;
        let spawned = spawn_worker("kiosk-action", move || {
            let result = request.execute(api.as_ref());
            let _ = tx.send(KioskEvent::ActionSettled { epoch, result });
        });
        if let Err(err) = spawned {
            self.on_action_settled(Err(err));
        }
    }

    /// Handle whatever the workers finished so far. Returns the number of
    /// events processed.
    pub fn drain(&mut self) -> usize {
        let mut events = Vec::new();
        while let Ok(ev) = self.rx.try_recv() {
            events.push(ev);
        }
        let n = events.len();
        for ev in events {
            self.handle_event(ev);
        }
        n
    }

    /// Block up to `timeout` for one event, then drain the rest.
    pub fn pump(&mut self, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(ev) => {
                self.handle_event(ev);
                1 + self.drain()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    pub fn handle_event(&mut self, ev: KioskEvent) {
        if ev.epoch() != self.page.epoch {
            tracing::debug!(stale = ev.epoch(), current = self.page.epoch, "dropping result for a page that is gone");
            return;
        }
        match ev {
            KioskEvent::PageLoaded {
                requested, result, ..
            } => self.on_page_loaded(requested, result),
            KioskEvent::PollSettled { report, .. } => {
                let Some(poller) = self.page.poller.as_mut() else {
                    return;
                };
                if let Some(location) = poller.on_report(report, &self.cfg.routes) {
                    self.navigate(location, None);
                }
            }
            KioskEvent::ActionSettled { result, .. } => self.on_action_settled(result),
        }
    }

    fn on_page_loaded(&mut self, requested: String, result: Result<PageLoad, Failure>) {
        let load = match result {
            Ok(load) => load,
            Err(err) => {
                tracing::warn!(location = %requested, error = %err, "page load failed");
                self.page.state = PageState::Unavailable(text::for_notice(&err.to_string()));
                return;
            }
        };

        if load.location != self.page.location {
            tracing::debug!(from = %requested, to = %load.location, "server redirected");
        }
        self.page.screen = self.cfg.routes.screen_for(&load.location);
        self.page.location = load.location;
        self.page.data = PageData::from_markup(&load.markup);
        self.page.state = PageState::Ready;
        self.page.focus = 0;
        tracing::info!(location = %self.page.location, screen = ?self.page.screen, "page ready");

        match self.page.screen.clone() {
            Screen::Home => {
                let now = Instant::now();
                self.page.poller = Some(StatusPoller::new(&self.cfg.polling, now));
                self.tick(now);
            }
            Screen::Panel { .. } => {
                if let (Some(session), Some(drawer)) = (self.page.session(), self.page.drawer()) {
                    tracing::info!(session, drawer, "drawer pending; forwarding to confirmation");
                    let target = self.cfg.routes.confirm_for(Flow::Withdrawal, session, None);
                    if let Some(target) = target {
                        let notice = self.page.notice.take();
                        self.navigate(target, notice);
                    }
                }
            }
            Screen::Catalog { flow, .. } => {
                self.page.selection = SelectionTracker::new(self.page.data.cards.clone());
                self.install_action(ActionKind::AdvanceWithSelection(flow));
            }
            Screen::Confirm { flow, .. } => {
                self.install_action(ActionKind::ConfirmDrawer(flow));
            }
            Screen::Denied | Screen::Unknown => {}
        }
    }

    /// Give the page its button, disabled from the start when the page
    /// lacks the identifiers the action needs.
    fn install_action(&mut self, kind: ActionKind) {
        let mut button = ActionButton::new(kind);
        let ctx = ActionContext {
            session: self.page.session(),
            drawer: self.page.drawer(),
            selection: None,
        };
        if let Some(notice) = button.check(&ctx) {
            self.page.notice = Some(notice);
        }
        self.page.action = Some(button);
    }

    fn on_action_settled(&mut self, result: Result<Reply, Failure>) {
        let step = self.page.step_context();
        let Some(button) = self.page.action.as_mut() else {
            return;
        };
        let Some(step) = step else {
            return;
        };
        match button.settle(result, &step, &self.cfg.routes) {
            Settlement::Navigate { location, notice } => self.navigate(location, notice),
            Settlement::Stay { notice } => self.page.notice = Some(notice),
        }
    }

    /// Apply one key press. Returns true when it was consumed.
    pub fn key(&mut self, key: KioskKey) -> bool {
        if self.page.notice.is_some() {
            if matches!(key, KioskKey::Enter | KioskKey::Space | KioskKey::Escape) {
                self.page.notice = None;
                return true;
            }
            return false;
        }

        match key {
            KioskKey::Prev => {
                self.page.move_focus(&self.cfg, false);
                true
            }
            KioskKey::Next => {
                self.page.move_focus(&self.cfg, true);
                true
            }
            KioskKey::Escape => self.escape(),
            KioskKey::Space | KioskKey::Enter => self.activate(key),
            KioskKey::Other => {
                if self.page.screen == Screen::Denied {
                    return self.escape();
                }
                false
            }
        }
    }

    fn escape(&mut self) -> bool {
        let routes = &self.cfg.routes;
        let target = match &self.page.screen {
            Screen::Home => return false,
            Screen::Catalog { .. } | Screen::Confirm { .. } => match self.page.session() {
                Some(s) => routes.panel_for(s),
                None => routes.home.clone(),
            },
            Screen::Panel { .. } | Screen::Denied | Screen::Unknown => routes.home.clone(),
        };
        self.navigate(target, None);
        true
    }

    fn activate(&mut self, key: KioskKey) -> bool {
        match self.page.focused(&self.cfg) {
            Some(Control::Card(i)) => {
                let card_key = if key == KioskKey::Space {
                    CardKey::Space
                } else {
                    CardKey::Enter
                };
                self.page.selection.key_at(i, card_key)
            }
            Some(Control::Action) => {
                self.press_action();
                true
            }
            Some(Control::Link { location, .. }) => {
                self.navigate(location, None);
                true
            }
            None if self.page.screen == Screen::Denied => self.escape(),
            None => false,
        }
    }

    /// Press the screen's action button, wherever the focus is.
    pub fn press_action(&mut self) {
        let page = &mut self.page;
        let Some(button) = page.action.as_mut() else {
            return;
        };
        let ctx = ActionContext {
            session: page.data.session.as_deref().or_else(|| page.screen.session()),
            drawer: match &page.screen {
                Screen::Confirm {
                    drawer: Some(d), ..
                } => Some(d.as_str()),
                _ => page.data.drawer.as_deref(),
            },
            selection: Some(&page.selection),
        };
        match button.press(&ctx) {
            Press::Dispatch(request) => self.spawn_action(request),
            Press::Refused(notice) => self.page.notice = Some(notice),
            Press::Ignored => {}
        }
    }

    /// Toggle a card directly, as a pointer would.
    pub fn click_card(&mut self, index: usize) -> Option<bool> {
        let selected = self
            .page
            .selection
            .toggle_at(index, crate::selection::Activation::Pointer)?;
        self.page.focus = index;
        Some(selected)
    }
}

/// Run `work` on a named worker thread. A thread that cannot be started is
/// reported as a transport failure of the request it would have made.
fn spawn_worker(name: &str, work: impl FnOnce() + Send + 'static) -> Result<(), Failure> {
    match std::thread::Builder::new().name(name.to_string()).spawn(work) {
        Ok(_) => Ok(()),
        Err(err) => {
            tracing::warn!(worker = name, error = %err, "failed to start worker thread");
            Err(Failure::Transport(format!("could not start {name}: {err}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use crate::api::{ActiveSession, CardStatus};
    use crate::page::ToolId;
    use crate::poller::MAX_IN_FLIGHT;
    use crate::submitter::{ButtonState, MISSING_DRAWER_NOTICE};

    /// Pages keyed by location; action replies handed out in order.
    #[derive(Default)]
    struct Scripted {
        pages: Vec<(String, String)>,
        replies: Mutex<Vec<Result<Reply, Failure>>>,
        sent: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn page(mut self, location: &str, markup: &str) -> Self {
            self.pages.push((location.into(), markup.into()));
            self
        }

        fn reply(self, r: Result<Reply, Failure>) -> Self {
            self.replies.lock().unwrap().push(r);
            self
        }
    }

    impl KioskApi for Scripted {
        fn card_status(&self) -> Result<CardStatus, Failure> {
            Ok(CardStatus::Waiting)
        }

        fn active_session(&self) -> Result<ActiveSession, Failure> {
            Ok(ActiveSession::default())
        }

        fn submit_selection(&self, flow: Flow, session: &str, ids: &[ToolId]) -> Result<Reply, Failure> {
            let ids: Vec<_> = ids.iter().map(ToolId::to_string).collect();
            self.sent
                .lock()
                .unwrap()
                .push(format!("submit {flow} {session} {}", ids.join(",")));
            self.replies.lock().unwrap().remove(0)
        }

        fn confirm_drawer(&self, flow: Flow, session: &str, drawer: &str) -> Result<Reply, Failure> {
            self.sent
                .lock()
                .unwrap()
                .push(format!("confirm {flow} {session} {drawer}"));
            self.replies.lock().unwrap().remove(0)
        }

        fn load_page(&self, location: &str) -> Result<PageLoad, Failure> {
            self.pages
                .iter()
                .find(|(l, _)| l == location)
                .map(|(l, m)| PageLoad {
                    location: l.clone(),
                    markup: m.clone(),
                })
                .ok_or_else(|| Failure::Protocol {
                    status: 404,
                    detail: location.into(),
                })
        }
    }

    fn settle_until(k: &mut Kiosk, mut done: impl FnMut(&Kiosk) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(k) {
            assert!(Instant::now() < deadline, "timed out on {:?}", k.page().location);
            k.pump(Duration::from_millis(20));
        }
    }

    fn ready_at(location: &'static str) -> impl FnMut(&Kiosk) -> bool {
        move |k: &Kiosk| k.page().location == location && k.page().state == PageState::Ready
    }

    #[test]
    fn catalog_selection_advances_to_server_location() {
        let api = Arc::new(
            Scripted::default()
                .page(
                    "/devolver/S1/",
                    r#"<main data-sessao-id="S1"><button class="tool-card" data-id="4">Martelo</button><button class="tool-card" data-id="6">Serra</button></main>"#,
                )
                .page("/devolver/S1/gaveta/2/", r#"<form data-sessao-id="S1" data-gaveta-numero="2"></form>"#)
                .reply(Ok(Reply::new(200, r#"{"ok": true, "next_url": "/devolver/S1/gaveta/2/"}"#))),
        );
        let mut k = Kiosk::new(api.clone(), KioskConfig::default());
        k.navigate("/devolver/S1/".into(), None);
        settle_until(&mut k, ready_at("/devolver/S1/"));

        // Next with nothing selected only shows a notice.
        k.press_action();
        assert!(k.page().notice.is_some());
        assert!(k.key(KioskKey::Enter));
        assert!(api.sent.lock().unwrap().is_empty());

        k.click_card(1);
        assert!(k.key(KioskKey::Prev));
        assert!(k.key(KioskKey::Space));
        assert_eq!(
            k.page().selection.current_selection_ids(),
            vec![ToolId::new("6"), ToolId::new("4")]
        );

        k.press_action();
        k.press_action();
        settle_until(&mut k, ready_at("/devolver/S1/gaveta/2/"));
        assert_eq!(*api.sent.lock().unwrap(), vec!["submit return S1 6,4".to_string()]);
        assert_eq!(k.page().drawer(), Some("2"));
    }

    #[test]
    fn panel_with_pending_drawer_forwards_to_confirmation() {
        let api = Arc::new(
            Scripted::default()
                .page("/painel/9/", r#"<main class="center" data-sessao-id="9" data-gaveta-atual="1"></main>"#)
                .page("/retirar-confirmar/9/", r#"<form data-sessao-id="9" data-gaveta-numero="1"></form>"#),
        );
        let mut k = Kiosk::new(api, KioskConfig::default());
        k.navigate("/painel/9/".into(), None);
        settle_until(&mut k, ready_at("/retirar-confirmar/9/"));
        assert!(matches!(
            k.page().screen,
            Screen::Confirm {
                flow: Flow::Withdrawal,
                ..
            }
        ));
    }

    #[test]
    fn confirmation_failure_reshows_the_step_with_a_notice() {
        let api = Arc::new(
            Scripted::default()
                .page("/devolver/S1/gaveta/3/", r#"<form data-sessao-id="S1"></form>"#)
                .reply(Err(Failure::Transport("connection reset".into()))),
        );
        let mut k = Kiosk::new(api.clone(), KioskConfig::default());
        k.navigate("/devolver/S1/gaveta/3/".into(), None);
        settle_until(&mut k, ready_at("/devolver/S1/gaveta/3/"));
        let first = k.page().epoch;

        assert!(k.key(KioskKey::Enter));
        settle_until(&mut k, |k| {
            k.page().epoch != first && k.page().state == PageState::Ready
        });
        assert_eq!(k.page().location, "/devolver/S1/gaveta/3/");
        assert!(k.page().notice.is_some());
        assert_eq!(*api.sent.lock().unwrap(), vec!["confirm return S1 3".to_string()]);
    }

    #[test]
    fn missing_drawer_disables_confirmation() {
        let api = Arc::new(
            Scripted::default().page("/retirar-confirmar/S1/", r#"<form data-sessao-id="S1" data-gaveta-numero=""></form>"#),
        );
        let mut k = Kiosk::new(api.clone(), KioskConfig::default());
        k.navigate("/retirar-confirmar/S1/".into(), None);
        settle_until(&mut k, ready_at("/retirar-confirmar/S1/"));

        // Disabled as soon as the page is shown, before anyone presses it.
        assert_eq!(
            k.page().action.as_ref().map(ActionButton::state),
            Some(ButtonState::Disabled)
        );
        assert_eq!(k.page().notice.as_deref(), Some(MISSING_DRAWER_NOTICE));

        k.press_action();
        assert!(api.sent.lock().unwrap().is_empty());
        assert_eq!(k.page().notice.as_deref(), Some(MISSING_DRAWER_NOTICE));
    }

    /// Polls that never return until released.
    #[derive(Default)]
    struct Stalled {
        released: AtomicBool,
        calls: AtomicUsize,
    }

    impl KioskApi for Stalled {
        fn card_status(&self) -> Result<CardStatus, Failure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            while !self.released.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(CardStatus::Waiting)
        }

        fn active_session(&self) -> Result<ActiveSession, Failure> {
            self.card_status().map(|_| ActiveSession::default())
        }

        fn submit_selection(&self, _: Flow, _: &str, _: &[ToolId]) -> Result<Reply, Failure> {
            Err(Failure::Transport("not scripted".into()))
        }

        fn confirm_drawer(&self, _: Flow, _: &str, _: &str) -> Result<Reply, Failure> {
            Err(Failure::Transport("not scripted".into()))
        }

        fn load_page(&self, location: &str) -> Result<PageLoad, Failure> {
            Ok(PageLoad {
                location: location.into(),
                markup: "<main></main>".into(),
            })
        }
    }

    #[test]
    fn unanswered_polls_do_not_pile_up() {
        let api = Arc::new(Stalled::default());
        let mut k = Kiosk::new(api.clone(), KioskConfig::default());
        k.navigate("/".into(), None);
        settle_until(&mut k, |k| k.page().poller.is_some());

        let start = Instant::now();
        for i in 1..50 {
            k.tick(start + Duration::from_millis(600) * i);
        }
        let poller = k.page().poller.as_ref().expect("home poller");
        assert_eq!(poller.pending(PollKind::CardStatus), MAX_IN_FLIGHT);
        assert_eq!(poller.pending(PollKind::ActiveSession), MAX_IN_FLIGHT);
        assert_eq!(poller.dispatched(), 2 * u64::from(MAX_IN_FLIGHT));

        api.released.store(true, Ordering::SeqCst);
        settle_until(&mut k, |k| {
            k.page().poller.as_ref().is_some_and(|p| {
                p.pending(PollKind::CardStatus) == 0 && p.pending(PollKind::ActiveSession) == 0
            })
        });
        assert_eq!(api.calls.load(Ordering::SeqCst), 2 * MAX_IN_FLIGHT as usize);
    }

    #[test]
    fn escape_returns_to_panel_and_stale_results_are_dropped() {
        let api = Arc::new(
            Scripted::default()
                .page("/retirar/S1/", r#"<main data-sessao-id="S1"></main>"#)
                .page("/painel/S1/", r#"<main class="center" data-sessao-id="S1"></main>"#),
        );
        let mut k = Kiosk::new(api, KioskConfig::default());
        k.navigate("/retirar/S1/".into(), None);
        settle_until(&mut k, ready_at("/retirar/S1/"));
        let old = k.page().epoch;

        assert!(k.key(KioskKey::Escape));
        settle_until(&mut k, ready_at("/painel/S1/"));

        k.handle_event(KioskEvent::ActionSettled {
            epoch: old,
            result: Ok(Reply::new(200, r#"{"redirect_url": "/"}"#)),
        });
        assert_eq!(k.page().location, "/painel/S1/");
    }

    #[test]
    fn unreachable_page_offers_retry() {
        let mut k = Kiosk::new(Arc::new(Scripted::default()), KioskConfig::default());
        k.navigate("/painel/1/".into(), None);
        settle_until(&mut k, |k| matches!(k.page().state, PageState::Unavailable(_)));
        let cfg = KioskConfig::default();
        assert_eq!(
            k.page().focused(&cfg),
            Some(Control::Link {
                label: "Retry".into(),
                location: "/painel/1/".into()
            })
        );
    }
}
