//! Action buttons and the requests behind them.
//!
//! A button goes `Ready -> InFlight -> Ready` for each request, or straight
//! to `Disabled` when the page lacks the identifiers the action needs. While
//! in flight, further presses are ignored, so a double press can never issue
//! two requests.

use crate::api::{KioskApi, Reply};
use crate::error::Failure;
use crate::page::ToolId;
use crate::resolver::{self, StepContext, StepSignal};
use crate::routes::{Flow, RouteTemplates};
use crate::selection::SelectionTracker;
use crate::text;

pub const EMPTY_SELECTION_NOTICE: &str = "Select at least one tool.";
pub const UNREACHABLE_NOTICE: &str = "Failed to reach the server.";
pub const REJECTED_NOTICE: &str = "The server rejected the request.";
pub const INVALID_REPLY_NOTICE: &str = "Invalid server reply.";
pub const INVALID_SESSION_NOTICE: &str = "Invalid session.";
pub const MISSING_DRAWER_NOTICE: &str = "Drawer not defined for this page.";

const MISSING_SESSION: &str = "a session id";
const MISSING_DRAWER: &str = "the current drawer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// "Next" on a catalog screen.
    AdvanceWithSelection(Flow),
    /// "Confirm" on a drawer confirmation screen.
    ConfirmDrawer(Flow),
}

impl ActionKind {
    pub fn flow(self) -> Flow {
        match self {
            ActionKind::AdvanceWithSelection(f) | ActionKind::ConfirmDrawer(f) => f,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ActionKind::AdvanceWithSelection(_) => "Next",
            ActionKind::ConfirmDrawer(Flow::Withdrawal) => "Confirm retrieval",
            ActionKind::ConfirmDrawer(Flow::Return) => "Confirm return",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Ready,
    InFlight,
    Disabled,
}

/// A fully built outbound action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
    SubmitSelection {
        flow: Flow,
        session: String,
        ids: Vec<ToolId>,
    },
    ConfirmDrawer {
        flow: Flow,
        session: String,
        drawer: String,
    },
}

impl ActionRequest {
    pub fn execute(&self, api: &dyn KioskApi) -> Result<Reply, Failure> {
        match self {
            ActionRequest::SubmitSelection { flow, session, ids } => {
                api.submit_selection(*flow, session, ids)
            }
            ActionRequest::ConfirmDrawer {
                flow,
                session,
                drawer,
            } => api.confirm_drawer(*flow, session, drawer),
        }
    }
}

/// Result of pressing a button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Press {
    /// Issue this request; the button is now in flight.
    Dispatch(ActionRequest),
    /// Disabled or already in flight.
    Ignored,
    /// Nothing was sent; show the notice.
    Refused(String),
}

/// What to do once a request settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Navigate {
        location: String,
        notice: Option<String>,
    },
    /// Stay on the page; the button is usable again.
    Stay { notice: String },
}

/// Identifiers the page provides to its buttons.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionContext<'a> {
    pub session: Option<&'a str>,
    pub drawer: Option<&'a str>,
    pub selection: Option<&'a SelectionTracker>,
}

fn present(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone)]
pub struct ActionButton {
    kind: ActionKind,
    state: ButtonState,
    sent: u32,
}

impl ActionButton {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            state: ButtonState::Ready,
            sent: 0,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn state(&self) -> ButtonState {
        self.state
    }

    /// Requests this button has dispatched over its lifetime.
    pub fn sent(&self) -> u32 {
        self.sent
    }

    fn validate(&self, ctx: &ActionContext<'_>) -> Result<ActionRequest, Failure> {
        let flow = self.kind.flow();
        let session = present(ctx.session)
            .ok_or(Failure::Configuration(MISSING_SESSION))?
            .to_string();
        match self.kind {
            ActionKind::AdvanceWithSelection(_) => Ok(ActionRequest::SubmitSelection {
                flow,
                session,
                ids: ctx
                    .selection
                    .map(SelectionTracker::current_selection_ids)
                    .unwrap_or_default(),
            }),
            ActionKind::ConfirmDrawer(_) => {
                let drawer = present(ctx.drawer)
                    .ok_or(Failure::Configuration(MISSING_DRAWER))?
                    .to_string();
                Ok(ActionRequest::ConfirmDrawer {
                    flow,
                    session,
                    drawer,
                })
            }
        }
    }

    /// Disable the button up front when the page lacks what it needs.
    /// Returns the notice to show in that case.
    pub fn check(&mut self, ctx: &ActionContext<'_>) -> Option<String> {
        let err = self.validate(ctx).err()?;
        Some(self.disable(&err))
    }

    fn disable(&mut self, err: &Failure) -> String {
        tracing::warn!(action = ?self.kind, error = %err, "action disabled");
        self.state = ButtonState::Disabled;
        match err {
            Failure::Configuration(what) if *what == MISSING_DRAWER => MISSING_DRAWER_NOTICE,
            _ => INVALID_SESSION_NOTICE,
        }
        .to_string()
    }

    pub fn press(&mut self, ctx: &ActionContext<'_>) -> Press {
        if self.state != ButtonState::Ready {
            tracing::debug!(action = ?self.kind, state = ?self.state, "press ignored");
            return Press::Ignored;
        }

        let request = match self.validate(ctx) {
            Ok(r) => r,
            Err(err) => return Press::Refused(self.disable(&err)),
        };

        if let ActionRequest::SubmitSelection { ids, .. } = &request {
            if ids.is_empty() {
                return Press::Refused(EMPTY_SELECTION_NOTICE.to_string());
            }
        }

        self.state = ButtonState::InFlight;
        self.sent += 1;
        tracing::info!(action = ?self.kind, "action dispatched");
        Press::Dispatch(request)
    }

    /// Turn the raw result into a navigation (or a reason to stay).
    ///
    /// Drawer confirmations always navigate. Selection advances only
    /// navigate when the server accepted the selection. An accepted return
    /// selection must name the drawer step; without one the reply is invalid
    /// and the user stays put.
    pub fn settle(
        &mut self,
        raw: Result<Reply, Failure>,
        step: &StepContext,
        routes: &RouteTemplates,
    ) -> Settlement {
        if self.state == ButtonState::InFlight {
            self.state = ButtonState::Ready;
        }

        let notice = failure_notice(&raw).or_else(|| self.missing_next(&raw));
        if let Some(n) = &notice {
            tracing::warn!(action = ?self.kind, notice = %n, "action failed");
        }

        match (self.kind, notice) {
            (ActionKind::AdvanceWithSelection(_), Some(notice)) => Settlement::Stay { notice },
            (_, notice) => Settlement::Navigate {
                location: resolver::decide(&raw, step, routes).into_location(),
                notice,
            },
        }
    }

    /// Accepted return selections that do not say where to go next.
    fn missing_next(&self, raw: &Result<Reply, Failure>) -> Option<String> {
        if self.kind != ActionKind::AdvanceWithSelection(Flow::Return) {
            return None;
        }
        match StepSignal::classify(raw) {
            StepSignal::Malformed { .. } => Some(INVALID_REPLY_NOTICE.to_string()),
            _ => None,
        }
    }
}

/// A notice for anything short of a successful reply.
fn failure_notice(raw: &Result<Reply, Failure>) -> Option<String> {
    match raw {
        Ok(reply) if reply.is_success() => None,
        Ok(reply) => Some(
            reply
                .error_message()
                .unwrap_or_else(|| REJECTED_NOTICE.to_string()),
        ),
        Err(Failure::Transport(_)) => Some(UNREACHABLE_NOTICE.to_string()),
        Err(err) => Some(text::for_notice(&err.to_string())),
    }
}
