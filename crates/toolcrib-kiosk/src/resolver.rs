//! Step transition resolution.
//!
//! Every action screen is a dead end until it knows where to go next. After
//! an action request settles, its raw result is first classified into a
//! [`StepSignal`] and then resolved into exactly one [`NavigationOutcome`].
//! Priority, first match wins:
//!
//! 1. an explicit next location from the server,
//! 2. the server saying the session ended,
//! 3. a repeat of the current step, when the session is known,
//! 4. the home screen.
//!
//! Nothing here performs I/O.

use serde_json::Value;

use crate::api::Reply;
use crate::error::Failure;
use crate::routes::{Flow, RouteTemplates};

/// Body keys that carry the next location, in lookup order.
pub const NEXT_LOCATION_KEYS: &[&str] = &["redirect_url", "next_url", "next_location"];
/// Body keys that carry the session-ended flag, in lookup order.
pub const SESSION_ENDED_KEYS: &[&str] = &["sessao_encerrada", "session_ended"];

/// What a settled action request told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepSignal {
    ExplicitNext(String),
    SessionEnded,
    /// A body arrived but carried neither a location nor an end flag, or did
    /// not parse at all.
    Malformed { status: Option<u16> },
    /// No body was obtained.
    TransportFailure(String),
}

impl StepSignal {
    pub fn classify(raw: &Result<Reply, Failure>) -> Self {
        match raw {
            Err(Failure::Transport(msg)) => StepSignal::TransportFailure(msg.clone()),
            Err(Failure::Protocol { status, .. }) => StepSignal::Malformed {
                status: Some(*status),
            },
            Err(Failure::Configuration(_)) => StepSignal::Malformed { status: None },
            Ok(reply) => Self::from_reply(reply),
        }
    }

    /// A reply's body is consulted even when the status is not a success:
    /// an explicit instruction from the server is still the best guide.
    pub fn from_reply(reply: &Reply) -> Self {
        let malformed = StepSignal::Malformed {
            status: Some(reply.status),
        };
        let Some(Value::Object(body)) = reply.json() else {
            return malformed;
        };

        let next = NEXT_LOCATION_KEYS
            .iter()
            .filter_map(|k| body.get(*k).and_then(Value::as_str))
            .find(|s| !s.is_empty());
        if let Some(next) = next {
            return StepSignal::ExplicitNext(next.to_string());
        }

        let ended = SESSION_ENDED_KEYS
            .iter()
            .any(|k| body.get(*k).and_then(Value::as_bool) == Some(true));
        if ended {
            return StepSignal::SessionEnded;
        }

        malformed
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            StepSignal::Malformed { .. } | StepSignal::TransportFailure(_)
        )
    }
}

/// Where the current step lives, as known from the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    pub flow: Flow,
    pub session: Option<String>,
    pub drawer: Option<String>,
}

impl StepContext {
    pub fn new(flow: Flow, session: Option<String>, drawer: Option<String>) -> Self {
        Self {
            flow,
            session,
            drawer,
        }
    }

    /// The location that shows this step again. The server decides on load
    /// which drawer is pending, so re-showing is always safe.
    pub fn repeat_location(&self, routes: &RouteTemplates) -> Option<String> {
        let session = self.session.as_deref().filter(|s| !s.is_empty())?;
        routes
            .confirm_for(self.flow, session, self.drawer.as_deref())
            .or_else(|| Some(routes.catalog_for(self.flow, session)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    Explicit(String),
    SessionEnded(String),
    RepeatStep(String),
    Home(String),
}

impl NavigationOutcome {
    pub fn location(&self) -> &str {
        match self {
            NavigationOutcome::Explicit(l)
            | NavigationOutcome::SessionEnded(l)
            | NavigationOutcome::RepeatStep(l)
            | NavigationOutcome::Home(l) => l,
        }
    }

    pub fn into_location(self) -> String {
        match self {
            NavigationOutcome::Explicit(l)
            | NavigationOutcome::SessionEnded(l)
            | NavigationOutcome::RepeatStep(l)
            | NavigationOutcome::Home(l) => l,
        }
    }
}

fn home(routes: &RouteTemplates) -> NavigationOutcome {
    let loc = routes.home.trim();
    NavigationOutcome::Home(if loc.is_empty() { "/".into() } else { loc.into() })
}

pub fn resolve(signal: &StepSignal, ctx: &StepContext, routes: &RouteTemplates) -> NavigationOutcome {
    let outcome = match signal {
        StepSignal::ExplicitNext(loc) => NavigationOutcome::Explicit(loc.clone()),
        StepSignal::SessionEnded if !routes.session_end.trim().is_empty() => {
            NavigationOutcome::SessionEnded(routes.session_end.clone())
        }
        StepSignal::SessionEnded => home(routes),
        StepSignal::Malformed { .. } | StepSignal::TransportFailure(_) => {
            match ctx.repeat_location(routes) {
                Some(loc) => NavigationOutcome::RepeatStep(loc),
                None => home(routes),
            }
        }
    };
    tracing::debug!(?signal, ?outcome, flow = %ctx.flow, "step resolved");
    outcome
}

/// Classify and resolve in one go.
pub fn decide(
    raw: &Result<Reply, Failure>,
    ctx: &StepContext,
    routes: &RouteTemplates,
) -> NavigationOutcome {
    resolve(&StepSignal::classify(raw), ctx, routes)
}
