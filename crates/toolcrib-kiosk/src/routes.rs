use std::fmt;

use serde::{Deserialize, Serialize};

const SESSION_SLOT: &str = "{session}";
const DRAWER_SLOT: &str = "{drawer}";

/// Which physical direction a session is moving tools in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    Withdrawal,
    Return,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Withdrawal => write!(f, "withdrawal"),
            Flow::Return => write!(f, "return"),
        }
    }
}

/// Substitute `{session}` and `{drawer}` in a location or endpoint template.
pub fn fill(template: &str, session: &str, drawer: Option<&str>) -> String {
    let out = template.replace(SESSION_SLOT, session);
    match drawer {
        Some(d) => out.replace(DRAWER_SLOT, d),
        None => out,
    }
}

fn default_home() -> String {
    "/".into()
}

fn default_denied() -> String {
    "/negado".into()
}

fn default_panel() -> String {
    "/painel/{session}/".into()
}

fn default_panel_lobby() -> String {
    "/painel/".into()
}

fn default_withdraw() -> String {
    "/retirar/{session}/".into()
}

fn default_withdraw_confirm() -> String {
    "/retirar-confirmar/{session}/".into()
}

fn default_return_catalog() -> String {
    "/devolver/{session}/".into()
}

fn default_return_confirm() -> String {
    "/devolver/{session}/gaveta/{drawer}/".into()
}

/// Client-side locations (pages rendered by the server).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteTemplates {
    #[serde(default = "default_home")]
    pub home: String,
    #[serde(default = "default_denied")]
    pub denied: String,
    #[serde(default = "default_panel")]
    pub panel: String,
    #[serde(default = "default_panel_lobby")]
    pub panel_lobby: String,
    #[serde(default = "default_withdraw")]
    pub withdraw: String,
    #[serde(default = "default_withdraw_confirm")]
    pub withdraw_confirm: String,
    #[serde(default = "default_return_catalog")]
    pub return_catalog: String,
    #[serde(default = "default_return_confirm")]
    pub return_confirm: String,
    /// Where a finished session lands. Defaults to the home screen.
    #[serde(default = "default_home")]
    pub session_end: String,
}

impl Default for RouteTemplates {
    fn default() -> Self {
        Self {
            home: default_home(),
            denied: default_denied(),
            panel: default_panel(),
            panel_lobby: default_panel_lobby(),
            withdraw: default_withdraw(),
            withdraw_confirm: default_withdraw_confirm(),
            return_catalog: default_return_catalog(),
            return_confirm: default_return_confirm(),
            session_end: default_home(),
        }
    }
}

impl RouteTemplates {
    pub fn panel_for(&self, session: &str) -> String {
        fill(&self.panel, session, None)
    }

    pub fn catalog_for(&self, flow: Flow, session: &str) -> String {
        match flow {
            Flow::Withdrawal => fill(&self.withdraw, session, None),
            Flow::Return => fill(&self.return_catalog, session, None),
        }
    }

    /// The confirmation page for a flow. Returns `None` for a return without a
    /// known drawer, since that page is keyed by drawer.
    pub fn confirm_for(&self, flow: Flow, session: &str, drawer: Option<&str>) -> Option<String> {
        match flow {
            Flow::Withdrawal => Some(fill(&self.withdraw_confirm, session, None)),
            Flow::Return => drawer.map(|d| fill(&self.return_confirm, session, Some(d))),
        }
    }

    /// Map a location back to the screen it renders.
    pub fn screen_for(&self, location: &str) -> Screen {
        let path = location_path(location);

        if match_template(&self.home, path).is_some() {
            return Screen::Home;
        }
        if match_template(&self.denied, path).is_some() {
            return Screen::Denied;
        }
        if match_template(&self.panel_lobby, path).is_some() {
            return Screen::Panel { session: None };
        }
        if let Some(c) = match_template(&self.panel, path) {
            return Screen::Panel { session: c.session };
        }
        if let Some(c) = match_template(&self.withdraw_confirm, path) {
            if let Some(session) = c.session {
                return Screen::Confirm {
                    flow: Flow::Withdrawal,
                    session,
                    drawer: None,
                };
            }
        }
        if let Some(c) = match_template(&self.return_confirm, path) {
            if let Some(session) = c.session {
                return Screen::Confirm {
                    flow: Flow::Return,
                    session,
                    drawer: c.drawer,
                };
            }
        }
        if let Some(c) = match_template(&self.withdraw, path) {
            if let Some(session) = c.session {
                return Screen::Catalog {
                    flow: Flow::Withdrawal,
                    session,
                };
            }
        }
        if let Some(c) = match_template(&self.return_catalog, path) {
            if let Some(session) = c.session {
                return Screen::Catalog {
                    flow: Flow::Return,
                    session,
                };
            }
        }
        Screen::Unknown
    }
}

fn default_card_status() -> String {
    "/api/status/".into()
}

fn default_active_session() -> String {
    "/api/status-frontend/".into()
}

fn default_submit_withdrawal() -> String {
    "/api/sessoes/{session}/retiradas/".into()
}

fn default_submit_return() -> String {
    "/devolver/selecionar?sessao_id={session}".into()
}

fn default_confirm_withdrawal() -> String {
    "/api/sessoes/{session}/gaveta/{drawer}/confirmar-retirada/".into()
}

fn default_confirm_return() -> String {
    "/api/sessoes/{session}/gaveta/{drawer}/confirmar-devolucao/".into()
}

/// Server API paths the kiosk calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointTemplates {
    #[serde(default = "default_card_status")]
    pub card_status: String,
    #[serde(default = "default_active_session")]
    pub active_session: String,
    #[serde(default = "default_submit_withdrawal")]
    pub submit_withdrawal: String,
    #[serde(default = "default_submit_return")]
    pub submit_return: String,
    #[serde(default = "default_confirm_withdrawal")]
    pub confirm_withdrawal: String,
    #[serde(default = "default_confirm_return")]
    pub confirm_return: String,
}

impl Default for EndpointTemplates {
    fn default() -> Self {
        Self {
            card_status: default_card_status(),
            active_session: default_active_session(),
            submit_withdrawal: default_submit_withdrawal(),
            submit_return: default_submit_return(),
            confirm_withdrawal: default_confirm_withdrawal(),
            confirm_return: default_confirm_return(),
        }
    }
}

impl EndpointTemplates {
    pub fn submit_selection(&self, flow: Flow, session: &str) -> String {
        match flow {
            Flow::Withdrawal => fill(&self.submit_withdrawal, session, None),
            Flow::Return => fill(&self.submit_return, session, None),
        }
    }

    pub fn confirm_drawer(&self, flow: Flow, session: &str, drawer: &str) -> String {
        match flow {
            Flow::Withdrawal => fill(&self.confirm_withdrawal, session, Some(drawer)),
            Flow::Return => fill(&self.confirm_return, session, Some(drawer)),
        }
    }
}

/// What a location renders, as far as the client cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Home,
    Denied,
    Panel {
        session: Option<String>,
    },
    Catalog {
        flow: Flow,
        session: String,
    },
    /// Drawer confirmation. The drawer comes from the path for returns and
    /// from the page data for withdrawals.
    Confirm {
        flow: Flow,
        session: String,
        drawer: Option<String>,
    },
    Unknown,
}

impl Screen {
    pub fn session(&self) -> Option<&str> {
        match self {
            Screen::Panel { session } => session.as_deref(),
            Screen::Catalog { session, .. } | Screen::Confirm { session, .. } => Some(session),
            Screen::Home | Screen::Denied | Screen::Unknown => None,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Screen::Home => "Welcome",
            Screen::Denied => "Access denied",
            Screen::Panel { .. } => "Panel",
            Screen::Catalog {
                flow: Flow::Withdrawal,
                ..
            } => "Withdraw tools",
            Screen::Catalog {
                flow: Flow::Return, ..
            } => "Return tools",
            Screen::Confirm {
                flow: Flow::Withdrawal,
                ..
            } => "Confirm withdrawal",
            Screen::Confirm {
                flow: Flow::Return, ..
            } => "Confirm return",
            Screen::Unknown => "Unknown page",
        }
    }
}

#[derive(Debug, Default)]
struct Captures {
    session: Option<String>,
    drawer: Option<String>,
}

/// Strip scheme/host, query and fragment, leaving the path.
fn location_path(location: &str) -> &str {
    let mut path = location.trim();
    if let Some(idx) = path.find("://") {
        let rest = &path[idx + 3..];
        path = rest.find('/').map(|i| &rest[i..]).unwrap_or("/");
    }
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn match_template(template: &str, path: &str) -> Option<Captures> {
    let want = segments(location_path(template));
    let got = segments(path);
    if want.len() != got.len() {
        return None;
    }
    let mut caps = Captures::default();
    for (w, g) in want.iter().zip(got.iter()) {
        if *w == SESSION_SLOT {
            caps.session = Some((*g).to_string());
        } else if *w == DRAWER_SLOT {
            caps.drawer = Some((*g).to_string());
        } else if w != g {
            return None;
        }
    }
    Some(caps)
}
