//! Route table and the guard in front of protected routes.
//!
//! The guard reads only the in-memory `SessionState` and decides afresh on
//! every navigation.

use tracing::debug;

use crate::auth::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Register,
    ForgotPassword,
    ResetPassword,
    VerifyEmail,
    Dashboard,
    CreateChildProfile,
    CreateAiAgent,
    LearningProgress,
}

impl Route {
    pub const ALL: [Route; 9] = [
        Route::Login,
        Route::Register,
        Route::ForgotPassword,
        Route::ResetPassword,
        Route::VerifyEmail,
        Route::Dashboard,
        Route::CreateChildProfile,
        Route::CreateAiAgent,
        Route::LearningProgress,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Register => "/register",
            Route::ForgotPassword => "/forgot-password",
            Route::ResetPassword => "/reset-password",
            Route::VerifyEmail => "/verify-email",
            Route::Dashboard => "/dashboard",
            Route::CreateChildProfile => "/create-child-profile",
            Route::CreateAiAgent => "/create-ai-agent",
            Route::LearningProgress => "/learning-progress",
        }
    }

    /// Resolve a path. Query strings and trailing slashes are ignored; the
    /// root and anything unknown land on the dashboard.
    pub fn from_path(path: &str) -> Route {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let trimmed = path.trim_end_matches('/');
        Route::ALL
            .into_iter()
            .find(|route| route.path() == trimmed)
            .unwrap_or(Route::Dashboard)
    }

    pub fn is_protected(&self) -> bool {
        matches!(
            self,
            Route::Dashboard
                | Route::CreateChildProfile
                | Route::CreateAiAgent
                | Route::LearningProgress
        )
    }
}

/// What to do with a protected destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session state not known yet; show a spinner
    Pending,
    Redirect(Route),
    Allow,
}

/// Outcome of navigating to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Render(Route),
    Pending(Route),
    Redirect { from: Route, to: Route },
}

#[derive(Debug, Clone, Copy)]
pub struct RouteGuard {
    login_route: Route,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self {
            login_route: Route::Login,
        }
    }
}

impl RouteGuard {
    pub fn new(login_route: Route) -> Self {
        Self { login_route }
    }

    pub fn evaluate(&self, state: &SessionState) -> GuardDecision {
        match state {
            SessionState::Uninitialized | SessionState::Loading => GuardDecision::Pending,
            SessionState::Anonymous => GuardDecision::Redirect(self.login_route),
            SessionState::Authenticated(_) => GuardDecision::Allow,
        }
    }

    /// Resolve `path` and apply the guard if the route is protected
    pub fn navigate(&self, path: &str, state: &SessionState) -> Navigation {
        let route = Route::from_path(path);
        if !route.is_protected() {
            return Navigation::Render(route);
        }
        let navigation = match self.evaluate(state) {
            GuardDecision::Pending => Navigation::Pending(route),
            GuardDecision::Redirect(to) => Navigation::Redirect { from: route, to },
            GuardDecision::Allow => Navigation::Render(route),
        };
        debug!(path, state = state.label(), ?navigation, "Route guard evaluated");
        navigation
    }
}
