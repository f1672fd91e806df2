//! Portal routes and the navigation guard
//!
//! The view layer asks [`guard`] before rendering a path. Anonymous users are
//! bounced to the login page from protected views, and signed-in users are
//! bounced home from the login/signup/OTP pages.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Every view the portal knows about
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    Home,
    Study,
    Events,
    Societies,
    Notices,
    Timetable,
    ExamMode,
    Internships,
    Hackathons,
    Profile,
    Admin,
    Upload,
    Login,
    Signup,
    ForgotPassword,
    Otp,
}

impl Route {
    pub const ALL: [Route; 16] = [
        Route::Home,
        Route::Study,
        Route::Events,
        Route::Societies,
        Route::Notices,
        Route::Timetable,
        Route::ExamMode,
        Route::Internships,
        Route::Hackathons,
        Route::Profile,
        Route::Admin,
        Route::Upload,
        Route::Login,
        Route::Signup,
        Route::ForgotPassword,
        Route::Otp,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Study => "/study",
            Route::Events => "/events",
            Route::Societies => "/societies",
            Route::Notices => "/notices",
            Route::Timetable => "/timetable",
            Route::ExamMode => "/exam-mode",
            Route::Internships => "/internships",
            Route::Hackathons => "/hackathons",
            Route::Profile => "/profile",
            Route::Admin => "/admin",
            Route::Upload => "/upload",
            Route::Login => "/login",
            Route::Signup => "/signup",
            Route::ForgotPassword => "/forgot-password",
            Route::Otp => "/otp",
        }
    }

    /// Resolve a path (with or without a leading `#`); unknown paths are Home
    pub fn from_path(path: &str) -> Route {
        let path = path.trim().trim_start_matches('#');
        if path.is_empty() {
            return Route::Home;
        }
        Route::ALL
            .into_iter()
            .find(|route| route.path() == path)
            .unwrap_or(Route::Home)
    }

    /// Pages reachable only while signed out
    pub fn is_public(&self) -> bool {
        matches!(
            self,
            Route::Login | Route::Signup | Route::ForgotPassword | Route::Otp
        )
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Outcome of a navigation check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Navigation {
    Render(Route),
    Redirect(Route),
}

/// Decide whether `route` may be shown
pub fn guard(route: Route, authenticated: bool) -> Navigation {
    match (authenticated, route.is_public()) {
        (false, false) => Navigation::Redirect(Route::Login),
        (true, true) => Navigation::Redirect(Route::Home),
        _ => Navigation::Render(route),
    }
}

/// Side-effect seam toward the view layer
pub trait Navigator: Send + Sync {
    /// Send the user to `route`
    fn redirect(&self, route: Route);

    /// Discard all in-memory view state and start over
    fn reload(&self);
}

/// Recorded navigator call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavigatorEvent {
    Redirect(Route),
    Reload,
}

/// Navigator that only records what it was asked to do
#[derive(Clone, Debug, Default)]
pub struct RecordingNavigator {
    events: Arc<Mutex<Vec<NavigatorEvent>>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NavigatorEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Target of the most recent redirect
    pub fn last_redirect(&self) -> Option<Route> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find_map(|event| match event {
                NavigatorEvent::Redirect(route) => Some(*route),
                NavigatorEvent::Reload => None,
            })
    }

    /// Remove and return everything recorded so far
    pub fn drain(&self) -> Vec<NavigatorEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, route: Route) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(NavigatorEvent::Redirect(route));
    }

    fn reload(&self) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(NavigatorEvent::Reload);
    }
}
