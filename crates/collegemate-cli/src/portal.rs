//! One portal tab
//!
//! Bundles the auth context, poll and uploads over a shared store, tracks
//! which view is showing, and applies navigator requests: redirects go
//! through the route guard, and a reload throws away the auth context so no
//! pending attempt or code survives it.

use std::sync::Arc;

use collegemate_core::{
    auth::OtpDelivery,
    guard,
    routes::{NavigatorEvent, RecordingNavigator},
    Authenticator, Clock, DailyPoll, KeyValueStore, Navigation, OtpConfig, Route, UploadStore,
};
use tracing::debug;

pub struct Portal {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    otp_config: OtpConfig,
    delivery: Arc<dyn OtpDelivery>,
    navigator: RecordingNavigator,
    pub auth: Authenticator,
    pub poll: DailyPoll,
    pub uploads: UploadStore,
    route: Route,
}

impl Portal {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        otp_config: OtpConfig,
        delivery: Arc<dyn OtpDelivery>,
    ) -> Self {
        let navigator = RecordingNavigator::new();
        let auth = Self::build_auth(&store, &clock, &otp_config, &delivery, &navigator);
        let poll = DailyPoll::new(Arc::clone(&store), Arc::clone(&clock));
        let uploads = UploadStore::new(Arc::clone(&store), Arc::clone(&clock));

        let mut portal = Self {
            store,
            clock,
            otp_config,
            delivery,
            navigator,
            auth,
            poll,
            uploads,
            route: Route::Home,
        };
        portal.open(Route::Home);
        portal
    }

    fn build_auth(
        store: &Arc<dyn KeyValueStore>,
        clock: &Arc<dyn Clock>,
        otp_config: &OtpConfig,
        delivery: &Arc<dyn OtpDelivery>,
        navigator: &RecordingNavigator,
    ) -> Authenticator {
        Authenticator::with_store(
            Arc::clone(store),
            Arc::clone(clock),
            otp_config.clone(),
            Arc::clone(delivery),
            Arc::new(navigator.clone()),
        )
    }

    /// View currently showing
    pub fn route(&self) -> Route {
        self.route
    }

    /// Navigate to `route`, honoring the guard; returns the view shown
    pub fn open(&mut self, route: Route) -> Route {
        let shown = match guard(route, self.auth.is_authenticated()) {
            Navigation::Render(route) => route,
            Navigation::Redirect(target) => {
                debug!(requested = %route, redirected = %target, "navigation redirected");
                target
            }
        };
        self.route = shown;
        shown
    }

    /// Apply whatever the auth context asked the navigator to do
    pub fn settle(&mut self) {
        for event in self.navigator.drain() {
            match event {
                NavigatorEvent::Redirect(route) => {
                    self.open(route);
                }
                NavigatorEvent::Reload => self.reload(),
            }
        }
    }

    /// Drop all in-memory auth state and re-render the current view
    pub fn reload(&mut self) {
        debug!("reloading portal tab");
        self.auth = Self::build_auth(
            &self.store,
            &self.clock,
            &self.otp_config,
            &self.delivery,
            &self.navigator,
        );
        self.open(self.route);
    }
}
