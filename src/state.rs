// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;

use crate::auth::AuthCore;
use crate::realtime::ConnectionRegistry;
use crate::storage::UserDirectory;

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<AuthCore>,
    pub users: Arc<dyn UserDirectory>,
    pub registry: Arc<ConnectionRegistry>,
}

impl AppState {
    pub fn new(
        core: Arc<AuthCore>,
        users: Arc<dyn UserDirectory>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            core,
            users,
            registry,
        }
    }
}
