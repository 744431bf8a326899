//! Builds per-session repositories and controllers.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::Config;
use crate::controller::Controller;
use crate::models::User;
use crate::query::entity::Entity;
use crate::repository::Repository;
use crate::session::Session;

/// Shared wiring for controllers. Cheap to clone; one controller is
/// built per session.
#[derive(Debug, Clone, Default)]
pub struct Factory {
    exclude_fields: Arc<BTreeSet<String>>,
}

impl Factory {
    pub fn new(exclude_fields: impl IntoIterator<Item = String>) -> Self {
        Self {
            exclude_fields: Arc::new(exclude_fields.into_iter().collect()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.exclude_fields.iter().cloned())
    }

    pub fn exclude_fields(&self) -> &BTreeSet<String> {
        &self.exclude_fields
    }

    pub fn repository<E: Entity>(&self, session: Arc<Session>) -> Repository<E> {
        Repository::new(session)
    }

    pub fn controller<E: Entity>(&self, session: Arc<Session>) -> Controller<E> {
        Controller::new(self.repository(session), self.exclude_fields.clone())
    }

    pub fn user_controller(&self, session: Arc<Session>) -> Controller<User> {
        self.controller(session)
    }
}
