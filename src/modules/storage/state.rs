use chrono::{Duration, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::modules::auth::store::{
    OutboxEntry, OutboxId, OutboxStore, StoreError, User, UserStore, VerificationToken,
    VerificationTokenStore,
};
use crate::modules::email::NotificationEmail;

/// Everything the datastore persists, keyed the way it is looked up
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct AccountState {
    pub users: HashMap<String, User>,
    pub tokens: HashMap<String, VerificationToken>,
    pub outbox: Vec<OutboxEntry>,
}

impl AccountState {
    fn outbox_entry_mut(&mut self, id: OutboxId) -> Result<&mut OutboxEntry, StoreError> {
        self.outbox
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(StoreError::UnknownOutboxEntry(id))
    }
}

impl UserStore for AccountState {
    fn save_user(&mut self, user: User) -> Result<User, StoreError> {
        if let Some(existing) = self.users.get(&user.username) {
            if existing.id != user.id {
                return Err(StoreError::DuplicateUsername(user.username));
            }
        }

        // A rename leaves the old key behind
        self.users
            .retain(|name, stored| stored.id != user.id || *name == user.username);

        self.users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(username).cloned())
    }

    fn delete_user(&mut self, username: &str) -> Result<bool, StoreError> {
        Ok(self.users.remove(username).is_some())
    }
}

impl VerificationTokenStore for AccountState {
    fn save_token(&mut self, token: VerificationToken) -> Result<VerificationToken, StoreError> {
        if !self.users.contains_key(&token.username) {
            return Err(StoreError::UnknownOwner(token.username));
        }
        if self.tokens.contains_key(&token.token) {
            return Err(StoreError::DuplicateToken);
        }

        self.tokens.insert(token.token.clone(), token.clone());
        Ok(token)
    }

    fn find_by_token(&self, token: &str) -> Result<Option<VerificationToken>, StoreError> {
        Ok(self.tokens.get(token).cloned())
    }
}

impl OutboxStore for AccountState {
    fn enqueue(&mut self, email: NotificationEmail) -> Result<OutboxId, StoreError> {
        let entry = OutboxEntry::new(email);
        let id = entry.id;
        self.outbox.push(entry);
        Ok(id)
    }

    fn pending(&self) -> Result<Vec<OutboxEntry>, StoreError> {
        Ok(self
            .outbox
            .iter()
            .sorted_by_key(|entry| entry.enqueued_at)
            .cloned()
            .collect())
    }

    fn claim(&mut self, id: OutboxId, stale_after: Duration) -> Result<bool, StoreError> {
        // Gone means someone else already delivered it
        let Some(entry) = self.outbox.iter_mut().find(|entry| entry.id == id) else {
            return Ok(false);
        };

        let now = Utc::now();
        if entry.is_claimed(now, stale_after) {
            return Ok(false);
        }
        entry.claimed_at = Some(now);
        Ok(true)
    }

    fn mark_delivered(&mut self, id: OutboxId) -> Result<(), StoreError> {
        let before = self.outbox.len();
        self.outbox.retain(|entry| entry.id != id);
        if self.outbox.len() == before {
            return Err(StoreError::UnknownOutboxEntry(id));
        }
        Ok(())
    }

    fn record_failure(&mut self, id: OutboxId, reason: &str) -> Result<(), StoreError> {
        let entry = self.outbox_entry_mut(id)?;
        entry.attempts += 1;
        entry.last_error = Some(reason.to_string());
        entry.claimed_at = None;
        Ok(())
    }
}
