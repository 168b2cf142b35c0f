//! Booking parties.

use std::sync::Arc;

use store::{BookingStore, StoreError, User, UserId};
use tracing::info;

use crate::clock::Clock;
use crate::error::{DomainError, Result};

/// Command to register a booking party.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

/// Service for booking parties.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl UserService {
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Registers a user. Emails are unique.
    #[tracing::instrument(skip(self, cmd))]
    pub async fn create_user(&self, cmd: NewUser) -> Result<User> {
        let name = cmd.name.trim();
        let email = cmd.email.trim().to_lowercase();
        if name.is_empty() {
            return Err(DomainError::invalid("name must not be blank"));
        }
        if !is_plausible_email(&email) {
            return Err(DomainError::invalid("email must be a valid address"));
        }

        let user = User {
            id: UserId::new(),
            name: name.to_string(),
            email,
            created_at: self.clock.now(),
        };

        let mut tx = self.store.begin().await?;
        match tx.insert_user(&user).await {
            Err(StoreError::UniqueViolation(_)) => {
                return Err(DomainError::conflict("Email is already registered"));
            }
            other => other?,
        }
        match tx.commit().await {
            Err(StoreError::UniqueViolation(_)) => {
                return Err(DomainError::conflict("Email is already registered"));
            }
            other => other?,
        }

        info!(user_id = %user.id, "User created");
        Ok(user)
    }

    /// Loads a user by ID.
    pub async fn get_user(&self, user_id: UserId) -> Result<User> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("User not found"))
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use store::InMemoryBookingStore;

    fn service() -> UserService {
        UserService::new(
            Arc::new(InMemoryBookingStore::new()),
            Arc::new(ManualClock::default()),
        )
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Ani".to_string(),
            email: email.to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let service = service();
        service
            .create_user(new_user("ani@example.com"))
            .await
            .unwrap();
        let result = service.create_user(new_user("ANI@example.com")).await;
        assert!(matches!(result, Err(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn rejects_malformed_email() {
        let service = service();
        let result = service.create_user(new_user("not-an-email")).await;
        assert!(matches!(result, Err(DomainError::Invalid(_))));
    }

    #[tokio::test]
    async fn created_user_can_be_loaded() {
        let service = service();
        let user = service
            .create_user(new_user("ani@example.com"))
            .await
            .unwrap();
        assert_eq!(service.get_user(user.id).await.unwrap(), user);
    }
}
