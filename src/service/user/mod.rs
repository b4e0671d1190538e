mod model;

pub use model::*;

use std::sync::Arc;

use crate::{storage::UserRepository, transport::Sender};

use super::ServiceError;

#[derive(Clone)]
pub struct UserService {
    repository: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(repository: Arc<dyn UserRepository>) -> Self {
        info!("Initializing UserService...");
        Self { repository }
    }

    /// Returns the stored user for a sender, creating a `default` record on first sight.
    pub async fn resolve(&self, sender: &Sender) -> Result<User, ServiceError> {
        if let Some(mut user) = self.repository.get_user_by_id(sender.id).await? {
            if sender.username.is_some() && user.username != sender.username {
                debug!("Refreshing handle of user {}", sender.id);
                let patch = UserPatch {
                    username: sender.username.clone(),
                    ..Default::default()
                };
                self.repository.update_user(sender.id, patch).await?;
                user.username = sender.username.clone();
            }
            return Ok(user);
        }

        let user = User::new(sender.id, sender.username.clone(), Some(sender.first_name.clone()));
        self.repository.add_user(&user).await?;
        info!("Registered new user {}", user.id);

        Ok(user)
    }

    /// Looks a user up by `@handle`, bare handle or numeric id.
    pub async fn find(&self, handle_or_id: &str) -> Result<Option<User>, ServiceError> {
        let handle_or_id = handle_or_id.trim();

        if !handle_or_id.starts_with('@') {
            if let Ok(id) = handle_or_id.parse::<u64>() {
                return Ok(self.repository.get_user_by_id(id).await?);
            }
        }

        Ok(self.repository.get_user_by_handle(handle_or_id).await?)
    }

    pub async fn get(&self, id: u64) -> Result<Option<User>, ServiceError> {
        Ok(self.repository.get_user_by_id(id).await?)
    }

    pub async fn update(&self, id: u64, patch: UserPatch) -> Result<bool, ServiceError> {
        Ok(self.repository.update_user(id, patch).await?)
    }

    pub async fn update_roles(&self, id: u64, roles: Vec<Role>) -> Result<bool, ServiceError> {
        Ok(self.repository.update_user(id, UserPatch::roles(roles)).await?)
    }

    pub async fn users_with_role(&self, role: Role) -> Result<Vec<User>, ServiceError> {
        Ok(self.repository.get_users_by_role(role).await?)
    }

    pub async fn users(&self) -> Result<Vec<User>, ServiceError> {
        Ok(self.repository.get_users().await?)
    }
}
