//! User service - profile edits and the admin user panel.
//!
//! Guards the admin invariants: an actor cannot delete themselves, and
//! the last active admin can be neither deleted, demoted nor deactivated.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::domain::{user::normalize_email, Actor, NewUser, User, UserChanges, UserRole};
use crate::errors::{AppError, AppResult, OptionExt};
use crate::services::DataService;

/// Self-service profile changes.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct ProfileUpdate {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub preferences: Option<serde_json::Value>,
}

/// Admin changes to another account.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct AdminUserUpdate {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub preferences: Option<serde_json::Value>,
}

#[async_trait]
pub trait UserService: Send + Sync {
    async fn get_user(&self, id: Uuid) -> AppResult<User>;

    async fn list_users(&self) -> AppResult<Vec<User>>;

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Admin creation of an account with any role
    async fn create_user(&self, new_user: NewUser) -> AppResult<User>;

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> AppResult<User>;

    async fn update_user(&self, actor: Actor, id: Uuid, update: AdminUserUpdate) -> AppResult<User>;

    async fn set_password(&self, id: Uuid, password: &str) -> AppResult<()>;

    async fn delete_user(&self, actor: Actor, id: Uuid) -> AppResult<()>;
}

pub struct UserManager {
    data: Arc<DataService>,
    /// Held across the admin count and the change it guards, so two
    /// admins cannot remove each other at the same time
    admin_lock: tokio::sync::Mutex<()>,
}

impl UserManager {
    pub fn new(data: Arc<DataService>) -> Self {
        Self {
            data,
            admin_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn active_admins(&self) -> AppResult<usize> {
        let users = self.data.list_users().await?;
        Ok(users.iter().filter(|u| u.is_admin() && u.is_active).count())
    }

    /// Fails when `target` is the only active admin left.
    async fn ensure_not_last_admin(&self, target: &User, action: &str) -> AppResult<()> {
        if target.is_admin() && target.is_active && self.active_admins().await? <= 1 {
            tracing::warn!(user_id = %target.id, action, "Refused to remove the last admin");
            return Err(AppError::BadRequest(format!("Cannot {} the last admin", action)));
        }
        Ok(())
    }
}

#[async_trait]
impl UserService for UserManager {
    async fn get_user(&self, id: Uuid) -> AppResult<User> {
        self.data.find_user(id).await?.ok_or_not_found()
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        self.data.list_users().await
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.data.find_user_by_email(&normalize_email(email)).await
    }

    async fn create_user(&self, mut new_user: NewUser) -> AppResult<User> {
        new_user.email = normalize_email(&new_user.email);
        if self.data.find_user_by_email(&new_user.email).await?.is_some() {
            return Err(AppError::conflict("User with this email"));
        }
        let user = self.data.create_user(new_user).await?;
        tracing::info!(user_id = %user.id, role = %user.role, "User created by admin");
        Ok(user)
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> AppResult<User> {
        self.get_user(id).await?;
        self.data
            .update_user(
                id,
                UserChanges {
                    name: update.name.map(|n| n.trim().to_string()),
                    phone: update.phone,
                    preferences: update.preferences,
                    ..Default::default()
                },
            )
            .await
    }

    async fn update_user(&self, actor: Actor, id: Uuid, update: AdminUserUpdate) -> AppResult<User> {
        let _guard = self.admin_lock.lock().await;
        let target = self.get_user(id).await?;

        let demoting = target.is_admin() && update.role.is_some_and(|r| !r.is_admin());
        let deactivating = target.is_active && update.is_active == Some(false);
        if demoting {
            self.ensure_not_last_admin(&target, "demote").await?;
        }
        if deactivating {
            if actor.id == id {
                return Err(AppError::BadRequest("Cannot deactivate your own account".into()));
            }
            self.ensure_not_last_admin(&target, "deactivate").await?;
        }

        let user = self
            .data
            .update_user(
                id,
                UserChanges {
                    name: update.name.map(|n| n.trim().to_string()),
                    role: update.role,
                    is_active: update.is_active,
                    phone: update.phone,
                    preferences: update.preferences,
                },
            )
            .await?;
        tracing::info!(user_id = %id, actor_id = %actor.id, "User updated by admin");
        Ok(user)
    }

    async fn set_password(&self, id: Uuid, password: &str) -> AppResult<()> {
        self.get_user(id).await?;
        self.data.set_password(id, password).await?;
        tracing::info!(user_id = %id, "Password changed");
        Ok(())
    }

    async fn delete_user(&self, actor: Actor, id: Uuid) -> AppResult<()> {
        if actor.id == id {
            return Err(AppError::BadRequest("Cannot delete your own account".into()));
        }
        let _guard = self.admin_lock.lock().await;
        let target = self.get_user(id).await?;
        self.ensure_not_last_admin(&target, "delete").await?;

        self.data.delete_user(id).await?;
        tracing::info!(user_id = %id, actor_id = %actor.id, "User deleted");
        Ok(())
    }
}
