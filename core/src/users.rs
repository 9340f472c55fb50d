//! Repository for user profiles.
//!
//! Only the authenticated user can be patched; `plan_update` rejects any
//! other user before a request exists.

use tracing::warn;

use crate::action::{resource_path, Action, Request};
use crate::client::Client;
use crate::entity::Entity;
use crate::error::{ApiError, ApiResult};
use crate::http::HttpResponse;
use crate::transport::Transport;
use crate::types::User;

pub const CURRENT_USER_PATH: &str = "/api/user";

pub fn plan_get() -> Request {
    Request::get(CURRENT_USER_PATH).named("users.get")
}

pub fn plan_get_by_id(user_id: &str) -> Request {
    Request::get(resource_path(CURRENT_USER_PATH, user_id)).named("users.get_by_id")
}

/// The `PATCH /api/user` action for `user`, or `None` when nothing changed.
pub fn plan_update(user: &User) -> ApiResult<Option<Action>> {
    if !user.is_current() {
        warn!(operation = "users.update", user_id = user.user_id(), "refusing to update another user's profile");
        return Err(ApiError::Forbidden(format!(
            "cannot update user {}: only the current user can be modified",
            user.user_id()
        )));
    }
    if !user.has_pending_changes() {
        return Ok(None);
    }
    Ok(Some(Action::patch(CURRENT_USER_PATH, user.pending_changes()).named("users.update")))
}

/// User operations bound to a client.
pub struct Users<'a, T: Transport> {
    client: &'a Client<T>,
}

impl<'a, T: Transport> Users<'a, T> {
    pub fn new(client: &'a Client<T>) -> Self {
        Self { client }
    }

    /// The user the session is authenticated as.
    pub async fn get(&self) -> ApiResult<User> {
        let value = plan_get().send(self.client).await?;
        let mut user = User::from_value(value)?;
        user.mark_current(true);
        Ok(user)
    }

    /// Any user by id. The result is never marked current.
    pub async fn get_by_id(&self, user_id: &str) -> ApiResult<User> {
        let value = plan_get_by_id(user_id).send(self.client).await?;
        let mut user = User::from_value(value)?;
        user.mark_current(false);
        Ok(user)
    }

    /// Push pending profile changes. Returns `None` without a call when
    /// there is nothing to send; clears the changes once the server accepts.
    pub async fn update(&self, user: &mut User) -> ApiResult<Option<HttpResponse>> {
        let Some(action) = plan_update(user)? else {
            return Ok(None);
        };
        let response = action.send(self.client).await?;
        user.clear_changes();
        Ok(Some(response))
    }
}
