use std::collections::BTreeSet;

use tracing::warn;
use uuid::Uuid;

use ufb_db::Database;
use ufb_db::models::UserRow;
use ufb_types::api::Claims;
use ufb_types::models::{Permission, UserType};

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller with the permissions currently granted to it.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub email: String,
    pub user_type: UserType,
    pub permissions: BTreeSet<Permission>,
}

impl Actor {
    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn is_super(&self) -> bool {
        self.user_type == UserType::Super
    }
}

/// SUPER users hold everything; others hold what their roles grant.
/// Unknown stored permission names are skipped.
pub fn effective_permissions(user_type: UserType, granted: &[String]) -> BTreeSet<Permission> {
    if user_type == UserType::Super {
        return Permission::ALL.into_iter().collect();
    }
    granted
        .iter()
        .filter_map(|name| match name.parse() {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("Ignoring stored permission: {}", e);
                None
            }
        })
        .collect()
}

pub fn parse_user_type(row: &UserRow) -> UserType {
    row.user_type.parse().unwrap_or_else(|e| {
        warn!("Corrupt user_type on user '{}': {}", row.id, e);
        UserType::General
    })
}

/// Load the caller. A valid token for a deleted user is treated as
/// unauthenticated.
pub fn load_actor(db: &Database, user_id: Uuid) -> Result<Actor, ApiError> {
    let id = user_id.to_string();
    let user = db.get_user_by_id(&id)?.ok_or(ApiError::Unauthorized)?;
    let user_type = parse_user_type(&user);
    let granted = db.get_user_permissions(&id)?;

    Ok(Actor {
        id: user_id,
        email: user.email,
        user_type,
        permissions: effective_permissions(user_type, &granted),
    })
}

pub async fn current_actor(state: &AppState, claims: &Claims) -> Result<Actor, ApiError> {
    let user_id = claims.sub;
    state.with_db(move |db| load_actor(db, user_id)).await
}

/// Load the caller and require `permission`, or fail with 403.
pub async fn authorize(state: &AppState, claims: &Claims, permission: Permission) -> Result<Actor, ApiError> {
    let actor = current_actor(state, claims).await?;
    if !actor.has(permission) {
        return Err(ApiError::Forbidden);
    }
    Ok(actor)
}
