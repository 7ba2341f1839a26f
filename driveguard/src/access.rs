use serde::{Deserialize, Serialize};

use crate::{
    error::{DriveGuardError, Result},
    session::{Role, Session},
};

/// Navigable views of the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    Home,
    Login,
    Register,
    BuyInsurance,
    Admin,
    AdminPolicy,
}

impl Route {
    pub const ALL: [Route; 6] = [
        Route::Home,
        Route::Login,
        Route::Register,
        Route::BuyInsurance,
        Route::Admin,
        Route::AdminPolicy,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Login => "/login",
            Route::Register => "/register",
            Route::BuyInsurance => "/buy-insurance",
            Route::Admin => "/admin",
            Route::AdminPolicy => "/admin-policy",
        }
    }

    /// `None` for public routes
    pub fn required_role(&self) -> Option<Role> {
        match self {
            Route::BuyInsurance => Some(Role::PolicyHolder),
            Route::Admin | Route::AdminPolicy => Some(Role::Admin),
            Route::Home | Route::Login | Route::Register => None,
        }
    }

    pub fn from_path(path: &str) -> Option<Route> {
        Self::ALL.into_iter().find(|route| route.path() == path)
    }

    /// Where a freshly logged-in wallet lands
    pub fn landing_for(role: Role) -> Route {
        match role {
            Role::Admin => Route::AdminPolicy,
            Role::PolicyHolder => Route::Home,
            Role::None => Route::Register,
        }
    }
}

/// Checks the session against the role a route requires.
///
/// Returns the session for protected routes so callers act on the exact
/// session that was authorized.
pub fn authorize(session: Option<&Session>, route: Route) -> Result<Option<&Session>> {
    let Some(required) = route.required_role() else {
        return Ok(session);
    };

    let session = session.ok_or(DriveGuardError::Unauthenticated)?;
    if session.role != required {
        return Err(DriveGuardError::AccessDenied(format!(
            "{} requires {}, session holds {}",
            route.path(),
            required,
            session.role
        )));
    }
    Ok(Some(session))
}
