//! Request scoping.
//!
//! The organization of a request is resolved once, from the authenticated
//! principal, and threaded through every service call. It is never read from
//! a request body.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::UserRole;

/// Principal headers set by the upstream identity gateway after it has
/// validated the caller's token.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const ORGANIZATION_ID_HEADER: &str = "x-organization-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id of the current request, inserted by the request-id
/// middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Which rows an operation may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataScope {
    /// Rows owned by one organization.
    Tenant(Uuid),
    /// System-wide data not owned by any organization.
    Global,
}

impl DataScope {
    pub fn organization_id(&self) -> Option<Uuid> {
        match self {
            DataScope::Tenant(id) => Some(*id),
            DataScope::Global => None,
        }
    }
}

/// The authenticated principal of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestScope {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: UserRole,
    pub request_id: String,
}

impl RequestScope {
    pub fn data_scope(&self) -> DataScope {
        DataScope::Tenant(self.organization_id)
    }

    pub fn require_role(&self, allowed: &[UserRole]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    fn from_headers(headers: &HeaderMap, request_id: String) -> Result<Self, AppError> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or(AppError::Unauthorized)
        };
        let uuid = |name: &str| header(name)?.parse::<Uuid>().map_err(|_| AppError::Unauthorized);

        Ok(Self {
            organization_id: uuid(ORGANIZATION_ID_HEADER)?,
            user_id: uuid(USER_ID_HEADER)?,
            role: header(USER_ROLE_HEADER)?
                .parse::<UserRole>()
                .map_err(|_| AppError::Unauthorized)?,
            request_id,
        })
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestScope {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = parts
            .extensions
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self::from_headers(&parts.headers, request_id)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(org: &str, user: &str, role: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(ORGANIZATION_ID_HEADER, HeaderValue::from_str(org).unwrap());
        h.insert(USER_ID_HEADER, HeaderValue::from_str(user).unwrap());
        h.insert(USER_ROLE_HEADER, HeaderValue::from_str(role).unwrap());
        h
    }

    #[test]
    fn test_scope_resolves_from_principal_headers() {
        let (org, user) = (Uuid::new_v4(), Uuid::new_v4());
        let scope = RequestScope::from_headers(
            &headers(&org.to_string(), &user.to_string(), "HR_ADMIN"),
            "req-1".to_string(),
        )
        .unwrap();
        assert_eq!(scope.organization_id, org);
        assert_eq!(scope.user_id, user);
        assert_eq!(scope.role, UserRole::HrAdmin);
        assert_eq!(scope.data_scope(), DataScope::Tenant(org));
    }

    #[test]
    fn test_missing_or_malformed_principal_is_unauthorized() {
        let user = Uuid::new_v4().to_string();
        let bad = RequestScope::from_headers(&headers("not-a-uuid", &user, "HR_ADMIN"), String::new());
        assert!(matches!(bad, Err(AppError::Unauthorized)));

        let bad_role = RequestScope::from_headers(
            &headers(&Uuid::new_v4().to_string(), &user, "ROOT"),
            String::new(),
        );
        assert!(matches!(bad_role, Err(AppError::Unauthorized)));

        let empty = RequestScope::from_headers(&HeaderMap::new(), String::new());
        assert!(matches!(empty, Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_require_role() {
        let scope = RequestScope {
            organization_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role: UserRole::Manager,
            request_id: String::new(),
        };
        assert!(scope.require_role(&[UserRole::Manager]).is_ok());
        assert!(matches!(
            scope.require_role(&[UserRole::HrAdmin]),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn test_global_scope_has_no_organization() {
        assert_eq!(DataScope::Global.organization_id(), None);
    }
}
