//! Authorization guard: bearer token → principal → permission check.
//!
//! Every mutating workflow call takes a `Principal` and asks it for the
//! permission it needs, so the rules live here and nowhere else:
//! 1. Missing, malformed or badly signed token → Unauthorized
//! 2. Expired token → TokenExpired (client clears its session)
//! 3. Unknown or inactive user → Unauthorized
//! 4. Staff user without an active center assignment → Forbidden
//! 5. Admin → every permission, every center
//! 6. Staff → only granted permissions, only their own center
//! 7. Citizen → no staff permissions

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::enums::{Permission, Role};
use crate::models::User;

/// Default session lifetime for issued tokens.
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Token expired")]
    TokenExpired,
    #[error("Permission '{0}' required")]
    Forbidden(String),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

// ═══════════════════════════════════════════════════════════
// Tokens
// ═══════════════════════════════════════════════════════════

/// JWT claims carried by portal bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 signer/verifier for portal tokens.
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenSigner {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Issue a token for `user` valid for the default lifetime.
    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        self.issue_with_ttl(user, Duration::hours(DEFAULT_TOKEN_TTL_HOURS))
    }

    pub fn issue_with_ttl(&self, user: &User, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            tracing::error!("Token signing failed: {e}");
            AuthError::Unauthorized
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::Unauthorized,
            })
    }
}

// ═══════════════════════════════════════════════════════════
// Principal
// ═══════════════════════════════════════════════════════════

/// Staff member's center assignment and granted permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffAssignment {
    pub staff_id: Uuid,
    pub center_id: Uuid,
    pub permissions: Vec<Permission>,
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub name: String,
    pub role: Role,
    pub staff: Option<StaffAssignment>,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Staff member or admin.
    pub fn is_staff(&self) -> bool {
        self.is_admin() || self.staff.is_some()
    }

    pub fn has(&self, permission: Permission) -> bool {
        if self.is_admin() {
            return true;
        }
        self.staff
            .as_ref()
            .is_some_and(|s| s.permissions.contains(&permission))
    }

    pub fn require(&self, permission: Permission) -> Result<(), AuthError> {
        if self.has(permission) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(permission.as_str().into()))
        }
    }

    /// Pass if any one of `permissions` is held.
    pub fn require_any(&self, permissions: &[Permission]) -> Result<(), AuthError> {
        if permissions.iter().any(|p| self.has(*p)) {
            return Ok(());
        }
        let names: Vec<&str> = permissions.iter().map(|p| p.as_str()).collect();
        Err(AuthError::Forbidden(names.join(" or ")))
    }

    pub fn require_staff(&self) -> Result<(), AuthError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(AuthError::Forbidden("staff".into()))
        }
    }

    pub fn require_admin(&self) -> Result<(), AuthError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AuthError::Forbidden("admin".into()))
        }
    }

    /// Center the caller is confined to. `None` for admins (all centers)
    /// and citizens (scoped by ownership instead).
    pub fn center_scope(&self) -> Option<Uuid> {
        if self.is_admin() {
            return None;
        }
        self.staff.as_ref().map(|s| s.center_id)
    }

    pub fn can_access_center(&self, center_id: &Uuid) -> bool {
        if self.is_admin() {
            return true;
        }
        self.staff.as_ref().is_some_and(|s| &s.center_id == center_id)
    }
}

/// Resolve a user id into a principal, applying rules 3 and 4.
pub fn load_principal(conn: &Connection, user_id: &Uuid) -> Result<Principal, AuthError> {
    let user = db::get_user(conn, user_id)?.ok_or(AuthError::Unauthorized)?;
    if !user.is_active {
        return Err(AuthError::Unauthorized);
    }

    let staff = match user.role {
        Role::Staff => {
            let record = db::get_staff_by_user(conn, &user.id)?
                .filter(|s| s.is_active)
                .ok_or_else(|| AuthError::Forbidden("active staff assignment".into()))?;
            Some(StaffAssignment {
                staff_id: record.id,
                center_id: record.center_id,
                permissions: record.permissions,
            })
        }
        Role::User | Role::Admin => None,
    };

    Ok(Principal {
        user_id: user.id,
        name: user.name,
        role: user.role,
        staff,
    })
}

/// Full guard: verify the token, then load the principal it names.
pub fn authenticate(
    conn: &Connection,
    signer: &TokenSigner,
    token: &str,
) -> Result<Principal, AuthError> {
    let claims = signer.verify(token)?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::Unauthorized)?;
    load_principal(conn, &user_id)
}
