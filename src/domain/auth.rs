use std::str::FromStr;

use uuid::Uuid;

use super::errors::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            other => Err(DomainError::InvalidInput(format!("unknown role '{}'", other))),
        }
    }
}

/// The authenticated caller, as vouched for by the identity collaborator.
///
/// Every authorization decision in the core goes through the methods below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub roles: Vec<Role>,
}

impl Actor {
    pub fn new(user_id: Uuid, roles: Vec<Role>) -> Self {
        Self { user_id, roles }
    }

    pub fn user(user_id: Uuid) -> Self {
        Self::new(user_id, vec![Role::User])
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self::new(user_id, vec![Role::User, Role::Admin])
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }

    pub fn require_admin(&self) -> Result<(), DomainError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(DomainError::Forbidden("administrator role required".into()))
        }
    }

    /// Owners see their own data; administrators see everyone's.
    pub fn require_owner_or_admin(&self, owner: Uuid) -> Result<(), DomainError> {
        if self.user_id == owner || self.is_admin() {
            Ok(())
        } else {
            Err(DomainError::Forbidden(format!(
                "user {} may not access data of user {}",
                self.user_id, owner
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!(Role::from_str(" admin ").unwrap(), Role::Admin);
        assert_eq!(Role::from_str("USER").unwrap(), Role::User);
        assert!(Role::from_str("ROOT").is_err());
    }

    #[test]
    fn plain_user_cannot_administer() {
        let actor = Actor::user(Uuid::new_v4());
        assert!(matches!(actor.require_admin(), Err(DomainError::Forbidden(_))));
    }

    #[test]
    fn owner_and_admin_can_read_orders() {
        let owner = Uuid::new_v4();
        assert!(Actor::user(owner).require_owner_or_admin(owner).is_ok());
        assert!(Actor::admin(Uuid::new_v4()).require_owner_or_admin(owner).is_ok());
        assert!(Actor::user(Uuid::new_v4()).require_owner_or_admin(owner).is_err());
    }
}
