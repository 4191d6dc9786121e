use polemarch_types::{Address, LedgerError, Roles};

/// Only the owner may rewire roles.
pub fn require_owner(roles: &Roles, sender: &Address) -> Result<(), LedgerError> {
    if *sender != roles.owner {
        return Err(LedgerError::Unauthorized);
    }
    Ok(())
}

/// Administrative calls are accepted from the owner or from the governance executor.
pub fn require_governance(roles: &Roles, sender: &Address) -> Result<(), LedgerError> {
    if *sender != roles.owner && *sender != roles.governance {
        return Err(LedgerError::Unauthorized);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn governance_executor_is_not_owner() {
        let roles = Roles {
            owner: [1; 32],
            governance: [2; 32],
            fee_recipient: [3; 32],
        };
        assert!(require_governance(&roles, &[1; 32]).is_ok());
        assert!(require_governance(&roles, &[2; 32]).is_ok());
        assert_eq!(require_owner(&roles, &[2; 32]), Err(LedgerError::Unauthorized));
        assert_eq!(require_governance(&roles, &[3; 32]), Err(LedgerError::Unauthorized));
    }
}
