use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Result};
use psk_schemas::Role;
use serde::{Deserialize, Serialize};

use crate::Operation;

/// Ownership requirement attached to an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipGate {
    /// Roles that skip the ownership check. Hierarchy applies: listing
    /// `store_owner` also exempts `admin`.
    pub bypass_roles: BTreeSet<Role>,
}

/// Rule for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRule {
    /// Public operations are allowed for every principal, guests included.
    pub public: bool,
    /// A principal passes the role gate if its role includes any of these.
    pub allowed_roles: BTreeSet<Role>,
    pub ownership: Option<OwnershipGate>,
}

impl OperationRule {
    fn public() -> Self {
        Self {
            public: true,
            allowed_roles: BTreeSet::new(),
            ownership: None,
        }
    }

    fn roles(roles: &[Role]) -> Self {
        Self {
            public: false,
            allowed_roles: roles.iter().copied().collect(),
            ownership: None,
        }
    }

    fn owned(mut self, bypass: &[Role]) -> Self {
        self.ownership = Some(OwnershipGate {
            bypass_roles: bypass.iter().copied().collect(),
        });
        self
    }
}

/// Configured override for one operation's rule. Absent fields keep the
/// standard value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleOverride {
    pub public: Option<bool>,
    pub allowed_roles: Option<Vec<Role>>,
    pub bypass_roles: Option<Vec<Role>>,
}

/// Total mapping from [`Operation`] to [`OperationRule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    // Indexed by `Operation::index`; always holds one rule per operation.
    rules: Vec<OperationRule>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl PolicyTable {
    /// Built-in rule set.
    ///
    /// ```text
    /// public       get_pet find_pets_by_status find_pets_by_tags get_inventory
    ///              register_user login
    /// customer+    place_order
    ///              get_order cancel_order        (owner; bypass store_owner)
    ///              get_user update_user delete_user (self; bypass admin)
    /// store_owner+ add_pet update_pet delete_pet update_order_status
    /// admin        relist_pet
    /// ```
    pub fn standard() -> Self {
        use Role::*;

        let rules = Operation::ALL
            .iter()
            .map(|op| match op {
                Operation::GetPet
                | Operation::FindPetsByStatus
                | Operation::FindPetsByTags
                | Operation::GetInventory
                | Operation::RegisterUser
                | Operation::Login => OperationRule::public(),

                Operation::PlaceOrder => OperationRule::roles(&[Customer]),
                Operation::GetOrder | Operation::CancelOrder => {
                    OperationRule::roles(&[Customer]).owned(&[StoreOwner])
                }
                Operation::GetUser | Operation::UpdateUser | Operation::DeleteUser => {
                    OperationRule::roles(&[Customer]).owned(&[Admin])
                }

                Operation::AddPet
                | Operation::UpdatePet
                | Operation::DeletePet
                | Operation::UpdateOrderStatus => OperationRule::roles(&[StoreOwner]),

                Operation::RelistPet => OperationRule::roles(&[Admin]),
            })
            .collect();

        Self { rules }
    }

    pub fn rule(&self, op: Operation) -> &OperationRule {
        &self.rules[op.index()]
    }

    /// Apply configured overrides keyed by operation name (e.g.
    /// `find_pets_by_status`). Unknown names are an error.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, RuleOverride>) -> Result<Self> {
        for (name, ov) in overrides {
            let op = Operation::parse(name)?;
            let rule = &mut self.rules[op.index()];

            if let Some(public) = ov.public {
                rule.public = public;
            }
            if let Some(roles) = &ov.allowed_roles {
                rule.allowed_roles = roles.iter().copied().collect();
            }
            if let Some(bypass) = &ov.bypass_roles {
                match rule.ownership.as_mut() {
                    Some(gate) => gate.bypass_roles = bypass.iter().copied().collect(),
                    None => bail!(
                        "policy override for {}: bypass_roles set on an operation without an ownership gate",
                        op
                    ),
                }
            }
            if !rule.public && rule.allowed_roles.is_empty() {
                bail!(
                    "policy override for {}: gated operation must allow at least one role",
                    op
                );
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_covers_every_operation() {
        let t = PolicyTable::standard();
        for op in Operation::ALL {
            let r = t.rule(op);
            assert!(r.public || !r.allowed_roles.is_empty(), "{op} has no roles");
        }
    }

    #[test]
    fn overrides_apply_by_name() {
        let mut ov = BTreeMap::new();
        ov.insert(
            "find_pets_by_status".to_string(),
            RuleOverride {
                public: Some(false),
                allowed_roles: Some(vec![Role::Customer]),
                bypass_roles: None,
            },
        );
        let t = PolicyTable::standard().with_overrides(&ov).unwrap();
        let r = t.rule(Operation::FindPetsByStatus);
        assert!(!r.public);
        assert!(r.allowed_roles.contains(&Role::Customer));
    }

    #[test]
    fn unknown_operation_override_is_rejected() {
        let mut ov = BTreeMap::new();
        ov.insert("launch_rocket".to_string(), RuleOverride::default());
        assert!(PolicyTable::standard().with_overrides(&ov).is_err());
    }

    #[test]
    fn bypass_override_requires_ownership_gate() {
        let mut ov = BTreeMap::new();
        ov.insert(
            "add_pet".to_string(),
            RuleOverride {
                bypass_roles: Some(vec![Role::Admin]),
                ..Default::default()
            },
        );
        assert!(PolicyTable::standard().with_overrides(&ov).is_err());
    }

    #[test]
    fn override_parses_from_yaml() {
        let raw = "public: false\nallowed_roles: [customer]\n";
        let ov: RuleOverride = serde_yaml::from_str(raw).unwrap();
        assert_eq!(ov.public, Some(false));
        assert_eq!(ov.allowed_roles, Some(vec![Role::Customer]));
    }
}
