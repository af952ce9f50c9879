use psk_schemas::Principal;

use crate::{Decision, DenyReason, Operation, PolicyTable, ResourceRef};

/// Role gate only: public check, authentication, role hierarchy.
///
/// The kernel calls this before any storage access so that a refused
/// principal never causes a read. Ownership is evaluated later by
/// [`authorize`] once the resource owner is known.
pub fn role_gate(table: &PolicyTable, principal: &Principal, op: Operation) -> Decision {
    let rule = table.rule(op);

    if rule.public {
        return Decision::Allow;
    }
    if principal.is_guest() {
        return Decision::Deny(DenyReason::NotAuthenticated);
    }
    if !rule
        .allowed_roles
        .iter()
        .any(|required| principal.role.includes(*required))
    {
        return Decision::Deny(DenyReason::InsufficientRole);
    }
    Decision::Allow
}

/// Full decision: role gate, then ownership gate.
///
/// Evaluation order:
/// 1. public operation → Allow
/// 2. guest → `NotAuthenticated`
/// 3. role gate → `InsufficientRole`
/// 4. ownership gate (if the rule has one and the resource names an owner):
///    bypass roles skip it; otherwise `principal.id` must equal the owner,
///    else `NotOwner`
pub fn authorize(
    table: &PolicyTable,
    principal: &Principal,
    op: Operation,
    resource: ResourceRef,
) -> Decision {
    let gate = role_gate(table, principal, op);
    if !gate.is_allowed() {
        return gate;
    }

    let rule = table.rule(op);
    if rule.public {
        return Decision::Allow;
    }

    let (Some(ownership), Some(owner)) = (&rule.ownership, resource.owner()) else {
        return Decision::Allow;
    };

    let bypass = ownership
        .bypass_roles
        .iter()
        .any(|r| principal.role.includes(*r));
    if bypass || principal.id == owner {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::NotOwner)
    }
}
