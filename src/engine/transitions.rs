//! Who may move a delivery between which pair of statuses.
//!
//! Every `advance_status` call is checked against [`allowed_targets`] exactly once. Couriers and
//! clients only get adjacent steps; operators may override from any non-terminal status but never
//! across the assigned/unassigned boundary, which is reserved for bid acceptance and direct
//! assignment so that the courier id invariant holds.

use crate::error::AppError;
use crate::models::delivery::DeliveryStatus::{
    self, Accepted, Bidding, Cancelled, Completed, Delivered, InProgress, Pending,
};
use crate::models::principal::Role;

pub fn allowed_targets(role: Role, from: DeliveryStatus) -> &'static [DeliveryStatus] {
    match (role, from) {
        (Role::Courier, Accepted) => &[InProgress],
        (Role::Courier, InProgress) => &[Delivered],

        (Role::Client, Pending | Bidding) => &[Cancelled],
        (Role::Client, Delivered) => &[Completed],

        (Role::Operator, Pending) => &[Bidding, Cancelled],
        (Role::Operator, Bidding) => &[Pending, Cancelled],
        (Role::Operator, Accepted) => &[InProgress, Delivered, Completed, Cancelled],
        (Role::Operator, InProgress) => &[Accepted, Delivered, Completed, Cancelled],
        (Role::Operator, Delivered) => &[Accepted, InProgress, Completed, Cancelled],

        _ => &[],
    }
}

pub fn is_allowed(role: Role, from: DeliveryStatus, to: DeliveryStatus) -> bool {
    allowed_targets(role, from).contains(&to)
}

pub fn check(role: Role, from: DeliveryStatus, to: DeliveryStatus) -> Result<(), AppError> {
    if is_allowed(role, from, to) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition(format!(
            "{role} may not move a delivery from {from} to {to}"
        )))
    }
}
